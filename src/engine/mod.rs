mod matcher;
pub mod state;
mod traits;

pub use matcher::{matches, normalize_domain, DomainMatcher};
pub use state::{parse_domain_entry, BlurAmount, Configuration, MediaKind};
pub use traits::{ConfigStore, HostMatcher, TabHost, TransportError};
