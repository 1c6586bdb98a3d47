use super::state::Configuration;
use crate::protocol::{PageMessage, TabId, TabInfo};
use anyhow::Result;
use thiserror::Error;

/// The "Hot Path" check run for every page host.
pub trait HostMatcher: Send + Sync {
    /// Returns true if the host is covered by a blocked domain.
    fn matches_host(&self, hostname: &str) -> bool;
}

/// Persistence collaborator owning the stored Configuration.
#[async_trait::async_trait]
pub trait ConfigStore: Send + Sync {
    /// Returns `None` when nothing was ever stored.
    async fn load(&self) -> Result<Option<Configuration>>;

    /// Replaces the stored Configuration as a whole.
    async fn save(&self, config: &Configuration) -> Result<()>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("tab {0} is closed")]
    TabClosed(TabId),
    #[error("tab {0} is unknown")]
    UnknownTab(TabId),
}

/// Host environment facilities: tab enumeration, message delivery, reload.
#[async_trait::async_trait]
pub trait TabHost: Send + Sync {
    async fn tabs(&self) -> Vec<TabInfo>;

    async fn tab(&self, id: TabId) -> Option<TabInfo>;

    async fn send(&self, id: TabId, message: PageMessage) -> Result<(), TransportError>;

    async fn reload(&self, id: TabId) -> Result<(), TransportError>;
}
