//! Per-page engine: decoration, mutation watching and the page actor.

mod controller;
pub mod decorator;
pub mod watcher;

pub use controller::{PageController, PageEvent, PageHandle, SharedDocument};
pub use decorator::{BlurDecorator, RevealState, MARKER_ATTRIBUTE, MARKER_CLASS, TOGGLE_HANDLER};
pub use watcher::{MutationWatcher, WatcherState};
