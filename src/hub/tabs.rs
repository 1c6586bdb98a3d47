use crate::engine::{TabHost, TransportError};
use crate::page::PageHandle;
use crate::protocol::{PageMessage, TabId, TabInfo};
use rustc_hash::FxHashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// In-process tab registry routing hub traffic to running pages.
#[derive(Debug, Clone, Default)]
pub struct LocalTabs {
    pages: Arc<RwLock<FxHashMap<TabId, PageHandle>>>,
}

impl LocalTabs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, page: PageHandle) {
        let mut guard = self.pages.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(page.id(), page);
    }

    pub fn get(&self, id: TabId) -> Option<PageHandle> {
        let guard = self.pages.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(&id).cloned()
    }
}

fn info(page: &PageHandle) -> TabInfo {
    TabInfo {
        id: page.id(),
        url: Some(page.url().clone()),
    }
}

#[async_trait::async_trait]
impl TabHost for LocalTabs {
    async fn tabs(&self) -> Vec<TabInfo> {
        let guard = self.pages.read().unwrap_or_else(PoisonError::into_inner);
        let mut tabs: Vec<TabInfo> = guard.values().map(info).collect();
        tabs.sort_by_key(|t| t.id);
        tabs
    }

    async fn tab(&self, id: TabId) -> Option<TabInfo> {
        self.get(id).as_ref().map(info)
    }

    async fn send(&self, id: TabId, message: PageMessage) -> Result<(), TransportError> {
        let page = self.get(id).ok_or(TransportError::UnknownTab(id))?;
        page.deliver(message)
    }

    async fn reload(&self, id: TabId) -> Result<(), TransportError> {
        let page = self.get(id).ok_or(TransportError::UnknownTab(id))?;
        page.reload()
    }
}
