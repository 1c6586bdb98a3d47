//! The Sync Hub: canonical Configuration, persistence and fan-out.

mod tabs;

pub use tabs::LocalTabs;

use crate::config::{HubConfig, TransitionPolicy};
use crate::engine::{ConfigStore, Configuration, DomainMatcher, TabHost};
use crate::protocol::{PageMessage, Request, Response, TabId, TabInfo};
use futures::{stream, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("sync hub is unavailable")]
    HubUnavailable,
    #[error("failed to persist configuration: {0}")]
    Store(String),
}

enum HubRequest {
    GetState(oneshot::Sender<Configuration>),
    SetState(Configuration, oneshot::Sender<Result<(), SyncError>>),
    TabReady(TabId),
    TabActivated(TabId),
}

/// How one tab learns about a new Configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Update,
    Reload,
}

#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubRequest>,
}

impl HubHandle {
    pub async fn get_state(&self) -> Result<Configuration, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(HubRequest::GetState(reply))
            .await
            .map_err(|_| SyncError::HubUnavailable)?;
        rx.await.map_err(|_| SyncError::HubUnavailable)
    }

    /// Persists and broadcasts `config`. Returns once every live tab has been
    /// offered the update.
    pub async fn set_state(&self, config: Configuration) -> Result<(), SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(HubRequest::SetState(config, reply))
            .await
            .map_err(|_| SyncError::HubUnavailable)?;
        rx.await.map_err(|_| SyncError::HubUnavailable)?
    }

    /// Navigation in `tab` completed.
    pub async fn tab_ready(&self, tab: TabId) -> Result<(), SyncError> {
        self.tx
            .send(HubRequest::TabReady(tab))
            .await
            .map_err(|_| SyncError::HubUnavailable)
    }

    /// `tab` was brought to the foreground.
    pub async fn tab_activated(&self, tab: TabId) -> Result<(), SyncError> {
        self.tx
            .send(HubRequest::TabActivated(tab))
            .await
            .map_err(|_| SyncError::HubUnavailable)
    }

    /// Answers one request of the message contract.
    pub async fn handle(&self, request: Request) -> Result<Response, SyncError> {
        match request {
            Request::GetState => self.get_state().await.map(Response::State),
            Request::SetState(config) => match self.set_state(config).await {
                Ok(()) => Ok(Response::SetResult { success: true }),
                Err(SyncError::Store(e)) => {
                    warn!("Failed to update state: {}", e);
                    Ok(Response::SetResult { success: false })
                }
                Err(e) => Err(e),
            },
        }
    }
}

pub struct SyncHub {
    store: Arc<dyn ConfigStore>,
    host: Arc<dyn TabHost>,
    settings: HubConfig,
    current: Configuration,
}

impl SyncHub {
    pub fn new(store: Arc<dyn ConfigStore>, host: Arc<dyn TabHost>, settings: HubConfig) -> Self {
        Self {
            store,
            host,
            settings,
            current: Configuration::default(),
        }
    }

    /// Starts the hub task. Requests sent before initialization completes
    /// wait in the queue.
    pub fn spawn(store: Arc<dyn ConfigStore>, host: Arc<dyn TabHost>, settings: HubConfig) -> HubHandle {
        let (tx, rx) = mpsc::channel(settings.request_buffer.max(1));
        let hub = Self::new(store, host, settings);
        tokio::spawn(hub.run(rx));
        HubHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<HubRequest>) {
        self.initialize().await;

        while let Some(request) = rx.recv().await {
            match request {
                HubRequest::GetState(reply) => {
                    let _ = reply.send(self.current.clone());
                }
                HubRequest::SetState(config, reply) => {
                    let result = self.set_state(config).await;
                    let _ = reply.send(result);
                }
                HubRequest::TabReady(tab) | HubRequest::TabActivated(tab) => {
                    self.push_current(tab).await;
                }
            }
        }

        debug!("Sync hub stopped");
    }

    /// Loads the stored Configuration, writing defaults on first run.
    pub async fn initialize(&mut self) {
        match self.store.load().await {
            Ok(Some(config)) => {
                info!(
                    domains = config.blocked_domains().len(),
                    enabled = config.enabled(),
                    "Loaded stored configuration"
                );
                self.current = config.normalized();
            }
            Ok(None) => {
                self.current = Configuration::default();
                match self.store.save(&self.current).await {
                    Ok(()) => info!("Extension installed with default settings"),
                    Err(e) => error!("Failed to store default configuration: {:#}", e),
                }
            }
            Err(e) => {
                error!("Failed to load configuration, using defaults: {:#}", e);
                self.current = Configuration::default();
            }
        }
    }

    pub fn current(&self) -> &Configuration {
        &self.current
    }

    pub async fn set_state(&mut self, config: Configuration) -> Result<(), SyncError> {
        let next = config.normalized();
        if let Err(e) = self.store.save(&next).await {
            error!("Failed to persist configuration: {:#}", e);
            return Err(SyncError::Store(format!("{:#}", e)));
        }

        let previous = std::mem::replace(&mut self.current, next);
        self.broadcast(&previous).await;
        Ok(())
    }

    fn plan(
        &self,
        tab: &TabInfo,
        previous: &Configuration,
        (now, before): &(DomainMatcher, DomainMatcher),
    ) -> Delivery {
        if self.settings.transition_policy == TransitionPolicy::InPlace {
            return Delivery::Update;
        }
        let host = tab.host().unwrap_or("");
        if self.current.applies_with(now, host) && !previous.applies_with(before, host) {
            Delivery::Reload
        } else {
            Delivery::Update
        }
    }

    /// Best-effort fan-out: tabs that cannot be reached are logged and
    /// skipped, never retried.
    async fn broadcast(&self, previous: &Configuration) {
        let tabs: Vec<TabInfo> = self
            .host
            .tabs()
            .await
            .into_iter()
            .filter(|t| t.url.is_some())
            .collect();
        let total = tabs.len();
        let matchers = (self.current.matcher(), previous.matcher());

        let deliveries = tabs.into_iter().map(|tab| {
            let delivery = self.plan(&tab, previous, &matchers);
            let host = self.host.clone();
            let message = PageMessage::StateUpdated(self.current.clone());
            async move {
                let result = match delivery {
                    Delivery::Reload => host.reload(tab.id).await,
                    Delivery::Update => host.send(tab.id, message).await,
                };
                match result {
                    Ok(()) => {
                        debug!(tab = %tab.id, ?delivery, "Delivered configuration");
                        true
                    }
                    Err(e) => {
                        warn!(tab = %tab.id, "Failed to send message to tab: {}", e);
                        false
                    }
                }
            }
        });

        let delivered = stream::iter(deliveries)
            .buffer_unordered(self.settings.broadcast_concurrency.max(1))
            .filter(|ok| futures::future::ready(*ok))
            .count()
            .await;

        info!(
            "Configuration broadcast complete. Delivered to {} of {} tabs",
            delivered, total
        );
    }

    async fn push_current(&self, tab: TabId) {
        let Some(info) = self.host.tab(tab).await else {
            debug!(tab = %tab, "Ready signal for unknown tab");
            return;
        };
        if info.url.is_none() {
            return;
        }

        let message = PageMessage::StateUpdated(self.current.clone());
        if let Err(e) = self.host.send(tab, message).await {
            warn!(tab = %tab, "Failed to push configuration: {}", e);
        }
    }
}
