use super::decorator::{BlurDecorator, RevealState, TOGGLE_HANDLER};
use super::watcher::{MutationWatcher, WatcherState};
use crate::dom::{collect_matchables, ClickEvent, Document, MouseButton, MutationBatch, MutationSink, NodeId};
use crate::engine::{Configuration, TransportError};
use crate::hub::HubHandle;
use crate::protocol::{PageMessage, TabId};
use arc_swap::ArcSwapOption;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use url::Url;

pub type SharedDocument = Arc<Mutex<Document>>;

/// Everything that reaches a page, in arrival order.
#[derive(Debug)]
pub enum PageEvent {
    StateUpdated(Configuration),
    Mutations(MutationBatch),
    /// Document-ready signal from the host.
    DomReady,
    Reload,
    Click {
        target: NodeId,
        button: MouseButton,
        reply: oneshot::Sender<ClickEvent>,
    },
    RevealState {
        node: NodeId,
        reply: oneshot::Sender<Option<RevealState>>,
    },
    WatcherState(oneshot::Sender<WatcherState>),
    /// Replies once every earlier event has been handled.
    Settle(oneshot::Sender<()>),
}

struct InboxSink(mpsc::WeakUnboundedSender<PageEvent>);

impl MutationSink for InboxSink {
    fn deliver(&self, batch: MutationBatch) -> bool {
        match self.0.upgrade() {
            Some(tx) => tx.send(PageEvent::Mutations(batch)).is_ok(),
            None => false,
        }
    }
}

fn lock(document: &SharedDocument) -> MutexGuard<'_, Document> {
    document.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Host-side handle to a running page.
#[derive(Debug, Clone)]
pub struct PageHandle {
    id: TabId,
    url: Url,
    document: SharedDocument,
    inbox: mpsc::UnboundedSender<PageEvent>,
    config: Arc<ArcSwapOption<Configuration>>,
}

impl PageHandle {
    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Runs `f` against the live document. The page's own scripts mutate
    /// through here; call [`Document::flush_mutations`] to end a batch.
    pub fn with_document<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let mut doc = lock(&self.document);
        f(&mut doc)
    }

    /// The Configuration the page currently renders with.
    pub fn configuration(&self) -> Option<Arc<Configuration>> {
        self.config.load_full()
    }

    pub fn deliver(&self, message: PageMessage) -> Result<(), TransportError> {
        let event = match message {
            PageMessage::StateUpdated(config) => PageEvent::StateUpdated(config),
        };
        self.send(event)
    }

    pub fn dom_ready(&self) -> Result<(), TransportError> {
        self.send(PageEvent::DomReady)
    }

    pub fn reload(&self) -> Result<(), TransportError> {
        self.send(PageEvent::Reload)
    }

    pub async fn click(&self, target: NodeId, button: MouseButton) -> Option<ClickEvent> {
        let (reply, rx) = oneshot::channel();
        self.send(PageEvent::Click {
            target,
            button,
            reply,
        })
        .ok()?;
        rx.await.ok()
    }

    pub async fn reveal_state(&self, node: NodeId) -> Option<RevealState> {
        let (reply, rx) = oneshot::channel();
        self.send(PageEvent::RevealState { node, reply }).ok()?;
        rx.await.ok().flatten()
    }

    pub async fn watcher_state(&self) -> Option<WatcherState> {
        let (reply, rx) = oneshot::channel();
        self.send(PageEvent::WatcherState(reply)).ok()?;
        rx.await.ok()
    }

    /// Waits until the page has processed everything sent before this call.
    pub async fn settle(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.send(PageEvent::Settle(reply)).is_err() {
            return false;
        }
        rx.await.is_ok()
    }

    fn send(&self, event: PageEvent) -> Result<(), TransportError> {
        self.inbox
            .send(event)
            .map_err(|_| TransportError::TabClosed(self.id))
    }
}

/// Per-page actor binding the current Configuration to the live document.
pub struct PageController {
    id: TabId,
    document: SharedDocument,
    hub: HubHandle,
    config: Arc<ArcSwapOption<Configuration>>,
    page_matched: bool,
    decorator: BlurDecorator,
    watcher: MutationWatcher,
    weak_inbox: mpsc::WeakUnboundedSender<PageEvent>,
    inbox: mpsc::UnboundedReceiver<PageEvent>,
}

impl PageController {
    /// Spawns the page task. Bootstrap runs first; events sent meanwhile
    /// queue up behind it.
    pub fn spawn(id: TabId, document: Document, hub: HubHandle) -> PageHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let url = document.url().clone();
        let document = Arc::new(Mutex::new(document));
        let config = Arc::new(ArcSwapOption::empty());

        let controller = Self {
            id,
            document: document.clone(),
            hub,
            config: config.clone(),
            page_matched: false,
            decorator: BlurDecorator::new(),
            watcher: MutationWatcher::new(),
            weak_inbox: tx.downgrade(),
            inbox: rx,
        };
        tokio::spawn(controller.run());

        PageHandle {
            id,
            url,
            document,
            inbox: tx,
            config,
        }
    }

    async fn run(mut self) {
        self.bootstrap().await;

        while let Some(event) = self.inbox.recv().await {
            match event {
                PageEvent::StateUpdated(config) => {
                    debug!(tab = %self.id, "Received state update");
                    self.on_state_updated(config);
                }
                PageEvent::Mutations(batch) => self.on_mutations(&batch),
                PageEvent::DomReady => self.on_dom_ready(),
                PageEvent::Reload => {
                    info!(tab = %self.id, "Reloading page");
                    self.teardown();
                    self.bootstrap().await;
                }
                PageEvent::Click {
                    target,
                    button,
                    reply,
                } => {
                    let _ = reply.send(self.on_click(target, button));
                }
                PageEvent::RevealState { node, reply } => {
                    let _ = reply.send(self.decorator.state(node));
                }
                PageEvent::WatcherState(reply) => {
                    let _ = reply.send(self.watcher.state());
                }
                PageEvent::Settle(reply) => {
                    let _ = reply.send(());
                }
            }
        }

        debug!(tab = %self.id, "Page closed");
    }

    /// Fetch, full pass, then observe. The pass and the watcher registration
    /// share one document lock so no insertion falls between them.
    async fn bootstrap(&mut self) {
        let config = match self.hub.get_state().await {
            Ok(config) => {
                info!(tab = %self.id, "Received initial state");
                Some(config)
            }
            Err(e) => {
                warn!(
                    tab = %self.id,
                    "Configuration unavailable, suppressing nothing: {}", e
                );
                None
            }
        };

        let sink = self.sink();
        let document = self.document.clone();
        let mut doc = lock(&document);
        if let Some(config) = config {
            self.apply(&mut doc, config);
        }
        self.watcher.start(&mut doc, sink);
    }

    fn sink(&self) -> Box<dyn MutationSink> {
        Box::new(InboxSink(self.weak_inbox.clone()))
    }

    fn on_state_updated(&mut self, config: Configuration) {
        let document = self.document.clone();
        let mut doc = lock(&document);
        self.apply(&mut doc, config);
    }

    /// Replaces the cached Configuration as a whole and reruns the pass.
    fn apply(&mut self, doc: &mut Document, config: Configuration) {
        let config = Arc::new(config);
        self.config.store(Some(config.clone()));
        self.full_pass(doc, &config);
    }

    fn full_pass(&mut self, doc: &mut Document, config: &Configuration) {
        self.page_matched = config.applies_to_host(doc.hostname());

        self.decorator.prune(doc);
        let amount = config.blur_amount();
        let found: Vec<_> = collect_matchables(doc, doc.root()).collect();

        let (mut suppressed, mut cleared) = (0, 0);
        for &(node, kind) in &found {
            if config.suppresses(self.page_matched, kind) {
                self.decorator.suppress(doc, node, amount);
                suppressed += 1;
            } else if self.decorator.unsuppress(doc, node) {
                cleared += 1;
            }
        }

        info!(
            tab = %self.id,
            host = %doc.hostname(),
            blocked = self.page_matched,
            found = found.len(),
            suppressed,
            cleared,
            "Processed images"
        );
    }

    fn on_mutations(&mut self, batch: &MutationBatch) {
        let Some(config) = self.config.load_full() else {
            return;
        };
        let mut doc = lock(&self.document);
        self.watcher
            .process(&mut doc, &mut self.decorator, &config, self.page_matched, batch);
    }

    fn on_dom_ready(&mut self) {
        debug!(tab = %self.id, "DOMContentLoaded event fired");
        let sink = self.sink();
        let document = self.document.clone();
        let mut doc = lock(&document);
        if let Some(config) = self.config.load_full() {
            self.full_pass(&mut doc, &config);
        }
        self.watcher.on_ready(&mut doc, sink);
    }

    fn on_click(&mut self, target: NodeId, button: MouseButton) -> ClickEvent {
        let mut doc = lock(&self.document);
        let decorator = &mut self.decorator;
        doc.dispatch_click(target, button, |doc, node, handler, event| {
            if handler == TOGGLE_HANDLER {
                decorator.on_click(doc, node, event);
            }
        })
    }

    /// Drops everything the engine attached, as a navigation would.
    fn teardown(&mut self) {
        let mut doc = lock(&self.document);
        self.watcher.stop(&mut doc);
        self.decorator.clear(&mut doc);
        self.config.store(None);
        self.page_matched = false;
    }
}
