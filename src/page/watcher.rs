use super::decorator::BlurDecorator;
use crate::dom::{collect_matchables, Document, MutationBatch, MutationSink};
use crate::engine::Configuration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    /// Start was requested before the body existed.
    AwaitingBody,
    Observing,
}

/// Keeps newly inserted media suppressed after the initial pass.
#[derive(Debug)]
pub struct MutationWatcher {
    state: WatcherState,
}

impl Default for MutationWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationWatcher {
    pub fn new() -> Self {
        Self {
            state: WatcherState::Idle,
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Observes the body, or defers until [`MutationWatcher::on_ready`] when
    /// there is none yet.
    pub fn start(&mut self, doc: &mut Document, sink: Box<dyn MutationSink>) -> WatcherState {
        if self.state == WatcherState::Observing && doc.is_observed() {
            return self.state;
        }

        self.state = match doc.body() {
            Some(body) => match doc.observe(body, sink) {
                Ok(()) => {
                    info!("MutationObserver started");
                    WatcherState::Observing
                }
                Err(e) => {
                    debug!("Cannot observe body yet: {}", e);
                    WatcherState::AwaitingBody
                }
            },
            None => {
                info!("Document body not ready, waiting...");
                WatcherState::AwaitingBody
            }
        };
        self.state
    }

    /// Document-ready signal. Only acts on a deferred start.
    pub fn on_ready(&mut self, doc: &mut Document, sink: Box<dyn MutationSink>) -> WatcherState {
        if self.state == WatcherState::AwaitingBody {
            self.start(doc, sink)
        } else {
            self.state
        }
    }

    pub fn stop(&mut self, doc: &mut Document) {
        doc.disconnect();
        self.state = WatcherState::Idle;
    }

    /// Suppresses matchable elements inside every inserted node. Nothing is
    /// undone here: fresh elements start unsuppressed. Returns how many
    /// elements changed.
    pub fn process(
        &self,
        doc: &mut Document,
        decorator: &mut BlurDecorator,
        config: &Configuration,
        page_matched: bool,
        batch: &MutationBatch,
    ) -> usize {
        if !config.enabled() || !page_matched {
            return 0;
        }

        let amount = config.blur_amount();
        let mut changed = 0;
        for record in batch {
            for &node in &record.added {
                let found: Vec<_> = collect_matchables(doc, node).collect();
                for (element, kind) in found {
                    if config.suppresses(page_matched, kind) && decorator.suppress(doc, element, amount) {
                        changed += 1;
                    }
                }
            }
        }

        if changed > 0 {
            debug!(records = batch.len(), changed, "Processed mutation batch");
        }
        changed
    }
}
