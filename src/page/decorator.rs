use crate::dom::{ClickEvent, Document, EventKind, HandlerId, MouseButton, NodeId};
use crate::engine::BlurAmount;
use rustc_hash::FxHashMap;
use tracing::debug;

pub const MARKER_CLASS: &str = "spoiler-blur";
pub const MARKER_ATTRIBUTE: &str = "data-spoiler-blurred";
pub const TOGGLE_HANDLER: HandlerId = HandlerId("spoiler-toggle");

/// Per-element view state of a decorated element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealState {
    Suppressed,
    Revealed,
}

#[derive(Debug, Clone, Copy)]
struct BlurRecord {
    state: RevealState,
    amount: BlurAmount,
}

/// Applies and removes suppression on single elements.
///
/// Decoration state lives in a side table keyed by node identity; the
/// document only carries the visible effects (filter, marker, handler).
/// Elements absent from the table are undecorated.
#[derive(Debug, Default)]
pub struct BlurDecorator {
    records: FxHashMap<NodeId, BlurRecord>,
}

impl BlurDecorator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, node: NodeId) -> Option<RevealState> {
        self.records.get(&node).map(|r| r.state)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Puts `node` in the Suppressed state. A Revealed element is hidden
    /// again. Returns false when the element was already suppressed at this
    /// strength.
    pub fn suppress(&mut self, doc: &mut Document, node: NodeId, amount: BlurAmount) -> bool {
        if let Some(record) = self.records.get(&node) {
            if record.state == RevealState::Suppressed && record.amount == amount {
                return false;
            }
        }

        paint(doc, node, amount);
        doc.add_listener(node, EventKind::Click, TOGGLE_HANDLER);
        self.records.insert(
            node,
            BlurRecord {
                state: RevealState::Suppressed,
                amount,
            },
        );
        debug!(node = %node, tag = ?doc.tag(node), "Blur applied");
        true
    }

    /// Strips every decoration from `node`. Undecorated elements are left
    /// alone so page-owned styles survive.
    pub fn unsuppress(&mut self, doc: &mut Document, node: NodeId) -> bool {
        if self.records.remove(&node).is_none() {
            return false;
        }

        doc.set_style_filter(node, None);
        doc.remove_class(node, MARKER_CLASS);
        doc.remove_attribute(node, MARKER_ATTRIBUTE);
        doc.remove_listener(node, EventKind::Click, TOGGLE_HANDLER);
        debug!(node = %node, tag = ?doc.tag(node), "Blur removed");
        true
    }

    /// Flips a decorated element between Suppressed and Revealed. The click
    /// handler stays registered in both states.
    pub fn toggle(&mut self, doc: &mut Document, node: NodeId) -> Option<RevealState> {
        let record = self.records.get_mut(&node)?;

        record.state = match record.state {
            RevealState::Suppressed => {
                doc.set_style_filter(node, None);
                doc.remove_class(node, MARKER_CLASS);
                doc.set_attribute(node, MARKER_ATTRIBUTE, "false");
                debug!(node = %node, "Element revealed on click");
                RevealState::Revealed
            }
            RevealState::Revealed => {
                paint(doc, node, record.amount);
                debug!(node = %node, "Element re-blurred on click");
                RevealState::Suppressed
            }
        };
        Some(record.state)
    }

    /// Click handler body. Primary clicks on a decorated element are
    /// swallowed so links and page handlers never see them.
    pub fn on_click(&mut self, doc: &mut Document, node: NodeId, event: &mut ClickEvent) {
        if event.button != MouseButton::Primary || !self.records.contains_key(&node) {
            return;
        }
        event.prevent_default();
        event.stop_propagation();
        self.toggle(doc, node);
    }

    /// Undecorates and forgets elements that left the document, so a node
    /// the page re-inserts later comes back clean.
    pub fn prune(&mut self, doc: &mut Document) -> usize {
        let detached: Vec<NodeId> = self
            .records
            .keys()
            .copied()
            .filter(|node| !doc.is_attached(*node))
            .collect();
        for &node in &detached {
            self.unsuppress(doc, node);
        }
        detached.len()
    }

    /// Undecorates everything, attached or not.
    pub fn clear(&mut self, doc: &mut Document) {
        let nodes: Vec<NodeId> = self.records.keys().copied().collect();
        for node in nodes {
            self.unsuppress(doc, node);
        }
    }
}

fn paint(doc: &mut Document, node: NodeId, amount: BlurAmount) {
    doc.set_style_filter(node, Some(amount.css_filter()));
    doc.add_class(node, MARKER_CLASS);
    doc.set_attribute(node, MARKER_ATTRIBUTE, "true");
}
