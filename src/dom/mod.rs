//! Arena document model the engine decorates.
//!
//! Nodes are never freed or reused, so a `NodeId` stays a stable identity for
//! the lifetime of the document even after the node is detached.

pub mod classifier;

pub use classifier::{collect_matchables, Matchables};

use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("node {0} does not belong to this document")]
    UnknownNode(NodeId),
    #[error("cannot insert {child} under {parent}: it is an ancestor")]
    HierarchyRequest { parent: NodeId, child: NodeId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Click,
}

/// Identity of a registered handler. Registering the same handler twice for
/// the same event on one node is a no-op, as in the DOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub &'static str);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Primary,
    Auxiliary,
    Secondary,
}

/// A click travelling from its target up through the ancestors.
#[derive(Debug, Clone)]
pub struct ClickEvent {
    pub target: NodeId,
    pub button: MouseButton,
    default_prevented: bool,
    propagation_stopped: bool,
    delivered: Vec<(NodeId, HandlerId)>,
}

impl ClickEvent {
    pub fn new(target: NodeId, button: MouseButton) -> Self {
        Self {
            target,
            button,
            default_prevented: false,
            propagation_stopped: false,
            delivered: Vec::new(),
        }
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    /// Handlers that saw the event, in dispatch order.
    pub fn delivered(&self) -> &[(NodeId, HandlerId)] {
        &self.delivered
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
}

pub type MutationBatch = Vec<MutationRecord>;

/// Receiver of batched structural changes.
pub trait MutationSink: Send {
    /// Returns false once the receiver is gone; the observer then disconnects.
    fn deliver(&self, batch: MutationBatch) -> bool;
}

struct Observer {
    root: NodeId,
    sink: Box<dyn MutationSink>,
    pending: MutationBatch,
}

#[derive(Debug)]
struct NodeData {
    tag: Box<str>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    style_filter: Option<String>,
    classes: FxHashSet<Box<str>>,
    attributes: FxHashMap<Box<str>, String>,
    listeners: Vec<(EventKind, HandlerId)>,
}

impl NodeData {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase().into_boxed_str(),
            parent: None,
            children: Vec::new(),
            style_filter: None,
            classes: FxHashSet::default(),
            attributes: FxHashMap::default(),
            listeners: Vec::new(),
        }
    }
}

pub struct Document {
    url: Url,
    nodes: Vec<NodeData>,
    root: NodeId,
    body: Option<NodeId>,
    observer: Option<Observer>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("url", &self.url.as_str())
            .field("nodes", &self.nodes.len())
            .field("body", &self.body)
            .field("observing", &self.observer.as_ref().map(|o| o.root))
            .finish()
    }
}

impl Document {
    /// A fresh document holding only its `<html>` root. The body appears
    /// later through [`Document::create_body`].
    pub fn new(url: Url) -> Self {
        Self {
            url,
            nodes: vec![NodeData::new("html")],
            root: NodeId(0),
            body: None,
            observer: None,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn hostname(&self) -> &str {
        self.url.host_str().unwrap_or("")
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> Option<NodeId> {
        self.body.filter(|b| self.is_attached(*b))
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes.push(NodeData::new(tag));
        NodeId(self.nodes.len() - 1)
    }

    /// Creates `<body>` under the root, or returns the existing one.
    pub fn create_body(&mut self) -> NodeId {
        if let Some(body) = self.body() {
            return body;
        }
        let body = self.create_element("body");
        self.nodes[self.root.0].children.push(body);
        self.nodes[body.0].parent = Some(self.root);
        self.body = Some(body);
        body
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0).map(|n| &*n.tag)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// True when the node's ancestor chain reaches the document root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.root {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    fn check(&self, node: NodeId) -> Result<(), DomError> {
        if node.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(DomError::UnknownNode(node))
        }
    }

    /// Appends `child` as the last child of `parent`, moving it if it already
    /// has a parent. Queues a mutation record when the insertion lands inside
    /// the observed subtree.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.check(parent)?;
        self.check(child)?;
        if self.contains(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }

        self.detach(child);
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);

        let observed = self
            .observer
            .as_ref()
            .is_some_and(|o| self.is_attached(parent) && self.contains(o.root, parent));
        if observed {
            if let Some(observer) = self.observer.as_mut() {
                observer.pending.push(MutationRecord {
                    target: parent,
                    added: vec![child],
                });
            }
        }
        Ok(())
    }

    /// Detaches `node` from its parent. Removals are not reported.
    pub fn remove(&mut self, node: NodeId) -> Result<(), DomError> {
        self.check(node)?;
        if node == self.root {
            return Err(DomError::HierarchyRequest {
                parent: self.root,
                child: node,
            });
        }
        self.detach(node);
        Ok(())
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
    }

    pub fn style_filter(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0).and_then(|n| n.style_filter.as_deref())
    }

    pub fn set_style_filter(&mut self, node: NodeId, filter: Option<String>) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.style_filter = filter;
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.nodes
            .get(node.0)
            .is_some_and(|n| n.classes.contains(class))
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.classes.insert(class.into());
        }
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.classes.remove(class);
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(node.0)
            .and_then(|n| n.attributes.get(name).map(String::as_str))
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.attributes.insert(name.into(), value.to_string());
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.attributes.remove(name);
        }
    }

    /// Returns false if the handler was already registered.
    pub fn add_listener(&mut self, node: NodeId, event: EventKind, handler: HandlerId) -> bool {
        match self.nodes.get_mut(node.0) {
            Some(n) if !n.listeners.contains(&(event, handler)) => {
                n.listeners.push((event, handler));
                true
            }
            _ => false,
        }
    }

    /// Returns false if the handler was not registered.
    pub fn remove_listener(&mut self, node: NodeId, event: EventKind, handler: HandlerId) -> bool {
        match self.nodes.get_mut(node.0) {
            Some(n) => {
                let before = n.listeners.len();
                n.listeners.retain(|l| *l != (event, handler));
                n.listeners.len() != before
            }
            None => false,
        }
    }

    pub fn listener_count(&self, node: NodeId, event: EventKind) -> usize {
        self.nodes
            .get(node.0)
            .map(|n| n.listeners.iter().filter(|(e, _)| *e == event).count())
            .unwrap_or(0)
    }

    /// Dispatches a click from `target` upwards, invoking `handle` for every
    /// registered click handler until one stops propagation.
    pub fn dispatch_click<F>(&mut self, target: NodeId, button: MouseButton, mut handle: F) -> ClickEvent
    where
        F: FnMut(&mut Document, NodeId, HandlerId, &mut ClickEvent),
    {
        let mut event = ClickEvent::new(target, button);
        let mut current = self.nodes.get(target.0).map(|_| target);

        while let Some(node) = current {
            let handlers: Vec<HandlerId> = self.nodes[node.0]
                .listeners
                .iter()
                .filter(|(e, _)| *e == EventKind::Click)
                .map(|(_, h)| *h)
                .collect();

            for handler in handlers {
                event.delivered.push((node, handler));
                handle(self, node, handler, &mut event);
            }

            if event.propagation_stopped {
                break;
            }
            current = self.parent(node);
        }

        event
    }

    /// Starts reporting insertions below `root`, replacing any previous
    /// observer.
    pub fn observe(&mut self, root: NodeId, sink: Box<dyn MutationSink>) -> Result<(), DomError> {
        self.check(root)?;
        self.observer = Some(Observer {
            root,
            sink,
            pending: Vec::new(),
        });
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.observer = None;
    }

    pub fn is_observed(&self) -> bool {
        self.observer.is_some()
    }

    /// Delivers queued records as one batch. Returns the number of records.
    pub fn flush_mutations(&mut self) -> usize {
        let Some(observer) = self.observer.as_mut() else {
            return 0;
        };
        if observer.pending.is_empty() {
            return 0;
        }

        let batch = std::mem::take(&mut observer.pending);
        let count = batch.len();
        if !observer.sink.deliver(batch) {
            debug!("Mutation receiver gone, disconnecting observer");
            self.observer = None;
        }
        count
    }
}
