use super::{Document, NodeId};
use crate::engine::MediaKind;

/// Preorder walk yielding every image or video element at or below a root.
///
/// The walk is lazy and finite; calling [`collect_matchables`] again restarts
/// it against the document's current shape.
pub struct Matchables<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Matchables<'_> {
    type Item = (NodeId, MediaKind);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            self.stack
                .extend(self.doc.children(node).iter().rev().copied());

            if let Some(kind) = self.doc.tag(node).and_then(MediaKind::from_tag) {
                return Some((node, kind));
            }
        }
        None
    }
}

/// Detached roots yield nothing.
pub fn collect_matchables(doc: &Document, root: NodeId) -> Matchables<'_> {
    let stack = if doc.is_attached(root) {
        vec![root]
    } else {
        Vec::new()
    };
    Matchables { doc, stack }
}
