use std::cmp::Ordering;

use crate::tree::{DomId, DomTree};

/// A caret position: a node plus an offset inside it. For text nodes the
/// offset counts characters; for elements it counts child slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomPoint {
    pub node: DomId,
    pub offset: usize,
}

impl DomPoint {
    pub fn new(node: DomId, offset: usize) -> Self {
        DomPoint { node, offset }
    }
}

/// An anchor/focus pair mirroring the browser selection object. The anchor
/// is where the selection started; the focus is where it ends, which may be
/// before the anchor in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomSelection {
    pub anchor: DomPoint,
    pub focus: DomPoint,
}

impl DomSelection {
    pub fn caret(point: DomPoint) -> Self {
        DomSelection {
            anchor: point,
            focus: point,
        }
    }

    pub fn new(anchor: DomPoint, focus: DomPoint) -> Self {
        DomSelection { anchor, focus }
    }

    pub fn is_caret(&self) -> bool {
        self.anchor == self.focus
    }

    /// The two endpoints in document order: `(start, end)`.
    pub fn ordered(&self, tree: &DomTree) -> (DomPoint, DomPoint) {
        let anchor = (self.anchor.node, self.anchor.offset);
        let focus = (self.focus.node, self.focus.offset);
        match tree.compare_points(anchor, focus) {
            Ordering::Greater => (self.focus, self.anchor),
            _ => (self.anchor, self.focus),
        }
    }
}
