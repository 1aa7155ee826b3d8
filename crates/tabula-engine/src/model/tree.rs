use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::ids::IdGenerator;
use crate::model::location::{Location, PathComponent};
use crate::model::text::TextModel;

/// Attribute name under which text-like blocks carry their [`TextModel`].
pub const TEXT_CONTENT_ATTR: &str = "textContent";

/// Handle to a node inside a [`DocTree`] arena. Keys of removed nodes
/// dangle; accessors return `None` for them.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey(pub(crate) u32);

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({})", self.0)
    }
}

/// An attribute value: plain JSON, or a text model for rich content.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Json(Value),
    Text(TextModel),
}

impl AttrValue {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            AttrValue::Json(v) => Some(v),
            AttrValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextModel> {
        match self {
            AttrValue::Text(t) => Some(t),
            AttrValue::Json(_) => None,
        }
    }

    pub(crate) fn as_text_mut(&mut self) -> Option<&mut TextModel> {
        match self {
            AttrValue::Text(t) => Some(t),
            AttrValue::Json(_) => None,
        }
    }
}

/// A node of the document tree: a type tag, a stable id, an attribute map
/// and ordered children. Parent links are maintained by the tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) ty: String,
    pub(crate) id: String,
    pub(crate) attributes: BTreeMap<String, AttrValue>,
    pub(crate) children: Vec<NodeKey>,
    pub(crate) parent: Option<NodeKey>,
}

impl Node {
    pub fn new(ty: impl Into<String>, id: impl Into<String>) -> Self {
        Node {
            ty: ty.into(),
            id: id.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn with_attribute(mut self, key: &str, value: AttrValue) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub fn ty(&self) -> &str {
        &self.ty
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attributes
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// The text model under [`TEXT_CONTENT_ATTR`], if any.
    pub fn text_content(&self) -> Option<&TextModel> {
        self.attributes.get(TEXT_CONTENT_ATTR).and_then(AttrValue::as_text)
    }

    /// Block types are tagged with an uppercase leading letter by
    /// convention; container types are not.
    pub fn is_block(&self) -> bool {
        self.ty.chars().next().is_some_and(|c| c.is_ascii_uppercase())
    }
}

/// Arena owning every node of a document.
///
/// Removed subtrees are first detached (keys stay readable for observers of
/// the removing changeset) and their slots reclaimed afterwards; the apply
/// lock guarantees no changeset is mid-flight when slots are reused.
#[derive(Debug, Default)]
pub struct DocTree {
    slots: Vec<Option<Node>>,
    free: Vec<u32>,
}

impl DocTree {
    pub fn new() -> Self {
        DocTree::default()
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeKey {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(node);
            NodeKey(index)
        } else {
            self.slots.push(Some(node));
            NodeKey((self.slots.len() - 1) as u32)
        }
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.slots.get(key.0 as usize).and_then(|s| s.as_ref())
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.slots.get_mut(key.0 as usize).and_then(|s| s.as_mut())
    }

    pub fn is_alive(&self, key: NodeKey) -> bool {
        self.node(key).is_some()
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.node(key).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.node(key)?.parent
    }

    /// Index of `key` within its parent's child list.
    pub fn child_index(&self, key: NodeKey) -> Option<usize> {
        let parent = self.parent(key)?;
        self.children(parent).iter().position(|&c| c == key)
    }

    pub(crate) fn insert_child_at(&mut self, parent: NodeKey, index: usize, child: NodeKey) {
        if !self.is_alive(parent) || !self.is_alive(child) {
            return;
        }
        self.detach(child);
        if let Some(node) = self.node_mut(parent) {
            let index = index.min(node.children.len());
            node.children.insert(index, child);
        } else {
            return;
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
    }

    /// Unlink from the parent, returning the former child index. The
    /// subtree stays readable until [`DocTree::release`].
    pub(crate) fn detach(&mut self, key: NodeKey) -> Option<usize> {
        let parent = self.parent(key)?;
        let index = self.children(parent).iter().position(|&c| c == key)?;
        if let Some(node) = self.node_mut(parent) {
            node.children.remove(index);
        }
        if let Some(node) = self.node_mut(key) {
            node.parent = None;
        }
        Some(index)
    }

    /// Reclaim the slots of a detached subtree.
    pub(crate) fn release(&mut self, key: NodeKey) {
        debug_assert!(self.parent(key).is_none(), "release expects a detached subtree");
        let children: Vec<NodeKey> = self.children(key).to_vec();
        for child in children {
            if let Some(node) = self.node_mut(child) {
                node.parent = None;
            }
            self.release(child);
        }
        if self.slots.get_mut(key.0 as usize).and_then(|s| s.take()).is_some() {
            self.free.push(key.0);
        }
    }

    /// Subtree keys in document order, inclusive.
    pub fn descendants(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if !self.is_alive(current) {
                continue;
            }
            out.push(current);
            for &child in self.children(current).iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// The index path from `root` down to `key`.
    pub fn path_of(&self, root: NodeKey, key: NodeKey) -> Option<Location> {
        let mut indices = Vec::new();
        let mut current = key;
        while current != root {
            let index = self.child_index(current)?;
            indices.push(index);
            current = self.parent(current)?;
        }
        indices.reverse();
        Some(Location::from_indices(indices))
    }

    /// Resolve a location's index components from `root`. A trailing
    /// attribute key is allowed and resolves to the node that carries it.
    pub fn node_at(&self, root: NodeKey, location: &Location) -> Option<NodeKey> {
        let mut current = root;
        for component in location.components() {
            match component {
                PathComponent::Index(i) => {
                    current = self.children(current).get(*i).copied()?;
                }
                PathComponent::Key(_) => break,
            }
        }
        Some(current)
    }
}

/// The document: a root with exactly two children, `title` then `body`.
/// Only `body`'s children change structurally from the user's perspective.
#[derive(Debug)]
pub struct Document {
    tree: DocTree,
    root: NodeKey,
    title: NodeKey,
    body: NodeKey,
}

pub const DOCUMENT_TYPE: &str = "document";
pub const BODY_TYPE: &str = "body";
pub const TITLE_BLOCK_TYPE: &str = "Title";
pub const TEXT_BLOCK_TYPE: &str = "Text";

/// Attribute distinguishing the text variants of a Text block
/// (normal, heading1..3, bulleted, quote).
pub const TEXT_TYPE_ATTR: &str = "textType";

impl Document {
    /// A fresh document with the given title text and an empty body.
    pub fn new(id_gen: &IdGenerator, title_text: &str) -> Self {
        let mut tree = DocTree::new();
        let root = tree.alloc(Node::new(DOCUMENT_TYPE, DOCUMENT_TYPE));
        let title_model = TextModel::from_delta(if title_text.is_empty() {
            crate::delta::Delta::new()
        } else {
            crate::delta::Delta::new().insert(title_text)
        });
        let title = tree.alloc(
            Node::new(TITLE_BLOCK_TYPE, id_gen.next_block_id())
                .with_attribute(TEXT_CONTENT_ATTR, AttrValue::Text(title_model)),
        );
        let body = tree.alloc(Node::new(BODY_TYPE, BODY_TYPE));
        tree.insert_child_at(root, 0, title);
        tree.insert_child_at(root, 1, body);
        Document { tree, root, title, body }
    }

    pub(crate) fn from_parts(tree: DocTree, root: NodeKey, title: NodeKey, body: NodeKey) -> Self {
        Document { tree, root, title, body }
    }

    pub fn tree(&self) -> &DocTree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut DocTree {
        &mut self.tree
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn title(&self) -> NodeKey {
        self.title
    }

    pub fn body(&self) -> NodeKey {
        self.body
    }

    /// Body children in document order.
    pub fn body_blocks(&self) -> &[NodeKey] {
        self.tree.children(self.body)
    }

    pub fn path_of(&self, key: NodeKey) -> Option<Location> {
        self.tree.path_of(self.root, key)
    }

    pub fn node_at(&self, location: &Location) -> Option<NodeKey> {
        self.tree.node_at(self.root, location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_document_shape() {
        let ids = IdGenerator::new();
        let doc = Document::new(&ids, "My note");

        let root = doc.tree().node(doc.root()).unwrap();
        assert_eq!(root.ty(), "document");
        assert_eq!(root.children().len(), 2);
        assert_eq!(root.children()[0], doc.title());
        assert_eq!(root.children()[1], doc.body());

        let title = doc.tree().node(doc.title()).unwrap();
        assert_eq!(title.ty(), "Title");
        assert!(title.is_block());
        assert_eq!(title.text_content().unwrap().text(), "My note");

        let body = doc.tree().node(doc.body()).unwrap();
        assert_eq!(body.ty(), "body");
        assert!(!body.is_block());
        assert!(doc.body_blocks().is_empty());
    }

    #[test]
    fn test_path_of_and_node_at_round_trip() {
        let ids = IdGenerator::new();
        let mut doc = Document::new(&ids, "t");
        let body = doc.body();
        let block = doc
            .tree_mut()
            .alloc(Node::new("Text", ids.next_block_id()));
        doc.tree_mut().insert_child_at(body, 0, block);

        let path = doc.path_of(block).unwrap();
        assert_eq!(path, Location::from_indices([1, 0]));
        assert_eq!(doc.node_at(&path), Some(block));

        // A trailing attribute key resolves to the carrying node.
        let attr_path = path.attribute(TEXT_CONTENT_ATTR);
        assert_eq!(doc.node_at(&attr_path), Some(block));
    }

    #[test]
    fn test_detach_keeps_subtree_readable_until_release() {
        let ids = IdGenerator::new();
        let mut doc = Document::new(&ids, "t");
        let body = doc.body();
        let block = doc.tree_mut().alloc(Node::new("Text", ids.next_block_id()));
        doc.tree_mut().insert_child_at(body, 0, block);

        let index = doc.tree_mut().detach(block);
        assert_eq!(index, Some(0));
        assert!(doc.tree().is_alive(block));
        assert_eq!(doc.tree().parent(block), None);

        doc.tree_mut().release(block);
        assert!(!doc.tree().is_alive(block));
    }

    #[test]
    fn test_release_reclaims_nested_slots() {
        let ids = IdGenerator::new();
        let mut tree = DocTree::new();
        let parent = tree.alloc(Node::new("Text", ids.next_block_id()));
        let child = tree.alloc(Node::new("Text", ids.next_block_id()));
        tree.insert_child_at(parent, 0, child);

        tree.release(parent);
        assert!(!tree.is_alive(parent));
        assert!(!tree.is_alive(child));

        // Freed slots are reused for later allocations.
        let reused = tree.alloc(Node::new("Text", ids.next_block_id()));
        assert!(reused == parent || reused == child);
    }

    #[test]
    fn test_descendants_in_document_order() {
        let ids = IdGenerator::new();
        let mut tree = DocTree::new();
        let a = tree.alloc(Node::new("Text", "blk-a"));
        let b = tree.alloc(Node::new("Text", "blk-b"));
        let c = tree.alloc(Node::new("Text", "blk-c"));
        tree.insert_child_at(a, 0, b);
        tree.insert_child_at(a, 1, c);
        let _ = ids;

        let order: Vec<&str> = tree
            .descendants(a)
            .into_iter()
            .map(|k| tree.node(k).unwrap().id())
            .collect();
        assert_eq!(order, vec!["blk-a", "blk-b", "blk-c"]);
    }
}
