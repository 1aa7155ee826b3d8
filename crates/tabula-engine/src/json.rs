//! JSON node serialization: `{ "t": ..., "id": ..., "attributes": {...},
//! "children": [...] }` with text models stored as `{ "ops": [...] }` under
//! their attribute slot. This format feeds copy/paste (`data-content`),
//! persistence, and the children payloads of structural changeset ops.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::delta::Delta;
use crate::error::EngineError;
use crate::ids::{is_block_id, IdGenerator};
use crate::model::tree::{AttrValue, DocTree, Document, Node, NodeKey, BODY_TYPE, DOCUMENT_TYPE};
use crate::model::TextModel;

/// A serialized node subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub t: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeData>,
}

impl NodeData {
    pub fn new(t: impl Into<String>, id: impl Into<String>) -> Self {
        NodeData {
            t: t.into(),
            id: id.into(),
            attributes: Map::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    /// Store a document delta under `key` in the `{ "ops": [...] }` form.
    pub fn with_text(mut self, key: &str, delta: &Delta) -> Self {
        self.attributes.insert(key.to_string(), wrap_delta(delta));
        self
    }

    pub fn with_children(mut self, children: Vec<NodeData>) -> Self {
        self.children = children;
        self
    }

    /// Read back a `{ "ops": [...] }` attribute as a delta.
    pub fn text_attribute(&self, key: &str) -> Option<Delta> {
        unwrap_delta(self.attributes.get(key)?)
    }

    /// Serialize a live subtree.
    pub fn from_node(tree: &DocTree, key: NodeKey) -> Option<NodeData> {
        let node = tree.node(key)?;
        let mut attributes = Map::new();
        for (name, value) in node.attributes() {
            attributes.insert(name.clone(), attr_to_json(value));
        }
        let children = node
            .children()
            .iter()
            .filter_map(|&child| NodeData::from_node(tree, child))
            .collect();
        Some(NodeData {
            t: node.ty().to_string(),
            id: node.id().to_string(),
            attributes,
            children,
        })
    }

    /// Build the subtree into the arena, returning the detached root key.
    pub fn instantiate(&self, tree: &mut DocTree) -> NodeKey {
        let mut node = Node::new(self.t.as_str(), self.id.as_str());
        for (name, value) in &self.attributes {
            node.attributes.insert(name.clone(), attr_from_json(value));
        }
        let key = tree.alloc(node);
        for (index, child) in self.children.iter().enumerate() {
            let child_key = child.instantiate(tree);
            tree.insert_child_at(key, index, child_key);
        }
        key
    }

    /// Deep copy with freshly minted block ids, used when pasting content
    /// that was copied out of this or another document.
    pub fn clone_with_new_ids(&self, ids: &IdGenerator) -> NodeData {
        let id = if is_block_id(&self.id) || self.t.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            ids.next_block_id()
        } else {
            self.id.clone()
        };
        NodeData {
            t: self.t.clone(),
            id,
            attributes: self.attributes.clone(),
            children: self
                .children
                .iter()
                .map(|child| child.clone_with_new_ids(ids))
                .collect(),
        }
    }
}

fn wrap_delta(delta: &Delta) -> Value {
    let ops = serde_json::to_value(delta).unwrap_or(Value::Array(Vec::new()));
    let mut map = Map::new();
    map.insert("ops".to_string(), ops);
    Value::Object(map)
}

fn unwrap_delta(value: &Value) -> Option<Delta> {
    let ops = value.as_object()?.get("ops")?;
    serde_json::from_value(ops.clone()).ok()
}

/// `{ "ops": [...] }` objects round-trip as text models; everything else is
/// plain JSON.
pub(crate) fn attr_from_json(value: &Value) -> AttrValue {
    match unwrap_delta(value) {
        Some(delta) if delta.is_document() => AttrValue::Text(TextModel::from_delta(delta)),
        _ => AttrValue::Json(value.clone()),
    }
}

pub(crate) fn attr_to_json(value: &AttrValue) -> Value {
    match value {
        AttrValue::Json(v) => v.clone(),
        AttrValue::Text(model) => wrap_delta(model.delta()),
    }
}

/// Serialize a whole document.
pub fn document_to_data(document: &Document) -> NodeData {
    NodeData::from_node(document.tree(), document.root())
        .unwrap_or_else(|| NodeData::new(DOCUMENT_TYPE, DOCUMENT_TYPE))
}

/// Rebuild a document from its serialized form. The root must carry the
/// title/body pair in order.
pub fn document_from_data(data: &NodeData) -> Result<Document, EngineError> {
    if data.t != DOCUMENT_TYPE {
        return Err(EngineError::MalformedDocument(format!(
            "expected root type {DOCUMENT_TYPE:?}, got {:?}",
            data.t
        )));
    }
    if data.children.len() != 2 || data.children[1].t != BODY_TYPE {
        return Err(EngineError::MalformedDocument(
            "document root must have a title and a body child".to_string(),
        ));
    }
    let mut tree = DocTree::new();
    let root = data.instantiate(&mut tree);
    let title = tree.children(root)[0];
    let body = tree.children(root)[1];
    Ok(Document::from_parts(tree, root, title, body))
}
