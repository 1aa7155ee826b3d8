//! Pluggable catalogs the core consumes: block definitions, span styles and
//! embed kinds. Registries are filled while the controller is constructed
//! and sealed before the first changeset applies; registration afterwards
//! is an error.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use tabula_dom::{DomId, DomSelection, DomTree};

use crate::changeset::Changeset;
use crate::error::EngineError;
use crate::ids::IdGenerator;
use crate::json::NodeData;
use crate::model::{Cursor, Node, NodeKey};

/// What a block plugin supplies: identity, capabilities and a factory for
/// per-instance runtime behavior.
pub trait BlockDefinition {
    fn name(&self) -> &str;

    fn editable(&self) -> bool {
        true
    }

    /// The attribute under which instances carry rich text, if this is a
    /// text-like block.
    fn text_content_attribute(&self) -> Option<&str> {
        None
    }

    /// Instantiate the runtime for a block entering the document.
    fn on_block_created(&self, block: &Node) -> Box<dyn Block>;

    /// Claimant probe for pasted inline elements.
    fn wants_paste_element(&self, _tree: &DomTree, _element: DomId) -> bool {
        false
    }

    /// Convert a pasted block-level element into a node. `None` defers to
    /// the default text conversion.
    fn on_paste(&self, _event: &PasteEvent<'_>) -> Option<NodeData> {
        None
    }
}

/// Context handed to [`BlockDefinition::on_paste`].
pub struct PasteEvent<'a> {
    pub tree: &'a DomTree,
    pub element: DomId,
    pub ids: &'a IdGenerator,
    pub spans: &'a SpanRegistry,
}

/// Per-instance runtime contract: DOM lifecycle, selection mapping and
/// content reconciliation. All methods have workable defaults for blocks
/// rendered by the stock text renderer.
pub trait Block {
    fn block_did_mount(&mut self, _tree: &DomTree, _element: DomId) {}

    fn block_will_unmount(&mut self, _tree: &DomTree, _element: DomId) {}

    /// Place the browser selection for a cursor landing in this block.
    /// `element` is the block's mounted DOM element.
    fn block_focused(
        &mut self,
        _tree: &DomTree,
        _element: DomId,
        _cursor: &Cursor,
    ) -> Option<DomSelection> {
        None
    }

    /// Reconcile DOM text back into the model after an `input` event by
    /// recording text edits on `changeset`.
    fn block_content_changed(
        &mut self,
        _tree: &DomTree,
        _element: DomId,
        _block_key: NodeKey,
        _block: &Node,
        _offset_hint: Option<usize>,
        _changeset: &mut Changeset,
    ) {
    }

    /// Map a DOM point inside this block to an absolute character offset.
    /// The default walks the block's leaves, summing the text lengths of
    /// preceding text nodes; non-text leaves contribute zero.
    fn find_text_offset_in_block(
        &self,
        tree: &DomTree,
        element: DomId,
        focused: DomId,
        offset_in_node: usize,
    ) -> usize {
        find_text_offset(tree, element, focused, offset_in_node)
    }

    /// Map a character offset to a DOM point, for blocks whose rendering
    /// the default walk cannot invert.
    fn get_cursor_dom_by_offset(
        &self,
        _tree: &DomTree,
        _element: DomId,
        _offset: usize,
    ) -> Option<(DomId, usize)> {
        None
    }
}

/// Default DOM-point-to-offset mapping: document-order walk over the
/// block's leaves, counting characters of text nodes before the target.
pub fn find_text_offset(
    tree: &DomTree,
    element: DomId,
    focused: DomId,
    offset_in_node: usize,
) -> usize {
    let mut offset = 0;
    for id in tree.descendants(element) {
        if id == focused {
            if tree.node(id).is_some_and(|n| n.is_text()) {
                offset += offset_in_node;
            }
            return offset;
        }
        if let Some(text) = tree.text(id) {
            offset += text.chars().count();
        }
    }
    offset
}

/// `name → definition` catalog of block types.
pub struct BlockRegistry {
    definitions: RefCell<HashMap<String, Rc<dyn BlockDefinition>>>,
    sealed: Cell<bool>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        BlockRegistry {
            definitions: RefCell::new(HashMap::new()),
            sealed: Cell::new(false),
        }
    }

    pub fn register(&self, definition: Rc<dyn BlockDefinition>) -> Result<(), EngineError> {
        if self.sealed.get() {
            return Err(EngineError::RegistrySealed);
        }
        let name = definition.name().to_string();
        let mut definitions = self.definitions.borrow_mut();
        if definitions.contains_key(&name) {
            return Err(EngineError::DuplicateBlockType(name));
        }
        definitions.insert(name, definition);
        Ok(())
    }

    pub fn seal(&self) {
        self.sealed.set(true);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.get()
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn BlockDefinition>> {
        self.definitions.borrow().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.borrow().contains_key(name)
    }

    /// The definition claiming a pasted element. Probing runs in name
    /// order so the winner is deterministic.
    pub fn paste_claimant(&self, tree: &DomTree, element: DomId) -> Option<Rc<dyn BlockDefinition>> {
        let definitions = self.definitions.borrow();
        let mut names: Vec<&String> = definitions.keys().collect();
        names.sort();
        for name in names {
            let definition = &definitions[name];
            if definition.wants_paste_element(tree, element) {
                return Some(Rc::clone(definition));
            }
        }
        None
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        BlockRegistry::new()
    }
}

/// A registered inline style: the attribute name spans carry and the CSS
/// class the renderer emits for it (also used to map classes back on
/// paste).
#[derive(Debug, Clone, PartialEq)]
pub struct SpanStyle {
    pub attribute: String,
    pub class_name: String,
}

pub struct SpanRegistry {
    styles: RefCell<Vec<SpanStyle>>,
    sealed: Cell<bool>,
}

impl SpanRegistry {
    pub fn new() -> Self {
        SpanRegistry {
            styles: RefCell::new(Vec::new()),
            sealed: Cell::new(false),
        }
    }

    /// The stock styles every editor carries.
    pub fn with_defaults() -> Self {
        let registry = SpanRegistry::new();
        for (attribute, class_name) in [
            ("bold", "tabula-bold"),
            ("italic", "tabula-italic"),
            ("underline", "tabula-underline"),
            ("strikethrough", "tabula-strikethrough"),
        ] {
            // A fresh registry is never sealed.
            let _ = registry.register(SpanStyle {
                attribute: attribute.to_string(),
                class_name: class_name.to_string(),
            });
        }
        registry
    }

    pub fn register(&self, style: SpanStyle) -> Result<(), EngineError> {
        if self.sealed.get() {
            return Err(EngineError::RegistrySealed);
        }
        self.styles.borrow_mut().push(style);
        Ok(())
    }

    pub fn seal(&self) {
        self.sealed.set(true);
    }

    pub fn class_for(&self, attribute: &str) -> Option<String> {
        self.styles
            .borrow()
            .iter()
            .find(|s| s.attribute == attribute)
            .map(|s| s.class_name.clone())
    }

    pub fn attribute_for_class(&self, class_name: &str) -> Option<String> {
        self.styles
            .borrow()
            .iter()
            .find(|s| s.class_name == class_name)
            .map(|s| s.attribute.clone())
    }
}

impl Default for SpanRegistry {
    fn default() -> Self {
        SpanRegistry::with_defaults()
    }
}

/// What an embed plugin supplies: the object key it owns and a plain-text
/// rendering for clipboard fallbacks.
pub trait EmbedDefinition {
    fn kind(&self) -> &str;

    fn plain_text(&self, _value: &Value) -> String {
        String::new()
    }
}

pub struct EmbedRegistry {
    definitions: RefCell<HashMap<String, Rc<dyn EmbedDefinition>>>,
    sealed: Cell<bool>,
}

impl EmbedRegistry {
    pub fn new() -> Self {
        EmbedRegistry {
            definitions: RefCell::new(HashMap::new()),
            sealed: Cell::new(false),
        }
    }

    pub fn register(&self, definition: Rc<dyn EmbedDefinition>) -> Result<(), EngineError> {
        if self.sealed.get() {
            return Err(EngineError::RegistrySealed);
        }
        let kind = definition.kind().to_string();
        self.definitions.borrow_mut().insert(kind, definition);
        Ok(())
    }

    pub fn seal(&self) {
        self.sealed.set(true);
    }

    pub fn get(&self, kind: &str) -> Option<Rc<dyn EmbedDefinition>> {
        self.definitions.borrow().get(kind).cloned()
    }
}

impl Default for EmbedRegistry {
    fn default() -> Self {
        EmbedRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Dummy(&'static str);
    struct DummyBlock;
    impl Block for DummyBlock {}
    impl BlockDefinition for Dummy {
        fn name(&self) -> &str {
            self.0
        }
        fn on_block_created(&self, _block: &Node) -> Box<dyn Block> {
            Box::new(DummyBlock)
        }
    }

    #[test]
    fn test_register_and_seal() {
        let registry = BlockRegistry::new();
        registry.register(Rc::new(Dummy("Text"))).unwrap();
        assert!(registry.contains("Text"));

        registry.seal();
        let err = registry.register(Rc::new(Dummy("Image"))).unwrap_err();
        assert!(matches!(err, EngineError::RegistrySealed));
        assert!(!registry.contains("Image"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = BlockRegistry::new();
        registry.register(Rc::new(Dummy("Text"))).unwrap();
        let err = registry.register(Rc::new(Dummy("Text"))).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateBlockType(name) if name == "Text"));
    }

    #[test]
    fn test_span_registry_maps_both_ways() {
        let spans = SpanRegistry::with_defaults();
        assert_eq!(spans.class_for("bold").as_deref(), Some("tabula-bold"));
        assert_eq!(spans.attribute_for_class("tabula-italic").as_deref(), Some("italic"));
        assert_eq!(spans.class_for("href"), None);
    }

    #[test]
    fn test_find_text_offset_walks_leaves() {
        let mut tree = DomTree::new("div");
        let block = tree.create_element("div");
        let first = tree.create_text("ab");
        let span = tree.create_element("span");
        let second = tree.create_text("cde");
        tree.append_child(tree.root(), block);
        tree.append_child(block, first);
        tree.append_child(block, span);
        tree.append_child(span, second);

        assert_eq!(find_text_offset(&tree, block, first, 1), 1);
        assert_eq!(find_text_offset(&tree, block, second, 2), 4);
        // Element targets count preceding text only.
        assert_eq!(find_text_offset(&tree, block, span, 0), 2);
    }
}
