//! The built-in Title and Text blocks.
//!
//! Both carry rich text under `textContent` and share one runtime; the
//! Text block additionally distinguishes visual variants through the
//! `textType` attribute and claims the common block-level tags on paste.

use std::rc::Rc;

use serde_json::json;
use tabula_dom::{DomId, DomPoint, DomSelection, DomTree};

use crate::changeset::Changeset;
use crate::convert::read_inline_delta;
use crate::json::NodeData;
use crate::model::tree::{TEXT_BLOCK_TYPE, TEXT_CONTENT_ATTR, TEXT_TYPE_ATTR, TITLE_BLOCK_TYPE};
use crate::model::{Cursor, Node, NodeKey};
use crate::registry::{Block, BlockDefinition, PasteEvent, SpanRegistry};

/// Values of the `textType` attribute.
pub mod text_type {
    pub const NORMAL: &str = "normal";
    pub const HEADING1: &str = "heading1";
    pub const HEADING2: &str = "heading2";
    pub const HEADING3: &str = "heading3";
    pub const BULLETED: &str = "bulleted";
    pub const QUOTE: &str = "quote";
}

/// Class carried by the element inside a block that holds its rendered
/// text; selection mapping and input diffing walk under it.
pub const CONTENT_CLASS: &str = "tabula-block-content";

/// The element inside a mounted block that holds its rendered content.
pub fn content_container(tree: &DomTree, element: DomId) -> DomId {
    tree.children(element)
        .iter()
        .copied()
        .find(|&c| tree.attr_has_token(c, "class", CONTENT_CLASS))
        .unwrap_or(element)
}

/// Map a character offset to a DOM point under `root`: the text node
/// containing the offset, clamped to the end of the last text leaf. An
/// element point at 0 stands in for empty content.
pub fn dom_point_at_offset(tree: &DomTree, root: DomId, offset: usize) -> (DomId, usize) {
    let mut remaining = offset;
    let mut last_text: Option<(DomId, usize)> = None;
    for id in tree.descendants(root) {
        if let Some(text) = tree.text(id) {
            let len = text.chars().count();
            if remaining <= len {
                return (id, remaining);
            }
            remaining -= len;
            last_text = Some((id, len));
        }
    }
    last_text.unwrap_or((root, 0))
}

pub struct TextBlockDefinition {
    spans: Rc<SpanRegistry>,
}

impl TextBlockDefinition {
    pub fn new(spans: Rc<SpanRegistry>) -> Self {
        TextBlockDefinition { spans }
    }
}

impl Default for TextBlockDefinition {
    fn default() -> Self {
        TextBlockDefinition::new(Rc::new(SpanRegistry::with_defaults()))
    }
}

impl BlockDefinition for TextBlockDefinition {
    fn name(&self) -> &str {
        TEXT_BLOCK_TYPE
    }

    fn text_content_attribute(&self) -> Option<&str> {
        Some(TEXT_CONTENT_ATTR)
    }

    fn on_block_created(&self, _block: &Node) -> Box<dyn Block> {
        Box::new(TextBlock {
            spans: Rc::clone(&self.spans),
        })
    }

    fn wants_paste_element(&self, tree: &DomTree, element: DomId) -> bool {
        matches!(
            tree.tag(element),
            Some("p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" | "blockquote")
        )
    }

    fn on_paste(&self, event: &PasteEvent<'_>) -> Option<NodeData> {
        let text_type = match event.tree.tag(event.element)? {
            "h1" => Some(text_type::HEADING1),
            "h2" => Some(text_type::HEADING2),
            "h3" | "h4" | "h5" | "h6" => Some(text_type::HEADING3),
            "li" => Some(text_type::BULLETED),
            "blockquote" => Some(text_type::QUOTE),
            _ => None,
        };
        let children: Vec<DomId> = event.tree.children(event.element).to_vec();
        let delta = read_inline_delta(event.tree, &children, event.spans);

        let mut data = NodeData::new(TEXT_BLOCK_TYPE, event.ids.next_block_id())
            .with_text(TEXT_CONTENT_ATTR, &delta);
        if let Some(text_type) = text_type {
            data = data.with_attribute(TEXT_TYPE_ATTR, json!(text_type));
        }
        Some(data)
    }
}

pub struct TitleBlockDefinition {
    spans: Rc<SpanRegistry>,
}

impl TitleBlockDefinition {
    pub fn new(spans: Rc<SpanRegistry>) -> Self {
        TitleBlockDefinition { spans }
    }
}

impl Default for TitleBlockDefinition {
    fn default() -> Self {
        TitleBlockDefinition::new(Rc::new(SpanRegistry::with_defaults()))
    }
}

impl BlockDefinition for TitleBlockDefinition {
    fn name(&self) -> &str {
        TITLE_BLOCK_TYPE
    }

    fn text_content_attribute(&self) -> Option<&str> {
        Some(TEXT_CONTENT_ATTR)
    }

    fn on_block_created(&self, _block: &Node) -> Box<dyn Block> {
        Box::new(TextBlock {
            spans: Rc::clone(&self.spans),
        })
    }
}

/// Shared runtime for text-like blocks: selection mapping by text-leaf walk
/// and content reconciliation by cursor-hinted diffing.
pub struct TextBlock {
    spans: Rc<SpanRegistry>,
}

impl Block for TextBlock {
    fn block_focused(
        &mut self,
        tree: &DomTree,
        element: DomId,
        cursor: &Cursor,
    ) -> Option<DomSelection> {
        let content = content_container(tree, element);
        let (node, offset) = dom_point_at_offset(tree, content, cursor.start_offset());
        Some(DomSelection::caret(DomPoint::new(node, offset)))
    }

    fn block_content_changed(
        &mut self,
        tree: &DomTree,
        element: DomId,
        block_key: NodeKey,
        block: &Node,
        offset_hint: Option<usize>,
        changeset: &mut Changeset,
    ) {
        let Some(model) = block.text_content() else {
            return;
        };
        let content = content_container(tree, element);
        let children: Vec<DomId> = tree.children(content).to_vec();
        let dom_delta = read_inline_delta(tree, &children, &self.spans);

        let diff = model.delta().diff(&dom_delta, offset_hint);
        if diff.ops().is_empty() {
            return;
        }
        changeset.text_edit(block_key, TEXT_CONTENT_ATTR, move |_| diff);
    }

    fn get_cursor_dom_by_offset(
        &self,
        tree: &DomTree,
        element: DomId,
        offset: usize,
    ) -> Option<(DomId, usize)> {
        let content = content_container(tree, element);
        Some(dom_point_at_offset(tree, content, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mounted_block(tree: &mut DomTree, text_runs: &[&str]) -> (DomId, DomId) {
        let block = tree.create_element("div");
        let content = tree.create_element("div");
        tree.set_attribute(content, "class", CONTENT_CLASS);
        tree.append_child(tree.root(), block);
        tree.append_child(block, content);
        for run in text_runs {
            let t = tree.create_text(run);
            tree.append_child(content, t);
        }
        (block, content)
    }

    #[test]
    fn test_dom_point_at_offset_walks_runs() {
        let mut tree = DomTree::new("div");
        let (_, content) = mounted_block(&mut tree, &["ab", "cde"]);
        let runs: Vec<DomId> = tree.children(content).to_vec();

        assert_eq!(dom_point_at_offset(&tree, content, 0), (runs[0], 0));
        assert_eq!(dom_point_at_offset(&tree, content, 2), (runs[0], 2));
        assert_eq!(dom_point_at_offset(&tree, content, 4), (runs[1], 2));
        // Past the end clamps to the last text node.
        assert_eq!(dom_point_at_offset(&tree, content, 99), (runs[1], 3));
    }

    #[test]
    fn test_dom_point_in_empty_block_is_the_container() {
        let mut tree = DomTree::new("div");
        let (_, content) = mounted_block(&mut tree, &[]);
        assert_eq!(dom_point_at_offset(&tree, content, 0), (content, 0));
    }

    #[test]
    fn test_block_focused_places_caret() {
        let mut tree = DomTree::new("div");
        let (block, content) = mounted_block(&mut tree, &["hello"]);
        let text = tree.children(content)[0];

        let mut runtime = TextBlock { spans: Rc::new(SpanRegistry::with_defaults()) };
        let selection = runtime
            .block_focused(&tree, block, &Cursor::collapsed("blk-1", 3))
            .unwrap();
        assert!(selection.is_caret());
        assert_eq!(selection.anchor, DomPoint::new(text, 3));
    }

    #[test]
    fn test_text_paste_handler_maps_tags() {
        use crate::ids::IdGenerator;

        let mut tree = DomTree::new("body");
        let h2 = tree.create_element("h2");
        let text = tree.create_text("Heading");
        tree.append_child(tree.root(), h2);
        tree.append_child(h2, text);

        let ids = IdGenerator::new();
        let spans = SpanRegistry::with_defaults();
        let definition = TextBlockDefinition::default();
        let event = PasteEvent { tree: &tree, element: h2, ids: &ids, spans: &spans };

        let data = definition.on_paste(&event).unwrap();
        assert_eq!(data.t, "Text");
        assert_eq!(data.attributes.get(TEXT_TYPE_ATTR), Some(&json!("heading2")));
        assert_eq!(
            data.text_attribute(TEXT_CONTENT_ATTR).unwrap(),
            crate::delta::Delta::new().insert("Heading")
        );
    }
}
