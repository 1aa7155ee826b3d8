//! Clipboard HTML to block elements.
//!
//! The converter walks the parsed fragment with two handlers, per the paste
//! contract: runs of inline nodes go through the *leaf* handler (claimant
//! probe, then the default Text aggregation of each child's text and span
//! attributes), and block-level elements go through the *div* handler
//! (`data-type`/`data-content` round-trip for content copied out of this
//! editor, otherwise the claiming block definition's own paste handler).

use std::rc::Rc;

use serde_json::json;
use tabula_dom::{parse_fragment, DomId, DomTree};

use crate::delta::attributes::AttributeMap;
use crate::delta::{Delta, DeltaOp};
use crate::error::EngineError;
use crate::ids::IdGenerator;
use crate::json::NodeData;
use crate::model::tree::{TEXT_BLOCK_TYPE, TEXT_CONTENT_ATTR};
use crate::registry::{BlockRegistry, PasteEvent, SpanRegistry};
use crate::state::warn_unknown_block;

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "div", "dl", "figure", "footer", "h1", "h2",
    "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section",
    "table", "ul",
];

fn is_block_tag(tag: &str) -> bool {
    BLOCK_TAGS.iter().any(|t| tag.eq_ignore_ascii_case(t))
}

pub struct HtmlConverter {
    ids: Rc<IdGenerator>,
    blocks: Rc<BlockRegistry>,
    spans: Rc<SpanRegistry>,
}

impl HtmlConverter {
    pub fn new(ids: Rc<IdGenerator>, blocks: Rc<BlockRegistry>, spans: Rc<SpanRegistry>) -> Self {
        HtmlConverter { ids, blocks, spans }
    }

    /// Parse clipboard HTML into a sequence of block elements ready for
    /// insertion. Unparseable HTML is an error so the caller can fall back
    /// to the plain-text clipboard flavor.
    pub fn parse_html(&self, html: &str) -> Result<Vec<NodeData>, EngineError> {
        let mut tree = DomTree::new("body");
        let roots = parse_fragment(&mut tree, html)?;
        Ok(self.convert_children(&tree, &roots))
    }

    /// Convert a sibling list: inline runs through the leaf handler,
    /// block-level elements through the div handler.
    pub fn convert_children(&self, tree: &DomTree, nodes: &[DomId]) -> Vec<NodeData> {
        let mut out = Vec::new();
        let mut inline_run: Vec<DomId> = Vec::new();

        for &id in nodes {
            let block_level = tree
                .tag(id)
                .map(is_block_tag)
                .unwrap_or(false);
            if block_level {
                if let Some(element) = self.convert_leaf_run(tree, &inline_run) {
                    out.push(element);
                }
                inline_run.clear();
                out.extend(self.convert_block_element(tree, id));
            } else {
                // Whitespace between block elements is formatting noise.
                let is_blank_text = tree
                    .text(id)
                    .is_some_and(|t| t.trim().is_empty());
                if !(inline_run.is_empty() && is_blank_text) {
                    inline_run.push(id);
                }
            }
        }
        if let Some(element) = self.convert_leaf_run(tree, &inline_run) {
            out.push(element);
        }
        out
    }

    /// Leaf handler: a claimant block may take an element of the run;
    /// otherwise the run aggregates into one Text block.
    fn convert_leaf_run(&self, tree: &DomTree, run: &[DomId]) -> Option<NodeData> {
        if run.is_empty() {
            return None;
        }
        for &id in run {
            if tree.node(id).is_some_and(|n| n.is_element()) {
                if let Some(definition) = self.blocks.paste_claimant(tree, id) {
                    let event = PasteEvent {
                        tree,
                        element: id,
                        ids: &self.ids,
                        spans: &self.spans,
                    };
                    if let Some(converted) = definition.on_paste(&event) {
                        return self.validated(converted);
                    }
                }
            }
        }
        let delta = read_inline_delta(tree, run, &self.spans);
        if delta.is_empty() {
            return None;
        }
        Some(
            NodeData::new(TEXT_BLOCK_TYPE, self.ids.next_block_id())
                .with_text(TEXT_CONTENT_ATTR, &delta),
        )
    }

    /// Div handler: self-copied elements deserialize from `data-content`
    /// with fresh ids; list containers flatten into their items; everything
    /// else goes to the claiming definition's paste handler, defaulting to
    /// a Text conversion of the inline content.
    fn convert_block_element(&self, tree: &DomTree, element: DomId) -> Vec<NodeData> {
        let tag = tree.tag(element).unwrap_or("");

        if let (Some(data_type), Some(data_content)) = (
            tree.attribute(element, "data-type"),
            tree.attribute(element, "data-content"),
        ) {
            if !self.blocks.contains(data_type) {
                warn_unknown_block(data_type);
                return Vec::new();
            }
            match serde_json::from_str::<NodeData>(data_content) {
                Ok(parsed) => return self.validated(parsed.clone_with_new_ids(&self.ids)).into_iter().collect(),
                Err(error) => {
                    tracing::warn!(%error, "dropping pasted element with malformed data-content");
                    return Vec::new();
                }
            }
        }

        if tag.eq_ignore_ascii_case("ul") || tag.eq_ignore_ascii_case("ol") {
            let items: Vec<DomId> = tree
                .children(element)
                .iter()
                .copied()
                .filter(|&c| tree.tag(c).is_some_and(|t| t.eq_ignore_ascii_case("li")))
                .collect();
            return items
                .iter()
                .flat_map(|&li| self.convert_block_element(tree, li))
                .collect();
        }

        if let Some(definition) = self.blocks.paste_claimant(tree, element) {
            let event = PasteEvent {
                tree,
                element,
                ids: &self.ids,
                spans: &self.spans,
            };
            if let Some(converted) = definition.on_paste(&event) {
                return self.validated(converted).into_iter().collect();
            }
        }

        // Unclaimed containers recurse; a purely inline body becomes one
        // Text block.
        let children: Vec<DomId> = tree.children(element).to_vec();
        let has_block_children = children
            .iter()
            .any(|&c| tree.tag(c).map(is_block_tag).unwrap_or(false));
        if has_block_children {
            self.convert_children(tree, &children)
        } else {
            self.convert_leaf_run(tree, &children).into_iter().collect()
        }
    }

    fn validated(&self, element: NodeData) -> Option<NodeData> {
        if self.blocks.contains(&element.t) {
            Some(element)
        } else {
            warn_unknown_block(&element.t);
            None
        }
    }
}

/// Aggregate inline DOM content into a document delta, resolving styles
/// from tags, span-registry classes and `href`/`data-href` attributes.
pub fn read_inline_delta(tree: &DomTree, nodes: &[DomId], spans: &SpanRegistry) -> Delta {
    let mut out = Delta::new();
    for &id in nodes {
        read_inline_node(tree, id, &AttributeMap::new(), spans, &mut out);
    }
    out
}

fn read_inline_node(
    tree: &DomTree,
    id: DomId,
    inherited: &AttributeMap,
    spans: &SpanRegistry,
    out: &mut Delta,
) {
    if let Some(text) = tree.text(id) {
        if text.is_empty() {
            return;
        }
        let attributes = (!inherited.is_empty()).then(|| inherited.clone());
        out.push(DeltaOp::Insert {
            value: crate::delta::InsertValue::Text(text.to_string()),
            attributes,
        });
        return;
    }

    let Some(tag) = tree.tag(id) else {
        return;
    };
    let mut attributes = inherited.clone();
    match tag {
        "strong" | "b" => {
            attributes.insert("bold".to_string(), json!(true));
        }
        "em" | "i" => {
            attributes.insert("italic".to_string(), json!(true));
        }
        "u" => {
            attributes.insert("underline".to_string(), json!(true));
        }
        "s" | "del" | "strike" => {
            attributes.insert("strikethrough".to_string(), json!(true));
        }
        // Line breaks have no representation inside a single-line rich run.
        "br" => return,
        _ => {}
    }
    if let Some(class) = tree.attribute(id, "class") {
        for token in class.split_whitespace() {
            if let Some(attribute) = spans.attribute_for_class(token) {
                attributes.insert(attribute, json!(true));
            }
        }
    }
    let href = tree
        .attribute(id, "data-href")
        .or_else(|| (tag == "a").then(|| tree.attribute(id, "href")).flatten());
    if let Some(href) = href {
        attributes.insert("href".to_string(), json!(href));
    }

    let children: Vec<DomId> = tree.children(id).to_vec();
    for child in children {
        read_inline_node(tree, child, &attributes, spans, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{TextBlockDefinition, TitleBlockDefinition};
    use pretty_assertions::assert_eq;

    fn converter() -> HtmlConverter {
        let ids = Rc::new(IdGenerator::new());
        let spans = Rc::new(SpanRegistry::with_defaults());
        let blocks = Rc::new(BlockRegistry::new());
        blocks
            .register(Rc::new(TextBlockDefinition::new(Rc::clone(&spans))))
            .unwrap();
        blocks
            .register(Rc::new(TitleBlockDefinition::new(Rc::clone(&spans))))
            .unwrap();
        blocks.seal();
        HtmlConverter::new(ids, blocks, spans)
    }

    #[test]
    fn test_paragraphs_become_text_blocks() {
        let c = converter();
        let out = c.parse_html("<p>one</p>\n<p>two</p>").unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].t, "Text");
        assert_eq!(out[0].text_attribute("textContent").unwrap(), Delta::new().insert("one"));
        assert_eq!(out[1].text_attribute("textContent").unwrap(), Delta::new().insert("two"));
    }

    #[test]
    fn test_inline_styles_map_to_attributes() {
        let c = converter();
        let out = c
            .parse_html(r#"<p>a <strong>b</strong> <a href="https://x.test">c</a></p>"#)
            .unwrap();

        let delta = out[0].text_attribute("textContent").unwrap();
        let expected = Delta::new()
            .insert("a ")
            .insert_with("b", crate::delta::attributes::attrs([("bold", json!(true))]))
            .insert(" ")
            .insert_with("c", crate::delta::attributes::attrs([("href", json!("https://x.test"))]));
        assert_eq!(delta, expected);
    }

    #[test]
    fn test_span_classes_resolve_through_registry() {
        let c = converter();
        let out = c
            .parse_html(r#"<p><span class="tabula-italic">x</span></p>"#)
            .unwrap();
        let delta = out[0].text_attribute("textContent").unwrap();
        assert_eq!(
            delta,
            Delta::new().insert_with("x", crate::delta::attributes::attrs([("italic", json!(true))]))
        );
    }

    #[test]
    fn test_headings_carry_text_type() {
        let c = converter();
        let out = c.parse_html("<h1>big</h1><h2>mid</h2><p>body</p>").unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].attributes.get("textType"), Some(&json!("heading1")));
        assert_eq!(out[1].attributes.get("textType"), Some(&json!("heading2")));
        assert_eq!(out[2].attributes.get("textType"), None);
    }

    #[test]
    fn test_lists_flatten_to_bulleted_blocks() {
        let c = converter();
        let out = c.parse_html("<ul><li>a</li><li>b</li></ul>").unwrap();

        assert_eq!(out.len(), 2);
        for element in &out {
            assert_eq!(element.attributes.get("textType"), Some(&json!("bulleted")));
        }
        assert_eq!(out[0].text_attribute("textContent").unwrap(), Delta::new().insert("a"));
    }

    #[test]
    fn test_bare_inline_run_becomes_one_block() {
        let c = converter();
        let out = c.parse_html("loose <em>text</em> run").unwrap();

        assert_eq!(out.len(), 1);
        let delta = out[0].text_attribute("textContent").unwrap();
        assert_eq!(delta.document_text().unwrap(), "loose text run");
    }

    #[test]
    fn test_self_copied_element_reinstantiates_with_fresh_id() {
        let c = converter();
        let inner = NodeData::new("Text", "blk-cafe01")
            .with_text("textContent", &Delta::new().insert("copied"));
        let encoded = serde_json::to_string(&inner).unwrap().replace('"', "&quot;");
        let html = format!(r#"<div data-type="Text" data-content="{encoded}">copied</div>"#);

        let out = c.parse_html(&html).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].t, "Text");
        assert_ne!(out[0].id, "blk-cafe01");
        assert_eq!(
            out[0].text_attribute("textContent").unwrap(),
            Delta::new().insert("copied")
        );
    }

    #[test]
    fn test_unknown_data_type_is_dropped() {
        let c = converter();
        let html = r#"<div data-type="Kanban" data-content="{}">x</div><p>kept</p>"#;
        let out = c.parse_html(html).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text_attribute("textContent").unwrap(), Delta::new().insert("kept"));
    }

    #[test]
    fn test_unterminated_html_is_a_parse_error() {
        let c = converter();
        assert!(matches!(
            c.parse_html("<div class=\"broken"),
            Err(EngineError::ClipboardParse(_))
        ));
    }

    #[test]
    fn test_nested_container_recurses() {
        let c = converter();
        let out = c.parse_html("<div><p>a</p><p>b</p></div>").unwrap();
        assert_eq!(out.len(), 2);
    }
}
