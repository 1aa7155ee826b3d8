//! Pure rendering helpers: text-run projection into span elements and the
//! block content hash used to skip unchanged blocks.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tabula_dom::{DomId, DomTree};
use tabula_engine::delta::attributes::AttributeMap;
use tabula_engine::registry::SpanRegistry;
use tabula_engine::{Delta, DeltaOp, InsertValue, NodeData, Padding};

/// Class carried by every rendered block element.
pub const BLOCK_CLASS: &str = "tabula-block";
/// Class of the embed placeholder spans.
pub const EMBED_CLASS: &str = "tabula-embed";

/// Render a text model's delta as the children of `content`, replacing
/// whatever was there. Attributed runs become `<span>` (or `<a>` for
/// links) with classes resolved through the span registry.
pub fn render_text_content(tree: &mut DomTree, content: DomId, delta: &Delta, spans: &SpanRegistry) {
    tree.clear_children(content);
    for op in delta.ops() {
        let DeltaOp::Insert { value, attributes } = op else {
            continue;
        };
        match value {
            InsertValue::Text(text) => {
                let node = render_text_run(tree, text, attributes.as_ref(), spans);
                tree.append_child(content, node);
            }
            InsertValue::Embed(payload) => {
                let span = tree.create_element("span");
                tree.set_attribute(span, "class", EMBED_CLASS);
                tree.set_attribute(span, "contenteditable", "false");
                if let Ok(encoded) = serde_json::to_string(payload) {
                    tree.set_attribute(span, "data-embed", &encoded);
                }
                let placeholder = tree.create_text("\u{fffc}");
                tree.append_child(span, placeholder);
                tree.append_child(content, span);
            }
        }
    }
}

fn render_text_run(
    tree: &mut DomTree,
    text: &str,
    attributes: Option<&AttributeMap>,
    spans: &SpanRegistry,
) -> DomId {
    let text_node = tree.create_text(text);
    let Some(attributes) = attributes.filter(|a| !a.is_empty()) else {
        return text_node;
    };

    let href = attributes.get("href").and_then(|v| v.as_str());
    let element = if let Some(href) = href {
        let anchor = tree.create_element("a");
        tree.set_attribute(anchor, "href", href);
        tree.set_attribute(anchor, "data-href", href);
        anchor
    } else {
        tree.create_element("span")
    };

    let mut classes: Vec<String> = Vec::new();
    for (key, value) in attributes {
        if key == "href" || value.is_null() || value == &serde_json::Value::Bool(false) {
            continue;
        }
        if let Some(class) = spans.class_for(key) {
            classes.push(class);
        }
    }
    if !classes.is_empty() {
        tree.set_attribute(element, "class", &classes.join(" "));
    }
    tree.append_child(element, text_node);
    element
}

/// Content hash of a serialized block; the renderer skips blocks whose
/// hash is unchanged unless the changeset forced an update.
pub fn block_hash(data: &NodeData) -> u64 {
    let mut hasher = DefaultHasher::new();
    serde_json::to_string(data).unwrap_or_default().hash(&mut hasher);
    hasher.finish()
}

/// Inline style for the configured padding, `None` when every side keeps
/// the default.
pub fn padding_style(padding: &Padding) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(top) = padding.top {
        parts.push(format!("padding-top:{top}px"));
    }
    if let Some(right) = padding.right {
        parts.push(format!("padding-right:{right}px"));
    }
    if let Some(bottom) = padding.bottom {
        parts.push(format!("padding-bottom:{bottom}px"));
    }
    if let Some(left) = padding.left {
        parts.push(format!("padding-left:{left}px"));
    }
    if parts.is_empty() { None } else { Some(parts.join(";")) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tabula_engine::delta::attributes::attrs;

    #[test]
    fn test_plain_text_renders_as_bare_text_node() {
        let mut tree = DomTree::new("div");
        let content = tree.create_element("div");
        tree.append_child(tree.root(), content);

        render_text_content(&mut tree, content, &Delta::new().insert("hi"), &SpanRegistry::with_defaults());

        let children = tree.children(content);
        assert_eq!(children.len(), 1);
        assert_eq!(tree.text(children[0]), Some("hi"));
    }

    #[test]
    fn test_attributed_runs_render_as_spans_with_classes() {
        let mut tree = DomTree::new("div");
        let content = tree.create_element("div");
        tree.append_child(tree.root(), content);

        let delta = Delta::new()
            .insert("a")
            .insert_with("b", attrs([("bold", json!(true)), ("italic", json!(true))]));
        render_text_content(&mut tree, content, &delta, &SpanRegistry::with_defaults());

        let children: Vec<_> = tree.children(content).to_vec();
        assert_eq!(children.len(), 2);
        assert_eq!(tree.tag(children[1]), Some("span"));
        assert!(tree.attr_has_token(children[1], "class", "tabula-bold"));
        assert!(tree.attr_has_token(children[1], "class", "tabula-italic"));
        assert_eq!(tree.text_content(children[1]), "b");
    }

    #[test]
    fn test_href_runs_render_as_anchors() {
        let mut tree = DomTree::new("div");
        let content = tree.create_element("div");
        tree.append_child(tree.root(), content);

        let delta = Delta::new().insert_with("link", attrs([("href", json!("https://x.test"))]));
        render_text_content(&mut tree, content, &delta, &SpanRegistry::with_defaults());

        let anchor = tree.children(content)[0];
        assert_eq!(tree.tag(anchor), Some("a"));
        assert_eq!(tree.attribute(anchor, "data-href"), Some("https://x.test"));
    }

    #[test]
    fn test_rerender_replaces_content() {
        let mut tree = DomTree::new("div");
        let content = tree.create_element("div");
        tree.append_child(tree.root(), content);
        let spans = SpanRegistry::with_defaults();

        render_text_content(&mut tree, content, &Delta::new().insert("one"), &spans);
        render_text_content(&mut tree, content, &Delta::new().insert("two"), &spans);

        assert_eq!(tree.text_content(content), "two");
        assert_eq!(tree.children(content).len(), 1);
    }

    #[test]
    fn test_block_hash_tracks_content() {
        let a = NodeData::new("Text", "blk-1").with_text("textContent", &Delta::new().insert("x"));
        let b = NodeData::new("Text", "blk-1").with_text("textContent", &Delta::new().insert("y"));
        assert_eq!(block_hash(&a), block_hash(&a.clone()));
        assert_ne!(block_hash(&a), block_hash(&b));
    }

    #[test]
    fn test_padding_style() {
        assert_eq!(padding_style(&Padding::default()), None);
        let padding = Padding { top: Some(12), left: Some(8), ..Padding::default() };
        assert_eq!(padding_style(&padding).as_deref(), Some("padding-top:12px;padding-left:8px"));
    }
}
