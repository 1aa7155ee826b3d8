//! Tolerant HTML fragment parsing for the paste pipeline.
//!
//! This is not a spec-complete HTML5 parser; clipboard HTML is shallow and
//! well-formed enough that a single-pass tokenizer plus an open-element
//! stack reconstructs it faithfully. Unknown constructs degrade softly:
//! comments and doctypes are skipped, stray end tags are ignored, and
//! anything still open at the end of input is closed implicitly. Only
//! structurally unfinished input (a tag or quoted attribute cut off at end
//! of input) is reported as an error, so callers can fall back to the
//! plain-text clipboard flavor.

use thiserror::Error;

use crate::tree::{DomId, DomTree};

#[derive(Debug, Error)]
pub enum HtmlParseError {
    #[error("unterminated tag at byte {at}")]
    UnterminatedTag { at: usize },
    #[error("unterminated quoted attribute value at byte {at}")]
    UnterminatedAttribute { at: usize },
    #[error("unterminated comment at byte {at}")]
    UnterminatedComment { at: usize },
}

#[derive(Debug)]
enum Token {
    Start {
        name: String,
        attributes: Vec<(String, String)>,
        self_closing: bool,
    },
    End {
        name: String,
    },
    Text(String),
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| name.eq_ignore_ascii_case(v))
}

/// Parse an HTML fragment into detached nodes inside `tree`, returning the
/// top-level node ids in source order.
pub fn parse_fragment(tree: &mut DomTree, html: &str) -> Result<Vec<DomId>, HtmlParseError> {
    let tokens = tokenize(html)?;

    let mut top_level: Vec<DomId> = Vec::new();
    let mut stack: Vec<(String, DomId)> = Vec::new();

    let mut attach = |tree: &mut DomTree, stack: &[(String, DomId)], top: &mut Vec<DomId>, id: DomId| {
        if let Some((_, parent)) = stack.last() {
            tree.append_child(*parent, id);
        } else {
            top.push(id);
        }
    };

    for token in tokens {
        match token {
            Token::Text(text) => {
                let id = tree.create_text(&text);
                attach(tree, &stack, &mut top_level, id);
            }
            Token::Start {
                name,
                attributes,
                self_closing,
            } => {
                let id = tree.create_element(&name);
                for (k, v) in attributes {
                    tree.set_attribute(id, &k, &v);
                }
                attach(tree, &stack, &mut top_level, id);
                if !self_closing && !is_void(&name) {
                    stack.push((name, id));
                }
            }
            Token::End { name } => {
                // Pop to the nearest matching open element; a stray end tag
                // with no match is dropped.
                if let Some(pos) = stack
                    .iter()
                    .rposition(|(open, _)| open.eq_ignore_ascii_case(&name))
                {
                    stack.truncate(pos);
                }
            }
        }
    }

    Ok(top_level)
}

fn tokenize(html: &str) -> Result<Vec<Token>, HtmlParseError> {
    let bytes = html.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut text_start = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }

        // `<` not opening a tag stays literal text.
        let next = bytes.get(pos + 1).copied();
        let opens_tag = matches!(next, Some(c) if c.is_ascii_alphabetic() || c == b'/' || c == b'!');
        if !opens_tag {
            pos += 1;
            continue;
        }

        if text_start < pos {
            tokens.push(Token::Text(decode_entities(&html[text_start..pos])));
        }

        if html[pos..].starts_with("<!--") {
            let end = html[pos + 4..]
                .find("-->")
                .ok_or(HtmlParseError::UnterminatedComment { at: pos })?;
            pos = pos + 4 + end + 3;
            text_start = pos;
            continue;
        }
        if next == Some(b'!') {
            // Doctype or other declaration: skip to `>`.
            let end = html[pos..]
                .find('>')
                .ok_or(HtmlParseError::UnterminatedTag { at: pos })?;
            pos += end + 1;
            text_start = pos;
            continue;
        }

        let tag_end = find_tag_end(html, pos)?;
        let inner = &html[pos + 1..tag_end];
        if let Some(name) = inner.strip_prefix('/') {
            tokens.push(Token::End {
                name: name.trim().to_ascii_lowercase(),
            });
        } else {
            let self_closing = inner.ends_with('/');
            let inner = inner.strip_suffix('/').unwrap_or(inner);
            let (name, attributes) = parse_tag_body(inner);
            tokens.push(Token::Start {
                name,
                attributes,
                self_closing,
            });
        }
        pos = tag_end + 1;
        text_start = pos;
    }

    if text_start < html.len() {
        tokens.push(Token::Text(decode_entities(&html[text_start..])));
    }

    Ok(tokens)
}

/// Find the `>` closing the tag that starts at `start`, skipping quoted
/// attribute values.
fn find_tag_end(html: &str, start: usize) -> Result<usize, HtmlParseError> {
    let bytes = html.as_bytes();
    let mut pos = start + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'>' => return Ok(pos),
            quote @ (b'"' | b'\'') => {
                let close = bytes[pos + 1..]
                    .iter()
                    .position(|&b| b == quote)
                    .ok_or(HtmlParseError::UnterminatedAttribute { at: pos })?;
                pos += close + 2;
            }
            _ => pos += 1,
        }
    }
    Err(HtmlParseError::UnterminatedTag { at: start })
}

/// Split a start tag's interior into a lowercased name and attribute pairs.
fn parse_tag_body(inner: &str) -> (String, Vec<(String, String)>) {
    let inner = inner.trim();
    let name_end = inner
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(inner.len());
    let name = inner[..name_end].to_ascii_lowercase();
    let mut attributes = Vec::new();

    let mut rest = inner[name_end..].trim_start();
    while !rest.is_empty() {
        let key_end = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '=')
            .unwrap_or(rest.len());
        let key = rest[..key_end].to_ascii_lowercase();
        rest = rest[key_end..].trim_start();

        let value = if let Some(stripped) = rest.strip_prefix('=') {
            let stripped = stripped.trim_start();
            if let Some(quote) = stripped.chars().next().filter(|&c| c == '"' || c == '\'') {
                // find_tag_end already guaranteed the closing quote exists.
                let body = &stripped[1..];
                let close = body.find(quote).unwrap_or(body.len());
                rest = body[close..].strip_prefix(quote).unwrap_or("").trim_start();
                decode_entities(&body[..close])
            } else {
                let end = stripped
                    .find(|c: char| c.is_ascii_whitespace())
                    .unwrap_or(stripped.len());
                let value = decode_entities(&stripped[..end]);
                rest = stripped[end..].trim_start();
                value
            }
        } else {
            String::new()
        };

        if !key.is_empty() {
            attributes.push((key, value));
        }
    }

    (name, attributes)
}

/// Decode the named and numeric character references that show up in
/// clipboard HTML. Unknown references stay literal.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let semi = match tail[1..].find(';') {
            // References are short; a distant `;` means a bare ampersand.
            Some(i) if i <= 10 => i + 1,
            _ => {
                out.push('&');
                rest = &tail[1..];
                continue;
            }
        };
        let name = &tail[1..semi];
        let decoded = match name {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => name
                .strip_prefix('#')
                .and_then(|num| {
                    if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        num.parse::<u32>().ok()
                    }
                })
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&tail[..semi + 1]),
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(html: &str) -> (DomTree, Vec<DomId>) {
        let mut tree = DomTree::new("body");
        let roots = parse_fragment(&mut tree, html).expect("fragment should parse");
        (tree, roots)
    }

    #[test]
    fn test_parse_nested_elements() {
        let (tree, roots) = parse("<div><p>hello <strong>world</strong></p></div>");

        assert_eq!(roots.len(), 1);
        let div = roots[0];
        assert_eq!(tree.tag(div), Some("div"));
        let p = tree.children(div)[0];
        assert_eq!(tree.tag(p), Some("p"));
        assert_eq!(tree.text_content(p), "hello world");
        let strong = tree.children(p)[1];
        assert_eq!(tree.tag(strong), Some("strong"));
        assert_eq!(tree.text_content(strong), "world");
    }

    #[test]
    fn test_parse_attributes() {
        let (tree, roots) =
            parse(r#"<a href="https://example.com" class='link ext' download>x</a>"#);

        let a = roots[0];
        assert_eq!(tree.attribute(a, "href"), Some("https://example.com"));
        assert!(tree.attr_has_token(a, "class", "ext"));
        assert_eq!(tree.attribute(a, "download"), Some(""));
    }

    #[test]
    fn test_parse_void_and_self_closing() {
        let (tree, roots) = parse("before<br>after<img src=\"i.png\"/>tail");

        assert_eq!(roots.len(), 5);
        assert_eq!(tree.text(roots[0]), Some("before"));
        assert_eq!(tree.tag(roots[1]), Some("br"));
        assert_eq!(tree.text(roots[2]), Some("after"));
        assert_eq!(tree.tag(roots[3]), Some("img"));
        assert_eq!(tree.text(roots[4]), Some("tail"));
        // Void elements never capture following content.
        assert_eq!(tree.children(roots[1]), &[] as &[DomId]);
    }

    #[test]
    fn test_parse_entities() {
        let (tree, roots) = parse("<p>a &amp; b &lt;tag&gt; &#65;&#x42; &nbsp;</p>");
        assert_eq!(tree.text_content(roots[0]), "a & b <tag> AB \u{a0}");
    }

    #[test]
    fn test_bare_ampersand_stays_literal() {
        let (tree, roots) = parse("<p>fish &chips and AT&T</p>");
        assert_eq!(tree.text_content(roots[0]), "fish &chips and AT&T");
    }

    #[test]
    fn test_stray_end_tag_is_ignored() {
        let (tree, roots) = parse("</div><p>ok</p>");
        assert_eq!(roots.len(), 1);
        assert_eq!(tree.tag(roots[0]), Some("p"));
    }

    #[test]
    fn test_unclosed_elements_close_at_eof() {
        let (tree, roots) = parse("<div><p>dangling");
        assert_eq!(roots.len(), 1);
        assert_eq!(tree.text_content(roots[0]), "dangling");
    }

    #[test]
    fn test_comments_and_doctype_skipped() {
        let (tree, roots) = parse("<!DOCTYPE html><!-- meta --><p>body</p>");
        assert_eq!(roots.len(), 1);
        assert_eq!(tree.text_content(roots[0]), "body");
    }

    #[test]
    fn test_mismatched_close_pops_to_match() {
        // </div> closes both the open <span> and the <div>.
        let (tree, roots) = parse("<div><span>x</div>y");
        assert_eq!(roots.len(), 2);
        assert_eq!(tree.tag(roots[0]), Some("div"));
        assert_eq!(tree.text(roots[1]), Some("y"));
    }

    #[test]
    fn test_unterminated_tag_is_an_error() {
        let mut tree = DomTree::new("body");
        let err = parse_fragment(&mut tree, "<p>ok</p><div class=\"x").unwrap_err();
        assert!(matches!(err, HtmlParseError::UnterminatedAttribute { .. }));

        let err = parse_fragment(&mut tree, "text <div").unwrap_err();
        assert!(matches!(err, HtmlParseError::UnterminatedTag { .. }));
    }

    #[test]
    fn test_angle_bracket_in_text() {
        let (tree, roots) = parse("<p>1 < 2 and 3 > 2</p>");
        assert_eq!(tree.text_content(roots[0]), "1 < 2 and 3 > 2");
    }
}
