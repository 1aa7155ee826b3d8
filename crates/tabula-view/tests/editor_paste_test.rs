//! Paste-path tests: clipboard flavor preference, self-paste round-trips
//! and the plain-text fallback.

use pretty_assertions::assert_eq;
use tabula_engine::state::CursorReason;
use tabula_engine::{Controller, ControllerOptions, Cursor, Delta, NodeData};
use tabula_view::{ClipboardData, Editor, EditorEvent, EditorOptions};

fn title_id(controller: &Controller) -> String {
    let state = controller.state().borrow();
    let title = state.document().title();
    state.document().tree().node(title).unwrap().id().to_string()
}

fn editor_with_blocks(texts: &[&str]) -> (Editor, Vec<String>) {
    let controller = Controller::new(ControllerOptions::default()).unwrap();
    let mut ids = Vec::new();
    let mut after = title_id(&controller);
    for text in texts {
        let element = {
            let state = controller.state().borrow();
            state.create_text_element(Some(Delta::new().insert(*text)), None)
        };
        let id = controller.insert_block_after_id(element, &after).unwrap();
        after = id.clone();
        ids.push(id);
    }
    (Editor::new(controller, EditorOptions::default()), ids)
}

fn body_texts(editor: &Editor) -> Vec<String> {
    let state = editor.controller().state().borrow();
    state
        .document()
        .body_blocks()
        .iter()
        .map(|&key| {
            state
                .document()
                .tree()
                .node(key)
                .and_then(|n| n.text_content())
                .map(|t| t.text())
                .unwrap_or_default()
        })
        .collect()
}

#[test]
fn test_html_paste_is_preferred_over_plain() {
    let (mut editor, ids) = editor_with_blocks(&["x"]);
    editor
        .controller()
        .set_cursor_state(Some(Cursor::collapsed(ids[0].clone(), 1)), CursorReason::UserInput);

    editor.handle_event(EditorEvent::Paste(ClipboardData {
        html: Some("<p><strong>rich</strong></p>".to_string()),
        plain: Some("plain".to_string()),
    }));

    assert_eq!(body_texts(&editor), vec!["xrich".to_string()]);
}

#[test]
fn test_broken_html_falls_back_to_plain_text() {
    let (mut editor, ids) = editor_with_blocks(&["x"]);
    editor
        .controller()
        .set_cursor_state(Some(Cursor::collapsed(ids[0].clone(), 1)), CursorReason::UserInput);

    editor.handle_event(EditorEvent::Paste(ClipboardData {
        html: Some("<div class=\"broken".to_string()),
        plain: Some("plain".to_string()),
    }));

    assert_eq!(body_texts(&editor), vec!["xplain".to_string()]);
}

#[test]
fn test_plain_only_paste_inserts_verbatim_at_cursor() {
    let (mut editor, ids) = editor_with_blocks(&["ab"]);
    editor
        .controller()
        .set_cursor_state(Some(Cursor::collapsed(ids[0].clone(), 1)), CursorReason::UserInput);

    editor.handle_event(EditorEvent::Paste(ClipboardData {
        html: None,
        plain: Some("<b>not html</b>".to_string()),
    }));

    // Plain text carries no attributes, markup included literally.
    assert_eq!(body_texts(&editor), vec!["a<b>not html</b>b".to_string()]);
    let state = editor.controller().state().borrow();
    let key = state.get_block_element_by_id(&ids[0]).unwrap();
    let model = state.document().tree().node(key).unwrap().text_content().unwrap();
    assert!(model.delta().ops().iter().all(|op| op.attributes().is_none()));
}

#[test]
fn test_paste_from_self_mints_fresh_id() {
    let (mut editor, _ids) = editor_with_blocks(&[]);

    let copied = NodeData::new("Text", "blk-feed01")
        .with_text("textContent", &Delta::new().insert("copied"));
    let encoded = serde_json::to_string(&copied).unwrap().replace('"', "&quot;");
    let html = format!(r#"<div data-type="Text" data-content="{encoded}"></div>"#);

    editor.handle_event(EditorEvent::Paste(ClipboardData {
        html: Some(html),
        plain: None,
    }));

    assert_eq!(body_texts(&editor), vec!["copied".to_string()]);
    let state = editor.controller().state().borrow();
    let key = state.document().body_blocks()[0];
    let node = state.document().tree().node(key).unwrap();
    assert_ne!(node.id(), "blk-feed01");
    assert!(tabula_engine::is_block_id(node.id()));
}

#[test]
fn test_pasted_blocks_render_with_serialization_attributes() {
    let (mut editor, _ids) = editor_with_blocks(&[]);

    editor.handle_event(EditorEvent::Paste(ClipboardData {
        html: Some("<p>rendered</p>".to_string()),
        plain: None,
    }));

    let state = editor.controller().state().borrow();
    let key = state.document().body_blocks()[0];
    let id = state.document().tree().node(key).unwrap().id().to_string();
    drop(state);

    let element = editor.block_dom(&id).expect("pasted block is mounted");
    assert_eq!(editor.dom().attribute(element, "data-type"), Some("Text"));
    let encoded = editor.dom().attribute(element, "data-content").unwrap();
    let round_trip: NodeData = serde_json::from_str(encoded).unwrap();
    assert_eq!(round_trip.id, id);
    assert_eq!(
        round_trip.text_attribute("textContent").unwrap(),
        Delta::new().insert("rendered")
    );
}

#[test]
fn test_paste_multiline_plain_text_creates_blocks() {
    let (mut editor, ids) = editor_with_blocks(&["se"]);
    editor
        .controller()
        .set_cursor_state(Some(Cursor::collapsed(ids[0].clone(), 1)), CursorReason::UserInput);

    editor.handle_event(EditorEvent::Paste(ClipboardData {
        html: None,
        plain: Some("am\nline".to_string()),
    }));

    assert_eq!(body_texts(&editor), vec!["sam".to_string(), "linee".to_string()]);
}
