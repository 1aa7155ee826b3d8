//! The transactional builder every mutation goes through.
//!
//! A changeset records operations against a state, then applies them
//! atomically. Recorded operations are *intents* anchored on node keys;
//! positions and text deltas are resolved while the apply executes, so an
//! earlier op in the same changeset cannot invalidate a later one. The
//! executed, serializable form ([`ChangesetOp`]) is what the
//! `changeset_applied` event carries.

pub mod ops;

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value};

pub use ops::ChangesetOp;

use crate::delta::Delta;
use crate::error::EngineError;
use crate::json::NodeData;
use crate::model::{Cursor, NodeKey, TextModel};
use crate::state::{ChangesetApplied, EditorState};

/// A recorded intent, resolved at execution time.
pub(crate) enum Recorded {
    InsertAt {
        parent: NodeKey,
        index: usize,
        children: Vec<NodeData>,
    },
    InsertAfter {
        parent: NodeKey,
        after: Option<NodeKey>,
        children: Vec<NodeData>,
    },
    RemoveNode {
        node: NodeKey,
    },
    RemoveChild {
        parent: NodeKey,
        node: NodeKey,
    },
    TextEdit {
        node: NodeKey,
        key: String,
        edit: Box<dyn FnOnce(&TextModel) -> Delta>,
    },
    UpdateAttributes {
        node: NodeKey,
        attributes: Map<String, Value>,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Preserve the current cursor but re-normalize it (clamp offsets) and
    /// re-emit `cursor_changed` so the view re-places the selection.
    pub refresh_cursor: bool,
}

/// Builder for one atomic batch of document operations.
pub struct Changeset {
    state: Rc<RefCell<EditorState>>,
    recorded: Vec<Recorded>,
    cursor: Option<Option<Cursor>>,
    force_update: bool,
    after_cursor: Option<Option<Cursor>>,
    applied: bool,
}

impl Changeset {
    pub fn new(state: &Rc<RefCell<EditorState>>) -> Self {
        Changeset {
            state: Rc::clone(state),
            recorded: Vec::new(),
            cursor: None,
            force_update: false,
            after_cursor: None,
            applied: false,
        }
    }

    /// True when nothing was recorded; applying an empty changeset is legal
    /// but callers usually discard it instead.
    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty() && self.cursor.is_none() && !self.force_update
    }

    // ---- recording ----

    pub fn insert_children_at(
        &mut self,
        parent: NodeKey,
        index: usize,
        children: Vec<NodeData>,
    ) -> &mut Self {
        self.recorded.push(Recorded::InsertAt { parent, index, children });
        self
    }

    /// Insert after a sibling, or at index 0 when `after` is `None`.
    pub fn insert_children_after(
        &mut self,
        parent: NodeKey,
        children: Vec<NodeData>,
        after: Option<NodeKey>,
    ) -> &mut Self {
        self.recorded.push(Recorded::InsertAfter { parent, after, children });
        self
    }

    pub fn remove_child(&mut self, parent: NodeKey, node: NodeKey) -> &mut Self {
        self.recorded.push(Recorded::RemoveChild { parent, node });
        self
    }

    pub fn remove_node(&mut self, node: NodeKey) -> &mut Self {
        self.recorded.push(Recorded::RemoveNode { node });
        self
    }

    /// Replace the text model at `key` by composing it with the delta the
    /// callback produces. The callback runs during apply, against the model
    /// as previous operations of this changeset left it.
    pub fn text_edit(
        &mut self,
        node: NodeKey,
        key: &str,
        edit: impl FnOnce(&TextModel) -> Delta + 'static,
    ) -> &mut Self {
        self.recorded.push(Recorded::TextEdit {
            node,
            key: key.to_string(),
            edit: Box::new(edit),
        });
        self
    }

    /// Shallow attribute merge; a null value deletes the key.
    pub fn update_attributes(&mut self, node: NodeKey, attributes: Map<String, Value>) -> &mut Self {
        self.recorded.push(Recorded::UpdateAttributes { node, attributes });
        self
    }

    /// The cursor to install after the apply. `None` clears the cursor.
    pub fn set_cursor_state(&mut self, cursor: Option<Cursor>) -> &mut Self {
        self.cursor = Some(cursor);
        self
    }

    /// Ask the renderer to re-emit DOM even if block content hashes are
    /// unchanged.
    pub fn set_force_update(&mut self) -> &mut Self {
        self.force_update = true;
        self
    }

    // ---- apply ----

    pub fn apply(&mut self, options: ApplyOptions) -> Result<ChangesetApplied, EngineError> {
        if self.applied {
            return Err(EngineError::AlreadyApplied);
        }
        self.applied = true;
        let recorded = std::mem::take(&mut self.recorded);
        let event = EditorState::apply(
            &self.state,
            recorded,
            self.cursor.take(),
            self.force_update,
            options,
        )?;
        self.after_cursor = Some(event.after_cursor.clone());
        Ok(event)
    }

    /// The effective cursor once [`Changeset::apply`] ran.
    pub fn after_cursor(&self) -> Option<&Cursor> {
        self.after_cursor.as_ref().and_then(|c| c.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::attributes::attrs;
    use crate::ids::IdGenerator;
    use crate::model::tree::TEXT_CONTENT_ATTR;
    use crate::model::Document;
    use crate::registry::BlockRegistry;
    use crate::state::CursorReason;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn test_state() -> Rc<RefCell<EditorState>> {
        let ids = Rc::new(IdGenerator::new());
        let registry = Rc::new(BlockRegistry::new());
        registry
            .register(Rc::new(crate::blocks::TextBlockDefinition::default()))
            .unwrap();
        registry
            .register(Rc::new(crate::blocks::TitleBlockDefinition::default()))
            .unwrap();
        registry.seal();
        let document = Document::new(&ids, "title");
        Rc::new(RefCell::new(EditorState::new(document, ids, registry, 0)))
    }

    fn insert_text_block(state: &Rc<RefCell<EditorState>>, text: &str) -> String {
        let (data, body) = {
            let st = state.borrow();
            let data = st.create_text_element(Some(Delta::new().insert(text)), None);
            (data, st.document().body())
        };
        let id = data.id.clone();
        let mut changeset = Changeset::new(state);
        let index = state.borrow().document().body_blocks().len();
        changeset.insert_children_at(body, index, vec![data]);
        changeset.apply(ApplyOptions::default()).unwrap();
        id
    }

    #[test]
    fn test_version_increments_once_per_apply() {
        let state = test_state();
        assert_eq!(state.borrow().version(), 0);

        insert_text_block(&state, "one");
        assert_eq!(state.borrow().version(), 1);

        insert_text_block(&state, "two");
        assert_eq!(state.borrow().version(), 2);
    }

    #[test]
    fn test_insert_updates_block_index_and_tree() {
        let state = test_state();
        let id = insert_text_block(&state, "hello");

        let st = state.borrow();
        let key = st.get_block_element_by_id(&id).expect("block is indexed");
        let node = st.document().tree().node(key).unwrap();
        assert_eq!(node.ty(), "Text");
        assert_eq!(node.text_content().unwrap().text(), "hello");
        assert_eq!(st.document().body_blocks(), &[key]);
    }

    #[test]
    fn test_remove_unindexes_and_emits_executed_ops() {
        let state = test_state();
        let id = insert_text_block(&state, "hello");
        let key = state.borrow().get_block_element_by_id(&id).unwrap();

        let mut changeset = Changeset::new(&state);
        changeset.remove_node(key);
        let event = changeset.apply(ApplyOptions::default()).unwrap();

        assert_eq!(event.operations.len(), 1);
        assert!(matches!(&event.operations[0], ChangesetOp::RemoveNodes { children, .. } if children[0].id == id));

        let st = state.borrow();
        assert_eq!(st.get_block_element_by_id(&id), None);
        assert!(st.document().body_blocks().is_empty());
        // The arena slot was reclaimed after the emission phase.
        assert!(!st.document().tree().is_alive(key));
    }

    #[test]
    fn test_text_edit_composes_and_inverts() {
        let state = test_state();
        let id = insert_text_block(&state, "helo");
        let key = state.borrow().get_block_element_by_id(&id).unwrap();

        let mut changeset = Changeset::new(&state);
        changeset.text_edit(key, TEXT_CONTENT_ATTR, |_| Delta::new().retain(2).insert("l"));
        let event = changeset.apply(ApplyOptions::default()).unwrap();

        let st = state.borrow();
        let node = st.document().tree().node(key).unwrap();
        assert_eq!(node.text_content().unwrap().text(), "hello");

        let ChangesetOp::TextEdit { invert, .. } = &event.operations[0] else {
            panic!("expected a text edit op");
        };
        assert_eq!(invert, &Delta::new().retain(2).delete(1));
    }

    #[test]
    fn test_two_text_edits_in_one_changeset_see_each_other() {
        let state = test_state();
        let id = insert_text_block(&state, "ab");
        let key = state.borrow().get_block_element_by_id(&id).unwrap();

        let mut changeset = Changeset::new(&state);
        // The second edit's callback observes the first edit's result.
        changeset.text_edit(key, TEXT_CONTENT_ATTR, |_| Delta::new().retain(2).insert("c"));
        changeset.text_edit(key, TEXT_CONTENT_ATTR, |model| {
            assert_eq!(model.text(), "abc");
            Delta::new().retain(model.len()).insert("d")
        });
        changeset.apply(ApplyOptions::default()).unwrap();

        let st = state.borrow();
        let key = st.get_block_element_by_id(&id).unwrap();
        assert_eq!(st.document().tree().node(key).unwrap().text_content().unwrap().text(), "abcd");
    }

    #[test]
    fn test_set_cursor_state_and_after_cursor() {
        let state = test_state();
        let id = insert_text_block(&state, "hello");
        let key = state.borrow().get_block_element_by_id(&id).unwrap();

        let mut changeset = Changeset::new(&state);
        changeset
            .text_edit(key, TEXT_CONTENT_ATTR, |_| Delta::new().retain(5).insert("!"))
            .set_cursor_state(Some(Cursor::collapsed(id.clone(), 6)));
        changeset.apply(ApplyOptions::default()).unwrap();

        assert_eq!(changeset.after_cursor(), Some(&Cursor::collapsed(id.clone(), 6)));
        assert_eq!(state.borrow().cursor(), Some(&Cursor::collapsed(id, 6)));
    }

    #[test]
    fn test_out_of_range_cursor_is_clamped() {
        let state = test_state();
        let id = insert_text_block(&state, "hi");
        let key = state.borrow().get_block_element_by_id(&id).unwrap();

        let mut changeset = Changeset::new(&state);
        changeset
            .text_edit(key, TEXT_CONTENT_ATTR, |_| Delta::new().delete(1))
            .set_cursor_state(Some(Cursor::collapsed(id.clone(), 10)));
        changeset.apply(ApplyOptions::default()).unwrap();

        assert_eq!(state.borrow().cursor(), Some(&Cursor::collapsed(id, 1)));
    }

    #[test]
    fn test_current_cursor_follows_text_edits() {
        let state = test_state();
        let id = insert_text_block(&state, "hello");
        let key = state.borrow().get_block_element_by_id(&id).unwrap();
        EditorState::set_cursor_state(
            &state,
            Some(Cursor::collapsed(id.clone(), 3)),
            CursorReason::UserInput,
        );

        // An edit before the caret shifts it; no explicit cursor is set.
        let mut changeset = Changeset::new(&state);
        changeset.text_edit(key, TEXT_CONTENT_ATTR, |_| Delta::new().insert("x"));
        changeset.apply(ApplyOptions::default()).unwrap();

        assert_eq!(state.borrow().cursor(), Some(&Cursor::collapsed(id, 4)));
    }

    #[test]
    fn test_cursor_cleared_when_block_removed() {
        let state = test_state();
        let id = insert_text_block(&state, "hello");
        let key = state.borrow().get_block_element_by_id(&id).unwrap();
        EditorState::set_cursor_state(
            &state,
            Some(Cursor::collapsed(id, 2)),
            CursorReason::UserInput,
        );

        let mut changeset = Changeset::new(&state);
        changeset.remove_node(key);
        changeset.apply(ApplyOptions::default()).unwrap();

        assert_eq!(state.borrow().cursor(), None);
    }

    #[test]
    fn test_reentrant_apply_is_rejected() {
        let state = test_state();
        insert_text_block(&state, "a");

        let state_inner = Rc::clone(&state);
        let failure: Rc<RefCell<Option<EngineError>>> = Rc::new(RefCell::new(None));
        let failure_inner = Rc::clone(&failure);
        let _sub = state.borrow().changeset_applied().subscribe(move |_| {
            let mut nested = Changeset::new(&state_inner);
            nested.set_force_update();
            if let Err(error) = nested.apply(ApplyOptions::default()) {
                *failure_inner.borrow_mut() = Some(error);
            }
        });

        insert_text_block(&state, "b");
        assert!(matches!(
            failure.borrow().as_ref(),
            Some(EngineError::ReentrantApply)
        ));
    }

    #[test]
    fn test_apply_twice_is_an_error() {
        let state = test_state();
        let mut changeset = Changeset::new(&state);
        changeset.set_force_update();
        changeset.apply(ApplyOptions::default()).unwrap();
        assert!(matches!(
            changeset.apply(ApplyOptions::default()),
            Err(EngineError::AlreadyApplied)
        ));
    }

    #[test]
    fn test_unknown_block_type_rejected_on_insert() {
        let state = test_state();
        let body = state.borrow().document().body();
        let mut changeset = Changeset::new(&state);
        changeset.insert_children_at(body, 0, vec![NodeData::new("Mystery", "blk-zz")]);
        assert!(matches!(
            changeset.apply(ApplyOptions::default()),
            Err(EngineError::UnknownBlockType(name)) if name == "Mystery"
        ));
    }

    #[test]
    fn test_update_attributes_records_old_values() {
        let state = test_state();
        let id = insert_text_block(&state, "x");
        let key = state.borrow().get_block_element_by_id(&id).unwrap();

        let mut changeset = Changeset::new(&state);
        changeset.update_attributes(key, attrs([("textType", json!("heading1"))]).into_iter().collect());
        let event = changeset.apply(ApplyOptions::default()).unwrap();

        let ChangesetOp::UpdateAttributes { old_attributes, .. } = &event.operations[0] else {
            panic!("expected an update op");
        };
        assert_eq!(old_attributes.get("textType"), Some(&json!(null)));

        let st = state.borrow();
        let node = st.document().tree().node(key).unwrap();
        assert_eq!(
            node.attribute("textType").and_then(|a| a.as_json()),
            Some(&json!("heading1"))
        );
    }

    #[test]
    fn test_insert_after_resolves_position_at_execution() {
        let state = test_state();
        let first = insert_text_block(&state, "first");
        let first_key = state.borrow().get_block_element_by_id(&first).unwrap();
        let body = state.borrow().document().body();

        let (a, b) = {
            let st = state.borrow();
            (
                st.create_text_element(Some(Delta::new().insert("a")), None),
                st.create_text_element(Some(Delta::new().insert("b")), None),
            )
        };
        let (a_id, b_id) = (a.id.clone(), b.id.clone());

        // Two inserts after the same sibling in one changeset: the second
        // resolves against the already-mutated tree.
        let mut changeset = Changeset::new(&state);
        changeset.insert_children_after(body, vec![a], Some(first_key));
        changeset.insert_children_after(body, vec![b], Some(first_key));
        changeset.apply(ApplyOptions::default()).unwrap();

        let st = state.borrow();
        let order: Vec<String> = st
            .document()
            .body_blocks()
            .iter()
            .map(|&k| st.document().tree().node(k).unwrap().id().to_string())
            .collect();
        assert_eq!(order, vec![first, b_id, a_id]);
    }
}
