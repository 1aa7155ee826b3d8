//! Editor state: the document, the block index, the cursor, the version
//! counter and the change streams, plus the apply engine every changeset
//! funnels through.
//!
//! ## The apply pipeline
//!
//! Applying a changeset is synchronous and runs in three phases:
//!
//! 1. **Mutate**: recorded operations execute in order against the tree
//!    and block index, each emitting an executed [`ChangesetOp`] with its
//!    location captured at execution time. Cursor offsets and tracked
//!    locations transform as the ops land.
//! 2. **Emit**: with the state borrow released (observers may read the
//!    state), the streams fire in a fixed order: `new_block_created`,
//!    `block_will_delete`, `cursor_changed`, `changeset_applied`. Removed
//!    subtrees are still readable here.
//! 3. **Reclaim**: detached subtrees release their arena slots and the
//!    apply lock clears.
//!
//! A nested apply from inside an observer is rejected with
//! [`EngineError::ReentrantApply`]; follow-up edits go through the
//! controller's next-tick queue.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::changeset::ops::ChangesetOp;
use crate::changeset::{ApplyOptions, Recorded};
use crate::delta::Delta;
use crate::error::EngineError;
use crate::ids::IdGenerator;
use crate::json::{self, NodeData};
use crate::model::tree::TEXT_BLOCK_TYPE;
use crate::model::{Cursor, Document, Location, NodeKey, TEXT_CONTENT_ATTR};
use crate::observable::Subject;
use crate::registry::BlockRegistry;

/// Why the cursor moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorReason {
    Changeset,
    UserInput,
    BrowserSelection,
    UiEvent,
}

#[derive(Debug, Clone)]
pub struct CursorChangedEvent {
    pub cursor: Option<Cursor>,
    pub reason: CursorReason,
}

/// Payload of `new_block_created` and `block_will_delete`. During
/// `block_will_delete` the node is detached but still readable through the
/// tree.
#[derive(Debug, Clone)]
pub struct BlockEvent {
    pub id: String,
    pub key: NodeKey,
}

/// The single event emitted per applied changeset.
#[derive(Debug, Clone)]
pub struct ChangesetApplied {
    pub version: u64,
    pub operations: Vec<ChangesetOp>,
    pub before_cursor: Option<Cursor>,
    pub after_cursor: Option<Cursor>,
    pub force_update: bool,
}

pub struct EditorState {
    document: Document,
    block_index: HashMap<String, NodeKey>,
    cursor: Option<Cursor>,
    version: u64,
    applying: bool,
    id_gen: Rc<IdGenerator>,
    blocks: Rc<BlockRegistry>,
    tracked_locations: Vec<Weak<RefCell<Location>>>,
    new_block_created: Subject<BlockEvent>,
    block_will_delete: Subject<BlockEvent>,
    cursor_changed: Subject<CursorChangedEvent>,
    changeset_applied: Subject<ChangesetApplied>,
}

impl EditorState {
    pub fn new(
        document: Document,
        id_gen: Rc<IdGenerator>,
        blocks: Rc<BlockRegistry>,
        init_version: u64,
    ) -> Self {
        let mut state = EditorState {
            document,
            block_index: HashMap::new(),
            cursor: None,
            version: init_version,
            applying: false,
            id_gen,
            blocks,
            tracked_locations: Vec::new(),
            new_block_created: Subject::new(),
            block_will_delete: Subject::new(),
            cursor_changed: Subject::new(),
            changeset_applied: Subject::new(),
        };
        state.rebuild_block_index();
        state
    }

    fn rebuild_block_index(&mut self) {
        self.block_index.clear();
        for key in self.document.tree().descendants(self.document.root()) {
            if let Some(node) = self.document.tree().node(key) {
                if node.is_block() {
                    self.block_index.insert(node.id().to_string(), key);
                }
            }
        }
    }

    // ---- reads ----

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn is_applying(&self) -> bool {
        self.applying
    }

    pub fn get_block_element_by_id(&self, id: &str) -> Option<NodeKey> {
        self.block_index.get(id).copied()
    }

    /// True iff the node carries a text model under `textContent`, which is
    /// equivalent to its block definition declaring a text content
    /// attribute.
    pub fn is_text_like(&self, key: NodeKey) -> bool {
        self.document
            .tree()
            .node(key)
            .is_some_and(|node| node.text_content().is_some())
    }

    /// Character length of a block's text content.
    pub fn text_len(&self, id: &str) -> Option<usize> {
        let key = self.get_block_element_by_id(id)?;
        Some(self.document.tree().node(key)?.text_content()?.len())
    }

    /// A fresh (not yet inserted) Text element with a minted block id.
    pub fn create_text_element(
        &self,
        delta: Option<Delta>,
        attributes: Option<Map<String, Value>>,
    ) -> NodeData {
        let mut data = NodeData::new(TEXT_BLOCK_TYPE, self.id_gen.next_block_id());
        if let Some(attributes) = attributes {
            data.attributes = attributes;
        }
        data.attributes.insert(
            TEXT_CONTENT_ATTR.to_string(),
            text_attr_value(&delta.unwrap_or_default()),
        );
        data
    }

    /// All blocks a cursor can land in, in document order: the title, then
    /// the body's children.
    pub fn ordered_blocks(&self) -> Vec<NodeKey> {
        let mut out = vec![self.document.title()];
        out.extend_from_slice(self.document.body_blocks());
        out
    }

    fn position_of(&self, id: &str) -> Option<usize> {
        let key = self.get_block_element_by_id(id)?;
        self.ordered_blocks().iter().position(|&k| k == key)
    }

    /// Orient an open cursor into document order; collapsed cursors pass
    /// through.
    pub fn cursor_in_document_order(&self, cursor: &Cursor) -> Cursor {
        let Cursor::Open { start_id, start_offset, end_id, end_offset } = cursor else {
            return cursor.clone();
        };
        let backwards = if start_id == end_id {
            end_offset < start_offset
        } else {
            match (self.position_of(start_id), self.position_of(end_id)) {
                (Some(s), Some(e)) => e < s,
                _ => false,
            }
        };
        if backwards {
            Cursor::open(end_id.clone(), *end_offset, start_id.clone(), *start_offset)
        } else {
            cursor.clone()
        }
    }

    /// Clip an open cursor into one single-block span per crossed text-like
    /// block, in document order. A collapsed cursor clips to nothing.
    pub fn split_cursor_by_blocks(&self, cursor: &Cursor) -> Vec<Cursor> {
        let cursor = self.cursor_in_document_order(cursor);
        let Cursor::Open { start_id, start_offset, end_id, end_offset } = &cursor else {
            return Vec::new();
        };
        if start_id == end_id {
            return vec![cursor.clone()];
        }
        let (Some(start_pos), Some(end_pos)) = (self.position_of(start_id), self.position_of(end_id))
        else {
            return Vec::new();
        };
        let blocks = self.ordered_blocks();
        let mut out = Vec::new();
        for (pos, &key) in blocks.iter().enumerate().take(end_pos + 1).skip(start_pos) {
            if !self.is_text_like(key) {
                continue;
            }
            let Some(node) = self.document.tree().node(key) else {
                continue;
            };
            let id = node.id().to_string();
            let len = node.text_content().map(|t| t.len()).unwrap_or(0);
            let (from, to) = if pos == start_pos {
                (*start_offset, len)
            } else if pos == end_pos {
                (0, *end_offset)
            } else {
                (0, len)
            };
            out.push(Cursor::open(id.clone(), from, id, to));
        }
        out
    }

    /// Body blocks between two block ids, inclusive, in document order.
    pub fn blocks_between(&self, start_id: &str, end_id: &str) -> Vec<NodeKey> {
        let (Some(start_pos), Some(end_pos)) = (self.position_of(start_id), self.position_of(end_id))
        else {
            return Vec::new();
        };
        let (from, to) = if start_pos <= end_pos { (start_pos, end_pos) } else { (end_pos, start_pos) };
        self.ordered_blocks()[from..=to].to_vec()
    }

    // ---- streams ----

    pub fn new_block_created(&self) -> Subject<BlockEvent> {
        self.new_block_created.clone()
    }

    pub fn block_will_delete(&self) -> Subject<BlockEvent> {
        self.block_will_delete.clone()
    }

    pub fn cursor_changed(&self) -> Subject<CursorChangedEvent> {
        self.cursor_changed.clone()
    }

    pub fn changeset_applied(&self) -> Subject<ChangesetApplied> {
        self.changeset_applied.clone()
    }

    /// Register a location to be transformed through structural ops of
    /// every subsequent apply, for as long as the `Rc` is held.
    pub fn track_location(&mut self, location: &Rc<RefCell<Location>>) {
        self.tracked_locations.push(Rc::downgrade(location));
    }

    // ---- cursor ----

    /// Low-level cursor set. Offsets are clamped, dangling ids clear the
    /// cursor, open cursors are oriented into document order, and
    /// `cursor_changed` fires with the given reason.
    pub fn set_cursor_state(
        state: &Rc<RefCell<EditorState>>,
        cursor: Option<Cursor>,
        reason: CursorReason,
    ) {
        let (event, subject) = {
            let mut st = state.borrow_mut();
            let clamped = st.clamp_cursor(cursor);
            st.cursor = clamped.clone();
            (
                CursorChangedEvent { cursor: clamped, reason },
                st.cursor_changed.clone(),
            )
        };
        subject.emit(&event);
    }

    /// Clamp offsets into the referenced blocks' text lengths; a cursor
    /// naming a block that is not in the index clears entirely.
    fn clamp_cursor(&self, cursor: Option<Cursor>) -> Option<Cursor> {
        let cursor = cursor?;
        let clamp_end = |id: &str, offset: usize| -> Option<usize> {
            let key = self.get_block_element_by_id(id)?;
            let len = self
                .document
                .tree()
                .node(key)?
                .text_content()
                .map(|t| t.len())
                .unwrap_or(0);
            if offset > len {
                debug!(block = id, offset, len, "clamping out-of-range cursor offset");
            }
            Some(offset.min(len))
        };
        let clamped = match &cursor {
            Cursor::Collapsed { id, offset } => Cursor::collapsed(id.clone(), clamp_end(id, *offset)?),
            Cursor::Open { start_id, start_offset, end_id, end_offset } => Cursor::open(
                start_id.clone(),
                clamp_end(start_id, *start_offset)?,
                end_id.clone(),
                clamp_end(end_id, *end_offset)?,
            ),
        };
        Some(self.cursor_in_document_order(&clamped))
    }

    // ---- apply ----

    pub(crate) fn apply(
        state: &Rc<RefCell<EditorState>>,
        recorded: Vec<Recorded>,
        cursor_request: Option<Option<Cursor>>,
        force_update: bool,
        options: ApplyOptions,
    ) -> Result<ChangesetApplied, EngineError> {
        let mut created_events = Vec::new();
        let mut delete_events = Vec::new();
        let mut release_keys = Vec::new();

        // Phase 1: mutate under the borrow.
        let (event, cursor_event, subjects) = {
            let mut st = state
                .try_borrow_mut()
                .map_err(|_| EngineError::ReentrantApply)?;
            if st.applying {
                return Err(EngineError::ReentrantApply);
            }
            st.applying = true;

            let before_cursor = st.cursor.clone();
            let mut ctx = ExecContext {
                operations: Vec::new(),
                created: &mut created_events,
                deleted: &mut delete_events,
                release: &mut release_keys,
                current_cursor: before_cursor.clone(),
            };
            for rec in recorded {
                if let Err(error) = st.execute(rec, &mut ctx) {
                    st.applying = false;
                    return Err(error);
                }
            }

            let requested = match cursor_request {
                Some(requested) => requested,
                None => ctx.current_cursor.clone(),
            };
            let after_cursor = st.clamp_cursor(requested);
            let cursor_moved = after_cursor != before_cursor || options.refresh_cursor;
            if cursor_moved {
                st.cursor = after_cursor.clone();
            }
            st.version += 1;

            let event = ChangesetApplied {
                version: st.version,
                operations: ctx.operations,
                before_cursor,
                after_cursor: after_cursor.clone(),
                force_update,
            };
            let cursor_event = cursor_moved.then(|| CursorChangedEvent {
                cursor: after_cursor,
                reason: CursorReason::Changeset,
            });
            let subjects = (
                st.new_block_created.clone(),
                st.block_will_delete.clone(),
                st.cursor_changed.clone(),
                st.changeset_applied.clone(),
            );
            (event, cursor_event, subjects)
        };

        // Phase 2: emit with the borrow released so observers can read the
        // state. Removed subtrees are detached but not yet reclaimed.
        for e in &created_events {
            subjects.0.emit(e);
        }
        for e in &delete_events {
            subjects.1.emit(e);
        }
        if let Some(cursor_event) = &cursor_event {
            subjects.2.emit(cursor_event);
        }
        subjects.3.emit(&event);

        // Phase 3: reclaim slots and unlock.
        {
            let mut st = state.borrow_mut();
            for key in release_keys {
                st.document.tree_mut().release(key);
            }
            st.applying = false;
        }

        Ok(event)
    }

    fn execute(&mut self, rec: Recorded, ctx: &mut ExecContext<'_>) -> Result<(), EngineError> {
        match rec {
            Recorded::InsertAt { parent, index, children } => {
                self.exec_insert(parent, index, children, ctx)
            }
            Recorded::InsertAfter { parent, after, children } => {
                let index = match after {
                    Some(after) => {
                        self.document
                            .tree()
                            .child_index(after)
                            .ok_or(EngineError::DetachedNode)?
                            + 1
                    }
                    None => 0,
                };
                self.exec_insert(parent, index, children, ctx)
            }
            Recorded::RemoveChild { parent, node } => {
                if self.document.tree().parent(node) != Some(parent) {
                    return Err(EngineError::InvariantViolation(
                        "remove_child parent does not own the node".to_string(),
                    ));
                }
                self.exec_remove(node, ctx)
            }
            Recorded::RemoveNode { node } => self.exec_remove(node, ctx),
            Recorded::TextEdit { node, key, edit } => self.exec_text_edit(node, &key, edit, ctx),
            Recorded::UpdateAttributes { node, attributes } => {
                self.exec_update_attributes(node, attributes, ctx)
            }
        }
    }

    fn exec_insert(
        &mut self,
        parent: NodeKey,
        index: usize,
        children: Vec<NodeData>,
        ctx: &mut ExecContext<'_>,
    ) -> Result<(), EngineError> {
        let parent_path = self
            .document
            .path_of(parent)
            .ok_or(EngineError::DetachedNode)?;
        let index = index.min(self.document.tree().children(parent).len());

        for child in &children {
            self.validate_insertable(child)?;
        }

        for (i, data) in children.iter().enumerate() {
            let key = data.instantiate(self.document.tree_mut());
            self.document.tree_mut().insert_child_at(parent, index + i, key);
            for desc in self.document.tree().descendants(key) {
                if let Some(node) = self.document.tree().node(desc) {
                    if node.is_block() {
                        self.block_index.insert(node.id().to_string(), desc);
                        ctx.created.push(BlockEvent { id: node.id().to_string(), key: desc });
                    }
                }
            }
        }

        let location = parent_path.child(index);
        self.transform_tracked(&location, children.len() as isize);
        ctx.operations.push(ChangesetOp::InsertNodes { location, children });
        Ok(())
    }

    fn validate_insertable(&self, data: &NodeData) -> Result<(), EngineError> {
        let is_block_type = data.t.chars().next().is_some_and(|c| c.is_ascii_uppercase());
        if is_block_type {
            if !self.blocks.contains(&data.t) {
                return Err(EngineError::UnknownBlockType(data.t.clone()));
            }
            if self.block_index.contains_key(&data.id) {
                return Err(EngineError::InvariantViolation(format!(
                    "block id {:?} is already in the document",
                    data.id
                )));
            }
        }
        for child in &data.children {
            self.validate_insertable(child)?;
        }
        Ok(())
    }

    fn exec_remove(&mut self, node: NodeKey, ctx: &mut ExecContext<'_>) -> Result<(), EngineError> {
        let path = self.document.path_of(node).ok_or(EngineError::DetachedNode)?;
        if path.is_empty() {
            return Err(EngineError::InvariantViolation(
                "the document root cannot be removed".to_string(),
            ));
        }
        let data = NodeData::from_node(self.document.tree(), node).ok_or(EngineError::DetachedNode)?;

        let mut removed_ids = Vec::new();
        for desc in self.document.tree().descendants(node) {
            if let Some(n) = self.document.tree().node(desc) {
                if n.is_block() {
                    removed_ids.push(n.id().to_string());
                    ctx.deleted.push(BlockEvent { id: n.id().to_string(), key: desc });
                }
            }
        }
        for id in &removed_ids {
            self.block_index.remove(id);
        }
        if let Some(cursor) = &ctx.current_cursor {
            if removed_ids.iter().any(|id| cursor.references(id)) {
                ctx.current_cursor = None;
            }
        }

        self.document.tree_mut().detach(node);
        ctx.release.push(node);

        self.transform_tracked(&path, -1);
        ctx.operations.push(ChangesetOp::RemoveNodes { location: path, children: vec![data] });
        Ok(())
    }

    fn exec_text_edit(
        &mut self,
        node: NodeKey,
        key: &str,
        edit: Box<dyn FnOnce(&crate::model::TextModel) -> Delta>,
        ctx: &mut ExecContext<'_>,
    ) -> Result<(), EngineError> {
        let path = self.document.path_of(node).ok_or(EngineError::DetachedNode)?;
        let block_id = self
            .document
            .tree()
            .node(node)
            .map(|n| n.id().to_string())
            .ok_or(EngineError::DetachedNode)?;

        let delta = {
            let model = self
                .document
                .tree()
                .node(node)
                .and_then(|n| n.attribute(key))
                .and_then(|a| a.as_text())
                .ok_or_else(|| {
                    EngineError::InvariantViolation(format!("no text model under {key:?}"))
                })?;
            edit(model)
        };
        if delta.ops().is_empty() {
            return Ok(());
        }

        let invert = {
            let model = self
                .document
                .tree_mut()
                .node_mut(node)
                .and_then(|n| n.attributes.get_mut(key))
                .and_then(|a| a.as_text_mut())
                .ok_or(EngineError::DetachedNode)?;
            let invert = delta.invert(model.delta());
            model.compose(&delta);
            invert
        };

        if key == TEXT_CONTENT_ATTR {
            ctx.current_cursor = transform_cursor_offsets(ctx.current_cursor.take(), &block_id, &delta);
        }

        ctx.operations.push(ChangesetOp::TextEdit {
            location: path,
            key: key.to_string(),
            delta,
            invert,
        });
        Ok(())
    }

    fn exec_update_attributes(
        &mut self,
        node: NodeKey,
        attributes: Map<String, Value>,
        ctx: &mut ExecContext<'_>,
    ) -> Result<(), EngineError> {
        let path = self.document.path_of(node).ok_or(EngineError::DetachedNode)?;
        let mut old_attributes = Map::new();
        {
            let node_ref = self.document.tree().node(node).ok_or(EngineError::DetachedNode)?;
            for key in attributes.keys() {
                let prior = node_ref
                    .attribute(key)
                    .map(json::attr_to_json)
                    .unwrap_or(Value::Null);
                old_attributes.insert(key.clone(), prior);
            }
        }
        let node_mut = self
            .document
            .tree_mut()
            .node_mut(node)
            .ok_or(EngineError::DetachedNode)?;
        for (key, value) in &attributes {
            if value.is_null() {
                node_mut.attributes.remove(key);
            } else {
                node_mut.attributes.insert(key.clone(), json::attr_from_json(value));
            }
        }
        ctx.operations.push(ChangesetOp::UpdateAttributes {
            location: path,
            attributes,
            old_attributes,
        });
        Ok(())
    }

    fn transform_tracked(&mut self, base: &Location, delta: isize) {
        self.tracked_locations.retain(|weak| weak.upgrade().is_some());
        for weak in &self.tracked_locations {
            if let Some(cell) = weak.upgrade() {
                let transformed = Location::transform(base, &cell.borrow(), delta);
                *cell.borrow_mut() = transformed;
            }
        }
    }
}

struct ExecContext<'a> {
    operations: Vec<ChangesetOp>,
    created: &'a mut Vec<BlockEvent>,
    deleted: &'a mut Vec<BlockEvent>,
    release: &'a mut Vec<NodeKey>,
    /// The pre-apply cursor, transformed through the ops executed so far.
    current_cursor: Option<Cursor>,
}

/// Shift cursor offsets referencing `block_id` through a text edit. The
/// start endpoint moves with insertions at its position, the end endpoint
/// does not.
fn transform_cursor_offsets(cursor: Option<Cursor>, block_id: &str, delta: &Delta) -> Option<Cursor> {
    let cursor = cursor?;
    Some(match cursor {
        Cursor::Collapsed { id, offset } if id == block_id => {
            let offset = delta.transform_index(offset, true);
            Cursor::Collapsed { id, offset }
        }
        Cursor::Open { start_id, start_offset, end_id, end_offset } => {
            let start_offset = if start_id == block_id {
                delta.transform_index(start_offset, true)
            } else {
                start_offset
            };
            let end_offset = if end_id == block_id {
                delta.transform_index(end_offset, false)
            } else {
                end_offset
            };
            Cursor::Open { start_id, start_offset, end_id, end_offset }
        }
        other => other,
    })
}

fn text_attr_value(delta: &Delta) -> Value {
    let ops = serde_json::to_value(delta).unwrap_or(Value::Array(Vec::new()));
    let mut map = Map::new();
    map.insert("ops".to_string(), ops);
    Value::Object(map)
}

/// Emit a warning for an unknown block type being dropped; shared by the
/// paste and deserialization paths.
pub(crate) fn warn_unknown_block(ty: &str) {
    warn!(block_type = ty, "dropping element with unregistered block type");
}
