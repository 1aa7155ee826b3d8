//! The editor view: projects the engine state onto an editable DOM tree
//! and turns browser-shaped events back into changesets.
//!
//! The host plays the browser. It owns nothing: the editor holds the DOM
//! tree and the selection, the host mutates them the way contenteditable
//! would (typing into text nodes, moving the selection) and reports each
//! gesture through [`EditorEvent`]. Every event handler runs its applies
//! and the DOM reconciliation synchronously before returning, matching the
//! single-threaded cooperative model of the engine.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tabula_dom::{DomId, DomSelection, DomTree};
use tabula_engine::blocks::{text_type, CONTENT_CLASS};
use tabula_engine::registry::Block;
use tabula_engine::state::{ChangesetApplied, CursorReason, EditorState};
use tabula_engine::{
    ApplyOptions, Controller, Cursor, Delta, EngineError, FollowerWidgetEvent, NodeData,
    Subscription, TEXT_CONTENT_ATTR, TEXT_TYPE_ATTR,
};

use crate::events::{ClipboardData, EditorEvent, Key, KeyEvent};
use crate::render::{block_hash, padding_style, render_text_content, BLOCK_CLASS};

/// Left-margin block handle; shown while hovering, hidden when the pointer
/// leaves the editor.
pub trait BannerDelegate {
    fn show(&mut self, _block_id: &str) {}
    fn hide(&mut self) {}
}

/// Inline formatting pop-over; re-placed whenever a selection lands inside
/// a single text block, and the surface for follower widgets.
pub trait ToolbarDelegate {
    fn show(&mut self, _block_id: &str, _cursor: &Cursor) {}
    fn hide(&mut self) {}
    fn widget_requested(&mut self, _event: &FollowerWidgetEvent) {}
}

pub struct EditorOptions {
    /// Text types a new block inherits when Enter splits a block of that
    /// type (bulleted lists keep producing bullets).
    pub preserved_text_types: HashSet<String>,
    pub banner: Option<Box<dyn BannerDelegate>>,
    pub toolbar: Option<Box<dyn ToolbarDelegate>>,
}

impl Default for EditorOptions {
    fn default() -> Self {
        EditorOptions {
            preserved_text_types: [text_type::BULLETED.to_string()].into_iter().collect(),
            banner: None,
            toolbar: None,
        }
    }
}

/// What the reconciler needs to know about one block, captured under the
/// state borrow so the DOM mutation phase runs without it.
struct BlockPlan {
    id: String,
    ty: String,
    data: NodeData,
    text_delta: Option<Delta>,
    editable: bool,
    runtime: Option<Box<dyn Block>>,
}

pub struct Editor {
    controller: Rc<Controller>,
    dom: DomTree,
    body_el: DomId,
    selection: Option<DomSelection>,
    dom_map: HashMap<String, DomId>,
    block_runtimes: HashMap<String, Box<dyn Block>>,
    content_hashes: HashMap<String, u64>,
    composing: bool,
    preserved_text_types: HashSet<String>,
    banner: Option<Box<dyn BannerDelegate>>,
    toolbar: Option<Box<dyn ToolbarDelegate>>,
    pending_applied: Rc<RefCell<Vec<ChangesetApplied>>>,
    pending_cursor: Rc<RefCell<Option<Option<Cursor>>>>,
    pending_widgets: Rc<RefCell<Vec<FollowerWidgetEvent>>>,
    subscriptions: Vec<Subscription>,
}

impl Editor {
    pub fn new(controller: Rc<Controller>, options: EditorOptions) -> Editor {
        let mut dom = DomTree::new("div");
        let root = dom.root();
        dom.set_attribute(root, "class", "tabula-editor");
        dom.set_attribute(root, "contenteditable", "true");
        let controller_options = controller.options();
        dom.set_attribute(
            root,
            "spellcheck",
            if controller_options.spellcheck { "true" } else { "false" },
        );
        dom.set_attribute(root, "data-placeholder", &controller_options.empty_placeholder);
        if let Some(style) = padding_style(&controller_options.padding) {
            dom.set_attribute(root, "style", &style);
        }
        let body_el = dom.create_element("div");
        dom.set_attribute(body_el, "class", "tabula-editor-body");
        dom.append_child(root, body_el);

        let pending_applied: Rc<RefCell<Vec<ChangesetApplied>>> = Rc::new(RefCell::new(Vec::new()));
        let pending_cursor: Rc<RefCell<Option<Option<Cursor>>>> = Rc::new(RefCell::new(None));
        let pending_widgets: Rc<RefCell<Vec<FollowerWidgetEvent>>> = Rc::new(RefCell::new(Vec::new()));

        let mut subscriptions = Vec::new();
        {
            let buffer = Rc::clone(&pending_applied);
            let state = controller.state().borrow();
            subscriptions.push(state.changeset_applied().subscribe(move |event| {
                buffer.borrow_mut().push(event.clone());
            }));
            let cursor_buffer = Rc::clone(&pending_cursor);
            subscriptions.push(state.cursor_changed().subscribe(move |event| {
                // Selection-originated cursor moves came from the browser;
                // re-placing them would fight the user.
                if event.reason != CursorReason::BrowserSelection {
                    *cursor_buffer.borrow_mut() = Some(event.cursor.clone());
                }
            }));
        }
        {
            let widgets = Rc::clone(&pending_widgets);
            subscriptions.push(controller.follower_widget_requested().subscribe(move |event| {
                widgets.borrow_mut().push(event.clone());
            }));
        }

        let mut editor = Editor {
            controller,
            dom,
            body_el,
            selection: None,
            dom_map: HashMap::new(),
            block_runtimes: HashMap::new(),
            content_hashes: HashMap::new(),
            composing: false,
            preserved_text_types: options.preserved_text_types,
            banner: options.banner,
            toolbar: options.toolbar,
            pending_applied,
            pending_cursor,
            pending_widgets,
            subscriptions,
        };
        editor.render(true);
        editor
    }

    // ---- host surface ----

    pub fn controller(&self) -> &Rc<Controller> {
        &self.controller
    }

    pub fn dom(&self) -> &DomTree {
        &self.dom
    }

    /// Mutable DOM access for the host's contenteditable mutations.
    pub fn dom_mut(&mut self) -> &mut DomTree {
        &mut self.dom
    }

    pub fn block_dom(&self, id: &str) -> Option<DomId> {
        self.dom_map.get(id).copied()
    }

    pub fn dom_selection(&self) -> Option<&DomSelection> {
        self.selection.as_ref()
    }

    /// The host updates the selection it owns in a real browser.
    pub fn set_dom_selection(&mut self, selection: Option<DomSelection>) {
        self.selection = selection;
    }

    pub fn is_composing(&self) -> bool {
        self.composing
    }

    /// Animation-frame tick: flush queued work and reconcile.
    pub fn frame(&mut self) {
        self.controller.flush_next_tick();
        self.render(false);
    }

    /// Tear down listeners; the editor and controller are inert afterwards.
    pub fn dispose(&mut self) {
        self.subscriptions.clear();
        self.controller.dispose();
    }

    pub fn handle_event(&mut self, event: EditorEvent) {
        match event {
            EditorEvent::SelectionChange => self.handle_selection_change(),
            EditorEvent::Input => self.handle_input(),
            EditorEvent::CompositionStart => {
                self.composing = true;
            }
            EditorEvent::CompositionEnd => {
                // The DOM was ground truth while composing; reconcile once
                // now that the IME committed.
                self.composing = false;
                self.handle_input();
            }
            EditorEvent::KeyDown(key) => self.handle_keydown(key),
            EditorEvent::Paste(data) => self.handle_paste(data),
            EditorEvent::MouseLeave => {
                if let Some(banner) = &mut self.banner {
                    banner.hide();
                }
            }
        }
    }

    // ---- selection → model ----

    fn handle_selection_change(&mut self) {
        let cursor = self.map_selection_to_cursor();
        EditorState::set_cursor_state(
            self.controller.state(),
            cursor.clone(),
            CursorReason::BrowserSelection,
        );

        // The toolbar follows selections inside a single text block.
        let show = cursor.as_ref().and_then(|c| match c {
            Cursor::Open { start_id, end_id, .. } if start_id == end_id && !c.is_collapsed() => {
                let state = self.controller.state().borrow();
                let key = state.get_block_element_by_id(start_id)?;
                state.is_text_like(key).then(|| (start_id.clone(), c.clone()))
            }
            _ => None,
        });
        if let Some(toolbar) = &mut self.toolbar {
            match show {
                Some((id, cursor)) => toolbar.show(&id, &cursor),
                None => toolbar.hide(),
            }
        }
    }

    /// Read the browser selection into a model cursor: walk up from each
    /// endpoint to its block element and ask the block for the absolute
    /// text offset.
    fn map_selection_to_cursor(&self) -> Option<Cursor> {
        let selection = self.selection.as_ref()?;
        let (start, end) = selection.ordered(&self.dom);

        let map_point = |node: DomId, offset: usize| -> Option<(String, usize)> {
            let block_el = match self.dom.closest(node, |t, id| t.has_attribute(id, "data-id")) {
                Some(el) => el,
                // A point on the editor root selects the block at that
                // child index, when there is one.
                None if node == self.dom.root() || node == self.body_el => {
                    let children = self.dom.children(self.body_el);
                    let index = offset.min(children.len().saturating_sub(1));
                    children.get(index).copied()?
                }
                None => return None,
            };
            let id = self.dom.attribute(block_el, "data-id")?.to_string();
            let runtime = self.block_runtimes.get(&id)?;
            let text_offset = runtime.find_text_offset_in_block(&self.dom, block_el, node, offset);
            Some((id, text_offset))
        };

        let (start_id, start_offset) = map_point(start.node, start.offset)?;
        let (end_id, end_offset) = map_point(end.node, end.offset)?;
        if selection.is_caret() {
            Some(Cursor::collapsed(start_id, start_offset))
        } else {
            Some(Cursor::open(start_id, start_offset, end_id, end_offset))
        }
    }

    // ---- input diffing ----

    fn handle_input(&mut self) {
        if self.composing {
            return;
        }
        let cursor = self.controller.state().borrow().cursor().cloned();
        let result = match cursor {
            Some(Cursor::Collapsed { id, offset }) => self.diff_blocks(vec![id], Some(offset)),
            Some(open @ Cursor::Open { .. }) if !open.is_collapsed() => {
                // The browser already collapsed the selection in the DOM;
                // catch the model up, then diff what remains.
                match self.controller.delete_content_inside_in_selection(&open) {
                    Ok(collapsed) => {
                        let hint = collapsed.as_ref().map(|c| c.start_offset());
                        self.diff_blocks(self.mapped_block_ids(), hint)
                    }
                    Err(error) => Err(error),
                }
            }
            _ => self.diff_blocks(self.mapped_block_ids(), None),
        };
        if let Err(error) = result {
            self.recover(error);
            return;
        }
        self.render(false);
    }

    fn mapped_block_ids(&self) -> Vec<String> {
        let state = self.controller.state().borrow();
        // Model order keeps multi-block diffs deterministic.
        state
            .ordered_blocks()
            .iter()
            .filter_map(|&key| state.document().tree().node(key))
            .map(|node| node.id().to_string())
            .filter(|id| self.dom_map.contains_key(id))
            .collect()
    }

    /// Diff the DOM of the given blocks against their text models and
    /// apply all resulting edits in one changeset. The cursor follows the
    /// browser caret.
    fn diff_blocks(&mut self, ids: Vec<String>, offset_hint: Option<usize>) -> Result<(), EngineError> {
        let single = ids.len() == 1;
        let mut changeset = self.controller.create_changeset();
        {
            let state = self.controller.state().borrow();
            for id in &ids {
                let Some(key) = state.get_block_element_by_id(id) else {
                    continue;
                };
                let Some(&element) = self.dom_map.get(id) else {
                    continue;
                };
                if !self.dom.is_alive(element) {
                    continue;
                }
                let Some(node) = state.document().tree().node(key) else {
                    continue;
                };
                let Some(runtime) = self.block_runtimes.get_mut(id) else {
                    continue;
                };
                let hint = if single { offset_hint } else { None };
                runtime.block_content_changed(&self.dom, element, key, node, hint, &mut changeset);
            }
        }
        if changeset.is_empty() {
            return Ok(());
        }
        if let Some(cursor) = self.map_selection_to_cursor() {
            changeset.set_cursor_state(Some(cursor));
        }
        changeset.apply(ApplyOptions::default())?;
        Ok(())
    }

    // ---- keystrokes ----

    fn handle_keydown(&mut self, key: KeyEvent) {
        match key.key {
            // Reserved for indent; swallowed so the browser never inserts
            // a tab character.
            Key::Tab => {}
            // The selection listener keeps the cursor in sync on its own.
            Key::ArrowLeft | Key::ArrowRight | Key::ArrowUp | Key::ArrowDown | Key::Escape => {}
            Key::Enter => {
                if !key.shift {
                    if let Err(error) = self.handle_enter() {
                        self.recover(error);
                    }
                }
            }
            Key::Backspace => {
                if let Err(error) = self.handle_backspace() {
                    self.recover(error);
                }
            }
            Key::Delete => {
                if let Err(error) = self.handle_delete() {
                    self.recover(error);
                }
            }
        }
    }

    /// Split the block at the caret: the head stays, the tail moves into a
    /// fresh sibling, preserved text types carry over, and the caret lands
    /// at offset 0 of the new block.
    fn handle_enter(&mut self) -> Result<(), EngineError> {
        let cursor = self.controller.state().borrow().cursor().cloned();
        let cursor = match cursor {
            Some(open @ Cursor::Open { .. }) if !open.is_collapsed() => {
                self.controller.delete_content_inside_in_selection(&open)?
            }
            Some(other) => Some(other.collapse_to_start()),
            None => None,
        };
        let Some(cursor) = cursor else {
            return Ok(());
        };
        let offset = cursor.start_offset();

        let mut changeset = self.controller.create_changeset();
        let new_id;
        {
            let state = self.controller.state().borrow();
            let Some(key) = state.get_block_element_by_id(cursor.start_id()) else {
                return Ok(());
            };
            if !state.is_text_like(key) {
                return Ok(());
            }
            let document = state.document();
            let node = document.tree().node(key).ok_or(EngineError::DetachedNode)?;
            let model = node.text_content().ok_or(EngineError::DetachedNode)?;
            let len = model.len();
            let tail = model.slice(offset, len);

            let inherited = node
                .attribute(TEXT_TYPE_ATTR)
                .and_then(|a| a.as_json())
                .and_then(|v| v.as_str())
                .filter(|ty| self.preserved_text_types.contains(*ty))
                .map(|ty| ty.to_string());
            let attributes = inherited.map(|ty| {
                let mut map = serde_json::Map::new();
                map.insert(TEXT_TYPE_ATTR.to_string(), serde_json::Value::String(ty));
                map
            });
            let element = state.create_text_element(Some(tail), attributes);
            new_id = element.id.clone();

            let (parent, after) = if key == document.title() {
                (document.body(), None)
            } else {
                (
                    document.tree().parent(key).ok_or(EngineError::DetachedNode)?,
                    Some(key),
                )
            };
            changeset.text_edit(key, TEXT_CONTENT_ATTR, move |model| {
                Delta::new().retain(offset).delete(model.len() - offset)
            });
            changeset.insert_children_after(parent, vec![element], after);
        }
        changeset.set_cursor_state(Some(Cursor::collapsed(new_id, 0)));
        changeset.apply(ApplyOptions::default())?;
        self.render(false);
        Ok(())
    }

    /// Backspace at offset 0 merges into the previous text block; in
    /// mid-text the browser default runs and the input diff picks it up.
    fn handle_backspace(&mut self) -> Result<(), EngineError> {
        let cursor = self.controller.state().borrow().cursor().cloned();
        match cursor {
            Some(open @ Cursor::Open { .. }) if !open.is_collapsed() => {
                self.controller.delete_content_inside_in_selection(&open)?;
                self.render(false);
                Ok(())
            }
            Some(Cursor::Collapsed { id, offset }) if offset == 0 => {
                self.merge_with_previous(&id)?;
                self.render(false);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Delete at end-of-block pulls the next block's content in; the
    /// symmetric counterpart of backspace-at-zero.
    fn handle_delete(&mut self) -> Result<(), EngineError> {
        let cursor = self.controller.state().borrow().cursor().cloned();
        match cursor {
            Some(open @ Cursor::Open { .. }) if !open.is_collapsed() => {
                self.controller.delete_content_inside_in_selection(&open)?;
                self.render(false);
                Ok(())
            }
            Some(Cursor::Collapsed { id, offset }) => {
                let at_end = {
                    let state = self.controller.state().borrow();
                    state.text_len(&id).is_some_and(|len| offset == len)
                };
                if at_end {
                    self.merge_with_next(&id, offset)?;
                    self.render(false);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn merge_with_previous(&mut self, id: &str) -> Result<(), EngineError> {
        let mut changeset = self.controller.create_changeset();
        let final_cursor;
        {
            let state = self.controller.state().borrow();
            let document = state.document();
            let Some(key) = state.get_block_element_by_id(id) else {
                return Ok(());
            };
            // Only body blocks merge; the first body block and the title
            // have nothing before them.
            let Some(index) = document.tree().child_index(key) else {
                return Ok(());
            };
            if document.tree().parent(key) != Some(document.body()) || index == 0 {
                return Ok(());
            }
            let prev = document.body_blocks()[index - 1];

            if !state.is_text_like(prev) {
                changeset.remove_node(prev);
                final_cursor = Some(Cursor::collapsed(id, 0));
            } else {
                let prev_node = document.tree().node(prev).ok_or(EngineError::DetachedNode)?;
                let prev_id = prev_node.id().to_string();
                let prev_len = prev_node.text_content().map(|t| t.len()).unwrap_or(0);
                let current = document
                    .tree()
                    .node(key)
                    .and_then(|n| n.text_content())
                    .map(|t| t.delta().clone())
                    .unwrap_or_default();
                changeset.text_edit(prev, TEXT_CONTENT_ATTR, move |model| {
                    Delta::new().retain(model.len()).concat(&current)
                });
                changeset.remove_node(key);
                final_cursor = Some(Cursor::collapsed(prev_id, prev_len));
            }
        }
        changeset.set_cursor_state(final_cursor);
        changeset.apply(ApplyOptions::default())?;
        Ok(())
    }

    fn merge_with_next(&mut self, id: &str, offset: usize) -> Result<(), EngineError> {
        let mut changeset = self.controller.create_changeset();
        {
            let state = self.controller.state().borrow();
            let document = state.document();
            let Some(key) = state.get_block_element_by_id(id) else {
                return Ok(());
            };
            let next = if key == document.title() {
                document.body_blocks().first().copied()
            } else {
                document
                    .tree()
                    .child_index(key)
                    .and_then(|i| document.body_blocks().get(i + 1).copied())
            };
            let Some(next) = next else {
                return Ok(());
            };

            if !state.is_text_like(next) {
                changeset.remove_node(next);
            } else {
                let next_delta = document
                    .tree()
                    .node(next)
                    .and_then(|n| n.text_content())
                    .map(|t| t.delta().clone())
                    .unwrap_or_default();
                changeset.text_edit(key, TEXT_CONTENT_ATTR, move |model| {
                    Delta::new().retain(model.len()).concat(&next_delta)
                });
                changeset.remove_node(next);
            }
        }
        changeset.set_cursor_state(Some(Cursor::collapsed(id, offset)));
        changeset.apply(ApplyOptions::default())?;
        Ok(())
    }

    // ---- paste ----

    fn handle_paste(&mut self, data: ClipboardData) {
        let result = match (&data.html, &data.plain) {
            (Some(html), _) => match self.controller.paste_html_at_cursor(html) {
                Err(EngineError::ClipboardParse(_)) => {
                    // Unparseable HTML falls back to the plain flavor.
                    match &data.plain {
                        Some(plain) => self.controller.paste_plain_text_at_cursor(plain),
                        None => Ok(()),
                    }
                }
                other => other,
            },
            (None, Some(plain)) => self.controller.paste_plain_text_at_cursor(plain),
            (None, None) => Ok(()),
        };
        if let Err(error) = result {
            self.recover(error);
            return;
        }
        self.render(false);
    }

    // ---- model → DOM ----

    /// Reconcile the DOM against the model and re-place the selection for
    /// model-originated cursor moves.
    pub fn render(&mut self, force: bool) {
        let applied: Vec<ChangesetApplied> = self.pending_applied.borrow_mut().drain(..).collect();
        let force = force || applied.iter().any(|event| event.force_update);
        self.reconcile(force);

        let widgets: Vec<FollowerWidgetEvent> = self.pending_widgets.borrow_mut().drain(..).collect();
        if let Some(toolbar) = &mut self.toolbar {
            for widget in &widgets {
                toolbar.widget_requested(widget);
            }
        }

        let cursor = self.pending_cursor.borrow_mut().take();
        if let Some(cursor) = cursor {
            self.place_model_selection(cursor);
        }
    }

    fn reconcile(&mut self, force: bool) {
        // Plan under the state borrow, mutate the DOM after releasing it.
        let (title_plan, body_plans) = {
            let state = self.controller.state().borrow();
            let document = state.document();
            let title = self.plan_block(&state, document.title());
            let body: Vec<BlockPlan> = document
                .body_blocks()
                .to_vec()
                .into_iter()
                .filter_map(|key| self.plan_block(&state, key))
                .collect();
            (title, body)
        };

        let mut live_ids: HashSet<String> = HashSet::new();
        if let Some(plan) = title_plan {
            live_ids.insert(plan.id.clone());
            let element = self.mount_block(plan, force);
            let root = self.dom.root();
            self.dom.insert_child_at(root, 0, element);
        }
        for (index, plan) in body_plans.into_iter().enumerate() {
            live_ids.insert(plan.id.clone());
            let element = self.mount_block(plan, force);
            let body_el = self.body_el;
            if self.dom.children(body_el).get(index) != Some(&element) {
                self.dom.insert_child_at(body_el, index, element);
            }
        }

        // Unmount blocks gone from the model.
        let stale: Vec<String> = self
            .dom_map
            .keys()
            .filter(|id| !live_ids.contains(*id))
            .cloned()
            .collect();
        for id in stale {
            if let Some(element) = self.dom_map.remove(&id) {
                if let Some(mut runtime) = self.block_runtimes.remove(&id) {
                    runtime.block_will_unmount(&self.dom, element);
                }
                self.dom.remove(element);
            }
            self.content_hashes.remove(&id);
        }
    }

    fn plan_block(&self, state: &EditorState, key: tabula_engine::NodeKey) -> Option<BlockPlan> {
        let document = state.document();
        let node = document.tree().node(key)?;
        let id = node.id().to_string();
        let data = NodeData::from_node(document.tree(), key)?;
        let definition = self.controller.block_registry().get(node.ty())?;
        let title_locked = key == document.title() && !self.controller.options().title_editable;
        let runtime = if self.block_runtimes.contains_key(&id) {
            None
        } else {
            Some(definition.on_block_created(node))
        };
        Some(BlockPlan {
            id,
            ty: node.ty().to_string(),
            data,
            text_delta: node.text_content().map(|t| t.delta().clone()),
            editable: definition.editable() && !title_locked,
            runtime,
        })
    }

    fn mount_block(&mut self, plan: BlockPlan, force: bool) -> DomId {
        let element = match self.dom_map.get(&plan.id) {
            Some(&element) if self.dom.is_alive(element) => element,
            _ => {
                let element = self.dom.create_element("div");
                self.dom.set_attribute(element, "class", BLOCK_CLASS);
                self.dom.set_attribute(element, "data-id", &plan.id);
                self.dom.set_attribute(element, "data-type", &plan.ty);
                if !plan.editable {
                    self.dom.set_attribute(element, "contenteditable", "false");
                }
                let content = self.dom.create_element("div");
                self.dom.set_attribute(content, "class", CONTENT_CLASS);
                self.dom.append_child(element, content);
                self.dom_map.insert(plan.id.clone(), element);
                element
            }
        };

        if let Some(mut runtime) = plan.runtime {
            runtime.block_did_mount(&self.dom, element);
            self.block_runtimes.insert(plan.id.clone(), runtime);
        }

        let hash = block_hash(&plan.data);
        if force || self.content_hashes.get(&plan.id) != Some(&hash) {
            self.content_hashes.insert(plan.id.clone(), hash);
            if let Ok(encoded) = serde_json::to_string(&plan.data) {
                self.dom.set_attribute(element, "data-content", &encoded);
            }
            if let Some(delta) = &plan.text_delta {
                let content = tabula_engine::blocks::content_container(&self.dom, element);
                render_text_content(&mut self.dom, content, delta, self.controller.span_registry());
            }
        }
        element
    }

    /// Map a model cursor back onto the DOM selection. An unknown id is a
    /// no-op now and retried on the next frame.
    fn place_model_selection(&mut self, cursor: Option<Cursor>) {
        let Some(cursor) = cursor else {
            self.selection = None;
            return;
        };
        match &cursor {
            Cursor::Collapsed { id, .. } => {
                let Some(&element) = self.dom_map.get(id) else {
                    *self.pending_cursor.borrow_mut() = Some(Some(cursor));
                    return;
                };
                let Some(runtime) = self.block_runtimes.get_mut(id) else {
                    return;
                };
                if let Some(selection) = runtime.block_focused(&self.dom, element, &cursor) {
                    self.selection = Some(selection);
                }
            }
            Cursor::Open { start_id, start_offset, end_id, end_offset } => {
                let map = |editor: &Editor, id: &str, offset: usize| -> Option<tabula_dom::DomPoint> {
                    let &element = editor.dom_map.get(id)?;
                    let runtime = editor.block_runtimes.get(id)?;
                    let (node, offset) =
                        runtime.get_cursor_dom_by_offset(&editor.dom, element, offset)?;
                    Some(tabula_dom::DomPoint::new(node, offset))
                };
                let (Some(anchor), Some(focus)) = (
                    map(self, start_id, *start_offset),
                    map(self, end_id, *end_offset),
                ) else {
                    *self.pending_cursor.borrow_mut() = Some(Some(cursor));
                    return;
                };
                self.selection = Some(DomSelection::new(anchor, focus));
            }
        }
    }

    /// Recovery for irreconcilable DOM/model disagreements: report the
    /// error and re-render everything from the model.
    fn recover(&mut self, error: EngineError) {
        tracing::debug!("recovering with a full re-render from the model");
        self.controller.report_error(&error);
        self.content_hashes.clear();
        self.render(true);
    }
}
