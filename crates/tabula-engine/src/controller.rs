//! The stable public façade: owns the state, the registries, the id
//! generator, the HTML converter and the next-tick queue, and exposes the
//! block/cursor/paste operations embedders and the view layer drive.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use serde_json::Map;
use tracing::warn;

use crate::blocks::{TextBlockDefinition, TitleBlockDefinition};
use crate::changeset::{ApplyOptions, Changeset};
use crate::convert::HtmlConverter;
use crate::delta::attributes::AttributeMap;
use crate::delta::Delta;
use crate::error::EngineError;
use crate::ids::IdGenerator;
use crate::json::{document_from_data, NodeData};
use crate::model::tree::TEXT_CONTENT_ATTR;
use crate::model::{Cursor, Document, NodeKey};
use crate::observable::{Subject, Subscription};
use crate::registry::{BlockDefinition, BlockRegistry, EmbedDefinition, EmbedRegistry, SpanRegistry, SpanStyle};
use crate::state::{CursorChangedEvent, CursorReason, EditorState};

/// Outer padding of the editable region, in pixels; unset sides keep the
/// theme default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Padding {
    pub top: Option<u32>,
    pub right: Option<u32>,
    pub bottom: Option<u32>,
    pub left: Option<u32>,
}

/// A remote peer's cursor, as received from the collaboration transport.
#[derive(Debug, Clone)]
pub struct RemoteCursorEvent {
    pub user_id: String,
    pub cursor: Option<Cursor>,
}

/// Request to show a caret-following widget (slash menus and the like);
/// surfaced through the view's toolbar delegate.
#[derive(Debug, Clone)]
pub struct FollowerWidgetEvent {
    pub cursor: Option<Cursor>,
}

pub struct ControllerOptions {
    /// Initial title text; ignored when `document` is given.
    pub title: Option<String>,
    /// A pre-built document tree.
    pub document: Option<NodeData>,
    pub init_version: u64,
    /// Block definitions registered on top of the built-in Title/Text.
    pub plugins: Vec<Rc<dyn BlockDefinition>>,
    /// Span styles registered on top of the defaults.
    pub span_styles: Vec<SpanStyle>,
    pub embeds: Vec<Rc<dyn EmbedDefinition>>,
    pub padding: Padding,
    pub empty_placeholder: String,
    pub spellcheck: bool,
    pub title_editable: bool,
    /// Session prefix for minted block ids, so collaborating peers never
    /// collide.
    pub id_session: Option<String>,
    pub url_launcher: Option<Box<dyn Fn(&str)>>,
    pub on_error: Option<Box<dyn Fn(&EngineError)>>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        ControllerOptions {
            title: None,
            document: None,
            init_version: 0,
            plugins: Vec::new(),
            span_styles: Vec::new(),
            embeds: Vec::new(),
            padding: Padding::default(),
            empty_placeholder: "Empty content".to_string(),
            spellcheck: true,
            title_editable: true,
            id_session: None,
            url_launcher: None,
            on_error: None,
        }
    }
}

type NextTickFn = Box<dyn FnOnce(&Controller)>;

pub struct Controller {
    state: Rc<RefCell<EditorState>>,
    options: ControllerOptions,
    ids: Rc<IdGenerator>,
    blocks: Rc<BlockRegistry>,
    spans: Rc<SpanRegistry>,
    embeds: Rc<EmbedRegistry>,
    converter: HtmlConverter,
    next_tick: RefCell<VecDeque<NextTickFn>>,
    cursor_changed: Subject<CursorChangedEvent>,
    before_apply_cursor_changed: Subject<RemoteCursorEvent>,
    follower_widget_requested: Subject<FollowerWidgetEvent>,
    remote_cursors: RefCell<HashMap<String, Option<Cursor>>>,
    subscriptions: RefCell<Vec<Subscription>>,
}

impl Controller {
    pub fn new(options: ControllerOptions) -> Result<Rc<Controller>, EngineError> {
        let ids = Rc::new(match &options.id_session {
            Some(session) => IdGenerator::with_session(session),
            None => IdGenerator::new(),
        });

        let spans = Rc::new(SpanRegistry::with_defaults());
        for style in &options.span_styles {
            spans.register(style.clone())?;
        }
        spans.seal();

        let blocks = Rc::new(BlockRegistry::new());
        blocks.register(Rc::new(TitleBlockDefinition::new(Rc::clone(&spans))))?;
        blocks.register(Rc::new(TextBlockDefinition::new(Rc::clone(&spans))))?;
        for plugin in &options.plugins {
            blocks.register(Rc::clone(plugin))?;
        }
        blocks.seal();

        let embeds = Rc::new(EmbedRegistry::new());
        for embed in &options.embeds {
            embeds.register(Rc::clone(embed))?;
        }
        embeds.seal();

        let document = match &options.document {
            Some(data) => document_from_data(data)?,
            None => Document::new(&ids, options.title.as_deref().unwrap_or("")),
        };
        let state = Rc::new(RefCell::new(EditorState::new(
            document,
            Rc::clone(&ids),
            Rc::clone(&blocks),
            options.init_version,
        )));

        let converter = HtmlConverter::new(Rc::clone(&ids), Rc::clone(&blocks), Rc::clone(&spans));
        let controller = Rc::new(Controller {
            state,
            options,
            ids,
            blocks,
            spans,
            embeds,
            converter,
            next_tick: RefCell::new(VecDeque::new()),
            cursor_changed: Subject::new(),
            before_apply_cursor_changed: Subject::new(),
            follower_widget_requested: Subject::new(),
            remote_cursors: RefCell::new(HashMap::new()),
            subscriptions: RefCell::new(Vec::new()),
        });

        // Re-emit the state's cursor stream on the controller surface,
        // where collaborative cursor broadcasting subscribes.
        let weak = Rc::downgrade(&controller);
        let sub = controller
            .state
            .borrow()
            .cursor_changed()
            .subscribe(move |event| {
                if let Some(controller) = weak.upgrade() {
                    controller.cursor_changed.emit(event);
                }
            });
        controller.subscriptions.borrow_mut().push(sub);

        Ok(controller)
    }

    // ---- accessors ----

    pub fn state(&self) -> &Rc<RefCell<EditorState>> {
        &self.state
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    pub fn ids(&self) -> &Rc<IdGenerator> {
        &self.ids
    }

    pub fn block_registry(&self) -> &Rc<BlockRegistry> {
        &self.blocks
    }

    pub fn span_registry(&self) -> &Rc<SpanRegistry> {
        &self.spans
    }

    pub fn embed_registry(&self) -> &Rc<EmbedRegistry> {
        &self.embeds
    }

    pub fn converter(&self) -> &HtmlConverter {
        &self.converter
    }

    pub fn cursor_changed(&self) -> Subject<CursorChangedEvent> {
        self.cursor_changed.clone()
    }

    pub fn before_apply_cursor_changed(&self) -> Subject<RemoteCursorEvent> {
        self.before_apply_cursor_changed.clone()
    }

    pub fn follower_widget_requested(&self) -> Subject<FollowerWidgetEvent> {
        self.follower_widget_requested.clone()
    }

    pub fn create_changeset(&self) -> Changeset {
        Changeset::new(&self.state)
    }

    /// Route a recoverable error to the embedder's `on_error` hook.
    pub fn report_error(&self, error: &EngineError) {
        warn!(%error, "editor error");
        if let Some(on_error) = &self.options.on_error {
            on_error(error);
        }
    }

    /// Launch a clicked link through the embedder's hook.
    pub fn launch_url(&self, url: &str) {
        if let Some(launcher) = &self.options.url_launcher {
            launcher(url);
        }
    }

    // ---- next tick ----

    /// Queue work for after the current apply/render pass; flushed by the
    /// view once per animation frame.
    pub fn enqueue_next_tick(&self, f: impl FnOnce(&Controller) + 'static) {
        self.next_tick.borrow_mut().push_back(Box::new(f));
    }

    /// Run the callbacks queued so far. Callbacks enqueued while flushing
    /// run on the next flush.
    pub fn flush_next_tick(&self) {
        let queued: Vec<NextTickFn> = self.next_tick.borrow_mut().drain(..).collect();
        for f in queued {
            f(self);
        }
    }

    // ---- cursor ----

    pub fn set_cursor_state(&self, cursor: Option<Cursor>, reason: CursorReason) {
        EditorState::set_cursor_state(&self.state, cursor, reason);
    }

    /// The block the cursor start sits in.
    pub fn get_block_element_at_cursor(&self) -> Option<(String, NodeKey)> {
        let state = self.state.borrow();
        let cursor = state.cursor()?;
        let key = state.get_block_element_by_id(cursor.start_id())?;
        Some((cursor.start_id().to_string(), key))
    }

    /// Move the caret into the document: end of the title.
    pub fn focus(&self) {
        let cursor = {
            let state = self.state.borrow();
            let title = state.document().title();
            state.document().tree().node(title).map(|node| {
                let len = node.text_content().map(|t| t.len()).unwrap_or(0);
                Cursor::collapsed(node.id(), len)
            })
        };
        if let Some(cursor) = cursor {
            self.set_cursor_state(Some(cursor), CursorReason::UiEvent);
        }
    }

    // ---- remote cursors ----

    pub fn apply_cursor_changed_event(&self, event: RemoteCursorEvent) {
        self.before_apply_cursor_changed.emit(&event);
        self.remote_cursors
            .borrow_mut()
            .insert(event.user_id, event.cursor);
    }

    pub fn remote_cursor(&self, user_id: &str) -> Option<Cursor> {
        self.remote_cursors.borrow().get(user_id).cloned().flatten()
    }

    pub fn insert_follower_widget(&self) {
        let cursor = self.state.borrow().cursor().cloned();
        self.follower_widget_requested
            .emit(&FollowerWidgetEvent { cursor });
    }

    // ---- block operations ----

    /// Insert a block element after the block with `after_id`; after the
    /// title means the front of the body. Returns the inserted id and
    /// moves the cursor into text-like insertions.
    pub fn insert_block_after_id(
        &self,
        element: NodeData,
        after_id: &str,
    ) -> Result<String, EngineError> {
        let (parent, after) = {
            let state = self.state.borrow();
            let after_key = state
                .get_block_element_by_id(after_id)
                .ok_or_else(|| EngineError::BlockNotFound(after_id.to_string()))?;
            let document = state.document();
            if after_key == document.title() {
                (document.body(), None)
            } else {
                let parent = document
                    .tree()
                    .parent(after_key)
                    .ok_or(EngineError::DetachedNode)?;
                (parent, Some(after_key))
            }
        };

        let id = element.id.clone();
        let text_like = element_is_text(&element);
        let mut changeset = self.create_changeset();
        changeset.insert_children_after(parent, vec![element], after);
        if text_like {
            changeset.set_cursor_state(Some(Cursor::collapsed(id.clone(), 0)));
        }
        changeset.apply(ApplyOptions::default())?;
        Ok(id)
    }

    pub fn delete_block(&self, id: &str) -> Result<(), EngineError> {
        let key = self
            .state
            .borrow()
            .get_block_element_by_id(id)
            .ok_or_else(|| EngineError::BlockNotFound(id.to_string()))?;
        let mut changeset = self.create_changeset();
        changeset.remove_node(key);
        changeset.apply(ApplyOptions::default())?;
        Ok(())
    }

    // ---- formatting ----

    /// Format the open range with the given attributes, toggling them off
    /// in blocks whose selected run already carries every requested key.
    /// Content length never changes.
    pub fn format_text_on_cursor(
        &self,
        cursor: &Cursor,
        attributes: &AttributeMap,
    ) -> Result<(), EngineError> {
        let spans = self.state.borrow().split_cursor_by_blocks(cursor);
        if spans.is_empty() || attributes.is_empty() {
            return Ok(());
        }
        let mut changeset = self.create_changeset();
        {
            let state = self.state.borrow();
            for span in &spans {
                let (from, to) = (span.start_offset(), span.end_offset());
                if from == to {
                    continue;
                }
                let Some(key) = state.get_block_element_by_id(span.start_id()) else {
                    continue;
                };
                let Some(model) = state.document().tree().node(key).and_then(|n| n.text_content())
                else {
                    continue;
                };
                let effective = if run_carries_all(model, from, to, attributes) {
                    attributes
                        .keys()
                        .map(|k| (k.clone(), serde_json::Value::Null))
                        .collect()
                } else {
                    attributes.clone()
                };
                let change = Delta::new().retain(from).retain_with(to - from, effective);
                changeset.text_edit(key, TEXT_CONTENT_ATTR, move |_| change);
            }
        }
        changeset.set_cursor_state(Some(cursor.clone()));
        changeset.apply(ApplyOptions::default())?;
        Ok(())
    }

    /// Format the currently selected text.
    pub fn format_text_on_selected_text(&self, attributes: &AttributeMap) -> Result<(), EngineError> {
        let Some(cursor) = self.state.borrow().cursor().cloned() else {
            return Ok(());
        };
        self.format_text_on_cursor(&cursor, attributes)
    }

    /// Compose a change into the text at the collapsed cursor; the retain
    /// to the cursor offset is prepended. An open cursor deletes its range
    /// first.
    pub fn apply_delta_at_cursor(&self, delta: Delta) -> Result<(), EngineError> {
        let cursor = self.state.borrow().cursor().cloned();
        let cursor = match cursor {
            Some(open @ Cursor::Open { .. }) if !open.is_collapsed() => {
                self.delete_content_inside_in_selection(&open)?
            }
            Some(other) => Some(other.collapse_to_start()),
            None => None,
        };
        let Some(cursor) = cursor else {
            return Ok(());
        };

        let key = self
            .state
            .borrow()
            .get_block_element_by_id(cursor.start_id())
            .ok_or_else(|| EngineError::BlockNotFound(cursor.start_id().to_string()))?;
        let offset = cursor.start_offset();
        let change = Delta::new().retain(offset).concat(&delta);
        let after_offset = change.transform_index(offset, true);

        let mut changeset = self.create_changeset();
        let edit = change.clone();
        changeset.text_edit(key, TEXT_CONTENT_ATTR, move |_| edit);
        changeset.set_cursor_state(Some(Cursor::collapsed(cursor.start_id(), after_offset)));
        changeset.apply(ApplyOptions::default())?;
        Ok(())
    }

    // ---- open-range delete ----

    /// Delete everything inside an open cursor: the start block keeps its
    /// head and absorbs the end block's tail, blocks strictly between are
    /// removed, non-text start/end blocks are removed whole. Returns the
    /// collapsed cursor the deletion leaves behind.
    pub fn delete_content_inside_in_selection(
        &self,
        cursor: &Cursor,
    ) -> Result<Option<Cursor>, EngineError> {
        let cursor = self.state.borrow().cursor_in_document_order(cursor);
        let (start_id, start_offset, end_id, end_offset) = match cursor {
            Cursor::Open { start_id, start_offset, end_id, end_offset } => {
                (start_id, start_offset, end_id, end_offset)
            }
            collapsed => return Ok(Some(collapsed)),
        };
        if start_id == end_id && start_offset == end_offset {
            let collapsed = Cursor::collapsed(start_id, start_offset);
            self.set_cursor_state(Some(collapsed.clone()), CursorReason::UserInput);
            return Ok(Some(collapsed));
        }

        let mut changeset = self.create_changeset();
        let final_cursor;
        {
            let state = self.state.borrow();
            if start_id == end_id {
                let key = state
                    .get_block_element_by_id(&start_id)
                    .ok_or_else(|| EngineError::BlockNotFound(start_id.clone()))?;
                changeset.text_edit(key, TEXT_CONTENT_ATTR, move |_| {
                    Delta::new().retain(start_offset).delete(end_offset - start_offset)
                });
                final_cursor = Some(Cursor::collapsed(start_id.clone(), start_offset));
            } else {
                let blocks = state.blocks_between(&start_id, &end_id);
                if blocks.len() < 2 {
                    return Err(EngineError::InvariantViolation(
                        "open cursor endpoints are not in the document".to_string(),
                    ));
                }
                let start_key = blocks[0];
                let end_key = blocks[blocks.len() - 1];
                let start_text = state.is_text_like(start_key);

                let tail: Delta = state
                    .document()
                    .tree()
                    .node(end_key)
                    .and_then(|n| n.text_content())
                    .map(|model| model.slice(end_offset, model.len()))
                    .unwrap_or_default();

                if start_text {
                    let absorbed = tail.clone();
                    changeset.text_edit(start_key, TEXT_CONTENT_ATTR, move |model| {
                        Delta::new()
                            .retain(start_offset)
                            .delete(model.len() - start_offset)
                            .concat(&absorbed)
                    });
                } else {
                    changeset.remove_node(start_key);
                }
                for &middle in &blocks[1..blocks.len() - 1] {
                    changeset.remove_node(middle);
                }
                changeset.remove_node(end_key);

                final_cursor = if start_text {
                    Some(Cursor::collapsed(start_id.clone(), start_offset))
                } else {
                    // The first block after the removed range survives.
                    let ordered = state.ordered_blocks();
                    ordered
                        .iter()
                        .position(|&k| k == end_key)
                        .and_then(|pos| ordered.get(pos + 1))
                        .and_then(|&k| state.document().tree().node(k))
                        .map(|node| Cursor::collapsed(node.id(), 0))
                };
            }
        }
        changeset.set_cursor_state(final_cursor.clone());
        changeset.apply(ApplyOptions::default())?;
        Ok(final_cursor)
    }

    // ---- paste ----

    /// Parse clipboard HTML and insert the result at the cursor. A parse
    /// failure is returned so the caller can fall back to the plain-text
    /// clipboard flavor.
    pub fn paste_html_at_cursor(&self, html: &str) -> Result<(), EngineError> {
        let elements = self.converter.parse_html(html)?;
        self.paste_elements_at_cursor(elements)
    }

    /// Insert plain text at the cursor: the first line composes in place,
    /// every following line becomes its own Text block.
    pub fn paste_plain_text_at_cursor(&self, text: &str) -> Result<(), EngineError> {
        if text.is_empty() {
            return Ok(());
        }
        let mut lines = text.split('\n');
        let first = lines.next().unwrap_or_default().to_string();
        let rest: Vec<NodeData> = {
            let state = self.state.borrow();
            lines
                .map(|line| {
                    let delta = if line.is_empty() {
                        Delta::new()
                    } else {
                        Delta::new().insert(line)
                    };
                    state.create_text_element(Some(delta), None)
                })
                .collect()
        };
        if rest.is_empty() {
            if first.is_empty() {
                return Ok(());
            }
            return self.apply_delta_at_cursor(Delta::new().insert(first));
        }
        let mut elements = Vec::with_capacity(rest.len() + 1);
        elements.push({
            let state = self.state.borrow();
            state.create_text_element(Some(Delta::new().insert(first)), None)
        });
        elements.extend(rest);
        self.paste_elements_at_cursor(elements)
    }

    /// Insert block elements at the cursor, merging a leading text element
    /// into the current text block and re-homing the split-off tail after
    /// the insertion.
    pub fn paste_elements_at_cursor(&self, elements: Vec<NodeData>) -> Result<(), EngineError> {
        let elements: Vec<NodeData> = elements
            .into_iter()
            .filter(|element| {
                if self.blocks.contains(&element.t) {
                    true
                } else {
                    crate::state::warn_unknown_block(&element.t);
                    false
                }
            })
            .collect();
        if elements.is_empty() {
            return Ok(());
        }

        // Resolve to a collapsed insertion point.
        let cursor = self.state.borrow().cursor().cloned();
        let cursor = match cursor {
            Some(open @ Cursor::Open { .. }) if !open.is_collapsed() => {
                self.delete_content_inside_in_selection(&open)?
            }
            Some(other) => Some(other.collapse_to_start()),
            None => None,
        };

        let mut changeset = self.create_changeset();
        let final_cursor;
        {
            let state = self.state.borrow();
            let document = state.document();
            let body = document.body();

            let anchor = cursor
                .as_ref()
                .and_then(|c| state.get_block_element_by_id(c.start_id()));
            let offset = cursor.as_ref().map(|c| c.start_offset()).unwrap_or(0);
            let base_index = match anchor {
                Some(key) if document.tree().parent(key) == Some(body) => {
                    document.tree().child_index(key).unwrap_or(0) + 1
                }
                // The title: pasted blocks go to the front of the body.
                Some(_) => 0,
                None => document.body_blocks().len(),
            };
            let anchor_text = anchor.map(|k| state.is_text_like(k)).unwrap_or(false);

            let mut elements = elements;
            if anchor_text && element_is_text(&elements[0]) {
                let anchor_key = anchor.expect("text anchor resolved above");
                let anchor_id = cursor
                    .as_ref()
                    .map(|c| c.start_id().to_string())
                    .expect("anchor implies cursor");
                let model = document
                    .tree()
                    .node(anchor_key)
                    .and_then(|n| n.text_content())
                    .expect("text-like anchor has content");
                let tail = model.slice(offset, model.len());

                let mut iter = elements.into_iter();
                let first = iter.next().expect("elements are non-empty");
                let mut rest: Vec<NodeData> = iter.collect();
                let first_delta = first.text_attribute(TEXT_CONTENT_ATTR).unwrap_or_default();
                let first_len = first_delta.len();

                if rest.is_empty() {
                    // Single text element: splice it in at the cursor.
                    let change = Delta::new().retain(offset).concat(&first_delta);
                    changeset.text_edit(anchor_key, TEXT_CONTENT_ATTR, move |_| change);
                    final_cursor = Some(Cursor::collapsed(anchor_id, offset + first_len));
                } else {
                    // Head + first merged element stay; the tail re-homes
                    // after the last pasted block.
                    let merge = Delta::new()
                        .retain(offset)
                        .delete(model.len() - offset)
                        .concat(&first_delta);
                    changeset.text_edit(anchor_key, TEXT_CONTENT_ATTR, move |_| merge);

                    if tail.len() > 0 {
                        let last_is_text = rest.last().map(element_is_text).unwrap_or(false);
                        if last_is_text {
                            let last = rest.last_mut().expect("rest is non-empty");
                            let last_delta =
                                last.text_attribute(TEXT_CONTENT_ATTR).unwrap_or_default();
                            let junction = last_delta.len();
                            set_text_attribute(last, &last_delta.concat(&tail));
                            final_cursor = Some(Cursor::collapsed(last.id.clone(), junction));
                        } else {
                            let trailing = state.create_text_element(Some(tail), None);
                            final_cursor = Some(Cursor::collapsed(trailing.id.clone(), 0));
                            rest.push(trailing);
                        }
                    } else {
                        final_cursor = match rest.last() {
                            Some(last) if element_is_text(last) => Some(Cursor::collapsed(
                                last.id.clone(),
                                last.text_attribute(TEXT_CONTENT_ATTR)
                                    .map(|d| d.len())
                                    .unwrap_or(0),
                            )),
                            _ => Some(Cursor::collapsed(anchor_id, offset + first_len)),
                        };
                    }
                    changeset.insert_children_at(body, base_index, rest);
                }
            } else if anchor_text {
                // A leading non-text block into a text block: split the
                // text, slot the blocks between the halves.
                let anchor_key = anchor.expect("text anchor resolved above");
                let anchor_id = cursor
                    .as_ref()
                    .map(|c| c.start_id().to_string())
                    .expect("anchor implies cursor");
                let model = document
                    .tree()
                    .node(anchor_key)
                    .and_then(|n| n.text_content())
                    .expect("text-like anchor has content");
                let tail = model.slice(offset, model.len());
                let truncate_len = model.len() - offset;
                if truncate_len > 0 {
                    changeset.text_edit(anchor_key, TEXT_CONTENT_ATTR, move |_| {
                        Delta::new().retain(offset).delete(truncate_len)
                    });
                }

                let mut to_insert = elements;
                if tail.len() > 0 {
                    let trailing = state.create_text_element(Some(tail), None);
                    final_cursor = Some(Cursor::collapsed(trailing.id.clone(), 0));
                    to_insert.push(trailing);
                } else {
                    final_cursor = last_text_cursor(&to_insert)
                        .or_else(|| Some(Cursor::collapsed(anchor_id, offset)));
                }
                changeset.insert_children_at(body, base_index, to_insert);
            } else {
                final_cursor = last_text_cursor(&elements).or_else(|| cursor.clone());
                changeset.insert_children_at(body, base_index, elements);
            }
        }
        changeset.set_cursor_state(final_cursor);
        changeset.apply(ApplyOptions::default())?;
        Ok(())
    }

    // ---- teardown ----

    /// Drop every stream observer and queued callback. The controller is
    /// inert afterwards; the view calls this from its own dispose.
    pub fn dispose(&self) {
        self.subscriptions.borrow_mut().clear();
        self.next_tick.borrow_mut().clear();
        self.cursor_changed.clear();
        self.before_apply_cursor_changed.clear();
        self.follower_widget_requested.clear();
        let state = self.state.borrow();
        state.new_block_created().clear();
        state.block_will_delete().clear();
        state.cursor_changed().clear();
        state.changeset_applied().clear();
    }
}

fn element_is_text(element: &NodeData) -> bool {
    element.attributes.contains_key(TEXT_CONTENT_ATTR)
}

fn set_text_attribute(element: &mut NodeData, delta: &Delta) {
    let ops = serde_json::to_value(delta).unwrap_or(serde_json::Value::Array(Vec::new()));
    let mut map = Map::new();
    map.insert("ops".to_string(), ops);
    element
        .attributes
        .insert(TEXT_CONTENT_ATTR.to_string(), serde_json::Value::Object(map));
}

/// Caret at the end of the last text-like element of a pasted batch.
fn last_text_cursor(elements: &[NodeData]) -> Option<Cursor> {
    elements
        .iter()
        .rev()
        .find(|e| element_is_text(e))
        .map(|e| {
            let len = e
                .text_attribute(TEXT_CONTENT_ATTR)
                .map(|d| d.len())
                .unwrap_or(0);
            Cursor::collapsed(e.id.clone(), len)
        })
}

/// True when every op of the selected run carries all requested keys with
/// equal values (the toggle-off condition).
fn run_carries_all(
    model: &crate::model::TextModel,
    from: usize,
    to: usize,
    attributes: &AttributeMap,
) -> bool {
    let slice = model.slice(from, to);
    if slice.ops().is_empty() {
        return false;
    }
    slice.ops().iter().all(|op| match op.attributes() {
        Some(op_attrs) => attributes.iter().all(|(k, v)| op_attrs.get(k) == Some(v)),
        None => false,
    })
}
