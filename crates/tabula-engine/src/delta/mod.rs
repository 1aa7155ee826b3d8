//! Rich-text deltas: ordered retain/insert/delete operations with
//! attributes.
//!
//! A delta is either a *document* (inserts only) or a *change* applied to a
//! document. All offsets and lengths count characters. Deltas are kept in
//! canonical form by [`Delta::push`]: no zero-length ops, adjacent ops with
//! equal attributes merged, inserts ordered before deletes at the same
//! position.

pub mod attributes;
pub(crate) mod cursor;
pub mod ops;

use serde::{Deserialize, Serialize};

use attributes::AttributeMap;
use cursor::{OpCursor, OpKind};
pub use ops::{DeltaOp, InsertValue};

/// The object replacement character stands in for embeds when a document is
/// flattened to plain text for diffing.
pub const EMBED_CHAR: char = '\u{fffc}';

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta {
    ops: Vec<DeltaOp>,
}

impl Delta {
    pub fn new() -> Self {
        Delta::default()
    }

    pub fn from_ops(ops: impl IntoIterator<Item = DeltaOp>) -> Self {
        let mut delta = Delta::new();
        for op in ops {
            delta.push(op);
        }
        delta
    }

    pub fn ops(&self) -> &[DeltaOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    // ---- fluent construction ----

    pub fn retain(mut self, n: usize) -> Self {
        self.push(DeltaOp::retain(n));
        self
    }

    pub fn retain_with(mut self, n: usize, attributes: AttributeMap) -> Self {
        self.push(DeltaOp::retain_with(n, attributes));
        self
    }

    pub fn insert(mut self, text: impl Into<String>) -> Self {
        self.push(DeltaOp::insert(text));
        self
    }

    pub fn insert_with(mut self, text: impl Into<String>, attributes: AttributeMap) -> Self {
        self.push(DeltaOp::insert_with(text, attributes));
        self
    }

    pub fn delete(mut self, n: usize) -> Self {
        self.push(DeltaOp::delete(n));
        self
    }

    /// Append an op, keeping the delta canonical: zero-length ops are
    /// dropped, an insert after a delete swaps in front of it, and adjacent
    /// ops with equal attributes merge.
    pub fn push(&mut self, new_op: DeltaOp) {
        if new_op.is_empty() {
            return;
        }
        let mut index = self.ops.len();
        if let Some(DeltaOp::Delete { n: last_n }) = self.ops.last_mut() {
            if let DeltaOp::Delete { n } = &new_op {
                *last_n += n;
                return;
            }
            if matches!(new_op, DeltaOp::Insert { .. }) {
                index -= 1;
            }
        }
        if index > 0 {
            match (&mut self.ops[index - 1], &new_op) {
                (
                    DeltaOp::Insert { value: InsertValue::Text(prev), attributes: prev_attrs },
                    DeltaOp::Insert { value: InsertValue::Text(next), attributes: next_attrs },
                ) if prev_attrs == next_attrs => {
                    prev.push_str(next);
                    return;
                }
                (
                    DeltaOp::Retain { n: prev_n, attributes: prev_attrs },
                    DeltaOp::Retain { n, attributes: next_attrs },
                ) if prev_attrs == next_attrs => {
                    *prev_n += n;
                    return;
                }
                _ => {}
            }
        }
        self.ops.insert(index, new_op);
    }

    /// Drop a trailing attribute-less retain; it is a no-op when composing.
    pub fn chop(&mut self) {
        if let Some(DeltaOp::Retain { attributes: None, .. }) = self.ops.last() {
            self.ops.pop();
        }
    }

    // ---- measurements ----

    /// Total length of inserted content. For a document delta this is the
    /// document length.
    pub fn len(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                DeltaOp::Insert { .. } => op.len(),
                _ => 0,
            })
            .sum()
    }

    /// Length of the document this delta applies to.
    pub fn base_len(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                DeltaOp::Retain { .. } | DeltaOp::Delete { .. } => op.len(),
                DeltaOp::Insert { .. } => 0,
            })
            .sum()
    }

    /// Net length change when applying this delta: inserts minus deletes.
    pub fn change_len(&self) -> isize {
        self.ops
            .iter()
            .map(|op| match op {
                DeltaOp::Insert { .. } => op.len() as isize,
                DeltaOp::Delete { n } => -(*n as isize),
                DeltaOp::Retain { .. } => 0,
            })
            .sum()
    }

    /// True iff the delta is a document: inserts only.
    pub fn is_document(&self) -> bool {
        self.ops.iter().all(|op| matches!(op, DeltaOp::Insert { .. }))
    }

    // ---- combinators ----

    /// The sub-delta covering `[start, end)` in delta space.
    pub fn slice(&self, start: usize, end: usize) -> Delta {
        let mut out = Delta::new();
        let mut cursor = OpCursor::new(&self.ops);
        let mut pos = 0;
        while pos < end && cursor.has_next() {
            if pos < start {
                let skipped = cursor.next_slice(start - pos);
                pos += skipped.len();
            } else {
                let op = cursor.next_slice(end - pos);
                pos += op.len();
                out.push(op);
            }
        }
        out
    }

    /// Append another delta, merging ops across the boundary.
    pub fn concat(&self, other: &Delta) -> Delta {
        let mut out = self.clone();
        for op in &other.ops {
            out.push(op.clone());
        }
        out
    }

    /// Standard composition: the delta that takes the base document straight
    /// to the result of applying `self` then `other`.
    pub fn compose(&self, other: &Delta) -> Delta {
        let mut a = OpCursor::new(&self.ops);
        let mut b = OpCursor::new(&other.ops);
        let mut out = Delta::new();

        while a.has_next() || b.has_next() {
            if b.peek_kind() == OpKind::Insert {
                out.push(b.next_full());
                continue;
            }
            if a.peek_kind() == OpKind::Delete {
                out.push(a.next_full());
                continue;
            }
            let n = a.peek_len().min(b.peek_len());
            let a_op = a.next_slice(n);
            let b_op = b.next_slice(n);
            match b_op {
                DeltaOp::Retain { attributes: b_attrs, .. } => match a_op {
                    DeltaOp::Retain { attributes: a_attrs, .. } => {
                        // Base content is unknown here, so nulls must survive.
                        let merged = attributes::compose(a_attrs.as_ref(), b_attrs.as_ref(), true);
                        out.push(DeltaOp::Retain { n, attributes: merged });
                    }
                    DeltaOp::Insert { value, attributes: a_attrs } => {
                        let merged = attributes::compose(a_attrs.as_ref(), b_attrs.as_ref(), false);
                        out.push(DeltaOp::Insert { value, attributes: merged });
                    }
                    DeltaOp::Delete { .. } => unreachable!("deletes in self are flushed above"),
                },
                DeltaOp::Delete { n } => {
                    // Deleting freshly inserted content cancels out entirely.
                    if matches!(a_op, DeltaOp::Retain { .. }) {
                        out.push(DeltaOp::Delete { n });
                    }
                }
                DeltaOp::Insert { .. } => unreachable!("inserts in other are flushed above"),
            }
        }
        out.chop();
        out
    }

    /// The change that undoes this delta when it was applied to `base`.
    pub fn invert(&self, base: &Delta) -> Delta {
        let mut inverted = Delta::new();
        let mut base_index = 0;
        for op in &self.ops {
            match op {
                DeltaOp::Insert { .. } => {
                    inverted.push(DeltaOp::delete(op.len()));
                }
                DeltaOp::Retain { n, attributes: None } => {
                    inverted.push(DeltaOp::retain(*n));
                    base_index += n;
                }
                DeltaOp::Retain { n, attributes: Some(applied) } => {
                    for base_op in base.slice(base_index, base_index + n).ops {
                        let undo = attributes::invert(applied, base_op.attributes());
                        inverted.push(DeltaOp::Retain {
                            n: base_op.len(),
                            attributes: undo,
                        });
                    }
                    base_index += n;
                }
                DeltaOp::Delete { n } => {
                    for base_op in base.slice(base_index, base_index + n).ops {
                        inverted.push(base_op);
                    }
                    base_index += n;
                }
            }
        }
        inverted.chop();
        inverted
    }

    /// Map a character offset through this change. With `after` set, content
    /// inserted exactly at the offset pushes it right (a caret the user is
    /// typing at); otherwise the offset stays put.
    pub fn transform_index(&self, index: usize, after: bool) -> usize {
        let mut index = index;
        let mut offset = 0;
        for op in &self.ops {
            if offset > index {
                break;
            }
            match op {
                DeltaOp::Delete { n } => {
                    index -= (*n).min(index - offset);
                }
                DeltaOp::Insert { .. } => {
                    let len = op.len();
                    if offset < index || after {
                        index += len;
                    }
                    offset += len;
                }
                DeltaOp::Retain { n, .. } => {
                    offset += n;
                }
            }
        }
        index
    }

    /// Flatten a document delta to plain text, embeds as [`EMBED_CHAR`].
    /// Returns `None` for non-document deltas.
    pub fn document_text(&self) -> Option<String> {
        let mut out = String::new();
        for op in &self.ops {
            match op {
                DeltaOp::Insert { value: InsertValue::Text(s), .. } => out.push_str(s),
                DeltaOp::Insert { value: InsertValue::Embed(_), .. } => out.push(EMBED_CHAR),
                _ => return None,
            }
        }
        Some(out)
    }

    /// A change turning this document into `other`, as a single edit window
    /// between a common prefix and suffix, with attribute repairs on the
    /// retained regions. `offset_hint` biases the window toward a caret when
    /// repeated characters make the edit position ambiguous ("aa" → "aaa").
    ///
    /// Both deltas must be documents; anything else degrades to a full
    /// replacement, which still composes correctly.
    pub fn diff(&self, other: &Delta, offset_hint: Option<usize>) -> Delta {
        if self.ops == other.ops {
            return Delta::new();
        }
        let (Some(a_text), Some(b_text)) = (self.document_text(), other.document_text()) else {
            let mut out = Delta::new();
            out.push(DeltaOp::delete(self.len()));
            for op in &other.ops {
                out.push(op.clone());
            }
            return out;
        };

        let a: Vec<char> = a_text.chars().collect();
        let b: Vec<char> = b_text.chars().collect();

        let mut prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
        let max_suffix = a.len().min(b.len()) - prefix;
        let mut suffix = a
            .iter()
            .rev()
            .zip(b.iter().rev())
            .take_while(|(x, y)| x == y)
            .count()
            .min(max_suffix);

        let deleted = a.len() - prefix - suffix;
        let inserted = b.len() - prefix - suffix;

        // Slide a pure insert or pure delete left toward the hint while the
        // window contents allow it.
        if let Some(hint) = offset_hint {
            if deleted == 0 && inserted > 0 {
                while prefix > hint && b[prefix - 1] == b[prefix - 1 + inserted] {
                    prefix -= 1;
                    suffix += 1;
                }
            } else if inserted == 0 && deleted > 0 {
                while prefix > hint && a[prefix - 1] == a[prefix - 1 + deleted] {
                    prefix -= 1;
                    suffix += 1;
                }
            }
        }

        let mut a_cursor = OpCursor::new(&self.ops);
        let mut b_cursor = OpCursor::new(&other.ops);
        let mut out = Delta::new();

        retain_region(&mut out, &mut a_cursor, &mut b_cursor, prefix);
        if deleted > 0 {
            let mut remaining = deleted;
            while remaining > 0 {
                let n = a_cursor.peek_len().min(remaining);
                a_cursor.next_slice(n);
                remaining -= n;
            }
            out.push(DeltaOp::delete(deleted));
        }
        let mut remaining = inserted;
        while remaining > 0 {
            let op = b_cursor.next_slice(remaining);
            remaining -= op.len();
            out.push(op);
        }
        retain_region(&mut out, &mut a_cursor, &mut b_cursor, suffix);

        out.chop();
        out
    }
}

/// Walk `len` characters of both documents in lockstep, retaining content
/// and patching attribute differences. Embeds whose payloads differ are
/// replaced outright since attributes cannot express the change.
fn retain_region(out: &mut Delta, a: &mut OpCursor, b: &mut OpCursor, len: usize) {
    let mut remaining = len;
    while remaining > 0 {
        let n = a.peek_len().min(b.peek_len()).min(remaining);
        let a_op = a.next_slice(n);
        let b_op = b.next_slice(n);
        remaining -= n;

        if let (
            DeltaOp::Insert { value: InsertValue::Embed(a_v), .. },
            DeltaOp::Insert { value: InsertValue::Embed(b_v), .. },
        ) = (&a_op, &b_op)
        {
            if a_v != b_v {
                out.push(b_op.clone());
                out.push(DeltaOp::delete(1));
                continue;
            }
        }
        let patch = attributes::diff(a_op.attributes(), b_op.attributes());
        out.push(DeltaOp::Retain { n, attributes: patch });
    }
}
