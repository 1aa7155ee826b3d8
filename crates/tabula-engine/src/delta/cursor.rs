use super::ops::{DeltaOp, InsertValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpKind {
    Retain,
    Insert,
    Delete,
}

/// A consuming reader over an op list that can split operations at arbitrary
/// character boundaries. Past the end it yields an implicit plain retain, so
/// two deltas of different base lengths can be walked in lockstep.
pub(crate) struct OpCursor<'a> {
    ops: &'a [DeltaOp],
    index: usize,
    offset: usize,
}

impl<'a> OpCursor<'a> {
    pub fn new(ops: &'a [DeltaOp]) -> Self {
        OpCursor { ops, index: 0, offset: 0 }
    }

    pub fn has_next(&self) -> bool {
        self.index < self.ops.len()
    }

    pub fn peek_len(&self) -> usize {
        match self.ops.get(self.index) {
            Some(op) => op.len() - self.offset,
            None => usize::MAX,
        }
    }

    pub fn peek_kind(&self) -> OpKind {
        match self.ops.get(self.index) {
            Some(DeltaOp::Retain { .. }) | None => OpKind::Retain,
            Some(DeltaOp::Insert { .. }) => OpKind::Insert,
            Some(DeltaOp::Delete { .. }) => OpKind::Delete,
        }
    }

    /// Consume the whole remainder of the current op.
    pub fn next_full(&mut self) -> DeltaOp {
        let n = self.peek_len();
        self.next_slice(n)
    }

    /// Consume up to `n` characters of the current op.
    pub fn next_slice(&mut self, n: usize) -> DeltaOp {
        let Some(op) = self.ops.get(self.index) else {
            return DeltaOp::retain(n);
        };
        let remaining = op.len() - self.offset;
        let take = n.min(remaining);
        let start = self.offset;

        if take == remaining {
            self.index += 1;
            self.offset = 0;
        } else {
            self.offset += take;
        }

        match op {
            DeltaOp::Retain { attributes, .. } => DeltaOp::Retain {
                n: take,
                attributes: attributes.clone(),
            },
            DeltaOp::Delete { .. } => DeltaOp::Delete { n: take },
            DeltaOp::Insert { value, attributes } => {
                let value = match value {
                    InsertValue::Text(s) => {
                        InsertValue::Text(s.chars().skip(start).take(take).collect())
                    }
                    // Embeds are length 1 and never split.
                    InsertValue::Embed(v) => InsertValue::Embed(v.clone()),
                };
                DeltaOp::Insert {
                    value,
                    attributes: attributes.clone(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cursor_splits_text_inserts() {
        let ops = vec![DeltaOp::insert("hello")];
        let mut cursor = OpCursor::new(&ops);

        assert_eq!(cursor.peek_len(), 5);
        assert_eq!(cursor.next_slice(2), DeltaOp::insert("he"));
        assert_eq!(cursor.peek_len(), 3);
        assert_eq!(cursor.next_slice(10), DeltaOp::insert("llo"));
        assert!(!cursor.has_next());
    }

    #[test]
    fn test_cursor_yields_implicit_retain_past_end() {
        let ops = vec![DeltaOp::delete(1)];
        let mut cursor = OpCursor::new(&ops);
        cursor.next_full();

        assert_eq!(cursor.peek_kind(), OpKind::Retain);
        assert_eq!(cursor.next_slice(4), DeltaOp::retain(4));
    }

    #[test]
    fn test_cursor_slices_multibyte_text_by_chars() {
        let ops = vec![DeltaOp::insert("aé🦀b")];
        let mut cursor = OpCursor::new(&ops);

        assert_eq!(cursor.next_slice(3), DeltaOp::insert("aé🦀"));
        assert_eq!(cursor.next_slice(1), DeltaOp::insert("b"));
    }
}
