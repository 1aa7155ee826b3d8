use serde::{Deserialize, Serialize};

/// Where the caret or selection sits, addressed by block id and character
/// offset into the block's text content.
///
/// An open cursor keeps the endpoints the state handed it; orientation into
/// document order is the state's job since only it knows block order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Cursor {
    #[serde(rename_all = "camelCase")]
    Collapsed { id: String, offset: usize },
    #[serde(rename_all = "camelCase")]
    Open {
        start_id: String,
        start_offset: usize,
        end_id: String,
        end_offset: usize,
    },
}

impl Cursor {
    pub fn collapsed(id: impl Into<String>, offset: usize) -> Self {
        Cursor::Collapsed { id: id.into(), offset }
    }

    pub fn open(
        start_id: impl Into<String>,
        start_offset: usize,
        end_id: impl Into<String>,
        end_offset: usize,
    ) -> Self {
        Cursor::Open {
            start_id: start_id.into(),
            start_offset,
            end_id: end_id.into(),
            end_offset,
        }
    }

    /// True for collapsed cursors and for open cursors whose endpoints
    /// coincide.
    pub fn is_collapsed(&self) -> bool {
        match self {
            Cursor::Collapsed { .. } => true,
            Cursor::Open { start_id, start_offset, end_id, end_offset } => {
                start_id == end_id && start_offset == end_offset
            }
        }
    }

    pub fn start_id(&self) -> &str {
        match self {
            Cursor::Collapsed { id, .. } => id,
            Cursor::Open { start_id, .. } => start_id,
        }
    }

    pub fn end_id(&self) -> &str {
        match self {
            Cursor::Collapsed { id, .. } => id,
            Cursor::Open { end_id, .. } => end_id,
        }
    }

    pub fn start_offset(&self) -> usize {
        match self {
            Cursor::Collapsed { offset, .. } => *offset,
            Cursor::Open { start_offset, .. } => *start_offset,
        }
    }

    pub fn end_offset(&self) -> usize {
        match self {
            Cursor::Collapsed { offset, .. } => *offset,
            Cursor::Open { end_offset, .. } => *end_offset,
        }
    }

    /// True if either endpoint references the block.
    pub fn references(&self, block_id: &str) -> bool {
        self.start_id() == block_id || self.end_id() == block_id
    }

    pub fn collapse_to_start(&self) -> Cursor {
        Cursor::collapsed(self.start_id(), self.start_offset())
    }

    pub fn collapse_to_end(&self) -> Cursor {
        Cursor::collapsed(self.end_id(), self.end_offset())
    }
}
