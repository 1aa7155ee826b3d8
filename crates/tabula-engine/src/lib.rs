//! The tabula editor engine: a block-structured document model, rich-text
//! deltas, and the transactional changeset pipeline every mutation funnels
//! through.
//!
//! The engine is UI-free; [`tabula-view`](https://docs.rs/tabula-view)
//! projects it onto an editable DOM surface. Embedders talk to the
//! [`controller::Controller`] and observe the state streams.

pub mod blocks;
pub mod changeset;
pub mod controller;
pub mod convert;
pub mod delta;
pub mod error;
pub mod ids;
pub mod json;
pub mod model;
pub mod observable;
pub mod registry;
pub mod state;

// Re-export key types for easier usage
pub use changeset::{ApplyOptions, Changeset, ChangesetOp};
pub use controller::{Controller, ControllerOptions, FollowerWidgetEvent, Padding, RemoteCursorEvent};
pub use delta::{attributes::AttributeMap, Delta, DeltaOp, InsertValue};
pub use error::EngineError;
pub use ids::{is_block_id, IdGenerator};
pub use json::{document_from_data, document_to_data, NodeData};
pub use model::{
    AttrValue, Cursor, DocTree, Document, Location, Node, NodeKey, TextModel, TEXT_BLOCK_TYPE,
    TEXT_CONTENT_ATTR, TEXT_TYPE_ATTR, TITLE_BLOCK_TYPE,
};
pub use observable::{Subject, Subscription};
pub use registry::{Block, BlockDefinition, BlockRegistry, EmbedDefinition, EmbedRegistry, SpanRegistry, SpanStyle};
pub use state::{BlockEvent, ChangesetApplied, CursorChangedEvent, CursorReason, EditorState};
