use thiserror::Error;

/// Errors surfaced across the engine boundary.
///
/// Recoverable conditions (out-of-range cursors, unknown pasted types) are
/// absorbed close to where they happen and logged; these variants cover the
/// cases a caller can meaningfully react to.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a changeset is already being applied; schedule follow-up edits for the next tick")]
    ReentrantApply,

    #[error("changeset was already applied")]
    AlreadyApplied,

    #[error("unknown block type {0:?}")]
    UnknownBlockType(String),

    #[error("no block with id {0:?}")]
    BlockNotFound(String),

    #[error("node is not in the document")]
    DetachedNode,

    #[error("registry is sealed; definitions must be registered before the controller starts")]
    RegistrySealed,

    #[error("block type {0:?} is already registered")]
    DuplicateBlockType(String),

    #[error("document and view disagree: {0}")]
    InvariantViolation(String),

    #[error("malformed document data: {0}")]
    MalformedDocument(String),

    #[error("clipboard HTML could not be parsed")]
    ClipboardParse(#[from] tabula_dom::HtmlParseError),
}
