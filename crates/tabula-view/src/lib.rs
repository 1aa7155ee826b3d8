//! The tabula editor view layer.
//!
//! [`Editor`] renders a [`tabula_engine`] document into an editable DOM
//! tree ([`tabula_dom::DomTree`]), listens to browser-shaped events and
//! maps them into changesets, and keeps the DOM selection and the model
//! cursor in sync in both directions.

pub mod editor;
pub mod events;
pub mod render;

pub use editor::{BannerDelegate, Editor, EditorOptions, ToolbarDelegate};
pub use events::{ClipboardData, EditorEvent, Key, KeyEvent};
