//! Arena-backed DOM tree, selection model and HTML fragment parsing.
//!
//! This crate is the editable surface the tabula editor projects into. It
//! knows nothing about blocks or deltas; it offers a plain tree of elements
//! and text nodes, browser-style anchor/focus selection points, and a
//! tolerant HTML parser for clipboard fragments.

pub mod parser;
pub mod selection;
pub mod tree;

pub use parser::{parse_fragment, HtmlParseError};
pub use selection::{DomPoint, DomSelection};
pub use tree::{DomId, DomNode, DomTree};
