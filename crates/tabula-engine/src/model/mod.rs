pub mod cursor;
pub mod location;
pub mod text;
pub mod tree;

pub use cursor::Cursor;
pub use location::{Location, PathComponent};
pub use text::TextModel;
pub use tree::{
    AttrValue, DocTree, Document, Node, NodeKey, BODY_TYPE, DOCUMENT_TYPE, TEXT_BLOCK_TYPE,
    TEXT_CONTENT_ATTR, TEXT_TYPE_ATTR, TITLE_BLOCK_TYPE,
};
