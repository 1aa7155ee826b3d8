//! Browser-shaped events the host feeds into the editor.
//!
//! The host (an embedding shell, or a test driving the in-memory DOM)
//! plays the browser: it mutates the DOM tree and selection the way
//! contenteditable would, then reports what happened through these events.

/// Keys the editor reacts to on `keydown`. Printable characters never
/// arrive here; the browser mutates the DOM and reports an `Input`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Backspace,
    Delete,
    Tab,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl KeyEvent {
    pub fn plain(key: Key) -> Self {
        KeyEvent {
            key,
            shift: false,
            ctrl: false,
            alt: false,
            meta: false,
        }
    }
}

/// Clipboard flavors available on paste.
#[derive(Debug, Clone, Default)]
pub struct ClipboardData {
    pub html: Option<String>,
    pub plain: Option<String>,
}

#[derive(Debug, Clone)]
pub enum EditorEvent {
    /// The browser selection moved; the editor re-reads it and syncs the
    /// model cursor.
    SelectionChange,
    /// The editable surface mutated (typing, IME commit, autocorrect).
    Input,
    CompositionStart,
    CompositionEnd,
    KeyDown(KeyEvent),
    Paste(ClipboardData),
    /// The pointer left the outer container; hides the banner.
    MouseLeave,
}
