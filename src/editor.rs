//! Editor session state
//!
//! The document being edited is a plain record. Every change goes through
//! [`EditorState::apply`], which reports whether anything changed, and the
//! statistics shown alongside the editor are derived from it on demand.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Idle time after which a dirty document with a file path is auto-saved
pub const AUTO_SAVE_DELAY: Duration = Duration::from_secs(30);

/// 1-based cursor position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CursorPosition {
    pub line: usize,
    pub column: usize,
}

impl Default for CursorPosition {
    fn default() -> Self {
        Self { line: 1, column: 1 }
    }
}

#[derive(Debug, Clone)]
pub enum EditorAction {
    /// Replace the buffer contents (typing, paste, import)
    SetContent { content: String },
    /// A file was opened; its content is both current and saved
    Loaded { path: PathBuf, content: String },
    /// The current content was written, optionally to a new path
    MarkSaved { path: Option<PathBuf> },
    MoveCursor { line: usize, column: usize },
    /// Start an empty, unsaved document
    New,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorState {
    pub content: String,
    pub saved_content: String,
    pub file_path: Option<PathBuf>,
    pub cursor: CursorPosition,
}

impl EditorState {
    /// Editor opened on unsaved content
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Editor opened on a file just read from disk
    pub fn from_file(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let mut state = Self::default();
        state.apply(EditorAction::Loaded {
            path: path.into(),
            content: content.into(),
        });
        state
    }

    /// Apply one action; returns whether the state changed
    pub fn apply(&mut self, action: EditorAction) -> bool {
        match action {
            EditorAction::SetContent { content } => {
                if self.content == content {
                    return false;
                }
                self.content = content;
                true
            }
            EditorAction::Loaded { path, content } => {
                let changed = self.file_path.as_ref() != Some(&path)
                    || self.content != content
                    || self.saved_content != content;
                self.saved_content = content.clone();
                self.content = content;
                self.file_path = Some(path);
                self.cursor = CursorPosition::default();
                changed
            }
            EditorAction::MarkSaved { path } => {
                let mut changed = false;
                if let Some(path) = path
                    && self.file_path.as_ref() != Some(&path)
                {
                    self.file_path = Some(path);
                    changed = true;
                }
                if self.saved_content != self.content {
                    self.saved_content = self.content.clone();
                    changed = true;
                }
                changed
            }
            EditorAction::MoveCursor { line, column } => {
                let cursor = CursorPosition {
                    line: line.max(1),
                    column: column.max(1),
                };
                if self.cursor == cursor {
                    return false;
                }
                self.cursor = cursor;
                true
            }
            EditorAction::New => {
                let fresh = Self::default();
                if *self == fresh {
                    return false;
                }
                *self = fresh;
                true
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.content != self.saved_content
    }

    /// Auto-save applies only to documents that already have a file
    pub fn should_auto_save(&self, idle: Duration) -> bool {
        self.file_path.is_some() && self.is_dirty() && idle >= AUTO_SAVE_DELAY
    }

    pub fn stats(&self) -> DocumentStats {
        DocumentStats::of(&self.content, self.is_dirty())
    }
}

/// Counts shown in the editor status bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStats {
    /// Whitespace-separated words
    pub words: usize,
    /// Unicode scalar values
    pub characters: usize,
    /// Newline count plus one; an empty document has one line
    pub lines: usize,
    pub dirty: bool,
}

impl DocumentStats {
    pub fn of(content: &str, dirty: bool) -> Self {
        Self {
            words: content.split_whitespace().count(),
            characters: content.chars().count(),
            lines: content.matches('\n').count() + 1,
            dirty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_clean() {
        let state = EditorState::default();
        assert!(!state.is_dirty());
        assert_eq!(state.cursor, CursorPosition { line: 1, column: 1 });
        assert_eq!(
            state.stats(),
            DocumentStats {
                words: 0,
                characters: 0,
                lines: 1,
                dirty: false
            }
        );
    }

    #[test]
    fn test_inline_content_is_dirty() {
        let state = EditorState::with_content("# Draft");
        assert!(state.is_dirty());
        assert!(state.file_path.is_none());
    }

    #[test]
    fn test_edit_then_save_cycle() {
        let mut state = EditorState::from_file("/tmp/notes.md", "hello");
        assert!(!state.is_dirty());

        assert!(state.apply(EditorAction::SetContent {
            content: "hello world".to_string()
        }));
        assert!(state.is_dirty());
        assert!(!state.apply(EditorAction::SetContent {
            content: "hello world".to_string()
        }));

        assert!(state.apply(EditorAction::MarkSaved { path: None }));
        assert!(!state.is_dirty());
        assert_eq!(state.saved_content, "hello world");
        assert!(!state.apply(EditorAction::MarkSaved { path: None }));
    }

    #[test]
    fn test_save_as_changes_path() {
        let mut state = EditorState::with_content("x");
        assert!(state.apply(EditorAction::MarkSaved {
            path: Some(PathBuf::from("/tmp/x.md"))
        }));
        assert_eq!(state.file_path, Some(PathBuf::from("/tmp/x.md")));
        assert!(!state.is_dirty());
    }

    #[test]
    fn test_cursor_is_clamped_to_one_based() {
        let mut state = EditorState::default();
        assert!(state.apply(EditorAction::MoveCursor { line: 3, column: 0 }));
        assert_eq!(state.cursor, CursorPosition { line: 3, column: 1 });
        assert!(!state.apply(EditorAction::MoveCursor { line: 3, column: 1 }));
    }

    #[test]
    fn test_new_resets_everything() {
        let mut state = EditorState::from_file("/tmp/a.md", "a");
        assert!(state.apply(EditorAction::New));
        assert_eq!(state, EditorState::default());
        assert!(!state.apply(EditorAction::New));
    }

    #[test]
    fn test_stats_counts() {
        let stats = DocumentStats::of("# Café\n\nTwo  words\n", true);
        assert_eq!(stats.words, 4);
        assert_eq!(stats.characters, 19);
        assert_eq!(stats.lines, 4);
        assert!(stats.dirty);
    }

    #[test]
    fn test_auto_save_needs_path_dirt_and_idle() {
        let mut state = EditorState::with_content("draft");
        assert!(!state.should_auto_save(AUTO_SAVE_DELAY));

        state.apply(EditorAction::Loaded {
            path: PathBuf::from("/tmp/a.md"),
            content: "a".to_string(),
        });
        assert!(!state.should_auto_save(AUTO_SAVE_DELAY));

        state.apply(EditorAction::SetContent {
            content: "ab".to_string(),
        });
        assert!(!state.should_auto_save(Duration::from_secs(5)));
        assert!(state.should_auto_save(AUTO_SAVE_DELAY));
    }
}
