//! Capability interface to the editor.
//!
//! Everything the bridge does to the editor goes through [`EditorHost`].
//! Methods return boxed futures so the trait stays dyn-compatible.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tsbridge_types::{FileCodeEdits, Location};

pub type HostFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, HostError>> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("editor rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },
    #[error("editor connection lost")]
    Disconnected,
}

/// A gutter sign definition (`TSerror`, `TSwarning`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignDefinition {
    pub name: String,
    pub text: String,
    pub texthl: String,
}

/// A placed sign. `id` is unique for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub id: u64,
    pub file: String,
    pub line: u32,
    pub sign: String,
}

/// A highlighted column range on one line, owned by marker `id`.
///
/// Columns are 1-based; `end_col` is exclusive, and `u32::MAX` runs to the
/// end of the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub id: u64,
    pub line: u32,
    pub start_col: u32,
    pub end_col: u32,
    pub group: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    /// Window-local list (`setloclist`).
    Location,
    /// Global list (`setqflist`).
    Quickfix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub filename: String,
    pub lnum: u32,
    pub col: u32,
    pub text: String,
    /// `E`, `W`, ... for diagnostics.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<char>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoLevel {
    Info,
    Warning,
    Error,
}

/// Operations the bridge needs from the editor.
///
/// Positions are 1-based lines with 1-based UTF-16 offsets, the same
/// convention the server uses. Removing a marker that is not placed is a
/// no-op. Placing a marker id that is already placed is rejected.
pub trait EditorHost: Send + Sync {
    /// Path of the current buffer. Empty when the buffer has no file.
    fn current_file(&self) -> HostFut<'_, String>;

    /// Contents of the current buffer.
    fn buffer_lines(&self) -> HostFut<'_, Vec<String>>;

    fn cursor(&self) -> HostFut<'_, Location>;

    fn set_cursor(&self, position: Location) -> HostFut<'_, ()>;

    fn define_sign<'a>(&'a self, sign: &'a SignDefinition) -> HostFut<'a, ()>;

    fn place_marker<'a>(&'a self, marker: &'a Marker) -> HostFut<'a, ()>;

    fn remove_marker<'a>(&'a self, file: &'a str, id: u64) -> HostFut<'a, ()>;

    fn paint_highlight<'a>(&'a self, file: &'a str, highlight: &'a Highlight)
    -> HostFut<'a, ()>;

    /// Remove every highlight the bridge painted in `file`.
    fn clear_highlights<'a>(&'a self, file: &'a str) -> HostFut<'a, ()>;

    /// Replace the contents of a navigable list.
    fn set_list<'a>(
        &'a self,
        kind: ListKind,
        title: &'a str,
        entries: &'a [ListEntry],
    ) -> HostFut<'a, ()>;

    /// Focus `file` (opening it if needed) and move the cursor.
    fn open_location<'a>(&'a self, file: &'a str, position: Location) -> HostFut<'a, ()>;

    /// Show `lines` in a scratch preview window named `title`, replacing
    /// whatever that window held.
    fn show_preview<'a>(&'a self, title: &'a str, lines: &'a [String]) -> HostFut<'a, ()>;

    fn echo<'a>(&'a self, level: EchoLevel, message: &'a str) -> HostFut<'a, ()>;

    fn get_var<'a>(&'a self, name: &'a str) -> HostFut<'a, Option<Value>>;

    fn set_var<'a>(&'a self, name: &'a str, value: Value) -> HostFut<'a, ()>;

    /// Apply text edits. Splitting multi-line edits is up to the host.
    fn apply_edits<'a>(&'a self, edits: &'a [FileCodeEdits]) -> HostFut<'a, ()>;

    /// Let the user pick one of `options`. `None` when cancelled.
    fn choose<'a>(&'a self, prompt: &'a str, options: &'a [String]) -> HostFut<'a, Option<usize>>;

    /// Columns available for a one-line message.
    fn message_width(&self) -> HostFut<'_, usize>;
}

/// The cursor line's text, plus the cursor itself.
pub async fn current_line(host: &dyn EditorHost) -> Result<(String, Location), HostError> {
    let cursor = host.cursor().await?;
    let lines = host.buffer_lines().await?;
    let text = lines
        .get(cursor.line.saturating_sub(1) as usize)
        .cloned()
        .unwrap_or_default();
    Ok((text, cursor))
}

/// Shorten `message` to fit in `width` columns, marking the cut with `...`.
#[must_use]
pub fn truncate_message(message: &str, width: usize) -> String {
    let flat: String = message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    // Leave room so the editor doesn't prompt for "Press ENTER".
    let limit = width.saturating_sub(12);
    if flat.chars().count() <= limit {
        return flat;
    }
    let keep = limit.saturating_sub(3);
    let mut out: String = flat.chars().take(keep).collect();
    out.push_str("...");
    out
}
