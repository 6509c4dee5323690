//! Core domain types for tsbridge.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application: the wire
//! shapes the analysis server speaks, the typed argument and result bodies of
//! every command, and the protocol version table that gates version-dependent
//! commands.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod args;
mod diagnostic;
mod responses;
mod version;

pub use args::{
    CodeFixArgs, CombinedCodeFixArgs, CompletionDetailsArgs, CompletionsArgs, FileArgs,
    FileLocationArgs, FileRangeArgs, FileScope, GetErrArgs, NavtoArgs, OpenArgs,
    OrganizeImportsArgs, ProjectInfoArgs, RefactorEditsArgs, ReloadArgs, RenameArgs, SaveToArgs,
};
pub use diagnostic::{Diagnostic, DiagnosticCategory, DiagnosticEventBody};
pub use responses::{
    ApplicableRefactorInfo, CodeAction, CodeEdit, CodeFixAction, CombinedCodeActions,
    CompletionEntry, CompletionEntryDetails, CompletionInfo, FileCodeEdits, FileSpan,
    NavigationTree, NavtoItem, ProjectInfo, QuickInfo, RefactorActionInfo, RefactorEditInfo,
    ReferenceEntry, ReferencesResponse, RenameInfo, RenameResponse, SignatureHelpItem,
    SignatureHelpItems, SignatureHelpParameter, SpanGroup, SymbolDisplayPart,
    display_parts_to_string,
};
pub use version::{Feature, ProtocolVersion, VersionParseError};

use serde::{Deserialize, Serialize};

// ============================================================================
// Positions
// ============================================================================

/// A 1-based line/offset position, as the analysis server counts them.
///
/// `offset` counts UTF-16 code units from 1, so a character outside the
/// Basic Multilingual Plane takes two. Use [`char_index_at`] to index a
/// line by `char`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Location {
    pub line: u32,
    pub offset: u32,
}

impl Location {
    #[must_use]
    pub const fn new(line: u32, offset: u32) -> Self {
        Self { line, offset }
    }
}

/// Index into `line.chars()` of the character at the 1-based UTF-16 `offset`.
///
/// An offset that points into a surrogate pair resolves to the character
/// after it. Offsets past the end give the character count.
#[must_use]
pub fn char_index_at(line: &str, offset: u32) -> usize {
    let target = offset.saturating_sub(1) as usize;
    let mut units = 0;
    for (index, c) in line.chars().enumerate() {
        if units >= target {
            return index;
        }
        units += c.len_utf16();
    }
    line.chars().count()
}

/// A start/end pair of locations. The end is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: Location,
    pub end: Location,
}

impl TextSpan {
    #[must_use]
    pub const fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    /// Whether `(line, offset)` falls inside this span.
    ///
    /// Matches on the start line only, with the offset in the half-open
    /// range `[start.offset, end.offset)`.
    #[must_use]
    pub fn contains(&self, line: u32, offset: u32) -> bool {
        self.start.line == line && self.start.offset <= offset && offset < self.end.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(line: u32, start: u32, end: u32) -> TextSpan {
        TextSpan::new(Location::new(line, start), Location::new(line, end))
    }

    #[test]
    fn contains_is_half_open() {
        let s = span(3, 5, 9);
        assert!(!s.contains(3, 4));
        assert!(s.contains(3, 5));
        assert!(s.contains(3, 8));
        assert!(!s.contains(3, 9));
    }

    #[test]
    fn contains_requires_start_line() {
        let s = span(3, 1, 20);
        assert!(!s.contains(2, 5));
        assert!(!s.contains(4, 5));
    }

    #[test]
    fn empty_span_contains_nothing() {
        let s = span(1, 4, 4);
        assert!(!s.contains(1, 4));
    }

    #[test]
    fn char_index_counts_surrogate_pairs_as_two_units() {
        assert_eq!(char_index_at("abc", 1), 0);
        assert_eq!(char_index_at("abc", 3), 2);
        assert_eq!(char_index_at("abc", 9), 3);
        // U+1F600 is two UTF-16 units.
        assert_eq!(char_index_at("\u{1F600}ab", 3), 1);
        assert_eq!(char_index_at("\u{1F600}ab", 4), 2);
        assert_eq!(char_index_at("\u{1F600}ab", 2), 1);
        assert_eq!(char_index_at("é\u{1F600}", 2), 1);
        assert_eq!(char_index_at("", 0), 0);
    }

    #[test]
    fn location_deserializes_from_wire() {
        let loc: Location = serde_json::from_str(r#"{"line":12,"offset":7}"#).unwrap();
        assert_eq!(loc, Location::new(12, 7));
    }
}
