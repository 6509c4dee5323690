//! Typed response bodies, one per command.
//!
//! Unknown fields are ignored so newer servers stay compatible; fields the
//! bridge relies on are required so a shape mismatch fails deserialization
//! instead of silently producing empty values.

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Location, TextSpan};

/// One fragment of a rendered signature or documentation string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDisplayPart {
    pub text: String,
    #[serde(default)]
    pub kind: String,
}

/// Concatenate display parts into plain text.
#[must_use]
pub fn display_parts_to_string(parts: &[SymbolDisplayPart]) -> String {
    parts.iter().map(|p| p.text.as_str()).collect()
}

/// Older servers send documentation as a string, newer ones as display parts.
fn documentation_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Doc {
        Text(String),
        Parts(Vec<SymbolDisplayPart>),
    }

    Ok(match Option::<Doc>::deserialize(deserializer)? {
        Some(Doc::Text(text)) => text,
        Some(Doc::Parts(parts)) => display_parts_to_string(&parts),
        None => String::new(),
    })
}

// ============================================================================
// Navigation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickInfo {
    pub kind: String,
    #[serde(default)]
    pub kind_modifiers: String,
    pub start: Location,
    pub end: Location,
    pub display_string: String,
    #[serde(default, deserialize_with = "documentation_text")]
    pub documentation: String,
}

/// A span inside a named file; the body of `definition` and `typeDefinition`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpan {
    pub file: String,
    pub start: Location,
    pub end: Location,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceEntry {
    pub file: String,
    pub start: Location,
    pub end: Location,
    #[serde(default)]
    pub line_text: String,
    #[serde(default)]
    pub is_write_access: bool,
    #[serde(default)]
    pub is_definition: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencesResponse {
    pub refs: Vec<ReferenceEntry>,
    #[serde(default)]
    pub symbol_name: String,
    #[serde(default)]
    pub symbol_start_offset: u32,
    #[serde(default)]
    pub symbol_display_string: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameInfo {
    pub can_rename: bool,
    #[serde(default)]
    pub localized_error_message: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub kind: String,
}

/// All rename locations inside one file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpanGroup {
    pub file: String,
    pub locs: Vec<TextSpan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenameResponse {
    pub info: RenameInfo,
    #[serde(default)]
    pub locs: Vec<SpanGroup>,
}

/// One node of the `navtree` outline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTree {
    pub text: String,
    pub kind: String,
    #[serde(default)]
    pub kind_modifiers: String,
    pub spans: Vec<TextSpan>,
    #[serde(default)]
    pub child_items: Vec<NavigationTree>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavtoItem {
    pub name: String,
    pub kind: String,
    pub file: String,
    pub start: Location,
    pub end: Location,
    #[serde(default)]
    pub container_name: Option<String>,
}

// ============================================================================
// Completion
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEntry {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub kind_modifiers: String,
    #[serde(default)]
    pub sort_text: String,
    #[serde(default)]
    pub insert_text: Option<String>,
}

/// Body of `completionInfo`, or a flat `completions` list lifted into this shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionInfo {
    #[serde(default)]
    pub is_global_completion: bool,
    #[serde(default)]
    pub is_member_completion: bool,
    pub entries: Vec<CompletionEntry>,
}

impl CompletionInfo {
    /// Wrap the flat list older servers return.
    #[must_use]
    pub fn from_entries(entries: Vec<CompletionEntry>) -> Self {
        Self {
            is_global_completion: false,
            is_member_completion: false,
            entries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEntryDetails {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub kind_modifiers: String,
    #[serde(default)]
    pub display_parts: Vec<SymbolDisplayPart>,
    #[serde(default)]
    pub documentation: Vec<SymbolDisplayPart>,
}

// ============================================================================
// Signature help
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureHelpParameter {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_parts: Vec<SymbolDisplayPart>,
    #[serde(default)]
    pub documentation: Vec<SymbolDisplayPart>,
    #[serde(default)]
    pub is_optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureHelpItem {
    #[serde(default)]
    pub is_variadic: bool,
    #[serde(default)]
    pub prefix_display_parts: Vec<SymbolDisplayPart>,
    #[serde(default)]
    pub suffix_display_parts: Vec<SymbolDisplayPart>,
    #[serde(default)]
    pub separator_display_parts: Vec<SymbolDisplayPart>,
    pub parameters: Vec<SignatureHelpParameter>,
}

impl SignatureHelpItem {
    /// Render `prefix param1<sep>param2 suffix`.
    #[must_use]
    pub fn label(&self) -> String {
        let separator = display_parts_to_string(&self.separator_display_parts);
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| display_parts_to_string(&p.display_parts))
            .collect();
        format!(
            "{}{}{}",
            display_parts_to_string(&self.prefix_display_parts),
            params.join(&separator),
            display_parts_to_string(&self.suffix_display_parts),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureHelpItems {
    pub items: Vec<SignatureHelpItem>,
    #[serde(default)]
    pub selected_item_index: usize,
    #[serde(default)]
    pub argument_index: usize,
    #[serde(default)]
    pub argument_count: usize,
}

// ============================================================================
// Code actions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeEdit {
    pub start: Location,
    pub end: Location,
    pub new_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCodeEdits {
    pub file_name: String,
    pub text_changes: Vec<CodeEdit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CodeAction {
    pub description: String,
    pub changes: Vec<FileCodeEdits>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFixAction {
    pub description: String,
    pub changes: Vec<FileCodeEdits>,
    #[serde(default)]
    pub fix_name: String,
    #[serde(default)]
    pub fix_id: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CombinedCodeActions {
    pub changes: Vec<FileCodeEdits>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefactorActionInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApplicableRefactorInfo {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub inlineable: Option<bool>,
    pub actions: Vec<RefactorActionInfo>,
}

/// Body of `getEditsForRefactor`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefactorEditInfo {
    pub edits: Vec<FileCodeEdits>,
    #[serde(default)]
    pub rename_filename: Option<String>,
    #[serde(default)]
    pub rename_location: Option<Location>,
}

// ============================================================================
// Project
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub config_file_name: String,
    #[serde(default)]
    pub file_names: Option<Vec<String>>,
    #[serde(default)]
    pub language_service_disabled: bool,
}
