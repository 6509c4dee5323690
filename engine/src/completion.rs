//! Completion: locating the word being completed, querying the server and
//! shaping the candidates for an insert-mode popup.

use serde::Serialize;
use tsbridge_editor::{EditorHost, current_line};
use tsbridge_types::{
    CompletionDetailsArgs, CompletionEntry, CompletionEntryDetails, CompletionsArgs,
    FileLocationArgs, char_index_at, display_parts_to_string,
};

use crate::bridge::Bridge;
use crate::error::BridgeError;

/// Editor variable that receives the last completion result.
pub const VAR_COMPLETION_RESULT: &str = "tsbridge#completion_result";

/// Characters the server treats as completion triggers.
pub const TRIGGER_CHARACTERS: [char; 7] = ['.', '"', '\'', '`', '/', '@', '<'];

/// Leading declaration keywords dropped from a detail menu.
const MENU_KEYWORDS: [&str; 12] = [
    "var",
    "let",
    "const",
    "class",
    "(method)",
    "(property)",
    "enum",
    "namespace",
    "function",
    "import",
    "interface",
    "type",
];

/// One popup candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionItem {
    pub word: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// 0-based `char` index where the word before the cursor starts.
///
/// `cursor_offset` is the 1-based cursor offset in UTF-16 units.
#[must_use]
pub fn completion_start_column(line: &str, cursor_offset: u32) -> usize {
    let chars: Vec<char> = line.chars().collect();
    let mut start = char_index_at(line, cursor_offset);
    while start > 0 && is_identifier_char(chars[start - 1]) {
        start -= 1;
    }
    start
}

/// The part of the word being completed that is left of the cursor.
#[must_use]
pub fn completion_prefix(line: &str, cursor_offset: u32) -> String {
    let start = completion_start_column(line, cursor_offset);
    let end = char_index_at(line, cursor_offset);
    line.chars().skip(start).take(end - start).collect()
}

/// The trigger character right before the word being completed, if any.
#[must_use]
pub fn trigger_character(line: &str, cursor_offset: u32) -> Option<char> {
    let start = completion_start_column(line, cursor_offset);
    let before = line.chars().nth(start.checked_sub(1)?)?;
    TRIGGER_CHARACTERS.contains(&before).then_some(before)
}

/// Member completions come back unfiltered; narrow them to `prefix`.
#[must_use]
pub fn reduce_by_prefix(prefix: &str, entries: Vec<CompletionEntry>) -> Vec<CompletionEntry> {
    let prefix = prefix.to_lowercase();
    entries
        .into_iter()
        .filter(|e| e.name.to_lowercase().starts_with(&prefix))
        .collect()
}

/// Signature text for the popup menu: whitespace collapsed, leading
/// declaration keyword removed.
#[must_use]
pub fn menu_text(details: &CompletionEntryDetails) -> String {
    let signature = display_parts_to_string(&details.display_parts)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    for keyword in MENU_KEYWORDS {
        if let Some(rest) = strip_prefix_ignore_case(&signature, keyword)
            && let Some(rest) = rest.strip_prefix(' ')
        {
            return rest.to_string();
        }
    }
    signature
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

impl<H: EditorHost> Bridge<H> {
    /// Column where the word under the cursor starts.
    pub async fn completion_start(&self) -> Result<usize, BridgeError> {
        let (line, cursor) = current_line(&*self.host).await?;
        Ok(completion_start_column(&line, cursor.offset))
    }

    /// Completion candidates for `prefix` at the cursor.
    ///
    /// Up to `completion.max_detail` candidates get signature details;
    /// above that only names and kinds are returned. The result is also
    /// stored in [`VAR_COMPLETION_RESULT`].
    pub async fn complete(&self, prefix: &str) -> Result<Vec<CompletionItem>, BridgeError> {
        self.reload_file().await?;
        let file = self.current_file().await?;
        let (line_text, cursor) = current_line(&*self.host).await?;
        let location = FileLocationArgs::new(file, cursor.line, cursor.offset);

        let args = CompletionsArgs {
            location: location.clone(),
            prefix: prefix.to_string(),
            trigger_character: trigger_character(&line_text, cursor.offset).map(String::from),
            include_insert_text_completions: Some(false),
            include_external_module_exports: Some(false),
        };
        let server = self.running()?;
        let info = server.completions(&args).await?;
        let entries = if info.is_member_completion && !prefix.is_empty() {
            reduce_by_prefix(prefix, info.entries)
        } else {
            info.entries
        };

        let completion = &self.config.completion;
        let items: Vec<CompletionItem> = if entries.len() > completion.max_detail {
            entries
                .iter()
                .map(|e| CompletionItem {
                    word: e.name.clone(),
                    kind: completion.kind_symbol(&e.kind).to_string(),
                    menu: None,
                    info: None,
                })
                .collect()
        } else if entries.is_empty() {
            Vec::new()
        } else {
            let details = server
                .completion_details(&CompletionDetailsArgs {
                    location,
                    entry_names: entries.into_iter().map(|e| e.name).collect(),
                })
                .await?;
            details
                .iter()
                .map(|d| {
                    let documentation = display_parts_to_string(&d.documentation);
                    CompletionItem {
                        word: d.name.clone(),
                        kind: completion.kind_symbol(&d.kind).to_string(),
                        menu: Some(menu_text(d)),
                        info: (!documentation.is_empty()).then_some(documentation),
                    }
                })
                .collect()
        };

        tracing::debug!(prefix, count = items.len(), "Completion candidates");
        let value = serde_json::to_value(&items).unwrap_or_default();
        self.host.set_var(VAR_COMPLETION_RESULT, value).await?;
        Ok(items)
    }
}
