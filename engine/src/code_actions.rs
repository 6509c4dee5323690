//! Code actions: quick fixes, auto-import, organize imports and refactors.
//!
//! The server computes the edits; the host applies them.

use tsbridge_editor::{EchoLevel, EditorHost, current_line};
use tsbridge_types::{
    CodeFixAction, CodeFixArgs, FileRangeArgs, RefactorEditsArgs, char_index_at,
};

use crate::bridge::Bridge;
use crate::completion::is_identifier_char;
use crate::error::BridgeError;

/// "Cannot find name": the error an import fixes.
pub const CANNOT_FIND_NAME: u32 = 2304;

/// Symbol kind of import bindings in the navigation tree.
const ALIAS_KIND: &str = "alias";

/// The identifier under (or right before) the 1-based UTF-16 `offset`.
#[must_use]
pub fn word_at(line: &str, offset: u32) -> Option<String> {
    let chars: Vec<char> = line.chars().collect();
    let at = char_index_at(line, offset);
    let mut start = at;
    while start > 0 && is_identifier_char(chars[start - 1]) {
        start -= 1;
    }
    let mut end = at;
    while end < chars.len() && is_identifier_char(chars[end]) {
        end += 1;
    }
    (start < end).then(|| chars[start..end].iter().collect())
}

impl<H: EditorHost> Bridge<H> {
    /// Offer the fixes for the diagnostic under the cursor and apply the
    /// chosen one. Returns its description.
    pub async fn code_fix(&self) -> Result<Option<String>, BridgeError> {
        self.reload_file().await?;
        let file = self.current_file().await?;
        let cursor = self.host.cursor().await?;

        let Some(entry) = self.store.find_at(&file, cursor.line, cursor.offset) else {
            self.echo(EchoLevel::Info, "No diagnostic under cursor").await?;
            return Ok(None);
        };
        let Some(code) = entry.code else {
            self.echo(EchoLevel::Info, "No fix").await?;
            return Ok(None);
        };

        let args = CodeFixArgs {
            range: FileRangeArgs::span(file, entry.span),
            error_codes: vec![code],
        };
        let result = self.running()?.code_fixes(&args).await;
        let fixes = self.settle(result, "No fix").await?.unwrap_or_default();
        self.apply_chosen_fix(fixes, "No fix").await
    }

    /// Add an import for the unresolved name under the cursor.
    pub async fn import(&self) -> Result<Option<String>, BridgeError> {
        self.reload_file().await?;
        let file = self.current_file().await?;
        let (line, cursor) = current_line(&*self.host).await?;
        let server = self.running()?;

        if let Some(symbol) = word_at(&line, cursor.offset) {
            let tree = server.document_symbols(&file).await?;
            let imported = tree
                .child_items
                .iter()
                .any(|item| item.kind == ALIAS_KIND && item.text == symbol);
            if imported {
                self.echo(EchoLevel::Info, &format!("{symbol} is already imported"))
                    .await?;
                return Ok(None);
            }
        }

        let args = CodeFixArgs {
            range: FileRangeArgs::point(file, cursor),
            error_codes: vec![CANNOT_FIND_NAME],
        };
        let result = server.code_fixes(&args).await;
        let fixes = self
            .settle(result, "No import candidates were found.")
            .await?
            .unwrap_or_default();
        self.apply_chosen_fix(fixes, "No import candidates were found.")
            .await
    }

    /// Sort and prune the current file's imports. Returns how many files
    /// changed.
    pub async fn organize_imports(&self) -> Result<usize, BridgeError> {
        self.reload_file().await?;
        let file = self.current_file().await?;
        let result = self.running()?.organize_imports(&file).await;
        let edits = self
            .settle(result, "No changes needed")
            .await?
            .unwrap_or_default();
        if edits.iter().all(|e| e.text_changes.is_empty()) {
            self.echo(EchoLevel::Info, "No changes needed").await?;
            return Ok(0);
        }
        self.host.apply_edits(&edits).await?;
        Ok(edits.len())
    }

    /// Offer the refactors available at the cursor and apply the chosen
    /// one. Returns `"<refactor>/<action>"`.
    pub async fn refactors(&self) -> Result<Option<String>, BridgeError> {
        self.reload_file().await?;
        let file = self.current_file().await?;
        let cursor = self.host.cursor().await?;
        let range = FileRangeArgs::point(file, cursor);

        let server = self.running()?;
        let result = server.applicable_refactors(&range).await;
        let refactors = self
            .settle(result, "No refactors available")
            .await?
            .unwrap_or_default();

        let choices: Vec<(String, String, String)> = refactors
            .iter()
            .flat_map(|r| {
                r.actions
                    .iter()
                    .map(|a| (r.name.clone(), a.name.clone(), a.description.clone()))
            })
            .collect();
        if choices.is_empty() {
            self.echo(EchoLevel::Info, "No refactors available").await?;
            return Ok(None);
        }

        let labels: Vec<String> = choices.iter().map(|(_, _, d)| d.clone()).collect();
        let Some(index) = self.host.choose("Refactor", &labels).await? else {
            return Ok(None);
        };
        let Some((refactor, action, _)) = choices.into_iter().nth(index) else {
            return Ok(None);
        };

        let args = RefactorEditsArgs {
            range,
            refactor: refactor.clone(),
            action: action.clone(),
        };
        let result = server.edits_for_refactor(&args).await;
        let Some(info) = self.settle(result, "Refactor failed").await? else {
            return Ok(None);
        };
        self.host.apply_edits(&info.edits).await?;
        if let (Some(file), Some(at)) = (&info.rename_filename, info.rename_location) {
            self.host.open_location(file, at).await?;
        }
        Ok(Some(format!("{refactor}/{action}")))
    }

    /// Apply `fixes[0]`, or let the user pick when there are several.
    async fn apply_chosen_fix(
        &self,
        fixes: Vec<CodeFixAction>,
        none: &str,
    ) -> Result<Option<String>, BridgeError> {
        let chosen = match fixes.len() {
            0 => {
                self.echo(EchoLevel::Info, none).await?;
                return Ok(None);
            }
            1 => 0,
            _ => {
                let labels: Vec<String> = fixes.iter().map(|f| f.description.clone()).collect();
                match self.host.choose("Apply fix", &labels).await? {
                    Some(i) => i,
                    None => return Ok(None),
                }
            }
        };
        let Some(fix) = fixes.into_iter().nth(chosen) else {
            return Ok(None);
        };
        self.host.apply_edits(&fix.changes).await?;
        tracing::debug!(fix = %fix.fix_name, "Applied code fix");
        Ok(Some(fix.description))
    }
}
