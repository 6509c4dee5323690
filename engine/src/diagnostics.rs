//! Diagnostics pipeline: server results → store → reconciler.
//!
//! The server reports syntax, semantic and suggestion diagnostics
//! separately, either from the `*DiagnosticsSync` requests or as events
//! after `geterr`. Each file keeps the latest set of every kind; whenever
//! one kind changes, the file's combined set replaces the stored one.

use tsbridge_editor::{
    DiagnosticEntry, EchoLevel, EditorHost, ListEntry, ListKind, ReconcileReport, Replacement,
    truncate_message,
};
use tsbridge_types::{Diagnostic, DiagnosticCategory, DiagnosticEventBody, Feature};

use crate::bridge::Bridge;
use crate::error::BridgeError;
use crate::events::DiagnosticKind;

pub const ERRORS_LIST_TITLE: &str = "Errors";

#[derive(Debug, Clone, Default)]
pub(crate) struct DiagnosticParts {
    semantic: Vec<Diagnostic>,
    syntax: Vec<Diagnostic>,
    suggestion: Vec<Diagnostic>,
}

impl DiagnosticParts {
    fn set(&mut self, kind: DiagnosticKind, diagnostics: Vec<Diagnostic>) {
        match kind {
            DiagnosticKind::Semantic => self.semantic = diagnostics,
            DiagnosticKind::Syntax => self.syntax = diagnostics,
            DiagnosticKind::Suggestion => self.suggestion = diagnostics,
        }
    }

    /// Semantic first, then syntax, then suggestions.
    fn combined(&self) -> Vec<Diagnostic> {
        self.semantic
            .iter()
            .chain(&self.syntax)
            .chain(&self.suggestion)
            .cloned()
            .collect()
    }
}

fn echo_level(category: DiagnosticCategory) -> EchoLevel {
    match category {
        DiagnosticCategory::Error => EchoLevel::Error,
        DiagnosticCategory::Warning => EchoLevel::Warning,
        _ => EchoLevel::Info,
    }
}

fn list_entry(file: &str, entry: &DiagnosticEntry) -> ListEntry {
    ListEntry {
        filename: file.to_string(),
        lnum: entry.span.start.line,
        col: entry.span.start.offset,
        text: entry.text.clone(),
        kind: Some(entry.category.list_type()),
    }
}

impl<H: EditorHost> Bridge<H> {
    /// Fetch the current file's diagnostics, show them, and fill the
    /// location list. Returns how many are shown.
    pub async fn diagnostics(&mut self) -> Result<usize, BridgeError> {
        self.reload_file().await?;
        let file = self.current_file().await?;
        let include_suggestions = self.config.diagnostics.include_suggestions;

        let server = self.running()?;
        let semantic = server.semantic_diagnostics(&file).await?;
        let syntax = server.syntactic_diagnostics(&file).await?;
        let suggestion = if include_suggestions && server.supports(Feature::SuggestionDiagnostics) {
            server.suggestion_diagnostics(&file).await?
        } else {
            Vec::new()
        };

        let parts = self.parts.entry(file.clone()).or_default();
        parts.set(DiagnosticKind::Semantic, semantic);
        parts.set(DiagnosticKind::Syntax, syntax);
        parts.set(DiagnosticKind::Suggestion, suggestion);

        self.publish(&file).await?;
        self.fill_error_list(&file).await?;
        self.cursor_moved().await?;
        Ok(self.store.entries(&file).len())
    }

    /// Ask the server to check the current file in the background. The
    /// results arrive as events.
    pub async fn request_diagnostics(&self) -> Result<(), BridgeError> {
        self.reload_file().await?;
        let file = self.current_file().await?;
        self.running()?.get_err(vec![file], 0).await?;
        Ok(())
    }

    pub(crate) async fn on_diagnostics_event(
        &mut self,
        kind: DiagnosticKind,
        body: DiagnosticEventBody,
    ) -> Result<(), BridgeError> {
        let config = &self.config.diagnostics;
        if !config.enable || (kind == DiagnosticKind::Suggestion && !config.include_suggestions) {
            return Ok(());
        }

        let DiagnosticEventBody { file, diagnostics } = body;
        tracing::debug!(%file, ?kind, count = diagnostics.len(), "Diagnostics event");
        self.parts.entry(file.clone()).or_default().set(kind, diagnostics);
        self.publish(&file).await?;

        if self.host.current_file().await? == file {
            self.fill_error_list(&file).await?;
        }
        Ok(())
    }

    /// Replace `file`'s stored set with its combined parts and bring the
    /// editor in line.
    async fn publish(&mut self, file: &str) -> Result<ReconcileReport, BridgeError> {
        let combined = self
            .parts
            .get(file)
            .map(DiagnosticParts::combined)
            .unwrap_or_default();
        let Replacement { old, new } = self.store.replace_diagnostics(file, combined);
        let report = self.reconciler.apply(&*self.host, file, &old, &new).await?;
        tracing::trace!(
            file,
            removed = report.removed,
            placed = report.placed,
            painted = report.painted,
            "Diagnostics reconciled"
        );
        Ok(report)
    }

    async fn fill_error_list(&self, file: &str) -> Result<(), BridgeError> {
        let entries: Vec<ListEntry> = self
            .store
            .entries(file)
            .iter()
            .map(|e| list_entry(file, e))
            .collect();
        self.host
            .set_list(ListKind::Location, ERRORS_LIST_TITLE, &entries)
            .await?;
        Ok(())
    }

    /// Echo the diagnostic under the cursor, shortened to the message
    /// area. Returns the text shown.
    pub async fn cursor_moved(&self) -> Result<Option<String>, BridgeError> {
        let file = self.host.current_file().await?;
        if file.is_empty() {
            return Ok(None);
        }
        let cursor = self.host.cursor().await?;
        let Some(entry) = self.store.find_at(&file, cursor.line, cursor.offset) else {
            return Ok(None);
        };

        let width = self.host.message_width().await?;
        let text = truncate_message(&entry.text, width);
        self.echo(echo_level(entry.category), &text).await?;
        Ok(Some(text))
    }
}
