//! Highlight/sign reconciler.
//!
//! Turns a diagnostic set transition into editor operations: clear the
//! file's highlights, remove every stale marker, then place and paint the
//! new ones. Updates for one file are serialized; updates for different
//! files may run concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tsbridge_types::DiagnosticCategory;

use crate::host::{EditorHost, HostError, Highlight, Marker, SignDefinition};
use crate::store::DiagnosticEntry;

/// Used when a category's sign has no definition.
pub const FALLBACK_HIGHLIGHT: &str = "ErrorMsg";

/// Operations issued by one [`Reconciler::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed: usize,
    pub placed: usize,
    pub painted: usize,
}

#[derive(Default)]
struct FileState {
    /// Serializes updates for the file.
    gate: Arc<tokio::sync::Mutex<()>>,
    /// Marker ids this reconciler has placed and not yet removed.
    placed: Arc<Mutex<Vec<u64>>>,
}

#[derive(Default)]
pub struct Reconciler {
    signs: Vec<SignDefinition>,
    files: Mutex<HashMap<String, FileState>>,
}

impl Reconciler {
    #[must_use]
    pub fn new(signs: Vec<SignDefinition>) -> Self {
        Self {
            signs,
            files: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn signs(&self) -> &[SignDefinition] {
        &self.signs
    }

    /// Register every configured sign with the editor.
    pub async fn define_signs(&self, host: &dyn EditorHost) -> Result<(), HostError> {
        for sign in &self.signs {
            host.define_sign(sign).await?;
        }
        Ok(())
    }

    /// Highlight group for a category: the `texthl` of its sign.
    #[must_use]
    pub fn highlight_group(&self, category: DiagnosticCategory) -> &str {
        let name = category.sign_name();
        self.signs
            .iter()
            .find(|s| s.name == name)
            .map_or(FALLBACK_HIGHLIGHT, |s| s.texthl.as_str())
    }

    /// Make `file`'s visible markers match `new`.
    ///
    /// Removes the markers of `old` plus any marker this reconciler placed
    /// for the file earlier and has not removed, so a stale `old` never
    /// leaks markers. All removals complete before the first placement.
    pub async fn apply(
        &self,
        host: &dyn EditorHost,
        file: &str,
        old: &[DiagnosticEntry],
        new: &[DiagnosticEntry],
    ) -> Result<ReconcileReport, HostError> {
        let (gate, placed) = self.file_state(file);
        let _serial = gate.lock().await;
        let mut report = ReconcileReport::default();

        host.clear_highlights(file).await?;

        let mut stale: Vec<u64> = old.iter().map(|e| e.marker_id).collect();
        for id in lock(&placed).iter() {
            if !stale.contains(id) {
                stale.push(*id);
            }
        }
        for id in stale {
            host.remove_marker(file, id).await?;
            lock(&placed).retain(|p| *p != id);
            report.removed += 1;
        }

        for entry in new {
            let marker = Marker {
                id: entry.marker_id,
                file: file.to_string(),
                line: entry.span.start.line,
                sign: entry.category.sign_name(),
            };
            host.place_marker(&marker).await?;
            lock(&placed).push(entry.marker_id);
            report.placed += 1;
        }

        for entry in new {
            let span = entry.span;
            let end_col = if span.end.line == span.start.line {
                span.end.offset
            } else {
                u32::MAX
            };
            let highlight = Highlight {
                id: entry.marker_id,
                line: span.start.line,
                start_col: span.start.offset,
                end_col,
                group: self.highlight_group(entry.category).to_string(),
            };
            host.paint_highlight(file, &highlight).await?;
            report.painted += 1;
        }

        tracing::debug!(
            file,
            removed = report.removed,
            placed = report.placed,
            painted = report.painted,
            "Reconciled diagnostic markers"
        );
        Ok(report)
    }

    /// Remove everything shown for `file` and stop tracking it.
    pub async fn forget(
        &self,
        host: &dyn EditorHost,
        file: &str,
        old: &[DiagnosticEntry],
    ) -> Result<ReconcileReport, HostError> {
        let report = self.apply(host, file, old, &[]).await?;
        self.lock_files().remove(file);
        Ok(report)
    }

    /// Marker ids currently placed for `file`.
    #[must_use]
    pub fn placed(&self, file: &str) -> Vec<u64> {
        self.lock_files()
            .get(file)
            .map(|s| lock(&s.placed).clone())
            .unwrap_or_default()
    }

    fn file_state(&self, file: &str) -> (Arc<tokio::sync::Mutex<()>>, Arc<Mutex<Vec<u64>>>) {
        let mut files = self.lock_files();
        let state = files.entry(file.to_string()).or_default();
        (Arc::clone(&state.gate), Arc::clone(&state.placed))
    }

    fn lock_files(&self) -> MutexGuard<'_, HashMap<String, FileState>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("signs", &self.signs)
            .field("files", &self.lock_files().len())
            .finish()
    }
}

fn lock(placed: &Mutex<Vec<u64>>) -> MutexGuard<'_, Vec<u64>> {
    placed.lock().unwrap_or_else(PoisonError::into_inner)
}
