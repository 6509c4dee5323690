//! Diagnostic store.
//!
//! Per-file diagnostic sets, each entry tagged with a marker id that is
//! unique for the lifetime of the store. Ids come from one counter shared by
//! all files, so tearing down one file's markers can never collide with
//! markers being placed for another.

use std::collections::HashMap;

use tsbridge_types::{Diagnostic, DiagnosticCategory, TextSpan};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub marker_id: u64,
    pub span: TextSpan,
    pub category: DiagnosticCategory,
    pub text: String,
    pub code: Option<u32>,
    pub source: Option<String>,
}

impl DiagnosticEntry {
    #[must_use]
    pub fn contains(&self, line: u32, offset: u32) -> bool {
        self.span.contains(line, offset)
    }
}

/// The sets before and after a replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replacement {
    pub old: Vec<DiagnosticEntry>,
    pub new: Vec<DiagnosticEntry>,
}

#[derive(Debug)]
pub struct DiagnosticStore {
    next_marker_id: u64,
    files: HashMap<String, Vec<DiagnosticEntry>>,
}

impl Default for DiagnosticStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_marker_id: 1,
            files: HashMap::new(),
        }
    }

    /// Replace `file`'s set with `diagnostics`, assigning fresh marker ids.
    ///
    /// The swap is a single assignment: there is no moment at which both
    /// sets are current. The file's set is created on first use.
    pub fn replace_diagnostics(&mut self, file: &str, diagnostics: Vec<Diagnostic>) -> Replacement {
        let new: Vec<DiagnosticEntry> = diagnostics
            .into_iter()
            .map(|d| {
                let marker_id = self.next_marker_id;
                self.next_marker_id += 1;
                DiagnosticEntry {
                    marker_id,
                    span: d.span(),
                    category: d.category,
                    text: d.text,
                    code: d.code,
                    source: d.source,
                }
            })
            .collect();

        let old = self
            .files
            .insert(file.to_string(), new.clone())
            .unwrap_or_default();
        Replacement { old, new }
    }

    /// Empty `file`'s set, keeping the file known. Returns the old entries.
    pub fn clear_diagnostics(&mut self, file: &str) -> Vec<DiagnosticEntry> {
        match self.files.get_mut(file) {
            Some(entries) => std::mem::take(entries),
            None => Vec::new(),
        }
    }

    /// Forget `file` entirely. Returns the entries it had.
    pub fn evict(&mut self, file: &str) -> Vec<DiagnosticEntry> {
        self.files.remove(file).unwrap_or_default()
    }

    /// First entry of `file` whose span contains the point.
    #[must_use]
    pub fn find_at(&self, file: &str, line: u32, offset: u32) -> Option<&DiagnosticEntry> {
        self.entries(file).iter().find(|e| e.contains(line, offset))
    }

    #[must_use]
    pub fn entries(&self, file: &str) -> &[DiagnosticEntry] {
        self.files.get(file).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn contains_file(&self, file: &str) -> bool {
        self.files.contains_key(file)
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    #[must_use]
    pub fn error_count(&self, file: &str) -> usize {
        self.entries(file)
            .iter()
            .filter(|e| e.category.is_error())
            .count()
    }
}
