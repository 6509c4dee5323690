//! Store and reconciler working together against the in-memory editor.

use tsbridge_config::default_signs;
use tsbridge_editor::{DiagnosticStore, HostOp, Marker, MemoryHost, Reconciler};
use tsbridge_engine::sign_definitions;
use tsbridge_types::{Diagnostic, DiagnosticCategory, Location};

const FILE: &str = "a.ts";

fn diag(line: u32, start: u32, end: u32, text: &str) -> Diagnostic {
    Diagnostic {
        start: Location::new(line, start),
        end: Location::new(line, end),
        text: text.to_string(),
        category: DiagnosticCategory::Error,
        code: Some(2304),
        source: None,
    }
}

struct Harness {
    host: MemoryHost,
    store: DiagnosticStore,
    reconciler: Reconciler,
}

impl Harness {
    fn new() -> Self {
        Self {
            host: MemoryHost::new(),
            store: DiagnosticStore::new(),
            reconciler: Reconciler::new(sign_definitions(&default_signs())),
        }
    }

    async fn push(&mut self, diagnostics: Vec<Diagnostic>) -> Vec<HostOp> {
        let replacement = self.store.replace_diagnostics(FILE, diagnostics);
        self.reconciler
            .apply(&self.host, FILE, &replacement.old, &replacement.new)
            .await
            .unwrap();
        self.host.take_ops()
    }
}

fn count(ops: &[HostOp], place: bool) -> usize {
    ops.iter()
        .filter(|op| match op {
            HostOp::Place { .. } => place,
            HostOp::Remove { .. } => !place,
            _ => false,
        })
        .count()
}

/// Line and sign of each visible marker, ignoring ids.
fn visible(host: &MemoryHost) -> Vec<(u32, String)> {
    host.markers(FILE)
        .into_iter()
        .map(|Marker { line, sign, .. }| (line, sign))
        .collect()
}

#[tokio::test]
async fn empty_push_removes_previous_marker() {
    let mut harness = Harness::new();

    let first = harness.push(vec![diag(1, 1, 5, "err1")]).await;
    assert_eq!(count(&first, true), 1);
    let placed_id = harness.host.markers(FILE)[0].id;

    let second = harness.push(Vec::new()).await;
    assert_eq!(count(&second, true), 0);
    assert_eq!(
        second
            .iter()
            .filter(|op| matches!(op, HostOp::Remove { .. }))
            .collect::<Vec<_>>(),
        vec![&HostOp::Remove {
            file: FILE.to_string(),
            id: placed_id,
        }]
    );
    assert!(harness.host.markers(FILE).is_empty());
}

#[tokio::test]
async fn repeating_a_set_keeps_markers_stable() {
    let mut harness = Harness::new();
    let set = vec![diag(1, 1, 5, "a"), diag(3, 2, 4, "b"), diag(7, 1, 9, "c")];

    harness.push(set.clone()).await;
    let before = visible(&harness.host);
    let ids_before: Vec<u64> = harness.host.markers(FILE).iter().map(|m| m.id).collect();

    let ops = harness.push(set).await;
    assert_eq!(visible(&harness.host), before);
    assert_eq!(count(&ops, true), count(&ops, false));
    assert_eq!(harness.host.markers(FILE).len(), 3);

    let ids_after: Vec<u64> = harness.host.markers(FILE).iter().map(|m| m.id).collect();
    assert!(ids_after.iter().all(|id| !ids_before.contains(id)));
}

#[tokio::test]
async fn point_lookup_uses_half_open_spans() {
    let mut harness = Harness::new();
    harness
        .push(vec![
            diag(1, 3, 6, "first"),
            diag(1, 6, 9, "second"),
            diag(2, 1, 2, "third"),
        ])
        .await;

    let at = |line, offset| {
        harness
            .store
            .find_at(FILE, line, offset)
            .map(|e| e.text.clone())
    };
    assert_eq!(at(1, 2), None);
    assert_eq!(at(1, 3).as_deref(), Some("first"));
    assert_eq!(at(1, 5).as_deref(), Some("first"));
    assert_eq!(at(1, 6).as_deref(), Some("second"));
    assert_eq!(at(1, 8).as_deref(), Some("second"));
    assert_eq!(at(1, 9), None);
    assert_eq!(at(2, 1).as_deref(), Some("third"));
    assert_eq!(at(2, 2), None);
    assert_eq!(at(3, 1), None);
}

#[tokio::test]
async fn highlights_follow_the_latest_set() {
    let mut harness = Harness::new();
    harness.push(vec![diag(1, 1, 5, "a"), diag(2, 1, 3, "b")]).await;
    assert_eq!(harness.host.highlights(FILE).len(), 2);

    harness.push(vec![diag(4, 2, 6, "c")]).await;
    let highlights = harness.host.highlights(FILE);
    assert_eq!(highlights.len(), 1);
    assert_eq!(highlights[0].line, 4);
    assert_eq!((highlights[0].start_col, highlights[0].end_col), (2, 6));
}
