//! Editor side of the bridge.
//!
//! [`EditorHost`] is the narrow capability interface the bridge drives.
//! [`DiagnosticStore`] holds per-file diagnostic sets and [`Reconciler`]
//! keeps the editor's signs and highlights equal to them.

pub mod host;
pub mod memory;
pub mod reconciler;
pub mod store;

pub use host::{
    EchoLevel, EditorHost, Highlight, HostError, HostFut, ListEntry, ListKind, Marker,
    SignDefinition, current_line, truncate_message,
};
pub use memory::{HostOp, MemoryHost, NamedList};
pub use reconciler::{FALLBACK_HIGHLIGHT, ReconcileReport, Reconciler};
pub use store::{DiagnosticEntry, DiagnosticStore, Replacement};
