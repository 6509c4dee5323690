//! Editor command surface for tsbridge.
//!
//! [`Bridge`] ties one editor host to at most one analysis server session.
//! It owns the client, the diagnostic store and the reconciler, and turns
//! each user command into server requests plus editor updates.
//!
//! ```text
//! editor ──command──▶ Bridge ──request──▶ TsServer ──stdio──▶ tsserver
//!    ▲                  │  ▲                  │
//!    └──markers/lists───┘  └──poll_events◀── event listeners
//! ```
//!
//! Server events are queued by listeners on the client's reader task and
//! applied when the embedder calls [`Bridge::poll_events`].

mod bridge;
mod code_actions;
mod completion;
mod diagnostics;
mod error;
mod events;
mod navigation;
mod settings;

pub use bridge::{Bridge, MSG_SERVER_STARTED, MSG_SERVER_STOPPED};
pub use code_actions::{CANNOT_FIND_NAME, word_at};
pub use completion::{
    CompletionItem, TRIGGER_CHARACTERS, VAR_COMPLETION_RESULT, completion_prefix,
    completion_start_column, menu_text, reduce_by_prefix, trigger_character,
};
pub use diagnostics::ERRORS_LIST_TITLE;
pub use error::BridgeError;
pub use events::{BridgeEvent, DiagnosticKind};
pub use navigation::{
    DOC_PREVIEW_TITLE, MSG_INFERRED_PROJECT, REFERENCES_LIST_TITLE, RENAMES_LIST_TITLE,
    SYMBOLS_LIST_TITLE, WORKSPACE_SYMBOLS_LIMIT, WORKSPACE_SYMBOLS_LIST_TITLE,
};
pub use settings::{apply_host_vars, server_settings, sign_definitions};
