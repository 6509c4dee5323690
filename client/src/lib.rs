//! Client for a line-delimited JSON analysis server.
//!
//! Layers, bottom up: [`process`] launches the server, [`codec`] frames its
//! stdio, [`rpc`] correlates requests with responses and routes events, and
//! [`commands`] exposes one typed method per server command.

pub mod codec;
pub mod commands;
pub mod events;
pub mod process;
pub mod protocol;
pub mod rpc;

pub use commands::{FALLBACK_VERSION, ServerSettings, TsServer};
pub use events::{EventBus, Subscription};
pub use process::{
    ServerCommand, ServerIo, ServerProcess, SpawnError, VersionError, locale_from_env,
    query_version,
};
pub use protocol::{DecodeError, Event, IncomingFrame, Response};
pub use rpc::{DEFAULT_REQUEST_TIMEOUT, RpcClient, RpcError, RpcOptions};
