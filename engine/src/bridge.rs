//! The bridge: one editor, at most one analysis server session.
//!
//! A running session lives in `session`; `None` is the stopped state.
//! When the connection drops, the session is removed and every command
//! fails with [`BridgeError::NotRunning`] until the next `start`.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tsbridge_client::{RpcError, Subscription, TsServer};
use tsbridge_config::{BridgeConfig, EvictionPolicy};
use tsbridge_editor::{DiagnosticStore, EchoLevel, EditorHost, Reconciler};
use tsbridge_types::{FileLocationArgs, Location};

use crate::diagnostics::DiagnosticParts;
use crate::error::BridgeError;
use crate::events::{self, BridgeEvent, EVENT_CHANNEL_CAPACITY, EventReceiver, EventSender};
use crate::settings;

pub const MSG_SERVER_STARTED: &str = "Server started";
pub const MSG_SERVER_STOPPED: &str = "Server stopped";

struct Session {
    server: TsServer,
    generation: u64,
    /// Held for their `Drop`: the listeners live exactly as long as the session.
    _subscriptions: Vec<Subscription>,
}

pub struct Bridge<H> {
    pub(crate) host: Arc<H>,
    pub(crate) config: BridgeConfig,
    session: Option<Session>,
    generation: u64,
    pub(crate) store: DiagnosticStore,
    pub(crate) reconciler: Reconciler,
    pub(crate) parts: HashMap<String, DiagnosticParts>,
    event_rx: EventReceiver,
    event_tx: EventSender,
    project_loading: bool,
}

impl<H: EditorHost> Bridge<H> {
    #[must_use]
    pub fn new(host: Arc<H>, config: BridgeConfig) -> Self {
        let (event_tx, event_rx) = events::channel(EVENT_CHANNEL_CAPACITY);
        let reconciler = Reconciler::new(settings::sign_definitions(&config.diagnostics.signs));
        Self {
            host,
            config,
            session: None,
            generation: 0,
            store: DiagnosticStore::new(),
            reconciler,
            parts: HashMap::new(),
            event_rx,
            event_tx,
            project_loading: false,
        }
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &DiagnosticStore {
        &self.store
    }

    #[must_use]
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the server reported a project load in progress.
    #[must_use]
    pub fn is_project_loading(&self) -> bool {
        self.project_loading
    }

    #[must_use]
    pub fn server(&self) -> Option<&TsServer> {
        self.session.as_ref().map(|s| &s.server)
    }

    pub(crate) fn running(&self) -> Result<&TsServer, BridgeError> {
        self.server().ok_or(BridgeError::NotRunning)
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Spawn the server and open the current buffer.
    ///
    /// Editor variables are re-read on every start. Does nothing when a
    /// session is already running.
    pub async fn start(&mut self) -> Result<(), BridgeError> {
        if self.session.is_some() {
            return Ok(());
        }

        settings::apply_host_vars(&*self.host, &mut self.config).await?;
        let server_settings = settings::server_settings(&self.config.server);
        tracing::info!(server = %server_settings.command.program, "Starting analysis server");

        let server = match TsServer::start(&server_settings).await {
            Ok(server) => server,
            Err(e) => {
                tracing::warn!("Failed to start analysis server: {e}");
                self.echo(EchoLevel::Error, &e.to_string()).await?;
                return Err(e.into());
            }
        };
        self.attach(server).await
    }

    /// Run `server` as the session. Used by [`start`](Self::start) and by
    /// embedders that connect the transport themselves.
    pub async fn attach(&mut self, server: TsServer) -> Result<(), BridgeError> {
        if let Some(mut previous) = self.session.take() {
            previous.server.stop().await;
        }

        self.generation += 1;
        let subscriptions = events::subscribe(server.rpc(), &self.event_tx);
        events::watch_disconnect(server.rpc(), self.event_tx.clone(), self.generation);
        tracing::info!(
            generation = self.generation,
            version = %server.version(),
            pid = ?server.pid(),
            "Analysis server session started"
        );
        self.session = Some(Session {
            server,
            generation: self.generation,
            _subscriptions: subscriptions,
        });
        self.project_loading = false;

        self.reconciler.define_signs(&*self.host).await?;
        self.echo(EchoLevel::Info, MSG_SERVER_STARTED).await?;
        self.open_current().await
    }

    /// Stop the session. Diagnostics already shown stay in place.
    pub async fn stop(&mut self) -> Result<(), BridgeError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        session.server.stop().await;
        tracing::info!(generation = session.generation, "Analysis server stopped");
        self.echo(EchoLevel::Info, MSG_SERVER_STOPPED).await
    }

    pub async fn restart(&mut self) -> Result<(), BridgeError> {
        self.stop().await?;
        self.start().await
    }

    // ── Buffer lifecycle ────────────────────────────────────────────────

    /// The editor entered a buffer: start the server if needed, otherwise
    /// open the file and refresh its diagnostics.
    pub async fn on_buf_enter(&mut self) -> Result<(), BridgeError> {
        if self.session.is_none() {
            return self.start().await;
        }
        self.open_current().await
    }

    /// Sync the saved buffer and, with diagnostics on, recheck it.
    pub async fn on_buf_save(&mut self) -> Result<(), BridgeError> {
        if self.config.diagnostics.enable {
            self.request_diagnostics().await
        } else {
            self.reload_file().await
        }
    }

    /// `file`'s buffer was closed.
    pub async fn on_buf_close(&mut self, file: &str) -> Result<(), BridgeError> {
        if let Some(server) = self.server() {
            server.close_file(file).await?;
        }
        if self.config.diagnostics.eviction == EvictionPolicy::OnBufferClose {
            self.parts.remove(file);
            let old = self.store.evict(file);
            self.reconciler.forget(&*self.host, file, &old).await?;
            tracing::debug!(file, evicted = old.len(), "Evicted diagnostics");
        }
        Ok(())
    }

    async fn open_current(&mut self) -> Result<(), BridgeError> {
        let file = self.host.current_file().await?;
        if file.is_empty() {
            return Ok(());
        }
        self.running()?.open_file(&file, None).await?;
        if self.config.diagnostics.enable {
            self.diagnostics().await?;
        }
        Ok(())
    }

    /// Send the current buffer's contents to the server.
    ///
    /// The contents go through a scratch file that is removed once the
    /// server has answered, whether or not it succeeded.
    pub async fn reload_file(&self) -> Result<(), BridgeError> {
        let server = self.running()?;
        let file = self.current_file().await?;
        let lines = self.host.buffer_lines().await?;

        let mut snapshot = tempfile::Builder::new().prefix("tsbridge-").tempfile()?;
        snapshot.write_all(lines.join("\n").as_bytes())?;
        snapshot.flush()?;
        let tmpfile = snapshot.path().to_string_lossy().into_owned();

        let result = server.reload_file(&file, &tmpfile).await;
        if let Err(e) = snapshot.close() {
            tracing::warn!(path = %tmpfile, "Failed to remove buffer snapshot: {e}");
        }
        result.map_err(Into::into)
    }

    // ── Events ──────────────────────────────────────────────────────────

    /// Apply queued server events, up to `budget`. Never waits.
    ///
    /// Returns how many events were handled.
    pub async fn poll_events(&mut self, budget: usize) -> usize {
        let mut handled = 0;
        while handled < budget {
            let Some(event) = self.event_rx.try_recv() else {
                break;
            };
            self.handle_event(event).await;
            handled += 1;
        }
        handled
    }

    /// Wait up to `limit` for one event and apply it.
    pub async fn wait_event(&mut self, limit: Duration) -> Option<BridgeEvent> {
        let event = self.event_rx.recv_timeout(limit).await?;
        self.handle_event(event.clone()).await;
        Some(event)
    }

    pub async fn handle_event(&mut self, event: BridgeEvent) {
        let outcome = match event {
            BridgeEvent::Diagnostics { kind, body } => {
                self.on_diagnostics_event(kind, body).await
            }
            BridgeEvent::RequestCompleted => {
                tracing::trace!("Diagnostics batch completed");
                Ok(())
            }
            BridgeEvent::ProjectLoading { loading } => {
                tracing::debug!(loading, "Project loading state changed");
                self.project_loading = loading;
                Ok(())
            }
            BridgeEvent::ServerStopped { generation } => self.on_server_stopped(generation).await,
        };
        if let Err(e) = outcome {
            tracing::warn!("Failed to handle server event: {e}");
        }
    }

    async fn on_server_stopped(&mut self, generation: u64) -> Result<(), BridgeError> {
        // Stale notices from a session that was already replaced or stopped.
        if self.session.as_ref().map(|s| s.generation) != Some(generation) {
            return Ok(());
        }
        if let Some(mut session) = self.session.take() {
            session.server.stop().await;
        }
        tracing::warn!(generation, "Analysis server connection lost");
        self.echo(EchoLevel::Error, MSG_SERVER_STOPPED).await
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    pub(crate) async fn current_file(&self) -> Result<String, BridgeError> {
        let file = self.host.current_file().await?;
        if file.is_empty() {
            return Err(BridgeError::NoFile);
        }
        Ok(file)
    }

    /// Current file and cursor, as request arguments.
    pub(crate) async fn cursor_args(&self) -> Result<FileLocationArgs, BridgeError> {
        let file = self.current_file().await?;
        let Location { line, offset } = self.host.cursor().await?;
        Ok(FileLocationArgs::new(file, line, offset))
    }

    pub(crate) async fn echo(&self, level: EchoLevel, message: &str) -> Result<(), BridgeError> {
        self.host.echo(level, message).await.map_err(Into::into)
    }

    /// Turn "the server had nothing" into a status message.
    ///
    /// Server failures and unsupported commands become `Ok(None)` after
    /// echoing `no_result` (or the version note). Transport errors propagate.
    pub(crate) async fn settle<T>(
        &self,
        result: Result<T, RpcError>,
        no_result: &str,
    ) -> Result<Option<T>, BridgeError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(RpcError::Failed { command, message }) => {
                tracing::debug!(%command, %message, "Request failed");
                self.echo(EchoLevel::Info, no_result).await?;
                Ok(None)
            }
            Err(RpcError::Unsupported { feature, version }) => {
                let note = format!(
                    "{} requires TypeScript {} or newer (server is {version})",
                    feature.name(),
                    feature.min_version()
                );
                self.echo(EchoLevel::Warning, &note).await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<H> Drop for Bridge<H> {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.server.rpc().disconnect();
        }
    }
}

impl<H> std::fmt::Debug for Bridge<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("running", &self.session.is_some())
            .field("generation", &self.generation)
            .field("project_loading", &self.project_loading)
            .finish_non_exhaustive()
    }
}
