//! Request correlator.
//!
//! [`RpcClient`] owns the transport: a writer task draining an ordered
//! command queue into the server's stdin, and a reader task decoding stdout
//! into frames. Requests are matched to responses purely by sequence number;
//! events fan out through the [`EventBus`].
//!
//! Every request that is still pending when the transport closes is failed
//! with [`RpcError::Disconnected`]. Calls made after that fail immediately.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tsbridge_types::{Feature, ProtocolVersion};

use crate::codec::{self, FrameReader, FrameWriter};
use crate::events::{EventBus, Subscription};
use crate::protocol::IncomingFrame;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The server answered `success: false`.
    #[error("{command}: {message}")]
    Failed { command: String, message: String },
    #[error("analysis server disconnected")]
    Disconnected,
    #[error("{command} (seq {seq}) timed out")]
    Timeout { command: String, seq: u64 },
    #[error("encoding {command} arguments: {source}")]
    Encode {
        command: String,
        #[source]
        source: serde_json::Error,
    },
    /// The response body did not have the shape the command declares.
    #[error("unexpected {command} response body: {source}")]
    BodyShape {
        command: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} requires server {} or newer (running {version})", .feature.name(), .feature.min_version())]
    Unsupported {
        feature: Feature,
        version: ProtocolVersion,
    },
}

impl RpcError {
    /// Server-reported failures are ordinary "no result" outcomes.
    #[must_use]
    pub fn is_failure_response(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RpcOptions {
    /// `None` waits forever.
    pub request_timeout: Option<Duration>,
}

impl Default for RpcOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

type Reply = oneshot::Sender<Result<Value, RpcError>>;

enum WriterCommand {
    Send {
        frame: Vec<u8>,
        written: Option<oneshot::Sender<()>>,
    },
    Shutdown,
}

struct PendingRequest {
    command: String,
    reply: Reply,
}

struct Correlation {
    next_seq: u64,
    pending: HashMap<u64, PendingRequest>,
    /// `None` once disconnected.
    writer: Option<mpsc::UnboundedSender<WriterCommand>>,
}

struct Shared {
    state: Mutex<Correlation>,
    events: EventBus,
    connected: watch::Sender<bool>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Correlation> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_frame(&self, frame: IncomingFrame) {
        match frame {
            IncomingFrame::Response(response) => {
                let entry = self.lock().pending.remove(&response.request_seq);
                let Some(entry) = entry else {
                    tracing::warn!(
                        seq = response.request_seq,
                        command = %response.command,
                        "Discarding response with no pending request"
                    );
                    return;
                };
                let outcome = if response.success {
                    Ok(response.body.unwrap_or(Value::Null))
                } else {
                    Err(RpcError::Failed {
                        command: entry.command,
                        message: response
                            .message
                            .unwrap_or_else(|| "request failed".to_string()),
                    })
                };
                // Receiver gone means the caller stopped waiting.
                let _ = entry.reply.send(outcome);
            }
            IncomingFrame::Event(event) => {
                self.events.dispatch(&event.event, &event.body);
            }
        }
    }

    /// Close the transport and fail everything still in flight.
    fn disconnect(&self, reason: &str) {
        let (writer, drained) = {
            let mut state = self.lock();
            let Some(writer) = state.writer.take() else {
                return;
            };
            (writer, std::mem::take(&mut state.pending))
        };
        let _ = writer.send(WriterCommand::Shutdown);

        let count = drained.len();
        for (_, entry) in drained {
            let _ = entry.reply.send(Err(RpcError::Disconnected));
        }
        self.connected.send_replace(false);
        tracing::info!(drained = count, reason, "Analysis server connection closed");
    }
}

/// A correlated request/response channel to one server instance.
pub struct RpcClient {
    shared: Arc<Shared>,
    options: RpcOptions,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl RpcClient {
    /// Start the reader and writer tasks over an established transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect<R, W>(reader: R, writer: W, options: RpcOptions) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<WriterCommand>();
        let (connected, _) = watch::channel(true);
        let shared = Arc::new(Shared {
            state: Mutex::new(Correlation {
                next_seq: 0,
                pending: HashMap::new(),
                writer: Some(writer_tx),
            }),
            events: EventBus::new(),
            connected,
        });

        let writer_shared = Arc::clone(&shared);
        let writer_handle = tokio::spawn(async move {
            let mut writer = FrameWriter::new(writer);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send { frame, written } => {
                        if let Err(e) = writer.write_frame(&frame).await {
                            tracing::warn!("Analysis server write error: {e:#}");
                            writer_shared.disconnect("write failed");
                            break;
                        }
                        if let Some(written) = written {
                            let _ = written.send(());
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let reader_shared = Arc::clone(&shared);
        let reader_handle = tokio::spawn(async move {
            let mut reader = FrameReader::new(reader);
            loop {
                match reader.read_frame().await {
                    Ok(Some(frame)) => reader_shared.on_frame(frame),
                    Ok(None) => {
                        reader_shared.disconnect("server closed stdout");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Analysis server read error: {e}");
                        reader_shared.disconnect("read failed");
                        break;
                    }
                }
            }
        });

        Self {
            shared,
            options,
            reader_handle,
            writer_handle,
        }
    }

    /// Send `command` and wait for its correlated response body.
    pub async fn call(&self, command: &str, arguments: Option<Value>) -> Result<Value, RpcError> {
        let arguments = arguments.unwrap_or(Value::Null);
        let (reply, rx) = oneshot::channel();
        let seq = self.enqueue(command, &arguments, Some(reply), None)?;
        tracing::trace!(seq, command, "Request sent");

        let outcome = match self.options.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    // A late response will find no entry and be discarded.
                    self.shared.lock().pending.remove(&seq);
                    return Err(RpcError::Timeout {
                        command: command.to_string(),
                        seq,
                    });
                }
            },
            None => rx.await,
        };
        outcome.unwrap_or(Err(RpcError::Disconnected))
    }

    /// Send `command` without registering for a response.
    ///
    /// Resolves once the frame has been written. Returns the sequence number
    /// the frame carried.
    pub async fn notify(&self, command: &str, arguments: Option<Value>) -> Result<u64, RpcError> {
        let arguments = arguments.unwrap_or(Value::Null);
        let (written, rx) = oneshot::channel();
        let seq = self.enqueue(command, &arguments, None, Some(written))?;
        tracing::trace!(seq, command, "Notification sent");
        rx.await.map_err(|_| RpcError::Disconnected)?;
        Ok(seq)
    }

    /// Typed wrapper over [`call`](Self::call).
    pub async fn request<A, R>(&self, command: &str, arguments: &A) -> Result<R, RpcError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let arguments = encode_arguments(command, arguments)?;
        let body = self.call(command, Some(arguments)).await?;
        serde_json::from_value(body).map_err(|source| RpcError::BodyShape {
            command: command.to_string(),
            source,
        })
    }

    /// Typed wrapper over [`notify`](Self::notify).
    pub async fn send<A>(&self, command: &str, arguments: &A) -> Result<(), RpcError>
    where
        A: Serialize + ?Sized,
    {
        let arguments = encode_arguments(command, arguments)?;
        self.notify(command, Some(arguments)).await.map(|_| ())
    }

    pub fn subscribe<F>(&self, event: &str, listener: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(event, listener)
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    /// Resolves once the transport has closed.
    pub async fn closed(&self) {
        let mut rx = self.shared.connected.subscribe();
        let _ = rx.wait_for(|connected| !*connected).await;
    }

    /// A receiver that observes `false` once the transport closes.
    #[must_use]
    pub fn connection(&self) -> watch::Receiver<bool> {
        self.shared.connected.subscribe()
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Close the transport. Pending requests fail with `Disconnected`.
    pub fn disconnect(&self) {
        self.shared.disconnect("client shutdown");
    }

    /// Allocate a sequence number and queue the frame under one lock, so
    /// the write order always matches the sequence order.
    fn enqueue(
        &self,
        command: &str,
        arguments: &Value,
        reply: Option<Reply>,
        written: Option<oneshot::Sender<()>>,
    ) -> Result<u64, RpcError> {
        let mut state = self.shared.lock();
        let Some(writer) = state.writer.clone() else {
            return Err(RpcError::Disconnected);
        };

        let seq = state.next_seq;
        let frame = codec::encode(seq, command, arguments).map_err(|source| RpcError::Encode {
            command: command.to_string(),
            source,
        })?;
        state.next_seq += 1;

        if let Some(reply) = reply {
            state.pending.insert(
                seq,
                PendingRequest {
                    command: command.to_string(),
                    reply,
                },
            );
        }
        if writer
            .send(WriterCommand::Send { frame, written })
            .is_err()
        {
            state.pending.remove(&seq);
            return Err(RpcError::Disconnected);
        }
        Ok(seq)
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.shared.disconnect("client dropped");
        self.reader_handle.abort();
        // The writer exits on its own after draining the shutdown command.
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("connected", &self.is_connected())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

fn encode_arguments<A: Serialize + ?Sized>(command: &str, arguments: &A) -> Result<Value, RpcError> {
    serde_json::to_value(arguments).map_err(|source| RpcError::Encode {
        command: command.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};

    use super::*;

    struct FakeServer {
        requests: Lines<BufReader<DuplexStream>>,
        out: DuplexStream,
    }

    impl FakeServer {
        async fn next_request(&mut self) -> Value {
            let line = self.requests.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }

        async fn respond(&mut self, seq: u64, body: Value) {
            let frame = serde_json::json!({
                "seq": 0, "type": "response", "command": "x",
                "request_seq": seq, "success": true, "body": body,
            });
            self.write_line(&frame.to_string()).await;
        }

        async fn write_line(&mut self, line: &str) {
            self.out.write_all(line.as_bytes()).await.unwrap();
            self.out.write_all(b"\n").await.unwrap();
            self.out.flush().await.unwrap();
        }
    }

    fn connect(options: RpcOptions) -> (Arc<RpcClient>, FakeServer) {
        let (client_out, server_in) = tokio::io::duplex(64 * 1024);
        let (server_out, client_in) = tokio::io::duplex(64 * 1024);
        let client = RpcClient::connect(client_in, client_out, options);
        let server = FakeServer {
            requests: BufReader::new(server_in).lines(),
            out: server_out,
        };
        (Arc::new(client), server)
    }

    // ── Sequencing ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn sequence_numbers_start_at_zero_and_increase() {
        let (client, mut server) = connect(RpcOptions::default());
        for expected in 0..5u64 {
            let seq = client.notify("open", Some(serde_json::json!({"file": "a.ts"}))).await.unwrap();
            assert_eq!(seq, expected);
            let req = server.next_request().await;
            assert_eq!(req["seq"], expected);
            assert_eq!(req["type"], "request");
            assert_eq!(req["command"], "open");
        }
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_calls_get_distinct_increasing_seqs() {
        let (client, mut server) = connect(RpcOptions::default());
        let mut calls = Vec::new();
        for _ in 0..8 {
            let c = Arc::clone(&client);
            calls.push(tokio::spawn(async move { c.call("quickinfo", None).await }));
        }

        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(server.next_request().await["seq"].as_u64().unwrap());
        }
        let mut sorted = seen.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 8);
        assert_eq!(seen, sorted, "write order must follow seq order");

        for seq in &seen {
            server.respond(*seq, serde_json::json!(seq)).await;
        }
        for call in calls {
            call.await.unwrap().unwrap();
        }
    }

    // ── Correlation ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn responses_out_of_order_reach_their_callers() {
        let (client, mut server) = connect(RpcOptions::default());
        let c1 = Arc::clone(&client);
        let first = tokio::spawn(async move { c1.call("definition", None).await });
        let seq_a = server.next_request().await["seq"].as_u64().unwrap();
        let c2 = Arc::clone(&client);
        let second = tokio::spawn(async move { c2.call("references", None).await });
        let seq_b = server.next_request().await["seq"].as_u64().unwrap();

        server.respond(seq_b, serde_json::json!({"refs": []})).await;
        server.respond(seq_a, serde_json::json!([{"file": "a.ts"}])).await;

        assert_eq!(first.await.unwrap().unwrap(), serde_json::json!([{"file": "a.ts"}]));
        assert_eq!(second.await.unwrap().unwrap(), serde_json::json!({"refs": []}));
    }

    #[tokio::test]
    async fn failure_response_carries_message() {
        let (client, mut server) = connect(RpcOptions::default());
        let c = Arc::clone(&client);
        let call = tokio::spawn(async move { c.call("definition", None).await });
        let seq = server.next_request().await["seq"].as_u64().unwrap();
        server
            .write_line(&format!(
                r#"{{"seq":0,"type":"response","command":"definition","request_seq":{seq},"success":false,"message":"No content available."}}"#
            ))
            .await;

        match call.await.unwrap() {
            Err(RpcError::Failed { command, message }) => {
                assert_eq!(command, "definition");
                assert_eq!(message, "No content available.");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_response_is_discarded() {
        let (client, mut server) = connect(RpcOptions::default());
        let c = Arc::clone(&client);
        let call = tokio::spawn(async move { c.call("quickinfo", None).await });
        let seq = server.next_request().await["seq"].as_u64().unwrap();
        server.respond(seq, serde_json::json!(1)).await;
        server.respond(seq, serde_json::json!(2)).await;
        assert_eq!(call.await.unwrap().unwrap(), serde_json::json!(1));

        // The stream keeps working after the stray frame.
        let c = Arc::clone(&client);
        let next = tokio::spawn(async move { c.call("quickinfo", None).await });
        let seq = server.next_request().await["seq"].as_u64().unwrap();
        server.respond(seq, serde_json::json!(3)).await;
        assert_eq!(next.await.unwrap().unwrap(), serde_json::json!(3));
    }

    #[tokio::test]
    async fn typed_request_rejects_wrong_shape() {
        let (client, mut server) = connect(RpcOptions::default());
        let c = Arc::clone(&client);
        let call = tokio::spawn(async move {
            c.request::<_, Vec<String>>("navto", &serde_json::json!({"searchValue": "x"}))
                .await
        });
        let seq = server.next_request().await["seq"].as_u64().unwrap();
        server.respond(seq, serde_json::json!({"not": "a list"})).await;
        assert!(matches!(
            call.await.unwrap(),
            Err(RpcError::BodyShape { .. })
        ));
    }

    // ── Timeouts ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn timeout_removes_entry_and_late_response_is_ignored() {
        let (client, mut server) = connect(RpcOptions {
            request_timeout: Some(Duration::from_millis(50)),
        });
        let result = client.call("geterrForProject", None).await;
        let seq = match result {
            Err(RpcError::Timeout { seq, .. }) => seq,
            other => panic!("expected timeout, got {other:?}"),
        };
        assert_eq!(client.pending_count(), 0);

        let _ = server.next_request().await;
        server.respond(seq, serde_json::json!("late")).await;

        let c = Arc::clone(&client);
        let next = tokio::spawn(async move { c.call("quickinfo", None).await });
        let next_seq = server.next_request().await["seq"].as_u64().unwrap();
        assert_eq!(next_seq, seq + 1);
        server.respond(next_seq, serde_json::json!("fresh")).await;
        assert_eq!(next.await.unwrap().unwrap(), serde_json::json!("fresh"));
    }

    // ── Disconnect ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn disconnect_fails_all_pending() {
        let (client, mut server) = connect(RpcOptions {
            request_timeout: None,
        });
        let mut calls = Vec::new();
        for _ in 0..3 {
            let c = Arc::clone(&client);
            calls.push(tokio::spawn(async move { c.call("references", None).await }));
        }
        for _ in 0..3 {
            server.next_request().await;
        }
        assert_eq!(client.pending_count(), 3);

        drop(server);
        client.closed().await;
        assert!(!client.is_connected());

        for call in calls {
            assert!(matches!(call.await.unwrap(), Err(RpcError::Disconnected)));
        }
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn call_after_disconnect_fails_immediately() {
        let (client, server) = connect(RpcOptions {
            request_timeout: None,
        });
        drop(server);
        client.closed().await;

        assert!(matches!(
            client.call("quickinfo", None).await,
            Err(RpcError::Disconnected)
        ));
        assert!(matches!(
            client.notify("open", None).await,
            Err(RpcError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn explicit_disconnect_is_idempotent() {
        let (client, _server) = connect(RpcOptions::default());
        client.disconnect();
        client.disconnect();
        assert!(!client.is_connected());
    }

    // ── Events ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn events_reach_subscribers_between_responses() {
        let (client, mut server) = connect(RpcOptions::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let counter = Arc::clone(&hits);
        let _sub = client.subscribe("semanticDiag", move |body| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(body["file"].as_str().unwrap_or_default().to_string());
        });

        let c = Arc::clone(&client);
        let call = tokio::spawn(async move { c.call("quickinfo", None).await });
        let seq = server.next_request().await["seq"].as_u64().unwrap();
        server
            .write_line(r#"{"seq":0,"type":"event","event":"semanticDiag","body":{"file":"/a.ts","diagnostics":[]}}"#)
            .await;
        server
            .write_line(r#"{"seq":0,"type":"event","event":"telemetry","body":{}}"#)
            .await;
        server.respond(seq, serde_json::json!(true)).await;

        assert_eq!(call.await.unwrap().unwrap(), serde_json::json!(true));
        assert_eq!(rx.recv().await.unwrap(), "/a.ts");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
