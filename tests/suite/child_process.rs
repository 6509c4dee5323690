//! End-to-end tests against real child processes.
//!
//! The "servers" are small POSIX shell loops, so these only run on Unix.
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tsbridge_client::rpc::{RpcClient, RpcError, RpcOptions};
use tsbridge_client::{ServerCommand, ServerProcess};
use tsbridge_config::BridgeConfig;
use tsbridge_editor::MemoryHost;
use tsbridge_engine::{Bridge, MSG_SERVER_STARTED, MSG_SERVER_STOPPED};

/// Answers every request with `{"echo": <arguments>}`.
const ECHO_SERVER: &str = r#"
while IFS= read -r line; do
  seq=${line#\{\"seq\":}; seq=${seq%%,*}
  args=${line#*\"arguments\":}; args=${args%\}}
  printf '{"seq":%s,"type":"response","request_seq":%s,"success":true,"body":{"echo":%s}}\n' "$seq" "$seq" "$args"
done
"#;

/// Like the echo server, but stays quiet for notifications and reports no
/// diagnostics.
const QUIET_SERVER: &str = r#"
while IFS= read -r line; do
  seq=${line#\{\"seq\":}; seq=${seq%%,*}
  case "$line" in
    *'"command":"open"'*|*'"command":"close"'*) continue ;;
    *'"command":"semanticDiagnosticsSync"'*|*'"command":"syntacticDiagnosticsSync"'*) body='[]' ;;
    *) body='{}' ;;
  esac
  printf '{"seq":%s,"type":"response","request_seq":%s,"success":true,"body":%s}\n' "$seq" "$seq" "$body"
done
"#;

/// Reads one request, then exits without answering.
const DYING_SERVER: &str = "IFS= read -r line; exit 0";

fn shell(script: &str) -> ServerCommand {
    ServerCommand::new("sh").args(["-c", script])
}

#[tokio::test]
async fn echo_server_round_trip() {
    let (mut process, io) = ServerProcess::start(&shell(ECHO_SERVER)).unwrap();
    let rpc = RpcClient::connect(io.stdout, io.stdin, RpcOptions::default());

    let body = rpc
        .call(
            "quickinfo",
            Some(json!({"file": "a.ts", "line": 1, "offset": 1})),
        )
        .await
        .unwrap();
    assert_eq!(
        body,
        json!({"echo": {"file": "a.ts", "line": 1, "offset": 1}})
    );

    // Later requests keep their own sequence numbers.
    let second = rpc
        .call("definition", Some(json!({"file": "b.ts"})))
        .await
        .unwrap();
    assert_eq!(second, json!({"echo": {"file": "b.ts"}}));

    process.stop().await;
    assert!(process.is_stopped());
}

#[tokio::test]
async fn exit_settles_every_pending_request() {
    let (_process, io) = ServerProcess::start(&shell(DYING_SERVER)).unwrap();
    let rpc = Arc::new(RpcClient::connect(
        io.stdout,
        io.stdin,
        RpcOptions {
            request_timeout: None,
        },
    ));

    let calls: Vec<_> = (0..5)
        .map(|i| {
            let rpc = Arc::clone(&rpc);
            tokio::spawn(async move { rpc.call("quickinfo", Some(json!({"n": i}))).await })
        })
        .collect();

    for call in calls {
        let outcome = tokio::time::timeout(Duration::from_secs(5), call)
            .await
            .expect("pending request settled")
            .unwrap();
        assert!(matches!(outcome, Err(RpcError::Disconnected)));
    }
    assert_eq!(rpc.pending_count(), 0);
    assert!(!rpc.is_connected());
}

#[tokio::test]
async fn bridge_starts_and_stops_a_configured_server() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.ts");
    std::fs::write(&file, "const a = 1;\n").unwrap();

    let host = Arc::new(MemoryHost::new());
    host.open_buffer(file.to_string_lossy(), "const a = 1;\n");

    let mut config = BridgeConfig::default();
    config.server.path = "sh".to_string();
    config.server.options = vec!["-c".to_string(), QUIET_SERVER.to_string()];
    config.server.version = Some("3.0.0".to_string());

    let mut bridge = Bridge::new(Arc::clone(&host), config);
    bridge.start().await.unwrap();
    assert!(bridge.is_running());
    assert_eq!(bridge.server().unwrap().version().to_string(), "3.0.0");
    assert!(
        host.messages()
            .iter()
            .any(|(_, m)| m == MSG_SERVER_STARTED)
    );
    assert!(host.markers(&file.to_string_lossy()).is_empty());

    // Already running: a second start is a no-op.
    bridge.start().await.unwrap();

    bridge.stop().await.unwrap();
    assert!(!bridge.is_running());
    assert_eq!(host.last_message().as_deref(), Some(MSG_SERVER_STOPPED));
}

#[tokio::test]
async fn missing_server_binary_is_reported() {
    let host = Arc::new(MemoryHost::new());
    host.open_buffer("/tmp/a.ts", "");

    let mut config = BridgeConfig::default();
    config.server.path = "tsbridge-no-such-server".to_string();
    config.server.version = Some("3.0.0".to_string());

    let mut bridge = Bridge::new(Arc::clone(&host), config);
    assert!(bridge.start().await.is_err());
    assert!(!bridge.is_running());
    assert!(
        host.last_message()
            .unwrap()
            .contains("tsbridge-no-such-server")
    );
}

#[tokio::test]
async fn restart_replaces_the_server_process() {
    let host = Arc::new(MemoryHost::new());
    host.open_buffer("/tmp/a.ts", "const a = 1;\n");

    let mut config = BridgeConfig::default();
    config.server.path = "sh".to_string();
    config.server.options = vec!["-c".to_string(), QUIET_SERVER.to_string()];
    config.server.version = Some("3.0.0".to_string());

    let mut bridge = Bridge::new(Arc::clone(&host), config);
    bridge.start().await.unwrap();
    let first = bridge.server().unwrap().pid();

    bridge.restart().await.unwrap();
    assert!(bridge.is_running());
    assert_ne!(bridge.server().unwrap().pid(), first);

    let messages: Vec<String> = host.messages().into_iter().map(|(_, m)| m).collect();
    assert_eq!(
        messages,
        vec![MSG_SERVER_STARTED, MSG_SERVER_STOPPED, MSG_SERVER_STARTED]
    );
    bridge.stop().await.unwrap();
}
