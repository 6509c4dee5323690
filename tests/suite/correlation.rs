//! Request/response correlation over an in-process transport.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tsbridge_client::rpc::{RpcClient, RpcOptions};

/// The server side of a duplex pair.
struct Peer {
    requests: Lines<BufReader<DuplexStream>>,
    responses: DuplexStream,
}

impl Peer {
    async fn next_request(&mut self) -> Value {
        let line = self.requests.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    async fn respond(&mut self, request: &Value, body: Value) {
        let frame = json!({
            "seq": 0,
            "type": "response",
            "command": request["command"],
            "request_seq": request["seq"],
            "success": true,
            "body": body,
        });
        self.responses
            .write_all(format!("{frame}\n").as_bytes())
            .await
            .unwrap();
    }
}

fn connect() -> (Arc<RpcClient>, Peer) {
    let (client_out, server_in) = tokio::io::duplex(1 << 16);
    let (server_out, client_in) = tokio::io::duplex(1 << 16);
    let rpc = RpcClient::connect(client_in, client_out, RpcOptions::default());
    let peer = Peer {
        requests: BufReader::new(server_in).lines(),
        responses: server_out,
    };
    (Arc::new(rpc), peer)
}

#[tokio::test]
async fn overlapping_calls_answered_in_reverse() {
    let (rpc, mut peer) = connect();

    let first = {
        let rpc = Arc::clone(&rpc);
        tokio::spawn(async move { rpc.call("definition", Some(json!({"file": "a.ts"}))).await })
    };
    let definition = peer.next_request().await;
    let second = {
        let rpc = Arc::clone(&rpc);
        tokio::spawn(async move { rpc.call("references", Some(json!({"file": "a.ts"}))).await })
    };
    let references = peer.next_request().await;
    assert_eq!(definition["command"], "definition");
    assert_eq!(references["command"], "references");

    peer.respond(&references, json!({"refs": []})).await;
    peer.respond(&definition, json!([{"file": "b.ts"}])).await;

    assert_eq!(first.await.unwrap().unwrap(), json!([{"file": "b.ts"}]));
    assert_eq!(second.await.unwrap().unwrap(), json!({"refs": []}));
}

#[tokio::test]
async fn sequence_numbers_are_distinct_and_increasing() {
    let (rpc, mut peer) = connect();

    let mut seqs = Vec::new();
    for i in 0..20 {
        rpc.notify("open", Some(json!({"file": format!("{i}.ts")})))
            .await
            .unwrap();
        let request = peer.next_request().await;
        seqs.push(request["seq"].as_u64().unwrap());
    }

    assert!(seqs.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn every_caller_gets_its_own_payload_under_any_response_order() {
    const CALLS: usize = 16;
    let (rpc, mut peer) = connect();

    let handles: Vec<_> = (0..CALLS)
        .map(|i| {
            let rpc = Arc::clone(&rpc);
            tokio::spawn(async move {
                let body = rpc
                    .call("quickinfo", Some(json!({"caller": i})))
                    .await
                    .unwrap();
                (i, body)
            })
        })
        .collect();

    let mut requests = Vec::with_capacity(CALLS);
    for _ in 0..CALLS {
        requests.push(peer.next_request().await);
    }

    // A fixed shuffle: interleave from both ends.
    let mut order = Vec::with_capacity(CALLS);
    let (mut lo, mut hi) = (0, CALLS);
    while lo < hi {
        hi -= 1;
        order.push(hi);
        if lo < hi {
            order.push(lo);
            lo += 1;
        }
    }
    for index in order {
        let request = &requests[index];
        let body = json!({"caller": request["arguments"]["caller"]});
        peer.respond(request, body).await;
    }

    for handle in handles {
        let (caller, body) = handle.await.unwrap();
        assert_eq!(body["caller"], caller);
    }
    assert_eq!(rpc.pending_count(), 0);
}

#[tokio::test]
async fn events_interleaved_with_responses_reach_listeners() {
    let (rpc, mut peer) = connect();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _subscription = rpc.subscribe("semanticDiag", move |body| {
        let _ = tx.send(body["file"].clone());
    });

    let call = {
        let rpc = Arc::clone(&rpc);
        tokio::spawn(async move { rpc.call("quickinfo", None).await })
    };
    let request = peer.next_request().await;

    let event = json!({"seq": 0, "type": "event", "event": "semanticDiag",
                       "body": {"file": "a.ts", "diagnostics": []}});
    peer.responses
        .write_all(format!("{event}\n").as_bytes())
        .await
        .unwrap();
    peer.respond(&request, json!({"kind": "const"})).await;

    assert_eq!(call.await.unwrap().unwrap(), json!({"kind": "const"}));
    assert_eq!(rx.recv().await.unwrap(), "a.ts");
}
