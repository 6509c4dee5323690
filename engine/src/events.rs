//! Server events, as the bridge consumes them.
//!
//! Listeners on the client's event bus run on the reader task. They only
//! parse the body and queue a [`BridgeEvent`]; the bridge applies queued
//! events from its own task in [`Bridge::poll_events`](crate::Bridge::poll_events).
//!
//! When the channel is full, events spill into an overflow queue that keeps
//! only the latest diagnostics per file and pass. A slow consumer then sees
//! fewer, newer sets instead of losing the newest one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tsbridge_client::protocol::{
    EVENT_PROJECT_LOADING_FINISH, EVENT_PROJECT_LOADING_START, EVENT_REQUEST_COMPLETED,
    EVENT_SEMANTIC_DIAG, EVENT_SUGGESTION_DIAG, EVENT_SYNTAX_DIAG,
};
use tsbridge_client::{RpcClient, Subscription};
use tsbridge_types::DiagnosticEventBody;

/// Channel capacity between event listeners and the bridge.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Which diagnostics pass produced a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    Syntax,
    Semantic,
    Suggestion,
}

impl DiagnosticKind {
    const ALL: [(Self, &'static str); 3] = [
        (Self::Syntax, EVENT_SYNTAX_DIAG),
        (Self::Semantic, EVENT_SEMANTIC_DIAG),
        (Self::Suggestion, EVENT_SUGGESTION_DIAG),
    ];
}

#[derive(Debug, Clone)]
pub enum BridgeEvent {
    Diagnostics {
        kind: DiagnosticKind,
        body: DiagnosticEventBody,
    },
    /// A `geterr` batch finished.
    RequestCompleted,
    ProjectLoading {
        loading: bool,
    },
    /// The connection of session `generation` closed.
    ServerStopped {
        generation: u64,
    },
}

/// Producer side of the bridge's event queue.
#[derive(Clone)]
pub(crate) struct EventSender {
    tx: mpsc::Sender<BridgeEvent>,
    overflow: Arc<Mutex<Vec<BridgeEvent>>>,
}

/// Consumer side: the channel first, then whatever overflowed.
pub(crate) struct EventReceiver {
    rx: mpsc::Receiver<BridgeEvent>,
    overflow: Arc<Mutex<Vec<BridgeEvent>>>,
}

pub(crate) fn channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let overflow = Arc::new(Mutex::new(Vec::new()));
    (
        EventSender {
            tx,
            overflow: Arc::clone(&overflow),
        },
        EventReceiver { rx, overflow },
    )
}

fn lock(overflow: &Mutex<Vec<BridgeEvent>>) -> MutexGuard<'_, Vec<BridgeEvent>> {
    overflow.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Whether `newer` makes `older` pointless to apply.
fn supersedes(newer: &BridgeEvent, older: &BridgeEvent) -> bool {
    match (newer, older) {
        (
            BridgeEvent::Diagnostics { kind, body },
            BridgeEvent::Diagnostics {
                kind: old_kind,
                body: old_body,
            },
        ) => kind == old_kind && body.file == old_body.file,
        (BridgeEvent::ProjectLoading { .. }, BridgeEvent::ProjectLoading { .. })
        | (BridgeEvent::RequestCompleted, BridgeEvent::RequestCompleted) => true,
        _ => false,
    }
}

impl EventSender {
    /// Queue `event` without waiting.
    ///
    /// Once anything has overflowed, later events go to the overflow queue
    /// too, so everything there is newer than what the channel holds.
    pub(crate) fn push(&self, event: BridgeEvent) {
        let mut overflow = lock(&self.overflow);
        let event = if overflow.is_empty() {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(event)) => event,
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            }
        } else {
            event
        };
        match overflow.iter_mut().find(|queued| supersedes(&event, queued)) {
            Some(queued) => *queued = event,
            None => {
                tracing::debug!(queued = overflow.len() + 1, "Event channel full; coalescing");
                overflow.push(event);
            }
        }
    }

    /// Queue `event`, waiting for channel space.
    pub(crate) async fn send(&self, event: BridgeEvent) {
        // The receiver only goes away with the bridge.
        let _ = self.tx.send(event).await;
    }
}

impl EventReceiver {
    pub(crate) fn try_recv(&mut self) -> Option<BridgeEvent> {
        if let Ok(event) = self.rx.try_recv() {
            return Some(event);
        }
        let mut overflow = lock(&self.overflow);
        (!overflow.is_empty()).then(|| overflow.remove(0))
    }

    pub(crate) async fn recv_timeout(&mut self, limit: Duration) -> Option<BridgeEvent> {
        if let Some(event) = self.try_recv() {
            return Some(event);
        }
        tokio::time::timeout(limit, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[cfg(test)]
    pub(crate) fn overflowed(&self) -> usize {
        lock(&self.overflow).len()
    }
}

/// Register the bridge's listeners on `rpc`. Dropping the returned guards
/// unregisters them.
pub(crate) fn subscribe(rpc: &RpcClient, tx: &EventSender) -> Vec<Subscription> {
    let mut subscriptions = Vec::with_capacity(6);

    for (kind, name) in DiagnosticKind::ALL {
        let tx = tx.clone();
        subscriptions.push(rpc.subscribe(name, move |body| {
            match serde_json::from_value::<DiagnosticEventBody>(body.clone()) {
                Ok(body) => tx.push(BridgeEvent::Diagnostics { kind, body }),
                Err(e) => tracing::warn!(event = name, "Malformed diagnostics event: {e}"),
            }
        }));
    }

    let completed = tx.clone();
    subscriptions.push(rpc.subscribe(EVENT_REQUEST_COMPLETED, move |_: &Value| {
        completed.push(BridgeEvent::RequestCompleted);
    }));

    let started = tx.clone();
    subscriptions.push(rpc.subscribe(EVENT_PROJECT_LOADING_START, move |_: &Value| {
        started.push(BridgeEvent::ProjectLoading { loading: true });
    }));

    let finished = tx.clone();
    subscriptions.push(rpc.subscribe(EVENT_PROJECT_LOADING_FINISH, move |_: &Value| {
        finished.push(BridgeEvent::ProjectLoading { loading: false });
    }));

    subscriptions
}

/// Queue [`BridgeEvent::ServerStopped`] once `rpc`'s transport closes.
pub(crate) fn watch_disconnect(rpc: &RpcClient, tx: EventSender, generation: u64) {
    let mut connection = rpc.connection();
    tokio::spawn(async move {
        // An error means the sender is gone, which is a disconnect as well.
        let _ = connection.wait_for(|connected| !*connected).await;
        tx.send(BridgeEvent::ServerStopped { generation }).await;
    });
}
