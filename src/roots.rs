// src/roots.rs
// Roots manager (C5, spec §4.5): server->client `roots/list` correlation

use crate::protocol::{Message, MessageId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A single filesystem root as returned by the client (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Validates a root URI: must be `file://`, empty host, absolute path, no
/// `..` traversal segment (spec §4.5, P10).
pub fn validate_root_uri(uri: &str) -> bool {
    let Ok(parsed) = url::Url::parse(uri) else {
        return false;
    };
    if parsed.scheme() != "file" {
        return false;
    }
    if parsed.host_str().is_some_and(|h| !h.is_empty()) {
        return false;
    }
    let path = parsed.path();
    if !path.starts_with('/') {
        return false;
    }
    if path.split('/').any(|seg| seg == "..") {
        return false;
    }
    true
}

/// Parse a `roots/list` response body, silently dropping invalid roots
/// (spec §4.5: "Invalid roots are silently dropped").
pub fn parse_roots_response(roots: Vec<Root>) -> Vec<Root> {
    roots
        .into_iter()
        .filter(|r| {
            let ok = validate_root_uri(&r.uri);
            if !ok {
                warn!(uri = %r.uri, "dropping invalid root URI");
            }
            ok
        })
        .collect()
}

/// Manages in-flight server-initiated requests (currently only
/// `roots/list`), matching each response to its originating id exactly once.
pub struct RootsManager {
    next_id: AtomicI64,
    pending: Mutex<HashMap<i64, oneshot::Sender<Message>>>,
    timeout: Duration,
}

impl RootsManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Allocate a new request id and register a single-use sink for its
    /// response. Returns the id (to embed in the outbound request) and a
    /// future resolving to the client's reply or a timeout error.
    pub fn register(&self) -> (i64, oneshot::Receiver<Message>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).insert(id, tx);
        (id, rx)
    }

    /// Deliver a response to its matching pending request, removing the
    /// entry. Unmatched responses are dropped and logged (spec §4.5).
    pub fn resolve(&self, id: &MessageId, message: Message) {
        let numeric = match id {
            MessageId::Number(n) => *n,
            other => {
                warn!(id = %other, "roots response id is not numeric; dropping");
                return;
            }
        };
        let sink = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&numeric);
        match sink {
            Some(tx) => {
                let _ = tx.send(message);
            }
            None => warn!(id = numeric, "unmatched roots/list response, dropping"),
        }
    }

    /// Wait up to the configured timeout for a reply, removing the sink
    /// either way so it is resolved-or-timed-out exactly once (spec
    /// invariant).
    pub async fn wait(&self, id: i64, rx: oneshot::Receiver<Message>) -> Option<Message> {
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(message)) => Some(message),
            Ok(Err(_)) => None, // sender dropped (e.g. shutdown cancelled it)
            Err(_) => {
                debug!(id, "roots/list request timed out");
                self.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
                None
            }
        }
    }

    /// Cancel every pending request, e.g. on session shutdown.
    pub fn cancel_all(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        for (_, tx) in pending.drain() {
            drop(tx); // dropping the sender resolves the receiver to Err
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
