// src/stream/mod.rs
// Streaming controller (C9, spec §4.9): chunked emission of a tool result
// over the same outbound channel as ordinary responses, with backpressure,
// heartbeat, and cancellation.

use crate::engine::query::EngineResponse;
use crate::protocol::{Message, Outbound};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One notification payload for a stream (spec §4.9 event table). Tagged by
/// `event` so all six shapes share one wire method.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum StreamEvent {
    Meta {
        #[serde(skip_serializing_if = "Option::is_none")]
        total_items: Option<u64>,
        backends: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
        chunk_size: usize,
    },
    Progress {
        phase: String,
        current: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },
    Chunk {
        sequence: u64,
        data: Value,
        has_more: bool,
    },
    Heartbeat,
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
    Done {
        total_items: u64,
        elapsed_ms: u64,
        truncated: bool,
    },
}

const WIRE_METHOD: &str = "notifications/stream";

async fn emit(outbound: &Arc<dyn Outbound>, stream_id: u64, event: StreamEvent) -> Result<(), crate::error::CkbError> {
    let mut value = serde_json::to_value(&event)?;
    if let Value::Object(ref mut map) = value {
        map.insert("streamId".to_string(), Value::from(stream_id));
    }
    outbound.send(&Message::notification(WIRE_METHOD, Some(value))).await
}

/// Owns stream-id allocation and the backpressure/heartbeat machinery shared
/// by every streamable tool call. One instance per session.
pub struct StreamController {
    outbound: Arc<dyn Outbound>,
    next_stream_id: AtomicU64,
    max_buffer: usize,
    heartbeat_interval: Duration,
}

impl StreamController {
    pub fn new(outbound: Arc<dyn Outbound>, max_buffer: usize, heartbeat_interval: Duration) -> Self {
        Self {
            outbound,
            next_stream_id: AtomicU64::new(1),
            max_buffer: max_buffer.max(1),
            heartbeat_interval,
        }
    }

    /// Start streaming `response` in pages of `chunk_size` (minimum 1).
    /// Returns the immediate wire response the dispatcher writes back
    /// synchronously; the chunk/done/error events follow asynchronously.
    pub fn start_stream(
        self: &Arc<Self>,
        chunk_size: usize,
        cancellation: CancellationToken,
        response: EngineResponse,
    ) -> Value {
        let stream_id = self.next_stream_id.fetch_add(1, Ordering::SeqCst);
        let chunk_size = chunk_size.max(1);
        let (tx, rx) = mpsc::channel(self.max_buffer);

        tokio::spawn(Self::writer_loop(stream_id, rx, self.outbound.clone(), self.heartbeat_interval));
        tokio::spawn(Self::produce(stream_id, chunk_size, cancellation, response, tx));

        serde_json::json!({
            "streamId": stream_id,
            "streaming": true,
            "meta": { "chunkSize": chunk_size },
        })
    }

    async fn writer_loop(
        stream_id: u64,
        mut rx: mpsc::Receiver<StreamEvent>,
        outbound: Arc<dyn Outbound>,
        heartbeat_interval: Duration,
    ) {
        loop {
            match tokio::time::timeout(heartbeat_interval, rx.recv()).await {
                Ok(Some(event)) => {
                    if emit(&outbound, stream_id, event).await.is_err() {
                        return;
                    }
                }
                Ok(None) => return,
                Err(_) => {
                    if emit(&outbound, stream_id, StreamEvent::Heartbeat).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Chunks `response`'s `data.results` array (or the whole payload as a
    /// single item, if it isn't shaped that way) into ordered `chunk` events,
    /// honoring cancellation between pages.
    async fn produce(
        stream_id: u64,
        chunk_size: usize,
        cancellation: CancellationToken,
        response: EngineResponse,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let started = Instant::now();

        if tx
            .send(StreamEvent::Meta {
                total_items: response.total_results,
                backends: response.backends.clone(),
                confidence: Some(response.confidence_score),
                chunk_size,
            })
            .await
            .is_err()
        {
            return;
        }

        let items: Vec<Value> = match response.data.get("results").and_then(Value::as_array) {
            Some(arr) => arr.clone(),
            None => vec![response.data.clone()],
        };
        let total = items.len();
        let mut sequence: u64 = 0;
        let mut emitted: u64 = 0;

        for page in items.chunks(chunk_size) {
            if cancellation.is_cancelled() {
                debug!(stream_id, "stream cancelled mid-emission");
                let _ = tx
                    .send(StreamEvent::Error {
                        code: "CANCELLED".to_string(),
                        message: "stream cancelled".to_string(),
                        hint: None,
                    })
                    .await;
                return;
            }

            sequence += 1;
            emitted += page.len() as u64;
            let has_more = (emitted as usize) < total;
            if tx
                .send(StreamEvent::Chunk {
                    sequence,
                    data: Value::Array(page.to_vec()),
                    has_more,
                })
                .await
                .is_err()
            {
                return;
            }
            if !has_more {
                break;
            }
        }

        let truncated = response.total_results.is_some_and(|t| t > emitted);
        let _ = tx
            .send(StreamEvent::Done {
                total_items: emitted,
                elapsed_ms: started.elapsed().as_millis() as u64,
                truncated,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct RecordingOutbound {
        sent: AsyncMutex<Vec<Message>>,
    }

    #[async_trait]
    impl Outbound for RecordingOutbound {
        async fn send(&self, message: &Message) -> Result<(), crate::error::CkbError> {
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    fn response_with(n: usize) -> EngineResponse {
        let results: Vec<Value> = (0..n).map(|i| serde_json::json!({"id": i})).collect();
        EngineResponse {
            data: serde_json::json!({ "results": results }),
            backends: vec!["heuristic".to_string()],
            repo_state_id: "r1".to_string(),
            completeness: 1.0,
            confidence_score: 0.8,
            total_results: Some(n as u64),
            returned_results: Some(n as u64),
        }
    }

    async fn wait_until_events(outbound: &Arc<RecordingOutbound>, min: usize) -> Vec<Value> {
        for _ in 0..50 {
            let sent = outbound.sent.lock().await;
            if sent.len() >= min {
                return sent.iter().map(|m| m.params.clone().unwrap()).collect();
            }
            drop(sent);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        outbound.sent.lock().await.iter().map(|m| m.params.clone().unwrap()).collect()
    }

    #[tokio::test]
    async fn chunks_in_order_with_one_terminal_event() {
        let outbound = Arc::new(RecordingOutbound::default());
        let controller = Arc::new(StreamController::new(outbound.clone(), 100, Duration::from_secs(15)));
        let started = controller.start_stream(3, CancellationToken::new(), response_with(7));
        assert_eq!(started["streaming"], true);

        let events = wait_until_events(&outbound, 5).await; // meta + 3 chunks + done
        assert_eq!(events[0]["event"], "meta");
        let chunks: Vec<&Value> = events.iter().filter(|e| e["event"] == "chunk").collect();
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c["sequence"], (i as u64) + 1);
        }
        assert_eq!(chunks[0]["hasMore"], true);
        assert_eq!(chunks[2]["hasMore"], false);
        assert_eq!(events.last().unwrap()["event"], "done");
        assert_eq!(events.last().unwrap()["totalItems"], 7);
    }

    #[tokio::test]
    async fn cancellation_emits_error_and_stops() {
        let outbound = Arc::new(RecordingOutbound::default());
        let controller = Arc::new(StreamController::new(outbound.clone(), 100, Duration::from_secs(15)));
        let token = CancellationToken::new();
        token.cancel();
        let _ = controller.start_stream(2, token, response_with(10));

        let events = wait_until_events(&outbound, 2).await; // meta + error
        assert_eq!(events.last().unwrap()["event"], "error");
        assert_eq!(events.last().unwrap()["code"], "CANCELLED");
        assert!(!events.iter().any(|e| e["event"] == "done"));
    }

    #[tokio::test]
    async fn heartbeat_fires_on_idle_gap() {
        let outbound = Arc::new(RecordingOutbound::default());
        let controller = Arc::new(StreamController::new(outbound.clone(), 100, Duration::from_millis(20)));
        // A never-cancelled token but zero items still sends meta then done quickly;
        // use a too-short heartbeat interval and just confirm no panics / at least
        // the terminal event arrives promptly despite a tight heartbeat window.
        let _ = controller.start_stream(1, CancellationToken::new(), response_with(1));
        let events = wait_until_events(&outbound, 2).await;
        assert!(events.iter().any(|e| e["event"] == "done" || e["event"] == "heartbeat"));
    }
}
