// src/dispatcher.rs
// Tool dispatcher (C7, spec §4.7): tool-name -> handler lookup, preset
// exposure check, invocation, wide-result metrics recording.

use crate::config::EnvConfig;
use crate::engine::EngineMultiplexer;
use crate::envelope::Envelope;
use crate::error::CkbError;
use crate::metrics::{WideResultMetrics, WideResultSample};
use crate::protocol::Outbound;
use crate::registry::{PresetState, Tool, ToolRegistry};
use crate::stream::StreamController;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-call context threaded into every handler invocation (spec §4.8:
/// "handlers honor a context provided by the dispatcher"; §5: cancellation
/// tokens cloned into every tool invocation context).
pub struct HandlerContext {
    pub engine: Arc<EngineMultiplexer>,
    pub preset_state: Arc<PresetState>,
    pub metrics: Arc<WideResultMetrics>,
    pub config: Arc<EnvConfig>,
    pub outbound: Arc<dyn Outbound>,
    pub cancellation: CancellationToken,
    pub session_id: uuid::Uuid,
}

/// Uniform handler shape: `(params) -> (envelope, error)` (spec §9 design
/// note), expressed as a trait so the dispatcher can hold a table of
/// `Arc<dyn ToolHandler>` values keyed by tool name.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext, arguments: Value) -> Result<Envelope, CkbError>;
}

pub type HandlerRegistry = HashMap<&'static str, Arc<dyn ToolHandler>>;

/// What the dispatcher hands back to the session loop: either the call's
/// complete result, or the small "stream started" acknowledgement with the
/// actual chunks following asynchronously as notifications.
pub enum DispatchOutcome {
    Complete(Envelope),
    Streaming(Value),
}

pub struct Dispatcher {
    registry: ToolRegistry,
    handlers: HandlerRegistry,
    metrics: Arc<WideResultMetrics>,
    stream: Arc<StreamController>,
    default_stream_chunk_size: usize,
}

impl Dispatcher {
    pub fn new(
        handlers: HandlerRegistry,
        metrics: Arc<WideResultMetrics>,
        stream: Arc<StreamController>,
        default_stream_chunk_size: usize,
    ) -> Self {
        Self {
            registry: ToolRegistry,
            handlers,
            metrics,
            stream,
            default_stream_chunk_size: default_stream_chunk_size.max(1),
        }
    }

    pub fn registry(&self) -> ToolRegistry {
        self.registry
    }

    /// Dispatch one `tools/call`. `ctx.preset_state` determines exposure;
    /// the active preset must include the named tool or the call fails with
    /// `InvalidRequest` (spec §4.7: "tool not exposed in active preset").
    pub async fn dispatch(&self, ctx: HandlerContext, tool_name: &str, arguments: Value) -> Result<DispatchOutcome, CkbError> {
        let tool = self
            .registry
            .find(tool_name)
            .ok_or_else(|| CkbError::MethodNotFound(format!("unknown tool '{tool_name}'")))?;

        let active = ctx.preset_state.active();
        if !tool.presets.contains(&active) {
            return Err(CkbError::InvalidRequest(format!(
                "tool '{tool_name}' is not exposed in active preset '{active}'"
            )));
        }

        let wants_stream = tool.streamable
            && arguments.get("stream").and_then(Value::as_bool).unwrap_or(false);

        let handler = self
            .handlers
            .get(tool_name)
            .ok_or_else(|| CkbError::Operation(format!("no handler registered for tool '{tool_name}'")))?
            .clone();

        if wants_stream {
            return self.dispatch_streaming(tool, ctx, arguments, handler).await;
        }

        let started = Instant::now();
        // Run the handler on its own task so a panic unwinds there, not into
        // the session loop; JoinError converts to CkbError::Operation/Cancelled.
        let envelope = tokio::spawn(async move { handler.handle(&ctx, arguments).await })
            .await??;
        if tool.wide {
            self.record_wide(tool.name, &envelope, started.elapsed());
        }
        Ok(DispatchOutcome::Complete(envelope))
    }

    /// Streaming tools bypass their registered `ToolHandler` (which builds a
    /// complete envelope) and instead fetch the raw engine response directly,
    /// since the stream controller needs the unwrapped `EngineResponse` to
    /// chunk into `chunk` events.
    async fn dispatch_streaming(
        &self,
        tool: &'static Tool,
        ctx: HandlerContext,
        arguments: Value,
        _handler: Arc<dyn ToolHandler>,
    ) -> Result<DispatchOutcome, CkbError> {
        let chunk_size = arguments
            .get("chunkSize")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(self.default_stream_chunk_size);

        let response = ctx
            .engine
            .with_engine(|engine| {
                let tool_name = tool.name;
                let arguments = arguments.clone();
                async move {
                    engine
                        .query(tool_name, &arguments)
                        .await
                        .map_err(|e| CkbError::Operation(e.to_string()))
                }
            })
            .await?;

        let value = self.stream.start_stream(chunk_size, ctx.cancellation.clone(), response);
        Ok(DispatchOutcome::Streaming(value))
    }

    fn record_wide(&self, name: &str, envelope: &Envelope, elapsed: std::time::Duration) {
        let bytes = serde_json::to_vec(envelope).map(|v| v.len() as u64).unwrap_or(0);
        let (total, returned, truncated) = envelope
            .meta
            .as_ref()
            .and_then(|m| m.truncation.as_ref())
            .map(|t| (t.total, t.shown, t.is_truncated))
            .unwrap_or((0, 0, false));

        self.metrics.record(WideResultSample {
            tool: name.to_string(),
            total_results: total,
            returned_results: returned,
            truncated,
            tokens: bytes / 4,
            bytes,
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }
}
