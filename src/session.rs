// src/session.rs
// Server lifecycle (C11, spec §4.11): initialize handshake, the read-dispatch-
// write loop, and graceful shutdown on EOF.

use crate::config::EnvConfig;
use crate::dispatcher::{DispatchOutcome, Dispatcher, HandlerContext};
use crate::engine::EngineMultiplexer;
use crate::error::CkbError;
use crate::metrics::WideResultMetrics;
use crate::protocol::{codes, FramedReader, Message, MessageId, Outbound, ReadOutcome};
use crate::registry::{paginate_tools, PresetState, ToolRegistry};
use crate::roots::RootsManager;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// MCP protocol version this server speaks (spec §4.11, §6.1).
const PROTOCOL_VERSION: &str = "2024-11-05";

/// One client connection's worth of state: the session token every handler
/// and stream producer derives its cancellation from, the in-flight request
/// map `$/cancel` looks up by id, and the subsystems wired together at
/// startup (spec §4.11, §5).
pub struct Session {
    dispatcher: Arc<Dispatcher>,
    registry: ToolRegistry,
    preset_state: Arc<PresetState>,
    engine: Arc<EngineMultiplexer>,
    metrics: Arc<WideResultMetrics>,
    config: Arc<EnvConfig>,
    outbound: Arc<dyn Outbound>,
    roots: Arc<RootsManager>,
    session_id: Uuid,
    session_token: CancellationToken,
    inflight: StdMutex<HashMap<MessageId, CancellationToken>>,
    client_supports_roots: AtomicBool,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        preset_state: Arc<PresetState>,
        engine: Arc<EngineMultiplexer>,
        metrics: Arc<WideResultMetrics>,
        config: Arc<EnvConfig>,
        outbound: Arc<dyn Outbound>,
        roots: Arc<RootsManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            registry: ToolRegistry,
            preset_state,
            engine,
            metrics,
            config,
            outbound,
            roots,
            session_id: Uuid::new_v4(),
            session_token: CancellationToken::new(),
            inflight: StdMutex::new(HashMap::new()),
            client_supports_roots: AtomicBool::new(false),
        })
    }

    /// Drive the session to completion: read until EOF, dispatching every
    /// message as it arrives, then shut down (spec §4.11).
    pub async fn run<R: AsyncRead + Unpin>(self: &Arc<Self>, mut reader: FramedReader<R>) {
        loop {
            let outcome = match reader.read_message().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "transport read error, ending session");
                    break;
                }
            };

            match outcome {
                ReadOutcome::Eof => {
                    debug!("input closed (EOF)");
                    break;
                }
                ReadOutcome::Parse { line, error } => {
                    warn!(%error, line_len = line.len(), "dropping unparseable line");
                    let resp = Message::error_response(
                        MessageId::Null,
                        codes::PARSE_ERROR,
                        error,
                        None,
                    );
                    if let Err(e) = self.outbound.send(&resp).await {
                        warn!(error = %e, "failed to write parse-error response");
                        break;
                    }
                }
                ReadOutcome::Message(message) => {
                    self.route(message).await;
                }
            }
        }

        self.shutdown().await;
    }

    async fn route(self: &Arc<Self>, message: Message) {
        if message.is_request() {
            let session = self.clone();
            tokio::spawn(async move { session.handle_request(message).await });
        } else if message.is_notification() {
            let session = self.clone();
            tokio::spawn(async move { session.handle_notification(message).await });
        } else if message.is_response() {
            if let Some(id) = message.id.clone() {
                self.roots.resolve(&id, message);
            }
        } else {
            debug!("dropping malformed message (neither request, notification, nor response)");
        }
    }

    async fn handle_request(self: Arc<Self>, message: Message) {
        let id = message.id.clone().unwrap_or(MessageId::Null);
        let method = message.method.clone().unwrap_or_default();
        let params = message.params.clone().unwrap_or(Value::Null);

        let token = self.session_token.child_token();
        self.inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), token.clone());

        let result = match method.as_str() {
            "initialize" => Ok(self.handle_initialize(&params)),
            "tools/list" => self.handle_tools_list(&params),
            "tools/call" => self.handle_tools_call(&params, token).await,
            "$/cancel" => Ok(self.handle_cancel(&params)),
            other => Err(CkbError::MethodNotFound(other.to_string())),
        };

        self.inflight.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);

        let response = match result {
            Ok(value) => Message::result_response(id, value),
            Err(e) => Message::error_response(id, e.rpc_code(), e.to_string(), e.rpc_data()),
        };
        if let Err(e) = self.outbound.send(&response).await {
            warn!(error = %e, "failed to write response");
        }
    }

    fn handle_initialize(&self, params: &Value) -> Value {
        let supports_roots = params
            .get("capabilities")
            .and_then(|c| c.get("roots"))
            .and_then(|r| r.get("listChanged"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.client_supports_roots.store(supports_roots, Ordering::SeqCst);

        info!(session_id = %self.session_id, supports_roots, "session initialized");

        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": true },
                "resources": { "subscribe": false, "listChanged": false },
            },
            "serverInfo": {
                "name": "ckb",
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    fn handle_tools_list(&self, params: &Value) -> Result<Value, CkbError> {
        let active = self.preset_state.active();
        let tools = self.registry.get_filtered_tools(active);
        let hash = self.registry.toolset_hash(&tools);

        let offset = params.get("cursor").and_then(Value::as_u64).unwrap_or(0) as usize;
        let page_size = params.get("pageSize").and_then(Value::as_i64).unwrap_or(-1);
        let supplied_hash = params.get("toolsetHash").and_then(Value::as_str);

        let page = paginate_tools(&tools, offset, page_size, &hash, supplied_hash)?;
        Ok(serde_json::to_value(page)?)
    }

    async fn handle_tools_call(&self, params: &Value, token: CancellationToken) -> Result<Value, CkbError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| CkbError::InvalidParams("name".to_string()))?
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let ctx = HandlerContext {
            engine: self.engine.clone(),
            preset_state: self.preset_state.clone(),
            metrics: self.metrics.clone(),
            config: self.config.clone(),
            outbound: self.outbound.clone(),
            cancellation: token,
            session_id: self.session_id,
        };

        match self.dispatcher.dispatch(ctx, &name, arguments).await? {
            DispatchOutcome::Complete(envelope) => Ok(serde_json::to_value(envelope)?),
            DispatchOutcome::Streaming(value) => Ok(value),
        }
    }

    fn handle_cancel(&self, params: &Value) -> Value {
        let target = params.get("id").cloned().and_then(|v| match v {
            Value::Number(n) => n.as_i64().map(MessageId::Number),
            Value::String(s) => Some(MessageId::String(s)),
            _ => None,
        });

        let cancelled = target
            .and_then(|id| self.inflight.lock().unwrap_or_else(|e| e.into_inner()).get(&id).cloned())
            .map(|token| token.cancel())
            .is_some();

        json!({ "cancelled": cancelled })
    }

    async fn handle_notification(self: Arc<Self>, message: Message) {
        let method = message.method.clone().unwrap_or_default();
        match method.as_str() {
            "notifications/roots/list_changed" => self.refresh_roots().await,
            other => debug!(method = other, "ignoring unhandled notification"),
        }
    }

    /// Issue a server→client `roots/list` request and wait up to the
    /// configured timeout for the reply (spec §4.5, §4.11).
    async fn refresh_roots(&self) {
        let (id, rx) = self.roots.register();
        let request = Message::request(MessageId::Number(id), "roots/list", None);
        if let Err(e) = self.outbound.send(&request).await {
            warn!(error = %e, "failed to send roots/list request");
            return;
        }
        match self.roots.wait(id, rx).await {
            Some(reply) => {
                let roots: Vec<crate::roots::Root> = reply
                    .result
                    .and_then(|r| r.get("roots").cloned())
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                let valid = crate::roots::parse_roots_response(roots);
                info!(count = valid.len(), "refreshed client roots");
            }
            None => warn!("roots/list request timed out or was cancelled"),
        }
    }

    /// EOF shutdown: cancel every in-flight handler context, cancel pending
    /// server→client requests, then drain and close every cached engine
    /// (spec §4.11, §9 design notes).
    async fn shutdown(&self) {
        info!(session_id = %self.session_id, "session shutting down");
        self.session_token.cancel();
        self.roots.cancel_all();
        self.engine.close_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineMultiplexer, NullEngineFactory, SingleRepoRegistry};
    use crate::handlers::build_registry;
    use crate::metrics::WideResultMetrics;
    use crate::protocol::FramedWriter;
    use crate::registry::Preset;
    use crate::stream::StreamController;
    use std::path::PathBuf;
    use std::time::Duration;

    fn test_session() -> (Arc<Session>, Arc<dyn Outbound>) {
        let engine = Arc::new(EngineMultiplexer::new(
            Arc::new(SingleRepoRegistry::new("self", PathBuf::from("/tmp"))),
            Arc::new(NullEngineFactory),
            4,
        ));
        let metrics = Arc::new(WideResultMetrics::default());
        let outbound: Arc<dyn Outbound> = Arc::new(FramedWriter::new(tokio::io::sink()));
        let stream = Arc::new(StreamController::new(outbound.clone(), 100, Duration::from_secs(15)));
        let dispatcher = Arc::new(Dispatcher::new(build_registry(), metrics.clone(), stream, 20));
        let preset_state = Arc::new(PresetState::new(Preset::Core));
        let roots = Arc::new(RootsManager::new(Duration::from_secs(10)));

        let session = Session::new(
            dispatcher,
            preset_state,
            engine,
            metrics,
            Arc::new(EnvConfig::default()),
            outbound.clone(),
            roots,
        );
        (session, outbound)
    }

    #[test]
    fn initialize_reports_protocol_version() {
        let (session, _out) = test_session();
        let result = session.handle_initialize(&json!({}));
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "ckb");
    }

    #[test]
    fn tools_list_defaults_to_active_preset() {
        let (session, _out) = test_session();
        let value = session.handle_tools_list(&json!({})).unwrap();
        let tools = value["tools"].as_array().unwrap();
        assert!(tools.iter().all(|t| t["name"] != "generateDocStub"));
        assert!(tools.iter().any(|t| t["name"] == "ping"));
    }

    #[tokio::test]
    async fn tools_call_ping_round_trips() {
        let (session, _out) = test_session();
        let result = session
            .handle_tools_call(&json!({"name": "ping", "arguments": {}}), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result["data"]["pong"], true);
    }

    #[tokio::test]
    async fn tools_call_missing_name_is_invalid_params() {
        let (session, _out) = test_session();
        let err = session
            .handle_tools_call(&json!({}), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CkbError::InvalidParams(_)));
    }

    #[test]
    fn cancel_with_unknown_id_reports_not_cancelled() {
        let (session, _out) = test_session();
        let result = session.handle_cancel(&json!({"id": 999}));
        assert_eq!(result["cancelled"], false);
    }

    #[tokio::test]
    async fn shutdown_cancels_session_token_and_closes_engines() {
        let (session, _out) = test_session();
        session.engine.switch_repo("self").await.unwrap();
        session.shutdown().await;
        assert!(session.session_token.is_cancelled());
        assert_eq!(session.engine.cached_count().await, 0);
    }
}
