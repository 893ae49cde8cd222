// tests/session_e2e.rs
// Integration tests for the MCP session loop - driving it end-to-end over
// an in-memory duplex stream the way a real client would, rather than
// exercising each module in isolation.

use ckb::config::EnvConfig;
use ckb::dispatcher::Dispatcher;
use ckb::engine::{EngineMultiplexer, NullEngineFactory, RepoRegistry, RepoState, SingleRepoRegistry};
use ckb::handlers::build_registry;
use ckb::metrics::WideResultMetrics;
use ckb::protocol::{FramedReader, FramedWriter, Outbound};
use ckb::registry::{Preset, PresetState};
use ckb::roots::RootsManager;
use ckb::session::Session;
use ckb::stream::StreamController;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

/// A test double for the client side of the protocol: writes one JSON-RPC
/// message per line, reads responses/notifications the same way. Modeled on
/// the teacher's `McpTestClient` (`tests/mcp_integration.rs`), minus the
/// subprocess plumbing since the session runs in-process here.
///
/// Holds the whole duplex endpoint rather than a split read/write pair, so
/// dropping a `TestClient` fully closes its end of the pipe (a split half
/// keeps the underlying stream alive as long as its sibling half exists).
struct TestClient {
    stream: BufReader<DuplexStream>,
    next_id: i64,
}

impl TestClient {
    async fn send_request(&mut self, method: &str, params: Value) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        let msg = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        self.write_line(&msg).await;
        id
    }

    #[allow(dead_code)]
    async fn send_notification(&mut self, method: &str, params: Value) {
        let msg = json!({"jsonrpc": "2.0", "method": method, "params": params});
        self.write_line(&msg).await;
    }

    async fn write_line(&mut self, msg: &Value) {
        let mut line = serde_json::to_string(msg).unwrap();
        line.push('\n');
        self.stream.write_all(line.as_bytes()).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    /// Read the next line off the wire, whatever it is (response or
    /// server-initiated notification/request).
    async fn read_any(&mut self) -> Value {
        let mut line = String::new();
        let n = self.stream.read_line(&mut line).await.unwrap();
        assert!(n > 0, "stream closed before expected message arrived");
        serde_json::from_str(&line).unwrap()
    }

    /// Read lines, skipping server-initiated notifications, until the
    /// response carrying `id` arrives.
    async fn read_response(&mut self, id: i64) -> Value {
        loop {
            let msg = self.read_any().await;
            if msg.get("id").and_then(Value::as_i64) == Some(id) && msg.get("method").is_none() {
                return msg;
            }
        }
    }

    /// Read lines until one matching `method` arrives (a server-initiated
    /// notification such as `notifications/stream`).
    async fn read_notification(&mut self, method: &str, timeout: Duration) -> Value {
        tokio::time::timeout(timeout, async {
            loop {
                let msg = self.read_any().await;
                if msg.get("method").and_then(Value::as_str) == Some(method) {
                    return msg;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for notification '{method}'"))
    }
}

/// A registry with a handful of named repos, used to exercise `switchRepo`
/// and LRU eviction through the wire protocol (grounded in
/// `engine/cache.rs`'s own `CountingRegistry` test fixture).
struct FixedRegistry {
    repos: HashMap<String, PathBuf>,
}

impl RepoRegistry for FixedRegistry {
    fn resolve(&self, name: &str) -> RepoState {
        self.repos
            .get(name)
            .cloned()
            .map(RepoState::Ready)
            .unwrap_or(RepoState::Missing)
    }
    fn touch(&self, _name: &str) {}
    fn list(&self) -> Vec<String> {
        self.repos.keys().cloned().collect()
    }
}

/// Spin up a full `Session` wired the way `cli::run_serve` wires one, over
/// an in-memory duplex pipe, and hand back a client plus a handle to the
/// background task driving `Session::run` (joinable to observe shutdown).
async fn spawn_session(
    registry: Arc<dyn RepoRegistry>,
    max_engines: usize,
    preset: Preset,
    initial_active: Option<&str>,
) -> (TestClient, tokio::task::JoinHandle<()>) {
    let (client_side, server_side) = tokio::io::duplex(1 << 20);
    let (server_read, server_write) = tokio::io::split(server_side);

    let config = Arc::new(EnvConfig {
        preset,
        max_engines,
        ..EnvConfig::default()
    });
    let engine = Arc::new(EngineMultiplexer::new(registry, Arc::new(NullEngineFactory), max_engines));
    if let Some(name) = initial_active {
        engine.switch_repo(name).await.unwrap();
    }
    let preset_state = Arc::new(PresetState::new(preset));
    let metrics = Arc::new(WideResultMetrics::default());
    let outbound: Arc<dyn Outbound> = Arc::new(FramedWriter::new(server_write));
    let stream = Arc::new(StreamController::new(outbound.clone(), 64, Duration::from_secs(30)));
    let dispatcher = Arc::new(Dispatcher::new(build_registry(), metrics.clone(), stream, 20));
    let roots = Arc::new(RootsManager::new(Duration::from_secs(5)));

    let session = Session::new(dispatcher, preset_state, engine, metrics, config.clone(), outbound, roots);
    let reader = FramedReader::new(server_read, config.max_message_size);
    let handle = tokio::spawn(async move { session.run(reader).await });

    (
        TestClient {
            stream: BufReader::new(client_side),
            next_id: 1,
        },
        handle,
    )
}

async fn single_repo_client() -> (TestClient, tokio::task::JoinHandle<()>) {
    spawn_session(
        Arc::new(SingleRepoRegistry::new("self", PathBuf::from("/tmp/self"))),
        4,
        Preset::Core,
        Some("self"),
    )
    .await
}

#[tokio::test]
async fn initialize_and_tools_list_reflect_the_active_preset() {
    let (mut client, _handle) = single_repo_client().await;

    let id = client.send_request("initialize", json!({"capabilities": {}})).await;
    let resp = client.read_response(id).await;
    assert_eq!(resp["result"]["protocolVersion"], "2024-11-05");

    let id = client.send_request("tools/list", json!({})).await;
    let resp = client.read_response(id).await;
    let tools = resp["result"]["tools"].as_array().unwrap();
    assert!(tools.iter().any(|t| t["name"] == "ping"));
    assert!(tools.iter().any(|t| t["name"] == "searchSymbols"));
    // generateDocStub belongs to the docs preset, not core.
    assert!(tools.iter().all(|t| t["name"] != "generateDocStub"));
}

#[tokio::test]
async fn calling_a_tool_with_a_missing_required_field_reports_invalid_params() {
    let (mut client, _handle) = single_repo_client().await;
    client.send_request("initialize", json!({})).await;
    client.read_any().await;

    let id = client
        .send_request(
            "tools/call",
            json!({"name": "searchSymbols", "arguments": {}}),
        )
        .await;
    let resp = client.read_response(id).await;
    assert_eq!(resp["error"]["code"], -32602);
    assert_eq!(resp["error"]["data"]["field"], "query");
}

#[tokio::test]
async fn expand_toolset_is_one_shot_per_session() {
    let (mut client, _handle) = single_repo_client().await;
    client.send_request("initialize", json!({})).await;
    client.read_any().await;

    let id = client
        .send_request(
            "tools/call",
            json!({
                "name": "expandToolset",
                "arguments": {"preset": "full", "reason": "need docs tools for this task"},
            }),
        )
        .await;
    let resp = client.read_response(id).await;
    assert_eq!(resp["result"]["data"]["success"], true);
    assert_eq!(resp["result"]["data"]["preset"], "full");

    let notification = client
        .read_notification("notifications/tools/list_changed", Duration::from_secs(2))
        .await;
    assert_eq!(notification["method"], "notifications/tools/list_changed");

    let id = client
        .send_request(
            "tools/call",
            json!({
                "name": "expandToolset",
                "arguments": {"preset": "full", "reason": "trying again just in case"},
            }),
        )
        .await;
    let resp = client.read_response(id).await;
    assert_eq!(resp["result"]["data"]["success"], false);
    assert_eq!(resp["result"]["data"]["preset"], "full");
}

#[tokio::test]
async fn streaming_a_wide_tool_emits_chunk_and_done_events() {
    let (mut client, _handle) = single_repo_client().await;
    client.send_request("initialize", json!({})).await;
    client.read_any().await;

    let id = client
        .send_request(
            "tools/call",
            json!({
                "name": "findReferences",
                "arguments": {"symbolId": "foo::bar", "stream": true},
            }),
        )
        .await;
    let resp = client.read_response(id).await;
    assert_eq!(resp["result"]["streaming"], true);
    let stream_id = resp["result"]["streamId"].clone();

    let meta = client.read_notification("notifications/stream", Duration::from_secs(2)).await;
    assert_eq!(meta["params"]["event"], "meta");
    assert_eq!(meta["params"]["streamId"], stream_id);

    let done = client.read_notification("notifications/stream", Duration::from_secs(2)).await;
    // The null engine backend returns zero results, so the very next stream
    // event (no chunks emitted) is the terminal `done`.
    assert_eq!(done["params"]["event"], "done");
}

#[tokio::test]
async fn unknown_method_is_reported_as_method_not_found() {
    let (mut client, _handle) = single_repo_client().await;
    let id = client.send_request("totally/unknown", json!({})).await;
    let resp = client.read_response(id).await;
    assert_eq!(resp["error"]["code"], -32601);
}

#[tokio::test]
async fn cancel_targets_a_specific_in_flight_request_by_id() {
    let (mut client, _handle) = single_repo_client().await;
    let id = client.send_request("$/cancel", json!({"id": 999})).await;
    let resp = client.read_response(id).await;
    assert_eq!(resp["result"]["cancelled"], false);
}

#[tokio::test]
async fn switching_repos_through_the_wire_protocol_respects_lru_eviction() {
    let mut repos = HashMap::new();
    repos.insert("a".to_string(), PathBuf::from("/repos/a"));
    repos.insert("b".to_string(), PathBuf::from("/repos/b"));
    repos.insert("c".to_string(), PathBuf::from("/repos/c"));
    let (mut client, _handle) = spawn_session(Arc::new(FixedRegistry { repos }), 2, Preset::Core, None).await;

    for name in ["a", "b", "c"] {
        let id = client
            .send_request("tools/call", json!({"name": "switchRepo", "arguments": {"name": name}}))
            .await;
        let resp = client.read_response(id).await;
        assert_eq!(resp["result"]["data"]["active"], true, "switching to {name}");
    }

    let id = client
        .send_request("tools/call", json!({"name": "listRepos", "arguments": {}}))
        .await;
    let resp = client.read_response(id).await;
    let repos = resp["result"]["data"].as_array().unwrap();
    let a = repos.iter().find(|r| r["name"] == "a").unwrap();
    assert_eq!(a["loaded"], false, "a should have been evicted as the LRU non-active entry");
    let c = repos.iter().find(|r| r["name"] == "c").unwrap();
    assert_eq!(c["loaded"], true);
    assert_eq!(c["active"], true);
}

#[tokio::test]
async fn closing_the_input_stream_ends_the_session_without_a_panic() {
    let (mut client, handle) = single_repo_client().await;
    client.send_request("initialize", json!({})).await;
    client.read_any().await;

    // Dropping the whole client closes its end of the duplex pipe, which the
    // server observes as EOF. `Session::run` only returns after its shutdown
    // sequence (cancel in-flight work, close every cached engine) completes,
    // so a clean join here is proof shutdown ran without panicking.
    drop(client);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("session did not shut down promptly after EOF")
        .expect("session task panicked");
}
