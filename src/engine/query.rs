// src/engine/query.rs
// The query engine collaborator (explicitly out of scope, spec §1): indexing,
// SCIP/git/LSP backends, ranking, ownership, complexity analysis all live
// behind this trait. The core only ever calls `query` and `close`.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// One engine response: the raw tool-specific payload plus the provenance
/// and truncation accounting the envelope builder needs (spec §3, §4.8).
#[derive(Debug, Clone)]
pub struct EngineResponse {
    pub data: Value,
    pub backends: Vec<String>,
    pub repo_state_id: String,
    pub completeness: f64,
    pub confidence_score: f64,
    pub total_results: Option<u64>,
    pub returned_results: Option<u64>,
}

impl EngineResponse {
    pub fn simple(data: Value, repo_state_id: impl Into<String>) -> Self {
        EngineResponse {
            data,
            backends: vec!["heuristic".to_string()],
            repo_state_id: repo_state_id.into(),
            completeness: 1.0,
            confidence_score: 0.9,
            total_results: None,
            returned_results: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Operation(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Per-repository query engine. One instance is cached per active repo path
/// by the engine multiplexer (C6).
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Run one named operation (a tool name) with its validated params.
    async fn query(&self, op: &str, params: &Value) -> Result<EngineResponse, EngineError>;

    /// Release any resources held by this engine. Called on LRU eviction or
    /// shutdown, only after `activeOps` has drained to zero.
    async fn close(&self);
}

/// Creates engines for a repository path. A real deployment would wire this
/// to the indexer/SCIP/git/LSP backends; the core only depends on this
/// narrow factory seam.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(&self, repo_path: &Path) -> Result<std::sync::Arc<dyn QueryEngine>, EngineError>;
}

/// A minimal in-memory engine used when no real backend is wired up (tests,
/// `ckb doctor`, and as a safe default so the server is runnable standalone).
/// Returns plausible but clearly-synthetic payloads.
pub struct NullEngine {
    repo_path: PathBuf,
}

impl NullEngine {
    pub fn new(repo_path: PathBuf) -> Self {
        Self { repo_path }
    }
}

#[async_trait]
impl QueryEngine for NullEngine {
    async fn query(&self, op: &str, params: &Value) -> Result<EngineResponse, EngineError> {
        let repo_state_id = format!("null:{}", self.repo_path.display());
        Ok(EngineResponse {
            data: serde_json::json!({
                "tool": op,
                "params": params,
                "results": Value::Array(vec![]),
                "note": "no query engine backend configured",
            }),
            backends: vec!["null".to_string()],
            repo_state_id,
            completeness: 0.0,
            confidence_score: 0.3,
            total_results: Some(0),
            returned_results: Some(0),
        })
    }

    async fn close(&self) {}
}

pub struct NullEngineFactory;

#[async_trait]
impl EngineFactory for NullEngineFactory {
    async fn create(&self, repo_path: &Path) -> Result<std::sync::Arc<dyn QueryEngine>, EngineError> {
        Ok(std::sync::Arc::new(NullEngine::new(repo_path.to_path_buf())))
    }
}
