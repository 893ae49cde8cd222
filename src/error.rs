// src/error.rs
// Standardized error type for the CKB server

use thiserror::Error;

/// Main error type for the CKB library.
#[derive(Error, Debug)]
pub enum CkbError {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("resource not found: {resource} {id}")]
    NotFound { resource: String, id: String },

    #[error("operation failed: {0}")]
    Operation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience alias for `Result<T, CkbError>`.
pub type Result<T> = std::result::Result<T, CkbError>;

impl CkbError {
    /// JSON-RPC error code this error maps to at the wire boundary.
    pub fn rpc_code(&self) -> i64 {
        match self {
            CkbError::Parse(_) => crate::protocol::codes::PARSE_ERROR,
            CkbError::InvalidRequest(_) => crate::protocol::codes::INVALID_REQUEST,
            CkbError::MethodNotFound(_) => crate::protocol::codes::METHOD_NOT_FOUND,
            CkbError::InvalidParams(_) | CkbError::NotFound { .. } => {
                crate::protocol::codes::INVALID_PARAMS
            }
            CkbError::Config(_)
            | CkbError::Operation(_)
            | CkbError::Cancelled
            | CkbError::Io(_)
            | CkbError::Json(_)
            | CkbError::Anyhow(_) => crate::protocol::codes::INTERNAL_ERROR,
        }
    }

    /// Structured `data` payload attached to the wire-level error, if any.
    pub fn rpc_data(&self) -> Option<serde_json::Value> {
        match self {
            CkbError::NotFound { resource, id } => Some(serde_json::json!({
                "resource": resource,
                "id": id,
            })),
            CkbError::InvalidParams(field) => Some(serde_json::json!({ "field": field })),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for CkbError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            CkbError::Cancelled
        } else {
            CkbError::Operation(err.to_string())
        }
    }
}

impl From<CkbError> for String {
    fn from(err: CkbError) -> Self {
        err.to_string()
    }
}
