// src/protocol/message.rs
// JSON-RPC 2.0 message model: typed values, classification, constructors

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request/notification/response id. JSON-RPC allows string, integer, or
/// null; `null` is only legal on error responses for requests whose id could
/// not be determined (spec §3 classification still requires an id on any
/// real response).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Number(i64),
    String(String),
    Null,
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageId::Number(n) => write!(f, "{n}"),
            MessageId::String(s) => write!(f, "{s}"),
            MessageId::Null => write!(f, "null"),
        }
    }
}

/// A single JSON-RPC 2.0 message in any of its three shapes (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "jsonrpc", default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn default_jsonrpc() -> String {
    "2.0".to_string()
}

/// The JSON-RPC error object shape (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Standard JSON-RPC error codes (spec §4.2).
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

impl Message {
    /// A request: has `method` and `id`.
    pub fn is_request(&self) -> bool {
        self.method.is_some() && self.id.is_some()
    }

    /// A notification: has `method`, no `id`.
    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    /// A response: has `id` and exactly one of `result` / `error`.
    pub fn is_response(&self) -> bool {
        self.method.is_none()
            && self.id.is_some()
            && (self.result.is_some() ^ self.error.is_some())
    }

    /// Build a successful result response for a given request id.
    pub fn result_response(id: MessageId, result: Value) -> Self {
        Message {
            jsonrpc: default_jsonrpc(),
            id: Some(id),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response for a given request id.
    pub fn error_response(id: MessageId, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Message {
            jsonrpc: default_jsonrpc(),
            id: Some(id),
            method: None,
            params: None,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data,
            }),
        }
    }

    /// Build a notification (method call with no id, expects no reply).
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Message {
            jsonrpc: default_jsonrpc(),
            id: None,
            method: Some(method.into()),
            params,
            result: None,
            error: None,
        }
    }

    /// Build a request (method call expecting a reply), e.g. for
    /// server-initiated calls such as `roots/list`.
    pub fn request(id: MessageId, method: impl Into<String>, params: Option<Value>) -> Self {
        Message {
            jsonrpc: default_jsonrpc(),
            id: Some(id),
            method: Some(method.into()),
            params,
            result: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_request() {
        let m = Message::request(MessageId::Number(1), "tools/list", None);
        assert!(m.is_request());
        assert!(!m.is_notification());
        assert!(!m.is_response());
    }

    #[test]
    fn classifies_notification() {
        let m = Message::notification("notifications/tools/list_changed", None);
        assert!(m.is_notification());
        assert!(!m.is_request());
        assert!(!m.is_response());
    }

    #[test]
    fn classifies_response() {
        let m = Message::result_response(MessageId::Number(1), serde_json::json!({"ok": true}));
        assert!(m.is_response());
        assert!(!m.is_request());
    }

    #[test]
    fn error_response_carries_code_and_data() {
        let m = Message::error_response(
            MessageId::String("x".into()),
            codes::INVALID_PARAMS,
            "missing query",
            Some(serde_json::json!({"field": "query"})),
        );
        let err = m.error.unwrap();
        assert_eq!(err.code, codes::INVALID_PARAMS);
        assert_eq!(err.data.unwrap()["field"], "query");
    }

    #[test]
    fn round_trips_through_json() {
        let m = Message::result_response(MessageId::Number(7), serde_json::json!({"a": 1}));
        let s = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&s).unwrap();
        assert!(back.is_response());
        assert_eq!(back.id, Some(MessageId::Number(7)));
    }
}
