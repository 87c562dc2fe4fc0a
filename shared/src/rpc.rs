//! JSON-RPC 2.0 envelopes and document accessors.

use crate::codec;
use crate::RequestId;
use serde_json::{json, Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error classes used by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Method,
    Params,
    Parse,
    Request,
}

impl ErrorCode {
    pub fn code(self) -> i64 {
        match self {
            ErrorCode::Method => -32601,
            ErrorCode::Params => -32602,
            ErrorCode::Parse => -32700,
            ErrorCode::Request => -32600,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Method => "Method not found",
            ErrorCode::Params => "Invalid params",
            ErrorCode::Parse => "Parse error",
            ErrorCode::Request => "Invalid Request",
        }
    }
}

fn id_value(id: Option<RequestId>) -> Value {
    id.map_or(Value::Null, Value::from)
}

/// Error response. `data` carries the free-text elaboration, if any.
pub fn error(code: ErrorCode, data: Option<&str>, id: Option<RequestId>) -> Value {
    let mut body = Map::new();
    body.insert("code".to_string(), Value::from(code.code()));
    body.insert("message".to_string(), Value::from(code.message()));
    if let Some(data) = data {
        body.insert("data".to_string(), Value::from(data));
    }
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "error": body,
        "id": id_value(id),
    })
}

/// Result response.
pub fn result(result: Value, id: Option<RequestId>) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "result": result,
        "id": id_value(id),
    })
}

/// The plain success result.
pub fn success() -> Value {
    json!({ "success": true })
}

/// Request carrying positional parameters.
pub fn request(method: &str, params: Vec<Value>, id: RequestId) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": method,
        "params": params,
        "id": id,
    })
}

/// Method name of a document, if it has a string `method` member.
pub fn method_of(document: &Value) -> Option<&str> {
    document.get("method").and_then(Value::as_str)
}

/// Whether the document has an `id` member at all.
pub fn has_id(document: &Value) -> bool {
    document.get("id").is_some()
}

/// The request id, if present and representable as [`RequestId`].
pub fn id_of(document: &Value) -> Option<RequestId> {
    document
        .get("id")
        .and_then(Value::as_u64)
        .and_then(|id| RequestId::try_from(id).ok())
}

pub fn params_of(document: &Value) -> Option<&Value> {
    document.get("params")
}

/// Server-originated notification with a flat key/value parameter object.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    method: String,
    params: Map<String, Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: Map::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Adds every member of a flat object. Non-object values are ignored.
    pub fn params_from(mut self, values: Value) -> Self {
        if let Value::Object(members) = values {
            self.params.extend(members);
        }
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn to_value(&self) -> Value {
        json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": self.method,
            "params": self.params,
        })
    }

    pub fn to_text(&self) -> String {
        codec::to_text(&self.to_value())
    }
}
