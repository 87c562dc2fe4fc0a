//! Error types of the server.
//!
//! [`RpcError`] covers everything a client can get wrong. Each variant maps to
//! one JSON-RPC error code and an explanation for the `data` member, and is
//! always answered on the wire instead of being propagated further.
//! [`ServerError`] covers startup and runtime failures of the process itself.

use shared::{Channel, CodecError, ErrorCode, Tier};
use thiserror::Error;

/// Which of the two required request members is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingField {
    Method,
    Id,
    Both,
}

impl MissingField {
    pub fn explanation(self) -> &'static str {
        match self {
            MissingField::Method => "Missing field <method>",
            MissingField::Id => "Missing field <id>",
            MissingField::Both => "Missing field <method>/<id>",
        }
    }
}

/// JSON type names used in parameter mismatch explanations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Number,
    Unsigned,
}

impl ParamKind {
    pub fn name(self) -> &'static str {
        match self {
            ParamKind::Number => "number",
            ParamKind::Unsigned => "unsigned integer",
        }
    }

    pub fn matches(self, value: &serde_json::Value) -> bool {
        match self {
            ParamKind::Number => value.is_number(),
            ParamKind::Unsigned => value.is_u64(),
        }
    }
}

/// Name of the JSON type of a received value.
pub fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    #[error("{0}")]
    Parse(#[from] CodecError),

    #[error("{}", .0.explanation())]
    RequestShape(MissingField),

    #[error("Unknown method {method}")]
    MethodNotFound { method: String },

    #[error("Unknown or missing frequency tier in {method}")]
    UnknownTier { method: String },

    #[error("Wrong number of parameters: expected {expected}, received {received}")]
    InvalidParamCount { expected: String, received: usize },

    #[error("Wrong parameter type at position {position}: expected {expected}, received {received}")]
    InvalidParamType {
        position: usize,
        expected: &'static str,
        received: &'static str,
    },

    #[error("Invalid parameter value: {0}")]
    InvalidParamValue(String),

    #[error("Tier {tier} not available for {channel}, valid tiers are [{}]", .channel.allowed_tier_list())]
    InvalidSubscriptionTier { channel: Channel, tier: Tier },
}

impl RpcError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RpcError::Parse(_) => ErrorCode::Parse,
            RpcError::RequestShape(_) => ErrorCode::Request,
            RpcError::MethodNotFound { .. }
            | RpcError::UnknownTier { .. }
            | RpcError::InvalidSubscriptionTier { .. } => ErrorCode::Method,
            RpcError::InvalidParamCount { .. }
            | RpcError::InvalidParamType { .. }
            | RpcError::InvalidParamValue(_) => ErrorCode::Params,
        }
    }

    /// Free-text explanation carried in the error object's `data` member.
    pub fn data(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start {what}: {source}")]
    Spawn {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("the {0} thread panicked")]
    ThreadPanicked(&'static str),
}
