// SPDX-License-Identifier: MIT
//! JSON-RPC 2.0 message model.
//!
//! One wire object `{jsonrpc, id?, method?, params?, result?, error?}` covers
//! all three message shapes. Classification follows the field presence rules:
//! `method` + `id` is a request, `method` without `id` is a notification,
//! `id` without `method` is a response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

// ─── Error codes (JSON-RPC 2.0) ──────────────────────────────────────────────

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

// ─── Structured protocol error ───────────────────────────────────────────────

/// A structured error carried inside an error response.
///
/// Non-fatal to the connection — it is surfaced only to the caller whose
/// request produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, detail)
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, detail)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, detail)
    }

    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, detail)
    }
}

// ─── Wire representation ─────────────────────────────────────────────────────

/// The flat JSON object actually framed onto the wire.
///
/// `serde` round-trips field values exactly; key order and whitespace are not
/// part of the contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

// ─── Tagged message ──────────────────────────────────────────────────────────

/// A classified RPC message.
///
/// Invariant: every request sent eventually yields exactly one response or is
/// abandoned because the connection closed; notifications never produce a
/// response.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Response {
        id: Value,
        result: Result<Value, RpcError>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
}

impl Message {
    pub fn request(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Request {
            id: Value::from(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Notification {
            method: method.into(),
            params,
        }
    }

    pub fn response(id: Value, result: Result<Value, RpcError>) -> Self {
        Message::Response { id, result }
    }

    /// Classify a wire object by field presence.
    ///
    /// A message carrying neither `method` nor `id` is unclassifiable and
    /// rejected as an invalid request.
    pub fn from_wire(wire: WireMessage) -> Result<Self, RpcError> {
        if wire.jsonrpc != JSONRPC_VERSION {
            return Err(RpcError::invalid_request(format!(
                "unsupported jsonrpc version: {}",
                wire.jsonrpc
            )));
        }
        match (wire.method, wire.id) {
            (Some(method), Some(id)) => Ok(Message::Request {
                id,
                method,
                params: wire.params,
            }),
            (Some(method), None) => Ok(Message::Notification {
                method,
                params: wire.params,
            }),
            (None, id) => {
                if id.is_none() && wire.result.is_none() && wire.error.is_none() {
                    return Err(RpcError::invalid_request(
                        "message has neither method nor id",
                    ));
                }
                let result = match wire.error {
                    Some(err) => Err(err),
                    // A success response with an absent result field carries null.
                    None => Ok(wire.result.unwrap_or(Value::Null)),
                };
                // An id-less error response (a peer reporting a message it
                // could not attribute) still classifies as a response; with
                // no pending call to match it is dropped downstream instead
                // of answered, which would bounce errors back and forth.
                Ok(Message::Response {
                    id: id.unwrap_or(Value::Null),
                    result,
                })
            }
        }
    }

    pub fn into_wire(self) -> WireMessage {
        let mut wire = WireMessage {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        };
        match self {
            Message::Request { id, method, params } => {
                wire.id = Some(id);
                wire.method = Some(method);
                wire.params = params;
            }
            Message::Notification { method, params } => {
                wire.method = Some(method);
                wire.params = params;
            }
            Message::Response { id, result } => {
                wire.id = Some(id);
                match result {
                    Ok(value) => wire.result = Some(value),
                    Err(err) => wire.error = Some(err),
                }
            }
        }
        wire
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
