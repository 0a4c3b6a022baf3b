// SPDX-License-Identifier: MIT
//! Handler capability and method registry.
//!
//! A `Handler` turns (method, params) into a result or a structured error.
//! `Router` is the registry implementation: method names map to typed handler
//! closures, and an unregistered method is an explicit `method not found`
//! error rather than fallback behavior. Handler faults are classified into
//! RPC error codes at this boundary — they never reach the transport as
//! anything but an error response.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::rpc::message::RpcError;

/// A request/notification handling capability.
///
/// `params` is `Value::Null` when the message carried no params field.
/// Implementations may run work asynchronously; the connection dispatches
/// each invocation off the read loop.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

/// Handler for pure-client roles: every request is `method not found`,
/// notifications are discarded by the same path (no response is generated
/// for them regardless).
pub struct NoopHandler;

#[async_trait]
impl Handler for NoopHandler {
    async fn handle(&self, method: &str, _params: Value) -> Result<Value, RpcError> {
        Err(RpcError::method_not_found(method))
    }
}

type MethodHandler = Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;

/// Method-name → typed handler table.
#[derive(Default)]
pub struct Router {
    methods: HashMap<&'static str, MethodHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler for `method`.
    ///
    /// Params are deserialized into `P`; a shape mismatch becomes an
    /// `invalid params` error without invoking the handler. The handler's
    /// `anyhow` error is classified into an RPC error code.
    pub fn register<P, F, Fut>(&mut self, method: &'static str, handler: F)
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let erased = move |params: Value| -> BoxFuture<'static, Result<Value, RpcError>> {
            let parsed: Result<P, _> = serde_json::from_value(params);
            match parsed {
                Ok(p) => {
                    let fut = handler(p);
                    Box::pin(async move { fut.await.map_err(|e| classify_error(&e)) })
                }
                Err(e) => {
                    let err = RpcError::invalid_params(format!("invalid params: {e}"));
                    Box::pin(async move { Err(err) })
                }
            }
        };
        self.methods.insert(method, Box::new(erased));
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }
}

#[async_trait]
impl Handler for Router {
    async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match self.methods.get(method) {
            Some(handler) => {
                debug!(method, "dispatch");
                handler(params).await
            }
            None => Err(RpcError::method_not_found(method)),
        }
    }
}

/// Map a handler fault to an RPC error code.
///
/// An explicit `RpcError` passes through unchanged; serde shape errors become
/// `invalid params`; everything else is an internal error.
fn classify_error(e: &anyhow::Error) -> RpcError {
    if let Some(rpc) = e.downcast_ref::<RpcError>() {
        return rpc.clone();
    }
    let msg = e.to_string();
    if msg.contains("missing field") || msg.contains("invalid type") {
        return RpcError::invalid_params(format!("invalid params: {msg}"));
    }
    RpcError::internal_error(msg)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
