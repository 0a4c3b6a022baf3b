// SPDX-License-Identifier: MIT
//! Bidirectional RPC connection over one byte stream.
//!
//! Each connection owns one endpoint of a duplex stream, a pending-call
//! table, and a handler. Outstanding calls multiplex over the stream: every
//! request carries a fresh id, and the read loop resolves the matching
//! pending entry when the response arrives. A single writer task serializes
//! all frames — concurrent callers and the read loop's outgoing responses
//! never interleave bytes on the wire.
//!
//! Dispatch model: the read loop never executes handlers. Responses resolve
//! pending calls directly; requests and notifications flow to a dispatcher
//! task in stream order. The dispatcher awaits notification handlers inline
//! (document-sync events are order-sensitive: an edit must be applied before
//! a later request reads the document) and spawns each request handler as its
//! own task, so a slow request cannot stall response delivery or other
//! in-flight requests.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, warn};

use crate::rpc::codec;
use crate::rpc::message::{Message, RpcError, WireMessage};
use crate::rpc::router::Handler;

// ─── Call errors ──────────────────────────────────────────────────────────────

/// How a call (or notify) can fail, as seen by the issuing task.
///
/// `Closed` and `Timeout` are transport conditions; `Remote` carries the
/// structured error the peer's handler produced and is non-fatal to the
/// connection.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("connection closed")]
    Closed,
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("remote error: {0}")]
    Remote(#[source] RpcError),
    #[error("failed to encode params: {0}")]
    Encode(#[from] serde_json::Error),
}

// ─── Shared connection state ──────────────────────────────────────────────────

struct Shared {
    next_id: AtomicU64,
    /// Pending-call table: id → single-assignment result slot. Entries are
    /// removed when the response arrives, the call times out, or the
    /// connection closes.
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>>,
    outgoing: mpsc::UnboundedSender<WireMessage>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
}

impl Shared {
    /// Idempotent teardown: mark closed, wake both loops, and fail every
    /// pending call by dropping its result slot.
    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(true);
        let drained: Vec<_> = {
            let mut pending = self.pending.lock().expect("pending table poisoned");
            pending.drain().collect()
        };
        if !drained.is_empty() {
            debug!(count = drained.len(), "failing pending calls on close");
        }
        // Dropping the senders resolves each waiter with a closed error.
        drop(drained);
    }
}

// ─── Notifier ─────────────────────────────────────────────────────────────────

/// Cheap handle for sending notifications from inside a handler — the
/// server-initiated direction (e.g. publishing diagnostics) without exposing
/// the whole connection to handler code.
#[derive(Clone)]
pub struct Notifier {
    outgoing: mpsc::UnboundedSender<WireMessage>,
}

impl Notifier {
    pub fn notify(&self, method: &str, params: impl Serialize) -> Result<(), CallError> {
        let params = to_params(params)?;
        self.outgoing
            .send(Message::notification(method, params).into_wire())
            .map_err(|_| CallError::Closed)
    }
}

// ─── Connection ───────────────────────────────────────────────────────────────

/// One peer of an RPC conversation.
///
/// Explicitly constructed and passed by reference — no ambient global state,
/// so any number of independent connections can coexist in one process.
/// Dropping the connection closes it.
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Create a connection over `stream` with a fixed handler.
    pub fn new<S, H>(stream: S, handler: H) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        H: Handler,
    {
        Self::with_handler_factory(stream, move |_| handler)
    }

    /// Create a connection whose handler needs the outbound notifier —
    /// the factory runs before the read loop starts, so no message can
    /// arrive at a half-built handler.
    pub fn with_handler_factory<S, H, F>(stream: S, factory: F) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        H: Handler,
        F: FnOnce(Notifier) -> H,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outgoing: outgoing_tx.clone(),
            shutdown: shutdown_tx,
            closed: AtomicBool::new(false),
        });

        let handler = Arc::new(factory(Notifier {
            outgoing: outgoing_tx,
        }));

        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch_loop(
            Arc::clone(&shared),
            Arc::clone(&handler),
            dispatch_rx,
        ));
        tokio::spawn(write_loop(
            write_half,
            outgoing_rx,
            Arc::clone(&shared),
            shared.shutdown.subscribe(),
        ));
        tokio::spawn(read_loop(
            read_half,
            Arc::clone(&shared),
            dispatch_tx,
            shared.shutdown.subscribe(),
        ));

        Connection { shared }
    }

    /// Issue a request and suspend until its response arrives or the
    /// connection closes. Any number of calls may be outstanding at once;
    /// each gets an independent id and result slot.
    pub async fn call(&self, method: &str, params: impl Serialize) -> Result<Value, CallError> {
        self.call_inner(method, params, None).await
    }

    /// Like [`call`](Self::call), but gives up after `timeout`. The request
    /// already sent is not retracted; a late response is dropped as stale.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: impl Serialize,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        self.call_inner(method, params, Some(timeout)).await
    }

    async fn call_inner(
        &self,
        method: &str,
        params: impl Serialize,
        timeout: Option<Duration>,
    ) -> Result<Value, CallError> {
        if self.is_closed() {
            return Err(CallError::Closed);
        }
        let params = to_params(params)?;

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .expect("pending table poisoned")
            .insert(id, tx);

        let wire = Message::request(id, method, params).into_wire();
        if self.shared.outgoing.send(wire).is_err() {
            self.remove_pending(id);
            return Err(CallError::Closed);
        }

        let result = match timeout {
            None => rx.await.map_err(|_| CallError::Closed)?,
            Some(dur) => match tokio::time::timeout(dur, rx).await {
                Ok(inner) => inner.map_err(|_| CallError::Closed)?,
                Err(_) => {
                    self.remove_pending(id);
                    return Err(CallError::Timeout(dur));
                }
            },
        };
        result.map_err(CallError::Remote)
    }

    /// Send a notification; returns as soon as the frame is queued. No
    /// response is ever awaited or delivered.
    pub fn notify(&self, method: &str, params: impl Serialize) -> Result<(), CallError> {
        if self.is_closed() {
            return Err(CallError::Closed);
        }
        let params = to_params(params)?;
        self.shared
            .outgoing
            .send(Message::notification(method, params).into_wire())
            .map_err(|_| CallError::Closed)
    }

    /// A clonable handle for the outbound notification path.
    pub fn notifier(&self) -> Notifier {
        Notifier {
            outgoing: self.shared.outgoing.clone(),
        }
    }

    /// Close the connection. Idempotent; safe to race with in-flight calls
    /// and the read loop. Every pending call fails with [`CallError::Closed`].
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Resolve once the connection has fully shut down (either side).
    pub async fn wait_closed(&self) {
        let mut rx = self.shared.shutdown.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn remove_pending(&self, id: u64) {
        self.shared
            .pending
            .lock()
            .expect("pending table poisoned")
            .remove(&id);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.close();
    }
}

fn to_params(params: impl Serialize) -> Result<Option<Value>, serde_json::Error> {
    let value = serde_json::to_value(params)?;
    Ok(match value {
        Value::Null => None,
        other => Some(other),
    })
}

// ─── Connection tasks ─────────────────────────────────────────────────────────

/// Drains the outgoing queue onto the write half. Sole writer: frames from
/// concurrent callers and handler responses are serialized here.
async fn write_loop<S>(
    write_half: WriteHalf<S>,
    mut outgoing_rx: mpsc::UnboundedReceiver<WireMessage>,
    shared: Arc<Shared>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let mut writer = write_half;
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            msg = outgoing_rx.recv() => match msg {
                Some(wire) => {
                    if let Err(e) = codec::write_message(&mut writer, &wire).await {
                        error!(err = %e, "write failed — closing connection");
                        shared.close();
                        break;
                    }
                }
                None => break,
            },
        }
    }
    // Propagate end-of-stream to the peer so its read loop unblocks.
    let _ = writer.shutdown().await;
}

/// Inbound handler work, in stream order.
enum Inbound {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
}

/// Decodes one message at a time in strict stream order and routes it.
/// Stops on shutdown, clean end-of-stream, or a framing error (fatal).
async fn read_loop<S>(
    read_half: ReadHalf<S>,
    shared: Arc<Shared>,
    dispatch_tx: mpsc::UnboundedSender<Inbound>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let mut reader = BufReader::new(read_half);
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            frame = codec::read_message(&mut reader) => match frame {
                Ok(Some(wire)) => route_incoming(&shared, &dispatch_tx, wire),
                Ok(None) => {
                    debug!("peer closed the stream");
                    break;
                }
                Err(e) => {
                    error!(err = %e, "framing error — closing connection");
                    break;
                }
            },
        }
    }
    shared.close();
}

fn route_incoming(
    shared: &Arc<Shared>,
    dispatch_tx: &mpsc::UnboundedSender<Inbound>,
    wire: WireMessage,
) {
    match Message::from_wire(wire) {
        Ok(Message::Response { id, result }) => {
            let slot = id.as_u64().and_then(|id| {
                shared
                    .pending
                    .lock()
                    .expect("pending table poisoned")
                    .remove(&id)
            });
            match slot {
                // The caller may have timed out meanwhile; that's its problem.
                Some(tx) => {
                    let _ = tx.send(result);
                }
                None => warn!(id = %id, "response with no pending call — dropped as stale"),
            }
        }
        Ok(Message::Request { id, method, params }) => {
            let _ = dispatch_tx.send(Inbound::Request {
                id,
                method,
                params: params.unwrap_or(Value::Null),
            });
        }
        Ok(Message::Notification { method, params }) => {
            let _ = dispatch_tx.send(Inbound::Notification {
                method,
                params: params.unwrap_or(Value::Null),
            });
        }
        Err(e) => {
            // Well-framed JSON that fits no message shape: answer with an
            // id-less error, keep the connection alive.
            warn!(err = %e, "unclassifiable message");
            let _ = shared
                .outgoing
                .send(Message::response(Value::Null, Err(e)).into_wire());
        }
    }
}

/// Runs handler invocations off the read loop, in arrival order.
///
/// Notifications are awaited inline so that an edit is fully applied before
/// any later message's handler starts. Requests are spawned into their own
/// task each — they begin in order but run concurrently, and their responses
/// go out whenever they finish. Handler panics are caught at this boundary
/// and, for requests, converted into an error response.
async fn dispatch_loop<H: Handler>(
    shared: Arc<Shared>,
    handler: Arc<H>,
    mut rx: mpsc::UnboundedReceiver<Inbound>,
) {
    while let Some(inbound) = rx.recv().await {
        match inbound {
            Inbound::Request { id, method, params } => {
                let shared = Arc::clone(&shared);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let result = AssertUnwindSafe(handler.handle(&method, params))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            warn!(method = %method, "handler panicked — converted to error response");
                            Err(RpcError::internal_error(format!(
                                "handler panicked serving {method}"
                            )))
                        });
                    let _ = shared
                        .outgoing
                        .send(Message::response(id, result).into_wire());
                });
            }
            Inbound::Notification { method, params } => {
                let outcome = AssertUnwindSafe(handler.handle(&method, params))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => debug!(method = %method, err = %e, "notification handler error"),
                    Err(_) => warn!(method = %method, "notification handler panicked"),
                }
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::message::METHOD_NOT_FOUND;
    use crate::rpc::pipe;
    use crate::rpc::router::{NoopHandler, Router};
    use serde_json::json;

    fn echo_router() -> Router {
        let mut router = Router::new();
        router.register("echo", |p: Value| async move { Ok(p) });
        router
    }

    #[tokio::test]
    async fn call_round_trip_over_pipe() {
        let (a, b) = pipe::pair();
        let _server = Connection::new(a, echo_router());
        let client = Connection::new(b, NoopHandler);

        let out = client.call("echo", json!({"n": 1})).await.unwrap();
        assert_eq!(out, json!({"n": 1}));
    }

    #[tokio::test]
    async fn unknown_method_surfaces_remote_error() {
        let (a, b) = pipe::pair();
        let _server = Connection::new(a, echo_router());
        let client = Connection::new(b, NoopHandler);

        let err = client.call("missing", json!({})).await.unwrap_err();
        match err {
            CallError::Remote(e) => assert_eq!(e.code, METHOD_NOT_FOUND),
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_after_close_fails_immediately() {
        let (a, b) = pipe::pair();
        let _server = Connection::new(a, echo_router());
        let client = Connection::new(b, NoopHandler);

        client.close();
        let err = client.call("echo", json!(1)).await.unwrap_err();
        assert!(matches!(err, CallError::Closed));
    }

    #[tokio::test]
    async fn timeout_is_distinct_from_close() {
        let mut router = Router::new();
        router.register("stall", |_p: Value| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Value::Null)
        });

        let (a, b) = pipe::pair();
        let _server = Connection::new(a, router);
        let client = Connection::new(b, NoopHandler);

        let err = client
            .call_with_timeout("stall", json!({}), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Timeout(_)));
        assert!(!client.is_closed(), "timeout must not close the connection");
    }
}
