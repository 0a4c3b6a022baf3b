// SPDX-License-Identifier: MIT
//! sqld — an SQL language service driven over an in-process JSON-RPC
//! transport.
//!
//! The crate is two halves wired together through [`rpc`]: a server-role
//! handler ([`server`]) answering editor-protocol methods, and a client-role
//! [`session::SessionDriver`] issuing them, connected by the in-memory duplex
//! pipe from [`rpc::pipe`]. No network, no subprocess — the pipe pair stands
//! in for a loopback socket, which also makes every layer testable without
//! process boundaries.

pub mod config;
pub mod protocol;
pub mod rpc;
pub mod server;
pub mod session;

pub use config::SqldConfig;
pub use rpc::{CallError, Connection, Handler, NoopHandler, Router, RpcError};
pub use session::SessionDriver;
