// SPDX-License-Identifier: MIT
//! In-process JSON-RPC transport.
//!
//! Layers, bottom up: [`pipe`] is the in-memory duplex byte channel,
//! [`codec`] frames single messages onto a stream, [`message`] is the wire
//! model, [`router`] maps method names to typed handlers, and [`connection`]
//! multiplexes concurrent calls and inbound dispatch over one endpoint.

pub mod codec;
pub mod connection;
pub mod message;
pub mod pipe;
pub mod router;

pub use connection::{CallError, Connection, Notifier};
pub use message::{Message, RpcError, WireMessage};
pub use router::{Handler, NoopHandler, Router};
