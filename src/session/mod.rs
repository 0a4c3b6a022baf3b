// SPDX-License-Identifier: MIT
//! Editor session driver.
//!
//! Drives a client-role connection through the protocol lifecycle the way an
//! editor integration would: initialize, open a document, query completions,
//! edit the document (as an incremental change event), query again. The
//! driver owns the document bookkeeping — uri, version, full text — and is
//! the only place that mutates it.

pub mod diff;

use serde_json::Value;
use tracing::{info, warn};

use crate::protocol::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    InitializeParams, Position, TextDocumentIdentifier, TextDocumentItem,
    TextDocumentPositionParams, VersionedTextDocumentIdentifier,
};
use crate::rpc::{CallError, Connection};

/// A client-role session over one connection.
pub struct SessionDriver {
    conn: Connection,
    uri: String,
    language_id: String,
    version: i32,
    text: String,
}

impl SessionDriver {
    pub fn new(conn: Connection, uri: impl Into<String>) -> Self {
        Self {
            conn,
            uri: uri.into(),
            language_id: "sql".to_string(),
            version: 0,
            text: String::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// The cursor position at the very end of the current text.
    pub fn end_position(&self) -> Position {
        crate::protocol::position_at(&self.text, self.text.len())
    }

    /// `initialize` handshake: process identity, root location, trace level.
    pub async fn initialize(&self, root_uri: &str) -> Result<Value, CallError> {
        self.conn
            .call(
                "initialize",
                InitializeParams {
                    process_id: Some(std::process::id()),
                    root_uri: Some(root_uri.to_string()),
                    trace: Some("off".to_string()),
                },
            )
            .await
    }

    /// Open the document at version 1 with its full text.
    pub fn open(&mut self, text: impl Into<String>) -> Result<(), CallError> {
        let text = text.into();
        self.conn.notify(
            "textDocument/didOpen",
            DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri: self.uri.clone(),
                    language_id: self.language_id.clone(),
                    version: 1,
                    text: text.clone(),
                },
            },
        )?;
        // Bookkeeping only moves once the notification is on its way — a
        // failed step must not desync the driver from the handler.
        self.version = 1;
        self.text = text;
        Ok(())
    }

    /// Replace the document text, sending the minimal change event and a
    /// bumped version.
    pub fn edit(&mut self, new_text: impl Into<String>) -> Result<(), CallError> {
        let new_text = new_text.into();
        let change = diff::content_change(&self.text, &new_text);
        self.conn.notify(
            "textDocument/didChange",
            DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier {
                    uri: self.uri.clone(),
                    version: self.version + 1,
                },
                content_changes: vec![change],
            },
        )?;
        self.version += 1;
        self.text = new_text;
        Ok(())
    }

    /// Request completions at `position`.
    pub async fn completion(&self, position: Position) -> Result<Value, CallError> {
        self.conn
            .call(
                "textDocument/completion",
                TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier {
                        uri: self.uri.clone(),
                    },
                    position,
                },
            )
            .await
    }

    /// Request hover info at `position`.
    pub async fn hover(&self, position: Position) -> Result<Value, CallError> {
        self.conn
            .call(
                "textDocument/hover",
                TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier {
                        uri: self.uri.clone(),
                    },
                    position,
                },
            )
            .await
    }

    pub fn close_document(&self) -> Result<(), CallError> {
        self.conn.notify(
            "textDocument/didClose",
            DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier {
                    uri: self.uri.clone(),
                },
            },
        )
    }

    /// Tear the session down.
    pub async fn shutdown(&self) {
        if let Err(e) = self.conn.call("shutdown", Value::Null).await {
            warn!(err = %e, "shutdown call failed");
        }
        self.conn.close();
    }

    /// The scripted demonstration sequence: open `first`, complete at the
    /// cursor, edit to `second`, complete again.
    ///
    /// Best-effort: each step's error is surfaced in the log but does not
    /// abort the remaining steps, and a failed step never corrupts request
    /// ids or version bookkeeping.
    pub async fn run_script(&mut self, root_uri: &str, first: &str, second: &str) {
        match self.initialize(root_uri).await {
            Ok(result) => info!(result = %result, "initialize"),
            Err(e) => warn!(err = %e, "initialize failed"),
        }

        if let Err(e) = self.open(first) {
            warn!(err = %e, "didOpen failed");
        }

        match self.completion(self.end_position()).await {
            Ok(result) => info!(version = self.version, result = %result, "completion"),
            Err(e) => warn!(err = %e, "completion failed"),
        }

        if let Err(e) = self.edit(second) {
            warn!(err = %e, "didChange failed");
        }

        match self.completion(self.end_position()).await {
            Ok(result) => info!(version = self.version, result = %result, "completion"),
            Err(e) => warn!(err = %e, "completion failed"),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
