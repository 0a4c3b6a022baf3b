// SPDX-License-Identifier: MIT
//! SQL request handler.
//!
//! The server side of a session: a method router over an open-document store,
//! SQL completion/hover lookups, and push diagnostics. All state hangs off
//! the router's closures — construct as many independent servers in one
//! process as you need.

pub mod completion;
pub mod diagnostics;
pub mod documents;

use std::sync::Arc;

use anyhow::anyhow;
use serde_json::Value;
use tracing::{debug, info};

use crate::protocol::{
    CompletionList, CompletionOptions, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, Hover, InitializeParams, InitializeResult,
    PublishDiagnosticsParams, ServerCapabilities, ServerInfo, TextDocumentPositionParams,
    SYNC_INCREMENTAL,
};
use crate::rpc::{Notifier, Router};

use documents::{Document, DocumentStore};

/// Build the SQL server's method table.
///
/// `tables` seeds name completion (normally the configured connections'
/// tables); `notifier` carries server-initiated diagnostics back to the peer.
pub fn router(tables: Vec<String>, notifier: Notifier) -> Router {
    let documents = Arc::new(DocumentStore::new());
    let tables = Arc::new(tables);
    let mut router = Router::new();

    router.register("initialize", |p: InitializeParams| async move {
        info!(process_id = ?p.process_id, root_uri = ?p.root_uri, "initialize");
        Ok(serde_json::to_value(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: SYNC_INCREMENTAL,
                completion_provider: CompletionOptions {
                    trigger_characters: vec![" ".to_string(), ".".to_string()],
                },
                hover_provider: true,
            },
            server_info: ServerInfo {
                name: "sqld".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })?)
    });

    router.register("shutdown", |_p: Value| async move { Ok(Value::Null) });

    {
        let documents = Arc::clone(&documents);
        let notifier = notifier.clone();
        router.register("textDocument/didOpen", move |p: DidOpenTextDocumentParams| {
            let documents = Arc::clone(&documents);
            let notifier = notifier.clone();
            async move {
                let doc = documents.open(p.text_document);
                publish_diagnostics(&notifier, &doc);
                Ok(Value::Null)
            }
        });
    }

    {
        let documents = Arc::clone(&documents);
        let notifier = notifier.clone();
        router.register(
            "textDocument/didChange",
            move |p: DidChangeTextDocumentParams| {
                let documents = Arc::clone(&documents);
                let notifier = notifier.clone();
                async move {
                    let updated = documents.apply_changes(
                        &p.text_document.uri,
                        p.text_document.version,
                        &p.content_changes,
                    )?;
                    if let Some(doc) = updated {
                        publish_diagnostics(&notifier, &doc);
                    }
                    Ok(Value::Null)
                }
            },
        );
    }

    {
        let documents = Arc::clone(&documents);
        let notifier = notifier.clone();
        router.register(
            "textDocument/didClose",
            move |p: DidCloseTextDocumentParams| {
                let documents = Arc::clone(&documents);
                let notifier = notifier.clone();
                async move {
                    documents.close(&p.text_document.uri);
                    // Clear any published findings for the closed document.
                    let _ = notifier.notify(
                        "textDocument/publishDiagnostics",
                        PublishDiagnosticsParams {
                            uri: p.text_document.uri,
                            version: None,
                            diagnostics: Vec::new(),
                        },
                    );
                    Ok(Value::Null)
                }
            },
        );
    }

    {
        let documents = Arc::clone(&documents);
        let tables = Arc::clone(&tables);
        router.register(
            "textDocument/completion",
            move |p: TextDocumentPositionParams| {
                let documents = Arc::clone(&documents);
                let tables = Arc::clone(&tables);
                async move {
                    let doc = documents
                        .get(&p.text_document.uri)
                        .ok_or_else(|| anyhow!("document not open: {}", p.text_document.uri))?;
                    let items = completion::complete_at(&doc.text, p.position, &tables);
                    Ok(serde_json::to_value(CompletionList {
                        is_incomplete: false,
                        items,
                    })?)
                }
            },
        );
    }

    {
        let documents = Arc::clone(&documents);
        let tables = Arc::clone(&tables);
        router.register("textDocument/hover", move |p: TextDocumentPositionParams| {
            let documents = Arc::clone(&documents);
            let tables = Arc::clone(&tables);
            async move {
                let doc = documents
                    .get(&p.text_document.uri)
                    .ok_or_else(|| anyhow!("document not open: {}", p.text_document.uri))?;
                match completion::hover_at(&doc.text, p.position, &tables) {
                    Some(contents) => Ok(serde_json::to_value(Hover {
                        contents,
                        range: None,
                    })?),
                    None => Ok(Value::Null),
                }
            }
        });
    }

    router
}

fn publish_diagnostics(notifier: &Notifier, doc: &Document) {
    let diagnostics = diagnostics::analyze(&doc.text);
    let params = PublishDiagnosticsParams {
        uri: doc.uri.clone(),
        version: Some(doc.version),
        diagnostics,
    };
    if let Err(e) = notifier.notify("textDocument/publishDiagnostics", params) {
        debug!(err = %e, "diagnostics publish failed — peer gone");
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Position, TextDocumentIdentifier, TextDocumentItem};
    use crate::rpc::{pipe, CallError, Connection, NoopHandler};
    use crate::rpc::message::METHOD_NOT_FOUND;
    use serde_json::json;

    fn demo_tables() -> Vec<String> {
        vec!["users".into(), "orders".into()]
    }

    fn session() -> (Connection, Connection) {
        let (a, b) = pipe::pair();
        let server =
            Connection::with_handler_factory(a, |notifier| router(demo_tables(), notifier));
        (server, Connection::new(b, NoopHandler))
    }

    #[tokio::test]
    async fn initialize_reports_capabilities() {
        let (_server, client) = session();
        let result = client
            .call("initialize", json!({"processId": 1, "rootUri": "file:///w"}))
            .await
            .unwrap();
        assert_eq!(result["serverInfo"]["name"], "sqld");
        assert_eq!(result["capabilities"]["hoverProvider"], true);
    }

    #[tokio::test]
    async fn completion_requires_an_open_document() {
        let (_server, client) = session();
        let err = client
            .call(
                "textDocument/completion",
                TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier {
                        uri: "ghost.sql".into(),
                    },
                    position: Position::new(0, 0),
                },
            )
            .await
            .unwrap_err();
        match err {
            CallError::Remote(e) => assert!(e.message.contains("document not open")),
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn open_then_complete() {
        let (_server, client) = session();
        client
            .notify(
                "textDocument/didOpen",
                DidOpenTextDocumentParams {
                    text_document: TextDocumentItem {
                        uri: "test.sql".into(),
                        language_id: "sql".into(),
                        version: 1,
                        text: "select * fr".into(),
                    },
                },
            )
            .unwrap();

        let result = client
            .call(
                "textDocument/completion",
                TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier {
                        uri: "test.sql".into(),
                    },
                    position: Position::new(0, 11),
                },
            )
            .await
            .unwrap();
        assert_eq!(result["items"][0]["label"], "FROM");
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let (_server, client) = session();
        let err = client.call("workspace/symbol", json!({})).await.unwrap_err();
        match err {
            CallError::Remote(e) => assert_eq!(e.code, METHOD_NOT_FOUND),
            other => panic!("expected remote error, got {other:?}"),
        }
    }
}
