//! End-to-end editor session tests: a server-role connection running the SQL
//! handler and a client-role driver, wired over the in-memory pipe pair.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use sqld::protocol::Position;
use sqld::rpc::{pipe, Connection, Handler, NoopHandler, RpcError};
use sqld::server;
use sqld::session::SessionDriver;

/// Wraps a handler and records every (method, params) it observes, in order.
struct Recording<H> {
    inner: H,
    log: Arc<Mutex<Vec<(String, Value)>>>,
}

impl<H> Recording<H> {
    fn new(inner: H) -> (Self, Arc<Mutex<Vec<(String, Value)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                inner,
                log: log.clone(),
            },
            log,
        )
    }
}

#[async_trait]
impl<H: Handler> Handler for Recording<H> {
    async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.log
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));
        self.inner.handle(method, params).await
    }
}

type MethodLog = Arc<Mutex<Vec<(String, Value)>>>;

fn observed(log: &MethodLog) -> Vec<String> {
    log.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
}

fn params_of(log: &MethodLog, method: &str) -> Option<Value> {
    log.lock()
        .unwrap()
        .iter()
        .find(|(m, _)| m == method)
        .map(|(_, p)| p.clone())
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

fn demo_tables() -> Vec<String> {
    vec!["users".into(), "orders".into(), "products".into()]
}

/// Build the full session: SQL server behind a recorder on one end, driver on
/// the other. Returns (driver, server log, server connection, client log).
fn build_session() -> (SessionDriver, MethodLog, Connection, MethodLog) {
    let (server_end, client_end) = pipe::pair();

    let mut server_log = None;
    let server_conn = Connection::with_handler_factory(server_end, |notifier| {
        let (recorder, log) = Recording::new(server::router(demo_tables(), notifier));
        server_log = Some(log);
        recorder
    });

    let (client_recorder, client_log) = Recording::new(NoopHandler);
    let client_conn = Connection::new(client_end, client_recorder);

    let driver = SessionDriver::new(client_conn, "file:///demo/test.sql");
    (driver, server_log.unwrap(), server_conn, client_log)
}

#[tokio::test]
async fn full_editor_lifecycle() {
    let (mut driver, server_log, _server_conn, _client_log) = build_session();

    // initialize — a response must arrive before anything else is issued.
    let init = driver.initialize("file:///demo").await.unwrap();
    assert_eq!(init["serverInfo"]["name"], "sqld");

    // didOpen v1 with the partial statement.
    driver.open("select * fr").unwrap();

    // completion at the end of "select * fr" — the handler must already have
    // observed version 1 when this resolves.
    let first = driver.completion(Position::new(0, 11)).await.unwrap();
    let first_labels: Vec<&str> = first["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["label"].as_str().unwrap())
        .collect();
    assert_eq!(first_labels, vec!["FROM"]);

    let open_params = params_of(&server_log, "textDocument/didOpen").unwrap();
    assert_eq!(open_params["textDocument"]["version"], 1);
    assert_eq!(open_params["textDocument"]["text"], "select * fr");

    // didChange carrying the minimal diff to the full statement.
    driver.edit("select * from u").unwrap();
    assert_eq!(driver.version(), 2);

    // completion at the new cursor — table names now apply.
    let second = driver.completion(Position::new(0, 15)).await.unwrap();
    let second_labels: Vec<&str> = second["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["label"].as_str().unwrap())
        .collect();
    assert_eq!(second_labels[0], "users");

    // The handler observed version 1 then version 2 with the diffed change.
    let change_params = params_of(&server_log, "textDocument/didChange").unwrap();
    assert_eq!(change_params["textDocument"]["version"], 2);
    let change = &change_params["contentChanges"][0];
    assert_eq!(change["text"], "om u");
    assert_eq!(change["range"]["start"]["character"], 11);
    assert_eq!(change["range"]["end"]["character"], 15);

    // Strict arrival order on the server side.
    let methods = observed(&server_log);
    let core: Vec<&str> = methods
        .iter()
        .map(|s| s.as_str())
        .filter(|m| *m != "shutdown")
        .collect();
    assert_eq!(
        core,
        vec![
            "initialize",
            "textDocument/didOpen",
            "textDocument/completion",
            "textDocument/didChange",
            "textDocument/completion",
        ]
    );

    driver.shutdown().await;
}

#[tokio::test]
async fn server_pushes_diagnostics_for_broken_sql() {
    let (mut driver, _server_log, _server_conn, client_log) = build_session();

    driver.initialize("file:///demo").await.unwrap();
    driver.open("select * from t where name = 'alice").unwrap();

    wait_until(|| params_of(&client_log, "textDocument/publishDiagnostics").is_some()).await;

    let params = params_of(&client_log, "textDocument/publishDiagnostics").unwrap();
    assert_eq!(params["uri"], "file:///demo/test.sql");
    assert_eq!(params["version"], 1);
    let diagnostics = params["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["message"], "unclosed string literal");

    driver.shutdown().await;
}

#[tokio::test]
async fn clean_sql_publishes_empty_diagnostics() {
    let (mut driver, _server_log, _server_conn, client_log) = build_session();

    driver.initialize("file:///demo").await.unwrap();
    driver.open("select * from users").unwrap();

    wait_until(|| params_of(&client_log, "textDocument/publishDiagnostics").is_some()).await;
    let params = params_of(&client_log, "textDocument/publishDiagnostics").unwrap();
    assert!(params["diagnostics"].as_array().unwrap().is_empty());

    driver.shutdown().await;
}

#[tokio::test]
async fn hover_resolves_keywords_and_tables() {
    let (mut driver, _server_log, _server_conn, _client_log) = build_session();

    driver.initialize("file:///demo").await.unwrap();
    driver.open("select * from users").unwrap();

    let hover = driver.hover(Position::new(0, 2)).await.unwrap();
    assert!(hover["contents"].as_str().unwrap().starts_with("SELECT"));

    let hover = driver.hover(Position::new(0, 16)).await.unwrap();
    assert_eq!(hover["contents"], "table users");

    // Hovering whitespace yields a null result, not an error.
    let hover = driver.hover(Position::new(0, 8)).await.unwrap();
    assert!(hover.is_null());

    driver.shutdown().await;
}

#[tokio::test]
async fn scripted_sequence_survives_a_failing_step() {
    // A server with no handler at all: every call fails with method-not-found
    // but the script still runs to completion and bookkeeping stays sane.
    let (server_end, client_end) = pipe::pair();
    let _server = Connection::new(server_end, NoopHandler);
    let client = Connection::new(client_end, NoopHandler);

    let mut driver = SessionDriver::new(client, "file:///demo/test.sql");
    driver
        .run_script("file:///demo", "select * fr", "select * from u")
        .await;

    assert_eq!(driver.version(), 2);
    assert_eq!(driver.text(), "select * from u");
}
