// SPDX-License-Identifier: MIT
use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use sqld::config::SqldConfig;
use sqld::rpc::{pipe, Connection, NoopHandler};
use sqld::server;
use sqld::session::SessionDriver;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "sqld",
    about = "SQL language service — in-process JSON-RPC transport and editor session driver",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Also log to this file path (in addition to stderr)
    #[arg(long, short = 'l', env = "SQLD_LOG_FILE")]
    log: Option<std::path::PathBuf>,

    /// Alternative configuration file
    #[arg(long, short = 'c', env = "SQLD_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Print all requests and responses
    #[arg(long, short = 't')]
    trace: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the in-process demonstration session (default when no subcommand
    /// given).
    ///
    /// Builds a server-role and a client-role connection over an in-memory
    /// pipe pair and drives the editor lifecycle against the SQL handler:
    /// initialize, open a statement, complete, edit, complete again.
    ///
    /// Examples:
    ///   sqld serve
    ///   sqld
    Serve,
    /// Edit the configuration file in $EDITOR.
    ///
    /// Opens the active config (or the default location if none exists yet).
    ///
    /// Examples:
    ///   sqld config
    ///   EDITOR=nano sqld config
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Command::Config) => edit_config(args.config.as_deref()),
        Some(Command::Serve) | None => serve(&args).await,
    }
}

async fn serve(args: &Args) -> Result<()> {
    let config = SqldConfig::load(args.config.as_deref())?;

    let log_level = if args.trace {
        "sqld=trace".to_string()
    } else {
        config.log.clone()
    };
    let _log_guard = setup_logging(&log_level, args.log.as_deref());

    info!(version = env!("CARGO_PKG_VERSION"), "sqld starting");

    let tables = config.all_tables();
    let (server_end, client_end) = pipe::pair();
    let server_conn =
        Connection::with_handler_factory(server_end, |notifier| server::router(tables, notifier));
    let client_conn = Connection::new(client_end, NoopHandler);

    let mut driver = SessionDriver::new(client_conn, "file:///demo/test.sql");
    driver
        .run_script("file:///demo", "select * fr", "select * from u")
        .await;
    driver.shutdown().await;
    server_conn.close();

    info!("session complete");
    Ok(())
}

/// Install the tracing subscriber: compact stderr output, plus a mirror of
/// every event into `log_file` when given. Returns the appender guard that
/// must live for the rest of the process.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(log_level))
            .with_writer(std::io::stderr)
            .compact()
            .init();
        return None;
    };

    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let filename = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("sqld.log"));

    // Ensure the directory exists before tracing-appender tries to open it.
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!(
            "warn: could not create log directory '{}': {e} — logging to stderr only",
            dir.display()
        );
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(log_level))
            .with_writer(std::io::stderr)
            .compact()
            .init();
        return None;
    }

    let appender = tracing_appender::rolling::never(dir, filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();

    Some(guard)
}

/// Open the config file in `$EDITOR` (falling back to `vi`), creating the
/// parent directory for the default location first.
fn edit_config(explicit: Option<&std::path::Path>) -> Result<()> {
    let path = explicit
        .map(|p| p.to_path_buf())
        .unwrap_or_else(SqldConfig::default_path);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create config directory: {}", dir.display()))?;
    }

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = std::process::Command::new(&editor)
        .arg(&path)
        .status()
        .with_context(|| format!("failed to launch editor: {editor}"))?;
    if !status.success() {
        anyhow::bail!("editor exited with {status}");
    }
    Ok(())
}
