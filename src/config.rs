// SPDX-License-Identifier: MIT
//! Configuration loading.
//!
//! `config.toml` — all fields are optional overrides over built-in defaults.
//! Priority: CLI / env var > TOML > built-in default. A missing file at the
//! default location is not an error; an explicitly passed path must exist.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

const DEFAULT_LOG: &str = "info";

// ─── Connections ─────────────────────────────────────────────────────────────

/// One database connection profile (`[[connection]]` in config.toml).
///
/// No live connection is opened here — the profile's `tables` list seeds
/// completion the way a schema introspection would.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Display name (e.g. `"local"`).
    pub name: String,
    /// Driver label (e.g. `"sqlite3"`, `"mysql"`, `"postgresql"`).
    pub driver: String,
    /// Data source name / connection string.
    pub data_source_name: String,
    /// Table names offered in completion for this connection.
    pub tables: Vec<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            driver: String::new(),
            data_source_name: String::new(),
            tables: Vec::new(),
        }
    }
}

impl ConnectionConfig {
    /// Built-in demo profile used when no config file exists, so the
    /// out-of-the-box session has something to complete against.
    pub fn demo() -> Self {
        Self {
            name: "demo".to_string(),
            driver: "sqlite3".to_string(),
            data_source_name: "file:demo.db".to_string(),
            tables: vec![
                "users".to_string(),
                "orders".to_string(),
                "products".to_string(),
            ],
        }
    }
}

// ─── Top-level config ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SqldConfig {
    /// Log level filter string, e.g. "debug", "info,sqld=trace".
    pub log: String,
    /// Database connection profiles.
    #[serde(rename = "connection")]
    pub connections: Vec<ConnectionConfig>,
}

impl Default for SqldConfig {
    fn default() -> Self {
        Self {
            log: DEFAULT_LOG.to_string(),
            connections: vec![ConnectionConfig::demo()],
        }
    }
}

impl SqldConfig {
    /// Load configuration.
    ///
    /// With an explicit `path` the file must exist and parse. Without one,
    /// the default location is tried and a missing or broken file falls back
    /// to the built-in defaults (with a warning for the broken case).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read config: {}", path.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("cannot parse config: {}", path.display()))
            }
            None => {
                let path = Self::default_path();
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str(&contents) {
                        Ok(cfg) => Ok(cfg),
                        Err(e) => {
                            warn!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
                            Ok(Self::default())
                        }
                    },
                    Err(_) => Ok(Self::default()),
                }
            }
        }
    }

    /// `$XDG_CONFIG_HOME/sqld/config.toml`, falling back to
    /// `~/.config/sqld/config.toml`.
    pub fn default_path() -> PathBuf {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("sqld").join("config.toml");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".config")
                .join("sqld")
                .join("config.toml");
        }
        PathBuf::from("config.toml")
    }

    /// All table names across the configured connections, deduplicated,
    /// in config order.
    pub fn all_tables(&self) -> Vec<String> {
        let mut tables = Vec::new();
        for conn in &self.connections {
            for table in &conn.tables {
                if !tables.contains(table) {
                    tables.push(table.clone());
                }
            }
        }
        tables
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_include_demo_connection() {
        let cfg = SqldConfig::default();
        assert_eq!(cfg.log, "info");
        assert_eq!(cfg.connections.len(), 1);
        assert!(cfg.all_tables().contains(&"users".to_string()));
    }

    #[test]
    fn explicit_path_parses() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
log = "debug"

[[connection]]
name = "ci"
driver = "postgresql"
data_source_name = "postgres://localhost/ci"
tables = ["builds", "artifacts"]
"#
        )
        .unwrap();

        let cfg = SqldConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.log, "debug");
        assert_eq!(cfg.connections[0].driver, "postgresql");
        assert_eq!(cfg.all_tables(), vec!["builds", "artifacts"]);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        assert!(SqldConfig::load(Some(Path::new("/nonexistent/sqld.toml"))).is_err());
    }

    #[test]
    fn all_tables_deduplicates_across_connections() {
        let mut cfg = SqldConfig::default();
        cfg.connections.push(ConnectionConfig {
            name: "second".into(),
            driver: "mysql".into(),
            data_source_name: "mysql://localhost/app".into(),
            tables: vec!["users".into(), "invoices".into()],
        });
        let tables = cfg.all_tables();
        assert_eq!(
            tables,
            vec!["users", "orders", "products", "invoices"]
        );
    }
}
