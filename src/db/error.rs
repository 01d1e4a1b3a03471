use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("cannot create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open telemetry store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("telemetry store has schema v{found}, this build understands up to v{supported}")]
    SchemaTooNew { found: usize, supported: usize },

    #[error("migration to schema v{version} failed: {source}")]
    Migration {
        version: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("session {0} is not in the telemetry store")]
    UnknownSession(String),

    #[error("{field} value {value} does not fit an SQLite integer")]
    OutOfRange { field: &'static str, value: u64 },

    #[error("event payload could not be encoded: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("cannot start telemetry store worker: {0}")]
    Spawn(std::io::Error),

    #[error("telemetry store worker is gone")]
    WorkerGone,
}
