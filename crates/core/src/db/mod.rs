//! Grading history database.
//!
//! A small SQLite store recording one row per grading run, plus the full
//! report as JSON so past results can be shown again verbatim.

mod history_db;
mod models;

pub use history_db::{HistoryDb, CURRENT_SCHEMA_VERSION};
pub use models::GradingRunRecord;

use thiserror::Error;

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
pub(crate) const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Error type for history database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },

    /// A stored column holds a value this crate does not recognise.
    #[error("run {run_id} has unrecognised {column} value {value:?}")]
    CorruptRecord { run_id: String, column: &'static str, value: String },

    #[error("could not encode or decode stored report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;
