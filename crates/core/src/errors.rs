//! Error types for the reconciliation core.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Reconciliation errors
// ---------------------------------------------------------------------------

/// Errors from classification and resolution.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A snapshot set contained a malformed or duplicated identifier. Fatal to
    /// the whole comparison pass.
    #[error("invalid snapshot for dataset '{dataset_id}': {detail}")]
    InvalidSnapshot {
        dataset_id: String,
        detail: String,
    },

    /// The directive cannot be applied to the entry as classified. The entry
    /// is left untouched.
    #[error("directive '{directive}' is not applicable to dataset '{dataset_id}' ({classification}): {detail}")]
    IllegalDirective {
        dataset_id: String,
        directive: String,
        classification: String,
        detail: String,
    },

    /// The entry was already handed to the resolution sink in this session and
    /// the request did not ask for an explicit override.
    #[error("dataset '{0}' is already finalized; resend the directive as an override to replace it")]
    ResolutionConflict(String),

    /// No entry with this identifier exists in the session.
    #[error("dataset not found in session: {0}")]
    NotFound(String),
}

// ---------------------------------------------------------------------------
// Snapshot source errors
// ---------------------------------------------------------------------------

/// Errors from loading local, remote, or baseline snapshots.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The snapshot file does not exist.
    #[error("snapshot file not found: {0}")]
    FileNotFound(String),

    /// The snapshot file is not a valid JSON snapshot list.
    #[error("failed to parse snapshot file '{path}': {detail}")]
    ParseError {
        path: String,
        detail: String,
    },

    /// Generic I/O wrapper.
    #[error("snapshot I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Resolution sink errors
// ---------------------------------------------------------------------------

/// Errors raised while handing resolutions to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink refused the record.
    #[error("resolution sink rejected dataset '{dataset_id}': {detail}")]
    Rejected {
        dataset_id: String,
        detail: String,
    },

    /// Database error from the journal sink.
    #[error("resolution journal error: {0}")]
    DatabaseError(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite resolution journal.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed {
        version: u32,
        detail: String,
    },

    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
