//! Error taxonomy for the store and reconciliation core.

use thiserror::Error;

/// The store could not be established: connection refused, schema bootstrap
/// failed, file unwritable. Fatal at startup, never retried here.
#[derive(Debug, Error)]
#[error("failed to open store: {0}")]
pub struct OpenError(#[from] pub sqlx::Error);

/// Malformed or incomplete connection configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid YAML in config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("missing config keys: {0}")]
    MissingKeys(String),
}

/// A store mutation was rejected. Surfaced to the caller; the batch is
/// aborted and the next batch is unaffected.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The unique index on normalized text rejected a row. The reconciler
    /// filters known texts before inserting, so hitting this means two
    /// writers raced; exactly one of them wins.
    #[error("duplicate item text rejected by store")]
    Duplicate(#[source] sqlx::Error),
    #[error("store query failed: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("export I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn from_insert(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref dbe) = err {
            if matches!(dbe.kind(), sqlx::error::ErrorKind::UniqueViolation) {
                return StoreError::Duplicate(err);
            }
        }
        StoreError::Sqlx(err)
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate(_))
    }
}
