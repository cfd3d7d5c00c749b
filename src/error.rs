//! Error types for storage, cells, configuration and the engine.

use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Nothing stored under the key. A checked condition, never retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend was busy or locked; retrying may succeed.
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// Any other backend failure.
    #[error("storage backend failure: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound("query returned no rows".into()),
            rusqlite::Error::SqliteFailure(ref err, _)
                if matches!(
                    err.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Transient(e.to_string())
            }
            other => Self::Backend(other.to_string()),
        }
    }
}

/// Errors raised while a cell computes.
#[derive(Debug, Error)]
pub enum CellError {
    /// The cell's own domain failure (bad input, division by zero, ...).
    #[error("{cell}: {message}")]
    Domain { cell: String, message: String },

    /// The cell returned a different number of outputs than it declares.
    #[error("{cell} declared {expected} outputs but produced {actual}")]
    ArityMismatch {
        cell: String,
        expected: usize,
        actual: usize,
    },

    /// The tree's result did not match the expectation; the tree was re-entered.
    #[error("expectation not met for tree {tree_id} (attempt {attempt})")]
    ExpectationNotMet { tree_id: String, attempt: i64 },

    /// The tree was re-entered more often than the configured budget allows.
    #[error("retraversal budget exhausted for tree {tree_id} after {attempts} attempts")]
    RetraversalBudgetExhausted { tree_id: String, attempts: i64 },

    /// Context lacks an identifier the cell needs.
    #[error("context is missing {0}")]
    MissingContext(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CellError {
    /// Convenience constructor for domain failures.
    pub fn domain(cell: &str, message: impl Into<String>) -> Self {
        Self::Domain {
            cell: cell.to_string(),
            message: message.into(),
        }
    }
}

/// Configuration errors, all fatal before start.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A collaborator the engine cannot run without was not supplied.
    #[error("missing required collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors surfaced by the execution engine for a single event.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cell(#[from] CellError),

    /// The payload named a cell the registry does not know.
    #[error("no cell registered under '{0}'")]
    UnknownCell(String),

    /// The payload's arguments do not satisfy the destination cell.
    #[error("{cell} not activated: {reason}")]
    NotActivated { cell: String, reason: String },

    /// The payload's context lacks a required identifier.
    #[error("payload context is missing {0}")]
    MissingContext(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_sqlite_errors_are_transient() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(StoreError::from(busy).is_transient());

        let misuse = rusqlite::Error::InvalidQuery;
        let err = StoreError::from(misuse);
        assert!(!err.is_transient());
        assert!(!err.is_not_found());
    }

    #[test]
    fn no_rows_is_not_found() {
        assert!(StoreError::from(rusqlite::Error::QueryReturnedNoRows).is_not_found());
    }
}
