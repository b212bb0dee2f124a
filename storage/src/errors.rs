use thiserror::Error;

/// Errors from the shared SQLite layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A query or connection call failed.
    #[error("database error: {0}")]
    Database(String),

    /// Schema creation failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// A transaction could not be started.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The configuration asks for something this build cannot do.
    #[error("unsupported configuration: {0}")]
    Unsupported(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}
