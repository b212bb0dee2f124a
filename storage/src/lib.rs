//! Shared SQLite storage layer.
//!
//! This crate owns the database connection and its configuration. Domain
//! crates (such as `session-store`) layer their own schema and queries on
//! top of [`SqliteDb`].
//!
//! With the `sqlcipher` feature, [`StorageConfig::Encrypted`] opens the
//! database with SQLCipher full-database encryption.

mod errors;
mod sqlite;

pub use errors::StorageError;
pub use sqlite::{SqliteDb, StorageConfig};

// Re-export rusqlite types that domain crates will need
pub use rusqlite::{Connection, Error as RusqliteError, OptionalExtension, Transaction, params};
