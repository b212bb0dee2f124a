//! SQLite storage backend.

use rusqlite::Connection;
use std::path::Path;

use crate::StorageError;

/// Configuration for SQLite storage.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// In-memory database (isolated, for simple testing).
    InMemory,
    /// Shared in-memory database with a name (multiple connections share data).
    /// Use this when you need multiple storage instances to share the same in-memory DB.
    SharedInMemory(String),
    /// File-based SQLite database.
    File(String),
    /// SQLCipher encrypted database.
    Encrypted { path: String, key: String },
}

/// SQLite database wrapper.
///
/// This provides the core database connection and can be shared
/// across different domain-specific storage implementations.
pub struct SqliteDb {
    conn: Connection,
}

impl SqliteDb {
    /// Creates a new SQLite database with the given configuration.
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        let conn = match config {
            StorageConfig::InMemory => Connection::open_in_memory()?,
            StorageConfig::SharedInMemory(ref name) => {
                // Multiple connections with the same name share the same data
                let uri = format!("file:{}?mode=memory&cache=shared", name);
                Connection::open_with_flags(
                    &uri,
                    rusqlite::OpenFlags::SQLITE_OPEN_URI
                        | rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                        | rusqlite::OpenFlags::SQLITE_OPEN_CREATE,
                )?
            }
            StorageConfig::File(ref path) => {
                let conn = Connection::open(path)?;
                conn.pragma_update(None, "journal_mode", "WAL")?;
                conn
            }
            StorageConfig::Encrypted { ref path, ref key } => {
                if !cfg!(feature = "sqlcipher") {
                    return Err(StorageError::Unsupported(
                        "encrypted storage requires the `sqlcipher` feature".into(),
                    ));
                }
                let conn = Connection::open(path)?;
                conn.pragma_update(None, "key", key)?;
                conn
            }
        };

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        tracing::debug!(kind = config.kind(), "opened sqlite database");

        Ok(Self { conn })
    }

    /// Opens an existing database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let path = path
            .to_str()
            .ok_or_else(|| StorageError::Unsupported(format!("non UTF-8 path: {}", path.display())))?;
        Self::new(StorageConfig::File(path.to_string()))
    }

    /// Creates an in-memory database (useful for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::new(StorageConfig::InMemory)
    }

    pub fn sqlcipher(path: String, key: String) -> Result<Self, StorageError> {
        Self::new(StorageConfig::Encrypted { path, key })
    }

    /// Runs a batch of SQL statements, typically schema creation.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StorageError> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| StorageError::Migration(e.to_string()))
    }

    /// Returns a reference to the underlying connection.
    ///
    /// Use this for domain-specific storage operations.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Begins a transaction.
    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>, StorageError> {
        self.conn
            .transaction()
            .map_err(|e| StorageError::Transaction(e.to_string()))
    }
}

impl StorageConfig {
    fn kind(&self) -> &'static str {
        match self {
            StorageConfig::InMemory => "in-memory",
            StorageConfig::SharedInMemory(_) => "shared-in-memory",
            StorageConfig::File(_) => "file",
            StorageConfig::Encrypted { .. } => "encrypted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_executes_schema() {
        let db = SqliteDb::in_memory().unwrap();
        db.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY);")
            .unwrap();

        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_bad_schema_is_migration_error() {
        let db = SqliteDb::in_memory().unwrap();
        let result = db.execute_batch("CREATE TABLE");
        assert!(matches!(result, Err(StorageError::Migration(_))));
    }

    #[test]
    fn test_shared_in_memory_connections_share_data() {
        let a = SqliteDb::new(StorageConfig::SharedInMemory("shared_test".into())).unwrap();
        let b = SqliteDb::new(StorageConfig::SharedInMemory("shared_test".into())).unwrap();

        a.execute_batch("CREATE TABLE IF NOT EXISTS t (v INTEGER); INSERT INTO t VALUES (7);")
            .unwrap();
        let v: i64 = b
            .connection()
            .query_row("SELECT v FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.db");

        {
            let db = SqliteDb::open(&path).unwrap();
            db.execute_batch("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (42);")
                .unwrap();
        }

        let db = SqliteDb::open(&path).unwrap();
        let v: i64 = db
            .connection()
            .query_row("SELECT v FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(v, 42);
    }

    #[cfg(not(feature = "sqlcipher"))]
    #[test]
    fn test_encrypted_needs_sqlcipher() {
        let result = SqliteDb::sqlcipher("unused.db".into(), "secret".into());
        assert!(matches!(result, Err(StorageError::Unsupported(_))));
    }

    #[test]
    fn test_transaction_rolls_back_on_drop() {
        let mut db = SqliteDb::in_memory().unwrap();
        db.execute_batch("CREATE TABLE t (v INTEGER);").unwrap();

        {
            let tx = db.transaction().unwrap();
            tx.execute("INSERT INTO t VALUES (1)", []).unwrap();
        }

        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
