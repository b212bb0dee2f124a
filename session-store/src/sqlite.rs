//! SQLite session store with field-level encryption.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;
use storage::{OptionalExtension, SqliteDb, StorageConfig, params};
use zeroize::Zeroizing;

use crate::address::{DeviceId, PeerAddress};
use crate::error::{Result, SessionStoreError};
use crate::record::SessionRecord;
use crate::traits::SessionStore;

/// Field encryption key type (32 bytes for ChaCha20Poly1305).
pub type EncryptionKey = [u8; 32];

const SESSION_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sessions (
        name TEXT NOT NULL,
        device_id INTEGER NOT NULL,
        record_enc BLOB NOT NULL,
        record_nonce BLOB NOT NULL,
        updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
        PRIMARY KEY (name, device_id)
    );
";

/// SQLite storage with every session record sealed by ChaCha20Poly1305.
///
/// Schema: one `sessions` row per `(name, device_id)`. The primary key also
/// serves name lookups for enumeration and bulk delete.
///
/// Each record is encrypted with a fresh random nonce and the address as
/// associated data, so a blob copied onto another address's row fails to
/// decrypt instead of loading as the wrong peer's session.
///
/// [`get_sub_device_sessions`](SessionStore::get_sub_device_sessions)
/// returns device ids in ascending order.
pub struct SqliteSessionStore {
    db: Mutex<SqliteDb>,
    encryption_key: Zeroizing<EncryptionKey>,
}

impl SqliteSessionStore {
    /// Opens a store with the given database configuration.
    pub fn new(config: StorageConfig, encryption_key: EncryptionKey) -> Result<Self> {
        let db = SqliteDb::new(config)?;
        Self::initialize(db, encryption_key)
    }

    /// Open or create a database file.
    pub fn open<P: AsRef<Path>>(path: P, encryption_key: EncryptionKey) -> Result<Self> {
        let db = SqliteDb::open(path)?;
        Self::initialize(db, encryption_key)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory(encryption_key: EncryptionKey) -> Result<Self> {
        let db = SqliteDb::in_memory()?;
        Self::initialize(db, encryption_key)
    }

    /// Open with SQLCipher full-database encryption.
    #[cfg(feature = "sqlcipher")]
    pub fn open_encrypted(
        path: &str,
        db_password: &str,
        field_key: EncryptionKey,
    ) -> Result<Self> {
        let db = SqliteDb::sqlcipher(path.to_string(), db_password.to_string())?;
        Self::initialize(db, field_key)
    }

    fn initialize(db: SqliteDb, encryption_key: EncryptionKey) -> Result<Self> {
        db.execute_batch(SESSION_SCHEMA)?;
        Ok(Self {
            db: Mutex::new(db),
            encryption_key: Zeroizing::new(encryption_key),
        })
    }

    /// Deletes sessions not written for more than `max_age_secs` seconds.
    /// Returns how many were removed.
    pub fn cleanup_stale_sessions(&self, max_age_secs: i64) -> Result<usize> {
        let db = self.db()?;
        let deleted = db.connection().execute(
            "DELETE FROM sessions WHERE updated_at < strftime('%s', 'now') - ?1",
            params![max_age_secs],
        )?;
        if deleted > 0 {
            tracing::debug!(deleted, max_age_secs, "cleaned up stale sessions");
        }
        Ok(deleted)
    }

    fn db(&self) -> Result<MutexGuard<'_, SqliteDb>> {
        self.db.lock().map_err(|_| SessionStoreError::LockPoisoned)
    }

    fn encrypt(&self, address: &PeerAddress, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; 12])> {
        let cipher = ChaCha20Poly1305::new((&*self.encryption_key).into());
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let aad = address.to_string();

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|e| SessionStoreError::Encryption(e.to_string()))?;

        Ok((ciphertext, nonce_bytes))
    }

    fn decrypt(
        &self,
        address: &PeerAddress,
        ciphertext: &[u8],
        nonce: &[u8; 12],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let cipher = ChaCha20Poly1305::new((&*self.encryption_key).into());
        let nonce = Nonce::from_slice(nonce);
        let aad = address.to_string();

        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: aad.as_bytes(),
                },
            )
            .map(Zeroizing::new)
            .map_err(|e| SessionStoreError::Decryption(e.to_string()))
    }

    fn open_record(
        &self,
        address: &PeerAddress,
        record_enc: &[u8],
        record_nonce: Vec<u8>,
    ) -> Result<SessionRecord> {
        let nonce: [u8; 12] = record_nonce
            .try_into()
            .map_err(|_| SessionStoreError::CorruptedState("invalid record nonce".into()))?;
        let plaintext = self.decrypt(address, record_enc, &nonce)?;
        SessionRecord::from_bytes(&plaintext)
    }
}

impl SessionStore for SqliteSessionStore {
    fn get_session(&self, address: &PeerAddress) -> Result<Option<SessionRecord>> {
        let row = {
            let db = self.db()?;
            db.connection()
                .query_row(
                    "SELECT record_enc, record_nonce FROM sessions WHERE name = ?1 AND device_id = ?2",
                    params![address.name(), address.device_id().get()],
                    |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?)),
                )
                .optional()?
        };

        let Some((record_enc, record_nonce)) = row else {
            tracing::trace!(%address, "no stored session");
            return Ok(None);
        };

        self.open_record(address, &record_enc, record_nonce)
            .map(Some)
            .inspect_err(|e| tracing::warn!(%address, error = %e, "stored session is unreadable"))
    }

    fn store_session(&self, address: &PeerAddress, record: &SessionRecord) -> Result<()> {
        let (record_enc, record_nonce) = self.encrypt(address, &record.to_bytes())?;
        let db = self.db()?;
        db.connection().execute(
            "
            INSERT INTO sessions (name, device_id, record_enc, record_nonce)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(name, device_id) DO UPDATE SET
                record_enc = excluded.record_enc,
                record_nonce = excluded.record_nonce,
                updated_at = strftime('%s', 'now')
            ",
            params![
                address.name(),
                address.device_id().get(),
                record_enc.as_slice(),
                record_nonce.as_slice(),
            ],
        )?;
        tracing::debug!(%address, "stored session");
        Ok(())
    }

    fn contains_session(&self, address: &PeerAddress) -> Result<bool> {
        let db = self.db()?;
        let exists = db
            .connection()
            .query_row(
                "SELECT 1 FROM sessions WHERE name = ?1 AND device_id = ?2",
                params![address.name(), address.device_id().get()],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        tracing::trace!(%address, exists, "checked session");
        Ok(exists)
    }

    fn delete_session(&self, address: &PeerAddress) -> Result<()> {
        let db = self.db()?;
        let changes = db.connection().execute(
            "DELETE FROM sessions WHERE name = ?1 AND device_id = ?2",
            params![address.name(), address.device_id().get()],
        )?;
        if changes > 0 {
            tracing::debug!(%address, "deleted session");
        }
        Ok(())
    }

    fn delete_all_sessions(&self, name: &str) -> Result<()> {
        let db = self.db()?;
        let changes = db
            .connection()
            .execute("DELETE FROM sessions WHERE name = ?1", params![name])?;
        if changes > 0 {
            tracing::debug!(name, count = changes, "deleted all sessions");
        }
        Ok(())
    }

    fn get_sub_device_sessions(&self, name: &str) -> Result<Vec<DeviceId>> {
        let db = self.db()?;
        let conn = db.connection();
        let mut stmt =
            conn.prepare("SELECT device_id FROM sessions WHERE name = ?1 ORDER BY device_id")?;
        let rows = stmt
            .query_map(params![name], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|raw| {
                DeviceId::try_from(raw).map_err(|_| {
                    SessionStoreError::CorruptedState(format!(
                        "device id {} out of range for {}",
                        raw, name
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SessionState;

    crate::contract_tests::session_store_contract!(
        SqliteSessionStore::open_in_memory([0x42u8; 32]).unwrap()
    );

    fn test_store() -> SqliteSessionStore {
        SqliteSessionStore::open_in_memory([0x42u8; 32]).unwrap()
    }

    fn record(byte: u8) -> SessionRecord {
        SessionRecord::new(SessionState::new(vec![byte; 32]))
    }

    #[test]
    fn test_record_is_not_stored_in_plaintext() {
        let store = test_store();
        let address = PeerAddress::new("alice", 1);
        let record = record(0x5A);
        store.store_session(&address, &record).unwrap();

        let db = store.db().unwrap();
        let blob: Vec<u8> = db
            .connection()
            .query_row("SELECT record_enc FROM sessions", [], |row| row.get(0))
            .unwrap();
        let plaintext = record.to_bytes();
        assert!(!blob.windows(plaintext.len()).any(|w| w == plaintext.as_slice()));
    }

    #[test]
    fn test_wrong_key_is_an_error_not_absence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        let address = PeerAddress::new("alice", 1);

        {
            let store = SqliteSessionStore::open(&path, [0x42u8; 32]).unwrap();
            store.store_session(&address, &record(1)).unwrap();
        }

        let store = SqliteSessionStore::open(&path, [0x43u8; 32]).unwrap();
        assert!(store.contains_session(&address).unwrap());
        assert!(matches!(
            store.load_session(&address),
            Err(SessionStoreError::Decryption(_))
        ));
        assert!(matches!(
            store.load_existing_sessions(&[address]),
            Err(SessionStoreError::Decryption(_))
        ));
    }

    #[test]
    fn test_blob_moved_to_other_address_fails() {
        let store = test_store();
        let alice = PeerAddress::new("alice", 1);
        let mallory = PeerAddress::new("mallory", 1);
        store.store_session(&alice, &record(1)).unwrap();
        store.store_session(&mallory, &record(2)).unwrap();

        {
            let db = store.db().unwrap();
            db.connection()
                .execute(
                    "UPDATE sessions SET
                        record_enc = (SELECT record_enc FROM sessions WHERE name = 'alice'),
                        record_nonce = (SELECT record_nonce FROM sessions WHERE name = 'alice')
                     WHERE name = 'mallory'",
                    [],
                )
                .unwrap();
        }

        assert!(matches!(
            store.load_session(&mallory),
            Err(SessionStoreError::Decryption(_))
        ));
        assert_eq!(store.load_session(&alice).unwrap(), record(1));
    }

    #[test]
    fn test_corrupted_nonce() {
        let store = test_store();
        let address = PeerAddress::new("alice", 1);
        store.store_session(&address, &record(1)).unwrap();

        {
            let db = store.db().unwrap();
            db.connection()
                .execute("UPDATE sessions SET record_nonce = x'00'", [])
                .unwrap();
        }

        assert!(matches!(
            store.load_session(&address),
            Err(SessionStoreError::CorruptedState(_))
        ));
    }

    #[test]
    fn test_negative_device_id_row_is_corruption() {
        let store = test_store();
        {
            let db = store.db().unwrap();
            db.connection()
                .execute(
                    "INSERT INTO sessions (name, device_id, record_enc, record_nonce)
                     VALUES ('alice', -1, x'00', x'00')",
                    [],
                )
                .unwrap();
        }

        assert!(matches!(
            store.get_sub_device_sessions("alice"),
            Err(SessionStoreError::CorruptedState(_))
        ));
    }

    #[test]
    fn test_sessions_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        let key = [0x42u8; 32];

        let mut record = record(0x10);
        record.archive_current_state();
        record.set_current_state(SessionState::new(vec![0x20; 64]));

        {
            let store = SqliteSessionStore::open(&path, key).unwrap();
            store.store_session(&PeerAddress::new("alice", 1), &record).unwrap();
            store
                .store_session(&PeerAddress::new("alice", 2), &SessionRecord::new_fresh())
                .unwrap();
        }

        let store = SqliteSessionStore::open(&path, key).unwrap();
        assert_eq!(
            store.get_sub_device_sessions("alice").unwrap(),
            vec![DeviceId::new(1), DeviceId::new(2)]
        );
        assert_eq!(
            store.load_session(&PeerAddress::new("alice", 1)).unwrap(),
            record
        );
    }

    #[test]
    fn test_cleanup_stale_sessions() {
        let store = test_store();
        store.store_session(&PeerAddress::new("alice", 1), &record(1)).unwrap();
        store.store_session(&PeerAddress::new("alice", 2), &record(2)).unwrap();

        {
            let db = store.db().unwrap();
            db.connection()
                .execute(
                    "UPDATE sessions SET updated_at = updated_at - 7200 WHERE device_id = 1",
                    [],
                )
                .unwrap();
        }

        assert_eq!(store.cleanup_stale_sessions(3600).unwrap(), 1);
        assert_eq!(
            store.get_sub_device_sessions("alice").unwrap(),
            vec![DeviceId::new(2)]
        );
    }

    #[test]
    fn test_store_refreshes_updated_at() {
        let store = test_store();
        let address = PeerAddress::new("alice", 1);
        store.store_session(&address, &record(1)).unwrap();
        {
            let db = store.db().unwrap();
            db.connection()
                .execute("UPDATE sessions SET updated_at = 0", [])
                .unwrap();
        }

        store.store_session(&address, &record(2)).unwrap();

        assert_eq!(store.cleanup_stale_sessions(3600).unwrap(), 0);
        assert_eq!(store.load_session(&address).unwrap(), record(2));
    }
}
