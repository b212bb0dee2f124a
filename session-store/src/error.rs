//! Error types for the session store.

use thiserror::Error;

use crate::address::PeerAddress;

/// Errors that can occur during session store operations.
///
/// A missing session is only an error for [`load_existing_sessions`]; every
/// other lookup treats absence as data. Backend failures are never folded
/// into "absent".
///
/// [`load_existing_sessions`]: crate::SessionStore::load_existing_sessions
#[derive(Error, Debug)]
pub enum SessionStoreError {
    /// A session required to exist has no durable record.
    #[error("no session for {address}")]
    NoSession {
        /// The first address found without a record.
        address: PeerAddress,
    },

    /// The storage backend failed.
    #[cfg(feature = "sqlite")]
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),

    /// Field-level encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Field-level decryption failed.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// A stored row is corrupted or invalid.
    #[error("corrupted state: {0}")]
    CorruptedState(String),

    /// Serialized session record bytes could not be parsed.
    #[error("invalid session record: {0}")]
    InvalidRecord(String),

    /// An operation on a session record was not valid for its contents.
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// A device id outside the representable range.
    #[error("invalid device id: {0}")]
    InvalidDeviceId(i64),

    /// A thread panicked while holding the store lock.
    #[error("store lock poisoned")]
    LockPoisoned,
}

#[cfg(feature = "sqlite")]
impl From<storage::RusqliteError> for SessionStoreError {
    fn from(e: storage::RusqliteError) -> Self {
        SessionStoreError::Storage(e.into())
    }
}

pub type Result<T> = std::result::Result<T, SessionStoreError>;
