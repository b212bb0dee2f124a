//! Durable storage of per-device session records for an end-to-end
//! encrypted messaging engine.
//!
//! Every remote endpoint is a [`PeerAddress`]: a name plus a device id. For
//! each address the protocol engine keeps a [`SessionRecord`] that must
//! survive restarts. This crate defines the contract for storing those
//! records and ships two backends.
//!
//! # Main API
//!
//! - [`SessionStore`] - The store contract; implement it for custom backends
//! - [`MemorySessionStore`] - In-memory backend for tests
//! - [`SqliteSessionStore`] - SQLite backend with field-level encryption
//! - [`SessionTransaction`] / [`AddressLocks`] - Locked load, mutate, commit
//!
//! # Features
//!
//! - `sqlite` (default) - Enables [`SqliteSessionStore`] with `rusqlite/bundled`
//! - `sqlcipher` - Enables SQLCipher full-database encryption through
//!   [`StorageConfig::Encrypted`] and `SqliteSessionStore::open_encrypted`
//!
//! # Consistency
//!
//! Loads return owned copies. A loaded record changes nothing in the store
//! until it is committed with [`SessionStore::store_session`]. The store is
//! last-writer-wins per address, so callers that load, mutate and store must
//! hold the address lock across that span.
//!
//! # Example
//!
//! ```no_run
//! use session_store::{PeerAddress, SessionState, SessionStore, SqliteSessionStore};
//!
//! let encryption_key = [0u8; 32]; // Use proper key derivation!
//! let store = SqliteSessionStore::open("sessions.db", encryption_key).unwrap();
//!
//! let address = PeerAddress::new("alice", 1);
//! let mut record = store.load_session(&address).unwrap();
//! record.set_current_state(SessionState::new(b"ratchet state".to_vec()));
//! store.store_session(&address, &record).unwrap();
//!
//! let targets: Vec<PeerAddress> = store
//!     .get_sub_device_sessions("alice")
//!     .unwrap()
//!     .into_iter()
//!     .map(|device| PeerAddress::new("alice", device.get()))
//!     .collect();
//! let records = store.load_existing_sessions(&targets).unwrap();
//! assert_eq!(records.len(), targets.len());
//! ```

pub mod address;
pub mod error;
pub mod locks;
pub mod memory;
mod reader;
pub mod record;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;
pub mod transaction;


// Re-exports for convenience
pub use address::{DeviceId, PeerAddress};
pub use error::SessionStoreError;
pub use locks::{AddressGuard, AddressLocks};
pub use memory::MemorySessionStore;
pub use record::{ARCHIVED_STATES_MAX_LENGTH, SessionRecord, SessionState};
#[cfg(feature = "sqlite")]
pub use sqlite::{EncryptionKey, SqliteSessionStore};
#[cfg(feature = "sqlite")]
pub use storage::StorageConfig;
pub use traits::SessionStore;
pub use transaction::SessionTransaction;
