//! In-memory session store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::address::{DeviceId, PeerAddress};
use crate::error::{Result, SessionStoreError};
use crate::record::SessionRecord;
use crate::traits::SessionStore;

type DeviceSessions = BTreeMap<DeviceId, SessionRecord>;

/// In-memory storage backend, mostly for tests.
///
/// Records are kept per name, then per device, behind one `RwLock`. Records
/// are cloned on the way in and on the way out. Data is not persisted across
/// process restarts.
///
/// [`get_sub_device_sessions`](SessionStore::get_sub_device_sessions)
/// returns device ids in ascending order.
///
/// # Example
///
/// ```
/// use session_store::{MemorySessionStore, PeerAddress, SessionStore};
///
/// let store = MemorySessionStore::new();
/// let record = store.load_session(&PeerAddress::new("alice", 1)).unwrap();
/// assert!(record.is_fresh());
/// ```
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, DeviceSessions>>,
}

impl MemorySessionStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions across all names.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.values().map(BTreeMap::len).sum())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    /// Remove every stored session.
    pub fn clear(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, DeviceSessions>>> {
        self.sessions
            .read()
            .map_err(|_| SessionStoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, DeviceSessions>>> {
        self.sessions
            .write()
            .map_err(|_| SessionStoreError::LockPoisoned)
    }
}

impl SessionStore for MemorySessionStore {
    fn get_session(&self, address: &PeerAddress) -> Result<Option<SessionRecord>> {
        let sessions = self.read()?;
        Ok(sessions
            .get(address.name())
            .and_then(|devices| devices.get(&address.device_id()))
            .cloned())
    }

    fn store_session(&self, address: &PeerAddress, record: &SessionRecord) -> Result<()> {
        let mut sessions = self.write()?;
        sessions
            .entry(address.name().to_string())
            .or_default()
            .insert(address.device_id(), record.clone());
        tracing::debug!(%address, "stored session");
        Ok(())
    }

    fn contains_session(&self, address: &PeerAddress) -> Result<bool> {
        let sessions = self.read()?;
        Ok(sessions
            .get(address.name())
            .is_some_and(|devices| devices.contains_key(&address.device_id())))
    }

    fn delete_session(&self, address: &PeerAddress) -> Result<()> {
        let mut sessions = self.write()?;
        if let Some(devices) = sessions.get_mut(address.name()) {
            if devices.remove(&address.device_id()).is_some() {
                tracing::debug!(%address, "deleted session");
            }
            if devices.is_empty() {
                sessions.remove(address.name());
            }
        }
        Ok(())
    }

    fn delete_all_sessions(&self, name: &str) -> Result<()> {
        let mut sessions = self.write()?;
        if let Some(devices) = sessions.remove(name) {
            tracing::debug!(name, count = devices.len(), "deleted all sessions");
        }
        Ok(())
    }

    fn get_sub_device_sessions(&self, name: &str) -> Result<Vec<DeviceId>> {
        let sessions = self.read()?;
        Ok(sessions
            .get(name)
            .map(|devices| devices.keys().copied().collect())
            .unwrap_or_default())
    }
}
