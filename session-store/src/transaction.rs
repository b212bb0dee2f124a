//! Locked load, mutate, commit over a [`SessionStore`].

use crate::address::PeerAddress;
use crate::error::{Result, SessionStoreError};
use crate::locks::{AddressGuard, AddressLocks};
use crate::record::SessionRecord;
use crate::traits::SessionStore;

/// A session record checked out of a store under its address lock.
///
/// Changes go to a private copy. [`commit`](Self::commit) writes it back;
/// dropping the transaction instead discards every change. The address stays
/// locked for the lifetime of the transaction.
pub struct SessionTransaction<'a, S: SessionStore + ?Sized> {
    store: &'a S,
    address: PeerAddress,
    record: SessionRecord,
    is_new: bool,
    _guard: AddressGuard<'a>,
}

impl<'a, S: SessionStore + ?Sized> SessionTransaction<'a, S> {
    /// Locks `address` and loads its record, or a fresh one if none exists.
    pub fn begin(store: &'a S, locks: &'a AddressLocks, address: PeerAddress) -> Result<Self> {
        let guard = locks.lock(&address);
        let (record, is_new) = match store.get_session(&address)? {
            Some(record) => (record, false),
            None => (SessionRecord::new_fresh(), true),
        };
        Ok(Self {
            store,
            address,
            record,
            is_new,
            _guard: guard,
        })
    }

    /// Locks `address` and loads its record, failing if none exists.
    pub fn begin_existing(
        store: &'a S,
        locks: &'a AddressLocks,
        address: PeerAddress,
    ) -> Result<Self> {
        let tx = Self::begin(store, locks, address)?;
        if tx.is_new {
            return Err(SessionStoreError::NoSession {
                address: tx.address.clone(),
            });
        }
        Ok(tx)
    }

    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    /// Whether the store had no record when the transaction began.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut SessionRecord {
        &mut self.record
    }

    /// Stores the record and releases the address.
    pub fn commit(self) -> Result<()> {
        self.store.store_session(&self.address, &self.record)
    }
}

/// Runs `f` on the record for `address` while holding its lock, and commits
/// the result only if `f` succeeds.
///
/// ```
/// use session_store::{
///     AddressLocks, MemorySessionStore, PeerAddress, SessionState, SessionStore, SessionStoreError,
/// };
/// use session_store::transaction::update;
///
/// let store = MemorySessionStore::new();
/// let locks = AddressLocks::new();
/// let address = PeerAddress::new("alice", 1);
///
/// update(&store, &locks, &address, |record| {
///     record.set_current_state(SessionState::new(vec![1, 2, 3]));
///     Ok::<_, SessionStoreError>(())
/// })
/// .unwrap();
///
/// assert!(store.contains_session(&address).unwrap());
/// ```
pub fn update<S, T, E, F>(
    store: &S,
    locks: &AddressLocks,
    address: &PeerAddress,
    f: F,
) -> std::result::Result<T, E>
where
    S: SessionStore + ?Sized,
    E: From<SessionStoreError>,
    F: FnOnce(&mut SessionRecord) -> std::result::Result<T, E>,
{
    let mut tx = SessionTransaction::begin(store, locks, address.clone())?;
    let value = f(tx.record_mut())?;
    tx.commit()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySessionStore;
    use crate::record::SessionState;

    fn counter(record: &SessionRecord) -> u32 {
        record
            .current_state()
            .map(|s| u32::from_be_bytes(s.as_bytes().try_into().unwrap()))
            .unwrap_or(0)
    }

    fn increment(record: &mut SessionRecord) {
        let next = counter(record) + 1;
        record.set_current_state(SessionState::new(next.to_be_bytes().to_vec()));
    }

    #[test]
    fn test_commit_persists() {
        let store = MemorySessionStore::new();
        let locks = AddressLocks::new();
        let address = PeerAddress::new("alice", 1);

        let mut tx = SessionTransaction::begin(&store, &locks, address.clone()).unwrap();
        assert!(tx.is_new());
        increment(tx.record_mut());
        tx.commit().unwrap();

        assert_eq!(counter(&store.load_session(&address).unwrap()), 1);
        assert!(!locks.is_locked(&address));
    }

    #[test]
    fn test_drop_discards_changes() {
        let store = MemorySessionStore::new();
        let locks = AddressLocks::new();
        let address = PeerAddress::new("alice", 1);

        {
            let mut tx = SessionTransaction::begin(&store, &locks, address.clone()).unwrap();
            increment(tx.record_mut());
            assert!(locks.is_locked(&address));
        }

        assert!(!store.contains_session(&address).unwrap());
        assert!(!locks.is_locked(&address));
    }

    #[test]
    fn test_begin_existing_requires_session() {
        let store = MemorySessionStore::new();
        let locks = AddressLocks::new();
        let address = PeerAddress::new("alice", 1);

        let result = SessionTransaction::begin_existing(&store, &locks, address.clone());
        assert!(matches!(result, Err(SessionStoreError::NoSession { .. })));
        // The failed attempt released the lock.
        assert!(!locks.is_locked(&address));

        store
            .store_session(&address, &SessionRecord::new_fresh())
            .unwrap();
        let tx = SessionTransaction::begin_existing(&store, &locks, address).unwrap();
        assert!(!tx.is_new());
    }

    #[test]
    fn test_update_skips_commit_on_error() {
        let store = MemorySessionStore::new();
        let locks = AddressLocks::new();
        let address = PeerAddress::new("alice", 1);
        store
            .store_session(&address, &SessionRecord::new(SessionState::new(vec![0, 0, 0, 5])))
            .unwrap();

        let result: std::result::Result<(), SessionStoreError> =
            update(&store, &locks, &address, |record| {
                increment(record);
                Err(SessionStoreError::InvalidState("decrypt failed".into()))
            });

        assert!(result.is_err());
        assert_eq!(counter(&store.load_session(&address).unwrap()), 5);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let store = MemorySessionStore::new();
        let locks = AddressLocks::new();
        let address = PeerAddress::new("alice", 1);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        update(&store, &locks, &address, |record| {
                            increment(record);
                            Ok::<_, SessionStoreError>(())
                        })
                        .unwrap();
                    }
                });
            }
        });

        assert_eq!(counter(&store.load_session(&address).unwrap()), 200);
    }
}
