//! The session store contract.

use std::sync::Arc;

use crate::address::{DeviceId, PeerAddress};
use crate::error::{Result, SessionStoreError};
use crate::record::SessionRecord;

/// The durable store of session state for remote devices.
///
/// Implementations must be thread-safe (`Send + Sync`) and make each
/// single-address operation atomic: a concurrent reader of an address sees
/// either the record before a [`store_session`](Self::store_session) or the
/// one after, never a mix.
///
/// # Copy semantics
///
/// Every record returned is an owned copy of the durable one. Changes made to
/// it are invisible to other callers until committed with `store_session`.
///
/// # Caller obligation
///
/// The store is last-writer-wins. Two flows that load the same address,
/// mutate their copies and both commit will lose one update. Callers must
/// serialize the load, mutate, store span per address, for example with
/// [`AddressLocks`](crate::AddressLocks) or
/// [`SessionTransaction`](crate::SessionTransaction).
///
/// # Errors
///
/// Absence is not an error, except for
/// [`load_existing_sessions`](Self::load_existing_sessions). Backend
/// failures are always returned, never reported as a missing session.
pub trait SessionStore: Send + Sync {
    /// Returns a copy of the durable record for `address`, or `None` if there
    /// is none.
    fn get_session(&self, address: &PeerAddress) -> Result<Option<SessionRecord>>;

    /// Commits `record` as the new state for `address`, replacing any
    /// previous record.
    fn store_session(&self, address: &PeerAddress, record: &SessionRecord) -> Result<()>;

    /// Whether a durable record exists for `address`.
    fn contains_session(&self, address: &PeerAddress) -> Result<bool>;

    /// Removes the record for `address`. Removing a missing record succeeds.
    fn delete_session(&self, address: &PeerAddress) -> Result<()>;

    /// Removes the records for every device of `name`.
    fn delete_all_sessions(&self, name: &str) -> Result<()>;

    /// Device ids of `name` that have a durable record.
    ///
    /// Order is backend specific and callers must not rely on it.
    fn get_sub_device_sessions(&self, name: &str) -> Result<Vec<DeviceId>>;

    /// Returns a copy of the durable record for `address`, or a fresh record
    /// if there is none.
    fn load_session(&self, address: &PeerAddress) -> Result<SessionRecord> {
        Ok(self
            .get_session(address)?
            .unwrap_or_else(SessionRecord::new_fresh))
    }

    /// Returns the records for `addresses`, in the same order.
    ///
    /// Every address must already have a durable record. The call fails with
    /// [`SessionStoreError::NoSession`] naming the first address without one,
    /// and no records are returned.
    fn load_existing_sessions(&self, addresses: &[PeerAddress]) -> Result<Vec<SessionRecord>> {
        addresses
            .iter()
            .map(|address| match self.get_session(address)? {
                Some(record) => Ok(record),
                None => {
                    tracing::warn!(%address, "required session is missing");
                    Err(SessionStoreError::NoSession {
                        address: address.clone(),
                    })
                }
            })
            .collect()
    }
}

impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    fn get_session(&self, address: &PeerAddress) -> Result<Option<SessionRecord>> {
        (**self).get_session(address)
    }

    fn store_session(&self, address: &PeerAddress, record: &SessionRecord) -> Result<()> {
        (**self).store_session(address, record)
    }

    fn contains_session(&self, address: &PeerAddress) -> Result<bool> {
        (**self).contains_session(address)
    }

    fn delete_session(&self, address: &PeerAddress) -> Result<()> {
        (**self).delete_session(address)
    }

    fn delete_all_sessions(&self, name: &str) -> Result<()> {
        (**self).delete_all_sessions(name)
    }

    fn get_sub_device_sessions(&self, name: &str) -> Result<Vec<DeviceId>> {
        (**self).get_sub_device_sessions(name)
    }
}

impl<S: SessionStore + ?Sized> SessionStore for &S {
    fn get_session(&self, address: &PeerAddress) -> Result<Option<SessionRecord>> {
        (**self).get_session(address)
    }

    fn store_session(&self, address: &PeerAddress, record: &SessionRecord) -> Result<()> {
        (**self).store_session(address, record)
    }

    fn contains_session(&self, address: &PeerAddress) -> Result<bool> {
        (**self).contains_session(address)
    }

    fn delete_session(&self, address: &PeerAddress) -> Result<()> {
        (**self).delete_session(address)
    }

    fn delete_all_sessions(&self, name: &str) -> Result<()> {
        (**self).delete_all_sessions(name)
    }

    fn get_sub_device_sessions(&self, name: &str) -> Result<Vec<DeviceId>> {
        (**self).get_sub_device_sessions(name)
    }
}
