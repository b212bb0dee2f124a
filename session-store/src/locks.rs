//! Per-address mutual exclusion for the load, mutate, store span.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::address::PeerAddress;

/// A table of per-address locks.
///
/// Holding the lock for an address while loading, mutating and storing its
/// record prevents lost updates between concurrent flows. Waiting for one
/// address never waits on a lock held for another.
///
/// ```
/// use session_store::{AddressLocks, PeerAddress};
///
/// let locks = AddressLocks::new();
/// let address = PeerAddress::new("alice", 1);
///
/// let guard = locks.lock(&address);
/// assert!(locks.try_lock(&address).is_none());
/// drop(guard);
/// assert!(locks.try_lock(&address).is_some());
/// ```
#[derive(Debug, Default)]
pub struct AddressLocks {
    held: Mutex<HashSet<PeerAddress>>,
    released: Condvar,
}

impl AddressLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `address` is free, then holds it until the guard drops.
    pub fn lock(&self, address: &PeerAddress) -> AddressGuard<'_> {
        let held = self.held();
        let mut held = self
            .released
            .wait_while(held, |held| held.contains(address))
            .unwrap_or_else(PoisonError::into_inner);
        held.insert(address.clone());
        tracing::trace!(%address, "address locked");
        AddressGuard {
            locks: self,
            address: address.clone(),
        }
    }

    /// Takes the lock for `address` only if nobody holds it.
    pub fn try_lock(&self, address: &PeerAddress) -> Option<AddressGuard<'_>> {
        let mut held = self.held();
        if !held.insert(address.clone()) {
            return None;
        }
        Some(AddressGuard {
            locks: self,
            address: address.clone(),
        })
    }

    pub fn is_locked(&self, address: &PeerAddress) -> bool {
        self.held().contains(address)
    }

    // The set is only touched by single insert/remove calls, so a panic
    // elsewhere cannot leave it inconsistent.
    fn held(&self) -> MutexGuard<'_, HashSet<PeerAddress>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive hold on one address. Released on drop.
#[derive(Debug)]
pub struct AddressGuard<'a> {
    locks: &'a AddressLocks,
    address: PeerAddress,
}

impl AddressGuard<'_> {
    pub fn address(&self) -> &PeerAddress {
        &self.address
    }
}

impl Drop for AddressGuard<'_> {
    fn drop(&mut self) {
        self.locks.held().remove(&self.address);
        self.locks.released.notify_all();
        tracing::trace!(address = %self.address, "address unlocked");
    }
}
