//! The session record: everything needed to continue a ratchet with one
//! remote device.
//!
//! The ratchet state itself is opaque here. A record carries the live state
//! plus a bounded history of archived states, kept so that late messages
//! from an older session can still be decrypted.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as DeError};
use zeroize::Zeroizing;

use crate::error::SessionStoreError;
use crate::reader::Reader;

/// Maximum number of archived states kept in one record.
pub const ARCHIVED_STATES_MAX_LENGTH: usize = 40;

/// Current binary format version.
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// One serialized ratchet state, produced and consumed by the protocol engine.
///
/// Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionState(Zeroizing<Vec<u8>>);

impl SessionState {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionState({} bytes)", self.0.len())
    }
}

/// Durable state for one `(name, device)` session.
///
/// A record handed out by a store is an owned copy. Mutating it has no effect
/// on the store until it is passed back to
/// [`store_session`](crate::SessionStore::store_session).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionRecord {
    current: Option<SessionState>,
    // Newest first.
    previous: VecDeque<SessionState>,
}

impl SessionRecord {
    /// A record with no live and no archived state.
    pub fn new_fresh() -> Self {
        Self::default()
    }

    /// A record whose live state is `state`.
    pub fn new(state: SessionState) -> Self {
        Self {
            current: Some(state),
            previous: VecDeque::new(),
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.current.is_none() && self.previous.is_empty()
    }

    pub fn has_current_session(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_state(&self) -> Option<&SessionState> {
        self.current.as_ref()
    }

    /// Replaces the live state. The old live state, if any, is dropped, not
    /// archived.
    pub fn set_current_state(&mut self, state: SessionState) {
        self.current = Some(state);
    }

    /// Archived states, newest first.
    pub fn previous_states(&self) -> impl ExactSizeIterator<Item = &SessionState> {
        self.previous.iter()
    }

    /// Moves the live state to the front of the archive, evicting the oldest
    /// archived states past [`ARCHIVED_STATES_MAX_LENGTH`].
    pub fn archive_current_state(&mut self) {
        let Some(state) = self.current.take() else {
            return;
        };
        self.previous.push_front(state);
        self.previous.truncate(ARCHIVED_STATES_MAX_LENGTH);
    }

    /// Makes the archived state at `index` live again, archiving the current
    /// live state in its place.
    pub fn promote_old_state(&mut self, index: usize) -> Result<(), SessionStoreError> {
        let state = self.previous.remove(index).ok_or_else(|| {
            SessionStoreError::InvalidState(format!(
                "no archived state at index {} ({} archived)",
                index,
                self.previous.len()
            ))
        })?;
        self.archive_current_state();
        self.current = Some(state);
        Ok(())
    }

    /// Serializes the record.
    ///
    /// # Binary Format (Version 1)
    ///
    /// ```text
    /// | Field         | Size (bytes)  | Description                          |
    /// |---------------|---------------|--------------------------------------|
    /// | version       | 1             | Format version (0x01)                |
    /// | current_flag  | 1             | 0x00 = None, 0x01 = Some             |
    /// | current       | 0 or 4 + len  | Length-prefixed state if flag 0x01   |
    /// | prev_count    | 4             | Number of archived states            |
    /// | previous      | Σ (4 + len)   | Length-prefixed states, newest first |
    /// ```
    ///
    /// All integers are big-endian.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        fn write_prefixed(buf: &mut Vec<u8>, state: &SessionState) {
            buf.extend_from_slice(&(state.len() as u32).to_be_bytes());
            buf.extend_from_slice(state.as_bytes());
        }

        let capacity = 1
            + 1
            + self.current.as_ref().map_or(0, |s| 4 + s.len())
            + 4
            + self.previous.iter().map(|s| 4 + s.len()).sum::<usize>();

        let mut buf = Zeroizing::new(Vec::with_capacity(capacity));
        buf.push(RECORD_FORMAT_VERSION);

        match &self.current {
            Some(state) => {
                buf.push(0x01);
                write_prefixed(&mut buf, state);
            }
            None => buf.push(0x00),
        }

        buf.extend_from_slice(&(self.previous.len() as u32).to_be_bytes());
        for state in &self.previous {
            write_prefixed(&mut buf, state);
        }

        buf
    }

    /// Parses bytes produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(data: &[u8]) -> Result<Self, SessionStoreError> {
        let mut reader = Reader::new(data);

        let version = reader.read_u8()?;
        if version != RECORD_FORMAT_VERSION {
            return Err(SessionStoreError::InvalidRecord(format!(
                "unsupported version {}",
                version
            )));
        }

        let current = match reader.read_u8()? {
            0x00 => None,
            0x01 => Some(SessionState::new(reader.read_prefixed()?)),
            flag => {
                return Err(SessionStoreError::InvalidRecord(format!(
                    "invalid current flag {:#04x}",
                    flag
                )));
            }
        };

        let prev_count = reader.read_u32()? as usize;
        if prev_count > ARCHIVED_STATES_MAX_LENGTH {
            return Err(SessionStoreError::InvalidRecord(format!(
                "{} archived states exceeds limit of {}",
                prev_count, ARCHIVED_STATES_MAX_LENGTH
            )));
        }
        let mut previous = VecDeque::with_capacity(prev_count);
        for _ in 0..prev_count {
            previous.push_back(SessionState::new(reader.read_prefixed()?));
        }

        reader.finish()?;
        Ok(Self { current, previous })
    }
}

/// Serializes through the binary record format.
impl Serialize for SessionRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for SessionRecord {
    fn deserialize<De>(deserializer: De) -> Result<Self, De::Error>
    where
        De: Deserializer<'de>,
    {
        let bytes = Zeroizing::new(<Vec<u8>>::deserialize(deserializer)?);
        SessionRecord::from_bytes(&bytes).map_err(DeError::custom)
    }
}
