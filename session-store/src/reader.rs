use crate::error::SessionStoreError;

/// Cursor over serialized record bytes. Every read is bounds checked.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], SessionStoreError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                SessionStoreError::InvalidRecord(format!(
                    "truncated: wanted {} bytes at offset {}, have {}",
                    n,
                    self.pos,
                    self.data.len()
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], SessionStoreError> {
        self.read_bytes(N)?
            .try_into()
            .map_err(|_| SessionStoreError::InvalidRecord("short array".into()))
    }

    pub fn read_u8(&mut self) -> Result<u8, SessionStoreError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, SessionStoreError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Reads a `u32` big-endian length followed by that many bytes.
    pub fn read_prefixed(&mut self) -> Result<&'a [u8], SessionStoreError> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    /// Fails if any input is left unread.
    pub fn finish(self) -> Result<(), SessionStoreError> {
        let remaining = self.data.len() - self.pos;
        if remaining != 0 {
            return Err(SessionStoreError::InvalidRecord(format!(
                "{} trailing bytes",
                remaining
            )));
        }
        Ok(())
    }
}
