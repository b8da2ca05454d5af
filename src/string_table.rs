use std::io::{self, Write};

/// Append-only pool for names longer than the 8-byte inline fields. The
/// serialised form is `[u32 size][bytes...]` where `size` counts its own four
/// prefix bytes, so the first interned string always sits at offset 4.
#[derive(Debug, Default)]
pub struct StringTable {
    data: Vec<u8>,
}

const SIZE_PREFIX_LEN: u32 = 4;

impl StringTable {
    pub fn new() -> StringTable {
        StringTable::default()
    }

    /// Appends `name` (plus its terminating null) and returns the offset it
    /// was written at. Duplicates are permitted; no deduplication happens.
    pub fn append(&mut self, name: &str) -> u32 {
        let offset = SIZE_PREFIX_LEN + self.data.len() as u32;
        self.data.extend_from_slice(name.as_bytes());
        self.data.push(0);
        offset
    }

    /// Returns the string written at `offset`, if any.
    pub fn get(&self, offset: u32) -> Option<&str> {
        let start = offset.checked_sub(SIZE_PREFIX_LEN)? as usize;
        let rest = self.data.get(start..)?;
        let end = rest.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&rest[..end]).ok()
    }

    pub fn data_len(&self) -> u32 {
        SIZE_PREFIX_LEN + self.data.len() as u32
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.data_len().to_le_bytes())?;
        w.write_all(&self.data)
    }
}
