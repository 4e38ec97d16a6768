use snafu::Snafu;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use zerocopy::byteorder::big_endian::{U32, U64};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ItemError {
    #[snafu(display("source buffer is too short"))]
    SourceTooShort,
}

type Result<T, E = ItemError> = std::result::Result<T, E>;

/// Decrypted 32-byte descriptor from the item index.
///
/// `name_offset` and `data_offset` are relative to the start of the
/// encrypted region.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub(crate) struct ItemEntryRaw {
    name_offset: U32, // 0x00
    name_size: U32,   // 0x04
    data_offset: U64, // 0x08
    data_size: U64,   // 0x10
    flags: U32,       // 0x18 - item kind in the low byte
    padding: U32,     // 0x1C
}

#[derive(Debug, Clone, Copy)]
#[must_use]
pub struct ItemEntry {
    raw_entry: ItemEntryRaw,
}

impl ItemEntry {
    pub const RAW_SIZE: usize = size_of::<ItemEntryRaw>();

    /// Reads an item descriptor from decrypted bytes.
    pub fn read(raw: &[u8]) -> Result<Self> {
        let (raw_entry, _) =
            ItemEntryRaw::read_from_prefix(raw).map_err(|_| SourceTooShortSnafu.build())?;

        Ok(Self { raw_entry })
    }

    /// Returns the name offset within the encrypted region.
    #[must_use]
    pub const fn name_offset(&self) -> u32 {
        self.raw_entry.name_offset.get()
    }

    /// Returns the name size in bytes.
    #[must_use]
    pub const fn name_size(&self) -> u32 {
        self.raw_entry.name_size.get()
    }

    /// Returns the payload offset within the encrypted region.
    #[must_use]
    pub const fn data_offset(&self) -> u64 {
        self.raw_entry.data_offset.get()
    }

    /// Returns the payload size in bytes.
    #[must_use]
    pub const fn data_size(&self) -> u64 {
        self.raw_entry.data_size.get()
    }

    /// Returns the parsed item kind.
    #[must_use]
    pub const fn kind(&self) -> ItemKind {
        ItemKind::from_flags(self.raw_entry.flags.get())
    }
}

/// What an item materializes as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// A directory; no payload bytes are written.
    Directory,
    /// A marker entry with nothing on disk.
    Skip,
    /// A regular file.
    File,
}

impl ItemKind {
    const DIRECTORY: u32 = 4;
    const SKIP: u32 = 18;

    /// Parses the kind out of the descriptor flag word.
    #[must_use]
    pub const fn from_flags(flags: u32) -> Self {
        match flags & 0xFF {
            Self::DIRECTORY => Self::Directory,
            Self::SKIP => Self::Skip,
            _ => Self::File,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_descriptor_fields() {
        let mut raw = [0u8; ItemEntry::RAW_SIZE];
        raw[0..4].copy_from_slice(&0x120u32.to_be_bytes());
        raw[4..8].copy_from_slice(&14u32.to_be_bytes());
        raw[8..16].copy_from_slice(&0x400u64.to_be_bytes());
        raw[16..24].copy_from_slice(&1000u64.to_be_bytes());
        raw[27] = 4;

        let entry = ItemEntry::read(&raw).unwrap();
        assert_eq!(entry.name_offset(), 0x120);
        assert_eq!(entry.name_size(), 14);
        assert_eq!(entry.data_offset(), 0x400);
        assert_eq!(entry.data_size(), 1000);
        assert_eq!(entry.kind(), ItemKind::Directory);
    }

    #[test]
    fn classifies_kinds() {
        assert_eq!(ItemKind::from_flags(4), ItemKind::Directory);
        assert_eq!(ItemKind::from_flags(18), ItemKind::Skip);
        assert_eq!(ItemKind::from_flags(0), ItemKind::File);
        assert_eq!(ItemKind::from_flags(3), ItemKind::File);
        // Only the low byte carries the kind.
        assert_eq!(ItemKind::from_flags(0xFFFF_FF00 | 18), ItemKind::Skip);
    }

    #[test]
    fn rejects_short_input() {
        assert!(matches!(
            ItemEntry::read(&[0u8; 16]),
            Err(ItemError::SourceTooShort)
        ));
    }
}
