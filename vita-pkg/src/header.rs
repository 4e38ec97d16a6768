use std::fmt;

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::big_endian::{U16, U32, U64},
};

/// Errors when reading a PKG header.
#[derive(Debug, snafu::Snafu)]
#[non_exhaustive]
pub enum ReadError {
    #[snafu(display("package head is too small"))]
    TooSmall,

    #[snafu(display("invalid PKG magic"))]
    InvalidMagic,

    #[snafu(display("invalid PKG extended header magic"))]
    InvalidExtMagic,
}

type Result<T, E = ReadError> = std::result::Result<T, E>;

/// Size of the fixed header at the start of every package.
pub const PKG_HEADER_SIZE: usize = 0xC0;

/// Size of the extended header that immediately follows the fixed one.
pub const PKG_HEADER_EXT_SIZE: usize = 0x40;

const PKG_MAGIC: u32 = 0x7F50_4B47;
const PKG_EXT_MAGIC: u32 = 0x7F65_7874;

#[derive(Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct PkgHeaderRaw {
    pub pkg_magic: U32,              // 0x000 - 0x7F504B47
    pub pkg_revision: U16,           // 0x004
    pub pkg_type: U16,               // 0x006
    pub pkg_meta_offset: U32,        // 0x008 - metadata table offset
    pub pkg_meta_count: U32,         // 0x00C
    pub pkg_meta_size: U32,          // 0x010
    pub pkg_item_count: U32,         // 0x014 - entries in the item index
    pub pkg_total_size: U64,         // 0x018 - size of the whole package
    pub pkg_enc_offset: U64,         // 0x020 - start of the encrypted region
    pub pkg_enc_size: U64,           // 0x028 - length of the encrypted region
    pub pkg_content_id: ContentId,   // 0x030 - zero padded to 0x30 bytes
    pub pkg_digest: [u8; 0x10],      // 0x060
    pub pkg_iv: [u8; 0x10],          // 0x070 - AES-CTR initial counter
    pub pkg_header_sigs: [u8; 0x40], // 0x080
}

/// Extended header (0x0C0 - 0x100).
#[derive(Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct PkgExtHeaderRaw {
    pub ext_magic: U32,               // 0x0C0 - 0x7F657874
    pub ext_unknown: U32,             // 0x0C4
    pub ext_header_size: U32,         // 0x0C8
    pub ext_data_size: U32,           // 0x0CC
    pub ext_hmac_offset: U32,         // 0x0D0
    pub ext_meta_hmac_offset: U32,    // 0x0D4
    pub ext_tail_offset: U64,         // 0x0D8
    pub ext_padding_0xe0: U32,        // 0x0E0
    pub ext_key_id: U32,              // 0x0E4 - low three bits select the key derivation
    pub ext_full_hmac_offset: U32,    // 0x0E8
    pub ext_padding_0xec: [u8; 0x14], // 0x0EC
}

/// Content ID field (0x30 bytes: 36-character identifier, zero padded).
///
/// Format: `<service_id><publisher>-<title_id>_<version>-<label>`
/// Example: `UP0102-PCSA00042_00-EXAMPLELABEL0000`
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromBytes, IntoBytes, KnownLayout,
    Immutable, Unaligned,
)]
#[repr(C)]
pub struct ContentId {
    /// Service ID (2 bytes): "UP", "EP", "JP", etc.
    service_id: [u8; 2],
    /// Publisher code (4 bytes): e.g., "0102"
    publisher_code: [u8; 4],
    /// Separator (1 byte): "-"
    _sep1: u8,
    /// Title ID (9 bytes): e.g., "PCSA00042"
    title_id: [u8; 9],
    /// Separator (1 byte): "_"
    _sep2: u8,
    /// Content version (2 bytes): e.g., "00"
    version: [u8; 2],
    /// Separator (1 byte): "-"
    _sep3: u8,
    /// Content label (16 bytes)
    label: [u8; 16],
    /// Zero padding up to the 0x30-byte field size
    padding: [u8; 12],
}

impl ContentId {
    /// Returns the service ID (e.g., "UP", "EP", "JP").
    #[must_use]
    pub fn service_id(&self) -> &str {
        std::str::from_utf8(&self.service_id).unwrap_or("")
    }

    /// Returns the publisher code (e.g., "0102").
    #[must_use]
    pub fn publisher_code(&self) -> &str {
        std::str::from_utf8(&self.publisher_code).unwrap_or("")
    }

    /// Returns the title ID (e.g., "PCSA00042").
    #[must_use]
    pub fn title_id(&self) -> &str {
        std::str::from_utf8(&self.title_id).unwrap_or("")
    }

    /// Returns the content version (e.g., "00").
    #[must_use]
    pub fn version(&self) -> &str {
        std::str::from_utf8(&self.version).unwrap_or("")
    }

    /// Returns the content label.
    #[must_use]
    pub fn label(&self) -> &str {
        let bytes = &self.label;
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..len]).unwrap_or("")
    }

    /// Returns the full content ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        let bytes = self.as_bytes();
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..len]).unwrap_or("<invalid>")
    }

    /// Returns the full 0x30-byte field as stored on the wire, padding included.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentId")
            .field("service_id", &self.service_id())
            .field("title_id", &self.title_id())
            .field("label", &self.label())
            .finish()
    }
}

/// Parsed package header information.
#[derive(Debug)]
#[must_use]
pub struct PkgHeader {
    raw_header: PkgHeaderRaw,
    ext_header: PkgExtHeaderRaw,
}

impl PkgHeader {
    /// Parses the fixed and extended headers from the package prolog.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is shorter than both headers or either
    /// magic number is wrong.
    pub fn read(head: &[u8]) -> Result<Self> {
        // Check size first so we can read without checking bound.
        snafu::ensure!(head.len() >= PKG_HEADER_SIZE + PKG_HEADER_EXT_SIZE, TooSmallSnafu);

        let (raw_header, rest) =
            PkgHeaderRaw::read_from_prefix(head).map_err(|_| TooSmallSnafu.build())?;
        let (ext_header, _) =
            PkgExtHeaderRaw::read_from_prefix(rest).map_err(|_| TooSmallSnafu.build())?;

        snafu::ensure!(raw_header.pkg_magic.get() == PKG_MAGIC, InvalidMagicSnafu);
        snafu::ensure!(
            ext_header.ext_magic.get() == PKG_EXT_MAGIC,
            InvalidExtMagicSnafu
        );

        Ok(Self {
            raw_header,
            ext_header,
        })
    }

    /// Returns the offset of the metadata table.
    #[must_use]
    pub const fn meta_offset(&self) -> u32 {
        self.raw_header.pkg_meta_offset.get()
    }

    /// Returns the number of metadata records.
    #[must_use]
    pub const fn meta_count(&self) -> u32 {
        self.raw_header.pkg_meta_count.get()
    }

    /// Returns the number of entries in the item index.
    #[must_use]
    pub const fn item_count(&self) -> u32 {
        self.raw_header.pkg_item_count.get()
    }

    /// Returns the total package size in bytes.
    #[must_use]
    pub const fn total_size(&self) -> u64 {
        self.raw_header.pkg_total_size.get()
    }

    /// Returns the offset of the encrypted region.
    #[must_use]
    pub const fn enc_offset(&self) -> u64 {
        self.raw_header.pkg_enc_offset.get()
    }

    /// Returns the size of the encrypted region.
    #[must_use]
    pub const fn enc_size(&self) -> u64 {
        self.raw_header.pkg_enc_size.get()
    }

    /// Returns the content ID.
    #[must_use]
    pub fn content_id(&self) -> &ContentId {
        &self.raw_header.pkg_content_id
    }

    /// Returns the AES-CTR initial counter.
    #[must_use]
    pub const fn iv(&self) -> &[u8; 0x10] {
        &self.raw_header.pkg_iv
    }

    /// Returns the key-type selector (low three bits of the key ID word).
    #[must_use]
    pub const fn key_type(&self) -> u8 {
        (self.ext_header.ext_key_id.get() & 7) as u8
    }
}
