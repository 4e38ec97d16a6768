//! A library for parsing PlayStation Vita PKG containers.
//!
//! This crate covers the container format itself: the fixed and extended
//! headers, the plaintext metadata table, the encrypted item index, the
//! per-package key derivation, and the AES-128-CTR keystream used for the
//! encrypted region. It holds no I/O; callers feed it bytes in whatever
//! way suits them (the `vita-pkg-dl` crate streams them over HTTP).
//!
//! # Layout of a package
//!
//! ```text
//! [fixed header 0xC0][ext header 0x40][meta table ...][encrypted region][tail]
//!                                                      ^ item index, names, payloads
//! ```
//!
//! All integers are big-endian. Offsets inside the encrypted region
//! (item names and payloads) are relative to `enc_offset`, and so are the
//! CTR counter offsets: the keystream block for a byte is the header IV
//! plus the byte's block index within the region.
//!
//! # Example
//!
//! ```no_run
//! use vita_pkg::{PkgCipher, PkgHeader, keys};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let head = std::fs::read("head.bin")?;
//! let header = PkgHeader::read(&head)?;
//! println!("Content ID: {}", header.content_id());
//!
//! let key = keys::derive_key(header.key_type(), header.iv())?;
//! let cipher = PkgCipher::new(&key, header.iv());
//! # let _ = cipher;
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod header;
pub mod item;
pub mod keys;
pub mod meta;

pub use self::crypto::{AES_BLOCK_SIZE, PkgCipher};
pub use self::header::{ContentId, PKG_HEADER_EXT_SIZE, PKG_HEADER_SIZE, PkgHeader};
pub use self::item::{ItemEntry, ItemKind};
pub use self::meta::{ContentCategory, MetaInfo};
