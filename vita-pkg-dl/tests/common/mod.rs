//! Shared fixtures: a synthetic package builder and an in-memory HTTP
//! source with scripted interruptions.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use vita_pkg::{PkgCipher, keys};
use vita_pkg_dl::{HttpError, HttpSource, RIF_SIZE};

/// A well-formed 36-character content ID.
pub const CONTENT_ID: &str = "UP0102-PCSA00042_00-EXAMPLELABEL0000";

const HEADER_PROLOG: usize = 0x100;
const META_OFFSET: usize = HEADER_PROLOG;

/// Slack between the end of the metadata table and the encrypted region,
/// as real packages have.
const META_SLACK: usize = 32;

pub struct TestItem {
    pub name: String,
    pub kind: u8,
    pub data: Vec<u8>,
}

impl TestItem {
    pub fn file(name: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            kind: 0,
            data,
        }
    }

    pub fn directory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: 4,
            data: Vec::new(),
        }
    }

    pub fn skip(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: 18,
            data: Vec::new(),
        }
    }
}

pub struct PkgBuilder {
    content_type: Option<u32>,
    key_type: u8,
    items: Vec<TestItem>,
    tail: Vec<u8>,
    index_size_record: bool,
    index_size_override: Option<u32>,
    region_padding: usize,
}

impl PkgBuilder {
    pub fn new(content_type: u32, key_type: u8) -> Self {
        Self {
            content_type: Some(content_type),
            key_type,
            items: Vec::new(),
            tail: b"trailing-plaintext-bytes".to_vec(),
            index_size_record: true,
            index_size_override: None,
            region_padding: 32,
        }
    }

    pub fn without_content_type(mut self) -> Self {
        self.content_type = None;
        self
    }

    pub fn without_index_size(mut self) -> Self {
        self.index_size_record = false;
        self
    }

    pub fn index_size_override(mut self, declared: u32) -> Self {
        self.index_size_override = Some(declared);
        self
    }

    pub fn item(mut self, item: TestItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn build(self) -> TestPkg {
        let iv: [u8; 16] = *b"\x00\x01\x02\x03\x04\x05\x06\x07\x08\x09\x0a\x0b\x0c\x0d\x0e\x0f";

        // Region layout: item index, names, then payloads in index order.
        let index_len = self.items.len() * 32;
        let mut name_offsets = Vec::new();
        let mut names_blob = Vec::new();
        for item in &self.items {
            name_offsets.push(index_len + names_blob.len());
            names_blob.extend_from_slice(item.name.as_bytes());
        }

        let payload_start = align16(index_len + names_blob.len());
        let mut cursor = payload_start;
        let mut item_offsets = Vec::new();
        for item in &self.items {
            item_offsets.push(cursor);
            if item.kind != 4 && item.kind != 18 {
                cursor += align16(item.data.len());
            }
        }
        let enc_size = cursor + self.region_padding;

        let mut region = vec![0u8; enc_size];
        for (i, item) in self.items.iter().enumerate() {
            let off = i * 32;
            region[off..off + 4].copy_from_slice(&(name_offsets[i] as u32).to_be_bytes());
            region[off + 4..off + 8].copy_from_slice(&(item.name.len() as u32).to_be_bytes());
            region[off + 8..off + 16].copy_from_slice(&(item_offsets[i] as u64).to_be_bytes());
            region[off + 16..off + 24].copy_from_slice(&(item.data.len() as u64).to_be_bytes());
            region[off + 24..off + 28].copy_from_slice(&(u32::from(item.kind)).to_be_bytes());
        }
        region[index_len..index_len + names_blob.len()].copy_from_slice(&names_blob);
        for (i, item) in self.items.iter().enumerate() {
            if item.kind != 4 && item.kind != 18 {
                region[item_offsets[i]..item_offsets[i] + item.data.len()]
                    .copy_from_slice(&item.data);
            }
        }

        let key = keys::derive_key(self.key_type, &iv).expect("builder key type");
        let cipher = PkgCipher::new(&key, &iv);
        cipher.encrypt_at(0, &mut region);

        // Metadata table.
        let mut meta = Vec::new();
        let mut meta_count = 0u32;
        if let Some(content_type) = self.content_type {
            meta.extend_from_slice(&2u32.to_be_bytes());
            meta.extend_from_slice(&4u32.to_be_bytes());
            meta.extend_from_slice(&content_type.to_be_bytes());
            meta_count += 1;
        }
        if self.index_size_record {
            let declared = self.index_size_override.unwrap_or(payload_start as u32);
            meta.extend_from_slice(&13u32.to_be_bytes());
            meta.extend_from_slice(&8u32.to_be_bytes());
            meta.extend_from_slice(&0u32.to_be_bytes());
            meta.extend_from_slice(&declared.to_be_bytes());
            meta_count += 1;
        }

        let enc_offset = META_OFFSET + meta.len() + META_SLACK;

        let mut bytes = vec![0u8; HEADER_PROLOG];
        bytes[0..4].copy_from_slice(&0x7F50_4B47u32.to_be_bytes());
        bytes[8..12].copy_from_slice(&(META_OFFSET as u32).to_be_bytes());
        bytes[12..16].copy_from_slice(&meta_count.to_be_bytes());
        bytes[20..24].copy_from_slice(&(self.items.len() as u32).to_be_bytes());
        bytes[32..40].copy_from_slice(&(enc_offset as u64).to_be_bytes());
        bytes[40..48].copy_from_slice(&(enc_size as u64).to_be_bytes());
        bytes[0x30..0x30 + CONTENT_ID.len()].copy_from_slice(CONTENT_ID.as_bytes());
        bytes[0x70..0x80].copy_from_slice(&iv);
        bytes[0xC0..0xC4].copy_from_slice(&0x7F65_7874u32.to_be_bytes());
        bytes[0xE4..0xE8].copy_from_slice(&u32::from(self.key_type).to_be_bytes());

        bytes.extend_from_slice(&meta);
        bytes.resize(enc_offset, 0);
        bytes.extend_from_slice(&region);
        bytes.extend_from_slice(&self.tail);

        let total_size = bytes.len() as u64;
        bytes[24..32].copy_from_slice(&total_size.to_be_bytes());

        let digest: [u8; 32] = Sha256::digest(&bytes).into();

        let mut rif = [0u8; RIF_SIZE];
        rif[0x10..0x40].copy_from_slice(&bytes[0x30..0x60]);

        TestPkg {
            bytes,
            digest,
            rif,
            enc_offset: enc_offset as u64,
            enc_size: enc_size as u64,
            first_item_offset: payload_start as u64,
            total_size,
        }
    }
}

pub struct TestPkg {
    pub bytes: Vec<u8>,
    pub digest: [u8; 32],
    pub rif: [u8; RIF_SIZE],
    pub enc_offset: u64,
    pub enc_size: u64,
    pub first_item_offset: u64,
    pub total_size: u64,
}

impl TestPkg {
    /// Bytes an uninterrupted run persists as `head.bin`.
    pub fn head_bytes(&self) -> &[u8] {
        &self.bytes[..(self.enc_offset + self.first_item_offset) as usize]
    }

    /// Bytes an uninterrupted run persists as `tail.bin`.
    pub fn tail_bytes(&self) -> &[u8] {
        &self.bytes[(self.enc_offset + self.enc_size) as usize..]
    }
}

fn align16(value: usize) -> usize {
    (value + 15) & !15
}

/// In-memory [`HttpSource`] with scripted interruption points.
pub struct MemorySource {
    data: Vec<u8>,
    pos: usize,
    started: usize,
    /// Largest read served in one call; odd on purpose so chunk
    /// boundaries wander across block and item boundaries.
    pub chunk: usize,
    /// Close the stream once when the position reaches this offset.
    pub close_at: Option<u64>,
    /// Raise the flag once when the position passes this offset.
    pub cancel_at: Option<(u64, Arc<AtomicBool>)>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            started: 0,
            chunk: 1900,
            close_at: None,
            cancel_at: None,
        }
    }
}

impl HttpSource for MemorySource {
    fn start(&mut self, _url: &str, offset: u64) -> Result<(), HttpError> {
        self.pos = offset as usize;
        self.started = self.pos;
        Ok(())
    }

    fn length(&self) -> Option<u64> {
        Some((self.data.len() - self.started) as u64)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, HttpError> {
        if let Some((at, flag)) = self.cancel_at.take() {
            if self.pos as u64 >= at {
                flag.store(true, Ordering::Relaxed);
            } else {
                self.cancel_at = Some((at, flag));
            }
        }

        let mut limit = self.data.len() - self.pos;
        if let Some(at) = self.close_at {
            if self.pos as u64 >= at {
                self.close_at = None;
                return Ok(0);
            }
            limit = limit.min((at - self.pos as u64) as usize);
        }

        let n = buf.len().min(self.chunk).min(limit);
        if n == 0 {
            return Ok(0);
        }
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Collects a staging tree as relative path -> contents, directories as
/// trailing-slash entries.
pub fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut out = BTreeMap::new();
    if root.exists() {
        walk(root, root, &mut out);
    }
    out
}

fn walk(dir: &Path, base: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let rel = path
            .strip_prefix(base)
            .unwrap()
            .to_string_lossy()
            .replace('\\', "/");
        if path.is_dir() {
            out.insert(format!("{rel}/"), Vec::new());
            walk(&path, base, out);
        } else {
            out.insert(rel, fs::read(&path).unwrap());
        }
    }
}
