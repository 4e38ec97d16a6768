//! The streaming download session.
//!
//! A [`Download`] walks a package in one forward pass: it parses the head
//! into a fixed arena, decrypts the item index and names from it, streams
//! every payload straight from HTTP through AES-CTR to disk, consumes the
//! trailer, and verifies the whole stream against an expected SHA-256.
//! The digest is fed the raw wire bytes; decryption happens downstream of
//! it. Payloads must appear in ascending offset order, which the session
//! asserts before every file it creates.

mod error;

pub use self::error::DownloadError;

use self::error::*;

use crate::http::HttpSource;
use crate::progress::DownloadProgress;
use sha2::{Digest, Sha256};
use snafu::{OptionExt, ResultExt, ensure};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use vita_pkg::header::{PKG_HEADER_EXT_SIZE, PKG_HEADER_SIZE, PkgHeader};
use vita_pkg::item::{ItemEntry, ItemKind};
use vita_pkg::keys;
use vita_pkg::meta::{ContentCategory, MetaInfo};
use vita_pkg::{AES_BLOCK_SIZE, PkgCipher};

/// Capacity of the head arena; the package prefix up to the first item
/// payload must fit here.
const HEAD_CAPACITY: usize = 4 * 1024 * 1024;

/// Chunk size for streaming reads.
const CHUNK_SIZE: usize = 64 * 1024;

/// Longest accepted item name.
const MAX_NAME_SIZE: u32 = 255;

/// Size of a zRIF license blob.
pub const RIF_SIZE: usize = 512;

/// Size of the zeroed `stat.bin` artefact.
const STAT_SIZE: usize = 768;

/// Pace of the progress callbacks.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// How a finished `run` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Every artefact is staged and verified.
    Complete,
    /// The host canceled; the staged prefix is kept for resume.
    Canceled,
}

/// Stage result: cancellation is not an error, but it unwinds the stage.
enum Flow {
    Done,
    Canceled,
}

/// Layout fields parsed out of the package head.
#[derive(Debug, Clone, Copy)]
struct Layout {
    meta_offset: u32,
    meta_count: u32,
    index_count: u32,
    total_size: u64,
    enc_offset: u64,
    enc_size: u64,
    index_size: Option<u32>,
}

/// Everything the item and tail stages need from the head stage.
struct HeadInfo {
    layout: Layout,
    cipher: PkgCipher,
    category: Option<ContentCategory>,
}

/// HTTP and digest half of the session, split from the arena so stream
/// reads can borrow both at once.
struct Transfer<S, P> {
    http: S,
    http_active: bool,
    url: String,
    progress: P,
    cancel: Arc<AtomicBool>,
    sha: Sha256,
    download_offset: u64,
    download_size: u64,
    total_size: u64,
    info_update: Instant,
}

impl<S: HttpSource, P: DownloadProgress> Transfer<S, P> {
    /// Reads up to `buf.len()` bytes off the wire, feeding the digest and
    /// advancing the stream offset. `Ok(0)` means the host canceled.
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, DownloadError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Ok(0);
        }

        self.update_progress();

        if !self.http_active {
            debug!(url = %self.url, offset = self.download_offset, "requesting package");
            self.http
                .start(&self.url, self.download_offset)
                .context(HttpStartFailedSnafu)?;

            let length = self.http.length().context(UnknownLengthSnafu)?;
            self.download_size = self.download_offset + length;
            debug!(length, total = self.download_size, "response opened");

            self.http_active = true;
            self.info_update = Instant::now() + PROGRESS_INTERVAL;
        }

        let read = self.http.read(buf).context(HttpReadFailedSnafu)?;
        ensure!(read > 0, ConnectionClosedSnafu);

        self.sha.update(&buf[..read]);
        self.download_offset += read as u64;
        Ok(read)
    }

    fn update_progress(&mut self) {
        let now = Instant::now();
        if now >= self.info_update {
            let total = if self.total_size != 0 {
                self.total_size
            } else {
                self.download_size
            };
            self.progress.progress(self.download_offset, total);
            self.info_update = now + PROGRESS_INTERVAL;
        }
    }
}

/// A streaming PKG download session.
///
/// One session owns one staging directory. All resume state lives here:
/// calling [`run`](Self::run) again after an interruption continues from
/// the last confirmed stream offset and completes the staging tree as if
/// the download had never stopped. A fresh session re-downloads from
/// scratch, overwriting staged files with identical bytes.
pub struct Download<S, P = crate::progress::SilentProgress> {
    transfer: Transfer<S, P>,
    temp_root: PathBuf,
    root: PathBuf,
    head: Box<[u8]>,
    head_size: usize,
    down: Box<[u8]>,
    resume_offset: u64,
    item_file: Option<File>,
}

impl<S: HttpSource, P: DownloadProgress> Download<S, P> {
    /// Creates a session staging under `temp_root`.
    pub fn new(http: S, temp_root: impl Into<PathBuf>, progress: P) -> Self {
        Self {
            transfer: Transfer {
                http,
                http_active: false,
                url: String::new(),
                progress,
                cancel: Arc::new(AtomicBool::new(false)),
                sha: Sha256::new(),
                download_offset: 0,
                download_size: 0,
                total_size: 0,
                info_update: Instant::now(),
            },
            temp_root: temp_root.into(),
            root: PathBuf::new(),
            head: vec![0u8; HEAD_CAPACITY].into_boxed_slice(),
            head_size: 0,
            down: vec![0u8; CHUNK_SIZE].into_boxed_slice(),
            resume_offset: 0,
            item_file: None,
        }
    }

    /// Shared flag a host thread can set to stop the session at the next
    /// chunk boundary.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.transfer.cancel.clone()
    }

    /// Replaces the cancellation flag with one the host already shares.
    pub fn set_cancel_flag(&mut self, cancel: Arc<AtomicBool>) {
        self.transfer.cancel = cancel;
    }

    /// Absolute stream offset confirmed consumed; the resume point.
    #[must_use]
    pub fn resume_offset(&self) -> u64 {
        self.transfer.download_offset
    }

    /// Downloads and stages the package at `url` under
    /// `<temp_root>/<content_id>/`.
    ///
    /// `rif`, when supplied, must embed the package's content ID at bytes
    /// `0x10..0x40` and is persisted as `work.bin`. `expected_digest`,
    /// when supplied, is checked against the SHA-256 of the raw stream;
    /// on mismatch `head.bin` is deleted so a retry starts clean.
    pub fn run(
        &mut self,
        content_id: &str,
        url: &str,
        rif: Option<&[u8; RIF_SIZE]>,
        expected_digest: Option<&[u8; 32]>,
    ) -> Result<DownloadOutcome, DownloadError> {
        self.root = self.temp_root.join(content_id);
        info!(root = %self.root.display(), "staging package");

        self.transfer.url.clear();
        self.transfer.url.push_str(url);
        self.transfer.http_active = false;
        self.transfer.info_update = Instant::now() + Duration::from_millis(1000);
        self.transfer.progress.status("Downloading");

        self.resume_offset = self.transfer.download_offset;
        if self.resume_offset > 0 {
            info!(offset = self.resume_offset, "resuming download");
        }

        let result = self.run_inner(rif, expected_digest);
        // Whatever happened, the open item handle does not outlive the run.
        self.item_file = None;
        result
    }

    fn run_inner(
        &mut self,
        rif: Option<&[u8; RIF_SIZE]>,
        expected_digest: Option<&[u8; 32]>,
    ) -> Result<DownloadOutcome, DownloadError> {
        let Some(head) = self.download_head(rif)? else {
            return Ok(DownloadOutcome::Canceled);
        };
        if let Flow::Canceled = self.download_files(&head)? {
            return Ok(DownloadOutcome::Canceled);
        }
        if let Flow::Canceled = self.download_tail(&head)? {
            return Ok(DownloadOutcome::Canceled);
        }

        self.check_integrity(expected_digest)?;

        if head.category != Some(ContentCategory::Psx) {
            self.create_stat()?;
        }
        if let Some(rif) = rif {
            self.create_rif(rif)?;
        }

        info!("package staged");
        Ok(DownloadOutcome::Complete)
    }

    /// Streams the package prefix into the arena until the whole item
    /// index and every name table is resident, validating headers and
    /// deriving the AES context along the way. Returns `None` on
    /// cancellation.
    fn download_head(
        &mut self,
        rif: Option<&[u8; RIF_SIZE]>,
    ) -> Result<Option<HeadInfo>, DownloadError> {
        debug!("downloading package head");
        self.transfer.progress.status("Preparing...");

        let head_path = self.root.join("sce_sys/package/head.bin");
        let mut head_file = create_file(&head_path)?;

        // A resumed run rewrites the resident prefix so head.bin ends up
        // byte-identical to an uninterrupted download.
        if self.head_size > 0 {
            write_file(&mut head_file, &head_path, &self.head[..self.head_size])?;
        }

        let prolog = (PKG_HEADER_SIZE + PKG_HEADER_EXT_SIZE) as u64;
        if let Flow::Canceled = self.stream_head(&mut head_file, &head_path, prolog)? {
            return Ok(None);
        }

        let header = PkgHeader::read(&self.head[..prolog as usize]).context(BadHeaderSnafu)?;

        if let Some(rif) = rif {
            ensure!(
                rif[0x10..0x40] == *header.content_id().raw(),
                RifMismatchSnafu
            );
        }

        let mut layout = Layout {
            meta_offset: header.meta_offset(),
            meta_count: header.meta_count(),
            index_count: header.item_count(),
            total_size: header.total_size(),
            enc_offset: header.enc_offset(),
            enc_size: header.enc_size(),
            index_size: None,
        };
        debug!(
            meta_offset = layout.meta_offset,
            meta_count = layout.meta_count,
            index_count = layout.index_count,
            total_size = layout.total_size,
            enc_offset = layout.enc_offset,
            enc_size = layout.enc_size,
            "parsed package layout"
        );
        self.transfer.total_size = layout.total_size;

        let key = keys::derive_key(header.key_type(), header.iv()).context(BadKeyTypeSnafu)?;
        let cipher = PkgCipher::new(&key, header.iv());

        // The plaintext region, including the metadata table.
        if let Flow::Canceled = self.stream_head(&mut head_file, &head_path, layout.enc_offset)? {
            return Ok(None);
        }

        let meta = MetaInfo::parse(
            &self.head[..layout.enc_offset as usize],
            layout.meta_offset,
            layout.meta_count,
            layout.enc_offset,
        )
        .context(BadMetaSnafu)?;
        layout.index_size = meta.index_size;

        // The raw item index.
        let index_end =
            layout.enc_offset + u64::from(layout.index_count) * ItemEntry::RAW_SIZE as u64;
        if let Flow::Canceled = self.stream_head(&mut head_file, &head_path, index_end)? {
            return Ok(None);
        }

        // Peek item 0 to learn where the first payload starts; the head
        // stays resident up to that point.
        let first_item_offset = if layout.index_count > 0 {
            let mut raw = [0u8; ItemEntry::RAW_SIZE];
            raw.copy_from_slice(
                &self.head[layout.enc_offset as usize
                    ..layout.enc_offset as usize + ItemEntry::RAW_SIZE],
            );
            cipher.decrypt_at(0, &mut raw);
            ItemEntry::read(&raw)
                .map_err(|_| CorruptedSnafu.build())?
                .data_offset()
        } else {
            0
        };

        if let Some(declared) = layout.index_size {
            ensure!(
                declared == 0 || u64::from(declared) == first_item_offset,
                IndexSizeMismatchSnafu {
                    declared,
                    actual: first_item_offset
                }
            );
        }

        let head_target = layout
            .enc_offset
            .checked_add(first_item_offset)
            .ok_or_else(|| CorruptedSnafu.build())?;
        if let Flow::Canceled = self.stream_head(&mut head_file, &head_path, head_target)? {
            return Ok(None);
        }

        debug!("head.bin downloaded");
        Ok(Some(HeadInfo {
            layout,
            cipher,
            category: meta.content_category,
        }))
    }

    /// Streams into the arena until `target` bytes are resident, mirroring
    /// every downloaded byte into `head.bin`.
    fn stream_head(
        &mut self,
        file: &mut File,
        path: &Path,
        target: u64,
    ) -> Result<Flow, DownloadError> {
        ensure!(
            target <= self.head.len() as u64,
            HeadTooLargeSnafu {
                needed: target,
                capacity: self.head.len()
            }
        );
        let target = target as usize;

        while self.head_size < target {
            let read = self
                .transfer
                .read_into(&mut self.head[self.head_size..target])?;
            if read == 0 {
                return Ok(Flow::Canceled);
            }
            write_file(file, path, &self.head[self.head_size..self.head_size + read])?;
            self.head_size += read;
        }

        Ok(Flow::Done)
    }

    /// Walks the item index in order, decrypting descriptors and names
    /// from the arena and streaming each payload to its staged file.
    fn download_files(&mut self, head: &HeadInfo) -> Result<Flow, DownloadError> {
        debug!("downloading encrypted items");

        let layout = head.layout;
        let enc_offset = layout.enc_offset;

        for index in 0..layout.index_count {
            let desc_offset = u64::from(index) * ItemEntry::RAW_SIZE as u64;
            let desc_end = enc_offset + desc_offset + ItemEntry::RAW_SIZE as u64;
            ensure!(desc_end <= self.head_size as u64, CorruptedSnafu);

            let mut raw = [0u8; ItemEntry::RAW_SIZE];
            raw.copy_from_slice(
                &self.head[(enc_offset + desc_offset) as usize..desc_end as usize],
            );
            head.cipher.decrypt_at(desc_offset, &mut raw);
            let entry = ItemEntry::read(&raw).map_err(|_| CorruptedSnafu.build())?;

            let name_offset = u64::from(entry.name_offset());
            let name_size = entry.name_size();
            let item_offset = entry.data_offset();
            let item_size = entry.data_size();

            ensure!(name_size <= MAX_NAME_SIZE, NameTooLongSnafu { size: name_size });
            ensure!(
                enc_offset + name_offset + u64::from(name_size) <= layout.total_size,
                CorruptedSnafu
            );

            let name_start = enc_offset + name_offset;
            let name_end = name_start + u64::from(name_size);
            ensure!(name_end <= self.head_size as u64, CorruptedSnafu);

            let mut name_bytes = self.head[name_start as usize..name_end as usize].to_vec();
            head.cipher.decrypt_at(name_offset, &mut name_bytes);
            let item_name = String::from_utf8_lossy(&name_bytes).into_owned();

            let encrypted_size = item_size
                .checked_next_multiple_of(AES_BLOCK_SIZE as u64)
                .ok_or_else(|| CorruptedSnafu.build())?;
            let item_start = enc_offset
                .checked_add(item_offset)
                .ok_or_else(|| CorruptedSnafu.build())?;
            let item_end = item_start
                .checked_add(encrypted_size)
                .ok_or_else(|| CorruptedSnafu.build())?;

            debug!(
                index = index + 1,
                count = layout.index_count,
                name = %item_name,
                item_offset,
                item_size,
                kind = ?entry.kind(),
                "item"
            );
            self.transfer.progress.status(&item_name);

            let item_path = if head.category == Some(ContentCategory::Psx) {
                match item_name.as_str() {
                    "USRDIR/CONTENT/DOCUMENT.DAT" => self.root.join("DOCUMENT.DAT"),
                    "USRDIR/CONTENT/EBOOT.PBP" => self.root.join("EBOOT.PBP"),
                    _ => {
                        // Still decrypted and hashed, but nothing lands on disk.
                        if self.resume_offset >= item_end {
                            continue;
                        }
                        let encrypted_offset = if self.resume_offset > item_start {
                            self.transfer.download_offset.saturating_sub(item_start)
                        } else {
                            0
                        };
                        let discard_path = self.root.clone();
                        if let Flow::Canceled = self.stream_item(
                            head,
                            item_offset,
                            encrypted_size,
                            encrypted_offset,
                            0,
                            &discard_path,
                        )? {
                            return Ok(Flow::Canceled);
                        }
                        continue;
                    }
                }
            } else {
                self.root.join(&item_name)
            };

            match entry.kind() {
                ItemKind::Directory => {
                    fs::create_dir_all(&item_path)
                        .context(CreateDirFailedSnafu { path: &item_path })?;
                    continue;
                }
                ItemKind::Skip => continue,
                ItemKind::File => {}
            }

            // Staged whole by an earlier, interrupted run.
            if self.resume_offset >= item_end {
                continue;
            }

            let resumed = self.resume_offset > item_start;
            let encrypted_offset = if resumed {
                self.transfer.download_offset.saturating_sub(item_start)
            } else {
                0
            };

            self.item_file = Some(if resumed {
                open_append(&item_path)?
            } else {
                create_file(&item_path)?
            });

            if !resumed {
                let actual = self.transfer.download_offset;
                ensure!(
                    actual == item_start,
                    ItemOutOfOrderSnafu {
                        expected: item_start,
                        actual
                    }
                );
            }
            ensure!(
                item_size <= layout.total_size && item_start <= layout.total_size - item_size,
                CorruptedSnafu
            );

            let write_limit = item_size.saturating_sub(encrypted_offset);
            if let Flow::Canceled = self.stream_item(
                head,
                item_offset,
                encrypted_size,
                encrypted_offset,
                write_limit,
                &item_path,
            )? {
                return Ok(Flow::Canceled);
            }

            self.item_file = None;
        }

        debug!("all items decrypted");
        Ok(Flow::Done)
    }

    /// Streams one item's encrypted span: reads, hashes, decrypts in
    /// place, and writes the first `write_limit` plaintext bytes to the
    /// open item file. The trailing CTR padding is decrypted but never
    /// written.
    fn stream_item(
        &mut self,
        head: &HeadInfo,
        encrypted_base: u64,
        encrypted_size: u64,
        mut encrypted_offset: u64,
        mut write_limit: u64,
        path: &Path,
    ) -> Result<Flow, DownloadError> {
        while encrypted_offset < encrypted_size {
            let want = CHUNK_SIZE.min((encrypted_size - encrypted_offset) as usize);
            let read = self.transfer.read_into(&mut self.down[..want])?;
            if read == 0 {
                return Ok(Flow::Canceled);
            }

            let chunk = &mut self.down[..read];
            head.cipher.decrypt_at(encrypted_base + encrypted_offset, chunk);
            encrypted_offset += read as u64;

            let write = write_limit.min(read as u64) as usize;
            if write > 0 {
                if let Some(file) = self.item_file.as_mut() {
                    file.write_all(&chunk[..write])
                        .context(WriteFailedSnafu { path })?;
                }
                write_limit -= write as u64;
            }
        }

        Ok(Flow::Done)
    }

    /// Consumes the padding at the end of the encrypted region, then the
    /// plaintext trailer into `tail.bin`. PSX packages get an empty
    /// `tail.bin`; their trailer bytes only feed the digest.
    fn download_tail(&mut self, head: &HeadInfo) -> Result<Flow, DownloadError> {
        debug!("downloading package tail");
        self.transfer.progress.status("Finishing...");

        let layout = head.layout;
        let tail_path = self.root.join("sce_sys/package/tail.bin");
        let tail_start = layout
            .enc_offset
            .checked_add(layout.enc_size)
            .ok_or_else(|| CorruptedSnafu.build())?;

        self.item_file = Some(if self.transfer.download_offset > tail_start {
            open_append(&tail_path)?
        } else {
            create_file(&tail_path)?
        });

        // Padding inside the encrypted region is consumed but kept nowhere.
        while self.transfer.download_offset < tail_start {
            let want = CHUNK_SIZE.min((tail_start - self.transfer.download_offset) as usize);
            let read = self.transfer.read_into(&mut self.down[..want])?;
            if read == 0 {
                return Ok(Flow::Canceled);
            }
        }

        let save = head.category != Some(ContentCategory::Psx);
        while self.transfer.download_offset < layout.total_size {
            let want =
                CHUNK_SIZE.min((layout.total_size - self.transfer.download_offset) as usize);
            let read = self.transfer.read_into(&mut self.down[..want])?;
            if read == 0 {
                return Ok(Flow::Canceled);
            }
            if save {
                if let Some(file) = self.item_file.as_mut() {
                    file.write_all(&self.down[..read])
                        .context(WriteFailedSnafu { path: &tail_path })?;
                }
            }
        }

        self.item_file = None;
        debug!("tail.bin downloaded");
        Ok(Flow::Done)
    }

    /// Compares the accumulated stream digest against the expected one.
    /// On mismatch `head.bin` is removed so a retry redoes the head.
    fn check_integrity(&mut self, expected: Option<&[u8; 32]>) -> Result<(), DownloadError> {
        let Some(expected) = expected else {
            debug!("no expected digest, skipping integrity check");
            return Ok(());
        };

        let actual = self.transfer.sha.clone().finalize();

        let mut diff = 0u8;
        for (a, b) in actual.iter().zip(expected) {
            diff |= a ^ b;
        }

        if diff != 0 {
            let head_path = self.root.join("sce_sys/package/head.bin");
            info!(path = %head_path.display(), "integrity check failed, removing head.bin");
            let _ = fs::remove_file(&head_path);
            return DigestMismatchSnafu.fail();
        }

        debug!("integrity check passed");
        Ok(())
    }

    fn create_stat(&mut self) -> Result<(), DownloadError> {
        debug!("creating stat.bin");
        self.transfer.progress.status("Creating stat.bin");

        let path = self.root.join("sce_sys/package/stat.bin");
        fs::write(&path, [0u8; STAT_SIZE]).context(SaveFailedSnafu { path: &path })
    }

    fn create_rif(&mut self, rif: &[u8; RIF_SIZE]) -> Result<(), DownloadError> {
        debug!("creating work.bin");
        self.transfer.progress.status("Creating work.bin");

        let path = self.root.join("sce_sys/package/work.bin");
        fs::write(&path, rif).context(SaveFailedSnafu { path: &path })
    }
}

/// Creates `path` along with any missing parent directories.
fn create_file(path: &Path) -> Result<File, DownloadError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context(CreateDirFailedSnafu { path: parent })?;
    }
    File::create(path).context(CreateFileFailedSnafu { path })
}

/// Opens `path` for appending, creating it if needed.
fn open_append(path: &Path) -> Result<File, DownloadError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context(CreateDirFailedSnafu { path: parent })?;
    }
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .context(CreateFileFailedSnafu { path })
}

fn write_file(file: &mut File, path: &Path, data: &[u8]) -> Result<(), DownloadError> {
    file.write_all(data).context(WriteFailedSnafu { path })
}
