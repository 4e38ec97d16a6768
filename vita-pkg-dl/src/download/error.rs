use snafu::Snafu;
use std::path::PathBuf;

use crate::http::HttpError;

/// Errors that can abort a download session.
///
/// Cancellation is not an error; it is a distinct
/// [`DownloadOutcome`](super::DownloadOutcome).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum DownloadError {
    // Transport
    #[snafu(display("failed to start HTTP transfer: {source}"))]
    HttpStartFailed { source: HttpError },

    #[snafu(display("HTTP response has no known length"))]
    UnknownLength,

    #[snafu(display("HTTP download error: {source}"))]
    HttpReadFailed { source: HttpError },

    #[snafu(display("HTTP connection closed before the package was complete"))]
    ConnectionClosed,

    // Format
    #[snafu(display("bad package header: {source}"))]
    BadHeader {
        source: vita_pkg::header::ReadError,
    },

    #[snafu(display("zRIF content ID does not match the package"))]
    RifMismatch,

    #[snafu(display("package not supported, head is too large ({needed} > {capacity} bytes)"))]
    HeadTooLarge { needed: u64, capacity: usize },

    #[snafu(display("bad package metadata: {source}"))]
    BadMeta { source: vita_pkg::meta::MetaError },

    #[snafu(display("cannot derive the package key: {source}"))]
    BadKeyType { source: vita_pkg::keys::KeyError },

    #[snafu(display(
        "declared item index size {declared} does not match the first item offset {actual}"
    ))]
    IndexSizeMismatch { declared: u32, actual: u64 },

    #[snafu(display("package is too small or corrupted"))]
    Corrupted,

    #[snafu(display("item name is too long ({size} bytes)"))]
    NameTooLong { size: u32 },

    #[snafu(display(
        "package not supported, items out of order (expected offset {expected}, got {actual})"
    ))]
    ItemOutOfOrder { expected: u64, actual: u64 },

    // I/O
    #[snafu(display("cannot create directory {}: {source}", path.display()))]
    CreateDirFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cannot create file {}: {source}", path.display()))]
    CreateFileFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cannot write to {}: {source}", path.display()))]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cannot save {}: {source}", path.display()))]
    SaveFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    // Integrity
    #[snafu(display("package integrity check failed, try downloading again"))]
    DigestMismatch,
}
