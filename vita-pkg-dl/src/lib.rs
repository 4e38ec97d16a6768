//! Streaming downloader and staging installer for Vita PKG packages.
//!
//! This crate fetches a package over HTTP with resume support, parses the
//! encrypted container on the fly, and stages its contents for the
//! platform installer: decrypted item files under the staging root plus
//! the `sce_sys/package/` artefacts (`head.bin`, `tail.bin`, `stat.bin`,
//! `work.bin`). The whole stream is verified against a SHA-256 digest.
//!
//! # Overview
//!
//! The entry point is [`Download`]: give it an [`HttpSource`], a staging
//! root, and a [`DownloadProgress`] implementation, then call
//! [`Download::run`] with the content ID, URL, optional zRIF blob, and
//! optional expected digest.
//!
//! # Example
//!
//! ```no_run
//! use vita_pkg_dl::{Download, ReqwestSource, SilentProgress};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let http = ReqwestSource::new()?;
//! let mut download = Download::new(http, "staging/", SilentProgress);
//! download.run(
//!     "UP0102-PCSA00042_00-EXAMPLELABEL0000",
//!     "http://example.com/package.pkg",
//!     None,
//!     None,
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! # Cancellation and resume
//!
//! [`Download::cancel_flag`] hands out a shared flag the host can set at
//! any time; the session notices at the next chunk boundary and returns
//! [`DownloadOutcome::Canceled`] with the staged prefix intact. Calling
//! `run` again on the same session resumes at the exact byte where the
//! stream stopped.

pub mod download;
pub mod http;
pub mod progress;

pub use self::download::{Download, DownloadError, DownloadOutcome, RIF_SIZE};
pub use self::http::{HttpError, HttpSource, ReqwestSource};
pub use self::progress::{DownloadProgress, SilentProgress};

#[cfg(feature = "cli")]
pub use self::progress::ConsoleProgress;
