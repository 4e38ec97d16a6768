//! HTTP transport abstraction for the downloader.
//!
//! The session consumes a package through the [`HttpSource`] trait so
//! tests can substitute an in-memory stream; [`ReqwestSource`] is the
//! real implementation over a blocking reqwest client with ranged GETs.

use snafu::{ResultExt, Snafu};
use std::io::Read;
use std::time::Duration;

/// Default timeout for HTTP requests.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Errors surfaced by an [`HttpSource`].
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum HttpError {
    #[snafu(display("failed to build HTTP client: {source}"))]
    BuildClient { source: reqwest::Error },

    #[snafu(display("request for {url} failed: {source}"))]
    RequestFailed { url: String, source: reqwest::Error },

    #[snafu(display("server answered {status} for {url}"))]
    BadStatus { url: String, status: u16 },

    #[snafu(display("read from {url} failed: {source}"))]
    ReadFailed { url: String, source: std::io::Error },
}

/// A byte source the download session pulls a package from.
///
/// The source lives as long as the session. `start` may be called again
/// after an interruption; the next `read` then continues at `offset`.
pub trait HttpSource {
    /// Issues a ranged GET starting at `offset`.
    fn start(&mut self, url: &str, offset: u64) -> Result<(), HttpError>;

    /// Content length of the ranged response, if the server reported one.
    fn length(&self) -> Option<u64>;

    /// Reads into `buf`; `Ok(0)` means the peer closed the stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, HttpError>;
}

/// [`HttpSource`] over a blocking reqwest client.
pub struct ReqwestSource {
    client: reqwest::blocking::Client,
    response: Option<reqwest::blocking::Response>,
    url: String,
}

impl ReqwestSource {
    /// Creates a source with the default timeout.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a source with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context(BuildClientSnafu)?;

        Ok(Self {
            client,
            response: None,
            url: String::new(),
        })
    }
}

impl HttpSource for ReqwestSource {
    fn start(&mut self, url: &str, offset: u64) -> Result<(), HttpError> {
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={offset}-"));
        }

        let response = request.send().context(RequestFailedSnafu { url })?;

        let status = response.status();
        if !status.is_success() {
            return BadStatusSnafu {
                url,
                status: status.as_u16(),
            }
            .fail();
        }

        self.url = url.to_string();
        self.response = Some(response);
        Ok(())
    }

    fn length(&self) -> Option<u64> {
        self.response.as_ref().and_then(|r| r.content_length())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, HttpError> {
        let Some(response) = self.response.as_mut() else {
            return Ok(0);
        };

        response.read(buf).with_context(|_| ReadFailedSnafu {
            url: self.url.clone(),
        })
    }
}
