mod cli;

use clap::Parser;
use cli::{Cli, Command};
use snafu::{ResultExt, Snafu};
use std::path::{Path, PathBuf};
use vita_pkg_dl::{
    ConsoleProgress, Download, DownloadOutcome, RIF_SIZE, ReqwestSource, SilentProgress,
};

/// Top-level application errors for vita-pkg-dl.
#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to create HTTP client"))]
    CreateClient { source: vita_pkg_dl::HttpError },

    #[snafu(display("failed to read zRIF file '{}'", path.display()))]
    ReadRif {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("zRIF file '{}' must be exactly {RIF_SIZE} bytes", path.display()))]
    BadRifSize { path: PathBuf },

    #[snafu(display("--sha256 must be 64 hex characters"))]
    BadDigest { source: hex::FromHexError },

    #[snafu(display("--sha256 must be 64 hex characters"))]
    BadDigestLength,

    #[snafu(display("download failed"))]
    Download {
        source: vita_pkg_dl::DownloadError,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[snafu::report]
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Download {
            url,
            content_id,
            temp_dir,
            zrif,
            sha256,
            quiet,
        } => cmd_download(
            &url,
            &content_id,
            temp_dir,
            zrif.as_deref(),
            sha256.as_deref(),
            quiet,
        ),
    }
}

fn cmd_download(
    url: &str,
    content_id: &str,
    temp_dir: PathBuf,
    zrif: Option<&Path>,
    sha256: Option<&str>,
    quiet: bool,
) -> Result<()> {
    let rif = match zrif {
        Some(path) => {
            let data = std::fs::read(path).context(ReadRifSnafu { path })?;
            let rif: [u8; RIF_SIZE] = data
                .try_into()
                .map_err(|_| BadRifSizeSnafu { path }.build())?;
            Some(rif)
        }
        None => None,
    };

    let digest = match sha256 {
        Some(text) => {
            let bytes = hex::decode(text).context(BadDigestSnafu)?;
            let digest: [u8; 32] = bytes.try_into().map_err(|_| BadDigestLengthSnafu.build())?;
            Some(digest)
        }
        None => None,
    };

    let http = ReqwestSource::new().context(CreateClientSnafu)?;

    let outcome = if quiet {
        let mut download = Download::new(http, temp_dir, SilentProgress);
        download
            .run(content_id, url, rif.as_ref(), digest.as_ref())
            .context(DownloadSnafu)?
    } else {
        let mut download = Download::new(http, temp_dir, ConsoleProgress::new());
        download
            .run(content_id, url, rif.as_ref(), digest.as_ref())
            .context(DownloadSnafu)?
    };

    match outcome {
        DownloadOutcome::Complete => println!("Package staged."),
        DownloadOutcome::Canceled => println!("Download canceled."),
    }

    Ok(())
}
