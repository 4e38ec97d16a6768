use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "vita-pkg-dl")]
#[command(about = "Vita PKG streaming downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download a package and stage it for installation
    Download {
        /// Package URL
        #[arg(value_name = "URL")]
        url: String,

        /// Content ID; names the staging subdirectory
        #[arg(short, long, value_name = "ID")]
        content_id: String,

        /// Staging root directory
        #[arg(short, long, value_name = "DIR", default_value = "pkg-staging")]
        temp_dir: PathBuf,

        /// zRIF license file (512 bytes), persisted as work.bin
        #[arg(long, value_name = "FILE")]
        zrif: Option<PathBuf>,

        /// Expected SHA-256 of the whole package, as 64 hex characters
        #[arg(long, value_name = "HEX")]
        sha256: Option<String>,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },
}
