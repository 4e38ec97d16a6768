/// Trait for observing download progress.
///
/// All methods default to no-ops so implementors pick what they need.
pub trait DownloadProgress {
    /// Called when the session moves to a new phase or item.
    fn status(&self, _status: &str) {}

    /// Called with the current stream position, at most every 500 ms.
    fn progress(&self, _offset: u64, _total: u64) {}
}

/// A no-op progress implementation that discards all updates.
pub struct SilentProgress;

impl DownloadProgress for SilentProgress {}

/// Console progress reporter using an indicatif progress bar.
///
/// The bar stays hidden until the package size is known, then redraws at
/// the pace of the session's progress callbacks.
#[cfg(feature = "cli")]
pub struct ConsoleProgress {
    bar: indicatif::ProgressBar,
}

#[cfg(feature = "cli")]
impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            bar: indicatif::ProgressBar::hidden(),
        }
    }
}

#[cfg(feature = "cli")]
impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "cli")]
impl DownloadProgress for ConsoleProgress {
    fn status(&self, status: &str) {
        self.bar.set_message(status.to_owned());
    }

    fn progress(&self, offset: u64, total: u64) {
        if self.bar.length() != Some(total) {
            self.bar
                .set_draw_target(indicatif::ProgressDrawTarget::stderr());
            self.bar.set_style(
                indicatif::ProgressStyle::default_bar()
                    .template("{bar:40.cyan/blue} {bytes}/{total_bytes} {msg}")
                    .unwrap()
                    .progress_chars("━╸─"),
            );
            self.bar.set_length(total);
        }
        self.bar.set_position(offset);
    }
}
