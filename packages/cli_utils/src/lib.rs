#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the parcel sync toolchain.
//!
//! Provides an `indicatif`-backed progress bar behind the
//! [`ProgressCallback`] trait, plus [`init_logger`] which sets up
//! `indicatif-log-bridge` so that `log::info!` and friends are suspended
//! while progress bars redraw. Logs go to stderr or, when a log directory
//! is configured, to one append-only file per day.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use parcel_sync_parcel::progress::ProgressCallback;

pub use indicatif::MultiProgress;

/// Suffix of daily log file names.
const LOG_FILE_SUFFIX: &str = "_parcel_load.log";

/// Errors from logger setup.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// The log file could not be opened.
    #[error("Failed to open log file {path}: {source}")]
    Io {
        /// Log file path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Where and how much to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerOptions {
    /// Default level. `RUST_LOG` overrides it.
    pub level: log::LevelFilter,
    /// Directory for daily log files. `None` logs to stderr.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            level: log::LevelFilter::Info,
            log_dir: None,
        }
    }
}

/// `<dir>/<YYYY-MM-DD>_parcel_load.log`
#[must_use]
pub fn daily_log_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}{LOG_FILE_SUFFIX}", date.format("%Y-%m-%d")))
}

/// An `indicatif` [`ProgressBar`] that implements [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Style to switch to once `set_total()` provides a known length.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    fn records(multi: &MultiProgress, message: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let bar_style = ProgressStyle::with_template(
            "  {msg} {wide_bar:.cyan/dim} {pos}/{len} {percent}% [{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Self { bar, bar_style }
    }

    /// Creates a progress bar that starts as a spinner (no total known)
    /// and transitions to a full bar with percentage/ETA once
    /// [`ProgressCallback::set_total()`] is called.
    #[must_use]
    pub fn records_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::records(multi, message))
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        // Switch from spinner to bar style now that we know the total.
        self.bar.set_style(self.bar_style.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// Only the first call in a process takes effect.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
/// Progress bars are hidden when logging to a file.
///
/// # Errors
///
/// Returns [`LoggerError`] if the log file cannot be opened.
pub fn init_logger(options: &LoggerOptions) -> Result<MultiProgress, LoggerError> {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(options.level);
    builder.parse_env("RUST_LOG");

    let multi = match &options.log_dir {
        Some(dir) => {
            let path = daily_log_path(dir, chrono::Local::now().date_naive());
            let file = open_log_file(&path)?;
            builder
                .target(env_logger::Target::Pipe(Box::new(file)))
                .write_style(env_logger::WriteStyle::Never);
            MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden())
        }
        None => MultiProgress::new(),
    };

    let logger = builder.build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // Ignore error if logger was already set (e.g., in tests)

    log::set_max_level(level);

    Ok(multi)
}

fn open_log_file(path: &Path) -> Result<std::fs::File, LoggerError> {
    let io_error = |source| LoggerError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error)
}
