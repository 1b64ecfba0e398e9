#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Remote parcel extraction.
//!
//! The county publishes parcels through an `ArcGIS` geoprocessing service.
//! Getting a local copy means submitting an extraction job, polling it until
//! it finishes, downloading the resulting zip and unpacking it into the
//! staging directory. The county also exposes a statistics query that
//! reports when the parcel layer last changed, which is what the freshness
//! check asks for.

pub mod archive;
pub mod arcgis;
pub mod download;
pub mod job;
pub mod retry;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use arcgis::{ArcGisExtractClient, ArcGisExtractConfig};
pub use job::{JobStatus, PollPolicy, PollPolicyError};

/// Errors from talking to the remote service or handling what it returns.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// A response body was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local file I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The downloaded archive could not be unpacked.
    #[error("Archive error: {0}")]
    Archive(#[from] archive::ArchiveError),

    /// The service answered with something other than what was asked for.
    #[error("Unexpected response: {message}")]
    Protocol {
        /// What was wrong with it.
        message: String,
    },

    /// The extraction job ended without succeeding.
    #[error("Extraction job {job_id} ended with status {status}: {}", messages.join("; "))]
    JobFailed {
        /// Remote job id.
        job_id: String,
        /// Terminal status reported by the service.
        status: JobStatus,
        /// Messages the service attached to the job.
        messages: Vec<String>,
    },

    /// The extraction job did not finish within the polling timeout.
    #[error("Extraction job {job_id} still running after {waited:?}")]
    JobTimedOut {
        /// Remote job id.
        job_id: String,
        /// Total time spent waiting.
        waited: Duration,
    },
}

impl ExtractError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

/// A parcel extract unpacked into the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArchive {
    /// Directory the archive was unpacked into. Removed after the load.
    pub root: PathBuf,
    /// Path of the file geodatabase holding the parcel layer.
    pub gdb_path: PathBuf,
    /// Parcel layer name inside the geodatabase.
    pub layer: String,
    /// Files written while unpacking.
    pub files: u64,
}

/// Source of parcel extracts.
#[async_trait]
pub trait RemoteExtractionClient: Send + Sync {
    /// When the remote parcel layer was last modified.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] if the query fails or the answer has no
    /// timestamp in it.
    async fn remote_last_modified(&self) -> Result<DateTime<Utc>, ExtractError>;

    /// Runs a full extraction and unpacks the result under `staging_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] if the job fails, times out, or the
    /// archive cannot be downloaded or unpacked.
    async fn extract(&self, staging_dir: &Path) -> Result<ExtractedArchive, ExtractError>;
}
