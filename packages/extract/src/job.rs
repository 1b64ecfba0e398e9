//! Geoprocessing job status and the polling schedule.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use crate::ExtractError;

/// Status of an asynchronous geoprocessing job, as the service spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Deserialize, Serialize)]
pub enum JobStatus {
    #[serde(rename = "esriJobNew")]
    #[strum(serialize = "esriJobNew")]
    New,
    #[serde(rename = "esriJobSubmitted")]
    #[strum(serialize = "esriJobSubmitted")]
    Submitted,
    #[serde(rename = "esriJobWaiting")]
    #[strum(serialize = "esriJobWaiting")]
    Waiting,
    #[serde(rename = "esriJobExecuting")]
    #[strum(serialize = "esriJobExecuting")]
    Executing,
    #[serde(rename = "esriJobSucceeded")]
    #[strum(serialize = "esriJobSucceeded")]
    Succeeded,
    #[serde(rename = "esriJobFailed")]
    #[strum(serialize = "esriJobFailed")]
    Failed,
    #[serde(rename = "esriJobTimedOut")]
    #[strum(serialize = "esriJobTimedOut")]
    TimedOut,
    #[serde(rename = "esriJobCancelling")]
    #[strum(serialize = "esriJobCancelling")]
    Cancelling,
    #[serde(rename = "esriJobCancelled")]
    #[strum(serialize = "esriJobCancelled")]
    Cancelled,
    #[serde(rename = "esriJobDeleting")]
    #[strum(serialize = "esriJobDeleting")]
    Deleting,
    #[serde(rename = "esriJobDeleted")]
    #[strum(serialize = "esriJobDeleted")]
    Deleted,
    /// Anything this client does not recognize.
    #[serde(other)]
    #[strum(serialize = "unknown")]
    Unknown,
}

impl JobStatus {
    /// The job has not finished yet and is worth polling again.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(
            self,
            Self::New | Self::Submitted | Self::Waiting | Self::Executing
        )
    }
}

/// A message the service attached to a job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

/// Reference to one output parameter of a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRef {
    pub param_url: String,
}

/// Job description returned by `submitJob` and `jobs/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub job_id: String,
    pub job_status: JobStatus,
    #[serde(default)]
    pub messages: Vec<JobMessage>,
    #[serde(default)]
    pub results: BTreeMap<String, ResultRef>,
}

impl JobInfo {
    /// Parses a job description out of a service response.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Protocol`] if the response is an `ArcGIS`
    /// error object or lacks the job fields.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ExtractError> {
        if let Some(error) = value.get("error") {
            return Err(ExtractError::protocol(format!("service error: {error}")));
        }
        serde_json::from_value(value)
            .map_err(|e| ExtractError::protocol(format!("not a job description: {e}")))
    }

    /// Message descriptions, in the order the service reported them.
    #[must_use]
    pub fn message_texts(&self) -> Vec<String> {
        self.messages
            .iter()
            .map(|m| m.description.clone())
            .collect()
    }
}

fn default_initial_interval_secs() -> f64 {
    5.0
}

fn default_max_interval_secs() -> f64 {
    60.0
}

fn default_backoff_factor() -> f64 {
    1.5
}

fn default_timeout_secs() -> u64 {
    3_600
}

/// How often to ask about a running job, and for how long.
///
/// The interval starts at `initial_interval_secs`, is multiplied by
/// `backoff_factor` after each check and never exceeds
/// `max_interval_secs`. Polling gives up once `timeout_secs` have been
/// spent waiting.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PollPolicy {
    #[serde(default = "default_initial_interval_secs")]
    pub initial_interval_secs: f64,
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: f64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval_secs: default_initial_interval_secs(),
            max_interval_secs: default_max_interval_secs(),
            backoff_factor: default_backoff_factor(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Shortest wait between two status checks, whatever the policy says.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Largest accepted `backoff_factor`.
pub const MAX_BACKOFF_FACTOR: f64 = 10.0;

/// A polling policy that cannot be honored.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PollPolicyError {
    #[error("{field} must be a positive, finite number of seconds (got {value})")]
    Interval {
        field: &'static str,
        value: f64,
    },
    #[error("backoff_factor must be between 1 and 10 (got {0})")]
    BackoffFactor(f64),
    #[error(
        "max_interval_secs ({max}) is shorter than initial_interval_secs ({initial})"
    )]
    MaxBelowInitial { initial: f64, max: f64 },
}

/// Seconds to a [`Duration`] without panicking. Negative and NaN values
/// are zero; values too large to represent saturate.
fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

impl PollPolicy {
    /// Checks that the policy describes a finite, growing schedule.
    ///
    /// # Errors
    ///
    /// Returns [`PollPolicyError`] naming the first setting that is out of
    /// range.
    pub fn validate(&self) -> Result<(), PollPolicyError> {
        for (field, value) in [
            ("initial_interval_secs", self.initial_interval_secs),
            ("max_interval_secs", self.max_interval_secs),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PollPolicyError::Interval { field, value });
            }
        }
        if !(1.0..=MAX_BACKOFF_FACTOR).contains(&self.backoff_factor) {
            return Err(PollPolicyError::BackoffFactor(self.backoff_factor));
        }
        if self.max_interval_secs < self.initial_interval_secs {
            return Err(PollPolicyError::MaxBelowInitial {
                initial: self.initial_interval_secs,
                max: self.max_interval_secs,
            });
        }
        Ok(())
    }

    /// Never shorter than [`MIN_INTERVAL`].
    #[must_use]
    pub fn max_interval(&self) -> Duration {
        secs_to_duration(self.max_interval_secs).max(MIN_INTERVAL)
    }

    /// Clamped to `MIN_INTERVAL..=max_interval()`.
    #[must_use]
    pub fn initial_interval(&self) -> Duration {
        secs_to_duration(self.initial_interval_secs).clamp(MIN_INTERVAL, self.max_interval())
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The interval to wait after `current`.
    #[must_use]
    pub fn next_interval(&self, current: Duration) -> Duration {
        let factor = if self.backoff_factor.is_nan() {
            1.0
        } else {
            self.backoff_factor.clamp(1.0, MAX_BACKOFF_FACTOR)
        };
        secs_to_duration(current.as_secs_f64() * factor).clamp(MIN_INTERVAL, self.max_interval())
    }
}

/// Calls `check` until the job leaves the pending states.
///
/// The first check happens immediately; later ones follow `policy`.
///
/// # Errors
///
/// Returns [`ExtractError::JobFailed`] if the job ends in any state other
/// than succeeded, [`ExtractError::JobTimedOut`] if it is still pending
/// after the policy's timeout, or whatever `check` fails with.
pub async fn poll_until_done<F, Fut>(
    policy: &PollPolicy,
    job_id: &str,
    mut check: F,
) -> Result<JobInfo, ExtractError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobInfo, ExtractError>>,
{
    let timeout = policy.timeout();
    let mut interval = policy.initial_interval();
    let mut waited = Duration::ZERO;

    loop {
        let info = check().await?;

        if info.job_status == JobStatus::Succeeded {
            log::info!("Job {job_id} succeeded after {waited:?}");
            return Ok(info);
        }

        if !info.job_status.is_pending() {
            return Err(ExtractError::JobFailed {
                job_id: job_id.to_string(),
                status: info.job_status,
                messages: info.message_texts(),
            });
        }

        if waited >= timeout {
            return Err(ExtractError::JobTimedOut {
                job_id: job_id.to_string(),
                waited,
            });
        }

        let delay = interval.min(timeout - waited);
        log::info!("Job {job_id} is {}, checking again in {delay:?}", info.job_status);
        tokio::time::sleep(delay).await;
        waited += delay;
        interval = policy.next_interval(interval);
    }
}
