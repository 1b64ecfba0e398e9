#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Parcel sync orchestration.
//!
//! [`UpdateOrchestrator`] runs one profile: compare the remote and local
//! "last modified" times, and when they differ extract a fresh copy,
//! parse every owner mailing address, and replace the destination table.
//! Every run ends with exactly one notification when something changed
//! or went wrong.

pub mod config;
pub mod freshness;
pub mod profile;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use parcel_sync_address::AddressParser;
use parcel_sync_dataset::{DatasetError, DatasetGateway};
use parcel_sync_extract::archive::{self, ArchiveError};
use parcel_sync_extract::{ExtractError, RemoteExtractionClient};
use parcel_sync_notify::{Notifier, NotifyError, messages};
use parcel_sync_parcel::progress::{ProgressCallback, null_progress};
use parcel_sync_parcel::transform_rows;
use parcel_sync_parcel_models::{OWNERSHIP_FIELDS, SOURCE_OBJECT_ID_FIELD};

use crate::freshness::UpdateDecision;
use crate::state::{RunOutcome, RunReport, RunState};

pub use config::{ConfigError, Profile, SyncConfig};

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Remote extraction or transport failure.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Staging directory cleanup failed.
    #[error(transparent)]
    Staging(#[from] ArchiveError),

    /// Dataset read or write failed.
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// A notification could not be sent.
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Settings for one orchestrated target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Name used in log lines and notifications.
    pub label: String,
    /// Leads every notification subject.
    pub subject_prefix: String,
    /// Directory extracts are unpacked into.
    pub staging_dir: PathBuf,
    /// Folder, relative to `staging_dir`, that an extract unpacks into.
    /// Removed before extracting in case an earlier run left it behind.
    pub extract_folder: String,
}

/// Sequences one sync run over injected collaborators.
pub struct UpdateOrchestrator {
    settings: RunSettings,
    client: Box<dyn RemoteExtractionClient>,
    dataset: Box<dyn DatasetGateway>,
    notifier: Box<dyn Notifier>,
    parser: AddressParser,
    progress: Arc<dyn ProgressCallback>,
    state: RunState,
    history: Vec<RunState>,
}

impl UpdateOrchestrator {
    #[must_use]
    pub fn new(
        settings: RunSettings,
        client: Box<dyn RemoteExtractionClient>,
        dataset: Box<dyn DatasetGateway>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            client,
            dataset,
            notifier,
            parser: AddressParser::default(),
            progress: null_progress(),
            state: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }

    #[must_use]
    pub fn with_parser(mut self, parser: AddressParser) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Every state visited so far, starting with [`RunState::Idle`].
    #[must_use]
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    #[must_use]
    pub const fn settings(&self) -> &RunSettings {
        &self.settings
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {next}",
            self.state
        );
        log::debug!("{}: {} -> {next}", self.settings.label, self.state);
        self.state = next;
        self.history.push(next);
    }

    /// Compares remote and local last-modified times without changing
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] if either timestamp cannot be read.
    pub async fn check(&self) -> Result<UpdateDecision, SyncError> {
        let remote = self.client.remote_last_modified().await?;
        let local = self.dataset.latest_timestamp()?;
        let decision = UpdateDecision::new(remote, local);
        log::info!("{}: {decision}", self.settings.label);
        Ok(decision)
    }

    /// Runs the whole pipeline once.
    ///
    /// On failure the error is logged with its source chain and a failure
    /// notification is sent before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the [`SyncError`] that aborted the run.
    pub async fn run(&mut self) -> Result<RunOutcome, SyncError> {
        let started = Instant::now();
        log::info!("{}: starting parcel sync", self.settings.label);

        match self.run_steps(started).await {
            Ok(outcome) => {
                self.transition(RunState::Idle);
                Ok(outcome)
            }
            Err(e) => {
                self.transition(RunState::Error);
                log::error!(
                    "{}: there was an error: {}",
                    self.settings.label,
                    messages::error_chain(&e)
                );
                let notification = messages::failure(&self.settings.subject_prefix, &e);
                if let Err(send_error) = self.notifier.send(&notification).await {
                    log::error!("Failed to send failure notification: {send_error}");
                }
                self.transition(RunState::Idle);
                Err(e)
            }
        }
    }

    async fn run_steps(&mut self, started: Instant) -> Result<RunOutcome, SyncError> {
        self.transition(RunState::CheckingFreshness);
        let decision = self.check().await?;
        if !decision.needs_update() {
            log::info!("{}: parcels up to date, nothing to do", self.settings.label);
            self.transition(RunState::UpToDate);
            return Ok(RunOutcome::UpToDate(decision));
        }
        log::info!("{}: parcels need updating", self.settings.label);

        self.transition(RunState::Extracting);
        let stale = self.settings.staging_dir.join(&self.settings.extract_folder);
        if archive::remove_dir_if_exists(&stale)? {
            log::warn!("Removed extract left over from an earlier run");
        }
        let extracted = self.client.extract(&self.settings.staging_dir).await?;
        self.dataset
            .stage_extract(&extracted.gdb_path, &extracted.layer)?;

        let rows = self.dataset.row_count()?;
        log::info!("{}: extract has {rows} parcels", self.settings.label);

        if rows == 0 {
            self.transition(RunState::EmptyExtract);
            log::error!("{}: parcel data is blank", self.settings.label);
            self.dataset.discard_staging()?;
            archive::remove_dir_if_exists(&extracted.root)?;
            self.notifier
                .send(&messages::empty_extract(
                    &self.settings.subject_prefix,
                    &self.settings.label,
                ))
                .await?;
            return Ok(RunOutcome::EmptyExtract);
        }

        self.transition(RunState::Parsing);
        self.dataset.delete_field(SOURCE_OBJECT_ID_FIELD)?;
        self.dataset.add_fields(&OWNERSHIP_FIELDS)?;
        let source_rows = self.dataset.read_rows()?;
        let (updates, transform) = transform_rows(&self.parser, &source_rows, &self.progress);
        log::info!(
            "{}: parsed {} rows ({} ambiguous, {} without parcel id, {} short parcel ids)",
            self.settings.label,
            transform.rows,
            transform.ambiguous,
            transform.missing_parcel_ids,
            transform.short_parcel_ids,
        );
        for (rule, count) in &transform.rule_counts {
            log::debug!("  {rule}: {count}");
        }
        let updated = self.dataset.write_updates(&updates)?;

        self.transition(RunState::Loading);
        self.dataset.truncate_destination()?;
        let appended = self.dataset.append_to_destination()?;
        log::info!("{}: appended {appended} parcels", self.settings.label);
        self.dataset.discard_staging()?;
        archive::remove_dir_if_exists(&extracted.root)?;

        self.transition(RunState::NotifyingSuccess);
        let runtime = started.elapsed();
        let notification = messages::success(
            &self.settings.subject_prefix,
            &self.settings.label,
            runtime,
        );
        log::info!("{}", notification.body);
        self.notifier.send(&notification).await?;

        Ok(RunOutcome::Updated(RunReport {
            extracted: rows,
            updated,
            appended,
            transform,
            runtime,
        }))
    }
}
