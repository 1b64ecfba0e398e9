//! Building orchestrators from configured profiles.

use std::sync::Arc;

use parcel_sync_address::AddressParser;
use parcel_sync_dataset::ParcelDb;
use parcel_sync_extract::ArcGisExtractClient;
use parcel_sync_notify::{LogNotifier, Notifier, SmtpNotifier, messages};
use parcel_sync_parcel::progress::{ProgressCallback, null_progress};

use crate::config::Profile;
use crate::state::RunOutcome;
use crate::{RunSettings, SyncError, UpdateOrchestrator};

/// The notifier a profile asks for: SMTP when it has email settings,
/// log-only otherwise.
///
/// # Errors
///
/// Returns [`SyncError::Notify`] if the email settings are invalid.
pub fn notifier_for(profile: &Profile) -> Result<Box<dyn Notifier>, SyncError> {
    Ok(match &profile.email {
        Some(email) => Box::new(SmtpNotifier::new(email)?),
        None => {
            log::warn!("No email settings; notifications will only be logged");
            Box::new(LogNotifier)
        }
    })
}

#[must_use]
pub fn settings_for(profile: &Profile) -> RunSettings {
    RunSettings {
        label: profile.remote.label.clone(),
        subject_prefix: profile.subject_prefix().to_string(),
        staging_dir: profile.staging_dir.clone(),
        extract_folder: profile.remote.extract_folder().to_string(),
    }
}

/// Builds an orchestrator wired to the real services a profile names.
///
/// # Errors
///
/// Returns [`SyncError`] if the HTTP client or destination database
/// cannot be set up.
pub fn orchestrator_for(
    profile: &Profile,
    notifier: Box<dyn Notifier>,
    progress: Arc<dyn ProgressCallback>,
) -> Result<UpdateOrchestrator, (SyncError, Box<dyn Notifier>)> {
    let services = ArcGisExtractClient::new(
        profile.remote.clone(),
        profile.out_sr,
        profile.polling.clone(),
    )
    .map_err(SyncError::from)
    .and_then(|client| {
        let dataset = ParcelDb::open(&profile.destination_db, profile.dataset_config())?;
        Ok((client, dataset))
    });

    match services {
        Ok((client, dataset)) => Ok(UpdateOrchestrator::new(
            settings_for(profile),
            Box::new(client),
            Box::new(dataset),
            notifier,
        )
        .with_parser(AddressParser::new(profile.countries()))
        .with_progress(progress)),
        Err(e) => Err((e, notifier)),
    }
}

/// Builds an orchestrator that can only answer [`UpdateOrchestrator::check`].
///
/// The destination is opened read-only and must already exist; nothing is
/// written and notifications are only logged.
///
/// # Errors
///
/// Returns [`SyncError`] if the HTTP client cannot be built or the
/// destination database is missing or cannot be opened.
pub fn check_orchestrator_for(profile: &Profile) -> Result<UpdateOrchestrator, SyncError> {
    let client = ArcGisExtractClient::new(
        profile.remote.clone(),
        profile.out_sr,
        profile.polling.clone(),
    )?;
    let dataset = ParcelDb::open_read_only(&profile.destination_db, profile.dataset_config())?;

    Ok(UpdateOrchestrator::new(
        settings_for(profile),
        Box::new(client),
        Box::new(dataset),
        Box::new(LogNotifier),
    )
    .with_progress(null_progress()))
}

/// Runs one profile end to end.
///
/// Setup failures after the notifier exists are reported through it, the
/// same as failures during the run.
///
/// # Errors
///
/// Returns the [`SyncError`] that stopped the profile.
pub async fn run_profile(
    name: &str,
    profile: &Profile,
    progress: Arc<dyn ProgressCallback>,
) -> Result<RunOutcome, SyncError> {
    log::info!("Running profile {name}");
    let notifier = notifier_for(profile)?;

    match orchestrator_for(profile, notifier, progress) {
        Ok(mut orchestrator) => orchestrator.run().await,
        Err((e, notifier)) => {
            log::error!("Profile {name}: setup failed: {}", messages::error_chain(&e));
            let notification = messages::failure(profile.subject_prefix(), &e);
            if let Err(send_error) = notifier.send(&notification).await {
                log::error!("Failed to send failure notification: {send_error}");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use parcel_sync_dataset::DatasetError;

    use super::*;
    use crate::config::SyncConfig;

    #[test]
    fn check_does_not_create_a_missing_destination() {
        let dir = std::env::temp_dir().join("parcel_sync_check_missing_db");
        let _ = std::fs::remove_dir_all(&dir);
        let db_path = dir.join("parcels.duckdb");

        let text = format!(
            r#"
            [profiles.x]
            staging_dir = "{staging}"
            out_sr = 2226
            destination_db = "{db}"
            destination_table = "parcels"
            "#,
            staging = dir.join("staging").display().to_string().replace('\\', "/"),
            db = db_path.display().to_string().replace('\\', "/"),
        );
        let config = SyncConfig::from_toml_str(&text).unwrap();

        let result = check_orchestrator_for(&config.profiles["x"]);

        assert!(matches!(
            result,
            Err(SyncError::Dataset(DatasetError::MissingDatabase(_)))
        ));
        assert!(!db_path.exists());
        assert!(!dir.exists());
    }
}
