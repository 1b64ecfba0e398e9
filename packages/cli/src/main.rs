#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the parcel ownership sync.
//!
//! Runs every configured profile (or one, with `--profile`) in turn. Each
//! profile checks the county service for newer parcel data and, when there
//! is some, extracts it, normalizes the owner mailing addresses, and
//! replaces the destination table.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use parcel_sync::config::{self, Profile, SyncConfig};
use parcel_sync::profile;
use parcel_sync::state::RunOutcome;
use parcel_sync_address::AddressParser;
use parcel_sync_cli_utils::{IndicatifProgress, LoggerOptions, MultiProgress};
use parcel_sync_parcel_models::RawAddressRecord;

/// Keep a local parcel table in sync with a county GIS service.
#[derive(Parser)]
#[command(name = "parcel_sync")]
#[command(about = "Keep a local parcel table in sync with a county GIS service")]
struct Cli {
    /// Path to the TOML config. Falls back to `$PARCEL_SYNC_CONFIG`, then
    /// `parcel_sync.toml` in the working directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute. Defaults to `run`.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Update every profile whose remote data is newer.
    Run {
        /// Only run this profile.
        #[arg(long)]
        profile: Option<String>,
    },

    /// Report whether each profile needs an update, without changing
    /// anything.
    Check {
        /// Only check this profile.
        #[arg(long)]
        profile: Option<String>,
    },

    /// Parse one owner record and print the normalized fields.
    ///
    /// Countries configured for the profile (the first one when none is
    /// named) are recognized the same way `run` recognizes them.
    Parse {
        /// Take known countries from this profile.
        #[arg(long)]
        profile: Option<String>,
        owner: String,
        line1: String,
        #[arg(default_value = "")]
        line2: String,
        #[arg(default_value = "")]
        line3: String,
        #[arg(default_value = "")]
        line4: String,
    },

    /// List configured profiles.
    Profiles,
}

fn logger_options(profile: Option<&Profile>) -> LoggerOptions {
    profile.map_or_else(LoggerOptions::default, |p| LoggerOptions {
        level: p.log_level.to_level_filter(),
        log_dir: p.log_dir.clone(),
    })
}

fn load_config(explicit: Option<&Path>) -> Result<SyncConfig, config::ConfigError> {
    SyncConfig::load(&config::resolve_config_path(explicit))
}

async fn run(
    config: &SyncConfig,
    name: Option<&str>,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let selected = config.select(name)?;
    let total = selected.len();
    let mut failed = 0_usize;

    for (name, profile) in selected {
        let progress = IndicatifProgress::records_bar(multi, "Parsing owner addresses");
        match profile::run_profile(name, profile, progress).await {
            Ok(RunOutcome::UpToDate(decision)) => {
                log::info!("{name}: already up to date ({decision})");
            }
            Ok(RunOutcome::Updated(report)) => {
                log::info!(
                    "{name}: loaded {} parcels ({} ambiguous addresses) in {:.1}s",
                    report.appended,
                    report.transform.ambiguous,
                    report.runtime.as_secs_f64()
                );
            }
            Ok(RunOutcome::EmptyExtract) => {
                log::error!("{name}: extract was empty, destination left unchanged");
                failed += 1;
            }
            Err(e) => {
                log::error!("{name}: {e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {total} profiles did not complete").into());
    }
    Ok(())
}

async fn check(config: &SyncConfig, name: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    for (name, profile) in config.select(name)? {
        let orchestrator = profile::check_orchestrator_for(profile)?;
        let decision = orchestrator.check().await?;
        let verdict = if decision.needs_update() {
            "update needed"
        } else {
            "up to date"
        };
        println!("{name}: {verdict} ({decision})");
    }
    Ok(())
}

/// Parser configured like the named profile, or the first one. Without a
/// config only the built-in countries are known.
fn parser_for(
    config: Option<&SyncConfig>,
    name: Option<&str>,
) -> Result<AddressParser, config::ConfigError> {
    let Some(config) = config else {
        return Ok(AddressParser::default());
    };
    Ok(config
        .select(name)?
        .first()
        .map_or_else(AddressParser::default, |(_, p)| {
            AddressParser::new(p.countries())
        }))
}

fn parse(parser: &AddressParser, owner: String, lines: [String; 4]) {
    let [line1, line2, line3, line4] = lines.map(Some);
    let record = RawAddressRecord::from_columns(Some(owner), line1, line2, line3, line4);
    let outcome = parser.parse_with_outcome(&record);
    let o = &outcome.ownership;

    println!("rule:    {}", outcome.rule);
    println!("owner:   {}", o.owner);
    println!("address: {}", o.address);
    println!("city:    {}", o.city);
    println!("state:   {}", o.state);
    println!("zip:     {}", o.zip);
    println!("country: {}", o.country);
    if let Some(ambiguity) = &outcome.ambiguity {
        println!("warning: {ambiguity}");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run { profile: None });

    match command {
        Commands::Parse {
            profile,
            owner,
            line1,
            line2,
            line3,
            line4,
        } => {
            parcel_sync_cli_utils::init_logger(&LoggerOptions::default())?;
            let config = match load_config(cli.config.as_deref()) {
                Ok(config) => Some(config),
                Err(e) if profile.is_none() && cli.config.is_none() => {
                    log::debug!("No config, using built-in countries: {e}");
                    None
                }
                Err(e) => return Err(e.into()),
            };
            let parser = parser_for(config.as_ref(), profile.as_deref())?;
            parse(&parser, owner, [line1, line2, line3, line4]);
        }
        Commands::Profiles => {
            parcel_sync_cli_utils::init_logger(&LoggerOptions::default())?;
            let config = load_config(cli.config.as_deref())?;
            for (name, profile) in &config.profiles {
                println!("{name}: {} -> {}", profile.remote.label, profile.destination_table);
            }
        }
        Commands::Check { profile } => {
            parcel_sync_cli_utils::init_logger(&LoggerOptions::default())?;
            let config = load_config(cli.config.as_deref())?;
            check(&config, profile.as_deref()).await?;
        }
        Commands::Run { profile } => {
            let config = load_config(cli.config.as_deref())?;
            let first = config.select(profile.as_deref())?.first().map(|(_, p)| *p);
            let multi = parcel_sync_cli_utils::init_logger(&logger_options(first))?;
            run(&config, profile.as_deref(), &multi).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use parcel_sync_address::RuleId;

    use super::*;

    const CONFIG: &str = r#"
        [profiles.a]
        staging_dir = "/tmp/a"
        out_sr = 2226
        destination_db = "/tmp/a.duckdb"
        destination_table = "parcels"
        known_countries = ["GERMANY"]

        [profiles.b]
        staging_dir = "/tmp/b"
        out_sr = 2226
        destination_db = "/tmp/b.duckdb"
        destination_table = "parcels"
    "#;

    fn german_record() -> RawAddressRecord {
        RawAddressRecord::from_columns(
            Some("MUELLER".to_string()),
            Some("HAUPTSTRASSE 5".to_string()),
            Some("BERLIN".to_string()),
            Some(" ".to_string()),
            Some("GERMANY".to_string()),
        )
    }

    #[test]
    fn parse_uses_profile_countries() {
        let config = SyncConfig::from_toml_str(CONFIG).unwrap();

        let parser = parser_for(Some(&config), Some("a")).unwrap();
        let outcome = parser.parse_with_outcome(&german_record());
        assert_eq!(outcome.rule, RuleId::Line4Country);
        assert_eq!(outcome.ownership.country, "GERMANY");

        let parser = parser_for(Some(&config), None).unwrap();
        assert_eq!(
            parser.parse_with_outcome(&german_record()).rule,
            RuleId::Line4Country
        );
    }

    #[test]
    fn parse_without_config_knows_only_built_in_countries() {
        let config = SyncConfig::from_toml_str(CONFIG).unwrap();

        for parser in [
            parser_for(None, None).unwrap(),
            parser_for(Some(&config), Some("b")).unwrap(),
        ] {
            let outcome = parser.parse_with_outcome(&german_record());
            assert_ne!(outcome.rule, RuleId::Line4Country);
            assert!(parser.countries().contains("JAPAN"));
        }
    }

    #[test]
    fn parse_rejects_unknown_profile() {
        let config = SyncConfig::from_toml_str(CONFIG).unwrap();
        assert!(matches!(
            parser_for(Some(&config), Some("zzz")),
            Err(config::ConfigError::UnknownProfile { .. })
        ));
    }
}
