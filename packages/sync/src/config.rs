//! TOML configuration.
//!
//! One file holds any number of named profiles; each profile is one
//! complete sync target (remote service, staging area, destination,
//! logging and mail settings).
//!
//! ```toml
//! [profiles.edc]
//! staging_dir = "D:/gis/staging"
//! out_sr = 2226
//! destination_db = "D:/gis/parcels.duckdb"
//! destination_table = "parcels"
//! log_dir = "D:/gis/logs"
//! log_level = "info"
//!
//! [profiles.edc.email]
//! relay = "smtp.example.org"
//! username = "gis-alerts@example.org"
//! password = "..."
//! recipients = ["gis-team@example.org"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use parcel_sync_address::KnownCountries;
use parcel_sync_dataset::DatasetConfig;
use parcel_sync_extract::{ArcGisExtractConfig, PollPolicy, PollPolicyError};
use parcel_sync_notify::EmailConfig;
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};

/// File read when neither `--config` nor [`CONFIG_ENV_VAR`] is given.
pub const DEFAULT_CONFIG_FILE: &str = "parcel_sync.toml";

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "PARCEL_SYNC_CONFIG";

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Config path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the expected shape.
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The file defines no profiles.
    #[error("Config defines no profiles")]
    NoProfiles,

    /// A requested profile does not exist.
    #[error("Unknown profile {name:?} (available: {})", available.join(", "))]
    UnknownProfile {
        /// Requested name.
        name: String,
        /// Configured names.
        available: Vec<String>,
    },

    /// A profile's `[polling]` table cannot be honored.
    #[error("Profile {profile:?} has invalid polling settings: {source}")]
    InvalidPolling {
        profile: String,
        source: PollPolicyError,
    },
}

/// Logging verbosity. Parsed case-insensitively (`INFO` and `info` both work).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, AsRefStr, EnumString, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[strum(ascii_case_insensitive)]
#[serde(try_from = "String")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl TryFrom<String> for LogLevel {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, <Self as TryFrom<String>>::Error> {
        Self::from_str(value.trim())
    }
}

impl LogLevel {
    #[must_use]
    pub const fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Off => log::LevelFilter::Off,
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_timestamp_column() -> String {
    "poly_creat".to_string()
}

/// One sync target.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    /// Directory extracts are downloaded and unpacked into.
    pub staging_dir: PathBuf,
    /// Spatial reference (WKID) the extract is projected to.
    pub out_sr: u32,
    /// `DuckDB` file holding the destination table.
    pub destination_db: PathBuf,
    pub destination_table: String,
    /// Destination column compared against the remote last-modified time.
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
    /// Directory for daily log files. Logs go to stderr when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_level: LogLevel,
    /// Mail settings. Without them notifications are only logged.
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub remote: ArcGisExtractConfig,
    #[serde(default)]
    pub polling: PollPolicy,
    /// Extra country names recognized on the last address line.
    #[serde(default)]
    pub known_countries: Vec<String>,
}

impl Profile {
    /// Countries the address parser treats as a bare country line.
    #[must_use]
    pub fn countries(&self) -> KnownCountries {
        KnownCountries::default().extended(&self.known_countries)
    }

    #[must_use]
    pub fn dataset_config(&self) -> DatasetConfig {
        DatasetConfig::new(&self.destination_table)
            .with_timestamp_column(&self.timestamp_column)
    }

    /// Subject prefix for notifications.
    #[must_use]
    pub fn subject_prefix(&self) -> &str {
        self.email
            .as_ref()
            .map_or("PRODUCTION", |e| e.subject_prefix.as_str())
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl SyncConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text is not valid or has no profiles.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        if config.profiles.is_empty() {
            return Err(ConfigError::NoProfiles);
        }
        for (name, profile) in &config.profiles {
            profile
                .polling
                .validate()
                .map_err(|source| ConfigError::InvalidPolling {
                    profile: name.clone(),
                    source,
                })?;
        }
        Ok(config)
    }

    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        log::debug!("Loading config from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&text)
    }

    /// Profiles to run: the named one, or all of them in name order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownProfile`] if `name` is not configured.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<(&str, &Profile)>, ConfigError> {
        match name {
            Some(name) => self
                .profiles
                .get_key_value(name)
                .map(|(k, v)| vec![(k.as_str(), v)])
                .ok_or_else(|| ConfigError::UnknownProfile {
                    name: name.to_string(),
                    available: self.profiles.keys().cloned().collect(),
                }),
            None => Ok(self
                .profiles
                .iter()
                .map(|(k, v)| (k.as_str(), v))
                .collect()),
        }
    }
}

/// Where to read configuration from: `explicit` if given, else
/// [`CONFIG_ENV_VAR`], else [`DEFAULT_CONFIG_FILE`] in the working
/// directory.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(
        || {
            std::env::var_os(CONFIG_ENV_VAR)
                .filter(|v| !v.is_empty())
                .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
        },
        Path::to_path_buf,
    )
}
