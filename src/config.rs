use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::Selection;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/cleanback/config.toml";
pub const DEFAULT_BACKUPS_ROOT: &str = "/Backups";
pub const DEFAULT_SNAPSHOT_GROUP: &str = "backup-docker-to-local";
const ENV_PREFIX: &str = "CLEANBACK_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("workers must be at least 1")]
    NoWorkers,

    #[error("timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),

    #[error("dirval_cmd must not be empty")]
    EmptyCommand,

    #[error("snapshot_groups must name at least one folder")]
    NoSnapshotGroups,

    #[error("invalid snapshot group name {0:?}: must be a single folder name")]
    InvalidSnapshotGroup(String),

    #[error("invalid job id {0:?}: must be a relative path inside the backups root")]
    InvalidJobId(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub backups_root: PathBuf,
    pub dirval_cmd: String,
    pub workers: usize,
    /// Per-candidate validator timeout in seconds
    pub timeout: f64,
    pub force_keep: usize,
    pub yes: bool,
    pub snapshot_groups: Vec<String>,
    pub verbose: bool,
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backups_root: PathBuf::from(DEFAULT_BACKUPS_ROOT),
            dirval_cmd: "dirval".to_string(),
            workers: 4,
            timeout: 300.0,
            force_keep: 0,
            yes: false,
            snapshot_groups: vec![DEFAULT_SNAPSHOT_GROUP.to_string()],
            verbose: false,
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Load the layered configuration: defaults, TOML file, `CLEANBACK_*`
    /// environment, then command-line overrides.
    ///
    /// A missing config file is silently skipped.
    pub fn new<T: Serialize>(config_file: &Path, overrides: Option<&T>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }

        if !self.timeout.is_finite() || self.timeout <= 0.0 {
            return Err(ConfigError::InvalidTimeout(self.timeout));
        }

        if self.dirval_cmd.trim().is_empty() {
            return Err(ConfigError::EmptyCommand);
        }

        if self.snapshot_groups.is_empty() {
            return Err(ConfigError::NoSnapshotGroups);
        }

        for group in &self.snapshot_groups {
            let mut components = Path::new(group).components();
            let single_name = matches!(
                (components.next(), components.next()),
                (Some(Component::Normal(_)), None)
            );
            if !single_name {
                return Err(ConfigError::InvalidSnapshotGroup(group.clone()));
            }
        }

        Ok(())
    }

    pub fn timeout_duration(&self) -> Duration {
        // validate() guarantees a finite positive value
        Duration::try_from_secs_f64(self.timeout).unwrap_or(Duration::MAX)
    }
}

/// Turn the `--id`/`--all` pair into a [`Selection`].
///
/// A job id may span several path segments (`site-a/ID1`) but must stay
/// below the backups root.
pub fn parse_selection(id: Option<&str>, all: bool) -> Result<Selection, ConfigError> {
    match id {
        Some(id) => {
            let path = Path::new(id);
            let relative = !id.is_empty()
                && path
                    .components()
                    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
                && path.components().any(|c| matches!(c, Component::Normal(_)));
            if !relative {
                return Err(ConfigError::InvalidJobId(id.to_string()));
            }
            let normalized: PathBuf = path
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .collect();
            Ok(Selection::Job(normalized.to_string_lossy().into_owned()))
        }
        None if all => Ok(Selection::All),
        None => Err(ConfigError::InvalidJobId(String::new())),
    }
}
