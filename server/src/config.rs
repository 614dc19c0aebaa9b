use std::{
    fs,
    path::Path,
    time::{Duration, SystemTime},
};

use protocol::{DatasetType, WorkKind};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// One dataset version the server keeps models trained for.
///
/// Versions are owned by configuration; the engine only reads targets and
/// requests work to close the gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionConfig {
    /// Unique version name, also the key into the asset store.
    pub name: String,
    #[serde(default)]
    pub dataset_type: DatasetType,
    /// Number of trained models to keep available.
    pub target_models: usize,
    /// Creation timestamp; the newest version becomes current at startup.
    #[serde(default = "SystemTime::now")]
    pub created: SystemTime,
}

/// Per-kind watchdog durations. Training runs for days; prediction has a
/// human waiting on the other end and must come back within minutes.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub training: Duration,
    pub prediction: Duration,
}

impl Timeouts {
    pub fn for_kind(&self, kind: WorkKind) -> Duration {
        match kind {
            WorkKind::Training => self.training,
            WorkKind::Prediction => self.prediction,
        }
    }
}

/// Server-wide configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub versions: Vec<VersionConfig>,
    /// Fraction of connected workers kept prediction-only (0.0 disables).
    #[serde(default)]
    pub reserve_fraction: f64,
    /// Hard cap on simultaneously queued work items.
    #[serde(default = "default_max_queued")]
    pub max_queued: usize,
    #[serde(default = "default_training_timeout")]
    pub training_timeout_secs: u64,
    #[serde(default = "default_prediction_timeout")]
    pub prediction_timeout_secs: u64,
    /// Interval of the periodic demand check.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Interval of the periodic status report.
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
}

fn default_max_queued() -> usize {
    400
}

// 3.5 days; long enough for a full training run on a slow worker.
fn default_training_timeout() -> u64 {
    302_400
}

// 20 minutes.
fn default_prediction_timeout() -> u64 {
    1_200
}

fn default_check_interval() -> u64 {
    3_600
}

fn default_status_interval() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
            reserve_fraction: 0.0,
            max_queued: default_max_queued(),
            training_timeout_secs: default_training_timeout(),
            prediction_timeout_secs: default_prediction_timeout(),
            check_interval_secs: default_check_interval(),
            status_interval_secs: default_status_interval(),
        }
    }
}

impl Config {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    /// Returns `ServerError::Io` if the file cannot be read and
    /// `ServerError::InvalidConfig` if it does not parse or validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| ServerError::InvalidConfig(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the value ranges and the uniqueness of version names.
    ///
    /// # Errors
    /// Returns `ServerError::InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.reserve_fraction) {
            return Err(ServerError::InvalidConfig(format!(
                "reserve_fraction must be within 0.0..=1.0, got {}",
                self.reserve_fraction
            )));
        }
        if self.max_queued == 0 {
            return Err(ServerError::InvalidConfig(
                "max_queued must be greater than zero".into(),
            ));
        }
        if self.training_timeout_secs == 0 || self.prediction_timeout_secs == 0 {
            return Err(ServerError::InvalidConfig(
                "timeouts must be greater than zero".into(),
            ));
        }
        for (i, version) in self.versions.iter().enumerate() {
            if version.name.is_empty() {
                return Err(ServerError::InvalidConfig(format!(
                    "version {i} has an empty name"
                )));
            }
            if self.versions[..i].iter().any(|v| v.name == version.name) {
                return Err(ServerError::InvalidConfig(format!(
                    "duplicate version name: {}",
                    version.name
                )));
            }
        }
        Ok(())
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            training: Duration::from_secs(self.training_timeout_secs),
            prediction: Duration::from_secs(self.prediction_timeout_secs),
        }
    }

    /// The newest configured version; predictions run against it.
    pub fn current_version(&self) -> Option<&VersionConfig> {
        self.versions.iter().max_by_key(|v| v.created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(name: &str, created: SystemTime) -> VersionConfig {
        VersionConfig {
            name: name.into(),
            dataset_type: DatasetType::Generic,
            target_models: 1,
            created,
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_queued, 400);
        assert_eq!(config.timeouts().training, Duration::from_secs(302_400));
        assert_eq!(config.timeouts().prediction, Duration::from_secs(1_200));
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_out_of_range_reserve_fraction() {
        let config = Config {
            reserve_fraction: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_version_names() {
        let now = SystemTime::now();
        let config = Config {
            versions: vec![version("v1", now), version("v1", now)],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_current_version_is_newest() {
        let old = SystemTime::UNIX_EPOCH;
        let new = SystemTime::now();
        let config = Config {
            versions: vec![version("old", old), version("new", new)],
            ..Config::default()
        };
        assert_eq!(config.current_version().unwrap().name, "new");
    }
}
