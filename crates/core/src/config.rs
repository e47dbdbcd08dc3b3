// crates/core/src/config.rs
//! Runtime configuration.
//!
//! Layering, lowest to highest: built-in defaults, a TOML file, `STATION_VIEW_*`
//! environment variables. Command-line flags are applied last by the binary.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::bucket::{TimeRange, MAX_RANGE_DAYS};
use crate::error::ConfigError;
use crate::paths;

pub const DEFAULT_LOOKBACK_DAYS: u32 = 90;
pub const DEFAULT_BATCH_SIZE: u32 = 500;
pub const DEFAULT_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_MAX_PARALLEL: usize = 4;
pub const DEFAULT_PORT: u16 = 47900;

pub const ENV_DB: &str = "STATION_VIEW_DB";
pub const ENV_ARTIFACT_DIR: &str = "STATION_VIEW_ARTIFACT_DIR";
pub const ENV_PORT: &str = "STATION_VIEW_PORT";
pub const ENV_INTERVAL_SECS: &str = "STATION_VIEW_INTERVAL_SECS";
pub const ENV_LOG_DIR: &str = "STATION_VIEW_LOG_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// SQLite record store.
    pub db_path: PathBuf,
    /// Where `<station>_graph.json` files are written and served from.
    pub artifact_dir: PathBuf,
    /// Width of the default rollup range, ending now.
    pub lookback_days: u32,
    /// Rows per store page.
    pub batch_size: u32,
    /// Delay between runs in continuous mode.
    pub interval_secs: u64,
    /// Stations rolled up concurrently.
    pub max_parallel: usize,
    pub port: u16,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
    /// When set, logs also go to a daily rolling file in this directory.
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: false,
            dir: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = paths::app_data_dir().unwrap_or_else(|| PathBuf::from(".station-view"));
        Self {
            db_path: paths::db_path().unwrap_or_else(|| data_dir.join("records.db")),
            artifact_dir: paths::artifact_dir().unwrap_or_else(|| data_dir.join("artifacts")),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            batch_size: DEFAULT_BATCH_SIZE,
            interval_secs: DEFAULT_INTERVAL_SECS,
            max_parallel: DEFAULT_MAX_PARALLEL,
            port: DEFAULT_PORT,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load from `explicit` (must exist) or the default config file (optional),
    /// then apply the process environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match paths::config_file() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Invalid {
            path: path.to_owned(),
            message: e.message().to_owned(),
        })
    }

    /// Override fields from environment variables resolved by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_DB) {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_ARTIFACT_DIR) {
            self.artifact_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_PORT) {
            self.port = parse_env(ENV_PORT, v)?;
        }
        if let Some(v) = lookup(ENV_INTERVAL_SECS) {
            self.interval_secs = parse_env(ENV_INTERVAL_SECS, v)?;
        }
        if let Some(v) = lookup(ENV_LOG_DIR) {
            self.log.dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, u64); 3] = [
            ("batch_size", u64::from(self.batch_size)),
            ("interval_secs", self.interval_secs),
            ("max_parallel", self.max_parallel as u64),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::OutOfRange {
                    field,
                    value: value.to_string(),
                });
            }
        }
        if self.lookback_days > MAX_RANGE_DAYS {
            return Err(self.lookback_out_of_range());
        }
        Ok(())
    }

    /// The trailing `lookback_days` window ending at `now`.
    pub fn default_range(&self, now: NaiveDateTime) -> Result<TimeRange, ConfigError> {
        if self.lookback_days > MAX_RANGE_DAYS {
            return Err(self.lookback_out_of_range());
        }
        TimeRange::last_days(now, self.lookback_days).ok_or_else(|| self.lookback_out_of_range())
    }

    fn lookback_out_of_range(&self) -> ConfigError {
        ConfigError::OutOfRange {
            field: "lookback_days",
            value: self.lookback_days.to_string(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::BadEnv { var, value })
}
