//! Deployment configuration.
//!
//! Loaded from TOML, then overridden from the environment:
//! - `QUOTEVAULT_ROOT`: store root
//! - `QUOTEVAULT_ALT_ROOT`: alternate store (e.g. a scratch or test store);
//!   wins over `QUOTEVAULT_ROOT`
//! - `QUOTEVAULT_LOG`: log filter

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use quotevault_core::calendar::{CalendarError, FixedCalendar, NyseCalendar, TradingCalendar};
use quotevault_core::store::ArtifactStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub const ENV_ROOT: &str = "QUOTEVAULT_ROOT";
pub const ENV_ALT_ROOT: &str = "QUOTEVAULT_ALT_ROOT";
pub const ENV_LOG: &str = "QUOTEVAULT_LOG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("calendar: {0}")]
    Calendar(#[from] CalendarError),

    #[error("cannot open store at {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarKind {
    #[default]
    Nyse,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalendarConfig {
    pub kind: CalendarKind,
    /// Extra full-day closures for the NYSE calendar.
    pub extra_holidays: Vec<NaiveDate>,
    /// Session list for `kind = "fixed"`, relative to the config file.
    pub sessions_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    /// Store root: blobs in `{root}/blobs`, records in `{root}/artifacts`.
    pub root: PathBuf,
    /// Offset applied when displaying timestamps.
    pub timezone_offset_hours: i32,
    pub log_level: String,
    pub calendar: CalendarConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            timezone_offset_hours: 0,
            log_level: "warn".into(),
            calendar: CalendarConfig::default(),
        }
    }
}

impl VaultConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: VaultConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file. Relative paths inside it resolve against its directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.root = base.join(&config.root);
            if let Some(sessions) = &config.calendar.sessions_file {
                config.calendar.sessions_file = Some(base.join(sessions));
            }
        }
        Ok(config)
    }

    /// Apply env overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply env-style overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(root) = non_empty(ENV_ALT_ROOT).or_else(|| non_empty(ENV_ROOT)) {
            self.root = PathBuf::from(root);
        }
        if let Some(level) = non_empty(ENV_LOG) {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-12..=14).contains(&self.timezone_offset_hours) {
            return Err(ConfigError::Invalid(format!(
                "timezone_offset_hours must be within -12..=14, got {}",
                self.timezone_offset_hours
            )));
        }
        if self.calendar.kind == CalendarKind::Fixed && self.calendar.sessions_file.is_none() {
            return Err(ConfigError::Invalid(
                "calendar.kind = \"fixed\" requires calendar.sessions_file".into(),
            ));
        }
        Ok(())
    }

    pub fn build_calendar(&self) -> Result<Arc<dyn TradingCalendar>, ConfigError> {
        match self.calendar.kind {
            CalendarKind::Nyse => Ok(Arc::new(
                NyseCalendar::new().with_extra_holidays(self.calendar.extra_holidays.iter().copied()),
            )),
            CalendarKind::Fixed => {
                let path = self.calendar.sessions_file.as_deref().ok_or_else(|| {
                    ConfigError::Invalid("fixed calendar without sessions_file".into())
                })?;
                Ok(Arc::new(FixedCalendar::load(path)?))
            }
        }
    }

    pub fn open_store(&self) -> Result<ArtifactStore, ConfigError> {
        ArtifactStore::open(&self.root).map_err(|source| ConfigError::Store {
            path: self.root.clone(),
            source,
        })
    }

    /// Render `instant` in the configured display offset.
    pub fn display_time(&self, instant: DateTime<Utc>) -> String {
        match FixedOffset::east_opt(self.timezone_offset_hours * 3600) {
            Some(offset) => instant.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S %:z").to_string(),
            None => instant.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }
}
