use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::RiskConfig;
use crate::error::RiskError;

/// Default settings file, resolved relative to the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "config/tender-risk";

/// Prefix of environment overrides, e.g. `TENDER_RISK__CACHE__TTL_SECONDS=60`.
pub const ENV_PREFIX: &str = "TENDER_RISK";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Engine parameter overrides keyed by parameter name.
    pub engine: BTreeMap<String, f64>,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
    pub batch: BatchSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_seconds: u64,
    pub max_capacity: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            max_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Tenders scored together before results are persisted.
    pub chunk_size: usize,
    pub recent_window_days: i64,
    pub high_risk_limit: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            recent_window_days: 30,
            high_risk_limit: 50,
        }
    }
}

impl Settings {
    /// Load settings from `.env`, the default settings file (if present) and
    /// `TENDER_RISK__*` environment variables, later sources winning.
    pub fn new() -> Result<Self, RiskError> {
        dotenvy::dotenv().ok();
        let builder = config::Config::builder()
            .add_source(config::File::with_name(DEFAULT_SETTINGS_FILE).required(false));
        Self::build(builder)
    }

    /// Load settings from an explicit file, still honouring environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, RiskError> {
        dotenvy::dotenv().ok();
        let builder = config::Config::builder().add_source(config::File::from(path).required(true));
        Self::build(builder)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, RiskError> {
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Engine configuration with the overrides from `engine` applied.
    pub fn risk_config(&self) -> Result<RiskConfig, RiskError> {
        let mut config = RiskConfig::default();
        let issues = config.apply(&self.engine);
        if !issues.is_empty() {
            return Err(RiskError::InvalidConfiguration { issues });
        }
        Ok(config)
    }
}
