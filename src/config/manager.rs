use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::validator::{ConfigValidationReport, ConfigValidator};
use super::RiskConfig;
use crate::error::RiskError;

/// Owner of the live engine configuration.
///
/// Readers take an immutable `Arc` snapshot; updates are validated on a copy
/// and swapped in whole, so an invalid update leaves nothing behind.
pub struct ConfigManager {
    config: Arc<RwLock<Arc<RiskConfig>>>,
    validator: ConfigValidator,
}

impl ConfigManager {
    /// Create a manager after validating the initial configuration.
    pub fn new(config: RiskConfig) -> Result<Self, RiskError> {
        Self::with_validator(config, ConfigValidator::new())
    }

    pub fn with_validator(mut config: RiskConfig, validator: ConfigValidator) -> Result<Self, RiskError> {
        let report = validator.validate(&config);
        if !report.valid {
            return Err(RiskError::InvalidConfiguration { issues: report.issues });
        }
        for warning in &report.warnings {
            warn!(warning = %warning, "Risk configuration warning");
        }
        config.normalize_weights();
        Ok(Self {
            config: Arc::new(RwLock::new(Arc::new(config))),
            validator,
        })
    }

    /// Current configuration snapshot.
    pub async fn snapshot(&self) -> Arc<RiskConfig> {
        self.config.read().await.clone()
    }

    pub async fn version(&self) -> u64 {
        self.config.read().await.version
    }

    pub async fn parameters(&self) -> BTreeMap<String, f64> {
        self.config.read().await.to_parameters()
    }

    pub async fn get(&self, key: &str) -> Option<f64> {
        self.config.read().await.get(key)
    }

    /// Validate the live configuration.
    pub async fn validate(&self) -> ConfigValidationReport {
        let current = self.snapshot().await;
        self.validator.validate(&current)
    }

    /// Validate a candidate without applying it.
    pub fn validate_candidate(&self, candidate: &RiskConfig) -> ConfigValidationReport {
        self.validator.validate(candidate)
    }

    /// Apply a partial update keyed by parameter name.
    ///
    /// Either every key is applied and the version increments, or the live
    /// configuration is untouched and the issues are returned.
    pub async fn update(&self, partial: &BTreeMap<String, f64>) -> Result<ConfigValidationReport, RiskError> {
        let mut guard = self.config.write().await;
        let mut candidate = RiskConfig::clone(&guard);

        let mut issues = candidate.apply(partial);
        let report = self.validator.validate(&candidate);
        issues.extend(report.issues.iter().cloned());
        if !issues.is_empty() {
            warn!(issue_count = issues.len(), "Rejected risk configuration update");
            return Err(RiskError::InvalidConfiguration { issues });
        }

        candidate.normalize_weights();
        candidate.version = guard.version + 1;
        info!(
            version = candidate.version,
            updated_keys = partial.len(),
            "Risk configuration updated"
        );
        *guard = Arc::new(candidate);
        Ok(report)
    }

    /// Replace the whole configuration, keeping the version sequence.
    pub async fn replace(&self, mut config: RiskConfig) -> Result<ConfigValidationReport, RiskError> {
        let report = self.validator.validate(&config);
        if !report.valid {
            return Err(RiskError::InvalidConfiguration { issues: report.issues });
        }
        let mut guard = self.config.write().await;
        config.normalize_weights();
        config.version = guard.version + 1;
        *guard = Arc::new(config);
        Ok(report)
    }
}
