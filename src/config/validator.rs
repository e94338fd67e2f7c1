use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RiskConfig;
use crate::models::AlgorithmKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid range: {field} must be between {min} and {max}, got {value}")]
    InvalidRange { field: String, min: f64, max: f64, value: f64 },
    #[error("Invalid weights: {message}")]
    InvalidWeights { message: String },
    #[error("Inverted thresholds: {higher} ({higher_value}) must exceed {lower} ({lower_value})")]
    InvertedThresholds {
        higher: String,
        higher_value: f64,
        lower: String,
        lower_value: f64,
    },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Outcome of validating a configuration candidate.
///
/// Issues make a configuration unusable; warnings describe settings that
/// work but are probably unintended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigValidationReport {
    pub valid: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigValidationReport {
    fn from_parts(issues: Vec<ValidationError>, warnings: Vec<String>) -> Self {
        Self {
            valid: issues.is_empty(),
            issues: issues.iter().map(ToString::to_string).collect(),
            warnings,
        }
    }
}

/// Bounds applied to engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRules {
    pub weight_sum_tolerance: f64,
    pub score_range: (f64, f64),
    pub z_threshold_range: (f64, f64),
    pub contamination_range: (f64, f64),
    pub ratio_range: (f64, f64),
    pub window_days_range: (i64, i64),
    pub recommended_price_sample: usize,
    pub recommended_frequency_sample: usize,
    pub recommended_geographic_sample: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            weight_sum_tolerance: 0.01,
            score_range: (0.0, 100.0),
            z_threshold_range: (0.1, 10.0),
            contamination_range: (0.001, 0.5),
            ratio_range: (0.0, 1.0),
            window_days_range: (1, 730),
            recommended_price_sample: 5,
            recommended_frequency_sample: 3,
            recommended_geographic_sample: 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigValidator {
    rules: ValidationRules,
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: ValidationRules) -> Self {
        Self { rules }
    }

    pub fn validate(&self, config: &RiskConfig) -> ConfigValidationReport {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        self.validate_weights(config, &mut issues, &mut warnings);
        self.validate_thresholds(config, &mut issues);
        self.validate_detector_parameters(config, &mut issues);
        self.validate_samples(config, &mut issues, &mut warnings);
        self.validate_windows(config, &mut issues, &mut warnings);

        if config.stack_critical_pairs && config.critical_pairs.len() > 3 {
            warnings.push(format!(
                "stacking {} critical pairs can saturate the score",
                config.critical_pairs.len()
            ));
        }

        ConfigValidationReport::from_parts(issues, warnings)
    }

    fn validate_weights(
        &self,
        config: &RiskConfig,
        issues: &mut Vec<ValidationError>,
        warnings: &mut Vec<String>,
    ) {
        for kind in AlgorithmKind::ALL {
            let weight = config.weights.get(kind);
            if !weight.is_finite() || weight < 0.0 {
                issues.push(ValidationError::InvalidWeights {
                    message: format!("{} weight must be non-negative, got {}", kind, weight),
                });
            }
        }
        let sum = config.weights.sum();
        if !(sum > 0.0) {
            issues.push(ValidationError::InvalidWeights {
                message: format!("weights must sum to a positive value, got {}", sum),
            });
        } else if (sum - 1.0).abs() > self.rules.weight_sum_tolerance {
            warnings.push(format!(
                "weights sum to {:.3}; they will be normalized to 1.0",
                sum
            ));
        }
    }

    fn validate_thresholds(&self, config: &RiskConfig, issues: &mut Vec<ValidationError>) {
        let (min, max) = self.rules.score_range;
        for (field, value) in [
            ("high_risk_threshold", config.high_risk_threshold),
            ("medium_risk_threshold", config.medium_risk_threshold),
            ("low_risk_threshold", config.low_risk_threshold),
        ] {
            if let Err(e) = self.validate_range(field, value, min, max) {
                issues.push(e);
            }
        }
        if config.high_risk_threshold <= config.medium_risk_threshold {
            issues.push(ValidationError::InvertedThresholds {
                higher: "high_risk_threshold".to_string(),
                higher_value: config.high_risk_threshold,
                lower: "medium_risk_threshold".to_string(),
                lower_value: config.medium_risk_threshold,
            });
        }
        if config.medium_risk_threshold <= config.low_risk_threshold {
            issues.push(ValidationError::InvertedThresholds {
                higher: "medium_risk_threshold".to_string(),
                higher_value: config.medium_risk_threshold,
                lower: "low_risk_threshold".to_string(),
                lower_value: config.low_risk_threshold,
            });
        }
    }

    fn validate_detector_parameters(&self, config: &RiskConfig, issues: &mut Vec<ValidationError>) {
        let (z_min, z_max) = self.rules.z_threshold_range;
        let (c_min, c_max) = self.rules.contamination_range;
        let (r_min, r_max) = self.rules.ratio_range;
        let checks = [
            ("price_z_threshold", config.price_z_threshold, z_min, z_max),
            ("price_contamination", config.price_contamination, c_min, c_max),
            ("frequent_winner_threshold", config.frequent_winner_threshold, r_min, r_max),
            ("geographic_threshold", config.geographic_threshold, r_min, r_max),
        ];
        for (field, value, min, max) in checks {
            if let Err(e) = self.validate_range(field, value, min, max) {
                issues.push(e);
            }
        }
    }

    fn validate_samples(
        &self,
        config: &RiskConfig,
        issues: &mut Vec<ValidationError>,
        warnings: &mut Vec<String>,
    ) {
        let samples = [
            ("min_price_sample", config.min_price_sample, self.rules.recommended_price_sample),
            (
                "min_frequency_sample",
                config.min_frequency_sample,
                self.rules.recommended_frequency_sample,
            ),
            (
                "min_geographic_sample",
                config.min_geographic_sample,
                self.rules.recommended_geographic_sample,
            ),
        ];
        for (field, value, recommended) in samples {
            if value == 0 {
                issues.push(ValidationError::InvalidParameter(format!(
                    "{} must be at least 1",
                    field
                )));
            } else if value < recommended {
                warnings.push(format!(
                    "{} of {} is small; results may be unreliable below {}",
                    field, value, recommended
                ));
            }
        }
    }

    fn validate_windows(
        &self,
        config: &RiskConfig,
        issues: &mut Vec<ValidationError>,
        warnings: &mut Vec<String>,
    ) {
        let (min, max) = self.rules.window_days_range;
        for (field, value) in [
            ("analysis_window_days", config.analysis_window_days),
            ("recent_window_days", config.recent_window_days),
            ("cohort_window_days", config.cohort_window_days),
        ] {
            if let Err(e) = self.validate_range(field, value as f64, min as f64, max as f64) {
                issues.push(e);
            }
        }
        if config.recent_window_days > config.analysis_window_days {
            warnings.push(format!(
                "recent_window_days ({}) exceeds analysis_window_days ({})",
                config.recent_window_days, config.analysis_window_days
            ));
        }
    }

    pub fn validate_range(&self, field: &str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
        if !value.is_finite() || value < min || value > max {
            return Err(ValidationError::InvalidRange {
                field: field.to_string(),
                min,
                max,
                value,
            });
        }
        Ok(())
    }
}
