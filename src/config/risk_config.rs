use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{AlgorithmKind, RiskFlag, RiskLevel};

/// Weights of the four detectors in the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmWeights {
    pub single_bidder: f64,
    pub price_anomaly: f64,
    pub frequent_winner: f64,
    pub geographic: f64,
}

impl Default for AlgorithmWeights {
    fn default() -> Self {
        Self {
            single_bidder: 0.25,
            price_anomaly: 0.30,
            frequent_winner: 0.25,
            geographic: 0.20,
        }
    }
}

impl AlgorithmWeights {
    pub fn get(&self, kind: AlgorithmKind) -> f64 {
        match kind {
            AlgorithmKind::SingleBidder => self.single_bidder,
            AlgorithmKind::PriceAnomaly => self.price_anomaly,
            AlgorithmKind::FrequentWinner => self.frequent_winner,
            AlgorithmKind::Geographic => self.geographic,
        }
    }

    pub fn sum(&self) -> f64 {
        AlgorithmKind::ALL.iter().map(|k| self.get(*k)).sum()
    }

    /// Weights rescaled to sum to one; equal weights when the sum is not positive.
    pub fn normalized(&self) -> Self {
        let sum = self.sum();
        if !(sum > 0.0) || !sum.is_finite() {
            return Self {
                single_bidder: 0.25,
                price_anomaly: 0.25,
                frequent_winner: 0.25,
                geographic: 0.25,
            };
        }
        Self {
            single_bidder: self.single_bidder / sum,
            price_anomaly: self.price_anomaly / sum,
            frequent_winner: self.frequent_winner / sum,
            geographic: self.geographic / sum,
        }
    }
}

/// Two flags whose co-occurrence amplifies the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalPair(pub RiskFlag, pub RiskFlag);

impl CriticalPair {
    pub fn matches(&self, flags: &[RiskFlag]) -> bool {
        flags.contains(&self.0) && flags.contains(&self.1)
    }

    pub fn label(&self) -> String {
        format!("{}+{}", self.0.as_str(), self.1.as_str())
    }
}

pub fn default_critical_pairs() -> Vec<CriticalPair> {
    vec![
        CriticalPair(RiskFlag::SingleBidder, RiskFlag::HighWinRate),
        CriticalPair(RiskFlag::SingleBidder, RiskFlag::DominantMarketPosition),
        CriticalPair(RiskFlag::EstimatedValueStatisticalAnomaly, RiskFlag::HighWinRate),
        CriticalPair(RiskFlag::LocalMarketDominance, RiskFlag::SingleBidder),
        CriticalPair(RiskFlag::VeryHighRecentWinRate, RiskFlag::SingleBidder),
    ]
}

/// Names of every numeric parameter exposed through the flat configuration API.
pub const PARAMETER_KEYS: [&str; 19] = [
    "single_bidder_weight",
    "price_anomaly_weight",
    "frequent_winner_weight",
    "geographic_weight",
    "high_risk_threshold",
    "medium_risk_threshold",
    "low_risk_threshold",
    "price_z_threshold",
    "price_contamination",
    "frequent_winner_threshold",
    "geographic_threshold",
    "min_price_sample",
    "min_frequency_sample",
    "min_geographic_sample",
    "analysis_window_days",
    "recent_window_days",
    "cohort_window_days",
    "stack_critical_pairs",
    "isolation_seed",
];

/// Engine configuration snapshot.
///
/// Analyses receive an `Arc<RiskConfig>` and never observe a partially applied
/// update; mutation goes through `ConfigManager`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub version: u64,
    pub weights: AlgorithmWeights,

    pub high_risk_threshold: f64,
    pub medium_risk_threshold: f64,
    pub low_risk_threshold: f64,

    pub price_z_threshold: f64,
    pub price_contamination: f64,
    pub frequent_winner_threshold: f64,
    pub geographic_threshold: f64,

    pub min_price_sample: usize,
    pub min_frequency_sample: usize,
    pub min_geographic_sample: usize,

    pub analysis_window_days: i64,
    pub recent_window_days: i64,
    pub cohort_window_days: i64,

    pub stack_critical_pairs: bool,
    pub critical_pairs: Vec<CriticalPair>,
    pub isolation_seed: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            version: 1,
            weights: AlgorithmWeights::default(),
            high_risk_threshold: 70.0,
            medium_risk_threshold: 40.0,
            low_risk_threshold: 20.0,
            price_z_threshold: 2.0,
            price_contamination: 0.1,
            frequent_winner_threshold: 0.7,
            geographic_threshold: 0.6,
            min_price_sample: 10,
            min_frequency_sample: 5,
            min_geographic_sample: 3,
            analysis_window_days: 365,
            recent_window_days: 182,
            cohort_window_days: 730,
            stack_critical_pairs: false,
            critical_pairs: default_critical_pairs(),
            isolation_seed: 42,
        }
    }
}

impl RiskConfig {
    pub fn level_for(&self, score: f64) -> RiskLevel {
        if score >= self.high_risk_threshold {
            RiskLevel::High
        } else if score >= self.medium_risk_threshold {
            RiskLevel::Medium
        } else if score >= self.low_risk_threshold {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        }
    }

    pub fn analysis_window(&self) -> Duration {
        Duration::days(self.analysis_window_days)
    }

    pub fn recent_window(&self) -> Duration {
        Duration::days(self.recent_window_days)
    }

    pub fn cohort_window(&self) -> Duration {
        Duration::days(self.cohort_window_days)
    }

    /// Longest history any detector reads.
    pub fn max_lookback(&self) -> Duration {
        Duration::days(
            self.analysis_window_days
                .max(self.recent_window_days)
                .max(self.cohort_window_days),
        )
    }

    pub fn normalized_weights(&self) -> AlgorithmWeights {
        self.weights.normalized()
    }

    pub fn normalize_weights(&mut self) {
        self.weights = self.weights.normalized();
    }

    /// All numeric parameters by name.
    pub fn to_parameters(&self) -> BTreeMap<String, f64> {
        PARAMETER_KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|v| (key.to_string(), v)))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        let value = match key {
            "single_bidder_weight" => self.weights.single_bidder,
            "price_anomaly_weight" => self.weights.price_anomaly,
            "frequent_winner_weight" => self.weights.frequent_winner,
            "geographic_weight" => self.weights.geographic,
            "high_risk_threshold" => self.high_risk_threshold,
            "medium_risk_threshold" => self.medium_risk_threshold,
            "low_risk_threshold" => self.low_risk_threshold,
            "price_z_threshold" => self.price_z_threshold,
            "price_contamination" => self.price_contamination,
            "frequent_winner_threshold" => self.frequent_winner_threshold,
            "geographic_threshold" => self.geographic_threshold,
            "min_price_sample" => self.min_price_sample as f64,
            "min_frequency_sample" => self.min_frequency_sample as f64,
            "min_geographic_sample" => self.min_geographic_sample as f64,
            "analysis_window_days" => self.analysis_window_days as f64,
            "recent_window_days" => self.recent_window_days as f64,
            "cohort_window_days" => self.cohort_window_days as f64,
            "stack_critical_pairs" => {
                if self.stack_critical_pairs {
                    1.0
                } else {
                    0.0
                }
            }
            "isolation_seed" => self.isolation_seed as f64,
            _ => return None,
        };
        Some(value)
    }

    /// Sets one parameter, returning a description of the problem on rejection.
    pub fn set(&mut self, key: &str, value: f64) -> Result<(), String> {
        if !value.is_finite() {
            return Err(format!("{} must be a finite number, got {}", key, value));
        }
        match key {
            "single_bidder_weight" => self.weights.single_bidder = value,
            "price_anomaly_weight" => self.weights.price_anomaly = value,
            "frequent_winner_weight" => self.weights.frequent_winner = value,
            "geographic_weight" => self.weights.geographic = value,
            "high_risk_threshold" => self.high_risk_threshold = value,
            "medium_risk_threshold" => self.medium_risk_threshold = value,
            "low_risk_threshold" => self.low_risk_threshold = value,
            "price_z_threshold" => self.price_z_threshold = value,
            "price_contamination" => self.price_contamination = value,
            "frequent_winner_threshold" => self.frequent_winner_threshold = value,
            "geographic_threshold" => self.geographic_threshold = value,
            "min_price_sample" => self.min_price_sample = whole(key, value)? as usize,
            "min_frequency_sample" => self.min_frequency_sample = whole(key, value)? as usize,
            "min_geographic_sample" => self.min_geographic_sample = whole(key, value)? as usize,
            "analysis_window_days" => self.analysis_window_days = whole(key, value)? as i64,
            "recent_window_days" => self.recent_window_days = whole(key, value)? as i64,
            "cohort_window_days" => self.cohort_window_days = whole(key, value)? as i64,
            "stack_critical_pairs" => {
                self.stack_critical_pairs = match value {
                    v if v == 0.0 => false,
                    v if v == 1.0 => true,
                    _ => return Err(format!("{} must be 0 or 1, got {}", key, value)),
                }
            }
            "isolation_seed" => self.isolation_seed = whole(key, value)? as u64,
            _ => return Err(format!("unknown parameter: {}", key)),
        }
        Ok(())
    }

    /// Applies every entry of `partial`, collecting all rejections.
    pub fn apply(&mut self, partial: &BTreeMap<String, f64>) -> Vec<String> {
        partial
            .iter()
            .filter_map(|(key, value)| self.set(key, *value).err())
            .collect()
    }
}

fn whole(key: &str, value: f64) -> Result<f64, String> {
    if value < 0.0 || value.fract() != 0.0 {
        return Err(format!("{} must be a non-negative whole number, got {}", key, value));
    }
    Ok(value)
}
