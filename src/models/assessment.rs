use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::models::RiskFlag;
use crate::risk::metrics::DetectorResult;

/// Schema version of [`AssessmentDetail`]; bump when fields change meaning.
pub const DETAIL_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [RiskLevel::Minimal, RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Minimal => "MINIMAL",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }

    /// Whether results at this level should raise an alert.
    pub fn requires_alert(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Medium)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four independent detectors feeding the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    SingleBidder,
    PriceAnomaly,
    FrequentWinner,
    Geographic,
}

impl AlgorithmKind {
    /// Detector order; flags are merged in this order.
    pub const ALL: [AlgorithmKind; 4] = [
        AlgorithmKind::SingleBidder,
        AlgorithmKind::PriceAnomaly,
        AlgorithmKind::FrequentWinner,
        AlgorithmKind::Geographic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::SingleBidder => "single_bidder",
            AlgorithmKind::PriceAnomaly => "price_anomaly",
            AlgorithmKind::FrequentWinner => "frequent_winner",
            AlgorithmKind::Geographic => "geographic",
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-algorithm scores on the 0-100 scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub single_bidder: f64,
    pub price_anomaly: f64,
    pub frequent_winner: f64,
    pub geographic: f64,
}

impl SubScores {
    pub fn get(&self, kind: AlgorithmKind) -> f64 {
        match kind {
            AlgorithmKind::SingleBidder => self.single_bidder,
            AlgorithmKind::PriceAnomaly => self.price_anomaly,
            AlgorithmKind::FrequentWinner => self.frequent_winner,
            AlgorithmKind::Geographic => self.geographic,
        }
    }

    pub fn set(&mut self, kind: AlgorithmKind, value: f64) {
        match kind {
            AlgorithmKind::SingleBidder => self.single_bidder = value,
            AlgorithmKind::PriceAnomaly => self.price_anomaly = value,
            AlgorithmKind::FrequentWinner => self.frequent_winner = value,
            AlgorithmKind::Geographic => self.geographic = value,
        }
    }
}

/// One multiplicative amplification applied on top of the weighted score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmplificationStep {
    pub rule: String,
    pub factor: f64,
}

/// How the composite score was assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeBreakdown {
    pub weights: SubScores,
    pub weighted_score: f64,
    pub amplification: Vec<AmplificationStep>,
    pub amplification_factor: f64,
    pub base_confidence: f64,
    pub high_risk_algorithms: usize,
    pub medium_risk_algorithms: usize,
}

/// Typed, versioned detail payload stored with every assessment.
///
/// `extensions` carries additional keyed data (batch statistics and the like)
/// without breaking readers of older schema versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentDetail {
    pub schema_version: u32,
    pub detectors: Vec<DetectorResult>,
    pub composite: CompositeBreakdown,
    #[serde(default)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl AssessmentDetail {
    pub fn detector(&self, kind: AlgorithmKind) -> Option<&DetectorResult> {
        self.detectors.iter().find(|d| d.kind == kind)
    }
}

/// Composite engine output for one tender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: Uuid,
    pub tender_id: Uuid,
    pub score: f64,
    pub level: RiskLevel,
    pub flags: Vec<RiskFlag>,
    pub sub_scores: SubScores,
    pub confidence: f64,
    pub detail: AssessmentDetail,
    pub analyzed_at: DateTime<Utc>,
    pub algorithm_version: String,
    pub config_version: u64,
}

impl RiskAssessment {
    pub fn has_flag(&self, flag: RiskFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Comma separated flag names, as used in alert messages.
    pub fn flag_summary(&self) -> String {
        self.flags
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
