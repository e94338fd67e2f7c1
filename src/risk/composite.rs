// Composite risk scoring across all detectors
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RiskConfig;
use crate::database::MarketView;
use crate::models::{
    AlgorithmKind, AmplificationStep, AssessmentDetail, CompositeBreakdown, RiskAssessment, RiskFlag, RiskLevel,
    SubScores, Tender, DETAIL_SCHEMA_VERSION,
};
use crate::risk::calculators::{
    FrequentWinnerDetector, GeographicClusteringDetector, PriceAnomalyDetector, SingleBidderDetector,
};
use crate::risk::metrics::DetectorResult;
use crate::risk::RiskDetector;
use crate::utils::math;

/// Version stamped on every assessment produced by this scorer.
pub const ALGORITHM_VERSION: &str = "2.1.0";

/// Individual detector score above which a detector counts as high risk.
pub const HIGH_SIGNAL_SCORE: f64 = 70.0;
/// Lower bound of the medium band used by amplification.
pub const MEDIUM_SIGNAL_SCORE: f64 = 40.0;

const CRITICAL_PAIR_FACTOR: f64 = 1.25;
const HIGH_VALUE_SINGLE_BIDDER_FACTOR: f64 = 1.2;

/// Runs every detector and folds their results into one [`RiskAssessment`].
pub struct CompositeRiskScorer {
    detectors: Vec<Box<dyn RiskDetector>>,
}

impl Default for CompositeRiskScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeRiskScorer {
    pub fn new() -> Self {
        Self::with_detectors(vec![
            Box::new(SingleBidderDetector::new()),
            Box::new(PriceAnomalyDetector::new()),
            Box::new(FrequentWinnerDetector::new()),
            Box::new(GeographicClusteringDetector::new()),
        ])
    }

    /// Build a scorer from an explicit detector set. Detectors are kept in
    /// [`AlgorithmKind::ALL`] order so flag merging stays deterministic.
    pub fn with_detectors(mut detectors: Vec<Box<dyn RiskDetector>>) -> Self {
        detectors.sort_by_key(|d| d.kind());
        Self { detectors }
    }

    pub fn detectors(&self) -> impl Iterator<Item = &dyn RiskDetector> {
        self.detectors.iter().map(|d| d.as_ref())
    }

    pub fn score(
        &self,
        tender: &Tender,
        market: &dyn MarketView,
        config: &RiskConfig,
        analyzed_at: DateTime<Utc>,
    ) -> RiskAssessment {
        let results = self
            .detectors
            .iter()
            .map(|detector| detector.analyze(tender, market, config))
            .collect();
        self.combine(tender.id, results, config, analyzed_at)
    }

    /// Score a batch against one snapshot, returning assessments in input order.
    pub fn score_batch(
        &self,
        tenders: &[Tender],
        market: &dyn MarketView,
        config: &RiskConfig,
        analyzed_at: DateTime<Utc>,
    ) -> Vec<RiskAssessment> {
        let mut per_detector: Vec<std::vec::IntoIter<DetectorResult>> = self
            .detectors
            .iter()
            .map(|detector| detector.analyze_batch(tenders, market, config).into_iter())
            .collect();

        let assessments: Vec<RiskAssessment> = tenders
            .iter()
            .map(|tender| {
                let results = per_detector.iter_mut().filter_map(|results| results.next()).collect();
                self.combine(tender.id, results, config, analyzed_at)
            })
            .collect();

        info!(
            tenders = tenders.len(),
            high_risk = assessments.iter().filter(|a| a.level == RiskLevel::High).count(),
            "Scored tender batch"
        );
        assessments
    }

    /// Fold detector results for one tender into the composite assessment.
    pub fn combine(
        &self,
        tender_id: Uuid,
        results: Vec<DetectorResult>,
        config: &RiskConfig,
        analyzed_at: DateTime<Utc>,
    ) -> RiskAssessment {
        let weights = config.normalized_weights();
        let mut sub_scores = SubScores::default();
        let mut weight_scores = SubScores::default();
        for kind in AlgorithmKind::ALL {
            weight_scores.set(kind, weights.get(kind));
        }

        let mut weighted_score = 0.0;
        let mut flags: Vec<RiskFlag> = Vec::new();
        for result in &results {
            sub_scores.set(result.kind, result.score);
            weighted_score += result.score * weights.get(result.kind);
            for flag in &result.flags {
                if !flags.contains(flag) {
                    flags.push(*flag);
                }
            }
        }

        let scores: Vec<f64> = results.iter().map(|r| r.score).collect();
        let amplification = amplification_steps(&scores, &flags, config);
        let amplification_factor: f64 = amplification.iter().map(|s| s.factor).product();
        let raw_score = (weighted_score * amplification_factor).clamp(0.0, 100.0);
        let score = math::round_to(raw_score, 2);

        let confidences: Vec<f64> = results.iter().map(|r| r.confidence).collect();
        let levels: Vec<RiskLevel> = results.iter().map(|r| r.level).collect();
        let base_confidence = math::mean(&confidences).unwrap_or(0.0);
        let confidence = math::round_to(adjusted_confidence(&confidences, &levels), 4);

        // Level comes from the unrounded score so rounding never lifts a tender a tier.
        let level = config.level_for(raw_score);
        debug!(
            tender_id = %tender_id,
            weighted_score,
            amplification_factor,
            score,
            level = %level,
            "Combined detector results"
        );

        let breakdown = CompositeBreakdown {
            weights: weight_scores,
            weighted_score,
            amplification,
            amplification_factor,
            base_confidence,
            high_risk_algorithms: scores.iter().filter(|s| **s > HIGH_SIGNAL_SCORE).count(),
            medium_risk_algorithms: scores
                .iter()
                .filter(|s| (MEDIUM_SIGNAL_SCORE..=HIGH_SIGNAL_SCORE).contains(*s))
                .count(),
        };

        RiskAssessment {
            id: Uuid::new_v4(),
            tender_id,
            score,
            level,
            flags,
            sub_scores,
            confidence,
            detail: AssessmentDetail {
                schema_version: DETAIL_SCHEMA_VERSION,
                detectors: results,
                composite: breakdown,
                extensions: BTreeMap::new(),
            },
            analyzed_at,
            algorithm_version: ALGORITHM_VERSION.to_string(),
            config_version: config.version,
        }
    }

    pub fn algorithm_info(&self, config: &RiskConfig) -> serde_json::Value {
        let detectors: Vec<serde_json::Value> = self.detectors.iter().map(|d| d.algorithm_info(config)).collect();
        serde_json::json!({
            "version": ALGORITHM_VERSION,
            "config_version": config.version,
            "detectors": detectors,
            "methodology": Self::scoring_methodology(config),
        })
    }

    pub fn scoring_methodology(config: &RiskConfig) -> serde_json::Value {
        let pairs: Vec<String> = config.critical_pairs.iter().map(|p| p.label()).collect();
        serde_json::json!({
            "combination": "normalized weighted sum of detector scores",
            "amplification": {
                "three_or_more_high": 1.3,
                "two_high": 1.2,
                "one_high_two_medium": 1.15,
                "critical_pair": CRITICAL_PAIR_FACTOR,
                "critical_pairs": pairs,
                "stack_critical_pairs": config.stack_critical_pairs,
                "high_value_single_bidder": HIGH_VALUE_SINGLE_BIDDER_FACTOR,
                "cap": 100.0,
            },
            "thresholds": {
                "high": config.high_risk_threshold,
                "medium": config.medium_risk_threshold,
                "low": config.low_risk_threshold,
            },
        })
    }
}

/// Multiplier earned from how many detectors individually report high risk.
pub fn amplification_multiplier(scores: &[f64]) -> f64 {
    let high = scores.iter().filter(|s| **s > HIGH_SIGNAL_SCORE).count();
    let medium = scores
        .iter()
        .filter(|s| (MEDIUM_SIGNAL_SCORE..=HIGH_SIGNAL_SCORE).contains(*s))
        .count();
    match high {
        0 => 1.0,
        1 if medium >= 2 => 1.15,
        1 => 1.0,
        2 => 1.2,
        _ => 1.3,
    }
}

fn amplification_steps(scores: &[f64], flags: &[RiskFlag], config: &RiskConfig) -> Vec<AmplificationStep> {
    let mut steps = Vec::new();

    let factor = amplification_multiplier(scores);
    if factor > 1.0 {
        steps.push(AmplificationStep {
            rule: "multiple_high_risk_algorithms".to_string(),
            factor,
        });
    }

    for pair in config.critical_pairs.iter().filter(|p| p.matches(flags)) {
        steps.push(AmplificationStep {
            rule: format!("critical_pair:{}", pair.label()),
            factor: CRITICAL_PAIR_FACTOR,
        });
        if !config.stack_critical_pairs {
            break;
        }
    }

    if flags.contains(&RiskFlag::HighValueSingleBidder) {
        steps.push(AmplificationStep {
            rule: "high_value_single_bidder".to_string(),
            factor: HIGH_VALUE_SINGLE_BIDDER_FACTOR,
        });
    }
    steps
}

fn adjusted_confidence(confidences: &[f64], levels: &[RiskLevel]) -> f64 {
    let Some(mut confidence) = math::mean(confidences) else {
        return 0.0;
    };

    let high = confidences.iter().filter(|c| **c > 0.8).count();
    if high >= 3 {
        confidence *= 1.1;
    } else if high >= 2 {
        confidence *= 1.05;
    }

    let low = confidences.iter().filter(|c| **c < 0.5).count();
    if low >= 2 {
        confidence *= 0.9;
    } else if low >= 1 {
        confidence *= 0.95;
    }

    let mut agreement: BTreeMap<RiskLevel, usize> = BTreeMap::new();
    for level in levels {
        *agreement.entry(*level).or_insert(0) += 1;
    }
    let consensus = agreement.values().copied().max().unwrap_or(0);
    if consensus >= 3 {
        confidence *= 1.1;
    } else if consensus >= 2 {
        confidence *= 1.05;
    }

    confidence.clamp(0.0, 1.0)
}
