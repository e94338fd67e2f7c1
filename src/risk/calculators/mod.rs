pub mod frequent_winner;
pub mod geographic;
pub mod price_anomaly;
pub mod single_bidder;

pub use frequent_winner::FrequentWinnerDetector;
pub use geographic::GeographicClusteringDetector;
pub use price_anomaly::PriceAnomalyDetector;
pub use single_bidder::SingleBidderDetector;

use std::collections::BTreeMap;

use crate::config::RiskConfig;
use crate::models::{AlgorithmKind, RiskFlag};
use crate::risk::metrics::{DetectorDetail, DetectorResult};

/// Confidence reported when a detector could not assess the tender.
pub const DEGRADED_CONFIDENCE: f64 = 0.3;

/// Additive score accumulator shared by the detectors.
#[derive(Debug, Default)]
pub(crate) struct ScoreCard {
    score: f64,
    flags: Vec<RiskFlag>,
}

impl ScoreCard {
    pub(crate) fn new(initial: f64) -> Self {
        Self {
            score: initial,
            flags: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, points: f64) {
        self.score += points;
    }

    pub(crate) fn multiply(&mut self, factor: f64) {
        self.score *= factor;
    }

    pub(crate) fn score(&self) -> f64 {
        self.score
    }

    pub(crate) fn flag(&mut self, flag: RiskFlag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }

    pub(crate) fn finish(
        self,
        kind: AlgorithmKind,
        confidence: f64,
        detail: DetectorDetail,
        config: &RiskConfig,
    ) -> DetectorResult {
        let score = self.score.clamp(0.0, 100.0);
        DetectorResult {
            kind,
            score,
            level: config.level_for(score),
            flags: self.flags,
            confidence: confidence.clamp(0.0, 1.0),
            detail,
            extensions: BTreeMap::new(),
        }
    }
}

/// Zero-risk result explaining why the tender could not be assessed.
pub(crate) fn degraded(
    kind: AlgorithmKind,
    flag: RiskFlag,
    detail: DetectorDetail,
    config: &RiskConfig,
) -> DetectorResult {
    let mut card = ScoreCard::new(0.0);
    card.flag(flag);
    card.finish(kind, DEGRADED_CONFIDENCE, detail, config)
}

/// Weighted occurrence counts per key.
pub(crate) struct Tally<K: Ord> {
    counts: BTreeMap<K, f64>,
    total: f64,
}

impl<K: Ord + Clone> Tally<K> {
    pub(crate) fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
            total: 0.0,
        }
    }

    pub(crate) fn add(&mut self, key: K, weight: f64) {
        *self.counts.entry(key).or_insert(0.0) += weight;
        self.total += weight;
    }

    pub(crate) fn total(&self) -> f64 {
        self.total
    }

    pub(crate) fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub(crate) fn get(&self, key: &K) -> f64 {
        self.counts.get(key).copied().unwrap_or(0.0)
    }

    pub(crate) fn share(&self, key: &K) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        self.get(key) / self.total
    }

    /// Key with the highest total; ties go to the smallest key.
    pub(crate) fn top(&self) -> Option<(K, f64)> {
        let mut best: Option<(&K, f64)> = None;
        for (key, value) in &self.counts {
            if best.map_or(true, |(_, v)| *value > v) {
                best = Some((key, *value));
            }
        }
        best.map(|(k, v)| (k.clone(), v))
    }

    pub(crate) fn top_share(&self) -> f64 {
        match self.top() {
            Some((_, v)) if self.total > 0.0 => v / self.total,
            _ => 0.0,
        }
    }

    pub(crate) fn values(&self) -> Vec<f64> {
        self.counts.values().copied().collect()
    }
}

impl<K: Ord + Clone> FromIterator<K> for Tally<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut tally = Tally::new();
        for key in iter {
            tally.add(key, 1.0);
        }
        tally
    }
}
