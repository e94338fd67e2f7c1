// Price anomaly detector: pricing irregularities against comparable tenders
use std::collections::HashMap;
use tracing::debug;

use super::{degraded, ScoreCard};
use crate::config::RiskConfig;
use crate::database::{CategoryScope, MarketView};
use crate::models::{AlgorithmKind, RiskFlag, Tender};
use crate::risk::metrics::{
    CohortInfo, DetectorDetail, DetectorResult, PriceAnomalyDetail, SeriesAnalysis, SpreadAnalysis,
};
use crate::risk::RiskDetector;
use crate::utils::math::{self, IsolationParams};

/// Length of the category prefix used when the exact category is too thin.
pub const PARENT_CATEGORY_LEN: usize = 6;

const MIN_OWN_BIDS_FOR_SPREAD: usize = 2;
const MIN_COHORT_SPREADS: usize = 3;

/// Points added per tripped signal.
struct SignalPoints {
    z_score: f64,
    isolation: f64,
    iqr: f64,
}

const ESTIMATED_VALUE_POINTS: SignalPoints = SignalPoints { z_score: 30.0, isolation: 25.0, iqr: 20.0 };
const WINNING_BID_POINTS: SignalPoints = SignalPoints { z_score: 35.0, isolation: 30.0, iqr: 20.0 };
const RATIO_POINTS: SignalPoints = SignalPoints { z_score: 25.0, isolation: 15.0, iqr: 15.0 };
const LOW_SPREAD_POINTS: f64 = 20.0;

/// Candidate comparables for one category: exact code and parent prefix.
struct Candidates<'m> {
    exact: Vec<&'m Tender>,
    parent: Option<(String, Vec<&'m Tender>)>,
}

struct Cohort<'m> {
    info: CohortInfo,
    tenders: Vec<&'m Tender>,
}

/// Compares estimated value, winning bid, bid/estimate ratio and bid spread
/// against comparable tenders from the same category.
#[derive(Debug, Clone)]
pub struct PriceAnomalyDetector {
    trees: usize,
    max_samples: usize,
}

impl Default for PriceAnomalyDetector {
    fn default() -> Self {
        let params = IsolationParams::default();
        Self {
            trees: params.trees,
            max_samples: params.max_samples,
        }
    }
}

impl PriceAnomalyDetector {
    pub fn new() -> Self {
        Self::default()
    }

    fn isolation_params(&self, config: &RiskConfig) -> IsolationParams {
        IsolationParams {
            trees: self.trees,
            max_samples: self.max_samples,
            seed: config.isolation_seed,
        }
    }

    fn candidates<'m>(tender: &Tender, market: &'m dyn MarketView, config: &RiskConfig) -> Candidates<'m> {
        let since = market.as_of() - config.cohort_window();
        let priced = |t: &&Tender| t.estimated_value_f64().is_some();
        let exact = market
            .tenders_in_category(CategoryScope::Exact(tender.category.as_str()), since)
            .into_iter()
            .filter(priced)
            .collect();
        let parent = tender.category.parent(PARENT_CATEGORY_LEN).map(|prefix| {
            let tenders = market
                .tenders_in_category(CategoryScope::Prefix(prefix), since)
                .into_iter()
                .filter(priced)
                .collect();
            (prefix.to_string(), tenders)
        });
        Candidates { exact, parent }
    }

    /// Exact category when it is large enough, else the parent prefix.
    fn select_cohort<'m>(
        tender: &Tender,
        candidates: &Candidates<'m>,
        config: &RiskConfig,
    ) -> Result<Cohort<'m>, CohortInfo> {
        let excluding_self =
            |list: &[&'m Tender]| -> Vec<&'m Tender> { list.iter().copied().filter(|t| t.id != tender.id).collect() };

        let exact = excluding_self(&candidates.exact[..]);
        if exact.len() >= config.min_price_sample {
            return Ok(Cohort {
                info: CohortInfo {
                    category: tender.category.as_str().to_string(),
                    widened: false,
                    size: exact.len(),
                },
                tenders: exact,
            });
        }

        if let Some((prefix, list)) = &candidates.parent {
            let widened = excluding_self(&list[..]);
            let info = CohortInfo {
                category: prefix.clone(),
                widened: true,
                size: widened.len(),
            };
            if widened.len() >= config.min_price_sample {
                return Ok(Cohort { info, tenders: widened });
            }
            return Err(info);
        }

        Err(CohortInfo {
            category: tender.category.as_str().to_string(),
            widened: false,
            size: exact.len(),
        })
    }

    fn analyze_series(&self, reference: &[f64], value: f64, config: &RiskConfig) -> Option<SeriesAnalysis> {
        let mean = math::mean(reference)?;
        let std_dev = math::std_dev(reference)?;
        let bounds = math::iqr_bounds(reference)?;
        let isolation =
            math::isolation_anomaly(reference, value, config.price_contamination, self.isolation_params(config))?;
        Some(SeriesAnalysis {
            value,
            sample_size: reference.len(),
            mean,
            std_dev,
            z_score: math::z_score(value, mean, std_dev),
            lower_bound: bounds.lower,
            upper_bound: bounds.upper,
            iqr_outlier: bounds.is_outlier(value),
            isolation_score: isolation.score,
            anomaly_fraction: isolation.fraction,
            isolation_anomaly: isolation.is_anomaly,
        })
    }

    fn apply_signals(
        card: &mut ScoreCard,
        series: &SeriesAnalysis,
        points: &SignalPoints,
        flags: [RiskFlag; 3],
        config: &RiskConfig,
    ) {
        let [statistical, isolation, outlier] = flags;
        if series.z_score > config.price_z_threshold {
            card.add(points.z_score);
            card.flag(statistical);
        }
        if series.isolation_anomaly {
            card.add(points.isolation);
            card.flag(isolation);
        }
        if series.iqr_outlier {
            card.add(points.iqr);
            card.flag(outlier);
        }
    }

    fn analyze_spread(tender: &Tender, cohort: &[&Tender], config: &RiskConfig) -> Option<SpreadAnalysis> {
        if tender.bid_amounts().len() < MIN_OWN_BIDS_FOR_SPREAD {
            return None;
        }
        let spread = tender.bid_spread_pct()?;
        let reference: Vec<f64> = cohort.iter().filter_map(|t| t.bid_spread_pct()).collect();
        if reference.len() < MIN_COHORT_SPREADS {
            return None;
        }
        let mean = math::mean(&reference)?;
        let std_dev = math::std_dev(&reference)?;
        let z = math::z_score(spread, mean, std_dev);
        let deviates = z > config.price_z_threshold;
        Some(SpreadAnalysis {
            spread_pct: spread,
            cohort_size: reference.len(),
            cohort_mean: mean,
            cohort_std_dev: std_dev,
            z_score: z,
            unusually_low: deviates && spread < mean,
            unusually_high: deviates && spread > mean,
        })
    }

    fn score(&self, tender: &Tender, candidates: &Candidates<'_>, config: &RiskConfig) -> DetectorResult {
        let kind = AlgorithmKind::PriceAnomaly;
        let mut detail = PriceAnomalyDetail::default();

        let Some(estimated) = tender.estimated_value_f64() else {
            return degraded(kind, RiskFlag::NoEstimatedValue, DetectorDetail::PriceAnomaly(detail), config);
        };

        let cohort = match Self::select_cohort(tender, candidates, config) {
            Ok(cohort) => cohort,
            Err(info) => {
                debug!(
                    tender_id = %tender.id,
                    cohort_size = info.size,
                    category = %info.category,
                    "Insufficient comparable tenders for price analysis"
                );
                detail.cohort = Some(info);
                return degraded(
                    kind,
                    RiskFlag::InsufficientComparableData,
                    DetectorDetail::PriceAnomaly(detail),
                    config,
                );
            }
        };

        let mut card = ScoreCard::new(0.0);

        let estimates: Vec<f64> = cohort.tenders.iter().filter_map(|t| t.estimated_value_f64()).collect();
        detail.estimated_value = self.analyze_series(&estimates, estimated, config);
        detail.estimated_value_percentile = math::percentile_rank(&estimates, estimated);
        if let Some(series) = &detail.estimated_value {
            Self::apply_signals(
                &mut card,
                series,
                &ESTIMATED_VALUE_POINTS,
                [
                    RiskFlag::EstimatedValueStatisticalAnomaly,
                    RiskFlag::EstimatedValueIsolationAnomaly,
                    RiskFlag::EstimatedValueOutlier,
                ],
                config,
            );
        }

        let own_winning = tender
            .winning_bid()
            .and_then(|b| b.amount_f64())
            .filter(|a| *a > 0.0);
        if let Some(winning) = own_winning {
            let pairs: Vec<(f64, f64)> = cohort
                .tenders
                .iter()
                .filter_map(|t| {
                    let bid = t.winning_bid()?.amount_f64().filter(|a| *a > 0.0)?;
                    Some((bid, t.estimated_value_f64()?))
                })
                .collect();

            if pairs.len() >= config.min_price_sample {
                let bids: Vec<f64> = pairs.iter().map(|(bid, _)| *bid).collect();
                let ratios: Vec<f64> = pairs.iter().map(|(bid, est)| bid / est).collect();

                detail.winning_bid = self.analyze_series(&bids, winning, config);
                if let Some(series) = &detail.winning_bid {
                    Self::apply_signals(
                        &mut card,
                        series,
                        &WINNING_BID_POINTS,
                        [
                            RiskFlag::WinningBidStatisticalAnomaly,
                            RiskFlag::WinningBidIsolationAnomaly,
                            RiskFlag::WinningBidOutlier,
                        ],
                        config,
                    );
                }

                detail.bid_ratio = self.analyze_series(&ratios, winning / estimated, config);
                if let Some(series) = &detail.bid_ratio {
                    Self::apply_signals(
                        &mut card,
                        series,
                        &RATIO_POINTS,
                        [
                            RiskFlag::AnomalousBidToEstimateRatio,
                            RiskFlag::BidToEstimateRatioIsolationAnomaly,
                            RiskFlag::BidToEstimateRatioOutlier,
                        ],
                        config,
                    );
                }
            }
        }

        detail.bid_spread = Self::analyze_spread(tender, &cohort.tenders, config);
        if let Some(spread) = &detail.bid_spread {
            if spread.unusually_low {
                card.add(LOW_SPREAD_POINTS);
                card.flag(RiskFlag::UnusuallyLowBidSpread);
            }
        }

        let n = cohort.tenders.len() as f64;
        let confidence = (0.5 + 0.5 * n / (2.0 * config.min_price_sample as f64)).min(1.0);

        debug!(
            tender_id = %tender.id,
            cohort_size = cohort.info.size,
            widened = cohort.info.widened,
            score = card.score(),
            "Calculated price anomaly risk"
        );

        detail.cohort = Some(cohort.info);
        card.finish(kind, confidence, DetectorDetail::PriceAnomaly(detail), config)
    }
}

impl RiskDetector for PriceAnomalyDetector {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::PriceAnomaly
    }

    fn analyze(&self, tender: &Tender, market: &dyn MarketView, config: &RiskConfig) -> DetectorResult {
        let candidates = Self::candidates(tender, market, config);
        self.score(tender, &candidates, config)
    }

    fn analyze_batch(
        &self,
        tenders: &[Tender],
        market: &dyn MarketView,
        config: &RiskConfig,
    ) -> Vec<DetectorResult> {
        let mut by_category: HashMap<&str, Candidates<'_>> = HashMap::new();
        for tender in tenders {
            by_category
                .entry(tender.category.as_str())
                .or_insert_with(|| Self::candidates(tender, market, config));
        }
        debug!(
            tender_count = tenders.len(),
            category_count = by_category.len(),
            "Prepared price cohorts for batch"
        );
        tenders
            .iter()
            .map(|tender| match by_category.get(tender.category.as_str()) {
                Some(candidates) => self.score(tender, candidates, config),
                None => self.analyze(tender, market, config),
            })
            .collect()
    }

    fn risk_factors(&self) -> Vec<&'static str> {
        vec![
            "estimated_value_deviation",
            "winning_bid_deviation",
            "bid_to_estimate_ratio",
            "bid_spread",
        ]
    }

    fn algorithm_info(&self, config: &RiskConfig) -> serde_json::Value {
        serde_json::json!({
            "algorithm": self.kind().as_str(),
            "version": self.version(),
            "weight": config.normalized_weights().get(self.kind()),
            "risk_factors": self.risk_factors(),
            "z_threshold": config.price_z_threshold,
            "contamination": config.price_contamination,
            "min_sample": config.min_price_sample,
            "cohort_window_days": config.cohort_window_days,
            "isolation_trees": self.trees,
            "isolation_max_samples": self.max_samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::fixtures::{tender, MarketBuilder};

    const CATEGORY: &str = "30192000-1";

    /// Cohort of `n` tenders with steadily varying estimate, winning ratio and spread.
    fn cohort(market: &mut MarketBuilder, n: usize, category: &str) {
        for i in 0..n {
            let estimate = 100_000.0 + 1_000.0 * i as f64;
            let winning = estimate * (0.85 + 0.005 * i as f64);
            let step = 0.01 + 0.0005 * i as f64;
            let bids = [
                (10 + i as i64, winning, true),
                (50, winning * (1.0 + step), false),
                (51, winning * (1.0 + 2.0 * step), false),
                (52, winning * (1.0 + 3.0 * step), false),
            ];
            market.add(tender(1, category, 30 + i as i64, Some(estimate), &bids));
        }
    }

    fn typical_bids(estimate: f64) -> Vec<(i64, f64, bool)> {
        let winning = estimate * 0.9;
        let step = 0.017;
        vec![
            (70, winning, true),
            (71, winning * (1.0 + step), false),
            (72, winning * (1.0 + 2.0 * step), false),
            (73, winning * (1.0 + 3.0 * step), false),
        ]
    }

    #[test]
    fn test_typical_tender_scores_zero() {
        let mut market = MarketBuilder::new();
        cohort(&mut market, 20, CATEGORY);
        let snapshot = market.build();

        let t = tender(1, CATEGORY, 1, Some(110_000.0), &typical_bids(110_000.0));
        let result = PriceAnomalyDetector::new().analyze(&t, &snapshot, &RiskConfig::default());

        assert_eq!(result.score, 0.0, "flags: {:?}", result.flags);
        assert!(result.flags.is_empty());
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_inflated_estimate_flagged() {
        let mut market = MarketBuilder::new();
        cohort(&mut market, 20, CATEGORY);
        let snapshot = market.build();

        let t = tender(1, CATEGORY, 1, Some(900_000.0), &[(70, 880_000.0, true)]);
        let result = PriceAnomalyDetector::new().analyze(&t, &snapshot, &RiskConfig::default());

        assert!(result.has_flag(RiskFlag::EstimatedValueStatisticalAnomaly));
        assert!(result.has_flag(RiskFlag::EstimatedValueIsolationAnomaly));
        assert!(result.has_flag(RiskFlag::EstimatedValueOutlier));
        assert!(result.has_flag(RiskFlag::WinningBidStatisticalAnomaly));
        assert!(result.has_flag(RiskFlag::WinningBidIsolationAnomaly));
        assert!(result.score >= 85.0);
    }

    #[test]
    fn test_underpriced_winning_bid_trips_ratio_signals() {
        let mut market = MarketBuilder::new();
        cohort(&mut market, 20, CATEGORY);
        let snapshot = market.build();

        let t = tender(1, CATEGORY, 1, Some(110_000.0), &[(70, 33_000.0, true)]);
        let result = PriceAnomalyDetector::new().analyze(&t, &snapshot, &RiskConfig::default());

        for flag in [
            RiskFlag::WinningBidStatisticalAnomaly,
            RiskFlag::WinningBidIsolationAnomaly,
            RiskFlag::WinningBidOutlier,
            RiskFlag::AnomalousBidToEstimateRatio,
            RiskFlag::BidToEstimateRatioIsolationAnomaly,
            RiskFlag::BidToEstimateRatioOutlier,
        ] {
            assert!(result.has_flag(flag), "missing {}", flag);
        }
        assert!(!result.has_flag(RiskFlag::EstimatedValueStatisticalAnomaly));
        assert!(!result.has_flag(RiskFlag::EstimatedValueOutlier));
        assert_eq!(result.score, 100.0);
    }

    #[test]
    fn test_missing_estimate_is_degraded() {
        let snapshot = MarketBuilder::new().build();
        let t = tender(1, CATEGORY, 1, None, &[(70, 1_000.0, true)]);
        let result = PriceAnomalyDetector::new().analyze(&t, &snapshot, &RiskConfig::default());
        assert_eq!(result.flags, vec![RiskFlag::NoEstimatedValue]);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_thin_cohort_widens_to_parent_category() {
        let mut market = MarketBuilder::new();
        cohort(&mut market, 4, CATEGORY);
        cohort(&mut market, 8, "30192090-3");
        let snapshot = market.build();

        let t = tender(1, CATEGORY, 1, Some(105_000.0), &typical_bids(105_000.0));
        let result = PriceAnomalyDetector::new().analyze(&t, &snapshot, &RiskConfig::default());
        let DetectorDetail::PriceAnomaly(detail) = &result.detail else {
            panic!("unexpected detail variant");
        };
        let info = detail.cohort.as_ref().unwrap();
        assert!(info.widened);
        assert_eq!(info.category, "301920");
        assert_eq!(info.size, 12);
        assert!(!result.has_flag(RiskFlag::InsufficientComparableData));
    }

    #[test]
    fn test_insufficient_cohort() {
        let mut market = MarketBuilder::new();
        cohort(&mut market, 5, CATEGORY);
        let snapshot = market.build();

        let t = tender(1, CATEGORY, 1, Some(105_000.0), &typical_bids(105_000.0));
        let result = PriceAnomalyDetector::new().analyze(&t, &snapshot, &RiskConfig::default());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.flags, vec![RiskFlag::InsufficientComparableData]);
        assert_eq!(result.confidence, crate::risk::calculators::DEGRADED_CONFIDENCE);
    }

    #[test]
    fn test_tight_bid_spread_flagged() {
        let mut market = MarketBuilder::new();
        cohort(&mut market, 20, CATEGORY);
        let snapshot = market.build();

        let winning = 99_000.0;
        let bids = [
            (70, winning, true),
            (71, winning * 1.0005, false),
            (72, winning * 1.001, false),
        ];
        let t = tender(1, CATEGORY, 1, Some(110_000.0), &bids);
        let result = PriceAnomalyDetector::new().analyze(&t, &snapshot, &RiskConfig::default());
        assert!(result.has_flag(RiskFlag::UnusuallyLowBidSpread));
    }

    #[test]
    fn test_repeatable() {
        let mut market = MarketBuilder::new();
        cohort(&mut market, 15, CATEGORY);
        let snapshot = market.build();
        let t = tender(1, CATEGORY, 1, Some(190_000.0), &typical_bids(190_000.0));
        let detector = PriceAnomalyDetector::new();
        let config = RiskConfig::default();
        let first = detector.analyze(&t, &snapshot, &config);
        for _ in 0..3 {
            assert_eq!(detector.analyze(&t, &snapshot, &config), first);
        }
    }
}
