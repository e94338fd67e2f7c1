// Single bidder detector: competition suppression risk
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::{degraded, ScoreCard};
use crate::config::RiskConfig;
use crate::database::{CategoryScope, MarketView};
use crate::models::{AlgorithmKind, RiskFlag, Tender};
use crate::risk::metrics::{AppliedFactor, DetectorDetail, DetectorResult, SingleBidderDetail, SingleBidderRate};
use crate::risk::RiskDetector;
use crate::utils::math;

const HIGH_VALUE: f64 = 1_000_000.0;
const ELEVATED_VALUE: f64 = 500_000.0;

/// Scores tenders by how little competition they attracted, in the context
/// of the authority's and the category's history.
#[derive(Debug, Clone, Default)]
pub struct SingleBidderDetector;

impl SingleBidderDetector {
    pub fn new() -> Self {
        Self
    }

    /// Score before contextual multipliers.
    pub fn base_score(bid_count: usize) -> f64 {
        match bid_count {
            1 => 60.0,
            2 => 25.0,
            3 => 10.0,
            _ => 0.0,
        }
    }

    fn single_bidder_rate(tenders: &[&Tender], exclude: Uuid) -> Option<SingleBidderRate> {
        let history: Vec<&&Tender> = tenders.iter().filter(|t| t.id != exclude).collect();
        if history.is_empty() {
            return None;
        }
        let single = history.iter().filter(|t| t.is_single_bidder()).count();
        Some(SingleBidderRate {
            tender_count: history.len(),
            single_bidder_count: single,
            single_bidder_rate: single as f64 / history.len() as f64,
        })
    }

    fn score(
        &self,
        tender: &Tender,
        authority_history: Option<SingleBidderRate>,
        category_context: Option<SingleBidderRate>,
        config: &RiskConfig,
    ) -> DetectorResult {
        let bid_count = tender.bid_count();
        let mut detail = SingleBidderDetail {
            bid_count,
            procedure_type: Some(tender.procedure_type),
            estimated_value: tender.estimated_value_f64(),
            ..Default::default()
        };

        if bid_count == 0 {
            return degraded(
                AlgorithmKind::SingleBidder,
                RiskFlag::NoBids,
                DetectorDetail::SingleBidder(detail),
                config,
            );
        }

        let single = bid_count == 1;
        let base = Self::base_score(bid_count);
        detail.base_score = base;
        let mut card = ScoreCard::new(base);
        let mut factors = Vec::new();
        let mut apply = |card: &mut ScoreCard, name: &str, multiplier: f64| {
            card.multiply(multiplier);
            factors.push(AppliedFactor {
                name: name.to_string(),
                multiplier,
            });
        };

        if single {
            card.flag(RiskFlag::SingleBidder);
        }

        if let Some(history) = &authority_history {
            let rate = history.single_bidder_rate;
            if rate > 0.5 {
                apply(&mut card, "authority_single_bidder_rate", 1.5);
            } else if rate > 0.3 {
                apply(&mut card, "authority_single_bidder_rate", 1.2);
            }
            if rate > 0.7 {
                card.flag(RiskFlag::ChronicSingleBidderAuthority);
            } else if rate > 0.5 {
                card.flag(RiskFlag::FrequentSingleBidderAuthority);
            }
        }

        if let Some(context) = &category_context {
            if single && context.single_bidder_rate < 0.2 {
                apply(&mut card, "atypical_for_category", 1.3);
                if context.single_bidder_rate < 0.1 {
                    card.flag(RiskFlag::AtypicalSingleBidderForCategory);
                }
            }
        }

        if single {
            match detail.estimated_value {
                Some(value) if value > HIGH_VALUE => {
                    apply(&mut card, "high_value", 1.4);
                    card.flag(RiskFlag::HighValueSingleBidder);
                }
                Some(value) if value > ELEVATED_VALUE => apply(&mut card, "elevated_value", 1.2),
                _ => {}
            }
            if tender.procedure_type.is_competitive() {
                apply(&mut card, "competitive_procedure", 1.3);
            }
        }

        let confidence = Self::confidence(&authority_history, &category_context, config);
        debug!(
            tender_id = %tender.id,
            bid_count,
            base_score = base,
            score = card.score(),
            "Calculated single bidder risk"
        );

        detail.factors = factors;
        detail.authority_history = authority_history;
        detail.category_context = category_context;
        card.finish(
            AlgorithmKind::SingleBidder,
            confidence,
            DetectorDetail::SingleBidder(detail),
            config,
        )
    }

    fn confidence(
        authority_history: &Option<SingleBidderRate>,
        category_context: &Option<SingleBidderRate>,
        config: &RiskConfig,
    ) -> f64 {
        let enough = |rate: &Option<SingleBidderRate>| {
            rate.as_ref()
                .map_or(false, |r| r.tender_count >= config.min_frequency_sample)
        };
        let mut tenths = 7;
        if enough(authority_history) {
            tenths += 2;
        }
        if enough(category_context) {
            tenths += 1;
        }
        tenths as f64 / 10.0
    }

    fn batch_statistics(tenders: &[Tender]) -> serde_json::Value {
        let counts: Vec<f64> = tenders.iter().map(|t| t.bid_count() as f64).collect();
        let single = tenders.iter().filter(|t| t.is_single_bidder()).count();
        serde_json::json!({
            "tender_count": tenders.len(),
            "single_bidder_count": single,
            "single_bidder_rate": if tenders.is_empty() { 0.0 } else { single as f64 / tenders.len() as f64 },
            "mean_bid_count": math::mean(&counts).unwrap_or(0.0),
            "median_bid_count": math::percentile(&counts, 50.0).unwrap_or(0.0),
        })
    }
}

impl RiskDetector for SingleBidderDetector {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::SingleBidder
    }

    fn analyze(&self, tender: &Tender, market: &dyn MarketView, config: &RiskConfig) -> DetectorResult {
        let since = market.as_of() - config.analysis_window();
        let by_authority = market.tenders_by_authority(tender.authority_id, since);
        let by_category = market.tenders_in_category(CategoryScope::Exact(tender.category.as_str()), since);
        self.score(
            tender,
            Self::single_bidder_rate(&by_authority, tender.id),
            Self::single_bidder_rate(&by_category, tender.id),
            config,
        )
    }

    fn analyze_batch(
        &self,
        tenders: &[Tender],
        market: &dyn MarketView,
        config: &RiskConfig,
    ) -> Vec<DetectorResult> {
        let since = market.as_of() - config.analysis_window();
        let mut by_authority: HashMap<i64, Vec<&Tender>> = HashMap::new();
        let mut by_category: HashMap<&str, Vec<&Tender>> = HashMap::new();
        for tender in tenders {
            by_authority
                .entry(tender.authority_id)
                .or_insert_with(|| market.tenders_by_authority(tender.authority_id, since));
            by_category.entry(tender.category.as_str()).or_insert_with(|| {
                market.tenders_in_category(CategoryScope::Exact(tender.category.as_str()), since)
            });
        }

        let statistics = Self::batch_statistics(tenders);
        tenders
            .iter()
            .map(|tender| {
                let authority = by_authority
                    .get(&tender.authority_id)
                    .and_then(|list| Self::single_bidder_rate(list, tender.id));
                let category = by_category
                    .get(tender.category.as_str())
                    .and_then(|list| Self::single_bidder_rate(list, tender.id));
                let mut result = self.score(tender, authority, category, config);
                result
                    .extensions
                    .insert("batch_statistics".to_string(), statistics.clone());
                result
            })
            .collect()
    }

    fn risk_factors(&self) -> Vec<&'static str> {
        vec![
            "bid_count",
            "authority_single_bidder_history",
            "category_single_bidder_rate",
            "estimated_value",
            "procedure_type",
        ]
    }
}
