// Geographic clustering detector: regional market capture
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{degraded, ScoreCard, Tally};
use crate::config::RiskConfig;
use crate::database::{CategoryScope, MarketView};
use crate::models::{AlgorithmKind, Award, RiskFlag, Tender};
use crate::risk::metrics::{
    BidderPool, CategoryLocality, DetectorDetail, DetectorResult, GeographicDetail, LocalConcentration,
    WinnerSpread,
};
use crate::risk::RiskDetector;
use crate::utils::math;

/// Award count above which a single-region footprint is flagged.
const SINGLE_REGION_MIN_AWARDS: usize = 3;
/// Award count above which home-region concentration is flagged.
const HOME_REGION_MIN_AWARDS: usize = 5;
/// Bidder count above which a homogeneous bidder pool is flagged.
const BIDDER_POOL_MIN: usize = 2;

/// Scores how strongly awards in the tender's region cluster around a few
/// local companies.
#[derive(Debug, Clone, Default)]
pub struct GeographicClusteringDetector;

impl GeographicClusteringDetector {
    pub fn new() -> Self {
        Self
    }

    fn local_concentration(tender_count: usize, awards: &[&Award], winner: Option<i64>) -> LocalConcentration {
        let mut by_count: Tally<i64> = Tally::new();
        let mut by_value: Tally<i64> = Tally::new();
        for award in awards {
            by_count.add(award.company_id, 1.0);
            by_value.add(award.company_id, award.amount_f64().max(0.0));
        }
        let top = by_count.top().map(|(id, _)| id);
        LocalConcentration {
            tender_count,
            awarded_count: awards.len(),
            winner_count: by_count.distinct(),
            hhi: math::herfindahl_from_totals(&by_count.values()),
            top_winner_id: top,
            top_winner_share: by_count.top_share(),
            top_winner_value_share: top.map(|id| by_value.share(&id)).unwrap_or(0.0),
            current_winner_is_top: winner.is_some() && winner == top,
            current_winner_share: winner.map(|id| by_count.share(&id)).unwrap_or(0.0),
        }
    }

    fn winner_spread(
        tender: &Tender,
        winner: i64,
        region: &str,
        market: &dyn MarketView,
        since: DateTime<Utc>,
    ) -> WinnerSpread {
        let regions: Tally<String> = market
            .awards_for_company(winner, since)
            .into_iter()
            .filter(|a| a.tender_id != tender.id)
            .filter_map(|a| market.award_region(a))
            .map(str::to_string)
            .collect();
        let award_count = regions.total() as usize;
        let home_region = primary_region(market, winner, since);
        WinnerSpread {
            award_count,
            unique_regions: regions.distinct(),
            home_region_share: home_region.as_ref().map(|h| regions.share(h)).unwrap_or(0.0),
            tender_region_share: regions.share(&region.to_string()),
            is_local: home_region.as_deref() == Some(region),
            home_region,
        }
    }

    fn bidder_pool(tender: &Tender, region: &str, market: &dyn MarketView, since: DateTime<Utc>) -> BidderPool {
        let bidders: BTreeSet<i64> = tender.bids.iter().map(|b| b.company_id).collect();
        let located: Vec<String> = bidders
            .iter()
            .filter_map(|id| primary_region(market, *id, since))
            .collect();
        let local = located.iter().filter(|r| r.as_str() == region).count();
        let unique: BTreeSet<&str> = located.iter().map(String::as_str).collect();
        BidderPool {
            bidder_count: bidders.len(),
            located_bidders: located.len(),
            local_bidder_rate: if located.is_empty() {
                0.0
            } else {
                local as f64 / located.len() as f64
            },
            unique_regions: unique.len(),
        }
    }

    /// Per-region rate of awards going to companies based in that region,
    /// across same-category tenders.
    fn category_pattern(
        tender: &Tender,
        region: &str,
        market: &dyn MarketView,
        config: &RiskConfig,
        since: DateTime<Utc>,
    ) -> Option<CategoryLocality> {
        let awarded: Vec<(&Tender, &Award)> = market
            .tenders_in_category(CategoryScope::Exact(tender.category.as_str()), since)
            .into_iter()
            .filter(|t| t.id != tender.id)
            .filter_map(|t| market.award_for_tender(t.id).map(|a| (t, a)))
            .collect();
        if awarded.len() < config.min_geographic_sample {
            return None;
        }

        let mut per_region: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for (t, award) in &awarded {
            let Some(authority_region) = market.authority_region(t.authority_id) else {
                continue;
            };
            let entry = per_region.entry(authority_region).or_insert((0, 0));
            entry.0 += 1;
            if primary_region(market, award.company_id, since).as_deref() == Some(authority_region) {
                entry.1 += 1;
            }
        }

        let rates: BTreeMap<&str, f64> = per_region
            .iter()
            .map(|(r, (total, local))| (*r, *local as f64 / *total as f64))
            .collect();
        let all: Vec<f64> = rates.values().copied().collect();
        Some(CategoryLocality {
            tender_count: awarded.len(),
            region_count: rates.len(),
            current_region_rate: rates.get(region).copied().unwrap_or(0.0),
            average_rate: math::mean(&all).unwrap_or(0.0),
        })
    }
}

/// Registered region of a company, falling back to where most of its awards
/// were made.
fn primary_region(market: &dyn MarketView, company_id: i64, since: DateTime<Utc>) -> Option<String> {
    if let Some(region) = market.company_region(company_id) {
        return Some(region.to_string());
    }
    let regions: Tally<String> = market
        .awards_for_company(company_id, since)
        .into_iter()
        .filter_map(|a| market.award_region(a))
        .map(str::to_string)
        .collect();
    regions.top().map(|(region, _)| region)
}

impl RiskDetector for GeographicClusteringDetector {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Geographic
    }

    fn analyze(&self, tender: &Tender, market: &dyn MarketView, config: &RiskConfig) -> DetectorResult {
        let kind = AlgorithmKind::Geographic;
        let Some(region) = market.authority_region(tender.authority_id).map(str::to_string) else {
            return degraded(
                kind,
                RiskFlag::NoGeographicData,
                DetectorDetail::Geographic(GeographicDetail::default()),
                config,
            );
        };

        let since = market.as_of() - config.analysis_window();
        let local_tenders: Vec<&Tender> = market
            .tenders_in_region(&region, since)
            .into_iter()
            .filter(|t| t.id != tender.id)
            .collect();
        if local_tenders.len() < config.min_geographic_sample {
            let detail = GeographicDetail {
                region: Some(region),
                ..Default::default()
            };
            return degraded(
                kind,
                RiskFlag::InsufficientLocalData,
                DetectorDetail::Geographic(detail),
                config,
            );
        }

        let local_awards: Vec<&Award> = local_tenders
            .iter()
            .filter_map(|t| market.award_for_tender(t.id))
            .collect();
        let winner = tender.winner_id();
        let local = Self::local_concentration(local_tenders.len(), &local_awards, winner);
        let spread = winner.map(|id| Self::winner_spread(tender, id, &region, market, since));
        let pool = Self::bidder_pool(tender, &region, market, since);
        let pattern = Self::category_pattern(tender, &region, market, config, since);

        let mut card = ScoreCard::new(0.0);

        if local.top_winner_share > 0.6 {
            card.add(30.0);
        } else if local.top_winner_share > 0.4 {
            card.add(20.0);
        }
        if local.top_winner_share > config.geographic_threshold {
            card.flag(RiskFlag::LocalMarketDominance);
        }
        if local.hhi > 0.25 {
            card.add(25.0);
            card.flag(RiskFlag::HighLocalConcentration);
        } else if local.hhi > 0.15 {
            card.add(15.0);
        }
        if local.current_winner_is_top && local.current_winner_share > 0.4 {
            card.flag(RiskFlag::CurrentWinnerDominatesLocally);
        }

        if let Some(spread) = &spread {
            if spread.unique_regions == 1 && spread.award_count > SINGLE_REGION_MIN_AWARDS {
                card.add(20.0);
                card.flag(RiskFlag::SingleRegionOperation);
            }
            if spread.home_region_share > 0.8 {
                card.add(15.0);
                if spread.award_count > HOME_REGION_MIN_AWARDS {
                    card.flag(RiskFlag::WinnerHomeRegionConcentration);
                }
            }
            if spread.home_region.is_some()
                && !spread.is_local
                && spread.tender_region_share > 0.6
                && spread.award_count > SINGLE_REGION_MIN_AWARDS
            {
                card.flag(RiskFlag::NonLocalCompanyDominance);
            }
        }

        if pool.local_bidder_rate > 0.8 {
            card.add(15.0);
            if pool.bidder_count > BIDDER_POOL_MIN {
                card.flag(RiskFlag::PredominantlyLocalBidders);
            }
        }
        if pool.unique_regions == 1 && pool.bidder_count >= BIDDER_POOL_MIN {
            card.add(10.0);
            if pool.bidder_count > BIDDER_POOL_MIN {
                card.flag(RiskFlag::SingleRegionBidders);
            }
        }

        if let Some(pattern) = &pattern {
            if pattern.current_region_rate > 0.8 {
                card.add(20.0);
                card.flag(RiskFlag::HighLocalWinnerRate);
            } else if pattern.average_rate > 0.0 && pattern.current_region_rate > 1.5 * pattern.average_rate {
                card.add(15.0);
                card.flag(RiskFlag::AboveAverageLocalRate);
            }
        }

        let confidence =
            (0.5 + local_tenders.len() as f64 / (4.0 * config.min_geographic_sample as f64)).min(1.0);

        debug!(
            tender_id = %tender.id,
            region = %region,
            local_tenders = local.tender_count,
            local_awards = local.awarded_count,
            local_hhi = local.hhi,
            score = card.score(),
            "Calculated geographic clustering risk"
        );

        let detail = GeographicDetail {
            region: Some(region),
            local: Some(local),
            winner_spread: spread,
            bidder_pool: Some(pool),
            category_pattern: pattern,
        };
        card.finish(kind, confidence, DetectorDetail::Geographic(detail), config)
    }

    fn analyze_batch(
        &self,
        tenders: &[Tender],
        market: &dyn MarketView,
        config: &RiskConfig,
    ) -> Vec<DetectorResult> {
        let mut regions: BTreeMap<String, Tally<i64>> = BTreeMap::new();
        let mut tender_counts: Tally<String> = Tally::new();
        for tender in tenders {
            let Some(region) = market.authority_region(tender.authority_id) else {
                continue;
            };
            tender_counts.add(region.to_string(), 1.0);
            if let Some(winner) = tender.winner_id() {
                regions.entry(region.to_string()).or_insert_with(Tally::new).add(winner, 1.0);
            }
        }

        tenders
            .iter()
            .map(|tender| {
                let mut result = self.analyze(tender, market, config);
                if let Some(region) = market.authority_region(tender.authority_id) {
                    let winners = regions.get(region);
                    result.extensions.insert(
                        "batch_region".to_string(),
                        serde_json::json!({
                            "region": region,
                            "tenders_in_batch": tender_counts.get(&region.to_string()),
                            "distinct_winners": winners.map(Tally::distinct).unwrap_or(0),
                            "top_winner_share": winners.map(Tally::top_share).unwrap_or(0.0),
                        }),
                    );
                }
                result
            })
            .collect()
    }

    fn risk_factors(&self) -> Vec<&'static str> {
        vec![
            "local_market_concentration",
            "winner_regional_footprint",
            "bidder_pool_locality",
            "category_locality_pattern",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::fixtures::{tender, MarketBuilder};

    const CATEGORY: &str = "90910000-9";

    #[test]
    fn test_local_monopoly() {
        let mut market = MarketBuilder::new()
            .authority(1, Some("Iasi"))
            .company(1, Some("Iasi"))
            .company(2, Some("Iasi"));
        for i in 0..6 {
            market.add(tender(1, CATEGORY, 30 + i * 7, Some(50_000.0), &[(1, 48_000.0, true), (2, 49_500.0, false)]));
        }
        let snapshot = market.build();
        let t = tender(1, CATEGORY, 1, Some(50_000.0), &[(1, 48_000.0, true), (2, 49_000.0, false)]);
        let result = GeographicClusteringDetector::new().analyze(&t, &snapshot, &RiskConfig::default());

        assert_eq!(result.score, 100.0);
        for flag in [
            RiskFlag::LocalMarketDominance,
            RiskFlag::HighLocalConcentration,
            RiskFlag::CurrentWinnerDominatesLocally,
            RiskFlag::SingleRegionOperation,
            RiskFlag::WinnerHomeRegionConcentration,
            RiskFlag::HighLocalWinnerRate,
        ] {
            assert!(result.has_flag(flag), "missing {}", flag);
        }
        assert!(!result.has_flag(RiskFlag::NonLocalCompanyDominance));
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_unknown_region() {
        let snapshot = MarketBuilder::new().authority(1, Some("  ")).build();
        let t = tender(1, CATEGORY, 1, None, &[(1, 10.0, true)]);
        let result = GeographicClusteringDetector::new().analyze(&t, &snapshot, &RiskConfig::default());
        assert_eq!(result.flags, vec![RiskFlag::NoGeographicData]);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_thin_local_market() {
        let mut market = MarketBuilder::new().authority(1, Some("Iasi"));
        market.add(tender(1, CATEGORY, 10, None, &[(1, 10.0, true)]));
        let snapshot = market.build();
        let t = tender(1, CATEGORY, 1, None, &[(1, 10.0, true)]);
        let result = GeographicClusteringDetector::new().analyze(&t, &snapshot, &RiskConfig::default());
        assert_eq!(result.flags, vec![RiskFlag::InsufficientLocalData]);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_competitive_regional_market() {
        let mut market = MarketBuilder::new().authority(1, Some("Iasi"));
        for k in 1..=8 {
            let home = if k % 2 == 1 { "Cluj" } else { "Bihor" };
            market = market.company(k, Some(home));
        }
        for k in 1..=8 {
            market.add(tender(1, CATEGORY, 10 + k, Some(10_000.0), &[(k, 9_000.0, true)]));
        }
        let snapshot = market.build();
        let t = tender(
            1,
            CATEGORY,
            1,
            Some(10_000.0),
            &[(1, 9_000.0, true), (2, 9_100.0, false), (4, 9_200.0, false)],
        );
        let result = GeographicClusteringDetector::new().analyze(&t, &snapshot, &RiskConfig::default());
        assert_eq!(result.score, 0.0);
        assert!(result.flags.is_empty());

        let DetectorDetail::Geographic(detail) = &result.detail else {
            panic!("unexpected detail variant");
        };
        let pool = detail.bidder_pool.as_ref().unwrap();
        assert_eq!(pool.located_bidders, 3);
        assert_eq!(pool.unique_regions, 2);
        assert_eq!(detail.category_pattern.as_ref().unwrap().current_region_rate, 0.0);
    }

    #[test]
    fn test_batch_region_extension() {
        let mut market = MarketBuilder::new()
            .authority(1, Some("Iasi"))
            .authority(2, Some(" "));
        for i in 0..4 {
            market.add(tender(1, CATEGORY, 30 + i * 7, None, &[(1, 10.0, true)]));
        }
        let snapshot = market.build();
        let batch = vec![
            tender(1, CATEGORY, 1, None, &[(1, 10.0, true)]),
            tender(1, CATEGORY, 2, None, &[(2, 10.0, true)]),
            tender(2, CATEGORY, 3, None, &[(3, 10.0, true)]),
        ];
        let detector = GeographicClusteringDetector::new();
        let results = detector.analyze_batch(&batch, &snapshot, &RiskConfig::default());

        assert_eq!(results.len(), 3);
        let extension = &results[0].extensions["batch_region"];
        assert_eq!(extension["tenders_in_batch"], 2.0);
        assert_eq!(extension["distinct_winners"], 2);
        assert_eq!(extension["top_winner_share"], 0.5);
        assert!(!results[2].extensions.contains_key("batch_region"));
        for (single, batched) in batch.iter().zip(&results) {
            assert_eq!(detector.analyze(single, &snapshot, &RiskConfig::default()).score, batched.score);
        }
    }

    #[test]
    fn test_local_sample_counts_unawarded_tenders() {
        let mut market = MarketBuilder::new()
            .authority(1, Some("Iasi"))
            .company(1, Some("Iasi"))
            .company(2, Some("Iasi"))
            .company(3, Some("Iasi"))
            .company(4, Some("Cluj"))
            .company(5, Some("Cluj"));
        market.add(tender(1, CATEGORY, 20, None, &[(4, 10.0, true)]));
        market.add(tender(1, CATEGORY, 30, None, &[(5, 10.0, true)]));
        for i in 0..3 {
            market.add(tender(1, CATEGORY, 40 + i, None, &[(4, 10.0, false)]));
        }
        let snapshot = market.build();
        let t = tender(1, CATEGORY, 1, None, &[(1, 10.0, false), (2, 11.0, false), (3, 12.0, false)]);
        let result = GeographicClusteringDetector::new().analyze(&t, &snapshot, &RiskConfig::default());

        // top share 0.5 +20, HHI 0.5 +25, local bidders +15, one bidder region +10
        assert_eq!(result.score, 70.0);
        assert_eq!(
            result.flags,
            vec![
                RiskFlag::HighLocalConcentration,
                RiskFlag::PredominantlyLocalBidders,
                RiskFlag::SingleRegionBidders,
            ]
        );
        let DetectorDetail::Geographic(detail) = &result.detail else {
            panic!("unexpected detail variant");
        };
        let local = detail.local.as_ref().unwrap();
        assert_eq!(local.tender_count, 5);
        assert_eq!(local.awarded_count, 2);
    }

    #[test]
    fn test_unawarded_local_market_still_scores_bidder_pool() {
        let mut market = MarketBuilder::new()
            .authority(1, Some("Iasi"))
            .company(1, Some("Iasi"))
            .company(2, Some("Iasi"))
            .company(3, Some("Iasi"));
        for i in 0..3 {
            market.add(tender(1, CATEGORY, 10 + i, None, &[(1, 10.0, false)]));
        }
        let snapshot = market.build();
        let t = tender(1, CATEGORY, 1, None, &[(1, 10.0, false), (2, 11.0, false), (3, 12.0, false)]);
        let result = GeographicClusteringDetector::new().analyze(&t, &snapshot, &RiskConfig::default());

        assert_eq!(result.score, 25.0);
        assert_eq!(
            result.flags,
            vec![RiskFlag::PredominantlyLocalBidders, RiskFlag::SingleRegionBidders]
        );
    }

    #[test]
    fn test_non_local_company_dominance() {
        let mut market = MarketBuilder::new()
            .authority(1, Some("Iasi"))
            .company(1, Some("Bihor"))
            .company(2, Some("Iasi"));
        for i in 0..5 {
            market.add(tender(1, CATEGORY, 20 + i * 5, None, &[(1, 10.0, true), (2, 11.0, false)]));
        }
        let snapshot = market.build();
        let t = tender(1, CATEGORY, 1, None, &[(1, 10.0, true), (2, 11.0, false)]);
        let result = GeographicClusteringDetector::new().analyze(&t, &snapshot, &RiskConfig::default());

        assert!(result.has_flag(RiskFlag::NonLocalCompanyDominance));
        assert!(result.has_flag(RiskFlag::SingleRegionOperation));
        assert!(!result.has_flag(RiskFlag::WinnerHomeRegionConcentration));
        let DetectorDetail::Geographic(detail) = &result.detail else {
            panic!("unexpected detail variant");
        };
        let spread = detail.winner_spread.as_ref().unwrap();
        assert_eq!(spread.home_region.as_deref(), Some("Bihor"));
        assert!(!spread.is_local);
        assert_eq!(spread.tender_region_share, 1.0);
    }

    #[test]
    fn test_above_average_local_rate() {
        let mut market = MarketBuilder::new()
            .authority(1, Some("Iasi"))
            .authority(2, Some("Cluj"))
            .company(1, Some("Iasi"))
            .company(2, Some("Iasi"))
            .company(3, Some("Iasi"))
            .company(4, Some("Bihor"));
        // Iasi: three of four awards go to Iasi companies. Cluj: none of four.
        for (i, winner) in [1, 2, 3, 4].into_iter().enumerate() {
            market.add(tender(1, CATEGORY, 10 + i as i64, None, &[(winner, 10.0, true)]));
        }
        for i in 0..4 {
            market.add(tender(2, CATEGORY, 20 + i, None, &[(4, 10.0, true)]));
        }
        let snapshot = market.build();
        let t = tender(1, CATEGORY, 1, None, &[(1, 10.0, true)]);
        let result = GeographicClusteringDetector::new().analyze(&t, &snapshot, &RiskConfig::default());

        assert!(result.has_flag(RiskFlag::AboveAverageLocalRate));
        assert!(!result.has_flag(RiskFlag::HighLocalWinnerRate));
        let DetectorDetail::Geographic(detail) = &result.detail else {
            panic!("unexpected detail variant");
        };
        let pattern = detail.category_pattern.as_ref().unwrap();
        assert_eq!(pattern.current_region_rate, 0.75);
        assert_eq!(pattern.average_rate, 0.375);
    }
}
