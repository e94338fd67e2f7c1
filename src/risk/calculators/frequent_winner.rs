// Frequent winner detector: market concentration and monopoly risk
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::{degraded, ScoreCard, Tally};
use crate::config::RiskConfig;
use crate::database::{CategoryScope, MarketView};
use crate::models::{AlgorithmKind, Award, RiskFlag, Tender};
use crate::risk::calculators::price_anomaly::PARENT_CATEGORY_LEN;
use crate::risk::metrics::{
    CategorySpecialization, DetectorDetail, DetectorResult, FrequentWinnerDetail, MarketConcentration,
    RegionConcentration, WinRateStats,
};
use crate::risk::RiskDetector;
use crate::utils::math;

/// Category prefix length treated as one line of business.
pub const DIVISION_LEN: usize = 4;

/// Award count above which single-region or single-division activity is flagged.
const CONCENTRATION_MIN_AWARDS: usize = 5;

/// Scores the winning company by its win rate, market share and how
/// concentrated its activity is.
#[derive(Debug, Clone, Default)]
pub struct FrequentWinnerDetector;

impl FrequentWinnerDetector {
    pub fn new() -> Self {
        Self
    }

    fn win_rate(
        company_id: i64,
        exclude: Uuid,
        market: &dyn MarketView,
        since: chrono::DateTime<chrono::Utc>,
    ) -> WinRateStats {
        let bids = market
            .bids_by_company(company_id, since)
            .into_iter()
            .filter(|(t, _)| t.id != exclude)
            .count();
        let wins = market
            .awards_for_company(company_id, since)
            .into_iter()
            .filter(|a| a.tender_id != exclude)
            .count();
        WinRateStats {
            bids,
            wins,
            win_rate: ratio(wins, bids),
        }
    }

    /// Mean win rate of every other company that bid in the window.
    fn industry_average(
        winner: i64,
        exclude: Uuid,
        market: &dyn MarketView,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Option<f64> {
        let mut bids: HashMap<i64, usize> = HashMap::new();
        for (tender, bid) in market.bids_since(since) {
            if tender.id != exclude && bid.company_id != winner {
                *bids.entry(bid.company_id).or_insert(0) += 1;
            }
        }
        let mut wins: HashMap<i64, usize> = HashMap::new();
        for award in market.awards_since(since) {
            if award.tender_id != exclude {
                *wins.entry(award.company_id).or_insert(0) += 1;
            }
        }
        let mut companies: Vec<i64> = bids.keys().copied().collect();
        companies.sort_unstable();
        let rates: Vec<f64> = companies
            .iter()
            .map(|c| ratio(wins.get(c).copied().unwrap_or(0), bids[c]))
            .collect();
        math::mean(&rates)
    }

    fn market_concentration(
        tender: &Tender,
        winner: i64,
        market: &dyn MarketView,
        config: &RiskConfig,
    ) -> MarketConcentration {
        let since = market.as_of() - config.analysis_window();
        let cohort = |scope: CategoryScope<'_>| -> Vec<&Tender> {
            market
                .tenders_in_category(scope, since)
                .into_iter()
                .filter(|t| t.id != tender.id)
                .collect()
        };

        let mut category = tender.category.as_str().to_string();
        let mut widened = false;
        let mut tenders = cohort(CategoryScope::Exact(tender.category.as_str()));
        if tenders.len() < config.min_frequency_sample {
            if let Some(prefix) = tender.category.parent(PARENT_CATEGORY_LEN) {
                tenders = cohort(CategoryScope::Prefix(prefix));
                category = prefix.to_string();
                widened = true;
            }
        }
        let awards: Vec<&Award> = tenders
            .iter()
            .filter_map(|t| market.award_for_tender(t.id))
            .collect();

        let mut by_count: Tally<i64> = Tally::new();
        let mut by_value: Tally<i64> = Tally::new();
        for award in &awards {
            by_count.add(award.company_id, 1.0);
            by_value.add(award.company_id, award.amount_f64().max(0.0));
        }
        let counts = by_count.values();

        MarketConcentration {
            category,
            widened,
            tender_count: tenders.len(),
            awarded_count: awards.len(),
            sufficient: tenders.len() >= config.min_frequency_sample,
            market_share_count: by_count.share(&winner),
            market_share_value: by_value.share(&winner),
            hhi: math::herfindahl_from_totals(&counts),
            top3_share: math::top_n_share(&counts, 3),
            competitor_count: by_count.distinct(),
        }
    }

    fn region_concentration(awards: &[&Award], market: &dyn MarketView) -> RegionConcentration {
        let regions: Tally<String> = awards
            .iter()
            .filter_map(|a| market.award_region(a))
            .map(str::to_string)
            .collect();
        let top = regions.top();
        RegionConcentration {
            award_count: awards.len(),
            unique_regions: regions.distinct(),
            top_region_share: regions.top_share(),
            top_region: top.map(|(region, _)| region),
        }
    }

    fn specialization(awards: &[&Award], market: &dyn MarketView) -> CategorySpecialization {
        let categories: Vec<&Tender> = awards.iter().filter_map(|a| market.tender(a.tender_id)).collect();
        let codes: Tally<String> = categories.iter().map(|t| t.category.as_str().to_string()).collect();
        let divisions: Tally<String> = categories
            .iter()
            .map(|t| t.category.division(DIVISION_LEN).to_string())
            .collect();
        CategorySpecialization {
            award_count: awards.len(),
            unique_categories: codes.distinct(),
            top_category: codes.top().map(|(code, _)| code),
            top_category_share: codes.top_share(),
            unique_divisions: divisions.distinct(),
            top_division_share: divisions.top_share(),
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64).min(1.0)
}

impl RiskDetector for FrequentWinnerDetector {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::FrequentWinner
    }

    fn analyze(&self, tender: &Tender, market: &dyn MarketView, config: &RiskConfig) -> DetectorResult {
        let kind = AlgorithmKind::FrequentWinner;
        let Some(winner) = tender.winner_id() else {
            return degraded(
                kind,
                RiskFlag::NoWinnerIdentified,
                DetectorDetail::FrequentWinner(FrequentWinnerDetail::default()),
                config,
            );
        };

        let since = market.as_of() - config.analysis_window();
        let recent_since = market.as_of() - config.recent_window();

        let win_rate = Self::win_rate(winner, tender.id, market, since);
        let recent = Self::win_rate(winner, tender.id, market, recent_since);
        let industry_average = Self::industry_average(winner, tender.id, market, since);
        let concentration = Self::market_concentration(tender, winner, market, config);

        let awards: Vec<&Award> = market
            .awards_for_company(winner, since)
            .into_iter()
            .filter(|a| a.tender_id != tender.id)
            .collect();
        let geographic = Self::region_concentration(&awards, market);
        let specialization = Self::specialization(&awards, market);

        let mut card = ScoreCard::new(0.0);

        let rate = win_rate.win_rate;
        if rate > 0.8 {
            card.add(40.0);
        } else if rate > 0.6 {
            card.add(30.0);
        } else if rate > 0.4 {
            card.add(20.0);
        }
        if rate > config.frequent_winner_threshold {
            card.flag(RiskFlag::HighWinRate);
        }

        if recent.win_rate > 0.9 {
            card.add(20.0);
        } else if recent.win_rate > 0.7 {
            card.add(15.0);
        }
        if recent.win_rate > 0.8 {
            card.flag(RiskFlag::VeryHighRecentWinRate);
        }

        if let Some(average) = industry_average {
            if average > 0.0 && rate > 2.0 * average {
                card.flag(RiskFlag::WinRateAboveIndustryAverage);
            }
        }

        if concentration.sufficient {
            let share = concentration.market_share_count;
            if share > 0.5 {
                card.add(35.0);
                card.flag(RiskFlag::DominantMarketPosition);
            } else if share > 0.3 {
                card.add(25.0);
                card.flag(RiskFlag::StrongMarketPosition);
            } else if share > 0.2 {
                card.add(15.0);
            }
            if concentration.hhi > 0.25 {
                card.add(20.0);
                card.flag(RiskFlag::HighlyConcentratedMarket);
            } else if concentration.hhi > 0.15 {
                card.add(10.0);
            }
        } else {
            card.flag(RiskFlag::InsufficientMarketData);
        }

        if geographic.top_region_share > 0.8 {
            card.add(15.0);
        } else if geographic.top_region_share > 0.6 {
            card.add(10.0);
        }
        if geographic.top_region_share > 0.7 {
            card.flag(RiskFlag::HighGeographicConcentration);
        }
        if geographic.unique_regions == 1 && geographic.award_count > CONCENTRATION_MIN_AWARDS {
            card.flag(RiskFlag::SingleRegionConcentration);
        }

        if specialization.top_category_share > 0.8 {
            card.add(10.0);
            card.flag(RiskFlag::HighCategorySpecialization);
        }
        if specialization.unique_divisions == 1 && specialization.award_count > CONCENTRATION_MIN_AWARDS {
            card.flag(RiskFlag::SingleCategorySpecialization);
        }

        let history = (win_rate.bids as f64 / (2.0 * config.min_frequency_sample as f64)).min(1.0);
        let mut confidence = 0.5 + 0.5 * history;
        if !concentration.sufficient {
            confidence -= 0.1;
        }

        debug!(
            tender_id = %tender.id,
            company_id = winner,
            win_rate = rate,
            market_share = concentration.market_share_count,
            hhi = concentration.hhi,
            score = card.score(),
            "Calculated frequent winner risk"
        );

        let detail = FrequentWinnerDetail {
            company_id: Some(winner),
            win_rate: Some(win_rate),
            recent_win_rate: Some(recent),
            industry_average_win_rate: industry_average,
            market: Some(concentration),
            geographic: Some(geographic),
            specialization: Some(specialization),
        };
        card.finish(kind, confidence, DetectorDetail::FrequentWinner(detail), config)
    }

    fn analyze_batch(
        &self,
        tenders: &[Tender],
        market: &dyn MarketView,
        config: &RiskConfig,
    ) -> Vec<DetectorResult> {
        let winners: Tally<i64> = tenders.iter().filter_map(|t| t.winner_id()).collect();
        tenders
            .iter()
            .map(|tender| {
                let mut result = self.analyze(tender, market, config);
                if let Some(winner) = tender.winner_id() {
                    result.extensions.insert(
                        "batch_wins".to_string(),
                        serde_json::json!({
                            "company_id": winner,
                            "wins_in_batch": winners.get(&winner),
                            "share_of_batch_awards": winners.share(&winner),
                            "distinct_batch_winners": winners.distinct(),
                        }),
                    );
                }
                result
            })
            .collect()
    }

    fn risk_factors(&self) -> Vec<&'static str> {
        vec![
            "win_rate",
            "recent_win_rate",
            "market_share",
            "market_concentration",
            "geographic_concentration",
            "category_specialization",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::fixtures::{tender, MarketBuilder};

    const CATEGORY: &str = "45233140-2";

    fn dominant_market() -> MarketBuilder {
        let mut market = MarketBuilder::new()
            .authority(1, Some("Cluj"))
            .company(1, Some("Cluj"))
            .company(2, Some("Bihor"));
        for i in 0..10 {
            let bids = if i < 9 {
                vec![(1, 90_000.0, true), (2, 95_000.0, false)]
            } else {
                vec![(1, 96_000.0, false), (2, 94_000.0, true)]
            };
            market.add(tender(1, CATEGORY, 20 + i * 10, Some(100_000.0), &bids));
        }
        market
    }

    #[test]
    fn test_dominant_winner() {
        let snapshot = dominant_market().build();
        let t = tender(1, CATEGORY, 1, Some(100_000.0), &[(1, 90_000.0, true), (2, 97_000.0, false)]);
        let result = FrequentWinnerDetector::new().analyze(&t, &snapshot, &RiskConfig::default());

        assert!(result.score >= 60.0);
        assert_eq!(result.score, 100.0);
        assert!(result.has_flag(RiskFlag::DominantMarketPosition));
        assert!(result.has_flag(RiskFlag::HighWinRate));
        assert!(result.has_flag(RiskFlag::HighlyConcentratedMarket));
        assert!(result.has_flag(RiskFlag::SingleRegionConcentration));

        let DetectorDetail::FrequentWinner(detail) = &result.detail else {
            panic!("unexpected detail variant");
        };
        let market = detail.market.as_ref().unwrap();
        assert!((market.market_share_count - 0.9).abs() < 1e-12);
        assert!((market.hhi - 0.82).abs() < 1e-12);
        assert_eq!(detail.win_rate.as_ref().unwrap().wins, 9);
        assert_eq!(detail.win_rate.as_ref().unwrap().bids, 10);
    }

    #[test]
    fn test_industry_benchmark_flag() {
        let snapshot = dominant_market().build();
        let t = tender(1, CATEGORY, 1, Some(100_000.0), &[(1, 90_000.0, true)]);
        let result = FrequentWinnerDetector::new().analyze(&t, &snapshot, &RiskConfig::default());
        // Company 2 won 1 of 10, company 1 won 9 of 10.
        assert!(result.has_flag(RiskFlag::WinRateAboveIndustryAverage));
    }

    #[test]
    fn test_no_winner_is_degraded() {
        let snapshot = MarketBuilder::new().build();
        let t = tender(1, CATEGORY, 1, Some(100_000.0), &[(1, 90_000.0, false)]);
        let result = FrequentWinnerDetector::new().analyze(&t, &snapshot, &RiskConfig::default());
        assert_eq!(result.flags, vec![RiskFlag::NoWinnerIdentified]);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_newcomer_with_thin_market() {
        let mut market = MarketBuilder::new();
        market.add(tender(1, CATEGORY, 10, Some(1_000.0), &[(5, 900.0, true)]));
        let snapshot = market.build();
        let t = tender(1, CATEGORY, 1, Some(1_000.0), &[(7, 950.0, true)]);
        let result = FrequentWinnerDetector::new().analyze(&t, &snapshot, &RiskConfig::default());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.flags, vec![RiskFlag::InsufficientMarketData]);
        assert!((result.confidence - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_old_history_outside_window_ignored() {
        let mut market = MarketBuilder::new();
        for i in 0..10 {
            market.add(tender(1, CATEGORY, 400 + i, Some(1_000.0), &[(1, 900.0, true)]));
        }
        let snapshot = market.build();
        let t = tender(1, CATEGORY, 1, Some(1_000.0), &[(1, 900.0, true)]);
        let result = FrequentWinnerDetector::new().analyze(&t, &snapshot, &RiskConfig::default());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_market_sample_counts_unawarded_tenders() {
        let mut market = MarketBuilder::new();
        for i in 0..2 {
            market.add(tender(1, CATEGORY, 10 + i, Some(1_000.0), &[(1, 900.0, true), (2, 950.0, false)]));
        }
        for i in 0..4 {
            market.add(tender(1, CATEGORY, 20 + i, Some(1_000.0), &[(2, 950.0, false)]));
        }
        let snapshot = market.build();
        let t = tender(1, CATEGORY, 1, Some(1_000.0), &[(1, 900.0, true)]);
        let result = FrequentWinnerDetector::new().analyze(&t, &snapshot, &RiskConfig::default());

        assert!(!result.has_flag(RiskFlag::InsufficientMarketData));
        assert!(result.has_flag(RiskFlag::DominantMarketPosition));
        let DetectorDetail::FrequentWinner(detail) = &result.detail else {
            panic!("unexpected detail variant");
        };
        let market = detail.market.as_ref().unwrap();
        assert!(market.sufficient);
        assert!(!market.widened);
        assert_eq!(market.tender_count, 6);
        assert_eq!(market.awarded_count, 2);
    }

    #[test]
    fn test_specialised_regional_winner() {
        let mut market = MarketBuilder::new().authority(1, Some("Cluj")).company(1, Some("Cluj"));
        for i in 0..6 {
            market.add(tender(1, CATEGORY, 10 + i * 10, Some(1_000.0), &[(1, 900.0, true)]));
        }
        let snapshot = market.build();
        let t = tender(1, CATEGORY, 1, Some(1_000.0), &[(1, 900.0, true)]);
        let result = FrequentWinnerDetector::new().analyze(&t, &snapshot, &RiskConfig::default());

        for flag in [
            RiskFlag::HighWinRate,
            RiskFlag::VeryHighRecentWinRate,
            RiskFlag::HighGeographicConcentration,
            RiskFlag::SingleRegionConcentration,
            RiskFlag::HighCategorySpecialization,
            RiskFlag::SingleCategorySpecialization,
        ] {
            assert!(result.has_flag(flag), "missing {}", flag);
        }
    }

    #[test]
    fn test_strong_market_position() {
        let mut market = MarketBuilder::new();
        for i in 0..10 {
            let winner = if i < 4 { 1 } else { i - 2 };
            market.add(tender(1, CATEGORY, 10 + i, Some(1_000.0), &[(winner, 900.0, true)]));
        }
        let snapshot = market.build();
        let t = tender(1, CATEGORY, 1, Some(1_000.0), &[(1, 900.0, true)]);
        let result = FrequentWinnerDetector::new().analyze(&t, &snapshot, &RiskConfig::default());

        assert!(result.has_flag(RiskFlag::StrongMarketPosition));
        assert!(!result.has_flag(RiskFlag::DominantMarketPosition));
        assert!(!result.has_flag(RiskFlag::HighlyConcentratedMarket));
        let DetectorDetail::FrequentWinner(detail) = &result.detail else {
            panic!("unexpected detail variant");
        };
        let market = detail.market.as_ref().unwrap();
        assert!((market.market_share_count - 0.4).abs() < 1e-12);
        assert!((market.hhi - 0.22).abs() < 1e-12);
    }
}
