use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{AlgorithmKind, ProcedureType, RiskFlag, RiskLevel};

/// Output of one detector for one tender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorResult {
    pub kind: AlgorithmKind,
    pub score: f64,
    pub level: RiskLevel,
    pub flags: Vec<RiskFlag>,
    pub confidence: f64,
    pub detail: DetectorDetail,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl DetectorResult {
    pub fn has_flag(&self, flag: RiskFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Whether the detector could not assess the tender.
    pub fn is_degraded(&self) -> bool {
        self.flags.iter().any(|f| f.is_degraded_input())
    }
}

/// Per-detector structured detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum DetectorDetail {
    SingleBidder(SingleBidderDetail),
    PriceAnomaly(PriceAnomalyDetail),
    FrequentWinner(FrequentWinnerDetail),
    Geographic(GeographicDetail),
}

impl DetectorDetail {
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            DetectorDetail::SingleBidder(_) => AlgorithmKind::SingleBidder,
            DetectorDetail::PriceAnomaly(_) => AlgorithmKind::PriceAnomaly,
            DetectorDetail::FrequentWinner(_) => AlgorithmKind::FrequentWinner,
            DetectorDetail::Geographic(_) => AlgorithmKind::Geographic,
        }
    }
}

/// A multiplier applied to a base score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedFactor {
    pub name: String,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleBidderRate {
    pub tender_count: usize,
    pub single_bidder_count: usize,
    pub single_bidder_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SingleBidderDetail {
    pub bid_count: usize,
    pub base_score: f64,
    pub factors: Vec<AppliedFactor>,
    pub authority_history: Option<SingleBidderRate>,
    pub category_context: Option<SingleBidderRate>,
    pub estimated_value: Option<f64>,
    pub procedure_type: Option<ProcedureType>,
}

/// Where a comparable cohort came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortInfo {
    pub category: String,
    pub widened: bool,
    pub size: usize,
}

/// Outlier statistics of one value against a reference series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesAnalysis {
    pub value: f64,
    pub sample_size: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub z_score: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub iqr_outlier: bool,
    pub isolation_score: f64,
    pub anomaly_fraction: f64,
    pub isolation_anomaly: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadAnalysis {
    pub spread_pct: f64,
    pub cohort_size: usize,
    pub cohort_mean: f64,
    pub cohort_std_dev: f64,
    pub z_score: f64,
    pub unusually_low: bool,
    pub unusually_high: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceAnomalyDetail {
    pub cohort: Option<CohortInfo>,
    pub estimated_value: Option<SeriesAnalysis>,
    pub estimated_value_percentile: Option<f64>,
    pub winning_bid: Option<SeriesAnalysis>,
    pub bid_ratio: Option<SeriesAnalysis>,
    pub bid_spread: Option<SpreadAnalysis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinRateStats {
    pub bids: usize,
    pub wins: usize,
    pub win_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConcentration {
    pub category: String,
    pub widened: bool,
    pub tender_count: usize,
    pub awarded_count: usize,
    pub sufficient: bool,
    pub market_share_count: f64,
    pub market_share_value: f64,
    pub hhi: f64,
    pub top3_share: f64,
    pub competitor_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConcentration {
    pub award_count: usize,
    pub unique_regions: usize,
    pub top_region: Option<String>,
    pub top_region_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySpecialization {
    pub award_count: usize,
    pub unique_categories: usize,
    pub top_category: Option<String>,
    pub top_category_share: f64,
    pub unique_divisions: usize,
    pub top_division_share: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrequentWinnerDetail {
    pub company_id: Option<i64>,
    pub win_rate: Option<WinRateStats>,
    pub recent_win_rate: Option<WinRateStats>,
    pub industry_average_win_rate: Option<f64>,
    pub market: Option<MarketConcentration>,
    pub geographic: Option<RegionConcentration>,
    pub specialization: Option<CategorySpecialization>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalConcentration {
    pub tender_count: usize,
    pub awarded_count: usize,
    pub winner_count: usize,
    pub hhi: f64,
    pub top_winner_id: Option<i64>,
    pub top_winner_share: f64,
    pub top_winner_value_share: f64,
    pub current_winner_is_top: bool,
    pub current_winner_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinnerSpread {
    pub award_count: usize,
    pub unique_regions: usize,
    pub home_region: Option<String>,
    pub home_region_share: f64,
    pub tender_region_share: f64,
    pub is_local: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidderPool {
    pub bidder_count: usize,
    pub located_bidders: usize,
    pub local_bidder_rate: f64,
    pub unique_regions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLocality {
    pub tender_count: usize,
    pub region_count: usize,
    pub current_region_rate: f64,
    pub average_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeographicDetail {
    pub region: Option<String>,
    pub local: Option<LocalConcentration>,
    pub winner_spread: Option<WinnerSpread>,
    pub bidder_pool: Option<BidderPool>,
    pub category_pattern: Option<CategoryLocality>,
}
