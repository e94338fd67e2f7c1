use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable tag for a triggered risk condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskFlag {
    // Single bidder
    NoBids,
    SingleBidder,
    ChronicSingleBidderAuthority,
    FrequentSingleBidderAuthority,
    AtypicalSingleBidderForCategory,
    HighValueSingleBidder,

    // Price anomaly
    NoEstimatedValue,
    InsufficientComparableData,
    EstimatedValueStatisticalAnomaly,
    EstimatedValueIsolationAnomaly,
    EstimatedValueOutlier,
    WinningBidStatisticalAnomaly,
    WinningBidIsolationAnomaly,
    WinningBidOutlier,
    AnomalousBidToEstimateRatio,
    BidToEstimateRatioIsolationAnomaly,
    BidToEstimateRatioOutlier,
    UnusuallyLowBidSpread,

    // Frequent winner
    NoWinnerIdentified,
    InsufficientMarketData,
    HighWinRate,
    VeryHighRecentWinRate,
    WinRateAboveIndustryAverage,
    DominantMarketPosition,
    StrongMarketPosition,
    HighlyConcentratedMarket,
    HighGeographicConcentration,
    SingleRegionConcentration,
    HighCategorySpecialization,
    SingleCategorySpecialization,

    // Geographic clustering
    NoGeographicData,
    InsufficientLocalData,
    LocalMarketDominance,
    HighLocalConcentration,
    CurrentWinnerDominatesLocally,
    SingleRegionOperation,
    WinnerHomeRegionConcentration,
    NonLocalCompanyDominance,
    PredominantlyLocalBidders,
    SingleRegionBidders,
    HighLocalWinnerRate,
    AboveAverageLocalRate,
}

impl RiskFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFlag::NoBids => "NO_BIDS",
            RiskFlag::SingleBidder => "SINGLE_BIDDER",
            RiskFlag::ChronicSingleBidderAuthority => "CHRONIC_SINGLE_BIDDER_AUTHORITY",
            RiskFlag::FrequentSingleBidderAuthority => "FREQUENT_SINGLE_BIDDER_AUTHORITY",
            RiskFlag::AtypicalSingleBidderForCategory => "ATYPICAL_SINGLE_BIDDER_FOR_CATEGORY",
            RiskFlag::HighValueSingleBidder => "HIGH_VALUE_SINGLE_BIDDER",
            RiskFlag::NoEstimatedValue => "NO_ESTIMATED_VALUE",
            RiskFlag::InsufficientComparableData => "INSUFFICIENT_COMPARABLE_DATA",
            RiskFlag::EstimatedValueStatisticalAnomaly => "ESTIMATED_VALUE_STATISTICAL_ANOMALY",
            RiskFlag::EstimatedValueIsolationAnomaly => "ESTIMATED_VALUE_ISOLATION_ANOMALY",
            RiskFlag::EstimatedValueOutlier => "ESTIMATED_VALUE_OUTLIER",
            RiskFlag::WinningBidStatisticalAnomaly => "WINNING_BID_STATISTICAL_ANOMALY",
            RiskFlag::WinningBidIsolationAnomaly => "WINNING_BID_ISOLATION_ANOMALY",
            RiskFlag::WinningBidOutlier => "WINNING_BID_OUTLIER",
            RiskFlag::AnomalousBidToEstimateRatio => "ANOMALOUS_BID_TO_ESTIMATE_RATIO",
            RiskFlag::BidToEstimateRatioIsolationAnomaly => "BID_TO_ESTIMATE_RATIO_ISOLATION_ANOMALY",
            RiskFlag::BidToEstimateRatioOutlier => "BID_TO_ESTIMATE_RATIO_OUTLIER",
            RiskFlag::UnusuallyLowBidSpread => "UNUSUALLY_LOW_BID_SPREAD",
            RiskFlag::NoWinnerIdentified => "NO_WINNER_IDENTIFIED",
            RiskFlag::InsufficientMarketData => "INSUFFICIENT_MARKET_DATA",
            RiskFlag::HighWinRate => "HIGH_WIN_RATE",
            RiskFlag::VeryHighRecentWinRate => "VERY_HIGH_RECENT_WIN_RATE",
            RiskFlag::WinRateAboveIndustryAverage => "WIN_RATE_ABOVE_INDUSTRY_AVERAGE",
            RiskFlag::DominantMarketPosition => "DOMINANT_MARKET_POSITION",
            RiskFlag::StrongMarketPosition => "STRONG_MARKET_POSITION",
            RiskFlag::HighlyConcentratedMarket => "HIGHLY_CONCENTRATED_MARKET",
            RiskFlag::HighGeographicConcentration => "HIGH_GEOGRAPHIC_CONCENTRATION",
            RiskFlag::SingleRegionConcentration => "SINGLE_REGION_CONCENTRATION",
            RiskFlag::HighCategorySpecialization => "HIGH_CATEGORY_SPECIALIZATION",
            RiskFlag::SingleCategorySpecialization => "SINGLE_CATEGORY_SPECIALIZATION",
            RiskFlag::NoGeographicData => "NO_GEOGRAPHIC_DATA",
            RiskFlag::InsufficientLocalData => "INSUFFICIENT_LOCAL_DATA",
            RiskFlag::LocalMarketDominance => "LOCAL_MARKET_DOMINANCE",
            RiskFlag::HighLocalConcentration => "HIGH_LOCAL_CONCENTRATION",
            RiskFlag::CurrentWinnerDominatesLocally => "CURRENT_WINNER_DOMINATES_LOCALLY",
            RiskFlag::SingleRegionOperation => "SINGLE_REGION_OPERATION",
            RiskFlag::WinnerHomeRegionConcentration => "WINNER_HOME_REGION_CONCENTRATION",
            RiskFlag::NonLocalCompanyDominance => "NON_LOCAL_COMPANY_DOMINANCE",
            RiskFlag::PredominantlyLocalBidders => "PREDOMINANTLY_LOCAL_BIDDERS",
            RiskFlag::SingleRegionBidders => "SINGLE_REGION_BIDDERS",
            RiskFlag::HighLocalWinnerRate => "HIGH_LOCAL_WINNER_RATE",
            RiskFlag::AboveAverageLocalRate => "ABOVE_AVERAGE_LOCAL_RATE",
        }
    }

    /// Human-readable description shown next to the flag in alerts and reports.
    pub fn description(&self) -> &'static str {
        match self {
            RiskFlag::NoBids => "No bids were submitted",
            RiskFlag::SingleBidder => "Only one bid was submitted",
            RiskFlag::ChronicSingleBidderAuthority => {
                "Authority awards most of its tenders with a single bidder"
            }
            RiskFlag::FrequentSingleBidderAuthority => {
                "Authority frequently receives a single bid"
            }
            RiskFlag::AtypicalSingleBidderForCategory => {
                "Single bidder in a category that is normally competitive"
            }
            RiskFlag::HighValueSingleBidder => "High-value contract with a single bidder",
            RiskFlag::NoEstimatedValue => "Tender has no estimated value to compare",
            RiskFlag::InsufficientComparableData => "Too few comparable tenders for price analysis",
            RiskFlag::EstimatedValueStatisticalAnomaly => {
                "Estimated value deviates strongly from comparable tenders"
            }
            RiskFlag::EstimatedValueIsolationAnomaly => {
                "Estimated value is isolated from comparable tenders"
            }
            RiskFlag::EstimatedValueOutlier => "Estimated value lies outside the interquartile fences",
            RiskFlag::WinningBidStatisticalAnomaly => {
                "Winning bid deviates strongly from comparable winning bids"
            }
            RiskFlag::WinningBidIsolationAnomaly => {
                "Winning bid is isolated from comparable winning bids"
            }
            RiskFlag::WinningBidOutlier => "Winning bid lies outside the interquartile fences",
            RiskFlag::AnomalousBidToEstimateRatio => {
                "Winning bid to estimate ratio deviates strongly from comparable tenders"
            }
            RiskFlag::BidToEstimateRatioIsolationAnomaly => {
                "Winning bid to estimate ratio is isolated from comparable tenders"
            }
            RiskFlag::BidToEstimateRatioOutlier => {
                "Winning bid to estimate ratio lies outside the normal range"
            }
            RiskFlag::UnusuallyLowBidSpread => {
                "Bids are unusually close together, a possible sign of coordination"
            }
            RiskFlag::NoWinnerIdentified => "No winning bid recorded",
            RiskFlag::InsufficientMarketData => "Too few tenders in the market for concentration analysis",
            RiskFlag::HighWinRate => "Winner has a high historical win rate",
            RiskFlag::VeryHighRecentWinRate => "Winner has a very high recent win rate",
            RiskFlag::WinRateAboveIndustryAverage => {
                "Winner's win rate is more than twice the industry average"
            }
            RiskFlag::DominantMarketPosition => "Winner holds more than half of the category market",
            RiskFlag::StrongMarketPosition => "Winner holds a strong share of the category market",
            RiskFlag::HighlyConcentratedMarket => "Category market is highly concentrated",
            RiskFlag::HighGeographicConcentration => "Winner's awards concentrate in one region",
            RiskFlag::SingleRegionConcentration => "Winner's awards all come from one region",
            RiskFlag::HighCategorySpecialization => "Winner's awards concentrate in one category",
            RiskFlag::SingleCategorySpecialization => "Winner's awards all fall in one category division",
            RiskFlag::NoGeographicData => "Authority region is unknown",
            RiskFlag::InsufficientLocalData => "Too few local tenders for regional analysis",
            RiskFlag::LocalMarketDominance => "One company dominates the local market",
            RiskFlag::HighLocalConcentration => "Local market is highly concentrated",
            RiskFlag::CurrentWinnerDominatesLocally => "Winner is the dominant local supplier",
            RiskFlag::SingleRegionOperation => "Winner operates in a single region",
            RiskFlag::WinnerHomeRegionConcentration => {
                "Winner's awards concentrate in the tender's region"
            }
            RiskFlag::NonLocalCompanyDominance => "Non-local company dominates the region",
            RiskFlag::PredominantlyLocalBidders => "Bidders are predominantly local",
            RiskFlag::SingleRegionBidders => "All bidders come from one region",
            RiskFlag::HighLocalWinnerRate => "Local companies win most tenders in this region",
            RiskFlag::AboveAverageLocalRate => "Local win rate is well above the category average",
        }
    }

    /// Flags explaining why a detector could not assess the tender.
    pub fn is_degraded_input(&self) -> bool {
        matches!(
            self,
            RiskFlag::NoBids
                | RiskFlag::NoEstimatedValue
                | RiskFlag::InsufficientComparableData
                | RiskFlag::NoWinnerIdentified
                | RiskFlag::InsufficientMarketData
                | RiskFlag::NoGeographicData
                | RiskFlag::InsufficientLocalData
        )
    }
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
