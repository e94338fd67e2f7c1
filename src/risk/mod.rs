pub mod calculators;
pub mod composite;
pub mod metrics;
pub mod traits;

#[cfg(test)]
pub(crate) mod fixtures;

pub use calculators::{
    FrequentWinnerDetector, GeographicClusteringDetector, PriceAnomalyDetector, SingleBidderDetector,
    DEGRADED_CONFIDENCE,
};
pub use composite::{amplification_multiplier, CompositeRiskScorer, ALGORITHM_VERSION};
pub use metrics::{DetectorDetail, DetectorResult};
pub use traits::RiskDetector;
