// Risk detector traits and shared result plumbing
use crate::config::RiskConfig;
use crate::database::MarketView;
use crate::models::{AlgorithmKind, Tender};
use crate::risk::metrics::DetectorResult;

/// Core trait implemented by every detector.
///
/// Detectors are pure: the result depends only on the tender, the market
/// snapshot and the configuration snapshot passed in.
pub trait RiskDetector: Send + Sync {
    /// Which algorithm this detector implements
    fn kind(&self) -> AlgorithmKind;

    /// Score a single tender
    fn analyze(&self, tender: &Tender, market: &dyn MarketView, config: &RiskConfig) -> DetectorResult;

    /// Score several tenders against the same snapshot, in input order.
    ///
    /// Implementations may share market context across the batch; the
    /// per-tender score must match what `analyze` returns.
    fn analyze_batch(
        &self,
        tenders: &[Tender],
        market: &dyn MarketView,
        config: &RiskConfig,
    ) -> Vec<DetectorResult> {
        tenders
            .iter()
            .map(|tender| self.analyze(tender, market, config))
            .collect()
    }

    /// Get the risk factors this detector considers
    fn risk_factors(&self) -> Vec<&'static str>;

    /// Get the version of this detector (for tracking changes)
    fn version(&self) -> &'static str {
        "1.0.0"
    }

    /// Describe the detector and the parameters it reads
    fn algorithm_info(&self, config: &RiskConfig) -> serde_json::Value {
        serde_json::json!({
            "algorithm": self.kind().as_str(),
            "version": self.version(),
            "weight": config.normalized_weights().get(self.kind()),
            "risk_factors": self.risk_factors(),
        })
    }
}
