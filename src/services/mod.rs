pub mod alert_engine;
pub mod risk_analyzer;

pub use alert_engine::AlertEngine;
pub use risk_analyzer::{AlgorithmPerformance, BatchFailure, BatchOutcome, FlagCount, RiskAnalyzer, RiskStatistics};
