pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod risk;
pub mod services;
pub mod utils;

pub use error::types::*;
pub use risk::{CompositeRiskScorer, RiskDetector};
pub use services::RiskAnalyzer;
