use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the risk engine.
///
/// Degraded inputs (no bids, no winner, thin cohorts) are not errors; the
/// detectors report them as zero-risk results carrying a reason flag.
#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Tender not found: {tender_id}")]
    NotFound { tender_id: Uuid },

    #[error("Invalid configuration: {}", issues.join("; "))]
    InvalidConfiguration { issues: Vec<String> },

    #[error("Invalid tender {tender_id}: {message}")]
    InvalidTender { tender_id: Uuid, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RiskError {
    pub fn invalid_tender(tender_id: Uuid, message: impl Into<String>) -> Self {
        RiskError::InvalidTender {
            tender_id,
            message: message.into(),
        }
    }

    /// Whether the caller asked for something that does not exist, as opposed
    /// to an engine or storage fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RiskError::NotFound { .. })
    }
}

pub type RiskResult<T> = Result<T, RiskError>;
