use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{RiskFlag, RiskLevel};

/// Alert type raised by the risk engine.
pub const RISK_DETECTION_ALERT: &str = "risk_detection";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Medium,
    High,
}

impl AlertSeverity {
    pub fn from_level(level: RiskLevel) -> Option<Self> {
        match level {
            RiskLevel::High => Some(AlertSeverity::High),
            RiskLevel::Medium => Some(AlertSeverity::Medium),
            RiskLevel::Low | RiskLevel::Minimal => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub id: Uuid,
    pub tender_id: Uuid,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub risk_score: f64,
    pub flags: Vec<RiskFlag>,
    pub is_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateRiskAlert {
    pub tender_id: Uuid,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub risk_score: f64,
    pub flags: Vec<RiskFlag>,
}

impl RiskAlert {
    pub fn new(create: CreateRiskAlert, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tender_id: create.tender_id,
            alert_type: create.alert_type,
            severity: create.severity,
            title: create.title,
            message: create.message,
            risk_score: create.risk_score,
            flags: create.flags,
            is_resolved: false,
            resolved_at: None,
            created_at,
        }
    }

    pub fn resolve(&mut self, at: DateTime<Utc>) {
        self.is_resolved = true;
        self.resolved_at = Some(at);
    }

    pub fn is_pending(&self) -> bool {
        !self.is_resolved
    }
}
