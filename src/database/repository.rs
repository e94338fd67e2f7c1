use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::snapshot::MarketSnapshot;
use crate::error::RiskError;
use crate::models::{RiskAlert, RiskAssessment, RiskLevel, Tender};

/// Read access to procurement data.
#[async_trait]
pub trait TenderRepository: Send + Sync {
    async fn get_tender(&self, tender_id: Uuid) -> Result<Option<Tender>, RiskError>;

    /// Tenders published in `[from, to]`, oldest first.
    async fn tenders_published_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Tender>, RiskError>;

    /// Snapshot of everything published or awarded in `[as_of - lookback, as_of]`.
    async fn load_market_snapshot(
        &self,
        as_of: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<MarketSnapshot, RiskError>;
}

/// Ordering of assessment listings. Callers must choose one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentOrder {
    /// Most recently analyzed first, ties broken by tender id.
    AnalyzedAtDesc,
    /// Highest composite score first, ties broken by most recent analysis.
    ScoreDesc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentFilter {
    pub order: AssessmentOrder,
    pub level: Option<RiskLevel>,
    pub min_score: Option<f64>,
    pub analyzed_since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl AssessmentFilter {
    pub fn new(order: AssessmentOrder) -> Self {
        Self {
            order,
            level: None,
            min_score: None,
            analyzed_since: None,
            limit: None,
            offset: 0,
        }
    }

    pub fn level(mut self, level: RiskLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.analyzed_since = Some(since);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, assessment: &RiskAssessment) -> bool {
        self.level.map_or(true, |l| assessment.level == l)
            && self.min_score.map_or(true, |s| assessment.score >= s)
            && self.analyzed_since.map_or(true, |s| assessment.analyzed_at >= s)
    }
}

/// Persistence of engine output.
#[async_trait]
pub trait AssessmentStore: Send + Sync {
    /// Replace every stored assessment of the tender with `assessment` in one
    /// step. Readers never observe the tender without an assessment. Returns
    /// the assessment that was replaced, if any.
    async fn supersede_assessment(
        &self,
        assessment: RiskAssessment,
    ) -> Result<Option<RiskAssessment>, RiskError>;

    async fn latest_assessment(&self, tender_id: Uuid) -> Result<Option<RiskAssessment>, RiskError>;

    async fn assessments_for_tender(&self, tender_id: Uuid) -> Result<Vec<RiskAssessment>, RiskError>;

    async fn list_assessments(&self, filter: &AssessmentFilter) -> Result<Vec<RiskAssessment>, RiskError>;

    async fn find_alert(&self, tender_id: Uuid, alert_type: &str) -> Result<Option<RiskAlert>, RiskError>;

    /// Store `alert` unless one of the same type already exists for its
    /// tender. The check and the insert happen atomically; returns whether
    /// the alert was stored.
    async fn insert_alert_if_absent(&self, alert: RiskAlert) -> Result<bool, RiskError>;

    async fn alerts_for_tender(&self, tender_id: Uuid) -> Result<Vec<RiskAlert>, RiskError>;
}
