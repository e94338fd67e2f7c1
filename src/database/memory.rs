use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::repository::{AssessmentFilter, AssessmentOrder, AssessmentStore, TenderRepository};
use super::snapshot::MarketSnapshot;
use crate::error::RiskError;
use crate::models::{Award, Company, ContractingAuthority, RiskAlert, RiskAssessment, Tender};

/// Serialized procurement data, as read by the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub authorities: Vec<ContractingAuthority>,
    pub companies: Vec<Company>,
    pub tenders: Vec<Tender>,
    pub awards: Vec<Award>,
}

impl Dataset {
    pub fn from_json_file(path: &Path) -> Result<Self, RiskError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Default)]
struct MarketData {
    tenders: HashMap<Uuid, Tender>,
    awards: Vec<Award>,
    companies: HashMap<i64, Company>,
    authorities: HashMap<i64, ContractingAuthority>,
}

/// In-process implementation of both data-layer traits.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<MarketData>,
    assessments: RwLock<HashMap<Uuid, RiskAssessment>>,
    alerts: RwLock<Vec<RiskAlert>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_dataset(dataset: Dataset) -> Result<Self, RiskError> {
        let store = Self::new();
        for authority in dataset.authorities {
            store.insert_authority(authority).await;
        }
        for company in dataset.companies {
            store.insert_company(company).await;
        }
        for tender in dataset.tenders {
            store.insert_tender(tender).await?;
        }
        for award in dataset.awards {
            store.insert_award(award).await;
        }
        let data = store.data.read().await;
        info!(
            tenders = data.tenders.len(),
            awards = data.awards.len(),
            companies = data.companies.len(),
            authorities = data.authorities.len(),
            "Loaded dataset into memory"
        );
        drop(data);
        Ok(store)
    }

    /// Insert or replace a tender. Tenders with more than one winning bid are rejected.
    pub async fn insert_tender(&self, tender: Tender) -> Result<(), RiskError> {
        tender.validate()?;
        self.data.write().await.tenders.insert(tender.id, tender);
        Ok(())
    }

    pub async fn insert_award(&self, award: Award) {
        self.data.write().await.awards.push(award);
    }

    pub async fn insert_company(&self, company: Company) {
        self.data.write().await.companies.insert(company.id, company);
    }

    pub async fn insert_authority(&self, authority: ContractingAuthority) {
        self.data.write().await.authorities.insert(authority.id, authority);
    }

    pub async fn tender_count(&self) -> usize {
        self.data.read().await.tenders.len()
    }

    pub async fn assessment_count(&self) -> usize {
        self.assessments.read().await.len()
    }
}

#[async_trait]
impl TenderRepository for InMemoryStore {
    async fn get_tender(&self, tender_id: Uuid) -> Result<Option<Tender>, RiskError> {
        Ok(self.data.read().await.tenders.get(&tender_id).cloned())
    }

    async fn tenders_published_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Tender>, RiskError> {
        let data = self.data.read().await;
        let mut tenders: Vec<Tender> = data
            .tenders
            .values()
            .filter(|t| t.publication_date >= from && t.publication_date <= to)
            .cloned()
            .collect();
        tenders.sort_by(|a, b| {
            a.publication_date
                .cmp(&b.publication_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(tenders)
    }

    async fn load_market_snapshot(
        &self,
        as_of: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<MarketSnapshot, RiskError> {
        let since = as_of - lookback;
        let data = self.data.read().await;
        let tenders: Vec<Tender> = data
            .tenders
            .values()
            .filter(|t| t.publication_date >= since)
            .cloned()
            .collect();
        let awards: Vec<Award> = data
            .awards
            .iter()
            .filter(|a| a.award_date >= since)
            .cloned()
            .collect();
        debug!(
            tenders = tenders.len(),
            awards = awards.len(),
            lookback_days = lookback.num_days(),
            "Loaded market snapshot"
        );
        Ok(MarketSnapshot::new(
            as_of,
            tenders,
            awards,
            data.companies.values().cloned().collect(),
            data.authorities.values().cloned().collect(),
        ))
    }
}

#[async_trait]
impl AssessmentStore for InMemoryStore {
    async fn supersede_assessment(
        &self,
        assessment: RiskAssessment,
    ) -> Result<Option<RiskAssessment>, RiskError> {
        // Delete and insert happen under one write guard.
        let mut assessments = self.assessments.write().await;
        Ok(assessments.insert(assessment.tender_id, assessment))
    }

    async fn latest_assessment(&self, tender_id: Uuid) -> Result<Option<RiskAssessment>, RiskError> {
        Ok(self.assessments.read().await.get(&tender_id).cloned())
    }

    async fn assessments_for_tender(&self, tender_id: Uuid) -> Result<Vec<RiskAssessment>, RiskError> {
        Ok(self
            .assessments
            .read()
            .await
            .get(&tender_id)
            .cloned()
            .into_iter()
            .collect())
    }

    async fn list_assessments(&self, filter: &AssessmentFilter) -> Result<Vec<RiskAssessment>, RiskError> {
        let assessments = self.assessments.read().await;
        let mut matching: Vec<RiskAssessment> = assessments
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        drop(assessments);

        match filter.order {
            AssessmentOrder::AnalyzedAtDesc => matching.sort_by(|a, b| {
                b.analyzed_at
                    .cmp(&a.analyzed_at)
                    .then_with(|| a.tender_id.cmp(&b.tender_id))
            }),
            AssessmentOrder::ScoreDesc => matching.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then_with(|| b.analyzed_at.cmp(&a.analyzed_at))
                    .then_with(|| a.tender_id.cmp(&b.tender_id))
            }),
        }

        Ok(matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn find_alert(&self, tender_id: Uuid, alert_type: &str) -> Result<Option<RiskAlert>, RiskError> {
        Ok(self
            .alerts
            .read()
            .await
            .iter()
            .find(|a| a.tender_id == tender_id && a.alert_type == alert_type)
            .cloned())
    }

    async fn insert_alert_if_absent(&self, alert: RiskAlert) -> Result<bool, RiskError> {
        let mut alerts = self.alerts.write().await;
        if alerts
            .iter()
            .any(|a| a.tender_id == alert.tender_id && a.alert_type == alert.alert_type)
        {
            return Ok(false);
        }
        alerts.push(alert);
        Ok(true)
    }

    async fn alerts_for_tender(&self, tender_id: Uuid) -> Result<Vec<RiskAlert>, RiskError> {
        Ok(self
            .alerts
            .read()
            .await
            .iter()
            .filter(|a| a.tender_id == tender_id)
            .cloned()
            .collect())
    }
}
