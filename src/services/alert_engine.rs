use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::database::AssessmentStore;
use crate::error::RiskError;
use crate::models::{
    AlertSeverity, ContractingAuthority, CreateRiskAlert, RiskAlert, RiskAssessment, Tender, RISK_DETECTION_ALERT,
};

/// Number of flags quoted in an alert message.
const ALERT_FLAG_LIMIT: usize = 5;
/// Tender title characters kept in an alert title.
const TITLE_LIMIT: usize = 100;

/// Raises review alerts for medium and high risk assessments.
///
/// At most one `risk_detection` alert exists per tender: any existing alert
/// of that type, resolved or not, suppresses a new one.
pub struct AlertEngine {
    store: Arc<dyn AssessmentStore>,
}

impl AlertEngine {
    pub fn new(store: Arc<dyn AssessmentStore>) -> Self {
        Self { store }
    }

    /// Create the alert for `assessment` if its level warrants one and none
    /// exists yet. Returns the alert that was created.
    pub async fn process(
        &self,
        tender: &Tender,
        assessment: &RiskAssessment,
        authority: Option<&ContractingAuthority>,
        now: DateTime<Utc>,
    ) -> Result<Option<RiskAlert>, RiskError> {
        let Some(severity) = AlertSeverity::from_level(assessment.level) else {
            return Ok(None);
        };

        let alert = RiskAlert::new(
            CreateRiskAlert {
                tender_id: tender.id,
                alert_type: RISK_DETECTION_ALERT.to_string(),
                severity,
                title: Self::title(tender, assessment),
                message: Self::message(tender, assessment, authority),
                risk_score: assessment.score,
                flags: assessment.flags.clone(),
            },
            now,
        );
        if !self.store.insert_alert_if_absent(alert.clone()).await? {
            debug!(tender_id = %tender.id, "Risk alert already exists, skipping");
            return Ok(None);
        }

        info!(
            tender_id = %tender.id,
            level = %assessment.level,
            score = assessment.score,
            "Generated risk alert"
        );
        Ok(Some(alert))
    }

    fn title(tender: &Tender, assessment: &RiskAssessment) -> String {
        let mut title: String = tender.title.chars().take(TITLE_LIMIT).collect();
        if tender.title.chars().count() > TITLE_LIMIT {
            title.push_str("...");
        }
        format!("{} Risk Detected: {}", assessment.level, title)
    }

    fn message(tender: &Tender, assessment: &RiskAssessment, authority: Option<&ContractingAuthority>) -> String {
        let flags: Vec<&str> = assessment
            .flags
            .iter()
            .take(ALERT_FLAG_LIMIT)
            .map(|f| f.as_str())
            .collect();
        let value = tender
            .estimated_value
            .map(|v| format!("{} {}", v, tender.currency))
            .unwrap_or_else(|| "Not specified".to_string());
        format!(
            "Risk Level: {}\nRisk Score: {:.2}\nPrimary Risk Factors: {}\nContracting Authority: {}\nEstimated Value: {}",
            assessment.level,
            assessment.score,
            flags.join(", "),
            authority.map(|a| a.name.as_str()).unwrap_or("Unknown"),
            value,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::database::InMemoryStore;
    use crate::models::RiskLevel;
    use crate::risk::fixtures::{as_of, tender, MarketBuilder};
    use crate::risk::CompositeRiskScorer;

    fn assessed(level: RiskLevel) -> (Tender, RiskAssessment) {
        let t = tender(1, "30192000-1", 1, Some(10.0), &[(1, 10.0, true)]);
        let mut assessment =
            CompositeRiskScorer::new().score(&t, &MarketBuilder::new().build(), &RiskConfig::default(), as_of());
        assessment.level = level;
        assessment.score = 75.0;
        (t, assessment)
    }

    #[tokio::test]
    async fn test_alert_created_once() {
        let store = Arc::new(InMemoryStore::new());
        let engine = AlertEngine::new(store.clone());
        let (t, assessment) = assessed(RiskLevel::High);

        let first = engine.process(&t, &assessment, None, as_of()).await.unwrap();
        let alert = first.expect("alert created");
        assert_eq!(alert.severity, AlertSeverity::High);
        assert!(alert.title.starts_with("HIGH Risk Detected: "));
        assert!(alert.message.contains("SINGLE_BIDDER"));
        assert!(alert.message.contains("Contracting Authority: Unknown"));

        let second = engine.process(&t, &assessment, None, as_of()).await.unwrap();
        assert!(second.is_none());
        assert_eq!(store.alerts_for_tender(t.id).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_processing_creates_one_alert() {
        let store = Arc::new(InMemoryStore::new());
        let engine = Arc::new(AlertEngine::new(store.clone()));
        let (t, assessment) = assessed(RiskLevel::Medium);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = engine.clone();
                let t = t.clone();
                let assessment = assessment.clone();
                tokio::spawn(async move { engine.process(&t, &assessment, None, as_of()).await })
            })
            .collect();

        let mut created = 0;
        for handle in futures::future::join_all(handles).await {
            if handle.unwrap().unwrap().is_some() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.alerts_for_tender(t.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_low_levels_do_not_alert() {
        let store = Arc::new(InMemoryStore::new());
        let engine = AlertEngine::new(store.clone());
        let (t, assessment) = assessed(RiskLevel::Low);
        assert!(engine.process(&t, &assessment, None, as_of()).await.unwrap().is_none());
        assert!(store.alerts_for_tender(t.id).await.unwrap().is_empty());
    }
}
