use std::time::Duration;

use moka::future::Cache;
use tracing::debug;
use uuid::Uuid;

use crate::config::CacheSettings;
use crate::models::RiskAssessment;

/// In-process assessment cache keyed by tender id.
///
/// Entries expire after the configured TTL. A hit computed under an older
/// configuration version is treated as a miss.
#[derive(Clone)]
pub struct AssessmentCache {
    inner: Cache<Uuid, RiskAssessment>,
    ttl: Duration,
}

impl AssessmentCache {
    pub fn new(settings: &CacheSettings) -> Self {
        let ttl = Duration::from_secs(settings.ttl_seconds);
        let inner = Cache::builder()
            .max_capacity(settings.max_capacity)
            .time_to_live(ttl)
            .build();
        Self { inner, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, tender_id: Uuid, config_version: u64) -> Option<RiskAssessment> {
        let cached = self.inner.get(&tender_id).await?;
        if cached.config_version != config_version {
            debug!(
                tender_id = %tender_id,
                cached_version = cached.config_version,
                config_version,
                "Discarding cached assessment from older configuration"
            );
            self.inner.invalidate(&tender_id).await;
            return None;
        }
        Some(cached)
    }

    pub async fn insert(&self, assessment: RiskAssessment) {
        self.inner.insert(assessment.tender_id, assessment).await;
    }

    pub async fn invalidate(&self, tender_id: Uuid) {
        self.inner.invalidate(&tender_id).await;
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    pub async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}
