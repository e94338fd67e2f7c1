use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{BatchSettings, ConfigManager, ConfigValidationReport, Settings};
use crate::database::{
    AssessmentFilter, AssessmentOrder, AssessmentStore, MarketSnapshot, MarketView, TenderRepository,
};
use crate::error::RiskError;
use crate::models::{AlgorithmKind, RiskAssessment, RiskFlag, RiskLevel, Tender};
use crate::risk::composite::{HIGH_SIGNAL_SCORE, MEDIUM_SIGNAL_SCORE};
use crate::risk::{CompositeRiskScorer, ALGORITHM_VERSION};
use crate::services::alert_engine::AlertEngine;
use crate::utils::{AssessmentCache, Clock, EngineMetrics, SystemClock};

/// Assessments persisted concurrently within one batch chunk.
const PERSIST_CONCURRENCY: usize = 8;
/// Flags reported by [`RiskAnalyzer::get_statistics`].
const TOP_FLAG_LIMIT: usize = 10;

/// Result of a batch run. A failed tender never aborts the rest of the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub assessments: Vec<RiskAssessment>,
    pub failures: Vec<BatchFailure>,
    /// Set when the run stopped early on request.
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub tender_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagCount {
    pub flag: RiskFlag,
    pub count: usize,
}

/// Aggregate view over assessments made inside a time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskStatistics {
    pub period_days: i64,
    pub total_analyzed: usize,
    pub average_score: f64,
    pub level_counts: BTreeMap<RiskLevel, usize>,
    pub level_percentages: BTreeMap<RiskLevel, f64>,
    pub algorithm_averages: BTreeMap<AlgorithmKind, f64>,
    pub top_flags: Vec<FlagCount>,
    pub high_risk_rate: f64,
    pub generated_at: DateTime<Utc>,
}

/// Score distribution of one detector across recent assessments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmPerformance {
    pub total_analyses: usize,
    pub average_score: f64,
    pub max_score: f64,
    pub min_score: f64,
    pub high_risk_count: usize,
    pub medium_risk_count: usize,
    pub low_risk_count: usize,
}

/// Entry point for every risk operation: caching, persistence, alerting,
/// batch runs, statistics and configuration.
pub struct RiskAnalyzer {
    repository: Arc<dyn TenderRepository>,
    store: Arc<dyn AssessmentStore>,
    config: ConfigManager,
    scorer: CompositeRiskScorer,
    cache: AssessmentCache,
    alerts: AlertEngine,
    metrics: EngineMetrics,
    clock: Arc<dyn Clock>,
    batch: BatchSettings,
}

impl RiskAnalyzer {
    pub fn new(
        repository: Arc<dyn TenderRepository>,
        store: Arc<dyn AssessmentStore>,
        config: ConfigManager,
        settings: &Settings,
    ) -> Result<Self, RiskError> {
        Ok(Self {
            repository,
            alerts: AlertEngine::new(store.clone()),
            store,
            config,
            scorer: CompositeRiskScorer::new(),
            cache: AssessmentCache::new(&settings.cache),
            metrics: EngineMetrics::new()?,
            clock: Arc::new(SystemClock),
            batch: settings.batch.clone(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_scorer(mut self, scorer: CompositeRiskScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    /// Analyze one tender, serving a cached assessment unless `force_refresh`
    /// is set or the cache holds nothing for the current configuration.
    pub async fn analyze(&self, tender: &Tender, force_refresh: bool) -> Result<RiskAssessment, RiskError> {
        let started = Instant::now();
        let result = self.analyze_inner(tender, force_refresh).await;
        self.metrics.observe_duration("analyze", started.elapsed());
        if let Err(e) = &result {
            self.metrics.record_failure();
            error!(tender_id = %tender.id, error = %e, "Risk analysis failed");
        }
        result
    }

    async fn analyze_inner(&self, tender: &Tender, force_refresh: bool) -> Result<RiskAssessment, RiskError> {
        tender.validate()?;
        let config = self.config.snapshot().await;

        if !force_refresh {
            if let Some(cached) = self.cache.get(tender.id, config.version).await {
                self.metrics.record_cache(true);
                debug!(tender_id = %tender.id, "Using cached risk assessment");
                return Ok(cached);
            }
            self.metrics.record_cache(false);
        }

        let now = self.clock.now();
        let market = self
            .repository
            .load_market_snapshot(now, config.max_lookback())
            .await?;
        let assessment = self.scorer.score(tender, &market, &config, now);
        self.persist(tender, assessment, &market).await
    }

    pub async fn analyze_by_id(&self, tender_id: Uuid, force_refresh: bool) -> Result<RiskAssessment, RiskError> {
        let tender = self.load_tender(tender_id).await?;
        self.analyze(&tender, force_refresh).await
    }

    /// Supersede the stored assessment, refresh the cache and raise alerts.
    async fn persist(
        &self,
        tender: &Tender,
        assessment: RiskAssessment,
        market: &MarketSnapshot,
    ) -> Result<RiskAssessment, RiskError> {
        if let Some(previous) = self.store.supersede_assessment(assessment.clone()).await? {
            debug!(
                tender_id = %tender.id,
                previous_score = previous.score,
                score = assessment.score,
                "Superseded prior assessment"
            );
        }
        self.cache.insert(assessment.clone()).await;

        let authority = market.authority(tender.authority_id);
        match self
            .alerts
            .process(tender, &assessment, authority, assessment.analyzed_at)
            .await
        {
            Ok(Some(_)) => self.metrics.record_alert(),
            Ok(None) => {}
            Err(e) => warn!(tender_id = %tender.id, error = %e, "Failed to generate risk alert"),
        }

        self.metrics.record_analysis(assessment.level);
        info!(
            tender_id = %tender.id,
            level = %assessment.level,
            score = assessment.score,
            "Risk analysis completed"
        );
        Ok(assessment)
    }

    /// Analyze every tender against one market snapshot.
    pub async fn analyze_batch(&self, tenders: &[Tender]) -> Result<BatchOutcome, RiskError> {
        let never = AtomicBool::new(false);
        self.analyze_batch_cancellable(tenders, &never).await
    }

    /// Like [`analyze_batch`](Self::analyze_batch), but stops before the next
    /// tender once `cancel` is set. Tenders already persisted stay persisted.
    pub async fn analyze_batch_cancellable(
        &self,
        tenders: &[Tender],
        cancel: &AtomicBool,
    ) -> Result<BatchOutcome, RiskError> {
        let started = Instant::now();
        let config = self.config.snapshot().await;
        let now = self.clock.now();
        let market = self
            .repository
            .load_market_snapshot(now, config.max_lookback())
            .await?;

        info!(tenders = tenders.len(), "Starting batch risk analysis");
        let mut outcome = BatchOutcome::default();

        for chunk in tenders.chunks(self.batch.chunk_size.max(1)) {
            if cancel.load(Ordering::Relaxed) {
                outcome.cancelled = true;
                break;
            }

            let mut valid = Vec::with_capacity(chunk.len());
            for tender in chunk {
                match tender.validate() {
                    Ok(()) => valid.push(tender.clone()),
                    Err(e) => outcome.failures.push(BatchFailure {
                        tender_id: tender.id,
                        error: e.to_string(),
                    }),
                }
            }

            let scored = self.scorer.score_batch(&valid, &market, &config, now);
            let market = &market;
            let persisted: Vec<Option<(Uuid, Result<RiskAssessment, RiskError>)>> =
                stream::iter(valid.iter().zip(scored))
                    .map(|(tender, assessment)| async move {
                        if cancel.load(Ordering::Relaxed) {
                            return None;
                        }
                        Some((tender.id, self.persist(tender, assessment, market).await))
                    })
                    .buffered(PERSIST_CONCURRENCY)
                    .collect()
                    .await;

            for entry in persisted {
                match entry {
                    Some((_, Ok(assessment))) => outcome.assessments.push(assessment),
                    Some((tender_id, Err(e))) => {
                        self.metrics.record_failure();
                        outcome.failures.push(BatchFailure {
                            tender_id,
                            error: e.to_string(),
                        });
                    }
                    None => outcome.cancelled = true,
                }
            }
            if outcome.cancelled {
                break;
            }
        }

        self.metrics.observe_duration("analyze_batch", started.elapsed());
        if outcome.cancelled {
            warn!(
                completed = outcome.assessments.len(),
                requested = tenders.len(),
                "Batch risk analysis cancelled"
            );
        }
        info!(
            analyzed = outcome.assessments.len(),
            failed = outcome.failures.len(),
            "Batch risk analysis completed"
        );
        Ok(outcome)
    }

    /// Analyze tenders published within `window` of now.
    pub async fn analyze_recent(&self, window: Duration) -> Result<BatchOutcome, RiskError> {
        let now = self.clock.now();
        let tenders = self.repository.tenders_published_between(now - window, now).await?;
        info!(
            tenders = tenders.len(),
            days = window.num_days(),
            "Analyzing recently published tenders"
        );
        self.analyze_batch(&tenders).await
    }

    /// Drop any cached or stored result and recompute from fresh data.
    pub async fn reanalyze(&self, tender_id: Uuid) -> Result<RiskAssessment, RiskError> {
        let tender = self.load_tender(tender_id).await?;
        self.cache.invalidate(tender_id).await;
        let assessment = self.analyze(&tender, true).await?;
        info!(
            tender_id = %tender_id,
            level = %assessment.level,
            score = assessment.score,
            "Reanalyzed tender"
        );
        Ok(assessment)
    }

    pub async fn latest_assessment(&self, tender_id: Uuid) -> Result<Option<RiskAssessment>, RiskError> {
        self.store.latest_assessment(tender_id).await
    }

    pub async fn get_statistics(&self, window: Duration) -> Result<RiskStatistics, RiskError> {
        let now = self.clock.now();
        let filter = AssessmentFilter::new(AssessmentOrder::AnalyzedAtDesc).since(now - window);
        let assessments = self.store.list_assessments(&filter).await?;
        let total = assessments.len();

        let mut level_counts: BTreeMap<RiskLevel, usize> = RiskLevel::ALL.iter().map(|l| (*l, 0)).collect();
        let mut algorithm_totals: BTreeMap<AlgorithmKind, f64> =
            AlgorithmKind::ALL.iter().map(|k| (*k, 0.0)).collect();
        let mut flag_counts: HashMap<RiskFlag, usize> = HashMap::new();
        let mut score_total = 0.0;

        for assessment in &assessments {
            *level_counts.entry(assessment.level).or_insert(0) += 1;
            score_total += assessment.score;
            for kind in AlgorithmKind::ALL {
                *algorithm_totals.entry(kind).or_insert(0.0) += assessment.sub_scores.get(kind);
            }
            for flag in &assessment.flags {
                *flag_counts.entry(*flag).or_insert(0) += 1;
            }
        }

        let per = |value: f64| if total == 0 { 0.0 } else { value / total as f64 };
        let level_percentages: BTreeMap<RiskLevel, f64> = level_counts
            .iter()
            .map(|(level, count)| (*level, per(*count as f64) * 100.0))
            .collect();
        let algorithm_averages = algorithm_totals
            .into_iter()
            .map(|(kind, sum)| (kind, per(sum)))
            .collect();

        let mut top_flags: Vec<FlagCount> = flag_counts
            .into_iter()
            .map(|(flag, count)| FlagCount { flag, count })
            .collect();
        top_flags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.flag.as_str().cmp(b.flag.as_str())));
        top_flags.truncate(TOP_FLAG_LIMIT);

        Ok(RiskStatistics {
            period_days: window.num_days(),
            total_analyzed: total,
            average_score: crate::utils::math::round_to(per(score_total), 2),
            high_risk_rate: level_percentages.get(&RiskLevel::High).copied().unwrap_or(0.0),
            level_counts,
            level_percentages,
            algorithm_averages,
            top_flags,
            generated_at: now,
        })
    }

    /// Highest scoring HIGH-level assessments, best first.
    pub async fn get_high_risk(&self, limit: usize) -> Result<Vec<RiskAssessment>, RiskError> {
        let filter = AssessmentFilter::new(AssessmentOrder::ScoreDesc)
            .level(RiskLevel::High)
            .limit(limit);
        self.store.list_assessments(&filter).await
    }

    pub async fn algorithm_performance(
        &self,
        window: Duration,
    ) -> Result<BTreeMap<AlgorithmKind, AlgorithmPerformance>, RiskError> {
        let filter = AssessmentFilter::new(AssessmentOrder::AnalyzedAtDesc).since(self.clock.now() - window);
        let assessments = self.store.list_assessments(&filter).await?;

        let mut performance = BTreeMap::new();
        for kind in AlgorithmKind::ALL {
            let scores: Vec<f64> = assessments.iter().map(|a| a.sub_scores.get(kind)).collect();
            let Some(average_score) = crate::utils::math::mean(&scores) else {
                continue;
            };
            performance.insert(
                kind,
                AlgorithmPerformance {
                    total_analyses: scores.len(),
                    average_score,
                    max_score: scores.iter().copied().fold(f64::MIN, f64::max),
                    min_score: scores.iter().copied().fold(f64::MAX, f64::min),
                    high_risk_count: scores.iter().filter(|s| **s > HIGH_SIGNAL_SCORE).count(),
                    medium_risk_count: scores
                        .iter()
                        .filter(|s| (MEDIUM_SIGNAL_SCORE..=HIGH_SIGNAL_SCORE).contains(*s))
                        .count(),
                    low_risk_count: scores.iter().filter(|s| **s < MEDIUM_SIGNAL_SCORE).count(),
                },
            );
        }
        Ok(performance)
    }

    /// Apply a partial configuration update. Cached assessments from the old
    /// configuration are dropped when it succeeds.
    pub async fn update_configuration(
        &self,
        partial: &BTreeMap<String, f64>,
    ) -> Result<ConfigValidationReport, RiskError> {
        let report = self.config.update(partial).await?;
        self.cache.invalidate_all();
        Ok(report)
    }

    pub async fn validate_configuration(&self) -> ConfigValidationReport {
        self.config.validate().await
    }

    pub async fn system_info(&self) -> serde_json::Value {
        let config = self.config.snapshot().await;
        serde_json::json!({
            "system_version": env!("CARGO_PKG_VERSION"),
            "algorithm_version": ALGORITHM_VERSION,
            "composite_scorer": self.scorer.algorithm_info(&config),
            "configuration": config.to_parameters(),
            "cache": {
                "ttl_seconds": self.cache.ttl().as_secs(),
                "entries": self.cache.entry_count().await,
            },
            "batch": {
                "chunk_size": self.batch.chunk_size,
            },
        })
    }

    async fn load_tender(&self, tender_id: Uuid) -> Result<Tender, RiskError> {
        self.repository
            .get_tender(tender_id)
            .await?
            .ok_or(RiskError::NotFound { tender_id })
    }
}
