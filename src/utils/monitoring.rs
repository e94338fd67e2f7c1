use std::time::Duration;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::RiskError;
use crate::models::RiskLevel;

/// Engine metrics on a registry owned by the analyzer.
#[derive(Clone)]
pub struct EngineMetrics {
    registry: Registry,
    analyses_total: IntCounterVec,
    analysis_failures_total: IntCounter,
    cache_requests_total: IntCounterVec,
    alerts_created_total: IntCounter,
    analysis_duration_seconds: HistogramVec,
}

impl EngineMetrics {
    pub fn new() -> Result<Self, RiskError> {
        let registry = Registry::new();

        let analyses_total = IntCounterVec::new(
            Opts::new("tender_risk_analyses_total", "Completed tender analyses by risk level"),
            &["level"],
        )?;
        let analysis_failures_total =
            IntCounter::new("tender_risk_analysis_failures_total", "Tender analyses that failed")?;
        let cache_requests_total = IntCounterVec::new(
            Opts::new("tender_risk_cache_requests_total", "Assessment cache lookups by outcome"),
            &["outcome"],
        )?;
        let alerts_created_total =
            IntCounter::new("tender_risk_alerts_created_total", "Risk alerts raised")?;
        let analysis_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "tender_risk_analysis_duration_seconds",
                "Time spent scoring tenders, by entry point",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;

        registry.register(Box::new(analyses_total.clone()))?;
        registry.register(Box::new(analysis_failures_total.clone()))?;
        registry.register(Box::new(cache_requests_total.clone()))?;
        registry.register(Box::new(alerts_created_total.clone()))?;
        registry.register(Box::new(analysis_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            analyses_total,
            analysis_failures_total,
            cache_requests_total,
            alerts_created_total,
            analysis_duration_seconds,
        })
    }

    pub fn record_analysis(&self, level: RiskLevel) {
        self.analyses_total.with_label_values(&[level.as_str()]).inc();
    }

    pub fn record_failure(&self) {
        self.analysis_failures_total.inc();
    }

    pub fn record_cache(&self, hit: bool) {
        let outcome = if hit { "hit" } else { "miss" };
        self.cache_requests_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_alert(&self) {
        self.alerts_created_total.inc();
    }

    pub fn observe_duration(&self, operation: &str, elapsed: Duration) {
        self.analysis_duration_seconds
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    pub fn analyses(&self, level: RiskLevel) -> u64 {
        self.analyses_total.with_label_values(&[level.as_str()]).get()
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_requests_total.with_label_values(&["hit"]).get()
    }

    pub fn failures(&self) -> u64 {
        self.analysis_failures_total.get()
    }

    /// Prometheus text exposition of every metric.
    pub fn gather_text(&self) -> Result<String, RiskError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| RiskError::Telemetry(e.to_string()))
    }
}
