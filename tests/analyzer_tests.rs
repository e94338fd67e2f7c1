mod common;

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;

use chrono::Duration;
use uuid::Uuid;

use common::*;
use tender_risk_engine::config::Settings;
use tender_risk_engine::database::{AssessmentStore, TenderRepository};
use tender_risk_engine::models::{RiskFlag, RiskLevel, RISK_DETECTION_ALERT};
use tender_risk_engine::RiskError;

#[tokio::test]
async fn test_reanalyze_leaves_single_newer_assessment() {
    let store = seeded_store().await;
    let target = captured_tender(1);
    store.insert_tender(target.clone()).await.unwrap();
    let (analyzer, clock) = analyzer(store.clone());

    let first = analyzer.analyze(&target, false).await.unwrap();
    clock.advance(Duration::minutes(5));
    let second = analyzer.reanalyze(target.id).await.unwrap();

    let stored = store.assessments_for_tender(target.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, second.id);
    assert_ne!(first.id, second.id);
    assert!(second.analyzed_at > first.analyzed_at);
    assert_eq!(first.score, second.score);
    assert_eq!(first.flags, second.flags);
}

#[tokio::test]
async fn test_reanalyze_unknown_tender_is_not_found() {
    let store = seeded_store().await;
    let (analyzer, _) = analyzer(store);
    let missing = Uuid::new_v4();

    let err = analyzer.reanalyze(missing).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, RiskError::NotFound { tender_id } if tender_id == missing));
}

#[tokio::test]
async fn test_captured_tender_scores_high() {
    let store = seeded_store().await;
    let (analyzer, _) = analyzer(store);
    let assessment = analyzer.analyze(&captured_tender(1), false).await.unwrap();

    assert_eq!(assessment.level, RiskLevel::High);
    assert!(assessment.score >= 70.0 && assessment.score <= 100.0);
    assert!(assessment.has_flag(RiskFlag::SingleBidder));
    assert!(assessment.has_flag(RiskFlag::ChronicSingleBidderAuthority));
    assert!(assessment.has_flag(RiskFlag::DominantMarketPosition));
    assert!(assessment.has_flag(RiskFlag::LocalMarketDominance));
    assert_eq!(assessment.flags[0], RiskFlag::SingleBidder);
    assert_eq!(assessment.detail.detectors.len(), 4);
    assert!(!assessment.detail.composite.amplification.is_empty());
}

#[tokio::test]
async fn test_cached_result_served_until_forced() {
    let store = seeded_store().await;
    let (analyzer, _) = analyzer(store);
    let target = competitive_tender(3);

    let first = analyzer.analyze(&target, false).await.unwrap();
    let cached = analyzer.analyze(&target, false).await.unwrap();
    assert_eq!(first.id, cached.id);
    assert_eq!(analyzer.metrics().cache_hits(), 1);

    let forced = analyzer.analyze(&target, true).await.unwrap();
    assert_ne!(forced.id, first.id);
    assert_eq!(forced.level, RiskLevel::Minimal);
}

#[tokio::test]
async fn test_configuration_update_invalidates_cache() {
    let store = seeded_store().await;
    let (analyzer, _) = analyzer(store);
    let target = competitive_tender(3);

    let before = analyzer.analyze(&target, false).await.unwrap();
    assert_eq!(before.config_version, 1);

    let mut partial = BTreeMap::new();
    partial.insert("high_risk_threshold".to_string(), 75.0);
    analyzer.update_configuration(&partial).await.unwrap();

    let after = analyzer.analyze(&target, false).await.unwrap();
    assert_ne!(after.id, before.id);
    assert_eq!(after.config_version, 2);
    assert_eq!(analyzer.config().get("high_risk_threshold").await, Some(75.0));
}

#[tokio::test]
async fn test_invalid_configuration_update_is_rejected_whole() {
    let store = seeded_store().await;
    let (analyzer, _) = analyzer(store);

    let mut partial = BTreeMap::new();
    partial.insert("single_bidder_weight".to_string(), 0.4);
    partial.insert("high_risk_threshold".to_string(), 30.0);
    let err = analyzer.update_configuration(&partial).await.unwrap_err();

    match err {
        RiskError::InvalidConfiguration { issues } => assert!(!issues.is_empty()),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(analyzer.config().version().await, 1);
    assert_eq!(analyzer.config().get("high_risk_threshold").await, Some(70.0));
    assert!((analyzer.config().get("single_bidder_weight").await.unwrap() - 0.25).abs() < 1e-9);
    assert!(analyzer.validate_configuration().await.valid);
}

#[tokio::test]
async fn test_alert_raised_once_per_tender() {
    let store = seeded_store().await;
    let target = captured_tender(1);
    store.insert_tender(target.clone()).await.unwrap();
    let (analyzer, _) = analyzer(store.clone());

    analyzer.analyze(&target, false).await.unwrap();
    analyzer.reanalyze(target.id).await.unwrap();

    let alerts = store.alerts_for_tender(target.id).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, RISK_DETECTION_ALERT);
    assert!(alerts[0].is_pending());

    let quiet = competitive_tender(2);
    analyzer.analyze(&quiet, false).await.unwrap();
    assert!(store.find_alert(quiet.id, RISK_DETECTION_ALERT).await.unwrap().is_none());
}

#[tokio::test]
async fn test_batch_collects_failures_without_aborting() {
    let store = seeded_store().await;
    let settings = Settings {
        batch: tender_risk_engine::config::BatchSettings {
            chunk_size: 1,
            ..Default::default()
        },
        ..Default::default()
    };
    let (analyzer, _) = analyzer_with(store.clone(), &settings);

    let broken = tender(
        CAPTURED_AUTHORITY,
        CATEGORY,
        2,
        Some(10_000.0),
        &[(1, 9_000.0, true), (2, 9_500.0, true)],
    );
    let tenders = vec![captured_tender(1), broken.clone(), competitive_tender(2)];
    let outcome = analyzer.analyze_batch(&tenders).await.unwrap();

    assert!(!outcome.cancelled);
    assert_eq!(outcome.assessments.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].tender_id, broken.id);
    assert_eq!(outcome.assessments[0].tender_id, tenders[0].id);
    assert_eq!(outcome.assessments[1].tender_id, tenders[2].id);
    assert_eq!(store.assessment_count().await, 2);
}

#[tokio::test]
async fn test_cancelled_batch_stops_before_next_tender() {
    let store = seeded_store().await;
    let (analyzer, _) = analyzer(store.clone());
    let cancel = AtomicBool::new(true);

    let tenders = vec![captured_tender(1), competitive_tender(2)];
    let outcome = analyzer.analyze_batch_cancellable(&tenders, &cancel).await.unwrap();

    assert!(outcome.cancelled);
    assert!(outcome.assessments.is_empty());
    assert_eq!(store.assessment_count().await, 0);
}

#[tokio::test]
async fn test_batch_matches_single_analysis() {
    let store = seeded_store().await;
    let (analyzer, _) = analyzer(store);
    let tenders = vec![captured_tender(1), competitive_tender(2)];

    let outcome = analyzer.analyze_batch(&tenders).await.unwrap();
    for (tender, batched) in tenders.iter().zip(&outcome.assessments) {
        let single = analyzer.analyze(tender, true).await.unwrap();
        assert_eq!(single.score, batched.score);
        assert_eq!(single.level, batched.level);
        assert_eq!(single.flags, batched.flags);
        assert_eq!(single.confidence, batched.confidence);
    }
}

#[tokio::test]
async fn test_analyze_recent_uses_publication_window() {
    let store = seeded_store().await;
    store.insert_tender(captured_tender(1)).await.unwrap();
    let (analyzer, _) = analyzer(store.clone());

    let expected = store
        .tenders_published_between(as_of() - Duration::days(30), as_of())
        .await
        .unwrap()
        .len();
    let outcome = analyzer.analyze_recent(Duration::days(30)).await.unwrap();

    // History at 20 and 29 days plus the fresh tender.
    assert_eq!(expected, 3);
    assert_eq!(outcome.assessments.len(), 3);
    assert!(outcome.failures.is_empty());
}

#[tokio::test]
async fn test_statistics_and_high_risk_listing() {
    let store = seeded_store().await;
    let (analyzer, _) = analyzer(store);
    let tenders = vec![captured_tender(1), competitive_tender(2), competitive_tender(3)];
    analyzer.analyze_batch(&tenders).await.unwrap();

    let stats = analyzer.get_statistics(Duration::days(30)).await.unwrap();
    assert_eq!(stats.total_analyzed, 3);
    assert_eq!(stats.level_counts[&RiskLevel::High], 1);
    assert_eq!(stats.level_counts[&RiskLevel::Minimal], 2);
    assert!((stats.high_risk_rate - 100.0 / 3.0).abs() < 1e-9);
    let total_pct: f64 = stats.level_percentages.values().sum();
    assert!((total_pct - 100.0).abs() < 1e-9);
    assert_eq!(stats.top_flags[0].flag, RiskFlag::InsufficientComparableData);
    assert_eq!(stats.top_flags[0].count, 2);
    assert!(stats.top_flags.len() <= 10);

    let high = analyzer.get_high_risk(10).await.unwrap();
    assert_eq!(high.len(), 1);
    assert_eq!(high[0].tender_id, tenders[0].id);
    assert!(high.windows(2).all(|w| w[0].score >= w[1].score));

    let performance = analyzer.algorithm_performance(Duration::days(30)).await.unwrap();
    assert_eq!(performance.len(), 4);
    assert!(performance.values().all(|p| p.total_analyses == 3));
}

#[tokio::test]
async fn test_system_info_reports_versions() {
    let store = seeded_store().await;
    let (analyzer, _) = analyzer(store);
    let info = analyzer.system_info().await;

    assert_eq!(info["algorithm_version"], tender_risk_engine::risk::ALGORITHM_VERSION);
    assert_eq!(info["composite_scorer"]["detectors"].as_array().unwrap().len(), 4);
    assert_eq!(info["configuration"]["high_risk_threshold"], 70.0);
}
