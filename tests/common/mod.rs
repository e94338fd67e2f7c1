#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use tender_risk_engine::config::{ConfigManager, RiskConfig, Settings};
use tender_risk_engine::database::InMemoryStore;
use tender_risk_engine::models::{
    Bid, CategoryCode, Company, ContractingAuthority, ProcedureType, Tender, TenderStatus,
};
use tender_risk_engine::utils::FixedClock;
use tender_risk_engine::RiskAnalyzer;

pub const CATEGORY: &str = "45233140-2";
pub const OTHER_CATEGORY: &str = "79340000-9";

/// Authority with a long run of single-bidder tenders won by company 1.
pub const CAPTURED_AUTHORITY: i64 = 1;
/// Authority without a known region.
pub const UNLOCATED_AUTHORITY: i64 = 2;

pub fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap().round_dp(2)
}

/// Tender published `days_ago` days before [`as_of`]; bids are
/// `(company_id, amount, is_winner)`.
pub fn tender(
    authority_id: i64,
    category: &str,
    days_ago: i64,
    estimated_value: Option<f64>,
    bids: &[(i64, f64, bool)],
) -> Tender {
    let published = as_of() - Duration::days(days_ago);
    Tender {
        id: Uuid::new_v4(),
        title: format!("Works in {} for authority {}", category, authority_id),
        authority_id,
        category: CategoryCode::new(category),
        procedure_type: ProcedureType::Open,
        status: TenderStatus::Awarded,
        estimated_value: estimated_value.map(decimal),
        currency: "RON".to_string(),
        publication_date: published,
        submission_deadline: Some(published),
        bids: bids
            .iter()
            .map(|(company_id, amount, is_winner)| Bid {
                id: Uuid::new_v4(),
                company_id: *company_id,
                amount: Some(decimal(*amount)),
                currency: "RON".to_string(),
                submitted_at: published,
                is_winner: *is_winner,
            })
            .collect(),
    }
}

/// Single bid from the incumbent at the captured authority.
pub fn captured_tender(days_ago: i64) -> Tender {
    tender(
        CAPTURED_AUTHORITY,
        CATEGORY,
        days_ago,
        Some(2_000_000.0),
        &[(1, 1_990_000.0, true)],
    )
}

/// Four evenly spread bids at an authority with no history or region.
pub fn competitive_tender(days_ago: i64) -> Tender {
    tender(
        UNLOCATED_AUTHORITY,
        OTHER_CATEGORY,
        days_ago,
        Some(120_000.0),
        &[
            (5, 100_000.0, true),
            (6, 105_000.0, false),
            (7, 110_000.0, false),
            (8, 115_000.0, false),
        ],
    )
}

/// Store holding reference entities and ten historical captured tenders.
pub async fn seeded_store() -> Arc<InMemoryStore> {
    let store = InMemoryStore::new();
    store
        .insert_authority(ContractingAuthority {
            id: CAPTURED_AUTHORITY,
            name: "Primaria Iasi".to_string(),
            region: Some("Iasi".to_string()),
            locality: Some("Iasi".to_string()),
        })
        .await;
    store
        .insert_authority(ContractingAuthority {
            id: UNLOCATED_AUTHORITY,
            name: "Agentia Nationala".to_string(),
            region: None,
            locality: None,
        })
        .await;
    for id in 1..=8 {
        store
            .insert_company(Company {
                id,
                name: format!("Company {}", id),
                region: Some(if id == 1 { "Iasi" } else { "Cluj" }.to_string()),
                locality: None,
            })
            .await;
    }
    for i in 0..10 {
        store.insert_tender(captured_tender(20 + i * 9)).await.unwrap();
    }
    Arc::new(store)
}

pub fn analyzer_with(store: Arc<InMemoryStore>, settings: &Settings) -> (RiskAnalyzer, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(as_of()));
    let config = ConfigManager::new(RiskConfig::default()).unwrap();
    let analyzer = RiskAnalyzer::new(store.clone(), store, config, settings)
        .unwrap()
        .with_clock(clock.clone());
    (analyzer, clock)
}

pub fn analyzer(store: Arc<InMemoryStore>) -> (RiskAnalyzer, Arc<FixedClock>) {
    analyzer_with(store, &Settings::default())
}
