//! Builders for detector unit tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::database::MarketSnapshot;
use crate::models::{
    Award, Bid, CategoryCode, Company, ContractingAuthority, ProcedureType, Tender, TenderStatus,
};

pub(crate) fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub(crate) fn decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap().round_dp(2)
}

/// Tender published `days_ago` days before [`as_of`]; bids are
/// `(company_id, amount, is_winner)`.
pub(crate) fn tender(
    authority_id: i64,
    category: &str,
    days_ago: i64,
    estimated_value: Option<f64>,
    bids: &[(i64, f64, bool)],
) -> Tender {
    let published = as_of() - Duration::days(days_ago);
    Tender {
        id: Uuid::new_v4(),
        title: format!("Tender in {}", category),
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

#[derive(Default)]
pub(crate) struct MarketBuilder {
    tenders: Vec<Tender>,
    awards: Vec<Award>,
    companies: Vec<Company>,
    authorities: Vec<ContractingAuthority>,
}

impl MarketBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn authority(mut self, id: i64, region: Option<&str>) -> Self {
        self.authorities.push(ContractingAuthority {
            id,
            name: format!("Authority {}", id),
            region: region.map(str::to_string),
            locality: None,
        });
        self
    }

    pub(crate) fn company(mut self, id: i64, region: Option<&str>) -> Self {
        self.companies.push(Company {
            id,
            name: format!("Company {}", id),
            region: region.map(str::to_string),
            locality: None,
        });
        self
    }

    pub(crate) fn add(&mut self, tender: Tender) {
        self.tenders.push(tender);
    }

    pub(crate) fn add_award(&mut self, award: Award) {
        self.awards.push(award);
    }

    pub(crate) fn build(&self) -> MarketSnapshot {
        MarketSnapshot::new(
            as_of(),
            self.tenders.clone(),
            self.awards.clone(),
            self.companies.clone(),
            self.authorities.clone(),
        )
    }
}
