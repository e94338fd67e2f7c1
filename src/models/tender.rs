use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::RiskError;

/// Hierarchical procurement classification code (e.g. `45233140-2`).
///
/// Parents are obtained by truncating to a prefix; the check digit suffix is
/// never part of a parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryCode(String);

impl CategoryCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Prefix of `len` characters, or `None` when the code is not longer than that.
    pub fn parent(&self, len: usize) -> Option<&str> {
        if self.0.len() > len && self.0.is_char_boundary(len) {
            Some(&self.0[..len])
        } else {
            None
        }
    }

    /// Division (or whatever level `len` selects) this code belongs to; codes
    /// shorter than `len` are their own division.
    pub fn division(&self, len: usize) -> &str {
        self.parent(len).unwrap_or(&self.0)
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for CategoryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryCode {
    fn from(code: &str) -> Self {
        CategoryCode::new(code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureType {
    Open,
    Restricted,
    Negotiated,
    CompetitiveDialogue,
    DirectAward,
    Other,
}

impl ProcedureType {
    /// Procedures where any interested economic operator may bid.
    pub fn is_competitive(&self) -> bool {
        matches!(self, ProcedureType::Open | ProcedureType::Restricted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderStatus {
    Planned,
    Active,
    Closed,
    Awarded,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: Uuid,
    pub company_id: i64,
    pub amount: Option<Decimal>,
    pub currency: String,
    pub submitted_at: DateTime<Utc>,
    pub is_winner: bool,
}

impl Bid {
    pub fn amount_f64(&self) -> Option<f64> {
        self.amount.and_then(|a| a.to_f64())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tender {
    pub id: Uuid,
    pub title: String,
    pub authority_id: i64,
    pub category: CategoryCode,
    pub procedure_type: ProcedureType,
    pub status: TenderStatus,
    pub estimated_value: Option<Decimal>,
    pub currency: String,
    pub publication_date: DateTime<Utc>,
    pub submission_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bids: Vec<Bid>,
}

impl Tender {
    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }

    pub fn is_single_bidder(&self) -> bool {
        self.bids.len() == 1
    }

    pub fn winning_bid(&self) -> Option<&Bid> {
        self.bids.iter().find(|b| b.is_winner)
    }

    pub fn winner_id(&self) -> Option<i64> {
        self.winning_bid().map(|b| b.company_id)
    }

    /// Positive estimated value as `f64`; zero and negative values count as missing.
    pub fn estimated_value_f64(&self) -> Option<f64> {
        self.estimated_value
            .and_then(|v| v.to_f64())
            .filter(|v| v.is_finite() && *v > 0.0)
    }

    /// Positive bid amounts in submission order.
    pub fn bid_amounts(&self) -> Vec<f64> {
        self.bids
            .iter()
            .filter_map(|b| b.amount_f64())
            .filter(|a| a.is_finite() && *a > 0.0)
            .collect()
    }

    /// Relative spread of the bids in percent, `(max - min) / min * 100`.
    pub fn bid_spread_pct(&self) -> Option<f64> {
        let amounts = self.bid_amounts();
        if amounts.len() < 2 {
            return None;
        }
        let min = amounts.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = amounts.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Some((max - min) / min * 100.0)
    }

    /// Checks the structural invariants the engine relies on.
    pub fn validate(&self) -> Result<(), RiskError> {
        let winners = self.bids.iter().filter(|b| b.is_winner).count();
        if winners > 1 {
            return Err(RiskError::invalid_tender(
                self.id,
                format!("{} winning bids, at most one allowed", winners),
            ));
        }
        if self.category.is_empty() {
            return Err(RiskError::invalid_tender(self.id, "missing category code"));
        }
        if let Some(value) = self.estimated_value {
            if value.is_sign_negative() {
                return Err(RiskError::invalid_tender(self.id, "negative estimated value"));
            }
        }
        Ok(())
    }
}

/// Realized contract following a tender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Award {
    pub id: Uuid,
    pub tender_id: Uuid,
    pub company_id: i64,
    pub amount: Option<Decimal>,
    pub award_date: DateTime<Utc>,
}

impl Award {
    /// Award implied by a tender's winning bid.
    pub fn from_winning_bid(tender: &Tender) -> Option<Self> {
        let bid = tender.winning_bid()?;
        Some(Self {
            id: Uuid::new_v4(),
            tender_id: tender.id,
            company_id: bid.company_id,
            amount: bid.amount,
            award_date: tender.submission_deadline.unwrap_or(tender.publication_date),
        })
    }

    pub fn amount_f64(&self) -> f64 {
        self.amount.and_then(|a| a.to_f64()).unwrap_or(0.0)
    }
}
