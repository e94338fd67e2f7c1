use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::models::{Award, Bid, Company, ContractingAuthority, Tender};

/// Which tenders count as "the same category".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryScope<'a> {
    Exact(&'a str),
    Prefix(&'a str),
}

impl CategoryScope<'_> {
    pub fn matches(&self, tender: &Tender) -> bool {
        match self {
            CategoryScope::Exact(code) => tender.category.as_str() == *code,
            CategoryScope::Prefix(prefix) => tender.category.starts_with(prefix),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            CategoryScope::Exact(code) | CategoryScope::Prefix(code) => code,
        }
    }
}

/// Read-only view of historical market data used while scoring.
///
/// Every query is bounded above by [`MarketView::as_of`] and returns results
/// in a stable order, so detectors stay deterministic.
pub trait MarketView: Send + Sync {
    fn as_of(&self) -> DateTime<Utc>;

    fn tender(&self, id: Uuid) -> Option<&Tender>;

    fn authority(&self, id: i64) -> Option<&ContractingAuthority>;

    fn company(&self, id: i64) -> Option<&Company>;

    /// Tenders in `scope` published in `[since, as_of]`.
    fn tenders_in_category(&self, scope: CategoryScope<'_>, since: DateTime<Utc>) -> Vec<&Tender>;

    fn tenders_by_authority(&self, authority_id: i64, since: DateTime<Utc>) -> Vec<&Tender>;

    /// Tenders whose contracting authority sits in `region`.
    fn tenders_in_region(&self, region: &str, since: DateTime<Utc>) -> Vec<&Tender>;

    fn award_for_tender(&self, tender_id: Uuid) -> Option<&Award>;

    fn awards_for_company(&self, company_id: i64, since: DateTime<Utc>) -> Vec<&Award>;

    fn awards_since(&self, since: DateTime<Utc>) -> Vec<&Award>;

    /// Bids submitted by a company in `[since, as_of]`, with their tender.
    fn bids_by_company(&self, company_id: i64, since: DateTime<Utc>) -> Vec<(&Tender, &Bid)>;

    fn bids_since(&self, since: DateTime<Utc>) -> Vec<(&Tender, &Bid)>;

    fn authority_region(&self, authority_id: i64) -> Option<&str> {
        self.authority(authority_id).and_then(|a| a.region())
    }

    fn company_region(&self, company_id: i64) -> Option<&str> {
        self.company(company_id).and_then(|c| c.region())
    }

    /// Region of the authority that ran an awarded tender.
    fn award_region(&self, award: &Award) -> Option<&str> {
        self.tender(award.tender_id)
            .and_then(|t| self.authority_region(t.authority_id))
    }
}

/// Indexed in-memory market snapshot taken at a fixed instant.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    as_of: DateTime<Utc>,
    tenders: Vec<Tender>,
    tender_index: HashMap<Uuid, usize>,
    tenders_by_authority: HashMap<i64, Vec<usize>>,
    awards: Vec<Award>,
    award_by_tender: HashMap<Uuid, usize>,
    awards_by_company: HashMap<i64, Vec<usize>>,
    bids_by_company: HashMap<i64, Vec<(usize, usize)>>,
    companies: HashMap<i64, Company>,
    authorities: HashMap<i64, ContractingAuthority>,
}

impl MarketSnapshot {
    /// Build a snapshot. Tenders and awards after `as_of` are dropped, and an
    /// award is derived from the winning bid of any tender that has none.
    pub fn new(
        as_of: DateTime<Utc>,
        tenders: Vec<Tender>,
        awards: Vec<Award>,
        companies: Vec<Company>,
        authorities: Vec<ContractingAuthority>,
    ) -> Self {
        let mut tenders: Vec<Tender> = tenders
            .into_iter()
            .filter(|t| t.publication_date <= as_of)
            .collect();
        tenders.sort_by(|a, b| {
            a.publication_date
                .cmp(&b.publication_date)
                .then_with(|| a.id.cmp(&b.id))
        });

        let awarded: HashSet<Uuid> = awards.iter().map(|a| a.tender_id).collect();
        let mut awards: Vec<Award> = awards
            .into_iter()
            .chain(
                tenders
                    .iter()
                    .filter(|t| !awarded.contains(&t.id))
                    .filter_map(Award::from_winning_bid),
            )
            .filter(|a| a.award_date <= as_of)
            .collect();
        awards.sort_by(|a, b| {
            a.award_date
                .cmp(&b.award_date)
                .then_with(|| a.tender_id.cmp(&b.tender_id))
                .then_with(|| a.company_id.cmp(&b.company_id))
        });

        let mut tender_index = HashMap::new();
        let mut tenders_by_authority: HashMap<i64, Vec<usize>> = HashMap::new();
        let mut bids_by_company: HashMap<i64, Vec<(usize, usize)>> = HashMap::new();
        for (ti, tender) in tenders.iter().enumerate() {
            tender_index.insert(tender.id, ti);
            tenders_by_authority.entry(tender.authority_id).or_default().push(ti);
            for (bi, bid) in tender.bids.iter().enumerate() {
                if bid.submitted_at <= as_of {
                    bids_by_company.entry(bid.company_id).or_default().push((ti, bi));
                }
            }
        }

        let mut award_by_tender = HashMap::new();
        let mut awards_by_company: HashMap<i64, Vec<usize>> = HashMap::new();
        for (ai, award) in awards.iter().enumerate() {
            award_by_tender.entry(award.tender_id).or_insert(ai);
            awards_by_company.entry(award.company_id).or_default().push(ai);
        }

        Self {
            as_of,
            tenders,
            tender_index,
            tenders_by_authority,
            awards,
            award_by_tender,
            awards_by_company,
            bids_by_company,
            companies: companies.into_iter().map(|c| (c.id, c)).collect(),
            authorities: authorities.into_iter().map(|a| (a.id, a)).collect(),
        }
    }

    pub fn tender_count(&self) -> usize {
        self.tenders.len()
    }

    pub fn award_count(&self) -> usize {
        self.awards.len()
    }

    pub fn tenders(&self) -> &[Tender] {
        &self.tenders
    }
}

impl MarketView for MarketSnapshot {
    fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    fn tender(&self, id: Uuid) -> Option<&Tender> {
        self.tender_index.get(&id).map(|i| &self.tenders[*i])
    }

    fn authority(&self, id: i64) -> Option<&ContractingAuthority> {
        self.authorities.get(&id)
    }

    fn company(&self, id: i64) -> Option<&Company> {
        self.companies.get(&id)
    }

    fn tenders_in_category(&self, scope: CategoryScope<'_>, since: DateTime<Utc>) -> Vec<&Tender> {
        self.tenders
            .iter()
            .filter(|t| t.publication_date >= since && scope.matches(t))
            .collect()
    }

    fn tenders_by_authority(&self, authority_id: i64, since: DateTime<Utc>) -> Vec<&Tender> {
        self.tenders_by_authority
            .get(&authority_id)
            .map(|indices| {
                indices
                    .iter()
                    .map(|i| &self.tenders[*i])
                    .filter(|t| t.publication_date >= since)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn tenders_in_region(&self, region: &str, since: DateTime<Utc>) -> Vec<&Tender> {
        self.tenders
            .iter()
            .filter(|t| t.publication_date >= since)
            .filter(|t| self.authority_region(t.authority_id) == Some(region))
            .collect()
    }

    fn award_for_tender(&self, tender_id: Uuid) -> Option<&Award> {
        self.award_by_tender.get(&tender_id).map(|i| &self.awards[*i])
    }

    fn awards_for_company(&self, company_id: i64, since: DateTime<Utc>) -> Vec<&Award> {
        self.awards_by_company
            .get(&company_id)
            .map(|indices| {
                indices
                    .iter()
                    .map(|i| &self.awards[*i])
                    .filter(|a| a.award_date >= since)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn awards_since(&self, since: DateTime<Utc>) -> Vec<&Award> {
        self.awards.iter().filter(|a| a.award_date >= since).collect()
    }

    fn bids_by_company(&self, company_id: i64, since: DateTime<Utc>) -> Vec<(&Tender, &Bid)> {
        self.bids_by_company
            .get(&company_id)
            .map(|indices| {
                indices
                    .iter()
                    .map(|(ti, bi)| (&self.tenders[*ti], &self.tenders[*ti].bids[*bi]))
                    .filter(|(_, bid)| bid.submitted_at >= since)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn bids_since(&self, since: DateTime<Utc>) -> Vec<(&Tender, &Bid)> {
        self.tenders
            .iter()
            .flat_map(|t| t.bids.iter().map(move |b| (t, b)))
            .filter(|(_, b)| b.submitted_at >= since && b.submitted_at <= self.as_of)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryCode, ProcedureType, TenderStatus};
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn tender(authority_id: i64, category: &str, days_ago: i64, winner: Option<i64>) -> Tender {
        let published = as_of() - Duration::days(days_ago);
        Tender {
            id: Uuid::new_v4(),
            title: "Supplies".to_string(),
            authority_id,
            category: CategoryCode::new(category),
            procedure_type: ProcedureType::Open,
            status: TenderStatus::Awarded,
            estimated_value: Some(Decimal::from(1000)),
            currency: "RON".to_string(),
            publication_date: published,
            submission_deadline: Some(published + Duration::days(1)),
            bids: winner
                .map(|company_id| {
                    vec![Bid {
                        id: Uuid::new_v4(),
                        company_id,
                        amount: Some(Decimal::from(900)),
                        currency: "RON".to_string(),
                        submitted_at: published,
                        is_winner: true,
                    }]
                })
                .unwrap_or_default(),
        }
    }

    fn authority(id: i64, region: &str) -> ContractingAuthority {
        ContractingAuthority {
            id,
            name: format!("Authority {}", id),
            region: Some(region.to_string()),
            locality: None,
        }
    }

    #[test]
    fn test_future_records_excluded() {
        let snapshot = MarketSnapshot::new(
            as_of(),
            vec![tender(1, "30192000-1", 10, Some(5)), tender(1, "30192000-1", -5, Some(5))],
            vec![],
            vec![],
            vec![authority(1, "Cluj")],
        );
        assert_eq!(snapshot.tender_count(), 1);
        assert_eq!(snapshot.award_count(), 1);
    }

    #[test]
    fn test_awards_derived_from_winning_bids() {
        let t = tender(1, "30192000-1", 10, Some(7));
        let id = t.id;
        let snapshot = MarketSnapshot::new(as_of(), vec![t], vec![], vec![], vec![]);
        let award = snapshot.award_for_tender(id).unwrap();
        assert_eq!(award.company_id, 7);
        assert_eq!(snapshot.awards_for_company(7, as_of() - Duration::days(30)).len(), 1);
    }

    #[test]
    fn test_category_and_region_queries() {
        let snapshot = MarketSnapshot::new(
            as_of(),
            vec![
                tender(1, "30192000-1", 10, Some(5)),
                tender(2, "30192100-2", 20, Some(6)),
                tender(2, "45000000-7", 400, Some(6)),
            ],
            vec![],
            vec![],
            vec![authority(1, "Cluj"), authority(2, "Iasi")],
        );
        let since = as_of() - Duration::days(365);
        assert_eq!(
            snapshot.tenders_in_category(CategoryScope::Exact("30192000-1"), since).len(),
            1
        );
        assert_eq!(
            snapshot.tenders_in_category(CategoryScope::Prefix("3019"), since).len(),
            2
        );
        assert_eq!(snapshot.tenders_in_region("Iasi", since).len(), 1);
        assert_eq!(snapshot.bids_by_company(6, since).len(), 1);
    }
}
