use serde::{Deserialize, Serialize};

/// Public body running tenders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractingAuthority {
    pub id: i64,
    pub name: String,
    pub region: Option<String>,
    pub locality: Option<String>,
}

impl ContractingAuthority {
    pub fn region(&self) -> Option<&str> {
        normalized(&self.region)
    }
}

/// Economic operator submitting bids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub region: Option<String>,
    pub locality: Option<String>,
}

impl Company {
    pub fn region(&self) -> Option<&str> {
        normalized(&self.region)
    }
}

fn normalized(region: &Option<String>) -> Option<&str> {
    region.as_deref().map(str::trim).filter(|r| !r.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_region_is_unknown() {
        let authority = ContractingAuthority {
            id: 1,
            name: "City Hall".to_string(),
            region: Some("  ".to_string()),
            locality: None,
        };
        assert_eq!(authority.region(), None);

        let company = Company {
            id: 2,
            name: "Build SRL".to_string(),
            region: Some(" Cluj ".to_string()),
            locality: None,
        };
        assert_eq!(company.region(), Some("Cluj"));
    }
}
