pub mod memory;
pub mod repository;
pub mod snapshot;

pub use memory::{Dataset, InMemoryStore};
pub use repository::{AssessmentFilter, AssessmentOrder, AssessmentStore, TenderRepository};
pub use snapshot::{CategoryScope, MarketSnapshot, MarketView};
