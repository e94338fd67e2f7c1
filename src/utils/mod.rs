pub mod caching;
pub mod logging;
pub mod math;
pub mod monitoring;
pub mod time;

pub use caching::AssessmentCache;
pub use monitoring::EngineMetrics;
pub use time::{Clock, FixedClock, SystemClock};
