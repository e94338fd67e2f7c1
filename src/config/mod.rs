pub mod manager;
pub mod risk_config;
pub mod settings;
pub mod validator;

pub use manager::ConfigManager;
pub use risk_config::*;
pub use settings::*;
pub use validator::{ConfigValidationReport, ConfigValidator, ValidationError, ValidationRules};
