use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingSettings};
use crate::error::RiskError;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Calling this twice is
/// an error, so binaries call it once at startup and tests never do.
pub fn init(settings: &LoggingSettings) -> Result<(), RiskError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tender_risk_engine={}", settings.level)));

    let installed = match settings.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .pretty()
            .try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .compact()
            .try_init(),
    };
    installed.map_err(|e| RiskError::Telemetry(e.to_string()))?;

    info!("Logging initialized with level: {}", settings.level);
    Ok(())
}
