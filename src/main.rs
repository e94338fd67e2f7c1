mod cli;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Duration;
use clap::Parser;
use tender_risk_engine::{
    config::{ConfigManager, Settings},
    database::{Dataset, InMemoryStore},
    models::RiskAssessment,
    services::RiskAnalyzer,
    utils::{logging, FixedClock},
    RiskError,
};
use tracing::info;

use cli::{Cli, Command};

/// Window wide enough to cover every tender in a dataset.
const ALL_TENDERS_DAYS: i64 = 36_500;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => Settings::from_file(path)?,
        None => Settings::new()?,
    };
    logging::init(&settings.logging)?;
    info!("Starting tender risk engine");

    match cli.command {
        Command::Analyze { ref dataset, tender, summary } => {
            let analyzer = build_analyzer(&cli, &settings, dataset).await?;
            let assessments = match tender {
                Some(id) => vec![analyzer.analyze_by_id(id, true).await?],
                None => {
                    let outcome = analyzer.analyze_recent(Duration::days(ALL_TENDERS_DAYS)).await?;
                    for failure in &outcome.failures {
                        eprintln!("failed to analyze {}: {}", failure.tender_id, failure.error);
                    }
                    outcome.assessments
                }
            };
            if summary {
                print_json(&summaries(&assessments))?;
            } else {
                print_json(&assessments)?;
            }
        }
        Command::Stats { ref dataset, days } => {
            let analyzer = build_analyzer(&cli, &settings, dataset).await?;
            let window = Duration::days(days.unwrap_or(settings.batch.recent_window_days));
            analyzer.analyze_recent(window).await?;
            print_json(&analyzer.get_statistics(window).await?)?;
        }
        Command::HighRisk { ref dataset, limit } => {
            let analyzer = build_analyzer(&cli, &settings, dataset).await?;
            analyzer.analyze_recent(Duration::days(ALL_TENDERS_DAYS)).await?;
            let limit = limit.unwrap_or(settings.batch.high_risk_limit);
            print_json(&summaries(&analyzer.get_high_risk(limit).await?))?;
        }
        Command::Config { ref overrides } => {
            let manager = ConfigManager::new(settings.risk_config()?)?;
            if !overrides.is_empty() {
                let partial: BTreeMap<String, f64> = overrides.iter().cloned().collect();
                manager.update(&partial).await?;
            }
            print_json(&serde_json::json!({
                "version": manager.version().await,
                "parameters": manager.parameters().await,
                "validation": manager.validate().await,
            }))?;
        }
    }

    Ok(())
}

async fn build_analyzer(cli: &Cli, settings: &Settings, dataset: &Path) -> Result<RiskAnalyzer, RiskError> {
    let store = Arc::new(InMemoryStore::from_dataset(Dataset::from_json_file(dataset)?).await?);
    let config = ConfigManager::new(settings.risk_config()?)?;
    let analyzer = RiskAnalyzer::new(store.clone(), store, config, settings)?;
    Ok(match cli.as_of {
        Some(as_of) => analyzer.with_clock(Arc::new(FixedClock::new(as_of))),
        None => analyzer,
    })
}

fn summaries(assessments: &[RiskAssessment]) -> Vec<serde_json::Value> {
    assessments
        .iter()
        .map(|a| {
            serde_json::json!({
                "tender_id": a.tender_id,
                "score": a.score,
                "level": a.level,
                "confidence": a.confidence,
                "flags": a.flags,
            })
        })
        .collect()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), RiskError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
