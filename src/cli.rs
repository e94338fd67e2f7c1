use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "tender-risk",
    about = "Score public procurement tenders for corruption risk",
    version
)]
pub struct Cli {
    /// Settings file [default: ./config/tender-risk.{toml,yaml,json}]
    #[arg(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Evaluate as if the current time were this RFC 3339 instant
    #[arg(long, global = true, value_name = "TIMESTAMP")]
    pub as_of: Option<DateTime<Utc>>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze one tender, or every tender in the dataset
    Analyze {
        /// JSON dataset with authorities, companies, tenders and awards
        #[arg(long, value_name = "FILE")]
        dataset: PathBuf,

        /// Only analyze this tender
        #[arg(long, value_name = "UUID")]
        tender: Option<Uuid>,

        /// Print only the composite score, level and flags
        #[arg(short, long)]
        summary: bool,
    },
    /// Analyze recently published tenders and print aggregate statistics
    Stats {
        #[arg(long, value_name = "FILE")]
        dataset: PathBuf,

        /// Window in days [default: batch.recent_window_days]
        #[arg(long)]
        days: Option<i64>,
    },
    /// Analyze the dataset and list the highest risk tenders
    HighRisk {
        #[arg(long, value_name = "FILE")]
        dataset: PathBuf,

        /// Maximum tenders to list [default: batch.high_risk_limit]
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print the effective engine configuration and its validation report
    Config {
        /// Override a parameter, e.g. --set high_risk_threshold=75 (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_override)]
        overrides: Vec<(String, f64)>,
    },
}

fn parse_override(raw: &str) -> Result<(String, f64), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", raw))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for {}: {}", key, e))?;
    Ok((key.trim().to_string(), value))
}
