use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use renewal_risk::{parse_batch, report, score_batch, RiskWeights, ScoredBatch};

#[derive(Parser)]
#[command(name = "renewal-risk")]
#[command(about = "Churn risk scoring for subscription customers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a batch of customer records
    Score {
        #[command(flatten)]
        batch: BatchArgs,
        /// Where to write the results; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also export the per-customer intermediate metrics
        #[arg(long)]
        metrics_csv: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        batch: BatchArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Args)]
struct BatchArgs {
    /// JSON array of customer records
    #[arg(long)]
    input: PathBuf,
    /// Score as of this instant (RFC 3339) instead of now
    #[arg(long)]
    as_of: Option<DateTime<Utc>>,
    #[arg(long, default_value_t = 1.0)]
    weight_usage: f64,
    #[arg(long, default_value_t = 1.0)]
    weight_renewal: f64,
    #[arg(long, default_value_t = 1.0)]
    weight_trend: f64,
}

impl BatchArgs {
    fn weights(&self) -> RiskWeights {
        RiskWeights {
            usage: self.weight_usage,
            renewal: self.weight_renewal,
            trend: self.weight_trend,
        }
    }

    fn run(&self) -> anyhow::Result<(ScoredBatch, DateTime<Utc>)> {
        let raw = std::fs::read_to_string(&self.input)
            .with_context(|| format!("failed to read {}", self.input.display()))?;
        let records = parse_batch(&raw).context("failed to parse customer records")?;
        let as_of = self.as_of.unwrap_or_else(Utc::now);
        tracing::info!(records = records.len(), %as_of, "scoring batch");
        Ok((score_batch(&records, as_of, &self.weights()), as_of))
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_env("RUST_LOG")
        .or_else(|_| EnvFilter::try_from_env("LOG_LEVEL"))
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn write_metrics(path: &Path, batch: &ScoredBatch) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    report::write_metrics_csv(file, &batch.metrics)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing("info");
    let cli = Cli::parse();

    let span = tracing::info_span!("batch", batch_id = %Uuid::new_v4());
    let _guard = span.enter();

    match cli.command {
        Commands::Score {
            batch,
            out,
            metrics_csv,
        } => {
            let (scored, _) = batch.run()?;
            let json = serde_json::to_string_pretty(&scored.results)?;

            match out {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    eprintln!("Results written to {}.", path.display());
                }
                None => println!("{json}"),
            }

            if let Some(path) = metrics_csv {
                write_metrics(&path, &scored)?;
                eprintln!("Metrics written to {}.", path.display());
            }
        }
        Commands::Report { batch, out, limit } => {
            let (scored, as_of) = batch.run()?;
            let report = report::build_report(&scored.metrics, as_of, limit);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
