use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, error, trace};

use oulad_analytics::config::PipelineConfig;
use oulad_analytics::Pipeline;

/// Ingest OULAD data and compute prediction analytics
#[derive(Parser)]
#[command(name = "oulad")]
#[command(about = "OULAD learning analytics - batch ingestion and prediction reports", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a TOML configuration file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the seven OULAD CSV files into the store
    Load {
        /// Directory holding the CSV files (default: configured data_dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// List CSV files under the data directory
    Files {
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Estimated document counts, all or nothing
    Count {
        #[arg(required = true)]
        collections: Vec<String>,
    },
    /// Print every document of a collection
    Dump { collection: String },
    /// Produce and store predictions
    Predict {
        #[command(subcommand)]
        source: PredictSource,
    },
    /// Analytics over stored assessment predictions
    Report {
        #[command(subcommand)]
        report: ReportKind,
    },
}

#[derive(Subcommand)]
enum PredictSource {
    /// From studentAssessment scores
    Assessments,
    /// From studentVle click counts
    Vle,
}

#[derive(Subcommand)]
enum ReportKind {
    /// Predicted scores per fixed range
    Distribution,
    /// Mean predicted score per assessment type
    Averages,
    /// Distinct students per assessment
    StudentCounts,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace,tokio=debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("oulad started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let pipeline = Pipeline::from_config(config)
        .await
        .context("Failed to open document store")?;

    match cli.command {
        Commands::Load { data_dir } => {
            let report = pipeline.load_directory(data_dir.as_deref()).await?;
            print_json(&report)
        }
        Commands::Files { data_dir } => {
            let files = pipeline
                .list_data_files(data_dir.as_deref())
                .context("Failed to list data files")?;
            print_json(&files)
        }
        Commands::Count { collections } => {
            let counts = pipeline.count_all(collections).await?;
            print_json(&counts)
        }
        Commands::Dump { collection } => {
            let docs = pipeline
                .fetch_collection(&collection)
                .await
                .with_context(|| format!("Failed to fetch '{}'", collection))?;
            print_json(&docs)
        }
        Commands::Predict { source } => {
            let predictions = match source {
                PredictSource::Assessments => pipeline.process_assessment_predictions().await?,
                PredictSource::Vle => pipeline.process_vle_predictions().await?,
            };
            print_json(&predictions)
        }
        Commands::Report { report } => match report {
            ReportKind::Distribution => print_json(&pipeline.score_distribution().await?),
            ReportKind::Averages => print_json(&pipeline.average_by_assessment_type().await?),
            ReportKind::StudentCounts => print_json(&pipeline.student_count_by_assessment().await?),
        },
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
