use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod columns;
mod config;
mod error;
mod models;
mod normalize;
mod pipeline;
mod report;
mod resolve;
mod spreadsheet;
mod stats;
mod store;
mod students;

use columns::{ColumnClassifier, ColumnMapping, ModelClassifier, RuleClassifier};
use config::Config;
use models::UploadRequest;
use spreadsheet::SheetData;

#[derive(Parser)]
#[command(name = "placement-round-tracker")]
#[command(about = "Placement drive round ingestion and reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a handful of sample students
    Seed,
    /// Import one round of a placement drive from a CSV export
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        company: String,
        #[arg(long)]
        year: i32,
        /// Round number; computed from the drive's current round if omitted
        #[arg(long)]
        round: Option<i32>,
        #[arg(long)]
        round_name: Option<String>,
        /// Treat this upload as the drive's final (offer) round
        #[arg(long, default_value_t = false)]
        final_round: bool,
        /// Classify identifier columns with the configured model instead of header rules
        #[arg(long, default_value_t = false)]
        model_classifier: bool,
    },
    /// Render a markdown report for one placement year
    YearReport {
        #[arg(long)]
        year: i32,
        #[arg(long, default_value = "year-report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            store::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            store::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import {
            csv,
            company,
            year,
            round,
            round_name,
            final_round,
            model_classifier,
        } => {
            let sheet = spreadsheet::read_csv(&csv)?;
            debug!(
                threshold = config.name_similarity_threshold,
                "name matching is exact; similarity threshold reserved for fuzzy extension"
            );

            let mapping = classify_columns(&config, &sheet, model_classifier).await?;
            let missing_fields = mapping.missing_fields();
            if !missing_fields.is_empty() {
                warn!(missing = ?missing_fields, "classifier could not map all identifier fields");
            }

            let rows = spreadsheet::extract_rows(&sheet, &mapping);
            if rows.is_empty() {
                anyhow::bail!("no usable student rows in {}", csv.display());
            }

            let request = UploadRequest {
                company_name: company,
                year,
                round_number: round,
                round_name,
                is_final: final_round,
                rows,
                raw_columns: sheet.columns.clone(),
                missing_fields,
            };
            let summary = pipeline::process_round_upload(&pool, &config, request).await?;

            println!(
                "Round {} uploaded for {} ({} students).",
                summary.round_id, summary.drive_key, summary.total_students
            );
            println!(
                "- matched: {}, new: {}, placed: {}",
                summary.matched_students, summary.new_students, summary.placed_students
            );
            if !summary.missing_fields.is_empty() {
                println!("- unmapped fields: {}", summary.missing_fields.join(", "));
            }
        }
        Commands::YearReport { year, out } => {
            let Some(doc) = store::get_year(&pool, year).await? else {
                println!("No analytics recorded for {year}.");
                return Ok(());
            };
            let report = report::build_year_report(&doc);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn classify_columns(
    config: &Config,
    sheet: &SheetData,
    use_model: bool,
) -> anyhow::Result<ColumnMapping> {
    let samples = sheet.sample_rows(2);
    let mapping = if use_model {
        match config.classifier_api_key.as_deref() {
            Some(api_key) => {
                ModelClassifier::new(api_key, &config.classifier_model, &config.classifier_endpoint)
                    .classify(&sheet.columns, samples)
                    .await?
            }
            None => {
                warn!("CLASSIFIER_API_KEY not set, using header rules");
                RuleClassifier.classify(&sheet.columns, samples).await?
            }
        }
    } else {
        RuleClassifier.classify(&sheet.columns, samples).await?
    };
    Ok(mapping)
}
