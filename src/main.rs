use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use transcript_evaluator::config::{EvaluatorConfig, LogFormat};
use transcript_evaluator::db::{self, PgStore};
use transcript_evaluator::ingest;
use transcript_evaluator::memory::MemoryStore;
use transcript_evaluator::models::NewTranscript;
use transcript_evaluator::reference;
use transcript_evaluator::report::{render_markdown, ReportDocument};
use transcript_evaluator::store::TranscriptStore;
use transcript_evaluator::TranscriptEvaluator;

#[derive(Parser)]
#[command(name = "transcript-evaluator")]
#[command(about = "NCAA credit-equivalency evaluator for international transcripts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TranscriptArgs {
    #[arg(long)]
    student_id: Uuid,
    #[arg(long)]
    country: String,
    #[arg(long)]
    system: String,
    #[arg(long, default_value = "en")]
    language: String,
    #[arg(long)]
    school_name: Option<String>,
    #[arg(long)]
    school_city: Option<String>,
    /// Course rows: year,term,subject,level,local_grade,hours_per_week,weeks_per_year,completed
    #[arg(long)]
    csv: PathBuf,
}

impl TranscriptArgs {
    fn into_new_transcript(self) -> anyhow::Result<NewTranscript> {
        let courses = ingest::read_courses_csv(&self.csv)
            .with_context(|| format!("failed to read courses from {}", self.csv.display()))?;
        Ok(NewTranscript {
            student_id: self.student_id,
            country_id: self.country,
            system_id: self.system,
            school_name: self.school_name,
            school_city: self.school_city,
            language: self.language,
            courses,
        })
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
    Markdown,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load reference tables for the seeded education systems
    Seed,
    /// Store a transcript and its courses from a CSV file
    Ingest(TranscriptArgs),
    /// Match courses to NCAA categories and normalize grades
    Suggest {
        #[arg(long)]
        transcript_id: Uuid,
    },
    /// Evaluate Division I/II eligibility
    Evaluate {
        #[arg(long)]
        transcript_id: Uuid,
    },
    /// Render an evaluation report
    Report {
        #[arg(long)]
        evaluation_id: Uuid,
        #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List past evaluations of a transcript
    History {
        #[arg(long)]
        transcript_id: Uuid,
    },
    /// Run every stage for one transcript
    Run {
        #[command(flatten)]
        transcript: TranscriptArgs,
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Use seeded reference data in memory instead of Postgres
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "transcript_evaluator=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn postgres_store(config: &EvaluatorConfig) -> anyhow::Result<PgStore> {
    let pool = db::connect(config.require_database_url()?, config.max_connections)
        .await
        .context("failed to connect to Postgres")?;
    Ok(PgStore::new(pool))
}

async fn postgres_evaluator(config: &EvaluatorConfig) -> anyhow::Result<TranscriptEvaluator> {
    let store = Arc::new(postgres_store(config).await?);
    Ok(TranscriptEvaluator::new(store, &config.cache))
}

fn met(eligible: bool) -> &'static str {
    if eligible {
        "met"
    } else {
        "not met"
    }
}

async fn seeded_memory_store() -> MemoryStore {
    let store = MemoryStore::new();
    for system_id in reference::SEEDED_SYSTEMS {
        store
            .load_reference(reference::seed_reference_data(system_id))
            .await;
    }
    store
}

fn write_report(
    report: &ReportDocument,
    format: ReportFormat,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let rendered = match format {
        ReportFormat::Json => serde_json::to_string_pretty(report)?,
        ReportFormat::Markdown => render_markdown(report),
    };

    match out {
        Some(path) => {
            std::fs::write(&path, rendered)?;
            println!("Report written to {}.", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = EvaluatorConfig::from_env()?;
    init_tracing(config.log_format);

    match cli.command {
        Commands::InitDb => {
            let store = postgres_store(&config).await?;
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let store = postgres_store(&config).await?;
            let (equivalencies, grades) = db::seed(store.pool()).await?;
            println!("Seeded {equivalencies} equivalencies and {grades} grade scale entries.");
        }
        Commands::Run {
            transcript,
            format,
            out,
            dry_run,
        } => {
            let store: Arc<dyn TranscriptStore> = if dry_run {
                tracing::info!("dry run against seeded in-memory reference data");
                Arc::new(seeded_memory_store().await) as Arc<dyn TranscriptStore>
            } else {
                Arc::new(postgres_store(&config).await?) as Arc<dyn TranscriptStore>
            };
            let evaluator = TranscriptEvaluator::new(store, &config.cache);
            let purge = evaluator.spawn_cache_purge(config.cache.ttl);

            let created = evaluator
                .ingest_transcript(transcript.into_new_transcript()?)
                .await?;
            let summary = evaluator.suggest_course_matches(created.id).await?;
            let evaluation = evaluator.evaluate_eligibility(created.id).await?;
            let report = evaluator.generate_report(evaluation.id).await?;
            purge.abort();

            println!(
                "Transcript {} processed: {} courses, {} flagged for review.",
                created.id, summary.courses_processed, summary.courses_flagged
            );
            write_report(&report, format, out)?;
        }
        Commands::Ingest(args) => {
            let evaluator = postgres_evaluator(&config).await?;
            let created = evaluator
                .ingest_transcript(args.into_new_transcript()?)
                .await?;
            println!("Transcript {} ingested.", created.id);
        }
        Commands::Suggest { transcript_id } => {
            let evaluator = postgres_evaluator(&config).await?;
            let summary = evaluator.suggest_course_matches(transcript_id).await?;
            println!(
                "Matched {} courses for transcript {} ({} flagged for review).",
                summary.courses_processed, summary.transcript_id, summary.courses_flagged
            );
        }
        Commands::Evaluate { transcript_id } => {
            let evaluator = postgres_evaluator(&config).await?;
            let evaluation = evaluator.evaluate_eligibility(transcript_id).await?;
            println!(
                "Evaluation {}: Division I {}, Division II {}, {} missing requirements.",
                evaluation.id,
                met(evaluation.division_i_eligible),
                met(evaluation.division_ii_eligible),
                evaluation.missing_requirements.len()
            );
        }
        Commands::Report {
            evaluation_id,
            format,
            out,
        } => {
            let evaluator = postgres_evaluator(&config).await?;
            let report = evaluator.generate_report(evaluation_id).await?;
            write_report(&report, format, out)?;
        }
        Commands::History { transcript_id } => {
            let evaluator = postgres_evaluator(&config).await?;
            let evaluations = evaluator.evaluation_history(transcript_id).await?;
            if evaluations.is_empty() {
                println!("No evaluations recorded for this transcript.");
                return Ok(());
            }
            for evaluation in evaluations {
                println!(
                    "- {} at {} (v{}): core GPA {}, Division I {}, Division II {}",
                    evaluation.id,
                    evaluation.created_at.format("%Y-%m-%d %H:%M"),
                    evaluation.evaluator_version,
                    evaluation
                        .core_gpa
                        .map(|gpa| format!("{gpa:.2}"))
                        .unwrap_or_else(|| "n/a".to_string()),
                    met(evaluation.division_i_eligible),
                    met(evaluation.division_ii_eligible)
                );
            }
        }
    }

    Ok(())
}
