use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod batch;
mod config;
mod dataset;
mod ensemble;
mod error;
mod harmonize;
mod inference;
mod models;
mod preprocess;
mod recommend;
mod registry;
mod search;
mod service;
mod stats;
mod training;
mod tree;

use config::Settings;
use dataset::DatasetCatalog;
use models::PredictionRequest;
use recommend::RecommendationEngine;
use registry::ModelRegistry;
use service::PredictionService;

#[derive(Parser)]
#[command(name = "student-performance")]
#[command(about = "Student academic performance prediction", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PredictArgs {
    #[arg(long)]
    age: i64,
    #[arg(long)]
    gender: String,
    #[arg(long)]
    study_time_hours: f64,
    #[arg(long)]
    absences: i64,
    #[arg(long)]
    parental_education: String,
    #[arg(long)]
    previous_grade: f64,
    #[arg(long)]
    extracurricular: String,
    #[arg(long)]
    sleep_hours: f64,
}

impl From<PredictArgs> for PredictionRequest {
    fn from(args: PredictArgs) -> Self {
        PredictionRequest {
            age: args.age,
            gender: args.gender,
            study_time_hours: args.study_time_hours,
            absences: args.absences,
            parental_education: args.parental_education,
            previous_grade: args.previous_grade,
            extracurricular: args.extracurricular,
            sleep_hours: args.sleep_hours,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Train both model families and report the winner
    Train,
    /// Show service version and whether a model is loaded
    Status,
    /// Predict the final grade for one student profile
    Predict(PredictArgs),
    /// Show metrics and features of the active model
    ModelInfo,
    /// Attach predictions to a stored dataset
    BatchPredict {
        /// lifestyle, classroom, survey, or all
        #[arg(long, default_value = "survey")]
        source: String,
        /// Skip writing the augmented copy
        #[arg(long)]
        no_save: bool,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Summarize the source datasets
    DatasetStats {
        /// Write a markdown report instead of printing JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

impl Commands {
    /// Whether the command reads the trained model.
    fn needs_model(&self) -> bool {
        !matches!(self, Commands::DatasetStats { .. })
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings;
    let catalog = DatasetCatalog::new(&settings.data_dir);
    let registry = Arc::new(ModelRegistry::new());

    if cli.command.needs_model() {
        let training_catalog = catalog.clone();
        let config = settings.training_config();
        let trained = tokio::task::spawn_blocking(move || {
            training::train_from_catalog(&training_catalog, &config)
        })
        .await
        .context("training task panicked")?;
        match trained {
            Ok(artifact) => {
                registry.install(artifact);
            }
            Err(err) => {
                error!(error = %err, "model training failed");
                warn!("continuing without a model; prediction commands are unavailable");
            }
        }
    }

    let recommender = RecommendationEngine::from_settings(&settings);
    info!(
        provider = recommender.provider_name(),
        "recommendation provider selected"
    );
    let service = PredictionService::new(Arc::clone(&registry), recommender, catalog);

    match cli.command {
        Commands::Train => {
            let info = service.model_info()?;
            let metrics = &info.metrics;
            println!("Model trained successfully: {}", metrics.model_name);
            println!("R² Score: {:.4}", metrics.r2_score);
            println!("RMSE: {:.4}", metrics.rmse);
            println!("MAE: {:.4}", metrics.mae);
            println!(
                "Samples: {} train / {} test",
                metrics.training_samples, metrics.test_samples
            );
        }
        Commands::Status => {
            print_json(&service.status())?;
        }
        Commands::Predict(args) => {
            let result = service.predict(args.into()).await?;
            println!(
                "Predicted grade {:.2} ({}) with confidence {:.2} via {}",
                result.predicted_grade,
                result.performance_level,
                result.confidence_score,
                result.model_used
            );
            println!("Recommendations:");
            for rec in &result.recommendations {
                println!("- {rec}");
            }
        }
        Commands::ModelInfo => {
            print_json(&service.model_info()?)?;
        }
        Commands::BatchPredict {
            source,
            no_save,
            limit,
        } => {
            let outcome = service.batch_predict(&source, !no_save, Some(limit))?;
            for path in &outcome.saved_files {
                eprintln!("Predictions written to {}.", path.display());
            }
            print_json(&outcome)?;
        }
        Commands::DatasetStats { out } => {
            let stats = service.dataset_stats()?;
            match out {
                Some(out) => {
                    std::fs::write(&out, stats::build_report(&stats))?;
                    println!("Report written to {}.", out.display());
                }
                None => print_json(&stats)?,
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_dataset_stats_skips_training() {
        let parse = |args: &[&str]| Cli::try_parse_from(args).unwrap().command;
        assert!(!parse(&["student-performance", "dataset-stats"]).needs_model());
        assert!(!parse(&["student-performance", "dataset-stats", "--out", "r.md"]).needs_model());
        assert!(parse(&["student-performance", "status"]).needs_model());
        assert!(parse(&["student-performance", "train"]).needs_model());
        assert!(parse(&["student-performance", "batch-predict", "--source", "all"]).needs_model());
    }
}
