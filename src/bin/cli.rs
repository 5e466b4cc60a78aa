//! IMEC CLI - preprocessing, training and offline strategy prediction

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use imec::core::race_plan::MAX_DURATION_HOURS;
use imec::data::{
    build_training_table, load_processed, save_processed, LoaderConfig, ResultsLoader,
};
use imec::model::{ModelRegistry, ModelStore, Trainer, TrainerConfig};
use imec::models::PredictRequest;
use imec::strategy::{InferenceMode, StrategyEngine};

const DEFAULT_RAW_DIR: &str = "IMSA Data";
const DEFAULT_PROCESSED: &str = "data/processed/imsa_processed_history.parquet";
const DEFAULT_MODELS_DIR: &str = "data/models";

#[derive(Parser)]
#[command(name = "imec")]
#[command(author, version, about = "Endurance race strategy CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the processed dataset from raw results exports
    Preprocess {
        /// Raw data directory (<year>/<event>/*race-results.csv)
        #[arg(long, default_value = DEFAULT_RAW_DIR)]
        raw_dir: PathBuf,

        /// Output parquet file
        #[arg(short, long, default_value = DEFAULT_PROCESSED)]
        output: PathBuf,

        /// Seasons to include (default: 2021-2024)
        #[arg(long, value_delimiter = ',')]
        years: Vec<String>,
    },

    /// Train one model per class and write the artifacts
    Train {
        /// Processed parquet dataset
        #[arg(long, default_value = DEFAULT_PROCESSED)]
        processed: PathBuf,

        /// Output directory for model artifacts
        #[arg(long, default_value = DEFAULT_MODELS_DIR)]
        models_dir: PathBuf,

        /// Raw data directory, preprocessed first when the dataset is missing
        #[arg(long)]
        raw_dir: Option<PathBuf>,

        /// Seed for the split, boosting and synthetic grid positions
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Predict a race from a request JSON file
    Predict {
        /// Request file (same shape as the POST /predict body)
        input: PathBuf,

        /// Model artifacts directory
        #[arg(long, default_value = DEFAULT_MODELS_DIR)]
        models_dir: PathBuf,

        /// Inference mode: heuristic or hybrid
        #[arg(long, default_value = "heuristic")]
        mode: InferenceMode,

        /// Seed for reproducible heuristic draws
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show stored model metadata
    Inspect {
        /// Model artifacts directory
        #[arg(long, default_value = DEFAULT_MODELS_DIR)]
        models_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Preprocess {
            raw_dir,
            output,
            years,
        } => preprocess(&raw_dir, &output, years),
        Commands::Train {
            processed,
            models_dir,
            raw_dir,
            seed,
        } => train(&processed, &models_dir, raw_dir.as_deref(), seed),
        Commands::Predict {
            input,
            models_dir,
            mode,
            seed,
        } => predict(&input, &models_dir, mode, seed),
        Commands::Inspect { models_dir } => inspect(&models_dir),
    }
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("Invalid spinner template")?,
    );
    pb.set_message(message);
    Ok(pb)
}

fn preprocess(raw_dir: &Path, output: &Path, years: Vec<String>) -> Result<()> {
    println!("{} {:?}", "Preprocessing".green(), raw_dir);

    let config = if years.is_empty() {
        LoaderConfig::default()
    } else {
        LoaderConfig { years }
    };

    let pb = spinner("Reading results exports...")?;
    let records = ResultsLoader::new(raw_dir, config)
        .load()
        .with_context(|| format!("Failed to load results from {:?}", raw_dir))?;
    pb.finish_and_clear();

    if records.is_empty() {
        bail!("No results found under {:?}", raw_dir);
    }

    save_processed(&records, output)
        .with_context(|| format!("Failed to write {:?}", output))?;

    println!(
        "{} {} records -> {:?}",
        "Saved".green().bold(),
        records.len(),
        output
    );
    Ok(())
}

fn train(processed: &Path, models_dir: &Path, raw_dir: Option<&Path>, seed: u64) -> Result<()> {
    if !processed.exists() {
        match raw_dir {
            Some(raw_dir) => {
                println!("{}", "Processed dataset missing, preprocessing first.".yellow());
                preprocess(raw_dir, processed, Vec::new())?;
            }
            None => bail!(
                "Processed dataset {:?} not found; run `imec preprocess` or pass --raw-dir",
                processed
            ),
        }
    }

    let records = load_processed(processed)
        .with_context(|| format!("Failed to read {:?}", processed))?;
    println!("{} {} records from {:?}", "Training on".green(), records.len(), processed);

    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let set = build_training_table(&records, &mut rng);

    let mut config = TrainerConfig {
        seed,
        ..TrainerConfig::default()
    };
    config.params.seed = seed;

    let pb = spinner("Training class models...")?;
    let report = Trainer::new(config).train_all(&set);
    let metadata = ModelStore::new(models_dir)
        .save(&report)
        .with_context(|| format!("Failed to save models to {:?}", models_dir))?;
    pb.finish_and_clear();

    println!();
    println!("{}", "Training summary:".yellow().bold());
    println!("{:<10} {:>8} {:>10}", "Class", "Samples", "R²");
    println!("{}", "-".repeat(30));
    for model in &report.models {
        let score = match model.metric {
            Some(r2) => format!("{:.4}", r2),
            None => "fallback".dimmed().to_string(),
        };
        println!("{:<10} {:>8} {:>10}", model.class, model.training_samples, score);
    }
    for (class, reason) in &report.failures {
        println!("{:<10} {}", class.to_string().red(), reason);
    }

    if set.synthesized_grid_rows > 0 {
        println!(
            "{}",
            format!(
                "Note: {} rows used a synthesized grid position.",
                set.synthesized_grid_rows
            )
            .dimmed()
        );
    }
    println!();
    println!(
        "{} {:?} (version {})",
        "Artifacts written to".green(),
        models_dir,
        metadata.version
    );
    Ok(())
}

fn predict(input: &Path, models_dir: &Path, mode: InferenceMode, seed: Option<u64>) -> Result<()> {
    let body = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {:?}", input))?;
    let req: PredictRequest = serde_json::from_str(&body)
        .with_context(|| format!("Invalid request in {:?}", input))?;

    let duration = req.race_details.duration_hours;
    if !duration.is_finite() || duration <= 0.0 {
        bail!("duration_hours must be a positive number, got {}", duration);
    }
    if duration > MAX_DURATION_HOURS {
        bail!("duration_hours must not exceed {}, got {}", MAX_DURATION_HOURS, duration);
    }

    let registry = if mode == InferenceMode::Hybrid {
        ModelStore::new(models_dir).load()
    } else {
        ModelRegistry::empty()
    };
    let engine = StrategyEngine::new(Arc::new(registry), mode);

    let response = match seed {
        Some(seed) => engine.predict_race(&req, &mut Pcg64Mcg::seed_from_u64(seed)),
        None => engine.predict_race(&req, &mut rand::rng()),
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn inspect(models_dir: &Path) -> Result<()> {
    let store = ModelStore::new(models_dir);
    let metadata = store
        .load_metadata()
        .with_context(|| format!("No model metadata in {:?}", models_dir))?;

    println!("{}", "Model metadata:".yellow().bold());
    println!("  version:  {}", metadata.version);
    println!("  features: {}", metadata.features.join(", "));
    if let Some(trained_at) = &metadata.trained_at {
        println!("  trained:  {}", trained_at);
    }
    println!();
    println!("{:<10} {:>10} {:>8}", "Class", "R²", "Present");
    println!("{}", "-".repeat(30));
    for class in &metadata.classes {
        let score = match metadata.metrics.get(class) {
            Some(r2) => format!("{:.4}", r2),
            None if metadata.fallback_classes.contains(class) => "fallback".to_string(),
            None => "-".to_string(),
        };
        let present = class
            .parse()
            .map(|c| store.model_path(c).exists())
            .unwrap_or(false);
        let present = if present { "yes".green() } else { "no".red() };
        println!("{:<10} {:>10} {:>8}", class, score, present);
    }
    Ok(())
}
