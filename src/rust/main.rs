use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use triage::{default_artifact_path, train_with, Classifier, DatasetSource, RuntimeConfig, TrainingConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train on a SQLite dataset and write the artifact
    Train {
        /// SQLite file holding the labeled messages
        dataset: PathBuf,
        /// Where to write the trained artifact
        #[arg(short, long, env = "TRIAGE_ARTIFACT")]
        artifact: Option<PathBuf>,
        /// Table to read
        #[arg(long, default_value = "comm")]
        table: String,
        /// Column holding the message text
        #[arg(long, default_value = "message")]
        text_column: String,
        /// Metadata columns that are not categories
        #[arg(long, value_delimiter = ',', default_value = "genre")]
        ignore: Vec<String>,
        /// Fraction of messages held out for evaluation
        #[arg(long, default_value_t = 0.2)]
        test_size: f64,
        /// Cross-validation folds per grid point
        #[arg(long, default_value_t = 2)]
        cv_folds: usize,
        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
        /// Training threads (0 = all cores)
        #[arg(long, default_value_t = 0)]
        threads: usize,
    },
    /// Classify messages with a trained artifact
    Classify {
        /// Messages to classify
        #[arg(required = true)]
        texts: Vec<String>,
        #[arg(short, long, env = "TRIAGE_ARTIFACT")]
        artifact: Option<PathBuf>,
        /// Print only the categories labeled 1
        #[arg(long)]
        positives: bool,
    },
    /// Show a summary of a trained artifact
    Info {
        #[arg(short, long, env = "TRIAGE_ARTIFACT")]
        artifact: Option<PathBuf>,
    },
}

fn artifact_path(artifact: Option<PathBuf>) -> PathBuf {
    artifact.unwrap_or_else(default_artifact_path)
}

fn load(artifact: Option<PathBuf>) -> Result<Classifier> {
    let path = artifact_path(artifact);
    Classifier::load(&path).with_context(|| format!("Failed to load classifier from {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Train {
            dataset,
            artifact,
            table,
            text_column,
            ignore,
            test_size,
            cv_folds,
            seed,
            threads,
        } => {
            let source = DatasetSource::new(dataset)
                .with_table(table)
                .with_text_column(text_column)
                .with_ignored_columns(ignore);
            let config = TrainingConfig {
                test_size,
                cv_folds,
                seed,
                ..TrainingConfig::default()
            };
            let path = artifact_path(artifact);

            let start_time = Instant::now();
            let outcome = train_with(&source, &path, config, RuntimeConfig::with_threads(threads))
                .context("Training failed")?;
            info!("=== Training complete (took {:.2?}) ===", start_time.elapsed());
            println!("Selected {} (mean CV score {:.4})", outcome.search.best().point, outcome.search.best().mean);
            println!("Model saved to {}", path.display());
        }
        Command::Classify {
            texts,
            artifact,
            positives,
        } => {
            let classifier = load(artifact)?;
            for text in &texts {
                let labels = classifier.classify(text)?;
                println!("{}", text);
                if positives {
                    let names: Vec<&str> = labels.positives().collect();
                    println!("  {}", if names.is_empty() { "(none)".to_string() } else { names.join(", ") });
                } else {
                    for (name, label) in labels.iter() {
                        println!("  {}: {}", name, label);
                    }
                }
            }
        }
        Command::Info { artifact } => {
            let classifier = load(artifact)?;
            println!("{}", classifier.info());
        }
    }

    Ok(())
}
