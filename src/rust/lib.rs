//! A multi-label classifier for disaster-response messages.
//!
//! Messages are tokenized and lemmatized, turned into TF-IDF columns plus a
//! "starts with a verb" flag, and labeled by one random forest per category.
//! Training picks the forest size and feature weights by cross-validated grid
//! search; the fitted pipeline is persisted as one checksummed artifact.
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use triage::Classifier;
//!
//! let classifier = Classifier::builder()
//!     .with_categories(["request", "aid_related"])?
//!     .add_document("need water", vec![1, 1])?
//!     .add_document("nice weather today", vec![0, 0])?
//!     .with_seed(7)
//!     .build()?;
//!
//! let labels = classifier.classify("need water")?;
//! println!("{}", labels);
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! A fitted classifier is immutable and can be shared across threads using `Arc`:
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use triage::Classifier;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let classifier = Arc::new(Classifier::builder()
//!     .with_categories(["request"])?
//!     .add_document("send food", vec![1])?
//!     .add_document("sunny day", vec![0])?
//!     .with_seed(7)
//!     .build()?);
//!
//! let mut handles = vec![];
//! for _ in 0..3 {
//!     let classifier = Arc::clone(&classifier);
//!     handles.push(thread::spawn(move || {
//!         classifier.classify("send food").unwrap();
//!     }));
//! }
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use log::info;

pub mod artifact;
pub mod classifier;
pub mod dataset;
mod runtime;
pub mod text;

pub use artifact::{default_artifact_path, ArtifactError};
pub use classifier::{
    detect_starting_verb, evaluate, Classification, Classifier, ClassifierBuilder,
    ClassifierError, ClassifierInfo, EvaluationReport, SearchGrid, TrainingConfig,
    TrainingOutcome, TransformerWeights,
};
pub use dataset::{CategorySet, Dataset, DatasetError, DatasetSource};
pub use runtime::{create_thread_pool, RuntimeConfig};
pub use text::tokenize;

pub fn init_logger() {
    env_logger::init();
}

/// Trains on the `comm` table of the SQLite file at `dataset_path`, prints the
/// evaluation report and writes the artifact to `artifact_path`.
pub fn train(dataset_path: impl AsRef<Path>, artifact_path: impl AsRef<Path>) -> Result<TrainingOutcome, ClassifierError> {
    train_with(
        &DatasetSource::new(dataset_path),
        artifact_path.as_ref(),
        TrainingConfig::default(),
        RuntimeConfig::default(),
    )
}

/// [`train`] with an explicit source and configuration.
pub fn train_with(
    source: &DatasetSource,
    artifact_path: &Path,
    config: TrainingConfig,
    runtime: RuntimeConfig,
) -> Result<TrainingOutcome, ClassifierError> {
    info!("Loading data from {:?}", source.path);
    let dataset = Dataset::from_sqlite(source)?;

    info!("Training model...");
    let outcome = ClassifierBuilder::new()
        .with_config(config)
        .with_runtime_config(runtime)
        .with_dataset(dataset)?
        .train()?;

    info!("Evaluating model...");
    println!("{}", outcome.report);

    info!("Saving model to {:?}", artifact_path);
    outcome.classifier.save(artifact_path)?;
    info!("Trained model saved");
    Ok(outcome)
}
