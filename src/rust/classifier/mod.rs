use std::fmt;

mod error;
pub mod builder;
pub mod features;
pub mod forest;
pub mod metrics;
mod model;
pub mod search;
mod utils;
pub mod vectorizer;

pub use builder::{ClassifierBuilder, TrainingConfig, TrainingOutcome};
pub use error::ClassifierError;
pub use features::{
    detect_starting_verb, FeatureStage, FeatureUnion, Stage, StartingVerbExtractor,
    TransformerWeights,
};
pub use forest::{ForestParams, MaxFeatures, MultiOutputForest};
pub use metrics::{evaluate, CategoryReport, ClassMetrics, EvaluationReport};
pub use model::{Classification, Classifier, Hyperparameters};
pub use search::{GridPoint, GridScore, SearchGrid, SearchOutcome};
pub use utils::{FeatureMatrix, SparseRow};
pub use vectorizer::{Norm, TfidfVectorizer, VectorizerConfig};

/// Information about the current state and configuration of a classifier
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierInfo {
    /// Number of categories the classifier predicts
    pub num_categories: usize,
    /// Category names in output order
    pub category_labels: Vec<String>,
    /// Number of distinct tokens in the fitted vocabulary
    pub vocabulary_size: usize,
    /// Total number of feature columns
    pub feature_width: usize,
    /// Trees per category
    pub n_trees: usize,
    pub weights: TransformerWeights,
    pub seed: u64,
}

impl fmt::Display for ClassifierInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Categories ({}): {}", self.num_categories, self.category_labels.join(", "))?;
        writeln!(f, "Vocabulary size: {}", self.vocabulary_size)?;
        writeln!(f, "Feature columns: {}", self.feature_width)?;
        writeln!(f, "Trees per category: {}", self.n_trees)?;
        writeln!(f, "Branch weights: {}", self.weights)?;
        write!(f, "Training seed: {}", self.seed)
    }
}
