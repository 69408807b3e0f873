use std::fmt;

use crate::artifact::ArtifactError;
use crate::dataset::DatasetError;

/// Represents the different types of errors that can occur in the message classifier.
#[derive(Debug)]
pub enum ClassifierError {
    /// Error occurred while loading, saving or validating a fitted pipeline
    ModelError(String),
    /// Error occurred during the build (training) phase
    BuildError(String),
    /// Error occurred while making predictions
    PredictionError(String),
    /// Error occurred due to invalid input parameters
    ValidationError(String),
    /// The category set a caller expects differs from the fitted one
    CategoryMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelError(msg) => write!(f, "Model error: {}", msg),
            Self::BuildError(msg) => write!(f, "Build error: {}", msg),
            Self::PredictionError(msg) => write!(f, "Prediction error: {}", msg),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Self::CategoryMismatch { expected, found } => write!(
                f,
                "Category mismatch: expected {} categories {:?}, model has {} categories {:?}",
                expected.len(),
                expected,
                found.len(),
                found
            ),
        }
    }
}

impl std::error::Error for ClassifierError {}

impl From<ArtifactError> for ClassifierError {
    fn from(err: ArtifactError) -> Self {
        ClassifierError::ModelError(err.to_string())
    }
}

impl From<DatasetError> for ClassifierError {
    fn from(err: DatasetError) -> Self {
        ClassifierError::ValidationError(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for ClassifierError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        ClassifierError::BuildError(err.to_string())
    }
}
