use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;
use super::features::{FeatureUnion, Stage, TransformerWeights, TEXT_BRANCH};
use super::forest::{ForestParams, MultiOutputForest};
use super::utils::FeatureMatrix;
use crate::artifact::{self, ArtifactError};
use crate::dataset::CategorySet;
use crate::text::{LEMMATIZER_VERSION, TAGGER_VERSION, TOKENIZER_VERSION};

/// Settings the fitted pipeline was trained with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub n_trees: usize,
    pub weights: TransformerWeights,
    pub forest: ForestParams,
    /// Base seed every training draw was derived from
    pub seed: u64,
}

/// Category name to 0/1 label, in category-set order. Every category
/// appears exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    labels: Vec<(String, u8)>,
}

impl Classification {
    pub fn get(&self, category: &str) -> Option<u8> {
        self.labels
            .iter()
            .find(|(name, _)| name == category)
            .map(|&(_, label)| label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.labels.iter().map(|(name, label)| (name.as_str(), *label))
    }

    /// Names of the categories labeled 1.
    pub fn positives(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|&(_, label)| label == 1).map(|(name, _)| name)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn to_map(&self) -> HashMap<String, u8> {
        self.labels.iter().cloned().collect()
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, label)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, label)?;
        }
        Ok(())
    }
}

/// A fitted message classifier: feature pipeline, one forest per category,
/// and the category set fixing the output order.
///
/// Prediction never mutates the classifier, so one instance can serve any
/// number of threads behind an `Arc`.
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use triage::Classifier;
///
/// let classifier = Classifier::builder()
///     .with_categories(["request", "aid_related"])?
///     .add_document("need water", vec![1, 1])?
///     .add_document("nice weather today", vec![0, 0])?
///     .with_seed(42)
///     .build()?;
///
/// let labels = classifier.classify("need water")?;
/// assert_eq!(labels.get("request"), Some(1));
/// assert_eq!(labels.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classifier {
    categories: CategorySet,
    features: FeatureUnion,
    forest: MultiOutputForest,
    hyperparameters: Hyperparameters,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Classifier>();
    }
};

#[derive(Serialize)]
struct PayloadRef<'a> {
    tokenizer_version: u32,
    lemmatizer_version: u32,
    tagger_version: u32,
    classifier: &'a Classifier,
}

#[derive(Deserialize)]
struct Payload {
    tokenizer_version: u32,
    lemmatizer_version: u32,
    tagger_version: u32,
    classifier: Classifier,
}

impl Payload {
    fn check_versions(&self) -> Result<(), ArtifactError> {
        for (component, expected, found) in [
            ("tokenizer", TOKENIZER_VERSION, self.tokenizer_version),
            ("lemmatizer", LEMMATIZER_VERSION, self.lemmatizer_version),
            ("tagger", TAGGER_VERSION, self.tagger_version),
        ] {
            if expected != found {
                return Err(ArtifactError::IncompatibleComponent {
                    component,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }
}

impl Classifier {
    /// Creates a new ClassifierBuilder for fluent construction
    pub fn builder() -> super::builder::ClassifierBuilder {
        super::builder::ClassifierBuilder::new()
    }

    pub(crate) fn from_parts(
        categories: CategorySet,
        features: FeatureUnion,
        forest: MultiOutputForest,
        hyperparameters: Hyperparameters,
    ) -> Result<Self, ClassifierError> {
        let classifier = Self {
            categories,
            features,
            forest,
            hyperparameters,
        };
        classifier.validate()?;
        Ok(classifier)
    }

    /// Returns information about the classifier's current state
    pub fn info(&self) -> super::ClassifierInfo {
        super::ClassifierInfo {
            num_categories: self.categories.len(),
            category_labels: self.categories.names().to_vec(),
            vocabulary_size: self.vocabulary_size(),
            feature_width: self.features.width(),
            n_trees: self.hyperparameters.n_trees,
            weights: self.hyperparameters.weights.clone(),
            seed: self.hyperparameters.seed,
        }
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn features(&self) -> &FeatureUnion {
        &self.features
    }

    pub fn vocabulary_size(&self) -> usize {
        match self.features.stage(TEXT_BRANCH) {
            Some(Stage::Tfidf(vectorizer)) => vectorizer.vocabulary_size(),
            _ => 0,
        }
    }

    /// Feature rows for `texts` under the fitted vocabulary and weights.
    pub fn vectorize(&self, texts: &[&str]) -> Result<FeatureMatrix, ClassifierError> {
        self.features.transform(texts)
    }

    /// Label vector for one text, in category order.
    pub fn predict(&self, text: &str) -> Result<Vec<u8>, ClassifierError> {
        let matrix = self.features.transform(&[text])?;
        let labels = self.forest.predict_row(matrix.row(0));
        if labels.len() != self.categories.len() {
            return Err(ClassifierError::PredictionError(format!(
                "Model produced {} labels for {} categories",
                labels.len(),
                self.categories.len()
            )));
        }
        Ok(labels)
    }

    /// `texts.len() x categories` label matrix.
    pub fn predict_batch(&self, texts: &[&str]) -> Result<Array2<u8>, ClassifierError> {
        let matrix = self.features.transform(texts)?;
        self.forest.predict(&matrix)
    }

    /// Labels `text` with every category.
    ///
    /// Empty or unrecognized text is valid input and still yields a label for
    /// every category.
    pub fn classify(&self, text: &str) -> Result<Classification, ClassifierError> {
        let labels = self.predict(text)?;
        Ok(Classification {
            labels: self
                .categories
                .names()
                .iter()
                .cloned()
                .zip(labels)
                .collect(),
        })
    }

    /// Fails with [`ClassifierError::CategoryMismatch`] unless `expected` lists
    /// exactly this classifier's categories in the same order.
    pub fn ensure_categories<S: AsRef<str>>(&self, expected: &[S]) -> Result<(), ClassifierError> {
        let matches = expected.len() == self.categories.len()
            && expected
                .iter()
                .zip(self.categories.iter())
                .all(|(e, c)| e.as_ref() == c);
        if matches {
            Ok(())
        } else {
            Err(ClassifierError::CategoryMismatch {
                expected: expected.iter().map(|e| e.as_ref().to_string()).collect(),
                found: self.categories.names().to_vec(),
            })
        }
    }

    /// Serializes the fitted pipeline into a self-verifying artifact.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ClassifierError> {
        let payload = bincode::serialize(&PayloadRef {
            tokenizer_version: TOKENIZER_VERSION,
            lemmatizer_version: LEMMATIZER_VERSION,
            tagger_version: TAGGER_VERSION,
            classifier: self,
        })
        .map_err(ArtifactError::from)?;
        Ok(artifact::encode(&payload))
    }

    /// Restores a classifier from [`to_bytes`](Self::to_bytes) output. Any
    /// corruption or version mismatch fails the whole load.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ClassifierError> {
        Self::from_payload(artifact::decode(bytes)?)
    }

    fn from_payload(payload: &[u8]) -> Result<Self, ClassifierError> {
        let payload: Payload = bincode::deserialize(payload).map_err(ArtifactError::from)?;
        payload.check_versions()?;
        let classifier = payload.classifier;
        classifier.validate()?;
        debug!(
            "Loaded classifier with {} categories and {} features",
            classifier.categories.len(),
            classifier.features.width()
        );
        Ok(classifier)
    }

    /// Writes the artifact to `path`, replacing any previous file whole.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ClassifierError> {
        let bytes = self.to_bytes()?;
        artifact::write_atomic(path.as_ref(), &bytes)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let payload = artifact::read_verified(path)?;
        let classifier = Self::from_payload(&payload)?;
        info!(
            "Loaded classifier from {:?} ({} categories)",
            path,
            classifier.categories.len()
        );
        Ok(classifier)
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        if self.forest.n_outputs() != self.categories.len() {
            return Err(ClassifierError::ModelError(format!(
                "Model has {} outputs for {} categories",
                self.forest.n_outputs(),
                self.categories.len()
            )));
        }
        if self.forest.n_features() != self.features.width() {
            return Err(ClassifierError::ModelError(format!(
                "Forest expects {} features, pipeline produces {}",
                self.forest.n_features(),
                self.features.width()
            )));
        }
        self.features.validate()?;
        self.forest.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitted() -> Classifier {
        Classifier::builder()
            .with_categories(["request", "aid_related"])
            .unwrap()
            .add_document("need water", vec![1, 1])
            .unwrap()
            .add_document("nice weather today", vec![0, 0])
            .unwrap()
            .with_seed(3)
            .build()
            .unwrap()
    }

    #[test]
    fn test_classify_memorized_document() {
        let labels = fitted().classify("need water").unwrap();
        assert_eq!(labels.get("request"), Some(1));
        assert_eq!(labels.get("aid_related"), Some(1));
        assert_eq!(labels.positives().collect::<Vec<_>>(), vec!["request", "aid_related"]);
        assert_eq!(labels.to_string(), "request=1, aid_related=1");
    }

    #[test]
    fn test_classify_empty_text() {
        let labels = fitted().classify("").unwrap();
        assert_eq!(labels.len(), 2);
        assert!(labels.iter().all(|(_, label)| label <= 1));
        assert_eq!(labels.to_map().len(), 2);
    }

    #[test]
    fn test_ensure_categories() {
        let classifier = fitted();
        assert!(classifier.ensure_categories(&["request", "aid_related"]).is_ok());
        let err = classifier.ensure_categories(&["aid_related", "request"]).unwrap_err();
        assert!(matches!(err, ClassifierError::CategoryMismatch { .. }));
        assert!(classifier.ensure_categories(&["request"]).is_err());
    }

    #[test]
    fn test_bytes_round_trip() {
        let classifier = fitted();
        let restored = Classifier::from_bytes(&classifier.to_bytes().unwrap()).unwrap();
        let texts = ["need water", "nice weather today", "", "unknown words"];
        assert_eq!(
            classifier.predict_batch(&texts).unwrap(),
            restored.predict_batch(&texts).unwrap()
        );
        assert_eq!(restored.categories(), classifier.categories());
        assert_eq!(restored.hyperparameters(), classifier.hyperparameters());
    }

    #[test]
    fn test_corrupt_bytes_rejected() {
        let mut bytes = fitted().to_bytes().unwrap();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x55;
        assert!(matches!(
            Classifier::from_bytes(&bytes),
            Err(ClassifierError::ModelError(_))
        ));
        assert!(Classifier::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_save_then_load_verifies_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("classifier.bin");
        let classifier = fitted();
        classifier.save(&path).unwrap();
        let restored = Classifier::load(&path).unwrap();
        assert_eq!(restored.classify("need water").unwrap(), classifier.classify("need water").unwrap());

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        std::fs::write(&path, bytes).unwrap();
        match Classifier::load(&path) {
            Err(ClassifierError::ModelError(msg)) => assert!(msg.contains("Hash mismatch"), "{}", msg),
            other => panic!("expected a hash mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_info() {
        let info = fitted().info();
        assert_eq!(info.num_categories, 2);
        assert_eq!(info.vocabulary_size, 5);
        assert_eq!(info.feature_width, 6);
        assert_eq!(info.seed, 3);
    }
}
