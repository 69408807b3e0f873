use log::{info, warn};
use ndarray::Array2;

use super::error::ClassifierError;
use super::features::{FeatureUnion, TransformerWeights};
use super::forest::{ForestParams, MultiOutputForest};
use super::metrics::{evaluate, EvaluationReport};
use super::model::{Classifier, Hyperparameters};
use super::search::{GridSearch, KFold, SearchGrid, SearchOutcome};
use super::utils::derive_seed;
use super::vectorizer::VectorizerConfig;
use crate::dataset::{CategorySet, Dataset};
use crate::runtime::{create_thread_pool, RuntimeConfig};

const SPLIT_STREAM: u64 = 0;
const SEARCH_STREAM: u64 = 1;
const FIT_STREAM: u64 = 2;

/// Settings of a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    /// Fraction of rows held out for evaluation
    pub test_size: f64,
    /// Folds used to score each grid point
    pub cv_folds: usize,
    pub grid: SearchGrid,
    /// `None` draws a fresh seed for the run
    pub seed: Option<u64>,
    /// Forest settings other than the searched ensemble size
    pub forest: ForestParams,
    pub vectorizer: VectorizerConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            cv_folds: 2,
            grid: SearchGrid::default(),
            seed: None,
            forest: ForestParams::default(),
            vectorizer: VectorizerConfig::default(),
        }
    }
}

impl TrainingConfig {
    fn validate(&self) -> Result<(), ClassifierError> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ClassifierError::ValidationError(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if self.grid.is_empty() {
            return Err(ClassifierError::ValidationError("Search grid is empty".into()));
        }
        if self.grid.n_trees.contains(&0) {
            return Err(ClassifierError::ValidationError(
                "Grid ensemble sizes must be positive".into(),
            ));
        }
        KFold::new(self.cv_folds)?;
        self.forest.validate()
    }
}

/// Result of [`ClassifierBuilder::train`].
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// The winning configuration refit on the whole training split
    pub classifier: Classifier,
    /// Scores on the held-out split
    pub report: EvaluationReport,
    pub search: SearchOutcome,
    /// Base seed of the run
    pub seed: u64,
}

/// A builder for training a Classifier with a fluent interface.
#[derive(Debug, Default)]
pub struct ClassifierBuilder {
    categories: Option<CategorySet>,
    documents: Vec<(String, Vec<u8>)>,
    dataset: Option<Dataset>,
    weights: Option<TransformerWeights>,
    config: TrainingConfig,
    runtime_config: RuntimeConfig,
}

impl ClassifierBuilder {
    /// Creates a new empty ClassifierBuilder instance with default configuration
    ///
    /// # Example
    /// ```
    /// use triage::ClassifierBuilder;
    ///
    /// let builder = ClassifierBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the thread configuration used while fitting
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Replaces the whole training configuration
    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    /// Declares the category set, in output order
    ///
    /// # Returns
    /// * `Result<Self, ClassifierError>` - The builder instance if successful, or an error if:
    ///   - No categories are given
    ///   - A name is empty or repeated
    ///   - A dataset was already supplied
    pub fn with_categories<S: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Result<Self, ClassifierError> {
        if self.dataset.is_some() {
            return Err(ClassifierError::BuildError(
                "Categories come from the dataset already supplied".into(),
            ));
        }
        self.categories = Some(CategorySet::new(names)?);
        Ok(self)
    }

    /// Adds a labeled training document
    ///
    /// # Arguments
    /// * `text` - The message text
    /// * `labels` - One 0/1 label per category, in category order
    ///
    /// # Example
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use triage::ClassifierBuilder;
    ///
    /// let builder = ClassifierBuilder::new()
    ///     .with_categories(["request", "aid_related"])?
    ///     .add_document("please send water", vec![1, 1])?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn add_document(mut self, text: impl Into<String>, labels: Vec<u8>) -> Result<Self, ClassifierError> {
        let categories = self.categories.as_ref().ok_or_else(|| {
            ClassifierError::BuildError("Categories must be set before adding documents".into())
        })?;
        if labels.len() != categories.len() {
            return Err(ClassifierError::ValidationError(format!(
                "Document has {} labels, expected {}",
                labels.len(),
                categories.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&l| l > 1) {
            return Err(ClassifierError::ValidationError(format!(
                "Label {} is not 0 or 1",
                bad
            )));
        }
        self.documents.push((text.into(), labels));
        Ok(self)
    }

    /// Trains on a whole dataset; its columns define the category set
    pub fn with_dataset(mut self, dataset: Dataset) -> Result<Self, ClassifierError> {
        if self.categories.is_some() || !self.documents.is_empty() {
            return Err(ClassifierError::BuildError(
                "A dataset cannot be combined with individually added documents".into(),
            ));
        }
        self.dataset = Some(dataset);
        Ok(self)
    }

    /// Fixes the base seed so training is reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn with_grid(mut self, grid: SearchGrid) -> Self {
        self.config.grid = grid;
        self
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.config.cv_folds = folds;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.config.test_size = test_size;
        self
    }

    pub fn with_forest_params(mut self, params: ForestParams) -> Self {
        self.config.forest = params;
        self
    }

    pub fn with_vectorizer_config(mut self, config: VectorizerConfig) -> Self {
        self.config.vectorizer = config;
        self
    }

    /// Branch weights used by [`build`](Self::build). Defaults to 1 for every branch.
    pub fn with_weights(mut self, weights: TransformerWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    fn take_dataset(&mut self) -> Result<Dataset, ClassifierError> {
        if let Some(dataset) = self.dataset.take() {
            return Ok(dataset);
        }
        let categories = self
            .categories
            .take()
            .ok_or_else(|| ClassifierError::BuildError("No categories or dataset supplied".into()))?;
        let dataset = Dataset::from_records(categories, std::mem::take(&mut self.documents))?;
        Ok(dataset)
    }

    fn resolve_seed(&self) -> u64 {
        match self.config.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random::<u64>();
                info!("No seed configured, using {}", seed);
                seed
            }
        }
    }

    /// Fits the pipeline on every document with fixed hyperparameters, without
    /// a held-out split or search
    ///
    /// # Returns
    /// * `Result<Classifier, ClassifierError>` - The fitted Classifier, or an error if:
    ///   - No documents were added
    ///   - The forest parameters or weights are invalid
    pub fn build(mut self) -> Result<Classifier, ClassifierError> {
        self.config.forest.validate()?;
        let dataset = self.take_dataset()?;
        if dataset.is_empty() {
            return Err(ClassifierError::BuildError("At least one document is required".into()));
        }
        let seed = self.resolve_seed();
        let weights = self
            .weights
            .clone()
            .unwrap_or_else(|| TransformerWeights::standard(1.0, 1.0));

        let pool = create_thread_pool(&self.runtime_config)?;
        let texts = dataset.text_refs();
        let (features, forest) = pool.install(|| {
            fit_pipeline(
                self.config.vectorizer,
                &weights,
                self.config.forest,
                &texts,
                dataset.labels(),
                derive_seed(seed, FIT_STREAM),
            )
        })?;

        Classifier::from_parts(
            dataset.categories().clone(),
            features,
            forest,
            Hyperparameters {
                n_trees: self.config.forest.n_trees,
                weights,
                forest: self.config.forest,
                seed,
            },
        )
    }

    /// Runs the full training procedure: held-out split, grid search with
    /// cross-validation on the training side, refit of the winner on the whole
    /// training side, and evaluation on the held-out side
    ///
    /// # Example
    /// ```no_run
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use triage::{ClassifierBuilder, Dataset, DatasetSource};
    ///
    /// let dataset = Dataset::from_sqlite(&DatasetSource::new("messages.db"))?;
    /// let outcome = ClassifierBuilder::new()
    ///     .with_dataset(dataset)?
    ///     .train()?;
    /// println!("{}", outcome.report);
    /// # Ok(())
    /// # }
    /// ```
    pub fn train(mut self) -> Result<TrainingOutcome, ClassifierError> {
        self.config.validate()?;
        let dataset = self.take_dataset()?;
        let seed = self.resolve_seed();
        info!("Training on {} messages with seed {}", dataset.len(), seed);

        let (train, test) = dataset.train_test_split(self.config.test_size, derive_seed(seed, SPLIT_STREAM))?;
        info!("Split into {} training and {} test messages", train.len(), test.len());

        let pool = create_thread_pool(&self.runtime_config)?;
        let train_texts = train.text_refs();
        let config = &self.config;
        let (search, features, forest) = pool.install(|| -> Result<_, ClassifierError> {
            let template = FeatureUnion::standard(config.vectorizer);
            let search = GridSearch::new(
                config.grid.clone(),
                KFold::new(config.cv_folds)?,
                config.forest,
                derive_seed(seed, SEARCH_STREAM),
            )
            .run(&template, &train_texts, train.labels())?;

            let best = &search.best().point;
            info!("Refitting {} on the full training split", best);
            let (features, forest) = fit_pipeline(
                config.vectorizer,
                &best.weights,
                config.forest.with_trees(best.n_trees),
                &train_texts,
                train.labels(),
                derive_seed(seed, FIT_STREAM),
            )?;
            Ok((search, features, forest))
        })?;

        let best = search.best().point.clone();
        let classifier = Classifier::from_parts(
            dataset.categories().clone(),
            features,
            forest,
            Hyperparameters {
                n_trees: best.n_trees,
                weights: best.weights,
                forest: self.config.forest.with_trees(best.n_trees),
                seed,
            },
        )?;

        let report = evaluate(
            &classifier,
            &test.text_refs(),
            test.labels(),
            dataset.categories().names(),
        )?;
        for category in report.categories() {
            if category.positive().support == 0 {
                warn!("Category '{}' has no positive examples in the test split", category.name);
            }
        }

        Ok(TrainingOutcome {
            classifier,
            report,
            search,
            seed,
        })
    }
}

fn fit_pipeline(
    vectorizer: VectorizerConfig,
    weights: &TransformerWeights,
    params: ForestParams,
    texts: &[&str],
    labels: &Array2<u8>,
    seed: u64,
) -> Result<(FeatureUnion, MultiOutputForest), ClassifierError> {
    let mut features = FeatureUnion::standard(vectorizer);
    features.set_weights(weights)?;
    let matrix = features.fit_transform(texts)?;
    info!(
        "Fitted features: {} rows x {} columns, fitting {} trees per category",
        matrix.n_rows(),
        matrix.n_cols(),
        params.n_trees
    );
    let forest = MultiOutputForest::fit(&matrix, labels, params, seed)?;
    Ok((features, forest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> ClassifierBuilder {
        let docs = [
            ("need water please", [1, 1]),
            ("send food to the camp", [1, 1]),
            ("we need tents and blankets", [1, 1]),
            ("please help us with medicine", [1, 1]),
            ("give us water now", [1, 1]),
            ("nice weather today", [0, 0]),
            ("the game was fun", [0, 0]),
            ("lovely sunny afternoon", [0, 0]),
            ("the concert was great", [0, 0]),
            ("what a beautiful view", [0, 0]),
        ];
        docs.iter().fold(
            ClassifierBuilder::new()
                .with_categories(["request", "aid_related"])
                .unwrap(),
            |builder, (text, labels)| builder.add_document(*text, labels.to_vec()).unwrap(),
        )
    }

    #[test]
    fn test_add_document_validation() {
        assert!(matches!(
            ClassifierBuilder::new().add_document("x", vec![1]),
            Err(ClassifierError::BuildError(_))
        ));
        let builder = ClassifierBuilder::new().with_categories(["a", "b"]).unwrap();
        assert!(builder.add_document("x", vec![1]).is_err());
        let builder = ClassifierBuilder::new().with_categories(["a", "b"]).unwrap();
        assert!(builder.add_document("x", vec![1, 3]).is_err());
    }

    #[test]
    fn test_build_requires_documents() {
        let builder = ClassifierBuilder::new().with_categories(["a"]).unwrap();
        assert!(matches!(builder.build(), Err(ClassifierError::BuildError(_))));
        assert!(ClassifierBuilder::new().build().is_err());
    }

    #[test]
    fn test_dataset_and_documents_are_exclusive() {
        let dataset = Dataset::from_records(
            CategorySet::new(["a"]).unwrap(),
            vec![("text", vec![1])],
        )
        .unwrap();
        let builder = ClassifierBuilder::new().with_categories(["a"]).unwrap();
        assert!(builder.with_dataset(dataset).is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(corpus().with_test_size(1.5).train().is_err());
        assert!(corpus().with_cv_folds(1).train().is_err());
        let empty = SearchGrid {
            n_trees: vec![],
            weights: vec![(1.0, 1.0)],
        };
        assert!(corpus().with_grid(empty).train().is_err());
    }

    #[test]
    fn test_train_runs_search_and_reports() {
        let outcome = corpus().with_seed(11).train().unwrap();
        assert_eq!(outcome.seed, 11);
        assert_eq!(outcome.search.scores.len(), 4);
        assert_eq!(outcome.report.len(), 2);
        assert_eq!(outcome.report.categories()[0].name, "request");
        assert_eq!(outcome.report.categories()[0].support(), 2);

        let best = &outcome.search.best().point;
        let hyper = outcome.classifier.hyperparameters();
        assert_eq!(hyper.n_trees, best.n_trees);
        assert_eq!(hyper.weights, best.weights);
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let a = corpus().with_seed(5).train().unwrap();
        let b = corpus().with_seed(5).train().unwrap();
        assert_eq!(a.search.scores, b.search.scores);
        let texts = ["need blankets", "sunny game", ""];
        assert_eq!(
            a.classifier.predict_batch(&texts).unwrap(),
            b.classifier.predict_batch(&texts).unwrap()
        );
    }
}
