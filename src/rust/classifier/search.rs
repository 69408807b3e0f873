//! Exhaustive grid search scored by k-fold cross-validation.

use log::{debug, info, warn};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;
use super::features::{BranchOutputs, FeatureUnion, TransformerWeights};
use super::forest::{ForestParams, MultiOutputForest};
use super::metrics::subset_accuracy;
use super::utils::derive_seed;

/// One combination of hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub n_trees: usize,
    pub weights: TransformerWeights,
}

impl std::fmt::Display for GridPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n_trees={}, weights={}", self.n_trees, self.weights)
    }
}

/// Values searched for each hyperparameter. Points are enumerated with the
/// ensemble size as the outer loop and the weight pairs as the inner loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchGrid {
    pub n_trees: Vec<usize>,
    /// `(text_pipeline, starting_verb)` weight pairs
    pub weights: Vec<(f64, f64)>,
}

impl Default for SearchGrid {
    fn default() -> Self {
        Self {
            n_trees: vec![10, 20],
            weights: vec![(1.0, 0.5), (0.5, 1.0)],
        }
    }
}

impl SearchGrid {
    pub fn points(&self) -> Vec<GridPoint> {
        self.n_trees
            .iter()
            .flat_map(|&n_trees| {
                self.weights.iter().map(move |&(text, verb)| GridPoint {
                    n_trees,
                    weights: TransformerWeights::standard(text, verb),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.n_trees.len() * self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Contiguous, unshuffled folds. The first `n % k` folds hold one extra row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    n_splits: usize,
}

impl KFold {
    pub fn new(n_splits: usize) -> Result<Self, ClassifierError> {
        if n_splits < 2 {
            return Err(ClassifierError::ValidationError(format!(
                "Cross-validation needs at least 2 folds, got {}",
                n_splits
            )));
        }
        Ok(Self { n_splits })
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// `(train, test)` row indices for each fold.
    pub fn split(&self, n_samples: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>, ClassifierError> {
        if n_samples < self.n_splits {
            return Err(ClassifierError::ValidationError(format!(
                "Cannot make {} folds from {} samples",
                self.n_splits, n_samples
            )));
        }
        let base = n_samples / self.n_splits;
        let extra = n_samples % self.n_splits;
        let mut start = 0;
        let mut folds = Vec::with_capacity(self.n_splits);
        for fold in 0..self.n_splits {
            let size = base + usize::from(fold < extra);
            let end = start + size;
            let test: Vec<usize> = (start..end).collect();
            let train: Vec<usize> = (0..start).chain(end..n_samples).collect();
            folds.push((train, test));
            start = end;
        }
        Ok(folds)
    }
}

/// Cross-validation scores of one grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridScore {
    pub point: GridPoint,
    pub fold_scores: Vec<f64>,
    pub mean: f64,
}

/// All scores, in grid order, and the index of the selected point.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub scores: Vec<GridScore>,
    pub best_index: usize,
}

impl SearchOutcome {
    pub fn best(&self) -> &GridScore {
        &self.scores[self.best_index]
    }
}

/// Index of the highest score. Equal scores keep the earliest index and NaN
/// never wins.
pub fn select_best(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, &score) in scores.iter().enumerate() {
        match best {
            None => best = Some((index, score)),
            Some((_, current)) if score > current || (current.is_nan() && !score.is_nan()) => {
                best = Some((index, score))
            }
            Some(_) => {}
        }
    }
    best.map(|(index, _)| index)
}

/// Grid search over forest size and feature-union weights.
#[derive(Debug, Clone)]
pub struct GridSearch {
    grid: SearchGrid,
    folds: KFold,
    forest: ForestParams,
    seed: u64,
}

impl GridSearch {
    pub fn new(grid: SearchGrid, folds: KFold, forest: ForestParams, seed: u64) -> Self {
        Self {
            grid,
            folds,
            forest,
            seed,
        }
    }

    /// Scores every grid point and returns them with the winner.
    ///
    /// `union` is an unfitted template; each fold fits its own copy on the
    /// fold's training rows. A fold that fails to fit or predict is logged and
    /// scored 0 for the affected points instead of aborting the search.
    pub fn run(
        &self,
        union: &FeatureUnion,
        documents: &[&str],
        labels: &Array2<u8>,
    ) -> Result<SearchOutcome, ClassifierError> {
        if self.grid.is_empty() {
            return Err(ClassifierError::ValidationError("Search grid is empty".into()));
        }
        if labels.nrows() != documents.len() {
            return Err(ClassifierError::ValidationError(format!(
                "{} label rows for {} documents",
                labels.nrows(),
                documents.len()
            )));
        }

        let points = self.grid.points();
        let folds = self.folds.split(documents.len())?;
        let mut fold_scores = vec![Vec::with_capacity(folds.len()); points.len()];

        for (fold, (train, test)) in folds.iter().enumerate() {
            let scores = self.score_fold(fold, union, &points, documents, labels, train, test);
            for (point_scores, score) in fold_scores.iter_mut().zip(scores) {
                point_scores.push(score);
            }
        }

        let scores: Vec<GridScore> = points
            .into_iter()
            .zip(fold_scores)
            .map(|(point, fold_scores)| {
                let mean = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
                info!("Grid point {}: fold scores {:?}, mean {:.4}", point, fold_scores, mean);
                GridScore {
                    point,
                    fold_scores,
                    mean,
                }
            })
            .collect();

        let means: Vec<f64> = scores.iter().map(|s| s.mean).collect();
        let best_index = select_best(&means)
            .ok_or_else(|| ClassifierError::ValidationError("Search grid is empty".into()))?;
        info!("Selected {} (mean score {:.4})", scores[best_index].point, scores[best_index].mean);

        Ok(SearchOutcome { scores, best_index })
    }

    #[allow(clippy::too_many_arguments)]
    fn score_fold(
        &self,
        fold: usize,
        union: &FeatureUnion,
        points: &[GridPoint],
        documents: &[&str],
        labels: &Array2<u8>,
        train: &[usize],
        test: &[usize],
    ) -> Vec<f64> {
        let train_docs: Vec<&str> = train.iter().map(|&i| documents[i]).collect();
        let test_docs: Vec<&str> = test.iter().map(|&i| documents[i]).collect();
        let train_labels = labels.select(Axis(0), train);
        let test_labels = labels.select(Axis(0), test);

        let mut fold_union = union.clone();
        let outputs = fold_union.fit(&train_docs).and_then(|()| {
            Ok((
                fold_union.transform_branches(&train_docs)?,
                fold_union.transform_branches(&test_docs)?,
            ))
        });
        let (train_out, test_out) = match outputs {
            Ok(outputs) => outputs,
            Err(e) => {
                warn!("Fold {} could not be vectorized, scoring 0: {}", fold, e);
                return vec![0.0; points.len()];
            }
        };

        // Every point on a fold shares one seed so that points differing only
        // in weights are compared on the same bootstrap draws.
        let seed = derive_seed(self.seed, fold as u64);
        points
            .iter()
            .map(|point| {
                match self.score_point(&fold_union, point, &train_out, &test_out, &train_labels, &test_labels, seed) {
                    Ok(score) => {
                        debug!("Fold {} {}: {:.4}", fold, point, score);
                        score
                    }
                    Err(e) => {
                        warn!("Fold {} failed for {}, scoring 0: {}", fold, point, e);
                        0.0
                    }
                }
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn score_point(
        &self,
        union: &FeatureUnion,
        point: &GridPoint,
        train: &BranchOutputs,
        test: &BranchOutputs,
        train_labels: &Array2<u8>,
        test_labels: &Array2<u8>,
        seed: u64,
    ) -> Result<f64, ClassifierError> {
        let train_matrix = union.combine(train, Some(&point.weights));
        let test_matrix = union.combine(test, Some(&point.weights));
        let params = self.forest.with_trees(point.n_trees);
        let forest = MultiOutputForest::fit(&train_matrix, train_labels, params, seed)?;
        let predicted = forest.predict(&test_matrix)?;
        Ok(subset_accuracy(test_labels, &predicted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::vectorizer::VectorizerConfig;
    use ndarray::array;

    #[test]
    fn test_default_grid_order() {
        let points = SearchGrid::default().points();
        assert_eq!(points.len(), 4);
        assert_eq!(points[0].n_trees, 10);
        assert_eq!(points[0].weights, TransformerWeights::standard(1.0, 0.5));
        assert_eq!(points[1].n_trees, 10);
        assert_eq!(points[1].weights, TransformerWeights::standard(0.5, 1.0));
        assert_eq!(points[2].n_trees, 20);
        assert_eq!(points[3].weights, TransformerWeights::standard(0.5, 1.0));
    }

    #[test]
    fn test_kfold_contiguous_and_covering() {
        let folds = KFold::new(2).unwrap().split(5).unwrap();
        assert_eq!(folds[0].1, vec![0, 1, 2]);
        assert_eq!(folds[0].0, vec![3, 4]);
        assert_eq!(folds[1].1, vec![3, 4]);
        assert_eq!(folds[1].0, vec![0, 1, 2]);
    }

    #[test]
    fn test_kfold_rejects_bad_sizes() {
        assert!(KFold::new(1).is_err());
        assert!(KFold::new(3).unwrap().split(2).is_err());
    }

    #[test]
    fn test_select_best_prefers_first_of_ties() {
        assert_eq!(select_best(&[0.5, 0.7, 0.7, 0.1]), Some(1));
        assert_eq!(select_best(&[0.25, 0.25]), Some(0));
        assert_eq!(select_best(&[f64::NAN, 0.0]), Some(1));
        assert_eq!(select_best(&[]), None);
    }

    #[test]
    fn test_weight_pairs_tie_and_first_wins() {
        let documents = [
            "need water please",
            "send food to the camp",
            "nice weather today",
            "the game was fun",
            "we need tents and water",
            "lovely sunny afternoon",
            "please help us with food",
            "the concert was great",
        ];
        let labels = array![[1u8], [1], [0], [0], [1], [0], [1], [0]];
        let union = FeatureUnion::standard(VectorizerConfig::default());
        let search = GridSearch::new(SearchGrid::default(), KFold::new(2).unwrap(), ForestParams::default(), 7);
        let outcome = search.run(&union, &documents, &labels).unwrap();

        assert_eq!(outcome.scores.len(), 4);
        assert_eq!(outcome.scores[0].mean, outcome.scores[1].mean);
        assert_eq!(outcome.scores[2].mean, outcome.scores[3].mean);
        let means: Vec<f64> = outcome.scores.iter().map(|s| s.mean).collect();
        assert_eq!(Some(outcome.best_index), select_best(&means));
        let expected = if outcome.scores[0].mean >= outcome.scores[2].mean { 0 } else { 2 };
        assert_eq!(outcome.best_index, expected);
    }

    #[test]
    fn test_repeated_grid_point_keeps_first() {
        let documents = ["need water", "nice day", "send food", "fun game"];
        let labels = array![[1u8], [0], [1], [0]];
        let union = FeatureUnion::standard(VectorizerConfig::default());
        let grid = SearchGrid {
            n_trees: vec![5],
            weights: vec![(1.0, 1.0), (1.0, 1.0), (1.0, 1.0)],
        };
        let search = GridSearch::new(grid, KFold::new(2).unwrap(), ForestParams::default(), 11);
        let outcome = search.run(&union, &documents, &labels).unwrap();

        assert_eq!(outcome.scores.len(), 3);
        assert_eq!(outcome.scores[0].fold_scores, outcome.scores[1].fold_scores);
        assert_eq!(outcome.scores[1].fold_scores, outcome.scores[2].fold_scores);
        assert_eq!(outcome.best_index, 0);
    }

    #[test]
    fn test_degenerate_fold_is_scored_not_fatal() {
        // The first fold's training rows are all negative.
        let documents = ["help", "water", "sun", "rain"];
        let labels = array![[1u8], [1], [0], [0]];
        let union = FeatureUnion::standard(VectorizerConfig::default());
        let grid = SearchGrid {
            n_trees: vec![3],
            weights: vec![(1.0, 1.0)],
        };
        let search = GridSearch::new(grid, KFold::new(2).unwrap(), ForestParams::default(), 1);
        let outcome = search.run(&union, &documents, &labels).unwrap();
        assert_eq!(outcome.scores[0].fold_scores.len(), 2);
        assert_eq!(outcome.best_index, 0);
    }
}
