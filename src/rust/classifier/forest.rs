//! Random forests of fully grown CART trees, one forest per output column.
//!
//! Trees split on Gini impurity over a random subset of the features present
//! in the node. Every random draw comes from a per-tree `StdRng` seeded from
//! the forest seed and the tree index, so a fit is reproducible regardless of
//! how rayon schedules the work.

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;
use super::utils::{derive_seed, FeatureMatrix, SparseRow};

/// How many features a split considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// `floor(sqrt(d))`, at least one
    Sqrt,
    All,
    Fixed(usize),
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let k = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Fixed(k) => *k,
        };
        k.clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees per forest
    pub n_trees: usize,
    pub max_features: MaxFeatures,
    /// Nodes with fewer samples become leaves
    pub min_samples_split: usize,
    /// `None` grows until leaves are pure
    pub max_depth: Option<usize>,
    /// Sample rows with replacement for each tree
    pub bootstrap: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 10,
            max_features: MaxFeatures::Sqrt,
            min_samples_split: 2,
            max_depth: None,
            bootstrap: true,
        }
    }
}

impl ForestParams {
    pub fn with_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClassifierError> {
        if self.n_trees == 0 {
            return Err(ClassifierError::ValidationError(
                "A forest needs at least one tree".into(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(ClassifierError::ValidationError(format!(
                "min_samples_split must be at least 2, got {}",
                self.min_samples_split
            )));
        }
        if let MaxFeatures::Fixed(0) = self.max_features {
            return Err(ClassifierError::ValidationError(
                "max_features must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    /// Fraction of positive training samples that reached the leaf
    Leaf { value: f64 },
    /// `value <= threshold` goes left
    Split {
        feature: u32,
        threshold: f64,
        left: u32,
        right: u32,
    },
}

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f64,
}

struct Pending {
    node: usize,
    samples: Vec<usize>,
    depth: usize,
}

/// Binary CART tree stored as a flat node arena, root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Grows a tree on `samples` (row indices into `rows`, repeats allowed).
    pub fn fit(
        rows: &[SparseRow],
        labels: &[u8],
        samples: Vec<usize>,
        n_features: usize,
        params: &ForestParams,
        rng: &mut StdRng,
    ) -> Self {
        let max_features = params.max_features.resolve(n_features);
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut stack = vec![Pending {
            node: 0,
            samples,
            depth: 0,
        }];

        while let Some(Pending {
            node,
            samples,
            depth,
        }) = stack.pop()
        {
            let positives = samples.iter().filter(|&&s| labels[s] == 1).count();
            let value = if samples.is_empty() {
                0.0
            } else {
                positives as f64 / samples.len() as f64
            };

            let pure = positives == 0 || positives == samples.len();
            let too_deep = params.max_depth.is_some_and(|max| depth >= max);
            if pure || too_deep || samples.len() < params.min_samples_split {
                nodes[node] = Node::Leaf { value };
                continue;
            }

            let Some(split) = best_split(rows, labels, &samples, positives, max_features, rng) else {
                nodes[node] = Node::Leaf { value };
                continue;
            };

            let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
                .iter()
                .partition(|&&s| rows[s].get(split.feature) <= split.threshold);

            let left = nodes.len();
            nodes.push(Node::Leaf { value: 0.0 });
            let right = nodes.len();
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[node] = Node::Split {
                feature: split.feature as u32,
                threshold: split.threshold,
                left: left as u32,
                right: right as u32,
            };

            stack.push(Pending {
                node: right,
                samples: right_samples,
                depth: depth + 1,
            });
            stack.push(Pending {
                node: left,
                samples: left_samples,
                depth: depth + 1,
            });
        }

        Self { nodes }
    }

    /// Positive-class probability for one row.
    pub fn predict_proba(&self, row: &SparseRow) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row.get(*feature as usize) <= *threshold {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => {
                    1 + walk(nodes, *left as usize).max(walk(nodes, *right as usize))
                }
            }
        }
        walk(&self.nodes, 0)
    }

    /// Checks arena links and feature indices against the feature width.
    fn validate(&self, n_features: usize) -> Result<(), ClassifierError> {
        if self.nodes.is_empty() {
            return Err(ClassifierError::ModelError("Tree has no nodes".into()));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value } if !(0.0..=1.0).contains(value) => {
                    return Err(ClassifierError::ModelError(format!(
                        "Leaf {} has probability {} outside [0, 1]",
                        index, value
                    )));
                }
                Node::Leaf { .. } => {}
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    let in_bounds = |child: u32| {
                        (child as usize) > index && (child as usize) < self.nodes.len()
                    };
                    if *feature as usize >= n_features || !in_bounds(*left) || !in_bounds(*right) {
                        return Err(ClassifierError::ModelError(format!(
                            "Malformed split at node {}",
                            index
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn gini(negatives: usize, positives: usize) -> f64 {
    let n = (negatives + positives) as f64;
    if n == 0.0 {
        return 0.0;
    }
    let p0 = negatives as f64 / n;
    let p1 = positives as f64 / n;
    1.0 - p0 * p0 - p1 * p1
}

/// Distinct values of one feature in a node with their class counts, ascending.
fn value_histogram(
    nonzero: &[(f64, u8)],
    n_samples: usize,
    positives: usize,
) -> Vec<(f64, usize, usize)> {
    let mut points: Vec<(f64, u8)> = nonzero.to_vec();
    let nonzero_positives = nonzero.iter().filter(|&&(_, y)| y == 1).count();
    let zero_count = n_samples - nonzero.len();
    let zero_positives = positives - nonzero_positives;
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut histogram: Vec<(f64, usize, usize)> = Vec::new();
    let mut zero_pending = zero_count > 0;
    let zero_block = (0.0, zero_count - zero_positives, zero_positives);
    for (value, label) in points {
        if zero_pending && value > 0.0 {
            histogram.push(zero_block);
            zero_pending = false;
        }
        match histogram.last_mut() {
            Some(last) if last.0 == value => {
                if label == 1 {
                    last.2 += 1;
                } else {
                    last.1 += 1;
                }
            }
            _ => histogram.push((value, usize::from(label != 1), usize::from(label == 1))),
        }
    }
    if zero_pending {
        histogram.push(zero_block);
    }
    histogram
}

/// Lowest weighted child impurity over the thresholds of one feature, if the
/// feature takes more than one value in the node.
fn best_threshold(histogram: &[(f64, usize, usize)], n_samples: usize, positives: usize) -> Option<(f64, f64)> {
    if histogram.len() < 2 {
        return None;
    }
    let negatives = n_samples - positives;
    let mut left_neg = 0;
    let mut left_pos = 0;
    let mut best: Option<(f64, f64)> = None;
    for pair in histogram.windows(2) {
        let (lo, neg, pos) = pair[0];
        let hi = pair[1].0;
        left_neg += neg;
        left_pos += pos;
        let left_n = left_neg + left_pos;
        let right_n = n_samples - left_n;
        let impurity = (left_n as f64 * gini(left_neg, left_pos)
            + right_n as f64 * gini(negatives - left_neg, positives - left_pos))
            / n_samples as f64;

        let mut threshold = lo + (hi - lo) / 2.0;
        if threshold >= hi {
            threshold = lo;
        }
        if best.map_or(true, |(score, _)| impurity < score) {
            best = Some((impurity, threshold));
        }
    }
    best
}

fn best_split(
    rows: &[SparseRow],
    labels: &[u8],
    samples: &[usize],
    positives: usize,
    max_features: usize,
    rng: &mut StdRng,
) -> Option<Split> {
    // Features absent from every row in the node are constant at zero and never split.
    let mut columns: BTreeMap<usize, Vec<(f64, u8)>> = BTreeMap::new();
    for &s in samples {
        for (col, value) in rows[s].iter() {
            columns.entry(col).or_default().push((value, labels[s]));
        }
    }
    let mut candidates: Vec<usize> = columns.keys().copied().collect();

    let mut best: Option<(f64, Split)> = None;
    let mut evaluated = 0;
    let mut i = 0;
    while i < candidates.len() && evaluated < max_features {
        let j = rng.random_range(i..candidates.len());
        candidates.swap(i, j);
        let feature = candidates[i];
        i += 1;

        let histogram = value_histogram(&columns[&feature], samples.len(), positives);
        let Some((impurity, threshold)) = best_threshold(&histogram, samples.len(), positives) else {
            continue;
        };
        evaluated += 1;
        if best.map_or(true, |(score, _)| impurity < score) {
            best = Some((impurity, Split { feature, threshold }));
        }
    }
    best.map(|(_, split)| split)
}

/// Bootstrap sample that keeps the class balance of the column: positives and
/// negatives are resampled separately, each with replacement.
fn stratified_bootstrap(labels: &[u8], rng: &mut StdRng) -> Vec<usize> {
    let (positives, negatives): (Vec<usize>, Vec<usize>) =
        (0..labels.len()).partition(|&i| labels[i] == 1);
    let mut samples = Vec::with_capacity(labels.len());
    for group in [&negatives, &positives] {
        for _ in 0..group.len() {
            samples.push(group[rng.random_range(0..group.len())]);
        }
    }
    samples
}

/// Bagged trees for one binary output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn fit(
        matrix: &FeatureMatrix,
        labels: &[u8],
        params: &ForestParams,
        seed: u64,
    ) -> Result<Self, ClassifierError> {
        params.validate()?;
        if matrix.n_rows() == 0 {
            return Err(ClassifierError::ValidationError(
                "Cannot fit a forest on zero rows".into(),
            ));
        }
        if labels.len() != matrix.n_rows() {
            return Err(ClassifierError::ValidationError(format!(
                "{} labels for {} rows",
                labels.len(),
                matrix.n_rows()
            )));
        }

        let trees = (0..params.n_trees)
            .into_par_iter()
            .map(|index| {
                let mut rng = StdRng::seed_from_u64(derive_seed(seed, index as u64));
                let samples = if params.bootstrap {
                    stratified_bootstrap(labels, &mut rng)
                } else {
                    (0..labels.len()).collect()
                };
                DecisionTree::fit(matrix.rows(), labels, samples, matrix.n_cols(), params, &mut rng)
            })
            .collect();
        Ok(Self { trees })
    }

    /// Mean positive-class probability over the trees.
    pub fn predict_proba(&self, row: &SparseRow) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|tree| tree.predict_proba(row)).sum();
        total / self.trees.len() as f64
    }

    pub fn predict(&self, row: &SparseRow) -> u8 {
        u8::from(self.predict_proba(row) > 0.5)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }
}

/// One independent [`RandomForest`] per label column over a shared feature matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiOutputForest {
    forests: Vec<RandomForest>,
    n_features: usize,
    params: ForestParams,
}

impl MultiOutputForest {
    /// Fits `labels.ncols()` forests. Labels must be 0 or 1.
    pub fn fit(
        matrix: &FeatureMatrix,
        labels: &Array2<u8>,
        params: ForestParams,
        seed: u64,
    ) -> Result<Self, ClassifierError> {
        if labels.nrows() != matrix.n_rows() {
            return Err(ClassifierError::ValidationError(format!(
                "Label matrix has {} rows, feature matrix has {}",
                labels.nrows(),
                matrix.n_rows()
            )));
        }
        if labels.ncols() == 0 {
            return Err(ClassifierError::ValidationError(
                "At least one output column is required".into(),
            ));
        }
        if labels.iter().any(|&y| y > 1) {
            return Err(ClassifierError::ValidationError(
                "Labels must be 0 or 1".into(),
            ));
        }

        let columns: Vec<ArrayView1<u8>> = labels.columns().into_iter().collect();
        let forests = columns
            .par_iter()
            .enumerate()
            .map(|(output, column)| {
                let column = column.to_vec();
                RandomForest::fit(matrix, &column, &params, derive_seed(seed, output as u64))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            forests,
            n_features: matrix.n_cols(),
            params,
        })
    }

    /// Predicted label vector for one row.
    pub fn predict_row(&self, row: &SparseRow) -> Vec<u8> {
        self.forests.iter().map(|forest| forest.predict(row)).collect()
    }

    /// `n_rows x n_outputs` matrix of predicted labels.
    pub fn predict(&self, matrix: &FeatureMatrix) -> Result<Array2<u8>, ClassifierError> {
        if matrix.n_cols() != self.n_features {
            return Err(ClassifierError::PredictionError(format!(
                "Expected {} feature columns, got {}",
                self.n_features,
                matrix.n_cols()
            )));
        }
        let mut predictions = Array2::zeros((matrix.n_rows(), self.forests.len()));
        for (r, row) in matrix.rows().iter().enumerate() {
            for (c, forest) in self.forests.iter().enumerate() {
                predictions[[r, c]] = forest.predict(row);
            }
        }
        Ok(predictions)
    }

    pub fn n_outputs(&self) -> usize {
        self.forests.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn forests(&self) -> &[RandomForest] {
        &self.forests
    }

    pub(crate) fn validate(&self) -> Result<(), ClassifierError> {
        for forest in &self.forests {
            if forest.trees.is_empty() {
                return Err(ClassifierError::ModelError("Forest has no trees".into()));
            }
            for tree in &forest.trees {
                tree.validate(self.n_features)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn matrix(rows: Vec<Vec<(usize, f64)>>, n_cols: usize) -> FeatureMatrix {
        FeatureMatrix::new(rows.into_iter().map(SparseRow::from_pairs).collect(), n_cols)
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(6), 2);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
        assert_eq!(MaxFeatures::Sqrt.resolve(0), 1);
        assert_eq!(MaxFeatures::All.resolve(7), 7);
        assert_eq!(MaxFeatures::Fixed(50).resolve(7), 7);
    }

    #[test]
    fn test_histogram_places_zero_block_in_order() {
        let histogram = value_histogram(&[(0.5, 1), (-1.0, 0), (0.5, 0)], 5, 2);
        assert_eq!(histogram, vec![(-1.0, 1, 0), (0.0, 1, 1), (0.5, 1, 1)]);
    }

    #[test]
    fn test_threshold_separates_pure_classes() {
        let histogram = vec![(0.0, 3, 0), (1.0, 0, 2)];
        let (impurity, threshold) = best_threshold(&histogram, 5, 2).unwrap();
        assert_eq!(impurity, 0.0);
        assert_eq!(threshold, 0.5);
        assert!(best_threshold(&[(0.0, 3, 2)], 5, 2).is_none());
    }

    #[test]
    fn test_tree_memorizes_training_rows() {
        let x = matrix(
            vec![
                vec![(0, 1.0)],
                vec![(1, 1.0)],
                vec![(0, 1.0), (2, 0.3)],
                vec![(2, 0.9)],
            ],
            3,
        );
        let labels = [1, 0, 1, 0];
        let params = ForestParams {
            max_features: MaxFeatures::All,
            ..ForestParams::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let tree = DecisionTree::fit(x.rows(), &labels, vec![0, 1, 2, 3], 3, &params, &mut rng);
        for (row, &label) in x.rows().iter().zip(&labels) {
            assert_eq!(tree.predict_proba(row), f64::from(label));
        }
        assert!(tree.validate(3).is_ok());
    }

    #[test]
    fn test_max_depth_zero_gives_single_leaf() {
        let x = matrix(vec![vec![(0, 1.0)], vec![]], 1);
        let params = ForestParams {
            max_depth: Some(0),
            ..ForestParams::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let tree = DecisionTree::fit(x.rows(), &[1, 0], vec![0, 1], 1, &params, &mut rng);
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.predict_proba(x.row(0)), 0.5);
    }

    #[test]
    fn test_stratified_bootstrap_keeps_class_counts() {
        let labels = [1, 0, 0, 1, 0];
        let mut rng = StdRng::seed_from_u64(9);
        let samples = stratified_bootstrap(&labels, &mut rng);
        assert_eq!(samples.len(), 5);
        assert_eq!(samples.iter().filter(|&&s| labels[s] == 1).count(), 2);
    }

    #[test]
    fn test_multi_output_fit_is_reproducible() {
        let x = matrix(
            vec![
                vec![(0, 1.0), (3, 1.0)],
                vec![(1, 1.0)],
                vec![(0, 0.5), (2, 1.0)],
                vec![(2, 1.0), (3, 1.0)],
            ],
            4,
        );
        let y = array![[1, 0], [0, 0], [1, 1], [0, 1]];
        let a = MultiOutputForest::fit(&x, &y, ForestParams::default(), 42).unwrap();
        let b = MultiOutputForest::fit(&x, &y, ForestParams::default(), 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.n_outputs(), 2);
        assert_eq!(a.predict(&x).unwrap().shape(), &[4, 2]);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_two_document_corpus_is_memorized() {
        let x = matrix(vec![vec![(0, 0.7), (1, 0.7), (2, 1.0)], vec![(3, 1.0)]], 4);
        let y = array![[1, 1], [0, 0]];
        for seed in 0..5 {
            let forest = MultiOutputForest::fit(&x, &y, ForestParams::default(), seed).unwrap();
            assert_eq!(forest.predict_row(x.row(0)), vec![1, 1]);
            assert_eq!(forest.predict_row(x.row(1)), vec![0, 0]);
        }
    }

    #[test]
    fn test_single_class_column_predicts_zero() {
        let x = matrix(vec![vec![(0, 1.0)], vec![(1, 1.0)]], 2);
        let y = array![[0], [0]];
        let forest = MultiOutputForest::fit(&x, &y, ForestParams::default(), 3).unwrap();
        assert_eq!(forest.predict(&x).unwrap(), array![[0u8], [0]]);
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        let x = matrix(vec![vec![(0, 1.0)]], 1);
        assert!(MultiOutputForest::fit(&x, &array![[2]], ForestParams::default(), 0).is_err());
        assert!(MultiOutputForest::fit(&x, &array![[1], [0]], ForestParams::default(), 0).is_err());
        let no_trees = ForestParams::default().with_trees(0);
        assert!(MultiOutputForest::fit(&x, &array![[1]], no_trees, 0).is_err());

        let forest = MultiOutputForest::fit(&x, &array![[1]], ForestParams::default(), 0).unwrap();
        assert!(matches!(
            forest.predict(&matrix(vec![vec![]], 2)),
            Err(ClassifierError::PredictionError(_))
        ));
    }
}
