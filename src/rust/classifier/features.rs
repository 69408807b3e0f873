use serde::{Deserialize, Serialize};

use super::error::ClassifierError;
use super::utils::{FeatureMatrix, SparseRow};
use super::vectorizer::{TfidfVectorizer, VectorizerConfig};
use crate::text::{sentences, LexiconTagger, PosTagger, WordTokenizer};

/// Name of the TF-IDF branch in the standard feature union.
pub const TEXT_BRANCH: &str = "text_pipeline";
/// Name of the starting-verb branch in the standard feature union.
pub const STARTING_VERB_BRANCH: &str = "starting_verb";

/// A fit/transform stage turning documents into feature columns.
///
/// Stages are combined side by side by [`FeatureUnion`]. A stage must produce
/// exactly [`width`](FeatureStage::width) columns per document once fitted,
/// and `transform` must not depend on anything but the fitted state.
pub trait FeatureStage {
    fn fit(&mut self, documents: &[&str]) -> Result<(), ClassifierError>;

    fn transform(&self, documents: &[&str]) -> Result<Vec<SparseRow>, ClassifierError>;

    /// Number of output columns.
    fn width(&self) -> usize;
}

/// Flags documents in which some sentence opens with a base-form or
/// present-tense verb ("Send tents.", "Please help").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingVerbExtractor {
    tokenizer: WordTokenizer,
    tagger: LexiconTagger,
}

impl StartingVerbExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns 1 if any sentence's first token is tagged `VB` or `VBP`, else 0.
    /// Sentences without tokens are skipped.
    pub fn starting_verb(&self, text: &str) -> u8 {
        starting_verb_with(&self.tokenizer, &self.tagger, text)
    }
}

impl FeatureStage for StartingVerbExtractor {
    fn fit(&mut self, _documents: &[&str]) -> Result<(), ClassifierError> {
        Ok(())
    }

    fn transform(&self, documents: &[&str]) -> Result<Vec<SparseRow>, ClassifierError> {
        Ok(documents
            .iter()
            .map(|doc| SparseRow::from_pairs(vec![(0, f64::from(self.starting_verb(doc)))]))
            .collect())
    }

    fn width(&self) -> usize {
        1
    }
}

/// Starting-verb detection with an arbitrary tagger.
pub fn starting_verb_with(tokenizer: &WordTokenizer, tagger: &dyn PosTagger, text: &str) -> u8 {
    for sentence in sentences(text) {
        let tokens = tokenizer.tokenize(sentence);
        let tags = tagger.tag(&tokens);
        if let Some(first) = tags.first() {
            if first.is_base_or_present_verb() {
                return 1;
            }
        }
    }
    0
}

/// Starting-verb detection with the default tokenizer and tagger.
///
/// # Example
/// ```
/// use triage::detect_starting_verb;
///
/// assert_eq!(detect_starting_verb("Send water to the camp."), 1);
/// assert_eq!(detect_starting_verb("The camp has water."), 0);
/// assert_eq!(detect_starting_verb(""), 0);
/// ```
pub fn detect_starting_verb(text: &str) -> u8 {
    StartingVerbExtractor::new().starting_verb(text)
}

impl FeatureStage for TfidfVectorizer {
    fn fit(&mut self, documents: &[&str]) -> Result<(), ClassifierError> {
        TfidfVectorizer::fit(self, documents);
        Ok(())
    }

    fn transform(&self, documents: &[&str]) -> Result<Vec<SparseRow>, ClassifierError> {
        TfidfVectorizer::transform(self, documents)
    }

    fn width(&self) -> usize {
        self.vocabulary_size()
    }
}

/// The stages a persisted pipeline can contain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stage {
    Tfidf(TfidfVectorizer),
    StartingVerb(StartingVerbExtractor),
}

impl Stage {
    fn inner(&self) -> &dyn FeatureStage {
        match self {
            Stage::Tfidf(stage) => stage,
            Stage::StartingVerb(stage) => stage,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FeatureStage {
        match self {
            Stage::Tfidf(stage) => stage,
            Stage::StartingVerb(stage) => stage,
        }
    }
}

impl FeatureStage for Stage {
    fn fit(&mut self, documents: &[&str]) -> Result<(), ClassifierError> {
        self.inner_mut().fit(documents)
    }

    fn transform(&self, documents: &[&str]) -> Result<Vec<SparseRow>, ClassifierError> {
        self.inner().transform(documents)
    }

    fn width(&self) -> usize {
        self.inner().width()
    }
}

/// Per-branch multipliers, keyed by branch name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformerWeights(Vec<(String, f64)>);

impl TransformerWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, branch: impl Into<String>, weight: f64) -> Self {
        let branch = branch.into();
        match self.0.iter_mut().find(|(name, _)| *name == branch) {
            Some(entry) => entry.1 = weight,
            None => self.0.push((branch, weight)),
        }
        self
    }

    /// `{text_pipeline: text, starting_verb: starting_verb}`.
    pub fn standard(text: f64, starting_verb: f64) -> Self {
        Self::new()
            .with(TEXT_BRANCH, text)
            .with(STARTING_VERB_BRANCH, starting_verb)
    }

    pub fn get(&self, branch: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(name, _)| name == branch)
            .map(|&(_, weight)| weight)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, weight)| (name.as_str(), *weight))
    }
}

impl std::fmt::Display for TransformerWeights {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (name, weight)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, weight)?;
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Branch {
    name: String,
    weight: f64,
    stage: Stage,
}

/// Unweighted per-branch outputs for a batch, ready to be combined under any
/// set of weights without re-running the stages.
#[derive(Debug, Clone)]
pub struct BranchOutputs {
    rows: Vec<Vec<SparseRow>>,
    n_docs: usize,
}

impl BranchOutputs {
    pub fn n_docs(&self) -> usize {
        self.n_docs
    }
}

/// Concatenates the outputs of named, weighted stages column-wise, in branch order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureUnion {
    branches: Vec<Branch>,
}

impl FeatureUnion {
    pub fn new() -> Self {
        Self::default()
    }

    /// TF-IDF text columns first, then the starting-verb column.
    pub fn standard(config: VectorizerConfig) -> Self {
        Self::new()
            .with_branch(TEXT_BRANCH, Stage::Tfidf(TfidfVectorizer::new(config)), 1.0)
            .with_branch(
                STARTING_VERB_BRANCH,
                Stage::StartingVerb(StartingVerbExtractor::new()),
                1.0,
            )
    }

    pub fn with_branch(mut self, name: impl Into<String>, stage: Stage, weight: f64) -> Self {
        self.branches.push(Branch {
            name: name.into(),
            weight,
            stage,
        });
        self
    }

    /// Sets the weight of every named branch. Unknown names are rejected.
    pub fn set_weights(&mut self, weights: &TransformerWeights) -> Result<(), ClassifierError> {
        for (name, weight) in weights.iter() {
            let branch = self
                .branches
                .iter_mut()
                .find(|b| b.name == name)
                .ok_or_else(|| {
                    ClassifierError::ValidationError(format!("Unknown feature branch '{}'", name))
                })?;
            if !weight.is_finite() {
                return Err(ClassifierError::ValidationError(format!(
                    "Weight of branch '{}' must be finite, got {}",
                    name, weight
                )));
            }
            branch.weight = weight;
        }
        Ok(())
    }

    pub fn weights(&self) -> TransformerWeights {
        self.branches
            .iter()
            .fold(TransformerWeights::new(), |acc, b| acc.with(b.name.clone(), b.weight))
    }

    pub fn branch_names(&self) -> impl Iterator<Item = &str> {
        self.branches.iter().map(|b| b.name.as_str())
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.branches.iter().find(|b| b.name == name).map(|b| &b.stage)
    }

    pub fn width(&self) -> usize {
        self.branches.iter().map(|b| b.stage.width()).sum()
    }

    pub fn fit(&mut self, documents: &[&str]) -> Result<(), ClassifierError> {
        for branch in &mut self.branches {
            branch.stage.fit(documents)?;
        }
        Ok(())
    }

    /// Runs every stage without applying weights.
    pub fn transform_branches(&self, documents: &[&str]) -> Result<BranchOutputs, ClassifierError> {
        let rows = self
            .branches
            .iter()
            .map(|b| b.stage.transform(documents))
            .collect::<Result<Vec<_>, _>>()?;
        for (branch, output) in self.branches.iter().zip(&rows) {
            if output.len() != documents.len() {
                return Err(ClassifierError::ModelError(format!(
                    "Branch '{}' produced {} rows for {} documents",
                    branch.name,
                    output.len(),
                    documents.len()
                )));
            }
        }
        Ok(BranchOutputs {
            rows,
            n_docs: documents.len(),
        })
    }

    /// Scales each branch by `weights` (falling back to the branch's own
    /// weight) and concatenates.
    pub fn combine(&self, outputs: &BranchOutputs, weights: Option<&TransformerWeights>) -> FeatureMatrix {
        let mut combined = vec![SparseRow::new(); outputs.n_docs];
        let mut offset = 0;
        for (branch, rows) in self.branches.iter().zip(&outputs.rows) {
            let weight = weights
                .and_then(|w| w.get(&branch.name))
                .unwrap_or(branch.weight);
            for (target, row) in combined.iter_mut().zip(rows) {
                target.extend_shifted(row, offset, weight);
            }
            offset += branch.stage.width();
        }
        FeatureMatrix::new(combined, offset)
    }

    pub fn transform(&self, documents: &[&str]) -> Result<FeatureMatrix, ClassifierError> {
        let outputs = self.transform_branches(documents)?;
        Ok(self.combine(&outputs, None))
    }

    pub fn fit_transform(&mut self, documents: &[&str]) -> Result<FeatureMatrix, ClassifierError> {
        self.fit(documents)?;
        self.transform(documents)
    }

    pub(crate) fn validate(&self) -> Result<(), ClassifierError> {
        if self.branches.is_empty() {
            return Err(ClassifierError::ModelError("Feature union has no branches".into()));
        }
        for branch in &self.branches {
            if let Stage::Tfidf(vectorizer) = &branch.stage {
                vectorizer.validate()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starting_verb_detection() {
        assert_eq!(detect_starting_verb("Need water"), 1);
        assert_eq!(detect_starting_verb("nice weather today"), 0);
        assert_eq!(detect_starting_verb("Water is needed. Please send tents."), 1);
        assert_eq!(detect_starting_verb("We need food"), 0);
    }

    #[test]
    fn test_starting_verb_skips_empty_sentences() {
        assert_eq!(detect_starting_verb(""), 0);
        assert_eq!(detect_starting_verb("   "), 0);
        assert_eq!(detect_starting_verb("\n\nHelp us"), 1);
        assert_eq!(detect_starting_verb("\u{feff}Send it"), 1);
    }

    #[test]
    fn test_starting_verb_with_custom_tagger() {
        struct AlwaysVerb;
        impl PosTagger for AlwaysVerb {
            fn tag(&self, tokens: &[String]) -> Vec<crate::text::PosTag> {
                vec![crate::text::PosTag::VBP; tokens.len()]
            }
        }
        let tokenizer = WordTokenizer::new();
        assert_eq!(starting_verb_with(&tokenizer, &AlwaysVerb, "the sky"), 1);
        assert_eq!(starting_verb_with(&tokenizer, &AlwaysVerb, ""), 0);
    }

    #[test]
    fn test_union_column_layout() {
        let docs = ["need water", "nice weather today"];
        let mut union = FeatureUnion::standard(VectorizerConfig::default());
        let matrix = union.fit_transform(&docs).unwrap();
        assert_eq!(union.width(), 6);
        assert_eq!(matrix.n_cols(), 6);
        assert_eq!(matrix.row(0).get(5), 1.0);
        assert_eq!(matrix.row(1).get(5), 0.0);
    }

    #[test]
    fn test_weights_scale_branches_before_concatenation() {
        let docs = ["need water"];
        let mut union = FeatureUnion::standard(VectorizerConfig::default());
        union.fit(&docs).unwrap();
        union
            .set_weights(&TransformerWeights::standard(0.5, 1.0))
            .unwrap();
        let weighted = union.transform(&docs).unwrap();
        let outputs = union.transform_branches(&docs).unwrap();
        let unit = union.combine(&outputs, Some(&TransformerWeights::standard(1.0, 1.0)));
        for col in 0..2 {
            assert!((weighted.row(0).get(col) - 0.5 * unit.row(0).get(col)).abs() < 1e-12);
        }
        assert_eq!(weighted.row(0).get(2), 1.0);
    }

    #[test]
    fn test_unknown_branch_weight_rejected() {
        let mut union = FeatureUnion::standard(VectorizerConfig::default());
        let weights = TransformerWeights::new().with("nope", 1.0);
        assert!(matches!(
            union.set_weights(&weights),
            Err(ClassifierError::ValidationError(_))
        ));
    }

    #[test]
    fn test_weights_display() {
        assert_eq!(
            TransformerWeights::standard(1.0, 0.5).to_string(),
            "{text_pipeline: 1, starting_verb: 0.5}"
        );
    }
}
