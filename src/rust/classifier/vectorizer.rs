//! Bag-of-words counting followed by inverse-document-frequency reweighting.
//!
//! Both stages are fitted once on the training corpus and frozen. Tokens that
//! were not seen at fit time contribute nothing to later documents.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::error::ClassifierError;
use super::utils::SparseRow;
use crate::text::WordTokenizer;

/// Row normalization applied after IDF weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Norm {
    L1,
    L2,
}

/// Settings of the text branch. Persisted with the fitted pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    /// Lowercase documents before tokenizing them for counting
    pub lowercase: bool,
    /// Per-row normalization of the weighted vector
    pub norm: Option<Norm>,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            norm: Some(Norm::L2),
        }
    }
}

/// Stage A: token counts over a vocabulary learned at fit time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountVectorizer {
    tokenizer: WordTokenizer,
    lowercase: bool,
    vocabulary: HashMap<String, usize>,
}

impl CountVectorizer {
    pub fn new(lowercase: bool) -> Self {
        Self {
            tokenizer: WordTokenizer::new(),
            lowercase,
            vocabulary: HashMap::new(),
        }
    }

    fn analyze(&self, document: &str) -> Vec<String> {
        if self.lowercase {
            self.tokenizer.tokenize(&document.to_lowercase())
        } else {
            self.tokenizer.tokenize(document)
        }
    }

    /// Learns the vocabulary. Columns are assigned in sorted token order so the
    /// layout does not depend on document order.
    pub fn fit(&mut self, documents: &[&str]) {
        let terms: BTreeSet<String> = documents
            .iter()
            .flat_map(|doc| self.analyze(doc))
            .collect();
        self.vocabulary = terms
            .into_iter()
            .enumerate()
            .map(|(index, term)| (term, index))
            .collect();
    }

    pub fn transform_one(&self, document: &str) -> SparseRow {
        let pairs = self
            .analyze(document)
            .into_iter()
            .filter_map(|token| self.vocabulary.get(&token).map(|&col| (col, 1.0)))
            .collect();
        SparseRow::from_pairs(pairs)
    }

    pub fn transform(&self, documents: &[&str]) -> Vec<SparseRow> {
        documents.iter().map(|doc| self.transform_one(doc)).collect()
    }

    pub fn vocabulary(&self) -> &HashMap<String, usize> {
        &self.vocabulary
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }
}

/// Stage B: smoothed IDF weights, `ln((1 + n) / (1 + df)) + 1`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TfidfTransformer {
    idf: Vec<f64>,
    norm: Option<Norm>,
}

impl TfidfTransformer {
    pub fn new(norm: Option<Norm>) -> Self {
        Self {
            idf: Vec::new(),
            norm,
        }
    }

    pub fn fit(&mut self, counts: &[SparseRow], n_cols: usize) {
        let mut doc_freq = vec![0usize; n_cols];
        for row in counts {
            for (col, _) in row.iter() {
                doc_freq[col] += 1;
            }
        }
        let n_docs = counts.len() as f64;
        self.idf = doc_freq
            .into_iter()
            .map(|df| ((1.0 + n_docs) / (1.0 + df as f64)).ln() + 1.0)
            .collect();
    }

    pub fn transform_one(&self, counts: &SparseRow) -> SparseRow {
        let pairs = counts
            .iter()
            .filter(|&(col, _)| col < self.idf.len())
            .map(|(col, tf)| (col, tf * self.idf[col]))
            .collect();
        let mut row = SparseRow::from_pairs(pairs);
        match self.norm {
            Some(Norm::L2) => row.l2_normalize(),
            Some(Norm::L1) => row.l1_normalize(),
            None => {}
        }
        row
    }

    pub fn idf(&self) -> &[f64] {
        &self.idf
    }
}

/// Counting and reweighting chained, fit together on one corpus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    counts: CountVectorizer,
    tfidf: TfidfTransformer,
    fitted: bool,
}

impl TfidfVectorizer {
    pub fn new(config: VectorizerConfig) -> Self {
        Self {
            counts: CountVectorizer::new(config.lowercase),
            tfidf: TfidfTransformer::new(config.norm),
            fitted: false,
        }
    }

    pub fn fit(&mut self, documents: &[&str]) {
        self.counts.fit(documents);
        let counts = self.counts.transform(documents);
        self.tfidf.fit(&counts, self.counts.vocabulary_size());
        self.fitted = true;
    }

    pub fn transform(&self, documents: &[&str]) -> Result<Vec<SparseRow>, ClassifierError> {
        if !self.fitted {
            return Err(ClassifierError::ModelError(
                "TF-IDF vectorizer used before fit".into(),
            ));
        }
        Ok(documents
            .iter()
            .map(|doc| self.tfidf.transform_one(&self.counts.transform_one(doc)))
            .collect())
    }

    pub fn vocabulary(&self) -> &HashMap<String, usize> {
        self.counts.vocabulary()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.counts.vocabulary_size()
    }

    pub fn idf(&self) -> &[f64] {
        self.tfidf.idf()
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Checks that the IDF table covers exactly the vocabulary.
    pub(crate) fn validate(&self) -> Result<(), ClassifierError> {
        if self.fitted && self.idf().len() != self.vocabulary_size() {
            return Err(ClassifierError::ModelError(format!(
                "IDF table has {} weights for a vocabulary of {}",
                self.idf().len(),
                self.vocabulary_size()
            )));
        }
        Ok(())
    }
}
