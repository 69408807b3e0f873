use std::fmt;

use ndarray::{Array2, Axis};

use super::error::ClassifierError;
use super::model::Classifier;

/// Precision, recall and F1 of one class, with its true-instance count.
///
/// A ratio with a zero denominator is reported as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    /// Metrics for `class` given aligned truth and prediction columns.
    pub fn compute(truth: &[u8], predicted: &[u8], class: u8) -> Self {
        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut fn_ = 0usize;
        for (&t, &p) in truth.iter().zip(predicted) {
            match (t == class, p == class) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
            support: tp + fn_,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Per-class rows plus summary rows for one category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryReport {
    pub name: String,
    /// Rows for label 0 and label 1, in that order
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl CategoryReport {
    /// Metrics of the positive label, which is what "the category's" precision
    /// and recall refer to.
    pub fn positive(&self) -> &ClassMetrics {
        &self.classes[1]
    }

    pub fn support(&self) -> usize {
        self.classes[0].support + self.classes[1].support
    }
}

/// Builds the report of one category from its truth and prediction columns.
pub fn classification_report(name: &str, truth: &[u8], predicted: &[u8]) -> CategoryReport {
    let classes = [
        ClassMetrics::compute(truth, predicted, 0),
        ClassMetrics::compute(truth, predicted, 1),
    ];
    let total = truth.len();
    let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();

    let macro_avg = ClassMetrics {
        precision: (classes[0].precision + classes[1].precision) / 2.0,
        recall: (classes[0].recall + classes[1].recall) / 2.0,
        f1: (classes[0].f1 + classes[1].f1) / 2.0,
        support: total,
    };
    let weighted = |metric: fn(&ClassMetrics) -> f64| {
        if total == 0 {
            return 0.0;
        }
        classes
            .iter()
            .map(|c| metric(c) * c.support as f64)
            .sum::<f64>()
            / total as f64
    };
    let weighted_avg = ClassMetrics {
        precision: weighted(|c| c.precision),
        recall: weighted(|c| c.recall),
        f1: weighted(|c| c.f1),
        support: total,
    };

    CategoryReport {
        name: name.to_string(),
        classes,
        accuracy: ratio(correct, total),
        macro_avg,
        weighted_avg,
    }
}

/// Fraction of rows whose whole predicted label vector equals the truth.
/// Zero for an empty batch.
pub fn subset_accuracy(truth: &Array2<u8>, predicted: &Array2<u8>) -> f64 {
    if truth.nrows() == 0 || truth.shape() != predicted.shape() {
        return 0.0;
    }
    let exact = truth
        .axis_iter(Axis(0))
        .zip(predicted.axis_iter(Axis(0)))
        .filter(|(t, p)| t == p)
        .count();
    exact as f64 / truth.nrows() as f64
}

/// Per-category reports in the order the categories were requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    categories: Vec<CategoryReport>,
}

impl EvaluationReport {
    pub fn new(categories: Vec<CategoryReport>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &[CategoryReport] {
        &self.categories
    }

    pub fn get(&self, name: &str) -> Option<&CategoryReport> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, label: &str, m: &ClassMetrics) -> fmt::Result {
    writeln!(
        f,
        "{:>12} {:>10.2} {:>9.2} {:>9.2} {:>9}",
        label, m.precision, m.recall, m.f1, m.support
    )
}

impl fmt::Display for CategoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Category: {}", self.name)?;
        writeln!(
            f,
            "{:>12} {:>10} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        write_row(f, "0", &self.classes[0])?;
        write_row(f, "1", &self.classes[1])?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>10} {:>9} {:>9.2} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.support()
        )?;
        write_row(f, "macro avg", &self.macro_avg)?;
        write_row(f, "weighted avg", &self.weighted_avg)
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, category) in self.categories.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", category)?;
        }
        Ok(())
    }
}

/// Scores `classifier` on held-out texts, one report per name in
/// `category_names`, in that order.
///
/// `labels` columns follow the classifier's own category order. Categories
/// without positive examples get zero metrics for label 1 instead of an error.
pub fn evaluate(
    classifier: &Classifier,
    texts: &[&str],
    labels: &Array2<u8>,
    category_names: &[String],
) -> Result<EvaluationReport, ClassifierError> {
    if labels.nrows() != texts.len() {
        return Err(ClassifierError::ValidationError(format!(
            "{} label rows for {} texts",
            labels.nrows(),
            texts.len()
        )));
    }
    if labels.ncols() != classifier.categories().len() {
        return Err(ClassifierError::ValidationError(format!(
            "Label matrix has {} columns, classifier has {} categories",
            labels.ncols(),
            classifier.categories().len()
        )));
    }

    let predicted = classifier.predict_batch(texts)?;
    let reports = category_names
        .iter()
        .map(|name| -> Result<CategoryReport, ClassifierError> {
            let index = classifier.categories().index_of(name).ok_or_else(|| {
                ClassifierError::ValidationError(format!("Unknown category '{}'", name))
            })?;
            let truth = labels.column(index).to_vec();
            let guess = predicted.column(index).to_vec();
            Ok(classification_report(name, &truth, &guess))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(EvaluationReport::new(reports))
}
