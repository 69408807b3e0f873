//! Labeled message corpora and the ordered category set they define.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{info, warn};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Column '{column}' not found in table '{table}'")]
    MissingColumn { table: String, column: String },
    #[error("Invalid category set: {0}")]
    InvalidCategories(String),
    #[error("Row {row}, column '{column}': {reason}")]
    InvalidValue {
        row: usize,
        column: String,
        reason: String,
    },
    #[error("Shape mismatch: {0}")]
    Shape(String),
    #[error("Invalid split: {0}")]
    InvalidSplit(String),
}

/// Ordered, duplicate-free list of category names.
///
/// Column `i` of every label matrix and prediction belongs to `names()[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySet {
    names: Vec<String>,
}

impl CategorySet {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Result<Self, DatasetError> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(DatasetError::InvalidCategories(
                "at least one category is required".into(),
            ));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if name.trim().is_empty() {
                return Err(DatasetError::InvalidCategories("empty category name".into()));
            }
            if !seen.insert(name.as_str()) {
                return Err(DatasetError::InvalidCategories(format!(
                    "duplicate category '{}'",
                    name
                )));
            }
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Where and how to read a labeled table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSource {
    pub path: PathBuf,
    pub table: String,
    pub text_column: String,
    /// Metadata columns that are neither text nor categories
    pub ignored_columns: Vec<String>,
}

impl DatasetSource {
    /// Table `comm`, text in `message`, `genre` ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            table: "comm".to_string(),
            text_column: "message".to_string(),
            ignored_columns: vec!["genre".to_string()],
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_text_column(mut self, column: impl Into<String>) -> Self {
        self.text_column = column.into();
        self
    }

    pub fn with_ignored_columns(mut self, columns: Vec<String>) -> Self {
        self.ignored_columns = columns;
        self
    }
}

/// Documents with one 0/1 label per category.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    categories: CategorySet,
    texts: Vec<String>,
    labels: Array2<u8>,
}

impl Dataset {
    pub fn new(categories: CategorySet, texts: Vec<String>, labels: Array2<u8>) -> Result<Self, DatasetError> {
        if labels.nrows() != texts.len() || labels.ncols() != categories.len() {
            return Err(DatasetError::Shape(format!(
                "{} texts and {} categories, but labels are {}x{}",
                texts.len(),
                categories.len(),
                labels.nrows(),
                labels.ncols()
            )));
        }
        if let Some(((row, col), value)) = labels.indexed_iter().find(|(_, &v)| v > 1) {
            return Err(DatasetError::InvalidValue {
                row,
                column: categories.names()[col].clone(),
                reason: format!("label {} is not 0 or 1", value),
            });
        }
        Ok(Self {
            categories,
            texts,
            labels,
        })
    }

    /// Builds a dataset from `(text, label vector)` pairs.
    pub fn from_records<T: Into<String>>(
        categories: CategorySet,
        records: impl IntoIterator<Item = (T, Vec<u8>)>,
    ) -> Result<Self, DatasetError> {
        let mut texts = Vec::new();
        let mut flat = Vec::new();
        for (row, (text, labels)) in records.into_iter().enumerate() {
            if labels.len() != categories.len() {
                return Err(DatasetError::Shape(format!(
                    "record {} has {} labels, expected {}",
                    row,
                    labels.len(),
                    categories.len()
                )));
            }
            texts.push(text.into());
            flat.extend(labels);
        }
        let labels = Array2::from_shape_vec((texts.len(), categories.len()), flat)
            .map_err(|e| DatasetError::Shape(e.to_string()))?;
        Self::new(categories, texts, labels)
    }

    /// Reads every row of `source.table`. All columns other than the text
    /// column and the ignored columns are categories, in table order.
    pub fn from_sqlite(source: &DatasetSource) -> Result<Self, DatasetError> {
        info!("Loading dataset from {:?} (table '{}')", source.path, source.table);
        let conn = Connection::open_with_flags(&source.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let sql = format!("SELECT * FROM \"{}\"", source.table.replace('"', "\"\""));
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let text_index = columns
            .iter()
            .position(|c| *c == source.text_column)
            .ok_or_else(|| DatasetError::MissingColumn {
                table: source.table.clone(),
                column: source.text_column.clone(),
            })?;
        let category_columns: Vec<(usize, String)> = columns
            .iter()
            .enumerate()
            .filter(|(i, c)| *i != text_index && !source.ignored_columns.contains(c))
            .map(|(i, c)| (i, c.clone()))
            .collect();
        let categories = CategorySet::new(category_columns.iter().map(|(_, c)| c.clone()))?;

        let mut texts = Vec::new();
        let mut flat = Vec::new();
        let mut coerced = 0usize;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let row_index = texts.len();
            let text = match row.get_ref(text_index)? {
                ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                ValueRef::Null => String::new(),
                other => {
                    return Err(DatasetError::InvalidValue {
                        row: row_index,
                        column: source.text_column.clone(),
                        reason: format!("expected text, found {:?}", other.data_type()),
                    })
                }
            };
            texts.push(text);
            for (index, name) in &category_columns {
                let raw = label_value(row.get_ref(*index)?).ok_or_else(|| DatasetError::InvalidValue {
                    row: row_index,
                    column: name.clone(),
                    reason: "expected a numeric label".into(),
                })?;
                if raw != 0 && raw != 1 {
                    coerced += 1;
                }
                flat.push(u8::from(raw != 0));
            }
        }
        if coerced > 0 {
            warn!("Coerced {} label values other than 0/1 to 1", coerced);
        }
        info!("Loaded {} messages with {} categories", texts.len(), categories.len());

        let labels = Array2::from_shape_vec((texts.len(), categories.len()), flat)
            .map_err(|e| DatasetError::Shape(e.to_string()))?;
        Self::new(categories, texts, labels)
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn text_refs(&self) -> Vec<&str> {
        self.texts.iter().map(String::as_str).collect()
    }

    pub fn labels(&self) -> &Array2<u8> {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Rows at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            categories: self.categories.clone(),
            texts: indices.iter().map(|&i| self.texts[i].clone()).collect(),
            labels: self.labels.select(Axis(0), indices),
        }
    }

    /// Shuffled `(train, test)` split. The test side gets `ceil(test_size * n)`
    /// rows and both sides must be non-empty.
    pub fn train_test_split(&self, test_size: f64, seed: u64) -> Result<(Self, Self), DatasetError> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(DatasetError::InvalidSplit(format!(
                "test_size must be in (0, 1), got {}",
                test_size
            )));
        }
        let n = self.len();
        let n_test = (test_size * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(DatasetError::InvalidSplit(format!(
                "{} rows cannot be split with test_size {}",
                n, test_size
            )));
        }
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));
        let (test, train) = indices.split_at(n_test);
        Ok((self.subset(train), self.subset(test)))
    }
}

fn label_value(value: ValueRef<'_>) -> Option<i64> {
    match value {
        ValueRef::Integer(i) => Some(i),
        ValueRef::Real(f) if f.is_finite() => Some(f.round() as i64),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok()?.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn categories() -> CategorySet {
        CategorySet::new(["request", "aid_related"]).unwrap()
    }

    #[test]
    fn test_category_set_validation() {
        assert!(CategorySet::new(Vec::<String>::new()).is_err());
        assert!(CategorySet::new(["a", "a"]).is_err());
        assert!(CategorySet::new(["a", " "]).is_err());
        let set = categories();
        assert_eq!(set.index_of("aid_related"), Some(1));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["request", "aid_related"]);
    }

    #[test]
    fn test_from_records_checks_shape_and_values() {
        let ok = Dataset::from_records(categories(), vec![("need water", vec![1, 1])]).unwrap();
        assert_eq!(ok.len(), 1);
        assert!(Dataset::from_records(categories(), vec![("x", vec![1])]).is_err());
        assert!(Dataset::from_records(categories(), vec![("x", vec![1, 2])]).is_err());
    }

    #[test]
    fn test_train_test_split_sizes_and_determinism() {
        let records: Vec<(String, Vec<u8>)> =
            (0..10).map(|i| (format!("message {}", i), vec![(i % 2) as u8, 0])).collect();
        let dataset = Dataset::from_records(categories(), records).unwrap();
        let (train, test) = dataset.train_test_split(0.2, 5).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);
        let (train_again, _) = dataset.train_test_split(0.2, 5).unwrap();
        assert_eq!(train, train_again);

        let mut all: Vec<String> = train.texts().iter().chain(test.texts()).cloned().collect();
        all.sort();
        let mut expected = dataset.texts().to_vec();
        expected.sort();
        assert_eq!(all, expected);

        assert!(dataset.train_test_split(0.0, 1).is_err());
        let tiny = dataset.subset(&[0]);
        assert!(tiny.train_test_split(0.2, 1).is_err());
    }

    #[test]
    fn test_from_sqlite_reads_categories_in_column_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE comm (message TEXT, genre TEXT, request INTEGER, aid_related INTEGER, water INTEGER);
             INSERT INTO comm VALUES ('need water', 'direct', 1, 1, 1);
             INSERT INTO comm VALUES ('nice weather today', 'social', 0, 0, 0);
             INSERT INTO comm VALUES ('send tents', 'news', 1, 2, 0);",
        )
        .unwrap();
        drop(conn);

        let dataset = Dataset::from_sqlite(&DatasetSource::new(&path)).unwrap();
        assert_eq!(dataset.categories().names(), &["request", "aid_related", "water"]);
        assert_eq!(dataset.texts()[1], "nice weather today");
        assert_eq!(dataset.labels()[[2, 1]], 1);
        assert_eq!(dataset.labels().row(0).to_vec(), vec![1, 1, 1]);
    }

    #[test]
    fn test_from_sqlite_missing_text_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE comm (body TEXT, request INTEGER);").unwrap();
        drop(conn);

        let err = Dataset::from_sqlite(&DatasetSource::new(&path)).unwrap_err();
        assert!(matches!(err, DatasetError::MissingColumn { .. }));
    }
}
