use serde::{Deserialize, Serialize};

/// A sparse feature row: sorted column indices with their non-zero values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseRow {
    indices: Vec<u32>,
    values: Vec<f64>,
}

impl SparseRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a row from unordered `(column, value)` pairs. Duplicate columns
    /// are summed and explicit zeros dropped.
    pub fn from_pairs(mut pairs: Vec<(usize, f64)>) -> Self {
        pairs.sort_by_key(|&(col, _)| col);
        let mut row = Self::new();
        for (col, value) in pairs {
            match row.indices.last() {
                Some(&last) if last as usize == col => {
                    if let Some(v) = row.values.last_mut() {
                        *v += value;
                    }
                }
                _ => {
                    row.indices.push(col as u32);
                    row.values.push(value);
                }
            }
        }
        row.retain_non_zero();
        row
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Value at `col`, zero when the column is absent.
    pub fn get(&self, col: usize) -> f64 {
        match self.indices.binary_search(&(col as u32)) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices
            .iter()
            .zip(self.values.iter())
            .map(|(&col, &value)| (col as usize, value))
    }

    /// Largest column index present, plus one.
    pub fn span(&self) -> usize {
        self.indices.last().map_or(0, |&col| col as usize + 1)
    }

    pub fn scale(&mut self, factor: f64) {
        for value in &mut self.values {
            *value *= factor;
        }
        self.retain_non_zero();
    }

    pub fn l2_normalize(&mut self) {
        let norm = self.values.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 1e-10 {
            for value in &mut self.values {
                *value /= norm;
            }
        } else {
            self.indices.clear();
            self.values.clear();
        }
    }

    pub fn l1_normalize(&mut self) {
        let norm = self.values.iter().map(|v| v.abs()).sum::<f64>();
        if norm > 1e-10 {
            for value in &mut self.values {
                *value /= norm;
            }
        } else {
            self.indices.clear();
            self.values.clear();
        }
    }

    /// Appends `other`'s entries shifted right by `offset` and scaled by `weight`.
    /// `offset` must not be smaller than this row's span.
    pub fn extend_shifted(&mut self, other: &SparseRow, offset: usize, weight: f64) {
        debug_assert!(offset >= self.span());
        if weight == 0.0 {
            return;
        }
        for (col, value) in other.iter() {
            self.indices.push((col + offset) as u32);
            self.values.push(value * weight);
        }
    }

    fn retain_non_zero(&mut self) {
        if self.values.iter().all(|&v| v != 0.0) {
            return;
        }
        let (indices, values): (Vec<u32>, Vec<f64>) = self
            .indices
            .iter()
            .zip(self.values.iter())
            .filter(|(_, &v)| v != 0.0)
            .map(|(&i, &v)| (i, v))
            .unzip();
        self.indices = indices;
        self.values = values;
    }
}

/// Row-major sparse matrix with a fixed column count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    rows: Vec<SparseRow>,
    n_cols: usize,
}

impl FeatureMatrix {
    pub fn new(rows: Vec<SparseRow>, n_cols: usize) -> Self {
        debug_assert!(rows.iter().all(|row| row.span() <= n_cols));
        Self { rows, n_cols }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn row(&self, index: usize) -> &SparseRow {
        &self.rows[index]
    }

    pub fn rows(&self) -> &[SparseRow] {
        &self.rows
    }
}

/// SplitMix64 step, used to derive independent seeds from one base seed.
pub(crate) fn derive_seed(base: u64, stream: u64) -> u64 {
    let mut z = base.wrapping_add(stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
