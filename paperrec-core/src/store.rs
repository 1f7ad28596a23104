//! Embedding Store: the raw paper-embedding matrix with its id↔row bijection.
//!
//! Rows of `raw` are aligned with `paper_ids`. A normalised copy is computed
//! once at load time and is what the profile builder aggregates over; the raw
//! matrix is kept for persistence and for future weighting schemes that need
//! the magnitudes.

use std::collections::{HashMap, HashSet};

use ndarray::{concatenate, Array2, ArrayView1, Axis};
use thiserror::Error;

use crate::vector;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidStoreError {
    #[error("Row count mismatch: matrix has {rows} rows but {ids} paper ids were given")]
    LengthMismatch { rows: usize, ids: usize },

    #[error("Duplicate paper id {0}")]
    DuplicateId(i64),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding dimension must be non-zero")]
    EmptyDimension,
}

/// Immutable in-memory embedding matrix, shared read-only at serving time.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    raw: Array2<f32>,
    normalized: Array2<f32>,
    paper_ids: Vec<i64>,
    id_to_row: HashMap<i64, usize>,
}

impl EmbeddingStore {
    /// Build a store from an (N, D) matrix and N row-aligned, unique paper ids.
    pub fn load(raw: Array2<f32>, paper_ids: Vec<i64>) -> Result<Self, InvalidStoreError> {
        if raw.nrows() != paper_ids.len() {
            return Err(InvalidStoreError::LengthMismatch {
                rows: raw.nrows(),
                ids: paper_ids.len(),
            });
        }
        if raw.ncols() == 0 {
            return Err(InvalidStoreError::EmptyDimension);
        }

        let mut id_to_row = HashMap::with_capacity(paper_ids.len());
        for (row, &pid) in paper_ids.iter().enumerate() {
            if id_to_row.insert(pid, row).is_some() {
                return Err(InvalidStoreError::DuplicateId(pid));
            }
        }

        let raw = if raw.is_standard_layout() {
            raw
        } else {
            raw.as_standard_layout().into_owned()
        };

        let mut store = Self {
            normalized: Array2::zeros((0, raw.ncols())),
            raw,
            paper_ids,
            id_to_row,
        };
        store.normalized = store.normalize_copy();
        Ok(store)
    }

    /// An empty store of the given dimension (used by a build over an empty corpus).
    pub fn empty(dimensions: usize) -> Result<Self, InvalidStoreError> {
        Self::load(Array2::zeros((0, dimensions)), Vec::new())
    }

    /// L2-normalised copy of the raw matrix. All-zero rows stay all-zero.
    pub fn normalize_copy(&self) -> Array2<f32> {
        let mut out = self.raw.as_standard_layout().into_owned();
        for mut row in out.rows_mut() {
            // Rows of a standard-layout matrix are contiguous.
            if let Some(slice) = row.as_slice_mut() {
                vector::normalize_in_place(slice);
            }
        }
        out
    }

    pub fn row_for(&self, paper_id: i64) -> Option<usize> {
        self.id_to_row.get(&paper_id).copied()
    }

    pub fn contains(&self, paper_id: i64) -> bool {
        self.id_to_row.contains_key(&paper_id)
    }

    pub fn paper_id_at(&self, row: usize) -> Option<i64> {
        self.paper_ids.get(row).copied()
    }

    /// Panics if `row` is out of bounds; rows come from `row_for`.
    pub fn raw_row(&self, row: usize) -> ArrayView1<'_, f32> {
        self.raw.row(row)
    }

    pub fn normalized_row(&self, row: usize) -> ArrayView1<'_, f32> {
        self.normalized.row(row)
    }

    pub fn normalized(&self) -> &Array2<f32> {
        &self.normalized
    }

    pub fn raw(&self) -> &Array2<f32> {
        &self.raw
    }

    pub fn paper_ids(&self) -> &[i64] {
        &self.paper_ids
    }

    pub fn id_set(&self) -> HashSet<i64> {
        self.paper_ids.iter().copied().collect()
    }

    pub fn dimensions(&self) -> usize {
        self.raw.ncols()
    }

    pub fn len(&self) -> usize {
        self.paper_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paper_ids.is_empty()
    }

    /// Returns a new store with `rows` appended after the existing ones.
    pub fn append(&self, rows: Array2<f32>, ids: Vec<i64>) -> Result<Self, InvalidStoreError> {
        if rows.ncols() != self.dimensions() {
            return Err(InvalidStoreError::DimensionMismatch {
                expected: self.dimensions(),
                actual: rows.ncols(),
            });
        }
        if rows.nrows() != ids.len() {
            return Err(InvalidStoreError::LengthMismatch {
                rows: rows.nrows(),
                ids: ids.len(),
            });
        }

        let combined = concatenate(Axis(0), &[self.raw.view(), rows.view()]).map_err(|_| {
            InvalidStoreError::DimensionMismatch {
                expected: self.dimensions(),
                actual: rows.ncols(),
            }
        })?;
        let mut all_ids = Vec::with_capacity(self.paper_ids.len() + ids.len());
        all_ids.extend_from_slice(&self.paper_ids);
        all_ids.extend(ids);

        Self::load(combined, all_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> EmbeddingStore {
        EmbeddingStore::load(
            array![[3.0, 4.0, 0.0], [0.0, 0.0, 0.0], [0.0, 2.0, 0.0]],
            vec![101, 205, 309],
        )
        .unwrap()
    }

    #[test]
    fn test_row_for_finds_every_id() {
        let store = sample();
        assert_eq!(store.row_for(101), Some(0));
        assert_eq!(store.row_for(205), Some(1));
        assert_eq!(store.row_for(309), Some(2));
        assert_eq!(store.row_for(42), None);
        assert_eq!(store.row_for(-1), None);
        for (row, &pid) in store.paper_ids().iter().enumerate() {
            assert_eq!(store.paper_id_at(row), Some(pid));
        }
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let err = EmbeddingStore::load(array![[1.0, 0.0], [0.0, 1.0]], vec![1]).unwrap_err();
        assert_eq!(err, InvalidStoreError::LengthMismatch { rows: 2, ids: 1 });
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let err =
            EmbeddingStore::load(array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]], vec![4, 5, 4])
                .unwrap_err();
        assert_eq!(err, InvalidStoreError::DuplicateId(4));
    }

    #[test]
    fn test_zero_width_matrix_is_rejected() {
        let err = EmbeddingStore::load(Array2::zeros((2, 0)), vec![1, 2]).unwrap_err();
        assert_eq!(err, InvalidStoreError::EmptyDimension);
    }

    #[test]
    fn test_normalize_copy_is_zero_safe() {
        let store = sample();
        let norm = store.normalize_copy();

        assert!((norm[[0, 0]] - 0.6).abs() < 1e-6);
        assert!((norm[[0, 1]] - 0.8).abs() < 1e-6);
        assert_eq!(norm.row(1).to_vec(), vec![0.0, 0.0, 0.0]);
        assert!(norm.iter().all(|x| !x.is_nan()));
        assert_eq!(norm.row(2).to_vec(), vec![0.0, 1.0, 0.0]);

        // Raw magnitudes are preserved.
        assert_eq!(store.raw_row(0).to_vec(), vec![3.0, 4.0, 0.0]);
        assert_eq!(store.normalized_row(0).to_vec(), norm.row(0).to_vec());
    }

    #[test]
    fn test_normalize_copy_matches_vector_rule_row_by_row() {
        let raw = array![[f32::MAX, f32::MAX], [0.0, -2.0], [1.0, 1.0]];
        let store = EmbeddingStore::load(raw.clone(), vec![1, 2, 3]).unwrap();

        for (row, expected) in store.normalize_copy().rows().into_iter().zip(raw.rows()) {
            assert_eq!(row.to_vec(), vector::normalized(&expected.to_vec()));
        }
        // Overflowing norm: left as is rather than turned into zeros or NaN.
        assert_eq!(store.normalized_row(0).to_vec(), vec![f32::MAX, f32::MAX]);
    }

    #[test]
    fn test_append_extends_rows_and_map() {
        let store = sample();
        let bigger = store.append(array![[1.0, 0.0, 0.0]], vec![400]).unwrap();

        assert_eq!(bigger.len(), 4);
        assert_eq!(bigger.row_for(400), Some(3));
        assert_eq!(bigger.row_for(101), Some(0));
        assert_eq!(store.len(), 3, "source store is untouched");
    }

    #[test]
    fn test_append_rejects_existing_id_and_wrong_width() {
        let store = sample();
        assert_eq!(
            store.append(array![[1.0, 0.0, 0.0]], vec![205]).unwrap_err(),
            InvalidStoreError::DuplicateId(205)
        );
        assert_eq!(
            store.append(array![[1.0, 0.0]], vec![999]).unwrap_err(),
            InvalidStoreError::DimensionMismatch { expected: 3, actual: 2 }
        );
    }

    #[test]
    fn test_empty_store() {
        let store = EmbeddingStore::empty(384).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.dimensions(), 384);
        assert_eq!(store.row_for(1), None);
    }
}
