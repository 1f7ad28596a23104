//! Vector Index: id-tagged inner-product search over L2-normalised embeddings.
//!
//! `VectorIndex` is the seam the resolver and the offline jobs depend on.
//! `FlatIpIndex` is the shipped backend: an exhaustive scan with bounded
//! top-k selection, which is exact and fast enough for a paper corpus in the
//! low millions. Search follows the usual ANN-library contract: exactly `k`
//! result slots, with unfilled slots tagged `NO_RESULT`.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use chrono::{DateTime, Utc};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::vector;

/// Id placed in result slots the index could not fill.
pub const NO_RESULT: i64 = -1;

/// Version of the on-disk `IndexFile` layout.
pub const FORMAT_VERSION: u32 = 1;

pub const METRIC_INNER_PRODUCT: &str = "inner_product";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("Dimension mismatch: index has {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Paper id {0} is already in the index")]
    DuplicateId(i64),

    #[error("Paper id {0} is reserved")]
    ReservedId(i64),

    #[error("Got {vectors} vectors but {ids} ids")]
    LengthMismatch { vectors: usize, ids: usize },

    #[error("Unsupported index format version {version}")]
    UnsupportedFormat { version: u32 },

    #[error("Unsupported metric {0:?}")]
    UnsupportedMetric(String),
}

/// Parallel arrays of result ids and scores, best first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchHits {
    pub ids: Vec<i64>,
    pub scores: Vec<f32>,
}

impl SearchHits {
    pub fn iter(&self) -> impl Iterator<Item = (i64, f32)> + '_ {
        self.ids.iter().copied().zip(self.scores.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

pub trait VectorIndex: Send + Sync {
    fn dimensions(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, paper_id: i64) -> bool;

    /// Every paper id currently tagged in the index, in insertion order.
    fn ids(&self) -> Vec<i64>;

    /// The `k` nearest vectors by inner product.
    fn search(&self, query: &[f32], k: usize) -> Result<SearchHits, IndexError>;

    /// Append vectors tagged with `ids`. Either every row is added or none is.
    fn add_with_ids(&mut self, vectors: ArrayView2<'_, f32>, ids: &[i64])
        -> Result<(), IndexError>;
}

/// Self-describing persisted form of a `FlatIpIndex`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
    pub format_version: u32,
    pub metric: String,
    pub dimensions: usize,
    pub build_id: Uuid,
    pub built_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ids: Vec<i64>,
    /// Row-major, `ids.len() * dimensions` values.
    pub vectors: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct FlatIpIndex {
    dimensions: usize,
    ids: Vec<i64>,
    vectors: Vec<f32>,
    id_set: HashSet<i64>,
    build_id: Uuid,
    built_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FlatIpIndex {
    pub fn new(dimensions: usize) -> Self {
        let now = Utc::now();
        Self {
            dimensions,
            ids: Vec::new(),
            vectors: Vec::new(),
            id_set: HashSet::new(),
            build_id: Uuid::new_v4(),
            built_at: now,
            updated_at: now,
        }
    }

    pub fn build_id(&self) -> Uuid {
        self.build_id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn id_set(&self) -> &HashSet<i64> {
        &self.id_set
    }

    fn vector_at(&self, slot: usize) -> &[f32] {
        let start = slot * self.dimensions;
        &self.vectors[start..start + self.dimensions]
    }

    pub fn to_file(&self) -> IndexFile {
        IndexFile {
            format_version: FORMAT_VERSION,
            metric: METRIC_INNER_PRODUCT.to_string(),
            dimensions: self.dimensions,
            build_id: self.build_id,
            built_at: self.built_at,
            updated_at: self.updated_at,
            ids: self.ids.clone(),
            vectors: self.vectors.clone(),
        }
    }

    pub fn from_file(file: IndexFile) -> Result<Self, IndexError> {
        if file.format_version != FORMAT_VERSION {
            return Err(IndexError::UnsupportedFormat {
                version: file.format_version,
            });
        }
        if file.metric != METRIC_INNER_PRODUCT {
            return Err(IndexError::UnsupportedMetric(file.metric));
        }
        if file.vectors.len() != file.ids.len() * file.dimensions {
            return Err(IndexError::LengthMismatch {
                vectors: file.vectors.len(),
                ids: file.ids.len(),
            });
        }

        let mut id_set = HashSet::with_capacity(file.ids.len());
        for &id in &file.ids {
            if id == NO_RESULT {
                return Err(IndexError::ReservedId(id));
            }
            if !id_set.insert(id) {
                return Err(IndexError::DuplicateId(id));
            }
        }

        Ok(Self {
            dimensions: file.dimensions,
            ids: file.ids,
            vectors: file.vectors,
            id_set,
            build_id: file.build_id,
            built_at: file.built_at,
            updated_at: file.updated_at,
        })
    }
}

/// Heap entry ordered so that "greater" means "better hit".
#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f32,
    id: i64,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Equal scores favour the smaller paper id.
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl VectorIndex for FlatIpIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn contains(&self, paper_id: i64) -> bool {
        self.id_set.contains(&paper_id)
    }

    fn ids(&self) -> Vec<i64> {
        self.ids.clone()
    }

    fn search(&self, query: &[f32], k: usize) -> Result<SearchHits, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(SearchHits::default());
        }

        // Min-heap of the best `k` seen so far; the root is the weakest kept hit.
        let mut heap: BinaryHeap<Reverse<Candidate>> =
            BinaryHeap::with_capacity(k.min(self.ids.len()) + 1);
        for (slot, &id) in self.ids.iter().enumerate() {
            let candidate = Candidate {
                score: vector::dot(query, self.vector_at(slot)),
                id,
            };
            if heap.len() < k {
                heap.push(Reverse(candidate));
            } else if let Some(&Reverse(weakest)) = heap.peek() {
                if candidate > weakest {
                    heap.pop();
                    heap.push(Reverse(candidate));
                }
            }
        }

        let mut hits = SearchHits {
            ids: Vec::with_capacity(k),
            scores: Vec::with_capacity(k),
        };
        // Ascending `Reverse` order is descending candidate order.
        for Reverse(c) in heap.into_sorted_vec() {
            hits.ids.push(c.id);
            hits.scores.push(c.score);
        }
        hits.ids.resize(k, NO_RESULT);
        hits.scores.resize(k, f32::NEG_INFINITY);
        Ok(hits)
    }

    fn add_with_ids(
        &mut self,
        vectors: ArrayView2<'_, f32>,
        ids: &[i64],
    ) -> Result<(), IndexError> {
        if vectors.nrows() != ids.len() {
            return Err(IndexError::LengthMismatch {
                vectors: vectors.nrows(),
                ids: ids.len(),
            });
        }
        if vectors.ncols() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: vectors.ncols(),
            });
        }

        let mut batch = HashSet::with_capacity(ids.len());
        for &id in ids {
            if id == NO_RESULT {
                return Err(IndexError::ReservedId(id));
            }
            if self.id_set.contains(&id) || !batch.insert(id) {
                return Err(IndexError::DuplicateId(id));
            }
        }

        self.vectors.reserve(ids.len() * self.dimensions);
        self.ids.reserve(ids.len());
        for (row, &id) in vectors.rows().into_iter().zip(ids) {
            let unit = vector::normalized(&row.to_vec());
            self.vectors.extend_from_slice(&unit);
            self.ids.push(id);
            self.id_set.insert(id);
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}
