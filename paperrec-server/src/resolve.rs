//! Recommendation resolver: top-k unseen papers for a query vector.

use std::collections::HashSet;

use paperrec_core::{IndexError, VectorIndex, NO_RESULT};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub paper_id: i64,
    /// Cosine similarity to the profile, in [-1, 1].
    pub score: f32,
}

/// Walk the index's ranking and keep the first `k` hits that are neither
/// padding nor already seen. `None` (cold start) and `k == 0` give `[]`.
/// Fewer than `k` results is not an error.
pub fn resolve(
    index: &dyn VectorIndex,
    query: Option<&[f32]>,
    seen: &HashSet<i64>,
    k: usize,
    oversample: usize,
) -> Result<Vec<Recommendation>, IndexError> {
    let Some(query) = query else {
        return Ok(Vec::new());
    };
    if k == 0 {
        return Ok(Vec::new());
    }

    let hits = index.search(query, k + seen.len() + oversample)?;

    Ok(hits
        .iter()
        .filter(|&(paper_id, _)| paper_id != NO_RESULT && !seen.contains(&paper_id))
        .take(k)
        .map(|(paper_id, score)| Recommendation { paper_id, score })
        .collect())
}
