//! User profile: one query vector built from a user's interaction history.
//!
//! Weight of one interaction: w = base_weight × e^(-age_days / decay_days)
//!
//! Weights are summed per paper across every source, so a paper that was
//! both favourited and viewed carries both signals. The query vector is the
//! weighted sum of the papers' normalised embeddings, L2-normalised.

use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use ndarray::Array1;
use paperrec_core::config::ProfileConfig;
use paperrec_core::{vector, EmbeddingStore, InteractionRow, InteractionSource};

#[derive(Debug, Clone)]
pub struct UserProfile {
    /// Unit-length query vector (all zeros only under exact cancellation).
    pub query: Vec<f32>,
    /// Every paper the user interacted with, whether or not it has a vector.
    pub seen: HashSet<i64>,
    pub contributing: usize,
    pub skipped: usize,
}

/// Decayed weight of a single interaction (pure function).
/// Negative ages from clock skew count as fresh.
pub fn decay_weight(base_weight: f64, age_days: f64, decay_days: f64) -> f64 {
    base_weight * (-age_days.max(0.0) / decay_days).exp()
}

/// Add the decayed weight of every row into `weights`.
pub fn accumulate(
    weights: &mut BTreeMap<i64, f64>,
    rows: &[InteractionRow],
    base_weight: f64,
    decay_days: f64,
) {
    for row in rows {
        *weights.entry(row.paper_id).or_insert(0.0) +=
            decay_weight(base_weight, row.age_days, decay_days);
    }
}

/// Turn summed per-paper weights into a profile. `None` means no interacted
/// paper has a vector in the store (cold start).
pub fn profile_from_weights(
    weights: &BTreeMap<i64, f64>,
    store: &EmbeddingStore,
) -> Option<UserProfile> {
    let mut sum = Array1::<f32>::zeros(store.dimensions());
    let mut contributing = 0usize;

    // BTreeMap iteration is by ascending paper id, which fixes the summation order.
    for (&paper_id, &weight) in weights {
        let Some(row) = store.row_for(paper_id) else {
            continue;
        };
        sum.scaled_add(weight as f32, &store.normalized_row(row));
        contributing += 1;
    }

    if contributing == 0 {
        return None;
    }

    let mut query = sum.to_vec();
    vector::normalize_in_place(&mut query);

    Some(UserProfile {
        query,
        seen: weights.keys().copied().collect(),
        contributing,
        skipped: weights.len() - contributing,
    })
}

/// Fetch every configured source for `user_id` and build the profile.
pub async fn build_profile(
    user_id: i64,
    interactions: &dyn InteractionSource,
    store: &EmbeddingStore,
    config: &ProfileConfig,
) -> Result<Option<UserProfile>> {
    let mut weights = BTreeMap::new();

    for source in &config.sources {
        let rows = interactions
            .fetch_interactions(user_id, source)
            .await
            .with_context(|| format!("Failed to read interactions from {}", source.table))?;
        accumulate(&mut weights, &rows, source.base_weight, config.decay_days);
    }

    let profile = profile_from_weights(&weights, store);

    match &profile {
        Some(p) => tracing::debug!(
            user_id,
            interacted = weights.len(),
            contributing = p.contributing,
            skipped = p.skipped,
            "Built user profile"
        ),
        None if !weights.is_empty() => tracing::warn!(
            user_id,
            skipped = weights.len(),
            "No interacted paper has an embedding; index may be stale"
        ),
        None => tracing::debug!(user_id, "No interaction history"),
    }

    Ok(profile)
}
