//! Request-level orchestration: profile, then resolve.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use paperrec_core::config::{ProfileConfig, RecommendConfig};
use paperrec_core::{EmbeddingStore, InteractionSource, LoadedArtifacts, VectorIndex};

use crate::profile::build_profile;
use crate::resolve::{resolve, Recommendation};

/// Read-only state loaded once at start-up and shared by every request.
#[derive(Clone)]
pub struct ServingState {
    pub store: Arc<EmbeddingStore>,
    pub index: Arc<dyn VectorIndex>,
    pub profile: ProfileConfig,
    pub recommend: RecommendConfig,
}

impl ServingState {
    pub fn new(
        artifacts: LoadedArtifacts,
        profile: ProfileConfig,
        recommend: RecommendConfig,
    ) -> Self {
        Self {
            store: Arc::new(artifacts.store),
            index: Arc::new(artifacts.index),
            profile,
            recommend,
        }
    }

    /// Requested `k`, or the default, clamped to `[1, max_k]`.
    pub fn effective_k(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.recommend.default_k)
            .clamp(1, self.recommend.max_k.max(1))
    }
}

/// Top-`k` papers for `user_id`. An empty list means cold start or an
/// exhausted index; both are normal outcomes.
pub async fn recommend_for_user(
    state: &ServingState,
    interactions: &dyn InteractionSource,
    user_id: i64,
    k: usize,
) -> Result<Vec<Recommendation>> {
    let start = Instant::now();

    let profile = build_profile(user_id, interactions, &state.store, &state.profile).await?;

    let no_history = HashSet::new();
    let (query, seen) = match &profile {
        Some(p) => (Some(p.query.as_slice()), &p.seen),
        None => (None, &no_history),
    };
    let recs = resolve(
        state.index.as_ref(),
        query,
        seen,
        k,
        state.recommend.oversample,
    )
    .context("Vector index search failed")?;

    tracing::info!(
        user_id,
        k,
        returned = recs.len(),
        cold_start = profile.is_none(),
        took_ms = start.elapsed().as_millis() as u64,
        "Recommendations served"
    );

    Ok(recs)
}
