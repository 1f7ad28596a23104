//! Full rebuild of the embedding store and vector index from the paper corpus.

use std::collections::HashSet;
use std::time::Instant;

use anyhow::{Context, Result};
use paperrec_core::artifacts::{self, ArtifactPaths};
use paperrec_core::{EmbeddingBackend, EmbeddingStore, FlatIpIndex, PaperCorpus, VectorIndex};
use uuid::Uuid;

use crate::pipeline::embed_papers;

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub papers: usize,
    pub dimensions: usize,
    pub build_id: Uuid,
    pub elapsed_ms: u128,
}

/// Embed every eligible paper and replace the artifacts at `paths`.
///
/// Nothing is written unless every batch embedded. The store is saved before
/// the index, so a crash between the two leaves an index that still matches
/// the previous store at worst.
pub async fn build_index(
    corpus: &dyn PaperCorpus,
    backend: &dyn EmbeddingBackend,
    batch_size: usize,
    paths: &ArtifactPaths,
) -> Result<BuildReport> {
    let started = Instant::now();

    let papers = corpus
        .fetch_papers(&HashSet::new())
        .await
        .context("Failed to fetch paper corpus")?;
    tracing::info!(
        papers = papers.len(),
        backend = backend.name(),
        dimensions = backend.dimensions(),
        batch_size,
        "Building index"
    );

    let raw = embed_papers(&papers, backend, batch_size).await?;
    let ids: Vec<i64> = papers.iter().map(|p| p.paper_id).collect();

    let store = EmbeddingStore::load(raw, ids).context("Embedded corpus is inconsistent")?;

    let mut index = FlatIpIndex::new(store.dimensions());
    index
        .add_with_ids(store.normalized().view(), store.paper_ids())
        .context("Failed to populate vector index")?;

    artifacts::save_store(&store, paths).context("Failed to save embedding store")?;
    artifacts::save_index(&index, paths).context("Failed to save vector index")?;

    let report = BuildReport {
        papers: store.len(),
        dimensions: store.dimensions(),
        build_id: index.build_id(),
        elapsed_ms: started.elapsed().as_millis(),
    };
    tracing::info!(
        papers = report.papers,
        dimensions = report.dimensions,
        build_id = %report.build_id,
        elapsed_ms = report.elapsed_ms as u64,
        "Index build complete"
    );
    Ok(report)
}
