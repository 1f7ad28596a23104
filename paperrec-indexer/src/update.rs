//! Incremental update: embed papers the index has not seen yet and append them.

use anyhow::{Context, Result};
use ndarray::Axis;
use paperrec_core::artifacts::{self, ArtifactError, ArtifactPaths};
use paperrec_core::{EmbeddingBackend, EmbeddingStore, PaperCorpus, VectorIndex};

use crate::pipeline::embed_papers;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    NoNewPapers { total: usize },
    Added { added: usize, total: usize },
}

/// Extend the existing artifacts with papers missing from the index.
///
/// The index decides what is already indexed. New rows go to both the raw
/// store and the index (which normalises on insert); ids the store already
/// holds are not appended twice.
/// All new papers are embedded before anything is written, and a no-op run
/// leaves the files untouched.
pub async fn update_index(
    corpus: &dyn PaperCorpus,
    backend: &dyn EmbeddingBackend,
    batch_size: usize,
    paths: &ArtifactPaths,
) -> Result<UpdateOutcome> {
    let mut index = artifacts::load_index(paths).context("Failed to load existing index")?;
    if index.dimensions() != backend.dimensions() {
        anyhow::bail!(
            "index has {} dimensions but backend {} produces {}; run a full build instead",
            index.dimensions(),
            backend.name(),
            backend.dimensions()
        );
    }

    let papers = corpus
        .fetch_papers(index.id_set())
        .await
        .context("Failed to fetch new papers")?;
    // Corpus implementations are trusted to honour the exclusion, but a stale
    // one must not make the append fail on a duplicate id.
    let papers: Vec<_> = papers
        .into_iter()
        .filter(|p| !index.contains(p.paper_id))
        .collect();

    if papers.is_empty() {
        tracing::info!(total = index.len(), "No new papers to index");
        return Ok(UpdateOutcome::NoNewPapers { total: index.len() });
    }

    tracing::info!(
        new_papers = papers.len(),
        indexed = index.len(),
        backend = backend.name(),
        "Updating index"
    );

    let raw = embed_papers(&papers, backend, batch_size).await?;
    let ids: Vec<i64> = papers.iter().map(|p| p.paper_id).collect();

    let store = match artifacts::load_store(paths) {
        Ok(store) => store,
        Err(ArtifactError::Missing { path }) => {
            tracing::warn!(%path, "Embedding store missing; starting a new one");
            EmbeddingStore::empty(index.dimensions())?
        }
        Err(e) => return Err(e).context("Failed to load embedding store"),
    };

    index
        .add_with_ids(raw.view(), &ids)
        .context("Failed to append to vector index")?;

    let store_rows: Vec<usize> = ids
        .iter()
        .enumerate()
        .filter(|(_, id)| !store.contains(**id))
        .map(|(row, _)| row)
        .collect();
    let store_ids: Vec<i64> = store_rows.iter().map(|&row| ids[row]).collect();
    let store = store
        .append(raw.select(Axis(0), &store_rows), store_ids)
        .context("Failed to extend embedding store")?;

    artifacts::save_store(&store, paths).context("Failed to save embedding store")?;
    artifacts::save_index(&index, paths).context("Failed to save vector index")?;

    tracing::info!(
        added = ids.len(),
        total = index.len(),
        store_rows = store.len(),
        "Index update complete"
    );
    Ok(UpdateOutcome::Added {
        added: ids.len(),
        total: index.len(),
    })
}
