//! Text synthesis + batched embedding shared by the build and update jobs.

use anyhow::{bail, Context, Result};
use ndarray::{Array2, ArrayView1, Axis};
use paperrec_core::{EmbeddingBackend, PaperRecord};

/// Embed `papers` in batches of `batch_size`, returning the raw (N, D) matrix
/// row-aligned with `papers`. The first failed batch aborts the whole run.
pub async fn embed_papers(
    papers: &[PaperRecord],
    backend: &dyn EmbeddingBackend,
    batch_size: usize,
) -> Result<Array2<f32>> {
    let dims = backend.dimensions();
    let batch_size = batch_size.max(1);
    let total_batches = papers.len().div_ceil(batch_size);
    let mut matrix = Array2::<f32>::zeros((papers.len(), dims));

    let batches = papers
        .chunks(batch_size)
        .zip(matrix.axis_chunks_iter_mut(Axis(0), batch_size));

    for (batch_no, (chunk, mut rows)) in batches.enumerate() {
        let texts: Vec<String> = chunk.iter().map(PaperRecord::retrieval_text).collect();

        let vectors = backend.embed_batch(&texts).await.with_context(|| {
            format!(
                "embedding batch {}/{} via {} failed",
                batch_no + 1,
                total_batches,
                backend.name()
            )
        })?;

        if vectors.len() != chunk.len() {
            bail!(
                "embedding batch {}/{} returned {} vectors for {} papers",
                batch_no + 1,
                total_batches,
                vectors.len(),
                chunk.len()
            );
        }

        for ((mut row, vector), paper) in rows.rows_mut().into_iter().zip(&vectors).zip(chunk) {
            if vector.len() != dims {
                bail!(
                    "paper {} embedded to {} dimensions, expected {}",
                    paper.paper_id,
                    vector.len(),
                    dims
                );
            }
            row.assign(&ArrayView1::from(vector.as_slice()));
        }

        tracing::info!(
            batch = batch_no + 1,
            total_batches,
            embedded = (batch_no * batch_size + chunk.len()),
            total = papers.len(),
            "Embedded batch"
        );
    }

    Ok(matrix)
}
