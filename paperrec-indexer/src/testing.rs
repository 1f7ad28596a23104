//! In-memory collaborators for the job tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use paperrec_core::{EmbeddingBackend, EmbeddingError, PaperCorpus, PaperRecError, PaperRecord};

pub struct StaticCorpus {
    papers: Mutex<Vec<PaperRecord>>,
}

impl StaticCorpus {
    pub fn new(papers: Vec<PaperRecord>) -> Self {
        Self {
            papers: Mutex::new(papers),
        }
    }

    pub fn push(&self, paper: PaperRecord) {
        self.papers.lock().unwrap().push(paper);
    }
}

#[async_trait]
impl PaperCorpus for StaticCorpus {
    async fn fetch_papers(&self, exclude: &HashSet<i64>) -> Result<Vec<PaperRecord>, PaperRecError> {
        let mut papers: Vec<PaperRecord> = self
            .papers
            .lock()
            .unwrap()
            .iter()
            .filter(|p| !exclude.contains(&p.paper_id))
            .cloned()
            .collect();
        papers.sort_by_key(|p| p.paper_id);
        Ok(papers)
    }
}

pub fn paper(paper_id: i64, title: &str) -> PaperRecord {
    PaperRecord {
        paper_id,
        title: title.to_string(),
        abstract_text: format!("Abstract of {title}"),
    }
}

/// Deterministic bag-of-bytes embedding; never fails.
pub struct HashEmbedder {
    pub dims: usize,
    pub batch_calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            batch_calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for (j, b) in text.bytes().enumerate() {
            v[(b as usize + j) % self.dims] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingBackend for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "hash-stub"
    }
}

/// Succeeds for the first `ok_batches` batch calls, then returns an API error.
pub struct FlakyEmbedder {
    inner: HashEmbedder,
    ok_batches: usize,
}

impl FlakyEmbedder {
    pub fn new(dims: usize, ok_batches: usize) -> Self {
        Self {
            inner: HashEmbedder::new(dims),
            ok_batches,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.inner.calls() >= self.ok_batches {
            return Err(EmbeddingError::Api {
                code: 503,
                message: "embedding service unavailable".to_string(),
            });
        }
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dims
    }

    fn name(&self) -> &str {
        "flaky-stub"
    }
}

/// Returns one vector fewer than asked for.
pub struct ShortEmbedder(pub usize);

#[async_trait]
impl EmbeddingBackend for ShortEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![1.0; self.0])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(vec![vec![1.0; self.0]; texts.len().saturating_sub(1)])
    }

    fn dimensions(&self) -> usize {
        self.0
    }

    fn name(&self) -> &str {
        "short-stub"
    }
}
