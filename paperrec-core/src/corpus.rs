//! Paper corpus query: the papers eligible for indexing.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::PaperRecError;
use crate::models::PaperRecord;

#[async_trait]
pub trait PaperCorpus: Send + Sync {
    /// Papers that have an abstract, minus any id in `exclude`, ordered by id.
    async fn fetch_papers(&self, exclude: &HashSet<i64>) -> Result<Vec<PaperRecord>, PaperRecError>;
}

/// Reads the `papers` table.
#[derive(Debug, Clone)]
pub struct PgPaperCorpus {
    pool: PgPool,
}

impl PgPaperCorpus {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaperCorpus for PgPaperCorpus {
    async fn fetch_papers(&self, exclude: &HashSet<i64>) -> Result<Vec<PaperRecord>, PaperRecError> {
        let exclude: Vec<i64> = exclude.iter().copied().collect();

        let rows: Vec<PaperRecord> = sqlx::query_as(
            r#"
            SELECT
                id::int8 AS paper_id,
                COALESCE(title, '') AS title,
                abstract_text
            FROM papers
            WHERE has_abstract = TRUE
              AND abstract_text IS NOT NULL
              AND NOT (id = ANY($1))
            ORDER BY id
            "#,
        )
        .bind(&exclude)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(
            fetched = rows.len(),
            excluded = exclude.len(),
            "Fetched papers from corpus"
        );
        Ok(rows)
    }
}
