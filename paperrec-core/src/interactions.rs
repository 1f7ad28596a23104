//! Interaction query: a user's history in one configured interaction table.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::config::is_sql_identifier;
use crate::error::PaperRecError;
use crate::models::{InteractionRow, InteractionSourceSpec};

#[async_trait]
pub trait InteractionSource: Send + Sync {
    /// `(paper_id, age_days)` for every interaction of `user_id` in `source`.
    async fn fetch_interactions(
        &self,
        user_id: i64,
        source: &InteractionSourceSpec,
    ) -> Result<Vec<InteractionRow>, PaperRecError>;
}

#[derive(Debug, Clone)]
pub struct PgInteractionSource {
    pool: PgPool,
}

impl PgInteractionSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Ages are whole days, rounded down.
pub fn interaction_query(source: &InteractionSourceSpec) -> Result<String, PaperRecError> {
    for ident in [&source.table, &source.timestamp_column] {
        if !is_sql_identifier(ident) {
            return Err(PaperRecError::InvalidIdentifier(ident.clone()));
        }
    }

    Ok(format!(
        r#"
        SELECT
            paper_id::int8 AS paper_id,
            FLOOR(EXTRACT(EPOCH FROM (NOW() - {ts})) / 86400)::float8 AS age_days
        FROM {table}
        WHERE user_id = $1
          AND paper_id IS NOT NULL
        "#,
        ts = source.timestamp_column,
        table = source.table,
    ))
}

#[async_trait]
impl InteractionSource for PgInteractionSource {
    async fn fetch_interactions(
        &self,
        user_id: i64,
        source: &InteractionSourceSpec,
    ) -> Result<Vec<InteractionRow>, PaperRecError> {
        let sql = interaction_query(source)?;
        let rows: Vec<InteractionRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
