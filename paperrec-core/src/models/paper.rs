use serde::{Deserialize, Serialize};

/// A paper eligible for indexing (it has an abstract).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaperRecord {
    pub paper_id: i64,
    pub title: String,
    pub abstract_text: String,
}

impl PaperRecord {
    /// Text handed to the embedding service. Must stay stable across builds.
    pub fn retrieval_text(&self) -> String {
        retrieval_text(&self.title, &self.abstract_text)
    }
}

pub const TEXT_SEPARATOR: &str = " [SEP] ";

pub fn retrieval_text(title: &str, abstract_text: &str) -> String {
    format!("{title}{TEXT_SEPARATOR}{abstract_text}")
}
