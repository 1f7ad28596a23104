use thiserror::Error;

use crate::artifacts::ArtifactError;
use crate::embeddings::EmbeddingError;
use crate::index::IndexError;
use crate::store::InvalidStoreError;

#[derive(Error, Debug)]
pub enum PaperRecError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid embedding store: {0}")]
    Store(#[from] InvalidStoreError),

    #[error("Vector index error: {0}")]
    Index(#[from] IndexError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Invalid SQL identifier in config: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid config value {field} = {value}: {reason}")]
    InvalidValue {
        field: String,
        value: f64,
        reason: &'static str,
    },

    #[error("Other error: {0}")]
    Other(String),
}
