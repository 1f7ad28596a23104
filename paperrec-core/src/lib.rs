pub mod artifacts;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod interactions;
pub mod models;
pub mod onnx_embedder;
pub mod store;
pub mod vector;

pub use artifacts::{ArtifactError, ArtifactPaths, LoadedArtifacts};
pub use config::PaperRecConfig;
pub use corpus::{PaperCorpus, PgPaperCorpus};
pub use embeddings::{
    backend_from_config, create_backend, BackendConfig, EmbeddingBackend, EmbeddingError,
    GeminiConfig, GeminiEmbeddingClient, OnnxConfig, GEMINI_DIMENSIONS, ONNX_DIMENSIONS,
};
pub use error::PaperRecError;
pub use index::{FlatIpIndex, IndexError, SearchHits, VectorIndex, NO_RESULT};
pub use interactions::{InteractionSource, PgInteractionSource};
pub use models::{InteractionRow, InteractionSourceSpec, PaperRecord};
pub use onnx_embedder::OnnxEmbeddingClient;
pub use store::{EmbeddingStore, InvalidStoreError};
