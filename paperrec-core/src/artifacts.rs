//! Persisted artifacts shared by the offline jobs and the server.
//!
//! Three files, all MessagePack:
//! - raw embedding matrix, an `Array2<f32>` of shape (N, D)
//! - paper-id array, `Vec<i64>` of length N, row-aligned with the matrix
//! - the vector index (`IndexFile`), which carries its own ids
//!
//! Every write goes to a sibling temp file which is fsynced and renamed over
//! the target, so a reader never sees a half-written artifact. Writers save
//! the store first and the index last.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::index::{FlatIpIndex, IndexError, IndexFile, VectorIndex};
use crate::store::{EmbeddingStore, InvalidStoreError};

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Artifact not found at {path}; run `paperrec-indexer build` first")]
    Missing { path: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: rmp_serde::encode::Error,
    },

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: rmp_serde::decode::Error,
    },

    #[error("Invalid embedding store: {0}")]
    Store(#[from] InvalidStoreError),

    #[error("Invalid index: {0}")]
    Index(#[from] IndexError),

    #[error("Store has {store} dimensions but index has {index}")]
    DimensionMismatch { store: usize, index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub embeddings: PathBuf,
    pub paper_ids: PathBuf,
    pub index: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            embeddings: dir.join("embeddings.msgpack"),
            paper_ids: dir.join("paper_ids.msgpack"),
            index: dir.join("papers.index"),
        }
    }
}

/// The store and index as loaded for serving.
#[derive(Debug, Clone)]
pub struct LoadedArtifacts {
    pub store: EmbeddingStore,
    pub index: FlatIpIndex,
}

pub fn save_store(store: &EmbeddingStore, paths: &ArtifactPaths) -> Result<(), ArtifactError> {
    write_msgpack(&paths.embeddings, store.raw())?;
    write_msgpack(&paths.paper_ids, store.paper_ids())?;
    tracing::info!(
        rows = store.len(),
        dimensions = store.dimensions(),
        path = %paths.embeddings.display(),
        "Saved embedding store"
    );
    Ok(())
}

pub fn load_store(paths: &ArtifactPaths) -> Result<EmbeddingStore, ArtifactError> {
    let raw: Array2<f32> = read_msgpack(&paths.embeddings)?;
    let ids: Vec<i64> = read_msgpack(&paths.paper_ids)?;
    Ok(EmbeddingStore::load(raw, ids)?)
}

pub fn save_index(index: &FlatIpIndex, paths: &ArtifactPaths) -> Result<(), ArtifactError> {
    write_msgpack(&paths.index, &index.to_file())?;
    tracing::info!(
        vectors = index.len(),
        build_id = %index.build_id(),
        path = %paths.index.display(),
        "Saved vector index"
    );
    Ok(())
}

pub fn load_index(paths: &ArtifactPaths) -> Result<FlatIpIndex, ArtifactError> {
    let file: IndexFile = read_msgpack(&paths.index)?;
    Ok(FlatIpIndex::from_file(file)?)
}

/// Load both artifacts and check they agree. A dimension mismatch is fatal;
/// diverging id sets are only reported, since they mean the artifacts are stale
/// rather than corrupt.
pub fn load_serving_state(paths: &ArtifactPaths) -> Result<LoadedArtifacts, ArtifactError> {
    let store = load_store(paths)?;
    let index = load_index(paths)?;

    if store.dimensions() != index.dimensions() {
        return Err(ArtifactError::DimensionMismatch {
            store: store.dimensions(),
            index: index.dimensions(),
        });
    }

    let only_in_index = index
        .id_set()
        .iter()
        .filter(|id| !store.contains(**id))
        .count();
    let only_in_store = store
        .paper_ids()
        .iter()
        .filter(|id| !index.contains(**id))
        .count();
    if only_in_index > 0 || only_in_store > 0 {
        tracing::warn!(
            only_in_index,
            only_in_store,
            "Embedding store and vector index cover different papers"
        );
    }

    tracing::info!(
        papers = store.len(),
        vectors = index.len(),
        dimensions = store.dimensions(),
        build_id = %index.build_id(),
        "Loaded serving artifacts"
    );

    Ok(LoadedArtifacts { store, index })
}

fn write_msgpack<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let bytes = rmp_serde::to_vec_named(value).map_err(|source| ArtifactError::Encode {
        path: path.display().to_string(),
        source,
    })?;
    write_atomic(path, &bytes).map_err(|source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn read_msgpack<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ArtifactError::Missing {
                path: path.display().to_string(),
            });
        }
        Err(source) => {
            return Err(ArtifactError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };
    rmp_serde::from_read(BufReader::new(file)).map_err(|source| ArtifactError::Decode {
        path: path.display().to_string(),
        source,
    })
}

/// Write-new-then-rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    let result = (|| {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        std::fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}
