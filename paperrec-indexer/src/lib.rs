//! Offline jobs that materialise the serving artifacts.
//!
//! - `build`: full rebuild of the embedding store and vector index
//! - `update`: append papers that are not indexed yet

pub mod build;
pub mod pipeline;
pub mod update;

#[cfg(test)]
pub(crate) mod testing;

pub use build::{build_index, BuildReport};
pub use pipeline::embed_papers;
pub use update::{update_index, UpdateOutcome};
