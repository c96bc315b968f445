//! Document retrieval engine.
//!
//! Splits documents into overlapping chunks, embeds them through a pluggable
//! provider, and answers cosine-similarity queries over an in-memory index
//! backed by SQLite.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod index;
pub mod locks;
pub mod registry;
pub mod rpc;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::{load_config, ChunkConfig, ChunkUnit, EmbeddingConfig, EngineConfig};
pub use embeddings::{create_provider, EmbeddingClient, EmbeddingProvider, ProviderError};
pub use engine::RetrievalEngine;
pub use rpc::{dispatch, serve, DocumentSummary, Operation};
pub use store::{DocumentStore, SqliteStore};
pub use types::{
    ConsistencyReport, DeleteOutcome, DocumentRecord, DocumentStatus, EngineStats,
    IngestOutcome, NewDocument, SearchHit,
};

use docrag_core::AppResult;
use std::path::Path;
use std::sync::Arc;

/// Open the engine for a workspace using its configuration file, the
/// configured provider, and the workspace's SQLite store.
pub fn open_workspace(workspace: &Path) -> AppResult<RetrievalEngine> {
    let config = load_config(workspace)?;
    let provider = create_provider(&config.embedding)?;
    let store = SqliteStore::open(&config.storage_path(workspace))?;

    tracing::debug!(
        "Opening engine with provider '{}' ({} dims)",
        provider.provider_name(),
        provider.dimensions()
    );
    RetrievalEngine::open(config, provider, Arc::new(store))
}
