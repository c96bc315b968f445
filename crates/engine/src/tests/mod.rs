//! Engine scenario tests.

pub(crate) mod fakes;

mod concurrency;
mod search;

use crate::config::{ChunkConfig, EmbeddingConfig, EngineConfig};
use crate::embeddings::providers::HashProvider;
use crate::engine::RetrievalEngine;
use crate::store::{DocumentStore, SqliteStore};
use fakes::FakeProvider;
use std::sync::Arc;

/// Small chunks, fast retries.
pub(crate) fn test_config(dimensions: usize) -> EngineConfig {
    EngineConfig {
        chunking: ChunkConfig::new(100, 20),
        embedding: EmbeddingConfig {
            provider: "fake".to_string(),
            model: "fake-v1".to_string(),
            dimensions,
            batch_size: 8,
            max_concurrent_batches: 2,
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            request_timeout_secs: 5,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Engine over the hash provider and an in-memory store.
pub(crate) fn test_engine(dimensions: usize) -> RetrievalEngine {
    RetrievalEngine::open(
        test_config(dimensions),
        Arc::new(HashProvider::new(dimensions)),
        Arc::new(SqliteStore::in_memory().unwrap()),
    )
    .unwrap()
}

/// Engine over a scripted provider; the store is returned for inspection.
pub(crate) fn fake_engine(provider: Arc<FakeProvider>) -> (RetrievalEngine, Arc<SqliteStore>) {
    fake_engine_with(provider, test_config(32))
}

pub(crate) fn fake_engine_with(
    provider: Arc<FakeProvider>,
    config: EngineConfig,
) -> (RetrievalEngine, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = RetrievalEngine::open(config, provider, store.clone() as Arc<dyn DocumentStore>)
        .unwrap();
    (engine, store)
}

/// Lowercase text with no repeating period short enough to align two chunks.
pub(crate) fn sample_text(len: usize) -> String {
    (0..len)
        .map(|i| (b'a' + ((i * 7 + i / 26) % 26) as u8) as char)
        .collect()
}
