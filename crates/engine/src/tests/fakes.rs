//! Scripted embedding provider and failure-injecting store.

use crate::embeddings::{EmbeddingProvider, ProviderError};
use crate::store::{DocumentStore, SqliteStore, StoredDocument};
use crate::types::{ChunkRecord, DocumentRecord, DocumentStatus};
use docrag_core::{AppError, AppResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// What the next provider call does.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Transient,
    Unauthenticated,
    Rejected,
    /// Never completes
    Hang,
    /// Succeeds once the gate is notified
    Wait(Arc<Notify>),
    DropLast,
    WrongDimensions(usize),
}

/// Provider that follows a script, then succeeds.
///
/// Successful calls return a pseudo-random vector derived from each text, so
/// equal texts embed identically and distinct texts are nearly orthogonal.
#[derive(Debug)]
pub struct FakeProvider {
    dimensions: usize,
    script: Mutex<VecDeque<Step>>,
    fixed: Mutex<HashMap<String, Vec<f32>>>,
    calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    started: Notify,
}

impl FakeProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            script: Mutex::new(VecDeque::new()),
            fixed: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
            started: Notify::new(),
        }
    }

    pub fn script(self, steps: Vec<Step>) -> Self {
        self.script.lock().extend(steps);
        self
    }

    /// Queue more steps on a shared provider.
    pub fn push(&self, step: Step) {
        self.script.lock().push_back(step);
    }

    /// Pin the embedding of one exact text.
    pub fn with_vector(self, text: &str, vector: Vec<f32>) -> Self {
        self.fixed.lock().insert(text.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    /// Resolves once a call has reached the provider.
    pub async fn wait_for_call(&self) {
        self.started.notified().await;
    }

    pub fn vector_for(text: &str, dimensions: usize) -> Vec<f32> {
        let mut state = text
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
                (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
            })
            | 1;

        (0..dimensions)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                ((state >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
            })
            .collect()
    }

    fn vectors(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let fixed = self.fixed.lock();
        texts
            .iter()
            .map(|t| {
                fixed
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| Self::vector_for(t, self.dimensions))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FakeProvider {
    fn provider_name(&self) -> &str {
        "fake"
    }

    fn model_name(&self) -> &str {
        "fake-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().push(texts.len());
        self.started.notify_one();

        let step = self.script.lock().pop_front().unwrap_or(Step::Succeed);
        match step {
            Step::Succeed => Ok(self.vectors(texts)),
            Step::Transient => Err(ProviderError::Transient("scripted 503".to_string())),
            Step::Unauthenticated => {
                Err(ProviderError::Unauthenticated("scripted 401".to_string()))
            }
            Step::Rejected => Err(ProviderError::Rejected("scripted 400".to_string())),
            Step::Hang => std::future::pending().await,
            Step::Wait(gate) => {
                gate.notified().await;
                Ok(self.vectors(texts))
            }
            Step::DropLast => {
                let mut vectors = self.vectors(texts);
                vectors.pop();
                Ok(vectors)
            }
            Step::WrongDimensions(d) => Ok(texts.iter().map(|t| Self::vector_for(t, d)).collect()),
        }
    }
}

/// SQLite store whose deletes and commits can be made to fail.
#[derive(Debug)]
pub struct FlakyStore {
    inner: SqliteStore,
    pub fail_deletes: AtomicBool,
    pub fail_commits: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::in_memory().unwrap(),
            fail_deletes: AtomicBool::new(false),
            fail_commits: AtomicBool::new(false),
        }
    }
}

impl DocumentStore for FlakyStore {
    fn insert_document(&self, record: &DocumentRecord) -> AppResult<()> {
        self.inner.insert_document(record)
    }

    fn set_status(&self, document_id: &str, status: DocumentStatus) -> AppResult<()> {
        self.inner.set_status(document_id, status)
    }

    fn commit_chunks(&self, document_id: &str, chunks: &[ChunkRecord]) -> AppResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(AppError::Storage("disk full".to_string()));
        }
        self.inner.commit_chunks(document_id, chunks)
    }

    fn mark_failed(&self, document_id: &str) -> AppResult<()> {
        self.inner.mark_failed(document_id)
    }

    fn delete_document(&self, document_id: &str) -> AppResult<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Storage("database is locked".to_string()));
        }
        self.inner.delete_document(document_id)
    }

    fn load_chunks(&self, document_id: &str) -> AppResult<Vec<ChunkRecord>> {
        self.inner.load_chunks(document_id)
    }

    fn load_all(&self) -> AppResult<Vec<StoredDocument>> {
        self.inner.load_all()
    }
}
