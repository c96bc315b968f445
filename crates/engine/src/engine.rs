//! Retrieval engine: ingest, search, and delete over the index, registry,
//! and store.
//!
//! The engine owns the coupling between a document, its chunks, and their
//! index entries. Writes for one document are serialized through
//! [`DocumentLocks`]; provider calls happen with no lock on the index or the
//! registry.

use crate::chunker::chunk_text;
use crate::config::EngineConfig;
use crate::embeddings::{EmbeddingClient, EmbeddingProvider};
use crate::index::{IndexEntry, SearchFilter, VectorIndex};
use crate::locks::DocumentLocks;
use crate::registry::DocumentRegistry;
use crate::store::DocumentStore;
use crate::types::{
    ChunkRecord, ConsistencyReport, DeleteOutcome, DocumentRecord, DocumentStatus, EngineStats,
    IngestOutcome, NewDocument, SearchHit,
};
use docrag_core::{AppError, AppResult};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Document retrieval engine.
#[derive(Debug)]
pub struct RetrievalEngine {
    config: EngineConfig,
    embedder: EmbeddingClient,
    index: VectorIndex,
    registry: DocumentRegistry,
    store: Arc<dyn DocumentStore>,
    locks: DocumentLocks,
}

/// Marks an in-flight ingest as failed if its future is dropped early.
struct IngestGuard<'a> {
    engine: &'a RetrievalEngine,
    document_id: &'a str,
    armed: bool,
}

impl IngestGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for IngestGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Ingest of document {} was cancelled", self.document_id);
            self.engine.mark_failed(self.document_id);
        }
    }
}

impl RetrievalEngine {
    /// Build an engine and hydrate it from `store`.
    ///
    /// Ready documents are loaded back into the index in creation order.
    /// Documents left pending by an interrupted ingest become failed, and
    /// interrupted deletes are finished.
    pub fn open(
        config: EngineConfig,
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn DocumentStore>,
    ) -> AppResult<Self> {
        config.validate()?;

        let embedder = EmbeddingClient::new(provider, &config.embedding)?;
        let engine = Self {
            index: VectorIndex::new(config.embedding.dimensions),
            registry: DocumentRegistry::new(),
            locks: DocumentLocks::new(),
            embedder,
            store,
            config,
        };

        engine.hydrate()?;
        Ok(engine)
    }

    fn hydrate(&self) -> AppResult<()> {
        let stored = self.store.load_all()?;
        let mut indexed = 0;

        for document in stored {
            let mut record = document.record;
            let id = record.document_id.clone();

            match record.status {
                DocumentStatus::Ready => {
                    let entries: Vec<IndexEntry> =
                        document.chunks.iter().map(IndexEntry::from_chunk).collect();
                    indexed += self.index.insert(entries)?;
                }
                DocumentStatus::Pending => {
                    warn!("Document {} was interrupted during ingest; marking failed", id);
                    self.store.mark_failed(&id)?;
                    record.status = DocumentStatus::Failed;
                    record.chunk_ids.clear();
                }
                DocumentStatus::Deleting => match self.store.delete_document(&id) {
                    Ok(_) => {
                        info!("Finished interrupted delete of document {}", id);
                        continue;
                    }
                    Err(e) => {
                        warn!("Could not finish delete of document {}: {}", id, e);
                    }
                },
                DocumentStatus::Failed => {}
            }

            self.registry.restore(record)?;
        }

        info!(
            "Loaded {} documents ({} indexed chunks)",
            self.registry.len(),
            indexed
        );
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Chunk, embed, and index a document.
    ///
    /// On any failure the document is left `failed` with nothing indexed and
    /// the error is returned.
    #[instrument(skip(self, document), fields(filename = %document.filename))]
    pub async fn ingest(&self, document: NewDocument) -> AppResult<IngestOutcome> {
        if document.filename.trim().is_empty() {
            return Err(AppError::InvalidInput("filename must not be empty".to_string()));
        }

        let record = DocumentRecord::pending(&document);
        let document_id = record.document_id.clone();
        let _lock = self.locks.lock(&document_id).await;

        self.registry.register(record.clone())?;
        if let Err(e) = self.store.insert_document(&record) {
            let _ = self.registry.remove(&document_id);
            return Err(e);
        }

        let mut guard = IngestGuard {
            engine: self,
            document_id: &document_id,
            armed: true,
        };

        let result = self.ingest_registered(&document_id, &document).await;
        guard.disarm();

        match result {
            Ok(outcome) => {
                info!(
                    "Ingested {} as {} ({} chunks)",
                    document.filename, document_id, outcome.chunk_count
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!("Ingest of {} failed: {}", document.filename, e);
                self.mark_failed(&document_id);
                Err(e)
            }
        }
    }

    async fn ingest_registered(
        &self,
        document_id: &str,
        document: &NewDocument,
    ) -> AppResult<IngestOutcome> {
        let candidates = chunk_text(&document.text, &self.config.chunking)?;

        if candidates.is_empty() {
            self.store.commit_chunks(document_id, &[])?;
            self.registry.set_status(document_id, DocumentStatus::Ready)?;
            return Ok(IngestOutcome {
                document_id: document_id.to_string(),
                chunk_count: 0,
            });
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        let chunks: Vec<ChunkRecord> = candidates
            .into_iter()
            .zip(vectors)
            .map(|(candidate, embedding)| ChunkRecord {
                chunk_id: Uuid::new_v4().to_string(),
                document_id: document_id.to_string(),
                ordinal: candidate.ordinal,
                text: candidate.text,
                start: candidate.start,
                end: candidate.end,
                embedding,
            })
            .collect();

        for chunk in &chunks {
            self.index.check_vector(&chunk.embedding)?;
        }

        // No await from here on: storage, index, and registry move together.
        self.store.commit_chunks(document_id, &chunks)?;
        self.index
            .insert(chunks.iter().map(IndexEntry::from_chunk).collect())?;
        self.registry
            .attach_chunks(document_id, chunks.iter().map(|c| c.chunk_id.clone()).collect())?;
        self.registry.set_status(document_id, DocumentStatus::Ready)?;

        Ok(IngestOutcome {
            document_id: document_id.to_string(),
            chunk_count: chunks.len(),
        })
    }

    /// Best effort: leave a document `failed` with no index entries.
    fn mark_failed(&self, document_id: &str) {
        self.index.delete_by_document(document_id);
        if let Err(e) = self.store.mark_failed(document_id) {
            error!("Failed to persist failure of document {}: {}", document_id, e);
        }
        if let Err(e) = self.registry.set_status(document_id, DocumentStatus::Failed) {
            error!("Failed to mark document {} failed: {}", document_id, e);
        }
    }

    /// Ranked passages for `query`, at most `k`.
    ///
    /// Only `ready` documents are searched. A blank query or `k == 0` yields
    /// no results without calling the provider.
    #[instrument(skip(self, query))]
    pub async fn search(&self, query: &str, k: usize) -> AppResult<Vec<SearchHit>> {
        if query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed_one(query).await?;

        let filter = SearchFilter::default()
            .documents(self.registry.searchable_ids())
            .min_score(self.config.search.min_score);
        let hits = self.index.search(&vector, k, &filter)?;

        // A hit whose document was deleted after the scan is dropped.
        let results: Vec<SearchHit> = hits
            .into_iter()
            .filter_map(|hit| {
                let record = self.registry.get(&hit.document_id).ok()?;
                Some(SearchHit {
                    document_id: hit.document_id,
                    chunk_id: hit.chunk_id,
                    filename: record.filename,
                    chunk_text: hit.text,
                    ordinal: hit.ordinal,
                    start: hit.start,
                    end: hit.end,
                    score: hit.score,
                })
            })
            .collect();

        debug!("Search returned {} results", results.len());
        Ok(results)
    }

    /// Drop index entries of a document the registry no longer tracks.
    ///
    /// Returns the number of entries removed. A document that was deleted
    /// concurrently is not an orphan and is left alone.
    async fn repair_orphan(&self, document_id: &str) -> usize {
        let _lock = self.locks.lock(document_id).await;

        let orphaned = match self.registry.get(document_id) {
            Ok(record) => record.status == DocumentStatus::Failed,
            Err(_) => true,
        };
        if !orphaned || !self.index.contains_document(document_id) {
            return 0;
        }

        let err = AppError::InconsistentState(format!(
            "index holds entries for document {} which is not live",
            document_id
        ));
        error!("{}", err);

        let removed = self.index.delete_by_document(document_id);
        warn!("Removed {} orphaned entries of document {}", removed, document_id);
        removed
    }

    /// Remove a document from the index, storage, and registry.
    ///
    /// Deleting an unknown id succeeds with `removed: false`. Waits for an
    /// in-flight ingest of the same document.
    #[instrument(skip(self))]
    pub async fn delete(&self, document_id: &str) -> AppResult<DeleteOutcome> {
        let _lock = self.locks.lock(document_id).await;

        let record = match self.registry.get(document_id) {
            Ok(record) => record,
            Err(AppError::NotFound(_)) => {
                debug!("Document {} already gone", document_id);
                return Ok(DeleteOutcome {
                    success: true,
                    removed: false,
                });
            }
            Err(e) => return Err(e),
        };

        match record.status {
            DocumentStatus::Pending => {
                return Err(AppError::InvalidInput(format!(
                    "document {} is still being ingested",
                    document_id
                )))
            }
            DocumentStatus::Deleting => {
                info!("Resuming delete of document {}", document_id);
            }
            DocumentStatus::Ready | DocumentStatus::Failed => {
                self.store.set_status(document_id, DocumentStatus::Deleting)?;
                self.registry.set_status(document_id, DocumentStatus::Deleting)?;
            }
        }

        let removed_entries = self.index.delete_by_document(document_id);
        self.store.delete_document(document_id)?;
        self.registry.remove(document_id)?;

        info!(
            "Deleted document {} ({}, {} index entries)",
            document_id, record.filename, removed_entries
        );
        Ok(DeleteOutcome {
            success: true,
            removed: true,
        })
    }

    pub fn get_document(&self, document_id: &str) -> AppResult<DocumentRecord> {
        self.registry.get(document_id)
    }

    /// Visible documents, oldest first.
    pub fn list_documents(&self) -> Vec<DocumentRecord> {
        self.registry.list()
    }

    pub fn stats(&self) -> EngineStats {
        let mut stats = EngineStats {
            indexed_chunks: self.index.len(),
            dimensions: self.index.dimensions(),
            ..Default::default()
        };

        for record in self.registry.all() {
            stats.documents += 1;
            match record.status {
                DocumentStatus::Pending => stats.pending += 1,
                DocumentStatus::Ready => stats.ready += 1,
                DocumentStatus::Failed => stats.failed += 1,
                DocumentStatus::Deleting => stats.deleting += 1,
            }
        }

        stats
    }

    /// Compare the index against the registry and remove orphaned entries.
    pub async fn verify(&self) -> AppResult<ConsistencyReport> {
        let mut report = ConsistencyReport::default();

        let mut suspects: Vec<String> = self.index.document_ids().into_iter().collect();
        suspects.sort();
        for document_id in suspects {
            let removed = self.repair_orphan(&document_id).await;
            if removed > 0 {
                report.orphaned_documents.push(document_id);
                report.removed_entries += removed;
            }
        }

        let counts = self.index.entry_counts();
        for record in self.registry.all() {
            if record.status != DocumentStatus::Ready {
                continue;
            }
            let indexed = counts.get(&record.document_id).copied().unwrap_or(0);
            if indexed == record.chunk_ids.len() {
                continue;
            }

            error!(
                "Document {} has {} chunks but {} index entries",
                record.document_id,
                record.chunk_ids.len(),
                indexed
            );
            match self.reindex(&record.document_id).await {
                Ok(true) => report.reindexed_documents.push(record.document_id),
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to reindex document {}: {}", record.document_id, e);
                    report.mismatched_documents.push(record.document_id);
                }
            }
        }

        if report.is_clean() {
            info!("Index and registry are consistent");
        }
        Ok(report)
    }

    /// Rebuild the index entries of a ready document from its stored chunks.
    ///
    /// Returns `false` if the document stopped being ready in the meantime.
    async fn reindex(&self, document_id: &str) -> AppResult<bool> {
        let _lock = self.locks.lock(document_id).await;

        let record = match self.registry.get(document_id) {
            Ok(record) if record.status == DocumentStatus::Ready => record,
            _ => return Ok(false),
        };

        let chunks = self.store.load_chunks(document_id)?;
        if chunks.len() != record.chunk_ids.len() {
            return Err(AppError::InconsistentState(format!(
                "document {} has {} stored chunks but {} registered",
                document_id,
                chunks.len(),
                record.chunk_ids.len()
            )));
        }

        self.index.delete_by_document(document_id);
        let inserted = self
            .index
            .insert(chunks.iter().map(IndexEntry::from_chunk).collect())?;
        warn!("Reindexed {} chunks of document {}", inserted, document_id);
        Ok(true)
    }

    #[cfg(test)]
    pub(crate) fn index_for_tests(&self) -> &VectorIndex {
        &self.index
    }
}
