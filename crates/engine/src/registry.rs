//! Document registry: the authoritative record of every live document.

use crate::types::{DocumentRecord, DocumentStatus};
use docrag_core::{AppError, AppResult};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Debug)]
struct Entry {
    record: DocumentRecord,

    /// Registration order, breaks `created_at` ties
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<String, Entry>,
    next_seq: u64,
}

/// In-memory map from document id to its record.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    inner: RwLock<Inner>,
}

fn not_found(document_id: &str) -> AppError {
    AppError::NotFound(format!("document {}", document_id))
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new `pending` document. Returns its id.
    pub fn register(&self, record: DocumentRecord) -> AppResult<String> {
        if record.status != DocumentStatus::Pending {
            return Err(AppError::InvalidInput(format!(
                "new documents must be pending, got {}",
                record.status
            )));
        }
        self.insert(record)
    }

    /// Re-insert a record loaded from storage, whatever its status.
    pub fn restore(&self, record: DocumentRecord) -> AppResult<String> {
        self.insert(record)
    }

    fn insert(&self, record: DocumentRecord) -> AppResult<String> {
        let mut inner = self.inner.write();
        if inner.documents.contains_key(&record.document_id) {
            return Err(AppError::InvalidInput(format!(
                "document {} is already registered",
                record.document_id
            )));
        }

        let id = record.document_id.clone();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.documents.insert(id.clone(), Entry { record, seq });
        Ok(id)
    }

    /// Record the chunk ids of a document. Only allowed once.
    pub fn attach_chunks(&self, document_id: &str, chunk_ids: Vec<String>) -> AppResult<()> {
        let mut inner = self.inner.write();
        let entry = inner
            .documents
            .get_mut(document_id)
            .ok_or_else(|| not_found(document_id))?;

        if !entry.record.chunk_ids.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "document {} already has chunks attached",
                document_id
            )));
        }
        entry.record.chunk_ids = chunk_ids;
        Ok(())
    }

    /// Move a document to `status`. Setting the current status is a no-op.
    pub fn set_status(&self, document_id: &str, status: DocumentStatus) -> AppResult<()> {
        let mut inner = self.inner.write();
        let entry = inner
            .documents
            .get_mut(document_id)
            .ok_or_else(|| not_found(document_id))?;

        let current = entry.record.status;
        if current == status {
            return Ok(());
        }
        if !current.can_transition_to(status) {
            return Err(AppError::InvalidInput(format!(
                "document {} cannot move from {} to {}",
                document_id, current, status
            )));
        }

        entry.record.status = status;
        Ok(())
    }

    pub fn get(&self, document_id: &str) -> AppResult<DocumentRecord> {
        self.inner
            .read()
            .documents
            .get(document_id)
            .map(|e| e.record.clone())
            .ok_or_else(|| not_found(document_id))
    }

    /// Visible documents, oldest first. Documents being deleted are hidden.
    pub fn list(&self) -> Vec<DocumentRecord> {
        self.all()
            .into_iter()
            .filter(|r| r.status != DocumentStatus::Deleting)
            .collect()
    }

    /// Every registered document, oldest first.
    pub fn all(&self) -> Vec<DocumentRecord> {
        let inner = self.inner.read();
        let mut entries: Vec<&Entry> = inner.documents.values().collect();
        entries.sort_by(|a, b| {
            a.record
                .created_at
                .cmp(&b.record.created_at)
                .then(a.seq.cmp(&b.seq))
        });
        entries.into_iter().map(|e| e.record.clone()).collect()
    }

    /// Drop a document. Returns its chunk ids.
    pub fn remove(&self, document_id: &str) -> AppResult<Vec<String>> {
        self.inner
            .write()
            .documents
            .remove(document_id)
            .map(|e| e.record.chunk_ids)
            .ok_or_else(|| not_found(document_id))
    }

    /// Ids of documents that may appear in search results.
    pub fn searchable_ids(&self) -> HashSet<String> {
        self.inner
            .read()
            .documents
            .values()
            .filter(|e| e.record.status == DocumentStatus::Ready)
            .map(|e| e.record.document_id.clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().documents.len()
    }
}
