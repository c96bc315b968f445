//! Retrieval engine type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a document.
///
/// `pending -> ready | failed`, `ready | failed -> deleting -> removed`.
/// Removal destroys the record, so there is no `Removed` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Ready,
    Failed,
    Deleting,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Deleting => "deleting",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(DocumentStatus::Pending),
            "ready" => Some(DocumentStatus::Ready),
            "failed" => Some(DocumentStatus::Failed),
            "deleting" => Some(DocumentStatus::Deleting),
            _ => None,
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, next),
            (Pending, Ready) | (Pending, Failed) | (Ready, Deleting) | (Failed, Deleting)
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A document handed to the engine by the upstream extraction step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub filename: String,

    /// Already-decoded UTF-8 text
    pub text: String,

    #[serde(default)]
    pub mime_type: Option<String>,
}

impl NewDocument {
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            text: text.into(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Registry view of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub filename: String,
    pub mime_type: Option<String>,

    /// Size of the text in bytes
    pub byte_size: u64,

    /// SHA-256 of the text (informational)
    pub content_hash: String,

    pub created_at: DateTime<Utc>,
    pub status: DocumentStatus,

    /// Chunk ids in ordinal order
    #[serde(default)]
    pub chunk_ids: Vec<String>,
}

impl DocumentRecord {
    /// A fresh `pending` record with a new id.
    pub fn pending(new: &NewDocument) -> Self {
        Self {
            document_id: Uuid::new_v4().to_string(),
            filename: new.filename.clone(),
            mime_type: new.mime_type.clone(),
            byte_size: new.text.len() as u64,
            content_hash: content_hash(&new.text),
            created_at: Utc::now(),
            status: DocumentStatus::Pending,
            chunk_ids: Vec::new(),
        }
    }
}

/// SHA-256 hex digest of the text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A chunk produced by the chunker, before embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCandidate {
    /// Position within the document (0-indexed)
    pub ordinal: u32,

    pub text: String,

    /// Character offsets `[start, end)` into the source text
    pub start: usize,
    pub end: usize,

    /// Byte range into the source text
    pub byte_range: (usize, usize),
}

/// A persisted chunk with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub ordinal: u32,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub embedding: Vec<f32>,
}

/// Result of a successful ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub document_id: String,
    pub chunk_count: usize,
}

/// A ranked passage returned by search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub document_id: String,
    pub chunk_id: String,
    pub filename: String,
    pub chunk_text: String,
    pub ordinal: u32,
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub success: bool,

    /// False when the document was already gone
    pub removed: bool,
}

/// Engine-wide statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub documents: usize,
    pub pending: usize,
    pub ready: usize,
    pub failed: usize,
    pub deleting: usize,
    pub indexed_chunks: usize,
    pub dimensions: usize,
}

/// Outcome of an index/registry consistency check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Documents with index entries but no live registry record
    pub orphaned_documents: Vec<String>,

    /// Index entries removed during repair
    pub removed_entries: usize,

    /// Ready documents whose index entries were rebuilt from storage
    pub reindexed_documents: Vec<String>,

    /// Ready documents whose index entry count differs from their chunk list
    /// and could not be rebuilt
    pub mismatched_documents: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_documents.is_empty()
            && self.reindexed_documents.is_empty()
            && self.mismatched_documents.is_empty()
    }
}
