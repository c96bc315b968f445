//! In-memory vector index with exact cosine search.
//!
//! Entries live in immutable per-batch segments. The current set of segments
//! is an `Arc<Snapshot>` behind a lock that is only held long enough to clone
//! or swap the `Arc`: searches scan a cloned snapshot without any lock, and
//! writers build a new snapshot and publish it in one swap. A search therefore
//! sees either all or none of a batch.

use crate::types::ChunkRecord;
use docrag_core::{AppError, AppResult};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A searchable projection of one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub ordinal: u32,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub vector: Vec<f32>,
    pub norm: f32,

    /// Assigned on insert; breaks score ties
    pub seq: u64,
}

impl IndexEntry {
    pub fn from_chunk(chunk: &ChunkRecord) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            document_id: chunk.document_id.clone(),
            ordinal: chunk.ordinal,
            text: chunk.text.clone(),
            start: chunk.start,
            end: chunk.end,
            norm: l2_norm(&chunk.embedding),
            vector: chunk.embedding.clone(),
            seq: 0,
        }
    }
}

/// A search result, without the stored vector.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub chunk_id: String,
    pub document_id: String,
    pub ordinal: u32,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub score: f32,
    pub seq: u64,
}

/// Restricts which entries a search may return.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub document_ids: Option<HashSet<String>>,
    pub min_score: Option<f32>,
}

impl SearchFilter {
    pub fn documents(mut self, ids: HashSet<String>) -> Self {
        self.document_ids = Some(ids);
        self
    }

    pub fn min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    fn admits_document(&self, document_id: &str) -> bool {
        self.document_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(document_id))
    }
}

#[derive(Debug, Default)]
struct Segment {
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Default)]
struct Snapshot {
    segments: Vec<Arc<Segment>>,
    len: usize,
}

/// Exact-scan cosine index of fixed dimensionality.
#[derive(Debug)]
pub struct VectorIndex {
    dimensions: usize,
    current: RwLock<Arc<Snapshot>>,

    /// Serializes writers; holds the next insertion sequence number
    writer: Mutex<u64>,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            current: RwLock::new(Arc::new(Snapshot::default())),
            writer: Mutex::new(0),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.snapshot().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Check that a vector could be inserted.
    pub fn check_vector(&self, vector: &[f32]) -> AppResult<()> {
        if vector.len() != self.dimensions {
            return Err(AppError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(AppError::InvalidInput(
                "vector contains a non-finite component".to_string(),
            ));
        }
        Ok(())
    }

    /// Publish a batch of entries as one segment.
    ///
    /// Nothing is inserted unless every entry is valid. Returns the number of
    /// entries inserted.
    pub fn insert(&self, mut entries: Vec<IndexEntry>) -> AppResult<usize> {
        for entry in &entries {
            self.check_vector(&entry.vector)?;
        }
        if entries.is_empty() {
            return Ok(0);
        }

        let mut next_seq = self.writer.lock();
        for entry in &mut entries {
            entry.seq = *next_seq;
            *next_seq += 1;
        }

        let count = entries.len();
        let base = self.snapshot();
        let mut segments = base.segments.clone();
        segments.push(Arc::new(Segment { entries }));

        *self.current.write() = Arc::new(Snapshot {
            segments,
            len: base.len + count,
        });

        tracing::debug!("Indexed {} entries ({} total)", count, base.len + count);
        Ok(count)
    }

    /// Remove every entry of a document. Returns how many were removed.
    pub fn delete_by_document(&self, document_id: &str) -> usize {
        let _writer = self.writer.lock();
        let base = self.snapshot();

        let mut removed = 0;
        let mut segments = Vec::with_capacity(base.segments.len());
        for segment in &base.segments {
            let hits = segment
                .entries
                .iter()
                .filter(|e| e.document_id == document_id)
                .count();

            if hits == 0 {
                segments.push(segment.clone());
                continue;
            }

            removed += hits;
            if hits < segment.entries.len() {
                let entries = segment
                    .entries
                    .iter()
                    .filter(|e| e.document_id != document_id)
                    .cloned()
                    .collect();
                segments.push(Arc::new(Segment { entries }));
            }
        }

        if removed > 0 {
            *self.current.write() = Arc::new(Snapshot {
                segments,
                len: base.len - removed,
            });
            tracing::debug!("Removed {} entries of document {}", removed, document_id);
        }

        removed
    }

    /// Up to `k` entries by descending cosine similarity.
    ///
    /// Equal scores keep insertion order. A zero query vector scores every
    /// entry 0.
    pub fn search(&self, query: &[f32], k: usize, filter: &SearchFilter) -> AppResult<Vec<IndexHit>> {
        self.check_vector(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = l2_norm(query);
        let snapshot = self.snapshot();

        let mut scored: Vec<(&IndexEntry, f32)> = snapshot
            .segments
            .iter()
            .flat_map(|segment| segment.entries.iter())
            .filter(|entry| filter.admits_document(&entry.document_id))
            .map(|entry| (entry, cosine(query, query_norm, &entry.vector, entry.norm)))
            .filter(|(_, score)| filter.min_score.map_or(true, |min| *score >= min))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.seq.cmp(&b.0.seq)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(entry, score)| IndexHit {
                chunk_id: entry.chunk_id.clone(),
                document_id: entry.document_id.clone(),
                ordinal: entry.ordinal,
                text: entry.text.clone(),
                start: entry.start,
                end: entry.end,
                score,
                seq: entry.seq,
            })
            .collect())
    }

    /// Documents with at least one entry.
    pub fn document_ids(&self) -> HashSet<String> {
        self.entry_counts().into_keys().collect()
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.snapshot()
            .segments
            .iter()
            .any(|s| s.entries.iter().any(|e| e.document_id == document_id))
    }

    /// Entry count per document.
    pub fn entry_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for segment in &self.snapshot().segments {
            for entry in &segment.entries {
                *counts.entry(entry.document_id.clone()).or_insert(0) += 1;
            }
        }
        counts
    }
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}
