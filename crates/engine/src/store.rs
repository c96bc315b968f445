//! Durable storage for documents and chunks.
//!
//! The engine talks to storage through [`DocumentStore`]; [`SqliteStore`] is
//! the bundled SQLite implementation. Embeddings are stored as little-endian
//! `f32` blobs.

use crate::types::{ChunkRecord, DocumentRecord, DocumentStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use docrag_core::{AppError, AppResult};
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;
use std::path::Path;

/// A document as loaded back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub record: DocumentRecord,

    /// In ordinal order
    pub chunks: Vec<ChunkRecord>,
}

/// Storage backend for document records and their chunks.
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Persist a new document record.
    fn insert_document(&self, record: &DocumentRecord) -> AppResult<()>;

    /// Overwrite the stored status of a document.
    fn set_status(&self, document_id: &str, status: DocumentStatus) -> AppResult<()>;

    /// Store all chunks of a document and mark it `ready`, atomically.
    fn commit_chunks(&self, document_id: &str, chunks: &[ChunkRecord]) -> AppResult<()>;

    /// Drop any chunks of a document and mark it `failed`, atomically.
    fn mark_failed(&self, document_id: &str) -> AppResult<()>;

    /// Remove a document and its chunks. Returns whether it existed.
    fn delete_document(&self, document_id: &str) -> AppResult<bool>;

    /// Stored chunks of one document in ordinal order.
    fn load_chunks(&self, document_id: &str) -> AppResult<Vec<ChunkRecord>>;

    /// Every stored document with its chunks, oldest first.
    fn load_all(&self) -> AppResult<Vec<StoredDocument>>;
}

/// SQLite-backed [`DocumentStore`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn storage(context: &str, err: rusqlite::Error) -> AppError {
    AppError::Storage(format!("{}: {}", context, err))
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| storage(&format!("Failed to open database at {:?}", path), e))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| storage("Failed to enable WAL", e))?;

        let store = Self::init(conn)?;
        tracing::debug!("Opened document store at {:?}", path);
        Ok(store)
    }

    /// A private in-memory database.
    pub fn in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| storage("Failed to open in-memory database", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(|e| storage("Failed to enable foreign keys", e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                mime_type TEXT,
                byte_size INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                status TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                doc_id TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                text TEXT NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                FOREIGN KEY (doc_id) REFERENCES documents(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_doc ON chunks(doc_id);
            "#,
        )
        .map_err(|e| storage("Failed to create tables", e))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl DocumentStore for SqliteStore {
    fn insert_document(&self, record: &DocumentRecord) -> AppResult<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO documents (id, filename, mime_type, byte_size, content_hash, created_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.document_id,
                    record.filename,
                    record.mime_type,
                    record.byte_size as i64,
                    record.content_hash,
                    record.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
                    record.status.as_str(),
                ],
            )
            .map_err(|e| storage("Failed to insert document", e))?;
        Ok(())
    }

    fn set_status(&self, document_id: &str, status: DocumentStatus) -> AppResult<()> {
        let updated = self
            .conn
            .lock()
            .execute(
                "UPDATE documents SET status = ?1 WHERE id = ?2",
                params![status.as_str(), document_id],
            )
            .map_err(|e| storage("Failed to update status", e))?;

        if updated == 0 {
            return Err(AppError::NotFound(format!("document {}", document_id)));
        }
        Ok(())
    }

    fn commit_chunks(&self, document_id: &str, chunks: &[ChunkRecord]) -> AppResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| storage("Failed to begin transaction", e))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO chunks (id, doc_id, ordinal, text, start_offset, end_offset, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(|e| storage("Failed to prepare chunk insert", e))?;

            for chunk in chunks {
                stmt.execute(params![
                    chunk.chunk_id,
                    document_id,
                    chunk.ordinal as i64,
                    chunk.text,
                    chunk.start as i64,
                    chunk.end as i64,
                    embedding_to_bytes(&chunk.embedding),
                ])
                .map_err(|e| storage("Failed to insert chunk", e))?;
            }
        }

        let updated = tx
            .execute(
                "UPDATE documents SET status = ?1 WHERE id = ?2",
                params![DocumentStatus::Ready.as_str(), document_id],
            )
            .map_err(|e| storage("Failed to update status", e))?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("document {}", document_id)));
        }

        tx.commit()
            .map_err(|e| storage("Failed to commit chunks", e))?;
        Ok(())
    }

    fn mark_failed(&self, document_id: &str) -> AppResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| storage("Failed to begin transaction", e))?;

        tx.execute("DELETE FROM chunks WHERE doc_id = ?1", params![document_id])
            .map_err(|e| storage("Failed to delete chunks", e))?;
        tx.execute(
            "UPDATE documents SET status = ?1 WHERE id = ?2",
            params![DocumentStatus::Failed.as_str(), document_id],
        )
        .map_err(|e| storage("Failed to update status", e))?;

        tx.commit()
            .map_err(|e| storage("Failed to commit failure", e))?;
        Ok(())
    }

    fn delete_document(&self, document_id: &str) -> AppResult<bool> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| storage("Failed to begin transaction", e))?;

        tx.execute("DELETE FROM chunks WHERE doc_id = ?1", params![document_id])
            .map_err(|e| storage("Failed to delete chunks", e))?;
        let removed = tx
            .execute("DELETE FROM documents WHERE id = ?1", params![document_id])
            .map_err(|e| storage("Failed to delete document", e))?;

        tx.commit()
            .map_err(|e| storage("Failed to commit delete", e))?;
        Ok(removed > 0)
    }

    fn load_chunks(&self, document_id: &str) -> AppResult<Vec<ChunkRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, doc_id, ordinal, text, start_offset, end_offset, embedding
                 FROM chunks WHERE doc_id = ?1 ORDER BY ordinal",
            )
            .map_err(|e| storage("Failed to prepare chunk query", e))?;

        let rows = stmt
            .query_map(params![document_id], chunk_from_row)
            .map_err(|e| storage("Failed to query chunks", e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| storage("Failed to read chunk", e))
    }

    fn load_all(&self) -> AppResult<Vec<StoredDocument>> {
        let conn = self.conn.lock();

        let mut chunks_by_doc: HashMap<String, Vec<ChunkRecord>> = HashMap::new();
        {
            let mut stmt = conn
                .prepare(
                    "SELECT id, doc_id, ordinal, text, start_offset, end_offset, embedding
                     FROM chunks ORDER BY doc_id, ordinal",
                )
                .map_err(|e| storage("Failed to prepare chunk query", e))?;

            let rows = stmt
                .query_map([], chunk_from_row)
                .map_err(|e| storage("Failed to query chunks", e))?;

            for row in rows {
                let chunk = row.map_err(|e| storage("Failed to read chunk", e))?;
                chunks_by_doc
                    .entry(chunk.document_id.clone())
                    .or_default()
                    .push(chunk);
            }
        }

        let mut stmt = conn
            .prepare(
                "SELECT id, filename, mime_type, byte_size, content_hash, created_at, status
                 FROM documents ORDER BY created_at, rowid",
            )
            .map_err(|e| storage("Failed to prepare document query", e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .map_err(|e| storage("Failed to query documents", e))?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, filename, mime_type, byte_size, content_hash, created_at, status) =
                row.map_err(|e| storage("Failed to read document", e))?;

            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| {
                    AppError::Storage(format!("Invalid created_at for document {}: {}", id, e))
                })?
                .with_timezone(&Utc);
            let status = DocumentStatus::parse(&status).ok_or_else(|| {
                AppError::Storage(format!("Invalid status '{}' for document {}", status, id))
            })?;

            let chunks = chunks_by_doc.remove(&id).unwrap_or_default();
            documents.push(StoredDocument {
                record: DocumentRecord {
                    chunk_ids: chunks.iter().map(|c| c.chunk_id.clone()).collect(),
                    document_id: id,
                    filename,
                    mime_type,
                    byte_size: byte_size as u64,
                    content_hash,
                    created_at,
                    status,
                },
                chunks,
            });
        }

        Ok(documents)
    }
}

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<ChunkRecord> {
    let bytes: Vec<u8> = row.get(6)?;
    Ok(ChunkRecord {
        chunk_id: row.get(0)?,
        document_id: row.get(1)?,
        ordinal: row.get::<_, i64>(2)? as u32,
        text: row.get(3)?,
        start: row.get::<_, i64>(4)? as usize,
        end: row.get::<_, i64>(5)? as usize,
        embedding: bytes_to_embedding(&bytes),
    })
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
