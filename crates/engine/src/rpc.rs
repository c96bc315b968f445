//! Line-delimited JSON-RPC 2.0 adapter.
//!
//! Each input line is one request. Requests run concurrently; each response
//! is written as one line carrying the request id. Requests without an id
//! are notifications and get no response.

use crate::engine::RetrievalEngine;
use crate::types::{DocumentRecord, DocumentStatus, NewDocument};
use chrono::{DateTime, Utc};
use docrag_core::{AppError, AppResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;

/// Every operation the engine exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Operation {
    AddDocument {
        filename: String,
        text: String,
        #[serde(default)]
        mime_type: Option<String>,
    },
    ListDocuments,
    DeleteDocument {
        document_id: String,
    },
    SearchDocuments {
        query: String,
        /// Defaults to the configured `default_top_k`
        #[serde(default)]
        k: Option<usize>,
    },
    GetDocument {
        document_id: String,
    },
    Stats,
}

impl Operation {
    pub const METHODS: &'static [&'static str] = &[
        "add_document",
        "list_documents",
        "delete_document",
        "search_documents",
        "get_document",
        "stats",
    ];

    /// Build an operation from a method name and its params.
    ///
    /// Empty params (`null`, `{}`, `[]`) are accepted for methods that take
    /// none.
    pub fn from_call(method: &str, params: Option<Value>) -> AppResult<Self> {
        let params = params.filter(|p| match p {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        });

        let call = match params {
            Some(params) => json!({ "method": method, "params": params }),
            None => json!({ "method": method }),
        };

        serde_json::from_value(call)
            .map_err(|e| AppError::InvalidInput(format!("invalid params for {}: {}", method, e)))
    }
}

/// Document metadata as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: DocumentStatus,
    pub byte_size: u64,
    pub chunk_count: usize,
    pub content_hash: String,
}

impl From<DocumentRecord> for DocumentSummary {
    fn from(record: DocumentRecord) -> Self {
        Self {
            chunk_count: record.chunk_ids.len(),
            document_id: record.document_id,
            filename: record.filename,
            mime_type: record.mime_type,
            created_at: record.created_at,
            status: record.status,
            byte_size: record.byte_size,
            content_hash: record.content_hash,
        }
    }
}

/// Run one operation against the engine.
pub async fn dispatch(engine: &RetrievalEngine, operation: Operation) -> AppResult<Value> {
    let value = match operation {
        Operation::AddDocument {
            filename,
            text,
            mime_type,
        } => {
            let document = NewDocument {
                filename,
                text,
                mime_type,
            };
            serde_json::to_value(engine.ingest(document).await?)?
        }
        Operation::ListDocuments => {
            let documents: Vec<DocumentSummary> = engine
                .list_documents()
                .into_iter()
                .map(DocumentSummary::from)
                .collect();
            serde_json::to_value(documents)?
        }
        Operation::DeleteDocument { document_id } => {
            serde_json::to_value(engine.delete(&document_id).await?)?
        }
        Operation::SearchDocuments { query, k } => {
            let k = k.unwrap_or(engine.config().search.default_top_k);
            serde_json::to_value(engine.search(&query, k).await?)?
        }
        Operation::GetDocument { document_id } => {
            serde_json::to_value(DocumentSummary::from(engine.get_document(&document_id)?))?
        }
        Operation::Stats => serde_json::to_value(engine.stats())?,
    };
    Ok(value)
}

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default, deserialize_with = "present")]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

/// An `id` that is present, even as `null`, marks a call rather than a
/// notification.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Handle one request line. Returns `None` for blank lines and notifications.
pub async fn handle_line(engine: &RetrievalEngine, line: &str) -> Option<Response> {
    if line.trim().is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            return Some(Response::failure(
                Value::Null,
                PARSE_ERROR,
                format!("parse error: {}", e),
            ))
        }
    };

    let raw_id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: Request = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return Some(Response::failure(
                raw_id,
                INVALID_REQUEST,
                format!("invalid request: {}", e),
            ))
        }
    };

    let id = request.id.clone();
    let response = handle_request(engine, request).await;
    id.map(|_| response)
}

async fn handle_request(engine: &RetrievalEngine, request: Request) -> Response {
    let id = request.id.unwrap_or(Value::Null);

    if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
        return Response::failure(id, INVALID_REQUEST, "jsonrpc must be \"2.0\"");
    }
    if !Operation::METHODS.contains(&request.method.as_str()) {
        return Response::failure(
            id,
            METHOD_NOT_FOUND,
            format!("unknown method: {}", request.method),
        );
    }

    let operation = match Operation::from_call(&request.method, request.params) {
        Ok(operation) => operation,
        Err(e) => return Response::failure(id, e.code(), e.to_string()),
    };

    debug!("Dispatching {}", request.method);
    match dispatch(engine, operation).await {
        Ok(result) => Response::success(id, result),
        Err(e) => {
            warn!("{} failed: {}", request.method, e);
            Response::failure(id, e.code(), e.to_string())
        }
    }
}

/// Serve requests from `reader` until end of input, writing responses to
/// `writer` as they complete.
pub async fn serve<R, W>(engine: Arc<RetrievalEngine>, reader: R, mut writer: W) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();
    let mut lines = reader.lines();
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    let engine = engine.clone();
                    let tx = tx.clone();
                    tasks.spawn(async move {
                        if let Some(response) = handle_line(&engine, &line).await {
                            let _ = tx.send(response);
                        }
                    });
                }
                None => break,
            },
            Some(response) = rx.recv() => write_response(&mut writer, &response).await?,
        }
    }

    drop(tx);
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!("Request task failed: {}", e);
        }
    }
    while let Some(response) = rx.recv().await {
        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> AppResult<()> {
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
