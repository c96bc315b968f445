//! Add command handler.
//!
//! Ingests plain-text files, or every file under a directory.

use anyhow::Context;
use clap::Args;
use docrag_core::{config::AppConfig, AppError, AppResult};
use docrag_engine::NewDocument;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Add documents to the index
#[derive(Args, Debug)]
pub struct AddCommand {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// MIME type to record (guessed from the extension when omitted)
    #[arg(long)]
    pub mime_type: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AddCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing add command for {} paths", self.paths.len());

        let engine = docrag_engine::open_workspace(&config.workspace)?;
        let files = collect_files(&self.paths)?;

        let mut results = Vec::new();
        let mut failures = 0;
        for file in &files {
            let document = read_document(file, self.mime_type.as_deref())
                .map_err(|e| AppError::InvalidInput(format!("{:#}", e)))?;

            match engine.ingest(document).await {
                Ok(outcome) => {
                    if !self.json {
                        println!(
                            "Added {} as {} ({} chunks)",
                            file.display(),
                            outcome.document_id,
                            outcome.chunk_count
                        );
                    }
                    results.push(serde_json::json!({
                        "path": file,
                        "document_id": outcome.document_id,
                        "chunk_count": outcome.chunk_count,
                    }));
                }
                Err(e) if e.is_configuration() => return Err(e),
                Err(e) => {
                    failures += 1;
                    eprintln!("Failed to add {}: {}", file.display(), e);
                    results.push(serde_json::json!({
                        "path": file,
                        "error": {
                            "code": e.code(),
                            "message": e.to_string(),
                            "retryable": e.is_retryable(),
                        },
                    }));
                }
            }
        }

        if self.json {
            super::print_json(&serde_json::Value::Array(results))?;
        }

        if failures > 0 {
            return Err(AppError::InvalidInput(format!(
                "{} of {} documents failed to ingest",
                failures,
                files.len()
            )));
        }
        Ok(())
    }
}

/// Expand directories into the files beneath them, skipping hidden entries.
fn collect_files(paths: &[PathBuf]) -> AppResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
            {
                let entry = entry.map_err(|e| AppError::Io(e.into()))?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(AppError::NotFound(format!("path {}", path.display())));
        }
    }

    tracing::debug!("Collected {} files", files.len());
    Ok(files)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn read_document(path: &Path, mime_type: Option<&str>) -> anyhow::Result<NewDocument> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} as UTF-8 text", path.display()))?;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?;

    let mut document = NewDocument::new(filename, text);
    if let Some(mime) = mime_type.map(str::to_string).or_else(|| guess_mime_type(path)) {
        document = document.with_mime_type(mime);
    }
    Ok(document)
}

fn guess_mime_type(path: &Path) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
}
