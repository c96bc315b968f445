//! List command handler.

use clap::Args;
use docrag_core::{config::AppConfig, AppResult};
use docrag_engine::DocumentSummary;

/// List documents, oldest first
#[derive(Args, Debug)]
pub struct ListCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing list command");

        let engine = docrag_engine::open_workspace(&config.workspace)?;
        let documents: Vec<DocumentSummary> = engine
            .list_documents()
            .into_iter()
            .map(DocumentSummary::from)
            .collect();

        if self.json {
            return super::print_json(&serde_json::to_value(&documents)?);
        }

        if documents.is_empty() {
            println!("No documents");
            return Ok(());
        }

        for doc in &documents {
            println!(
                "{}  {:<8}  {:>4} chunks  {}  {}",
                doc.document_id,
                doc.status,
                doc.chunk_count,
                doc.created_at.format("%Y-%m-%d %H:%M:%S"),
                doc.filename
            );
        }

        Ok(())
    }
}
