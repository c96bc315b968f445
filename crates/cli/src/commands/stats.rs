//! Stats command handler.
//!
//! Shows document and index counts for the workspace.

use clap::Args;
use docrag_core::{config::AppConfig, AppResult};

/// Show index statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let engine = docrag_engine::open_workspace(&config.workspace)?;
        let stats = engine.stats();

        if self.json {
            let mut output = serde_json::to_value(&stats)?;
            output["provider"] = serde_json::json!(engine.config().embedding.provider);
            output["model"] = serde_json::json!(engine.config().embedding.model);
            return super::print_json(&output);
        }

        let embedding = &engine.config().embedding;
        println!("Documents: {}", stats.documents);
        println!("  Ready: {}", stats.ready);
        println!("  Failed: {}", stats.failed);
        if stats.pending > 0 || stats.deleting > 0 {
            println!("  Pending: {}", stats.pending);
            println!("  Deleting: {}", stats.deleting);
        }
        println!("Indexed chunks: {}", stats.indexed_chunks);
        println!(
            "Embeddings: {} / {} ({} dims)",
            embedding.provider, embedding.model, stats.dimensions
        );

        Ok(())
    }
}
