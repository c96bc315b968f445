//! Verify command handler.

use clap::Args;
use docrag_core::{config::AppConfig, AppError, AppResult};

/// Check the index against the document registry and repair orphans
#[derive(Args, Debug)]
pub struct VerifyCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl VerifyCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing verify command");

        let engine = docrag_engine::open_workspace(&config.workspace)?;
        let report = engine.verify().await?;

        if self.json {
            super::print_json(&serde_json::to_value(&report)?)?;
        } else if report.is_clean() {
            println!("Index is consistent");
        } else {
            for id in &report.orphaned_documents {
                println!("Removed orphaned entries of {}", id);
            }
            for id in &report.reindexed_documents {
                println!("Reindexed {}", id);
            }
            for id in &report.mismatched_documents {
                println!("Chunk count mismatch for {}", id);
            }
            println!("Removed {} orphaned entries", report.removed_entries);
        }

        if !report.mismatched_documents.is_empty() {
            return Err(AppError::InconsistentState(format!(
                "{} documents have mismatched index entries",
                report.mismatched_documents.len()
            )));
        }
        Ok(())
    }
}
