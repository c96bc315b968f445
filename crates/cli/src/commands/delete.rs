//! Delete command handler.

use clap::Args;
use docrag_core::{config::AppConfig, AppResult};

/// Delete a document and all of its chunks
#[derive(Args, Debug)]
pub struct DeleteCommand {
    /// Document id
    pub document_id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl DeleteCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing delete command for {}", self.document_id);

        let engine = docrag_engine::open_workspace(&config.workspace)?;
        let outcome = engine.delete(&self.document_id).await?;

        if self.json {
            super::print_json(&serde_json::to_value(outcome)?)?;
        } else if outcome.removed {
            println!("Deleted {}", self.document_id);
        } else {
            println!("No document {}", self.document_id);
        }

        Ok(())
    }
}
