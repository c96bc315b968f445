//! Search command handler.

use clap::Args;
use docrag_core::{config::AppConfig, AppResult};

/// Find the passages most similar to a query
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Number of passages to return (default from engine config)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing search command");

        let engine = docrag_engine::open_workspace(&config.workspace)?;
        let k = self
            .top_k
            .unwrap_or(engine.config().search.default_top_k);
        let hits = engine.search(&self.query, k).await?;

        tracing::debug!(
            "Search returned {} hits (max score {:.3})",
            hits.len(),
            hits.first().map(|h| h.score).unwrap_or(0.0)
        );

        if self.json {
            return super::print_json(&serde_json::to_value(&hits)?);
        }

        if hits.is_empty() {
            println!("No matches");
            return Ok(());
        }

        for (rank, hit) in hits.iter().enumerate() {
            println!(
                "{}. {} [{}..{}] score {:.3}",
                rank + 1,
                hit.filename,
                hit.start,
                hit.end,
                hit.score
            );
            println!("   {}", hit.chunk_text.replace('\n', " "));
        }

        Ok(())
    }
}
