//! Serve command handler.
//!
//! Runs the JSON-RPC adapter over stdin/stdout until stdin closes.

use clap::Args;
use docrag_core::{config::AppConfig, AppResult};
use std::sync::Arc;
use tokio::io::BufReader;

/// Serve line-delimited JSON-RPC 2.0 requests on stdin/stdout
#[derive(Args, Debug)]
pub struct ServeCommand {}

impl ServeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Serving JSON-RPC on stdin/stdout");

        let engine = Arc::new(docrag_engine::open_workspace(&config.workspace)?);
        docrag_engine::serve(engine, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;

        tracing::info!("Input closed, shutting down");
        Ok(())
    }
}
