//! docrag CLI
//!
//! Main entry point for the docrag command-line tool.
//! Provides commands for managing and searching a local document index.

mod commands;

use clap::{Parser, Subcommand};
use commands::{
    AddCommand, DeleteCommand, ListCommand, SearchCommand, ServeCommand, StatsCommand,
    VerifyCommand,
};
use docrag_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// docrag - document retrieval for grounded answers
#[derive(Parser, Debug)]
#[command(name = "docrag")]
#[command(about = "Chunk, embed, and search documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "DOCRAG_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "DOCRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add documents to the index
    Add(AddCommand),

    /// List documents
    List(ListCommand),

    /// Delete a document
    Delete(DeleteCommand),

    /// Search for passages
    Search(SearchCommand),

    /// Show index statistics
    Stats(StatsCommand),

    /// Check and repair index consistency
    Verify(VerifyCommand),

    /// Serve JSON-RPC on stdin/stdout
    Serve(ServeCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from environment
    let config = AppConfig::load()?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    )?;

    // Logs go to stderr; stdout carries results and RPC responses
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("docrag starting");
    tracing::debug!("Workspace: {:?}", config.workspace);

    config.ensure_state_dir()?;

    let command_name = match &cli.command {
        Commands::Add(_) => "add",
        Commands::List(_) => "list",
        Commands::Delete(_) => "delete",
        Commands::Search(_) => "search",
        Commands::Stats(_) => "stats",
        Commands::Verify(_) => "verify",
        Commands::Serve(_) => "serve",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Add(cmd) => cmd.execute(&config).await,
        Commands::List(cmd) => cmd.execute(&config).await,
        Commands::Delete(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
        Commands::Verify(cmd) => cmd.execute(&config).await,
        Commands::Serve(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
