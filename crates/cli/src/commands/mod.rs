//! Command handlers for the docrag CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod add;
pub mod delete;
pub mod list;
pub mod search;
pub mod serve;
pub mod stats;
pub mod verify;

// Re-export command types for convenience
pub use add::AddCommand;
pub use delete::DeleteCommand;
pub use list::ListCommand;
pub use search::SearchCommand;
pub use serve::ServeCommand;
pub use stats::StatsCommand;
pub use verify::VerifyCommand;

use docrag_core::{AppError, AppResult};
use serde_json::Value;

/// Print a JSON value on stdout.
pub(crate) fn print_json(value: &Value) -> AppResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Serialization(format!("JSON serialization failed: {}", e)))?;
    println!("{}", text);
    Ok(())
}
