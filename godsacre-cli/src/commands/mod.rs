//! CLI command implementations

pub mod import;
pub mod logs;
pub mod status;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use godsacre_core::services::{EntryPoint, LogEvent, LoggingService};
use godsacre_core::GodsAcreContext;

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let data_dir = get_data_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: Option<&LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Data directory from `GODSACRE_DIR`, otherwise `~/.godsacre`
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("GODSACRE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".godsacre"))
        .ok_or_else(|| anyhow!("Could not find home directory; set GODSACRE_DIR"))
}

/// Open the register in the data directory
pub fn get_context() -> Result<GodsAcreContext> {
    let data_dir = get_data_dir()?;

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    GodsAcreContext::new(&data_dir).context("Failed to open the register")
}
