//! God's Acre Core - spreadsheet import and reconciliation for cemetery registers
//!
//! This crate implements the core logic following hexagonal architecture:
//!
//! - **domain**: Register entities, the schema table and errors
//! - **ports**: Trait definitions for external dependencies (Repository)
//! - **import**: Cell parsing, identity resolution and row reconciliation
//! - **services**: Import driver, status, event log and migrations
//! - **adapters**: Concrete implementations (DuckDB)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod import;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbRepository;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{EntityKind, Record, Value};
pub use import::{ImportSummary, OutcomeCounts, OutcomeStatus, RowOutcome, SheetReport, Stage};

/// Register database file inside the data directory
pub const DB_FILENAME: &str = "godsacre.duckdb";

/// Main context for God's Acre operations
///
/// Holds the register connection, configuration and services.
pub struct GodsAcreContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub status_service: StatusService,
    pub import_service: ImportService,
}

impl GodsAcreContext {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;

        let repository = Arc::new(DuckDbRepository::new(&data_dir.join(DB_FILENAME))?);
        repository.ensure_schema()?;

        let status_service = StatusService::new(Arc::clone(&repository));
        let import_service = ImportService::new(Arc::clone(&repository), config.import.clone());

        Ok(Self {
            config,
            repository,
            status_service,
            import_service,
        })
    }

    /// Record import events in `logger`
    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.import_service = self.import_service.with_logger(logger);
        self
    }
}
