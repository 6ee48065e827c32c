//! Service layer - business logic orchestration
//!
//! Services coordinate the import engine, the store and the event log.
//! Each service focuses on a specific use case.

pub mod import;
pub mod logging;
pub mod migration;
mod status;

pub use import::{ImportResult, ImportService};
pub use logging::{now_ms, EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use status::{KindCount, StatusService, StatusSummary};
