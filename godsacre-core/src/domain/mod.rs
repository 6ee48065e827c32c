//! Core domain types
//!
//! The register's entities are described by a static schema table and
//! carried around as schema-checked records. No I/O happens here.

mod record;
pub mod result;
pub mod schema;
mod value;

pub use record::Record;
pub use schema::{Column, ColumnType, EntityKind, EntitySchema, Relation};
pub use value::{show_fields, EntityId, FieldMap, Value};
