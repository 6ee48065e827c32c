//! Spreadsheet import engine
//!
//! Raw cells are parsed per field, combined into constructor fields,
//! matched against the register by natural key or relation contents, and
//! saved. Every row ends in exactly one [`RowOutcome`].

mod cell;
pub mod descriptor;
mod error;
mod matcher;
pub mod natural_key;
mod outcome;
pub mod parsers;
mod reconciler;
mod workbook;

pub use cell::Cell;
pub use descriptor::{cemetery_descriptors, ImportDescriptor, Prepared, Related};
pub use error::{CellError, ParseError, PrepareError, RowError};
pub use matcher::find_exact_relational_match;
pub use outcome::{
    summarize, ImportSummary, OutcomeCounts, OutcomeStatus, PartialEntity, RowOutcome,
    SheetReport, Stage,
};
pub use parsers::{FieldParser, ParseContext, ParseOptions};
pub use reconciler::{RowCells, RowReconciler};
pub use workbook::{Sheet, Workbook};
