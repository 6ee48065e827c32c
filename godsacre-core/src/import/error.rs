//! Row-scoped import errors
//!
//! None of these abort an import: the reconciler turns each one into a
//! failed row outcome and moves on to the next row.

use thiserror::Error;

use crate::domain::result::Error;
use crate::domain::{EntityId, EntityKind};

use super::outcome::Stage;

/// Why a single cell could not be parsed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CellError {
    #[error("a value is required")]
    Required,

    #[error("at least one value is required")]
    EmptyList,

    #[error("not a recognizable date")]
    InvalidDate,

    #[error("not a recognizable year")]
    InvalidYear,

    #[error("expected NUMBER/YEAR")]
    InvalidNrYear,

    #[error("not a valid amount")]
    InvalidMoney,

    #[error("not a yes/no value")]
    InvalidBool,

    #[error("no digits in phone number")]
    InvalidPhone,

    #[error("unknown {vocabulary}, expected one of: {expected}")]
    UnknownVocabulary {
        vocabulary: &'static str,
        expected: String,
    },

    #[error("invalid {kind} identifier: {reason}")]
    InvalidIdentifier { kind: EntityKind, reason: String },

    /// The store failed while resolving a reference
    #[error("lookup failed: {0}")]
    Lookup(String),
}

/// A cell failed its field parser
#[derive(Error, Debug, Clone, PartialEq)]
#[error("field '{field}' ('{raw}'): {source}")]
pub struct ParseError {
    pub field: &'static str,
    pub raw: String,
    pub source: CellError,
}

/// The cross-field prepare step failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrepareError {
    #[error("{left} has {left_len} entries but {right} has {right_len}")]
    CountMismatch {
        left: &'static str,
        left_len: usize,
        right: &'static str,
        right_len: usize,
    },

    #[error("field '{0}' is missing")]
    MissingField(&'static str),

    #[error("field '{field}' cannot hold {found}")]
    Unexpected { field: &'static str, found: String },
}

/// Everything that can fail a row
#[derive(Error, Debug)]
pub enum RowError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Prepare(#[from] PrepareError),

    #[error("{0}")]
    Identify(Error),

    /// Saving refreshed fields of an existing entity
    #[error("{0}")]
    Update(Error),

    /// First save of a new entity
    #[error("{0}")]
    Save(Error),

    #[error("{kind} #{id} was created but its {relation} could not be attached: {source}")]
    PartialEntity {
        kind: EntityKind,
        id: EntityId,
        relation: &'static str,
        source: Error,
    },
}

impl RowError {
    /// Error class shown to the operator
    pub fn kind(&self) -> &'static str {
        match self {
            RowError::Parse(_) => "ParseError",
            RowError::Prepare(_) => "PrepareError",
            RowError::Identify(_) => "IdentifyError",
            RowError::Update(_) | RowError::Save(_) => "SaveError",
            RowError::PartialEntity { .. } => "PartialEntityWarning",
        }
    }

    /// Pipeline stage at which the row stopped
    pub fn stage(&self) -> Stage {
        match self {
            RowError::Parse(_) => Stage::Parse,
            RowError::Prepare(_) => Stage::Prepare,
            RowError::Identify(_) => Stage::Identify,
            RowError::Update(_) => Stage::Update,
            RowError::Save(_) => Stage::Save,
            RowError::PartialEntity { .. } => Stage::Attach,
        }
    }
}
