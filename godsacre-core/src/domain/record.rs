//! Schema-checked entity record

use serde::Serialize;

use super::result::{Error, Result};
use super::schema::{EntityKind, LabelStyle};
use super::value::{EntityId, FieldMap, Value};

/// One entity instance: its kind, durable identity (once saved) and column values.
///
/// Relations are not carried on the record; they live in the store and are
/// read and written through the repository.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub kind: EntityKind,
    pub id: Option<EntityId>,
    fields: FieldMap,
}

impl Record {
    /// Create an empty, unsaved record
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            id: None,
            fields: FieldMap::new(),
        }
    }

    /// Create an unsaved record from a field map, checking every field against the schema
    pub fn with_fields(kind: EntityKind, fields: &FieldMap) -> Result<Self> {
        let mut record = Self::new(kind);
        record.apply(fields)?;
        Ok(record)
    }

    /// Build a record from values already read from storage
    pub(crate) fn from_storage(kind: EntityKind, id: EntityId, fields: FieldMap) -> Self {
        Self {
            kind,
            id: Some(id),
            fields,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Get a column value (`Null` when unset)
    pub fn get(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(name).unwrap_or(&NULL)
    }

    /// Set a column value after checking the column exists and accepts the value
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let schema = self.kind.schema();
        let column = schema.column(name).ok_or_else(|| {
            Error::validation(format!("{} has no field '{}'", self.kind, name))
        })?;
        if !column.accepts(&value) {
            return Err(Error::validation(format!(
                "{} field '{}' cannot hold {:?}",
                self.kind, name, value
            )));
        }
        self.fields.insert(column.name, value);
        Ok(())
    }

    /// Set every field of `fields`
    pub fn apply(&mut self, fields: &FieldMap) -> Result<()> {
        for (name, value) in fields {
            self.set(name, value.clone())?;
        }
        Ok(())
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Names of required columns that are still unset
    pub fn missing_required(&self) -> Vec<&'static str> {
        self.kind
            .schema()
            .columns
            .iter()
            .filter(|c| !c.nullable && self.get(c.name).is_null())
            .map(|c| c.name)
            .collect()
    }

    /// Short human identity, e.g. `A1-3-7`, `4/2017` or `Operation #12`
    pub fn label(&self) -> String {
        let schema = self.kind.schema();
        match schema.label {
            LabelStyle::NaturalKey(separator) => schema
                .natural_key
                .iter()
                .map(|k| self.get(k).to_string())
                .collect::<Vec<_>>()
                .join(separator),
            LabelStyle::Surrogate => match self.id {
                Some(id) => format!("{} #{}", self.kind, id),
                None => format!("{} (unsaved)", self.kind),
            },
        }
    }

    /// Label prefixed with the kind where the label alone is ambiguous, e.g. `Deed 4/2017`
    pub fn title(&self) -> String {
        match self.kind.schema().label {
            LabelStyle::NaturalKey(_) => format!("{} {}", self.kind, self.label()),
            LabelStyle::Surrogate => self.label(),
        }
    }
}
