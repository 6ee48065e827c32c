//! Repository port - persistence boundary consumed by the import engine

use crate::domain::result::Result;
use crate::domain::{EntityId, EntityKind, FieldMap, Record};

/// Relational store abstraction
///
/// Every operation is its own durability point; the import engine never
/// opens a transaction spanning several calls.
pub trait Repository {
    // === Lookup ===

    /// Get an entity by its durable identity
    fn get(&self, kind: EntityKind, id: EntityId) -> Result<Option<Record>>;

    /// Find entities whose columns equal every value in `fields` (null-safe)
    fn find_by_fields(&self, kind: EntityKind, fields: &FieldMap) -> Result<Vec<Record>>;

    /// Look up by `key`; when absent, create and persist an entity from
    /// `key` plus `defaults`. Returns the entity and whether it was created.
    fn get_or_create(
        &self,
        kind: EntityKind,
        key: &FieldMap,
        defaults: &FieldMap,
    ) -> Result<(Record, bool)>;

    /// Entities whose `relation` contains at least one of `values`
    fn filter_by_relation_membership(
        &self,
        kind: EntityKind,
        relation: &str,
        values: &[EntityId],
    ) -> Result<Vec<Record>>;

    /// Current members of `relation` for one entity
    fn relation_values(&self, kind: EntityKind, id: EntityId, relation: &str)
        -> Result<Vec<EntityId>>;

    // === Writes ===

    /// Insert (assigning an id) or update an entity
    fn save(&self, record: &mut Record) -> Result<()>;

    /// Replace the members of `relation` for an already-saved entity
    fn set_relation(&self, record: &Record, relation: &str, values: &[EntityId]) -> Result<()>;

    /// Delete every entity of `kind` together with its relation links
    fn delete_all(&self, kind: EntityKind) -> Result<u64>;

    // === Counts ===

    fn count(&self, kind: EntityKind) -> Result<i64>;
}
