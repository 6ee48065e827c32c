//! Row reconciler
//!
//! Runs one data row through parse → prepare → identify → update or
//! create → attach relations, and turns whatever happens into a
//! [`RowOutcome`]. Nothing escapes a row: every error becomes a failed
//! outcome and the caller moves on.

use std::collections::BTreeMap;

use crate::domain::result::Error;
use crate::domain::{show_fields, ColumnType, EntityId, EntityKind, FieldMap, Record, Value};
use crate::ports::Repository;

use super::cell::Cell;
use super::descriptor::{ImportDescriptor, ParsedFields, Prepared, Related};
use super::error::{ParseError, RowError};
use super::matcher::find_exact_relational_match;
use super::outcome::{OutcomeStatus, RowOutcome};
use super::parsers::{ParseContext, ParseOptions};

/// Cells of one row keyed by internal field name
pub type RowCells = BTreeMap<&'static str, Cell>;

static EMPTY: Cell = Cell::Empty;

fn saved_id(record: &Record) -> Result<EntityId, Error> {
    record
        .id
        .ok_or_else(|| Error::validation(format!("{} has not been saved", record.kind)))
}

pub struct RowReconciler<'a> {
    repo: &'a dyn Repository,
    options: &'a ParseOptions,
}

impl<'a> RowReconciler<'a> {
    pub fn new(repo: &'a dyn Repository, options: &'a ParseOptions) -> Self {
        Self { repo, options }
    }

    /// Reconcile one row; `row` is its 1-based number below the header
    pub fn reconcile(
        &self,
        descriptor: &ImportDescriptor,
        row: usize,
        cells: &RowCells,
    ) -> RowOutcome {
        let parsed = match self.parse(descriptor, cells) {
            Ok(parsed) => parsed,
            Err(err) => {
                let info = format!(
                    "Could not parse '{}' (column '{}') from '{}'",
                    err.field,
                    descriptor.header_for(err.field).unwrap_or(err.field),
                    err.raw
                );
                return RowOutcome::failed(row, info, &err.into());
            }
        };

        let parsed_dump = parsed
            .iter()
            .map(|(field, value)| format!("{}: {}", field, value))
            .collect::<Vec<_>>()
            .join(", ");
        let prepared = match (descriptor.prepare)(descriptor, parsed) {
            Ok(prepared) => prepared,
            Err(err) => return RowOutcome::failed(row, parsed_dump, &err.into()),
        };

        match self.persist(descriptor, &prepared) {
            Ok((OutcomeStatus::Duplicate, record)) => {
                RowOutcome::duplicate(row, record.title(), self.describe(&record))
            }
            Ok((_, record)) => RowOutcome::added(row, record.title(), self.describe(&record)),
            Err(err) => {
                let info = match &err {
                    RowError::PartialEntity { kind, id, .. } => self.title_of(*kind, *id),
                    _ => format!("{} ({})", descriptor.kind, show_fields(&prepared.fields)),
                };
                RowOutcome::failed(row, info, &err)
            }
        }
    }

    /// Stage 1: run every field parser; the first failure aborts the row
    fn parse(
        &self,
        descriptor: &ImportDescriptor,
        cells: &RowCells,
    ) -> Result<ParsedFields, ParseError> {
        let ctx = ParseContext {
            repo: self.repo,
            options: self.options,
        };
        let mut parsed = ParsedFields::new();
        for &(field, parser) in descriptor.parsers {
            let cell = cells.get(field).unwrap_or(&EMPTY);
            let value = parser.parse(cell, &ctx).map_err(|source| ParseError {
                field,
                raw: cell.to_string(),
                source,
            })?;
            parsed.insert(field, value);
        }
        Ok(parsed)
    }

    /// Stages 3 to 5
    fn persist(
        &self,
        descriptor: &ImportDescriptor,
        prepared: &Prepared,
    ) -> Result<(OutcomeStatus, Record), RowError> {
        let (mut record, created) = self.identify(descriptor, prepared)?;

        if !created {
            // Relations are left alone: other rows may have extended them
            record.apply(&prepared.fields).map_err(RowError::Update)?;
            self.repo.save(&mut record).map_err(RowError::Update)?;
            return Ok((OutcomeStatus::Duplicate, record));
        }

        if !record.is_persisted() {
            self.repo.save(&mut record).map_err(RowError::Save)?;
        }
        self.attach(descriptor, &record, prepared)?;
        Ok((OutcomeStatus::Add, record))
    }

    /// Stage 3: find the existing entity or build a new one
    fn identify(
        &self,
        descriptor: &ImportDescriptor,
        prepared: &Prepared,
    ) -> Result<(Record, bool), RowError> {
        let relational_identifying = descriptor.relational_identifying();

        if relational_identifying.is_empty() {
            let mut key = FieldMap::new();
            let mut defaults = FieldMap::new();
            for (field, value) in &prepared.fields {
                if descriptor.identifying.contains(field) {
                    key.insert(*field, value.clone());
                } else {
                    defaults.insert(*field, value.clone());
                }
            }
            for field in descriptor.identifying {
                key.entry(*field).or_insert(Value::Null);
            }
            return self
                .repo
                .get_or_create(descriptor.kind, &key, &defaults)
                .map_err(RowError::Identify);
        }

        // Drafts have no identity yet, so a set holding one cannot match
        let mut wanted: Vec<(&str, Vec<EntityId>)> = Vec::new();
        let mut matchable = true;
        for field in relational_identifying {
            let members = prepared.relations.get(field).map(Vec::as_slice).unwrap_or(&[]);
            let ids: Option<Vec<EntityId>> = members
                .iter()
                .map(|member| match member {
                    Related::Existing(id) => Some(*id),
                    Related::Draft { .. } => None,
                })
                .collect();
            match ids {
                Some(ids) => wanted.push((field, ids)),
                None => matchable = false,
            }
        }

        let found = if matchable {
            find_exact_relational_match(self.repo, descriptor.kind, &wanted)
                .map_err(RowError::Identify)?
        } else {
            None
        };

        match found {
            Some(existing) => Ok((existing, false)),
            // Every scalar field, not only the identifying ones: required
            // columns such as `type` must be set at the first save
            None => Record::with_fields(descriptor.kind, &prepared.fields)
                .map(|record| (record, true))
                .map_err(RowError::Identify),
        }
    }

    /// Stage 5: resolve drafts and assign every relation of a new entity
    fn attach(
        &self,
        descriptor: &ImportDescriptor,
        record: &Record,
        prepared: &Prepared,
    ) -> Result<(), RowError> {
        let id = saved_id(record).map_err(RowError::Save)?;

        for &relation in descriptor.relational {
            let partial = |source| RowError::PartialEntity {
                kind: record.kind,
                id,
                relation,
                source,
            };

            let mut ids = Vec::new();
            for member in prepared.relations.get(relation).into_iter().flatten() {
                match member {
                    Related::Existing(member_id) => ids.push(*member_id),
                    Related::Draft {
                        kind,
                        key,
                        defaults,
                    } => {
                        let (sub, _) = self
                            .repo
                            .get_or_create(*kind, key, defaults)
                            .map_err(partial)?;
                        ids.push(saved_id(&sub).map_err(partial)?);
                    }
                }
            }
            self.repo
                .set_relation(record, relation, &ids)
                .map_err(partial)?;
        }
        Ok(())
    }

    /// Column dump with references shown by label, followed by relation members
    fn describe(&self, record: &Record) -> String {
        let schema = record.kind.schema();
        let mut parts: Vec<String> = schema
            .columns
            .iter()
            .map(|column| {
                let value = record.get(column.name);
                let shown = match (column.ty, value) {
                    (ColumnType::Ref(target), Value::Ref(id)) => self.label_of(target, *id),
                    _ => value.to_string(),
                };
                format!("{}: {}", column.name, shown)
            })
            .collect();

        if let Some(id) = record.id {
            for relation in schema.relations {
                let members = match self.repo.relation_values(record.kind, id, relation.name) {
                    Ok(ids) => ids
                        .into_iter()
                        .map(|member| self.label_of(relation.target, member))
                        .collect::<Vec<_>>()
                        .join(", "),
                    Err(_) => "?".to_string(),
                };
                parts.push(format!("{}: [{}]", relation.name, members));
            }
        }
        parts.join(", ")
    }

    fn label_of(&self, kind: EntityKind, id: EntityId) -> String {
        match self.repo.get(kind, id) {
            Ok(Some(record)) => record.label(),
            _ => format!("#{}", id),
        }
    }

    fn title_of(&self, kind: EntityKind, id: EntityId) -> String {
        match self.repo.get(kind, id) {
            Ok(Some(record)) => record.title(),
            _ => format!("{} #{}", kind, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbRepository;
    use crate::import::descriptor::{constructions, deeds, operations, prepare_fields};
    use crate::import::outcome::Stage;
    use crate::import::parsers::FieldParser;

    fn repo() -> DuckDbRepository {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        repo.ensure_schema().unwrap();
        repo
    }

    fn cells(values: &[(&'static str, &str)]) -> RowCells {
        values
            .iter()
            .map(|(field, value)| (*field, Cell::from(*value)))
            .collect()
    }

    /// Operations identified by their spot alone
    fn spot_note_descriptor() -> ImportDescriptor {
        ImportDescriptor {
            kind: EntityKind::Operation,
            sheet_name: "Operatii",
            columns: &[
                ("spot", "Loc veci"),
                ("type", "Tip"),
                ("name", "Nume"),
                ("date", "Data"),
                ("note", "Nota"),
            ],
            parsers: &[
                (
                    "spot",
                    FieldParser::Reference {
                        kind: EntityKind::Spot,
                        required: true,
                    },
                ),
                ("type", FieldParser::RequiredText),
                ("name", FieldParser::Name),
                ("date", FieldParser::Date),
                ("note", FieldParser::Text),
            ],
            prepare: prepare_fields,
            identifying: &["spot"],
            relational: &[],
        }
    }

    #[test]
    fn test_parse_failure_names_field_and_raw_value() {
        let repo = repo();
        let options = ParseOptions::default();
        let reconciler = RowReconciler::new(&repo, &options);

        let outcome = reconciler.reconcile(
            &operations(),
            3,
            &cells(&[("name", "Ion"), ("spot", "A1-1-1"), ("date", "ieri")]),
        );
        assert_eq!(outcome.status, OutcomeStatus::Fail);
        assert_eq!(outcome.stage, Some(Stage::Parse));
        assert_eq!(outcome.row, 3);
        assert!(outcome.info.contains("'date'"));
        assert!(outcome.info.contains("'ieri'"));
        assert!(outcome.detail.starts_with("ParseError: "));
        assert_eq!(repo.count(EntityKind::Operation).unwrap(), 0);
    }

    #[test]
    fn test_last_write_wins_on_duplicate() {
        let repo = repo();
        let options = ParseOptions::default();
        let reconciler = RowReconciler::new(&repo, &options);
        let descriptor = spot_note_descriptor();

        let row = |note: &str| {
            let mut row = cells(&[("spot", "A1-1-1"), ("type", "b"), ("name", "ion pop")]);
            row.insert("date", Cell::from("94"));
            row.insert("note", Cell::from(note));
            row
        };

        let first = reconciler.reconcile(&descriptor, 1, &row("x"));
        let second = reconciler.reconcile(&descriptor, 2, &row("y"));
        assert_eq!(first.status, OutcomeStatus::Add, "{:?}", first);
        assert_eq!(second.status, OutcomeStatus::Duplicate, "{:?}", second);
        assert_eq!(first.info, second.info);

        let operations = repo
            .find_by_fields(EntityKind::Operation, &FieldMap::new())
            .unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].get("note"), &Value::text("y"));
        assert!(second.detail.contains("spot: A1-1-1"));
    }

    #[test]
    fn test_prepare_failure_dumps_parsed_fields() {
        let repo = repo();
        let options = ParseOptions::default();
        let reconciler = RowReconciler::new(&repo, &options);

        let outcome = reconciler.reconcile(
            &deeds(),
            1,
            &cells(&[
                ("nr_year", "4/17"),
                ("spots", "A1-1-1"),
                ("receipts", "1/17"),
                ("values", "10, 20"),
            ]),
        );
        assert_eq!(outcome.stage, Some(Stage::Prepare));
        assert!(outcome.info.contains("nr_year: 4/2017"));
        assert!(outcome.detail.contains("receipts has 1 entries but values has 2"));
    }

    #[test]
    fn test_relational_identity() {
        let repo = repo();
        let options = ParseOptions::default();
        let reconciler = RowReconciler::new(&repo, &options);
        let descriptor = constructions();

        let row = cells(&[("type", "cavou"), ("spots", "A1-1-1, A1-1-2")]);
        let first = reconciler.reconcile(&descriptor, 1, &row);
        assert_eq!(first.status, OutcomeStatus::Add, "{:?}", first);
        assert_eq!(first.detail, "type: t, company: -, owner_builder: -, spots: [A1-1-1, A1-1-2]");

        let again = reconciler.reconcile(
            &descriptor,
            2,
            &cells(&[("type", "bordura"), ("spots", "A1-1-2, a1-1-01")]),
        );
        assert_eq!(again.status, OutcomeStatus::Duplicate);
        assert!(again.detail.starts_with("type: b"));

        let wider = reconciler.reconcile(
            &descriptor,
            3,
            &cells(&[
                ("type", "cavou"),
                ("spots", "A1-1-1, A1-1-2, A1-1-3"),
                ("company", "Piatra  SRL"),
            ]),
        );
        assert_eq!(wider.status, OutcomeStatus::Add);
        // Non-identifying scalars are set on the new entity before its first save
        assert!(
            wider.detail.starts_with("type: t, company: Piatra SRL, owner_builder: -"),
            "{}",
            wider.detail
        );
        assert_eq!(repo.count(EntityKind::Construction).unwrap(), 2);
    }
}
