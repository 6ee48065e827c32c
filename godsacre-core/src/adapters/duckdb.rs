//! DuckDB repository implementation
//!
//! SQL is generated from the entity schema table, so every kind shares one
//! code path for lookup, insert, update and relation maintenance.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use duckdb::types::ValueRef;
use duckdb::Connection;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Column, ColumnType, EntityId, EntityKind, EntitySchema, FieldMap, Record, Relation, Value,
};
use crate::migrations::MIGRATIONS;
use crate::ports::Repository;
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// Quote an identifier; several register columns (`row`, `column`, `type`) are keywords
fn quote(ident: &str) -> String {
    format!("\"{}\"", ident)
}

fn column_list(schema: &EntitySchema) -> String {
    std::iter::once("id".to_string())
        .chain(schema.columns.iter().map(|c| quote(c.name)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Convert a field value to a DuckDB parameter
fn to_param(value: &Value) -> Box<dyn duckdb::ToSql> {
    match value {
        Value::Null => Box::new(None::<String>),
        Value::Text(s) => Box::new(s.clone()),
        Value::Int(n) => Box::new(*n),
        Value::Ref(id) => Box::new(*id),
        Value::Bool(b) => Box::new(*b),
        // Stored as DOUBLE; receipts carry at most cents
        Value::Decimal(d) => Box::new(d.to_f64().unwrap_or_default()),
        // DuckDB casts the ISO string to the DATE parameter type
        Value::Date(d) => Box::new(d.format("%Y-%m-%d").to_string()),
    }
}

/// Read one column of a result row into a typed value
fn read_value(row: &duckdb::Row, idx: usize, column: &Column) -> Result<Value> {
    let raw = row.get_ref(idx)?;
    let value = match (column.ty, raw) {
        (_, ValueRef::Null) => Value::Null,
        (ColumnType::Text, ValueRef::Text(bytes)) => {
            Value::Text(String::from_utf8_lossy(bytes).to_string())
        }
        (ColumnType::Int, ValueRef::BigInt(n)) => Value::Int(n),
        (ColumnType::Int, ValueRef::Int(n)) => Value::Int(n as i64),
        (ColumnType::Ref(_), ValueRef::BigInt(n)) => Value::Ref(n),
        (ColumnType::Ref(_), ValueRef::Int(n)) => Value::Ref(n as i64),
        (ColumnType::Bool, ValueRef::Boolean(b)) => Value::Bool(b),
        (ColumnType::Decimal, ValueRef::Double(f)) => Value::Decimal(
            Decimal::try_from(f)
                .map_err(|e| Error::database(format!("{}: {}", column.name, e)))?
                .normalize(),
        ),
        (ColumnType::Decimal, ValueRef::Decimal(d)) => Value::Decimal(d.normalize()),
        (ColumnType::Date, ValueRef::Date32(days)) => {
            // Days since epoch
            let date = NaiveDate::from_ymd_opt(1970, 1, 1)
                .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days as i64)))
                .ok_or_else(|| Error::database(format!("{}: date out of range", column.name)))?;
            Value::Date(date)
        }
        (ty, _) => {
            return Err(Error::database(format!(
                "Unexpected stored value for column '{}' ({:?})",
                column.name, ty
            )))
        }
    };
    Ok(value)
}

/// DuckDB-backed register store
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) the register database at `db_path`
    ///
    /// Includes retry logic with exponential backoff for file locking errors,
    /// which happen when the CLI and another process touch the file together.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[godsacre] Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::database(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// In-memory register, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    /// Run register migrations
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn, MIGRATIONS)
            .run_pending()
            .map_err(|e| Error::database(format!("Migration failed: {}", e)))
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    fn relation_of(kind: EntityKind, name: &str) -> Result<&'static Relation> {
        kind.schema()
            .relation(name)
            .ok_or_else(|| Error::validation(format!("{} has no relation '{}'", kind, name)))
    }

    /// Run a `SELECT <id, columns...>` and map rows to records
    fn query_records(
        conn: &Connection,
        schema: &'static EntitySchema,
        sql: &str,
        params: &[Box<dyn duckdb::ToSql>],
    ) -> Result<Vec<Record>> {
        let param_refs: Vec<&dyn duckdb::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(param_refs.as_slice())?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let id: EntityId = row.get(0)?;
            let mut fields = FieldMap::new();
            for (i, column) in schema.columns.iter().enumerate() {
                let value = read_value(row, i + 1, column)?;
                if !value.is_null() {
                    fields.insert(column.name, value);
                }
            }
            records.push(Record::from_storage(schema.kind, id, fields));
        }
        Ok(records)
    }

    /// Null-safe equality lookup on every column in `fields`
    fn select_by_fields(
        conn: &Connection,
        kind: EntityKind,
        fields: &FieldMap,
    ) -> Result<Vec<Record>> {
        let schema = kind.schema();
        for name in fields.keys() {
            if schema.column(name).is_none() {
                return Err(Error::validation(format!("{} has no field '{}'", kind, name)));
            }
        }

        let mut sql = format!("SELECT {} FROM {}", column_list(schema), schema.table);
        if !fields.is_empty() {
            let conditions: Vec<String> = fields
                .keys()
                .map(|name| format!("{} IS NOT DISTINCT FROM ?", quote(name)))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY id");

        let params: Vec<Box<dyn duckdb::ToSql>> = fields.values().map(to_param).collect();
        Self::query_records(conn, schema, &sql, &params)
    }

    fn insert(conn: &Connection, record: &mut Record) -> Result<()> {
        let missing = record.missing_required();
        if !missing.is_empty() {
            return Err(Error::validation(format!(
                "{} is missing required fields: {}",
                record.kind,
                missing.join(", ")
            )));
        }

        let schema = record.kind.schema();
        let set: Vec<(&str, &Value)> = schema
            .columns
            .iter()
            .map(|c| (c.name, record.get(c.name)))
            .filter(|(_, v)| !v.is_null())
            .collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING id",
            schema.table,
            set.iter().map(|(n, _)| quote(n)).collect::<Vec<_>>().join(", "),
            placeholders(set.len())
        );
        let params: Vec<Box<dyn duckdb::ToSql>> = set.iter().map(|(_, v)| to_param(v)).collect();
        let param_refs: Vec<&dyn duckdb::ToSql> = params.iter().map(|b| b.as_ref()).collect();

        let id: EntityId = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
        record.id = Some(id);
        Ok(())
    }

    /// Update every column except the natural key, which never changes after creation
    fn update(conn: &Connection, record: &Record, id: EntityId) -> Result<()> {
        let schema = record.kind.schema();
        let columns: Vec<&Column> = schema
            .columns
            .iter()
            .filter(|c| !schema.is_natural_key(c.name))
            .collect();
        if columns.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            schema.table,
            columns
                .iter()
                .map(|c| format!("{} = ?", quote(c.name)))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut params: Vec<Box<dyn duckdb::ToSql>> =
            columns.iter().map(|c| to_param(record.get(c.name))).collect();
        params.push(Box::new(id));
        let param_refs: Vec<&dyn duckdb::ToSql> = params.iter().map(|b| b.as_ref()).collect();

        let changed = conn.execute(&sql, param_refs.as_slice())?;
        if changed == 0 {
            return Err(Error::not_found(format!("{} #{}", record.kind, id)));
        }
        Ok(())
    }

    fn select_relation_values(
        conn: &Connection,
        relation: &Relation,
        id: EntityId,
    ) -> Result<Vec<EntityId>> {
        let sql = format!(
            "SELECT {target} FROM {link} WHERE {owner} = ? ORDER BY {target}",
            target = relation.target_column,
            link = relation.link_table,
            owner = relation.owner_column
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map([id], |row| row.get::<_, EntityId>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

impl Repository for DuckDbRepository {
    fn get(&self, kind: EntityKind, id: EntityId) -> Result<Option<Record>> {
        let schema = kind.schema();
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?",
            column_list(schema),
            schema.table
        );
        let params: Vec<Box<dyn duckdb::ToSql>> = vec![Box::new(id)];
        Ok(Self::query_records(&conn, schema, &sql, &params)?
            .into_iter()
            .next())
    }

    fn find_by_fields(&self, kind: EntityKind, fields: &FieldMap) -> Result<Vec<Record>> {
        let conn = self.conn()?;
        Self::select_by_fields(&conn, kind, fields)
    }

    fn get_or_create(
        &self,
        kind: EntityKind,
        key: &FieldMap,
        defaults: &FieldMap,
    ) -> Result<(Record, bool)> {
        // Lookup and insert hold one lock so concurrent callers cannot both create
        let conn = self.conn()?;
        if let Some(existing) = Self::select_by_fields(&conn, kind, key)?.into_iter().next() {
            return Ok((existing, false));
        }

        let mut record = Record::with_fields(kind, defaults)?;
        record.apply(key)?;
        Self::insert(&conn, &mut record)?;
        Ok((record, true))
    }

    fn filter_by_relation_membership(
        &self,
        kind: EntityKind,
        relation: &str,
        values: &[EntityId],
    ) -> Result<Vec<Record>> {
        let relation = Self::relation_of(kind, relation)?;
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let schema = kind.schema();
        let columns = std::iter::once("t.id".to_string())
            .chain(schema.columns.iter().map(|c| format!("t.{}", quote(c.name))))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT DISTINCT {columns} FROM {table} t \
             JOIN {link} l ON l.{owner} = t.id \
             WHERE l.{target} IN ({ph}) ORDER BY t.id",
            columns = columns,
            table = schema.table,
            link = relation.link_table,
            owner = relation.owner_column,
            target = relation.target_column,
            ph = placeholders(values.len())
        );

        let params: Vec<Box<dyn duckdb::ToSql>> = values
            .iter()
            .map(|v| Box::new(*v) as Box<dyn duckdb::ToSql>)
            .collect();
        let conn = self.conn()?;
        Self::query_records(&conn, schema, &sql, &params)
    }

    fn relation_values(
        &self,
        kind: EntityKind,
        id: EntityId,
        relation: &str,
    ) -> Result<Vec<EntityId>> {
        let relation = Self::relation_of(kind, relation)?;
        let conn = self.conn()?;
        Self::select_relation_values(&conn, relation, id)
    }

    fn save(&self, record: &mut Record) -> Result<()> {
        let conn = self.conn()?;
        match record.id {
            Some(id) => Self::update(&conn, record, id),
            None => Self::insert(&conn, record),
        }
    }

    fn set_relation(&self, record: &Record, relation: &str, values: &[EntityId]) -> Result<()> {
        let relation = Self::relation_of(record.kind, relation)?;
        let id = record.id.ok_or_else(|| {
            Error::validation(format!(
                "{} must be saved before its {} can be set",
                record.kind, relation.name
            ))
        })?;

        let conn = self.conn()?;
        let current = Self::select_relation_values(&conn, relation, id)?;

        // Only touch the links that change; unchanged members keep their rows
        let delete_sql = format!(
            "DELETE FROM {} WHERE {} = ? AND {} = ?",
            relation.link_table, relation.owner_column, relation.target_column
        );
        for stale in current.iter().filter(|c| !values.contains(c)) {
            conn.execute(&delete_sql, [id, *stale])?;
        }

        let insert_sql = format!(
            "INSERT INTO {} ({}, {}) VALUES (?, ?)",
            relation.link_table, relation.owner_column, relation.target_column
        );
        let mut added: Vec<EntityId> = Vec::new();
        for value in values {
            if current.contains(value) || added.contains(value) {
                continue;
            }
            conn.execute(&insert_sql, [id, *value])?;
            added.push(*value);
        }
        Ok(())
    }

    fn delete_all(&self, kind: EntityKind) -> Result<u64> {
        let schema = kind.schema();
        let conn = self.conn()?;

        for relation in schema.relations {
            conn.execute(&format!("DELETE FROM {}", relation.link_table), [])?;
        }
        // Links where this kind is the target side
        for other in EntityKind::ALL {
            for relation in other.schema().relations {
                if relation.target == kind {
                    conn.execute(&format!("DELETE FROM {}", relation.link_table), [])?;
                }
            }
        }

        let deleted = conn.execute(&format!("DELETE FROM {}", schema.table), [])?;
        Ok(deleted as u64)
    }

    fn count(&self, kind: EntityKind) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.schema().table),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn repo() -> DuckDbRepository {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        repo.ensure_schema().unwrap();
        repo
    }

    fn spot(repo: &DuckDbRepository, parcel: &str, row: &str, column: &str) -> Record {
        let mut key = FieldMap::new();
        key.insert("parcel", Value::text(parcel));
        key.insert("row", Value::text(row));
        key.insert("column", Value::text(column));
        repo.get_or_create(EntityKind::Spot, &key, &FieldMap::new())
            .unwrap()
            .0
    }

    #[test]
    fn test_insert_and_get() {
        let repo = repo();
        let mut deed = Record::new(EntityKind::Deed);
        deed.set("number", Value::Int(4)).unwrap();
        deed.set("year", Value::Int(2017)).unwrap();
        repo.save(&mut deed).unwrap();

        let id = deed.id.unwrap();
        let loaded = repo.get(EntityKind::Deed, id).unwrap().unwrap();
        assert_eq!(loaded.get("number"), &Value::Int(4));
        assert!(loaded.get("cancel_reason").is_null());
        assert_eq!(loaded.label(), "4/2017");
    }

    #[test]
    fn test_insert_rejects_missing_required() {
        let repo = repo();
        let mut deed = Record::new(EntityKind::Deed);
        deed.set("number", Value::Int(4)).unwrap();
        let err = repo.save(&mut deed).unwrap_err();
        assert!(err.to_string().contains("missing required fields: year"));
        assert_eq!(repo.count(EntityKind::Deed).unwrap(), 0);
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let repo = repo();
        let first = spot(&repo, "A1", "3", "7");
        let second = spot(&repo, "A1", "3", "7");
        assert_eq!(first.id, second.id);
        assert_eq!(repo.count(EntityKind::Spot).unwrap(), 1);
    }

    #[test]
    fn test_find_by_fields_matches_null() {
        let repo = repo();
        let mut deed = Record::new(EntityKind::Deed);
        deed.set("number", Value::Int(1)).unwrap();
        deed.set("year", Value::Int(2000)).unwrap();
        repo.save(&mut deed).unwrap();

        let mut fields = FieldMap::new();
        fields.insert("cancel_reason", Value::Null);
        assert_eq!(repo.find_by_fields(EntityKind::Deed, &fields).unwrap().len(), 1);

        fields.insert("cancel_reason", Value::text("d"));
        assert!(repo.find_by_fields(EntityKind::Deed, &fields).unwrap().is_empty());
    }

    #[test]
    fn test_update_keeps_natural_key() {
        let repo = repo();
        let mut owner = Record::new(EntityKind::Owner);
        owner.set("name", Value::text("Ion Popescu")).unwrap();
        repo.save(&mut owner).unwrap();

        owner.set("phone", Value::text("0722")).unwrap();
        repo.save(&mut owner).unwrap();

        let loaded = repo.get(EntityKind::Owner, owner.id.unwrap()).unwrap().unwrap();
        assert_eq!(loaded.get("phone"), &Value::text("0722"));
        assert_eq!(repo.count(EntityKind::Owner).unwrap(), 1);
    }

    #[test]
    fn test_decimal_and_date_round_trip() {
        let repo = repo();
        let mut receipt = Record::new(EntityKind::OwnershipReceipt);
        receipt.set("number", Value::Int(12)).unwrap();
        receipt.set("year", Value::Int(1994)).unwrap();
        receipt.set("value", Value::Decimal(dec("150.50"))).unwrap();
        repo.save(&mut receipt).unwrap();
        let loaded = repo
            .get(EntityKind::OwnershipReceipt, receipt.id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(loaded.get("value"), &Value::Decimal(dec("150.5")));

        let place = spot(&repo, "B", "1", "1");
        let date = NaiveDate::from_ymd_opt(1994, 1, 24).unwrap();
        let mut op = Record::new(EntityKind::Operation);
        op.set("type", Value::text("b")).unwrap();
        op.set("name", Value::text("Maria Ionescu")).unwrap();
        op.set("spot", Value::Ref(place.id.unwrap())).unwrap();
        op.set("date", Value::Date(date)).unwrap();
        repo.save(&mut op).unwrap();

        let mut key = FieldMap::new();
        key.insert("date", Value::Date(date));
        let found = repo.find_by_fields(EntityKind::Operation, &key).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("spot"), &Value::Ref(place.id.unwrap()));
    }

    #[test]
    fn test_relations() {
        let repo = repo();
        let a = spot(&repo, "A", "1", "1").id.unwrap();
        let b = spot(&repo, "A", "1", "2").id.unwrap();
        let c = spot(&repo, "A", "1", "3").id.unwrap();

        let mut construction = Record::new(EntityKind::Construction);
        construction.set("type", Value::text("t")).unwrap();
        repo.save(&mut construction).unwrap();
        repo.set_relation(&construction, "spots", &[a, b]).unwrap();

        let id = construction.id.unwrap();
        assert_eq!(
            repo.relation_values(EntityKind::Construction, id, "spots").unwrap(),
            vec![a, b]
        );

        let hits = repo
            .filter_by_relation_membership(EntityKind::Construction, "spots", &[b, c])
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(repo
            .filter_by_relation_membership(EntityKind::Construction, "spots", &[c])
            .unwrap()
            .is_empty());

        repo.set_relation(&construction, "spots", &[b, c]).unwrap();
        assert_eq!(
            repo.relation_values(EntityKind::Construction, id, "spots").unwrap(),
            vec![b, c]
        );
    }

    #[test]
    fn test_set_relation_requires_saved_record() {
        let repo = repo();
        let construction = Record::new(EntityKind::Construction);
        assert!(repo.set_relation(&construction, "spots", &[1]).is_err());
    }

    #[test]
    fn test_delete_all_clears_links() {
        let repo = repo();
        let a = spot(&repo, "A", "1", "1").id.unwrap();
        let mut construction = Record::new(EntityKind::Construction);
        construction.set("type", Value::text("b")).unwrap();
        repo.save(&mut construction).unwrap();
        repo.set_relation(&construction, "spots", &[a]).unwrap();

        assert_eq!(repo.delete_all(EntityKind::Spot).unwrap(), 1);
        assert!(repo
            .relation_values(EntityKind::Construction, construction.id.unwrap(), "spots")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_file_database_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("register.duckdb");
        {
            let repo = DuckDbRepository::new(&path).unwrap();
            repo.ensure_schema().unwrap();
            spot(&repo, "C", "2", "5");
        }
        let repo = DuckDbRepository::new(&path).unwrap();
        repo.ensure_schema().unwrap();
        assert_eq!(repo.count(EntityKind::Spot).unwrap(), 1);
        assert_eq!(repo.db_path(), Some(path.as_path()));
    }
}
