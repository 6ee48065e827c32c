//! Natural-key resolver
//!
//! Turns a human identifier (`A1-3-7`, `4/2017`, `Ion Popescu`) into the
//! canonical key fields of an entity kind, and resolves those fields to a
//! stored entity with get-or-create semantics. Normalization happens before
//! lookup so that `a1-3-07` and `A1-3-7` land on the same spot.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{EntityKind, FieldMap, Record, Value};

use super::error::CellError;
use super::parsers::{nr_year_from_str, person_name, ParseContext};

fn spot_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"^[A-Z]\d{0,4}$").expect("valid parcel pattern"),
            Regex::new(r"^\d{0,4}([A-Z]|bis)?$").expect("valid row pattern"),
            Regex::new(r"^\d{1,4}$").expect("valid column pattern"),
        ]
    })
}

/// Drop leading zeros from the first run of digits, keeping at least one digit
fn strip_leading_zeros(part: &str) -> String {
    let Some(start) = part.find(|c: char| c.is_ascii_digit()) else {
        return part.to_string();
    };
    let (prefix, rest) = part.split_at(start);
    let digits_len = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (digits, suffix) = rest.split_at(digits_len);
    let trimmed = digits.trim_start_matches('0');
    let digits = if trimmed.is_empty() { "0" } else { trimmed };
    format!("{}{}{}", prefix, digits, suffix)
}

fn invalid(kind: EntityKind, reason: impl Into<String>) -> CellError {
    CellError::InvalidIdentifier {
        kind,
        reason: reason.into(),
    }
}

fn spot_key(identifier: &str) -> Result<FieldMap, CellError> {
    let parts: Vec<String> = identifier
        .split('-')
        .map(|p| strip_leading_zeros(&p.trim().to_uppercase()))
        .collect();
    let [parcel, row, column] = parts.as_slice() else {
        return Err(invalid(EntityKind::Spot, "expected PARCEL-ROW-COLUMN"));
    };
    let row = match row.strip_suffix("BIS") {
        Some(number) => format!("{}bis", number),
        None => row.clone(),
    };

    let [parcel_re, row_re, column_re] = spot_patterns();
    for (name, value, pattern) in [
        ("parcel", parcel, parcel_re),
        ("row", &row, row_re),
        ("column", column, column_re),
    ] {
        if value.is_empty() || !pattern.is_match(value) {
            return Err(invalid(EntityKind::Spot, format!("bad {} '{}'", name, value)));
        }
    }

    let mut key = FieldMap::new();
    key.insert("parcel", Value::text(parcel.as_str()));
    key.insert("row", Value::text(row));
    key.insert("column", Value::text(column.as_str()));
    Ok(key)
}

/// Canonical natural-key fields for `identifier`
pub fn prepare_natural_key(
    kind: EntityKind,
    identifier: &str,
    year_threshold: u32,
) -> Result<FieldMap, CellError> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(CellError::Required);
    }

    let mut key = FieldMap::new();
    match kind {
        EntityKind::Spot => return spot_key(identifier),
        EntityKind::Deed | EntityKind::OwnershipReceipt | EntityKind::PaymentReceipt => {
            let nr = nr_year_from_str(identifier, year_threshold)
                .map_err(|_| invalid(kind, "expected NUMBER/YEAR"))?;
            key.insert("number", Value::Int(nr.number));
            key.insert("year", Value::Int(nr.year));
        }
        EntityKind::Owner => {
            key.insert("name", Value::text(person_name(identifier)));
        }
        EntityKind::Company => {
            let name = identifier.split_whitespace().collect::<Vec<_>>().join(" ");
            key.insert("name", Value::text(name));
        }
        other => return Err(invalid(other, "has no textual identifier")),
    }
    Ok(key)
}

/// Resolve `identifier` to a stored entity, creating it from the key alone when absent
pub fn resolve(
    ctx: &ParseContext<'_>,
    kind: EntityKind,
    identifier: &str,
) -> Result<Record, CellError> {
    let key = prepare_natural_key(kind, identifier, ctx.options.year_threshold)?;
    let (record, _) = ctx
        .repo
        .get_or_create(kind, &key, &FieldMap::new())
        .map_err(|e| CellError::Lookup(e.to_string()))?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbRepository;
    use crate::import::parsers::ParseOptions;
    use crate::ports::Repository;

    fn spot(identifier: &str) -> String {
        let key = prepare_natural_key(EntityKind::Spot, identifier, 50).unwrap();
        format!("{}-{}-{}", key["parcel"], key["row"], key["column"])
    }

    #[test]
    fn test_spot_normalization() {
        assert_eq!(spot("a1-3-07"), "A1-3-7");
        assert_eq!(spot(" A01 - 03 - 7 "), "A1-3-7");
        assert_eq!(spot("a-1BIS-2"), "A-1bis-2");
        assert_eq!(spot("b-12a-3"), "B-12A-3");
        assert_eq!(spot("C-0-10"), "C-0-10");
    }

    #[test]
    fn test_spot_rejects_malformed() {
        for bad in ["A1-3", "A1-3-7-9", "11-3-7", "A1--7", "A1-3-X", "AB-1-1"] {
            let err = prepare_natural_key(EntityKind::Spot, bad, 50).unwrap_err();
            assert!(
                matches!(err, CellError::InvalidIdentifier { kind: EntityKind::Spot, .. }),
                "{} gave {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_other_keys() {
        let deed = prepare_natural_key(EntityKind::Deed, "4/17", 50).unwrap();
        assert_eq!(deed["number"], Value::Int(4));
        assert_eq!(deed["year"], Value::Int(2017));

        let owner = prepare_natural_key(EntityKind::Owner, "maria  IONESCU", 50).unwrap();
        assert_eq!(owner["name"], Value::text("Maria Ionescu"));

        let company = prepare_natural_key(EntityKind::Company, " Piatra   SRL ", 50).unwrap();
        assert_eq!(company["name"], Value::text("Piatra SRL"));

        assert!(prepare_natural_key(EntityKind::Operation, "x", 50).is_err());
        assert_eq!(
            prepare_natural_key(EntityKind::Owner, "  ", 50),
            Err(CellError::Required)
        );
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        repo.ensure_schema().unwrap();
        let options = ParseOptions::default();
        let ctx = ParseContext {
            repo: &repo,
            options: &options,
        };

        let first = resolve(&ctx, EntityKind::Deed, "4/17").unwrap();
        let second = resolve(&ctx, EntityKind::Deed, "4/2017").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(repo.count(EntityKind::Deed).unwrap(), 1);
    }
}
