//! Import descriptors
//!
//! One [`ImportDescriptor`] per importable entity kind says which sheet to
//! read, how its headers map to fields, how each field is parsed, how parsed
//! fields become constructor fields, and which fields decide identity.

use std::collections::BTreeMap;

use crate::domain::{EntityId, EntityKind, FieldMap, Value};

use super::error::PrepareError;
use super::parsers::{
    FieldParser, Parsed, CANCEL_REASONS, CONSTRUCTION_TYPES, OPERATION_TYPES,
};

/// Parsed field name → parsed value
pub type ParsedFields = BTreeMap<&'static str, Parsed>;

/// Member of a relation held until the owning entity has an identity
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    Existing(EntityId),
    /// Sub-entity to get-or-create by `key` when the relation is attached
    Draft {
        kind: EntityKind,
        key: FieldMap,
        defaults: FieldMap,
    },
}

/// Constructor-ready fields plus held relations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prepared {
    pub fields: FieldMap,
    pub relations: BTreeMap<&'static str, Vec<Related>>,
}

pub type PrepareFn = fn(&ImportDescriptor, ParsedFields) -> Result<Prepared, PrepareError>;

#[derive(Debug, Clone, Copy)]
pub struct ImportDescriptor {
    pub kind: EntityKind,
    pub sheet_name: &'static str,
    /// Field name → external column header
    pub columns: &'static [(&'static str, &'static str)],
    pub parsers: &'static [(&'static str, FieldParser)],
    pub prepare: PrepareFn,
    pub identifying: &'static [&'static str],
    pub relational: &'static [&'static str],
}

impl ImportDescriptor {
    pub fn header_for(&self, field: &str) -> Option<&'static str> {
        self.columns
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, header)| *header)
    }

    pub fn is_relational(&self, field: &str) -> bool {
        self.relational.contains(&field)
    }

    /// Identifying fields that are carried by a relation
    pub fn relational_identifying(&self) -> Vec<&'static str> {
        self.identifying
            .iter()
            .copied()
            .filter(|f| self.is_relational(f))
            .collect()
    }
}

fn unexpected(field: &'static str, found: &Parsed) -> PrepareError {
    PrepareError::Unexpected {
        field,
        found: found.to_string(),
    }
}

/// Scalars become fields; reference lists in relational fields become held relations
pub fn prepare_fields(
    descriptor: &ImportDescriptor,
    parsed: ParsedFields,
) -> Result<Prepared, PrepareError> {
    let mut prepared = Prepared::default();
    for (field, value) in parsed {
        if descriptor.is_relational(field) {
            let items = match value {
                Parsed::List(items) => items,
                single => vec![single],
            };
            let mut related = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Parsed::Value(Value::Ref(id)) => related.push(Related::Existing(id)),
                    Parsed::Value(Value::Null) => {}
                    other => return Err(unexpected(field, &other)),
                }
            }
            prepared.relations.insert(field, related);
        } else {
            match value {
                Parsed::Value(v) => {
                    prepared.fields.insert(field, v);
                }
                other => return Err(unexpected(field, &other)),
            }
        }
    }
    Ok(prepared)
}

fn take_list(parsed: &mut ParsedFields, field: &'static str) -> Result<Vec<Parsed>, PrepareError> {
    match parsed.remove(field) {
        None => Ok(Vec::new()),
        Some(Parsed::List(items)) => Ok(items),
        Some(other) => Err(unexpected(field, &other)),
    }
}

/// Zip receipt identifiers with their values into receipt drafts
fn zip_receipts(
    kind: EntityKind,
    parsed: &mut ParsedFields,
) -> Result<Vec<Related>, PrepareError> {
    let receipts = take_list(parsed, "receipts")?;
    let values = take_list(parsed, "values")?;
    if receipts.len() != values.len() {
        return Err(PrepareError::CountMismatch {
            left: "receipts",
            left_len: receipts.len(),
            right: "values",
            right_len: values.len(),
        });
    }

    receipts
        .into_iter()
        .zip(values)
        .map(|(receipt, value)| {
            let nr = match receipt {
                Parsed::NrYear(nr) => nr,
                other => return Err(unexpected("receipts", &other)),
            };
            let value = match value {
                Parsed::Value(v @ Value::Decimal(_)) => v,
                other => return Err(unexpected("values", &other)),
            };
            let mut key = FieldMap::new();
            key.insert("number", Value::Int(nr.number));
            key.insert("year", Value::Int(nr.year));
            let mut defaults = FieldMap::new();
            defaults.insert("value", value);
            Ok(Related::Draft {
                kind,
                key,
                defaults,
            })
        })
        .collect()
}

/// Deed: split `nr_year` and zip receipts with values
pub fn prepare_deed(
    descriptor: &ImportDescriptor,
    mut parsed: ParsedFields,
) -> Result<Prepared, PrepareError> {
    let nr = match parsed.remove("nr_year") {
        Some(Parsed::NrYear(nr)) => nr,
        Some(other) => return Err(unexpected("nr_year", &other)),
        None => return Err(PrepareError::MissingField("nr_year")),
    };
    let receipts = zip_receipts(EntityKind::OwnershipReceipt, &mut parsed)?;

    let mut prepared = prepare_fields(descriptor, parsed)?;
    prepared.fields.insert("number", Value::Int(nr.number));
    prepared.fields.insert("year", Value::Int(nr.year));
    prepared.relations.insert("receipts", receipts);
    Ok(prepared)
}

/// Payment: zip receipts with values
pub fn prepare_payment(
    descriptor: &ImportDescriptor,
    mut parsed: ParsedFields,
) -> Result<Prepared, PrepareError> {
    let receipts = zip_receipts(EntityKind::PaymentReceipt, &mut parsed)?;
    let mut prepared = prepare_fields(descriptor, parsed)?;
    prepared.relations.insert("receipts", receipts);
    Ok(prepared)
}

const SPOT_REF: FieldParser = FieldParser::Reference {
    kind: EntityKind::Spot,
    required: true,
};
const DEED_REF: FieldParser = FieldParser::Reference {
    kind: EntityKind::Deed,
    required: true,
};
const NR_YEAR: FieldParser = FieldParser::NrYear;
const MONEY: FieldParser = FieldParser::Money;

pub fn deeds() -> ImportDescriptor {
    ImportDescriptor {
        kind: EntityKind::Deed,
        sheet_name: "Acte",
        columns: &[
            ("nr_year", "Act"),
            ("spots", "Locuri veci"),
            ("cancel_reason", "Anulare"),
            ("receipts", "Chitante"),
            ("values", "Valori"),
        ],
        parsers: &[
            ("nr_year", FieldParser::NrYear),
            (
                "spots",
                FieldParser::Many {
                    inner: &SPOT_REF,
                    required: true,
                },
            ),
            ("cancel_reason", FieldParser::Vocabulary(&CANCEL_REASONS)),
            (
                "receipts",
                FieldParser::Many {
                    inner: &NR_YEAR,
                    required: false,
                },
            ),
            (
                "values",
                FieldParser::Many {
                    inner: &MONEY,
                    required: false,
                },
            ),
        ],
        prepare: prepare_deed,
        identifying: &["number", "year"],
        relational: &["spots", "receipts"],
    }
}

pub fn owners() -> ImportDescriptor {
    ImportDescriptor {
        kind: EntityKind::Owner,
        sheet_name: "Proprietari",
        columns: &[
            ("name", "Nume"),
            ("phone", "Telefon"),
            ("address", "Adresa"),
            ("deeds", "Acte"),
        ],
        parsers: &[
            ("name", FieldParser::Name),
            ("phone", FieldParser::Phone),
            ("address", FieldParser::Text),
            (
                "deeds",
                FieldParser::Many {
                    inner: &DEED_REF,
                    required: false,
                },
            ),
        ],
        prepare: prepare_fields,
        identifying: &["name"],
        relational: &["deeds"],
    }
}

pub fn constructions() -> ImportDescriptor {
    ImportDescriptor {
        kind: EntityKind::Construction,
        sheet_name: "Constructii",
        columns: &[
            ("type", "Tip"),
            ("spots", "Locuri veci"),
            ("company", "Firma"),
            ("owner_builder", "Constructor"),
        ],
        parsers: &[
            ("type", FieldParser::Vocabulary(&CONSTRUCTION_TYPES)),
            (
                "spots",
                FieldParser::Many {
                    inner: &SPOT_REF,
                    required: true,
                },
            ),
            (
                "company",
                FieldParser::Reference {
                    kind: EntityKind::Company,
                    required: false,
                },
            ),
            (
                "owner_builder",
                FieldParser::Reference {
                    kind: EntityKind::Owner,
                    required: false,
                },
            ),
        ],
        prepare: prepare_fields,
        identifying: &["spots"],
        relational: &["spots"],
    }
}

pub fn operations() -> ImportDescriptor {
    ImportDescriptor {
        kind: EntityKind::Operation,
        sheet_name: "Operatii",
        columns: &[
            ("type", "Tip"),
            ("name", "Nume"),
            ("spot", "Loc veci"),
            ("date", "Data"),
            ("note", "Nota"),
        ],
        parsers: &[
            ("type", FieldParser::Vocabulary(&OPERATION_TYPES)),
            ("name", FieldParser::Name),
            (
                "spot",
                FieldParser::Reference {
                    kind: EntityKind::Spot,
                    required: true,
                },
            ),
            ("date", FieldParser::Date),
            ("note", FieldParser::Text),
        ],
        prepare: prepare_fields,
        identifying: &["type", "name", "spot", "date"],
        relational: &[],
    }
}

pub fn payments() -> ImportDescriptor {
    ImportDescriptor {
        kind: EntityKind::Payment,
        sheet_name: "Plati",
        columns: &[
            ("spot", "Loc veci"),
            ("year", "An"),
            ("receipts", "Chitante"),
            ("values", "Valori"),
        ],
        parsers: &[
            (
                "spot",
                FieldParser::Reference {
                    kind: EntityKind::Spot,
                    required: true,
                },
            ),
            ("year", FieldParser::Year),
            (
                "receipts",
                FieldParser::Many {
                    inner: &NR_YEAR,
                    required: false,
                },
            ),
            (
                "values",
                FieldParser::Many {
                    inner: &MONEY,
                    required: false,
                },
            ),
        ],
        prepare: prepare_payment,
        identifying: &["spot", "year"],
        relational: &["receipts"],
    }
}

pub fn maintenances() -> ImportDescriptor {
    ImportDescriptor {
        kind: EntityKind::Maintenance,
        sheet_name: "Intretinere",
        columns: &[("spot", "Loc veci"), ("year", "An"), ("kept", "Intretinut")],
        parsers: &[
            (
                "spot",
                FieldParser::Reference {
                    kind: EntityKind::Spot,
                    required: true,
                },
            ),
            ("year", FieldParser::Year),
            ("kept", FieldParser::Bool),
        ],
        prepare: prepare_fields,
        identifying: &["spot", "year"],
        relational: &[],
    }
}

/// Every cemetery sheet, in processing order
pub fn cemetery_descriptors() -> Vec<ImportDescriptor> {
    vec![
        deeds(),
        owners(),
        constructions(),
        operations(),
        payments(),
        maintenances(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::parsers::NrYear;
    use rust_decimal::Decimal;

    fn nr(number: i64, year: i64) -> Parsed {
        Parsed::NrYear(NrYear { number, year })
    }

    fn money(n: i64) -> Parsed {
        Parsed::Value(Value::Decimal(Decimal::new(n, 0)))
    }

    #[test]
    fn test_descriptors_are_consistent() {
        for descriptor in cemetery_descriptors() {
            let schema = descriptor.kind.schema();
            for (field, _) in descriptor.parsers {
                assert!(descriptor.header_for(field).is_some(), "{}", field);
            }
            for field in descriptor.relational {
                assert!(schema.relation(field).is_some(), "{}", field);
            }
            for field in descriptor.identifying {
                assert!(
                    schema.column(field).is_some() || descriptor.is_relational(field),
                    "{}",
                    field
                );
            }
        }
    }

    #[test]
    fn test_prepare_deed_splits_and_zips() {
        let mut parsed = ParsedFields::new();
        parsed.insert("nr_year", nr(4, 2017));
        parsed.insert("spots", Parsed::List(vec![Parsed::Value(Value::Ref(7))]));
        parsed.insert("cancel_reason", Parsed::Value(Value::Null));
        parsed.insert("receipts", Parsed::List(vec![nr(1, 2017), nr(2, 2017)]));
        parsed.insert("values", Parsed::List(vec![money(100), money(50)]));

        let prepared = prepare_deed(&deeds(), parsed).unwrap();
        assert_eq!(prepared.fields["number"], Value::Int(4));
        assert_eq!(prepared.fields["year"], Value::Int(2017));
        assert_eq!(prepared.fields["cancel_reason"], Value::Null);
        assert_eq!(prepared.relations["spots"], vec![Related::Existing(7)]);

        let receipts = &prepared.relations["receipts"];
        assert_eq!(receipts.len(), 2);
        let Related::Draft { kind, key, defaults } = &receipts[1] else {
            panic!("expected a draft");
        };
        assert_eq!(*kind, EntityKind::OwnershipReceipt);
        assert_eq!(key["number"], Value::Int(2));
        assert_eq!(defaults["value"], Value::Decimal(Decimal::new(50, 0)));
    }

    #[test]
    fn test_prepare_rejects_count_mismatch() {
        let mut parsed = ParsedFields::new();
        parsed.insert("spot", Parsed::Value(Value::Ref(1)));
        parsed.insert("year", Parsed::Value(Value::Int(2020)));
        parsed.insert("receipts", Parsed::List(vec![nr(1, 2020)]));
        parsed.insert("values", Parsed::List(vec![money(10), money(20)]));

        let err = prepare_payment(&payments(), parsed).unwrap_err();
        assert_eq!(err.to_string(), "receipts has 1 entries but values has 2");
    }

    #[test]
    fn test_generic_prepare_holds_relations() {
        let mut parsed = ParsedFields::new();
        parsed.insert("type", Parsed::Value(Value::text("t")));
        parsed.insert(
            "spots",
            Parsed::List(vec![Parsed::Value(Value::Ref(1)), Parsed::Value(Value::Ref(2))]),
        );
        parsed.insert("company", Parsed::Value(Value::Null));

        let prepared = prepare_fields(&constructions(), parsed).unwrap();
        assert!(!prepared.fields.contains_key("spots"));
        assert_eq!(prepared.relations["spots"].len(), 2);
        assert_eq!(constructions().relational_identifying(), vec!["spots"]);
        assert!(operations().relational_identifying().is_empty());
    }
}
