//! Entity schema table
//!
//! Every entity kind the register knows about is described here: its table,
//! typed columns, natural key and many-to-many relations. Records, the store
//! adapter and the import engine all go through this table instead of
//! addressing fields dynamically.

use std::fmt;

use serde::Serialize;

use super::value::Value;

/// All entity kinds in the register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Spot,
    Deed,
    OwnershipReceipt,
    Owner,
    Company,
    Construction,
    Operation,
    Payment,
    PaymentReceipt,
    Maintenance,
}

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Spot,
        EntityKind::Deed,
        EntityKind::OwnershipReceipt,
        EntityKind::Owner,
        EntityKind::Company,
        EntityKind::Construction,
        EntityKind::Operation,
        EntityKind::Payment,
        EntityKind::PaymentReceipt,
        EntityKind::Maintenance,
    ];

    pub fn schema(self) -> &'static EntitySchema {
        match self {
            EntityKind::Spot => &SPOT,
            EntityKind::Deed => &DEED,
            EntityKind::OwnershipReceipt => &OWNERSHIP_RECEIPT,
            EntityKind::Owner => &OWNER,
            EntityKind::Company => &COMPANY,
            EntityKind::Construction => &CONSTRUCTION,
            EntityKind::Operation => &OPERATION,
            EntityKind::Payment => &PAYMENT,
            EntityKind::PaymentReceipt => &PAYMENT_RECEIPT,
            EntityKind::Maintenance => &MAINTENANCE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Spot => "spot",
            EntityKind::Deed => "deed",
            EntityKind::OwnershipReceipt => "ownership_receipt",
            EntityKind::Owner => "owner",
            EntityKind::Company => "company",
            EntityKind::Construction => "construction",
            EntityKind::Operation => "operation",
            EntityKind::Payment => "payment",
            EntityKind::PaymentReceipt => "payment_receipt",
            EntityKind::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Spot => "Spot",
            EntityKind::Deed => "Deed",
            EntityKind::OwnershipReceipt => "Ownership receipt",
            EntityKind::Owner => "Owner",
            EntityKind::Company => "Company",
            EntityKind::Construction => "Construction",
            EntityKind::Operation => "Operation",
            EntityKind::Payment => "Payment",
            EntityKind::PaymentReceipt => "Payment receipt",
            EntityKind::Maintenance => "Maintenance",
        };
        write!(f, "{}", name)
    }
}

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Int,
    Decimal,
    Bool,
    Date,
    Ref(EntityKind),
}

#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

impl Column {
    const fn required(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty, nullable: false }
    }

    const fn optional(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty, nullable: true }
    }

    /// Whether `value` can be stored in this column
    pub fn accepts(&self, value: &Value) -> bool {
        match (self.ty, value) {
            (_, Value::Null) => self.nullable,
            (ColumnType::Text, Value::Text(_)) => true,
            (ColumnType::Int, Value::Int(_)) => true,
            (ColumnType::Decimal, Value::Decimal(_)) => true,
            (ColumnType::Bool, Value::Bool(_)) => true,
            (ColumnType::Date, Value::Date(_)) => true,
            (ColumnType::Ref(_), Value::Ref(_)) => true,
            _ => false,
        }
    }
}

/// Many-to-many relation stored in a link table
#[derive(Debug)]
pub struct Relation {
    pub name: &'static str,
    pub target: EntityKind,
    pub link_table: &'static str,
    pub owner_column: &'static str,
    pub target_column: &'static str,
}

/// How an entity is named in reports
#[derive(Debug, Clone, Copy)]
pub enum LabelStyle {
    /// Natural key values joined by a separator (e.g. `A1-3-7`, `4/2017`)
    NaturalKey(&'static str),
    /// `Kind #id`
    Surrogate,
}

#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub table: &'static str,
    pub columns: &'static [Column],
    pub natural_key: &'static [&'static str],
    pub relations: &'static [Relation],
    pub label: LabelStyle,
}

impl EntitySchema {
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&'static Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn is_natural_key(&self, name: &str) -> bool {
        self.natural_key.contains(&name)
    }
}

use ColumnType::*;

static SPOT: EntitySchema = EntitySchema {
    kind: EntityKind::Spot,
    table: "spots",
    columns: &[
        Column::required("parcel", Text),
        Column::required("row", Text),
        Column::required("column", Text),
    ],
    natural_key: &["parcel", "row", "column"],
    relations: &[],
    label: LabelStyle::NaturalKey("-"),
};

static DEED: EntitySchema = EntitySchema {
    kind: EntityKind::Deed,
    table: "deeds",
    columns: &[
        Column::required("number", Int),
        Column::required("year", Int),
        Column::optional("cancel_reason", Text),
    ],
    natural_key: &["number", "year"],
    relations: &[
        Relation {
            name: "spots",
            target: EntityKind::Spot,
            link_table: "deed_spots",
            owner_column: "deed_id",
            target_column: "spot_id",
        },
        Relation {
            name: "receipts",
            target: EntityKind::OwnershipReceipt,
            link_table: "deed_receipts",
            owner_column: "deed_id",
            target_column: "receipt_id",
        },
    ],
    label: LabelStyle::NaturalKey("/"),
};

static OWNERSHIP_RECEIPT: EntitySchema = EntitySchema {
    kind: EntityKind::OwnershipReceipt,
    table: "ownership_receipts",
    columns: &[
        Column::required("number", Int),
        Column::required("year", Int),
        Column::required("value", Decimal),
    ],
    natural_key: &["number", "year"],
    relations: &[],
    label: LabelStyle::NaturalKey("/"),
};

static OWNER: EntitySchema = EntitySchema {
    kind: EntityKind::Owner,
    table: "owners",
    columns: &[
        Column::required("name", Text),
        Column::optional("phone", Text),
        Column::optional("address", Text),
    ],
    natural_key: &["name"],
    relations: &[Relation {
        name: "deeds",
        target: EntityKind::Deed,
        link_table: "owner_deeds",
        owner_column: "owner_id",
        target_column: "deed_id",
    }],
    label: LabelStyle::NaturalKey(" "),
};

static COMPANY: EntitySchema = EntitySchema {
    kind: EntityKind::Company,
    table: "companies",
    columns: &[Column::required("name", Text)],
    natural_key: &["name"],
    relations: &[],
    label: LabelStyle::NaturalKey(" "),
};

static CONSTRUCTION: EntitySchema = EntitySchema {
    kind: EntityKind::Construction,
    table: "constructions",
    columns: &[
        Column::required("type", Text),
        Column::optional("company", Ref(EntityKind::Company)),
        Column::optional("owner_builder", Ref(EntityKind::Owner)),
    ],
    natural_key: &[],
    relations: &[Relation {
        name: "spots",
        target: EntityKind::Spot,
        link_table: "construction_spots",
        owner_column: "construction_id",
        target_column: "spot_id",
    }],
    label: LabelStyle::Surrogate,
};

static OPERATION: EntitySchema = EntitySchema {
    kind: EntityKind::Operation,
    table: "operations",
    columns: &[
        Column::required("type", Text),
        Column::required("name", Text),
        Column::required("spot", Ref(EntityKind::Spot)),
        Column::required("date", Date),
        Column::optional("note", Text),
    ],
    natural_key: &[],
    relations: &[],
    label: LabelStyle::Surrogate,
};

static PAYMENT: EntitySchema = EntitySchema {
    kind: EntityKind::Payment,
    table: "payments",
    columns: &[
        Column::required("spot", Ref(EntityKind::Spot)),
        Column::required("year", Int),
    ],
    natural_key: &["spot", "year"],
    relations: &[Relation {
        name: "receipts",
        target: EntityKind::PaymentReceipt,
        link_table: "payment_receipts_link",
        owner_column: "payment_id",
        target_column: "receipt_id",
    }],
    label: LabelStyle::Surrogate,
};

static PAYMENT_RECEIPT: EntitySchema = EntitySchema {
    kind: EntityKind::PaymentReceipt,
    table: "payment_receipts",
    columns: &[
        Column::required("number", Int),
        Column::required("year", Int),
        Column::required("value", Decimal),
    ],
    natural_key: &["number", "year"],
    relations: &[],
    label: LabelStyle::NaturalKey("/"),
};

static MAINTENANCE: EntitySchema = EntitySchema {
    kind: EntityKind::Maintenance,
    table: "maintenances",
    columns: &[
        Column::required("spot", Ref(EntityKind::Spot)),
        Column::required("year", Int),
        Column::required("kept", Bool),
    ],
    natural_key: &["spot", "year"],
    relations: &[],
    label: LabelStyle::Surrogate,
};
