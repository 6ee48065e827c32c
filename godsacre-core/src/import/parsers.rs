//! Cell parsers
//!
//! Each [`FieldParser`] turns one raw cell into one typed value. Parsers are
//! plain enum variants dispatched in [`FieldParser::parse`]; the only outside
//! state they see is the [`ParseContext`] (store handle and options), which
//! reference parsers use to resolve natural keys.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::config::ImportSettings;
use crate::domain::{EntityKind, Value};
use crate::ports::Repository;

use super::cell::Cell;
use super::error::CellError;
use super::natural_key;

/// Options shared by all parsers of one import run
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Two-digit years up to this value are read as 20xx, above it as 19xx
    pub year_threshold: u32,
    /// Separator between values of a multi-valued cell
    pub separator: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            year_threshold: 50,
            separator: ",".to_string(),
        }
    }
}

impl From<&ImportSettings> for ParseOptions {
    fn from(settings: &ImportSettings) -> Self {
        Self {
            year_threshold: settings.year_threshold,
            separator: settings.multi_value_separator.clone(),
        }
    }
}

/// What parsers may consult while parsing
pub struct ParseContext<'a> {
    pub repo: &'a dyn Repository,
    pub options: &'a ParseOptions,
}

/// A `NUMBER/YEAR` identifier such as `4/2017`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NrYear {
    pub number: i64,
    pub year: i64,
}

impl fmt::Display for NrYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.year)
    }
}

/// Result of parsing one cell
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Value(Value),
    NrYear(NrYear),
    List(Vec<Parsed>),
}

impl fmt::Display for Parsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parsed::Value(v) => write!(f, "{}", v),
            Parsed::NrYear(n) => write!(f, "{}", n),
            Parsed::List(items) => {
                let items: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

/// Fixed free-text → code dictionary
#[derive(Debug)]
pub struct Vocabulary {
    pub name: &'static str,
    /// Lowercase spelling → code
    pub entries: &'static [(&'static str, &'static str)],
    /// Code used for an empty cell; `None` gives null
    pub default: Option<&'static str>,
    /// Reject empty cells instead of applying the default
    pub required: bool,
}

impl Vocabulary {
    pub fn translate(&self, cell: &Cell) -> Result<Value, CellError> {
        let Some(text) = cell.to_text() else {
            if self.required {
                return Err(CellError::Required);
            }
            return Ok(self.default.map(Value::text).unwrap_or(Value::Null));
        };

        let key = text.to_lowercase();
        self.entries
            .iter()
            .find(|(spelling, _)| *spelling == key)
            .map(|(_, code)| Value::text(*code))
            .ok_or_else(|| {
                let mut expected: Vec<&str> = self.entries.iter().map(|(s, _)| *s).collect();
                expected.dedup();
                CellError::UnknownVocabulary {
                    vocabulary: self.name,
                    expected: expected.join(", "),
                }
            })
    }
}

pub const OPERATION_TYPES: Vocabulary = Vocabulary {
    name: "operation type",
    entries: &[
        ("inhumare", "b"),
        ("înhumare", "b"),
        ("exhumare", "e"),
        ("deshumare", "e"),
    ],
    default: Some("b"),
    required: false,
};

pub const CONSTRUCTION_TYPES: Vocabulary = Vocabulary {
    name: "construction type",
    entries: &[
        ("cavou", "t"),
        ("mormânt", "t"),
        ("mormant", "t"),
        ("bordura", "b"),
        ("bordură", "b"),
    ],
    default: None,
    required: true,
};

pub const CANCEL_REASONS: Vocabulary = Vocabulary {
    name: "cancel reason",
    entries: &[
        ("decedat", "o"),
        ("proprietar decedat", "o"),
        ("donat", "d"),
        ("pierdut", "l"),
    ],
    default: None,
    required: false,
};

/// Parser strategy for one field
#[derive(Debug, Clone, Copy)]
pub enum FieldParser {
    /// Trimmed text, null when empty
    Text,
    /// Trimmed text that must be present
    RequiredText,
    /// Person name: whitespace collapsed, each part title-cased
    Name,
    /// Digits only, null when empty
    Phone,
    Date,
    Year,
    NrYear,
    Money,
    Bool,
    Vocabulary(&'static Vocabulary),
    /// Natural-key get-or-create of another entity
    Reference { kind: EntityKind, required: bool },
    /// Separator-split list of `inner` values
    Many {
        inner: &'static FieldParser,
        required: bool,
    },
}

impl FieldParser {
    pub fn parse(&self, cell: &Cell, ctx: &ParseContext<'_>) -> Result<Parsed, CellError> {
        let threshold = ctx.options.year_threshold;
        let value = match self {
            FieldParser::Text => Value::from(cell.to_text()),
            FieldParser::RequiredText => Value::Text(cell.to_text().ok_or(CellError::Required)?),
            FieldParser::Name => Value::Text(parse_name(cell)?),
            FieldParser::Phone => parse_phone(cell)?,
            FieldParser::Date => Value::Date(parse_date(cell, threshold)?),
            FieldParser::Year => Value::Int(parse_year(cell, threshold)?),
            FieldParser::NrYear => return Ok(Parsed::NrYear(parse_nr_year(cell, threshold)?)),
            FieldParser::Money => Value::Decimal(parse_money(cell)?),
            FieldParser::Bool => Value::Bool(parse_bool(cell)?),
            FieldParser::Vocabulary(vocabulary) => vocabulary.translate(cell)?,
            FieldParser::Reference { kind, required } => match cell.to_text() {
                None if *required => return Err(CellError::Required),
                None => Value::Null,
                Some(token) => {
                    let record = natural_key::resolve(ctx, *kind, &token)?;
                    Value::from(record.id.map(Value::Ref))
                }
            },
            FieldParser::Many { inner, required } => {
                let items = parse_many(inner, cell, ctx)?;
                if items.is_empty() && *required {
                    return Err(CellError::EmptyList);
                }
                return Ok(Parsed::List(items));
            }
        };
        Ok(Parsed::Value(value))
    }
}

fn parse_many(
    inner: &FieldParser,
    cell: &Cell,
    ctx: &ParseContext<'_>,
) -> Result<Vec<Parsed>, CellError> {
    match cell {
        Cell::Empty => Ok(Vec::new()),
        Cell::Text(s) => s
            .split(ctx.options.separator.as_str())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| inner.parse(&Cell::from(token), ctx))
            .collect(),
        // A native number or date is a single value
        other => Ok(vec![inner.parse(other, ctx)?]),
    }
}

/// Expand a shorthand year: `0..=threshold` → 20xx, up to 99 → 19xx, four digits as-is
pub fn expand_year(year: i64, threshold: u32) -> Result<i64, CellError> {
    match year {
        y if (0..=threshold as i64).contains(&y) && y <= 99 => Ok(2000 + y),
        y if (0..=99).contains(&y) => Ok(1900 + y),
        y if (1000..=9999).contains(&y) => Ok(y),
        _ => Err(CellError::InvalidYear),
    }
}

/// Written years are two-digit shorthand or four digits
fn year_from_str(s: &str, threshold: u32) -> Result<i64, CellError> {
    let digits = s.trim().trim_start_matches('\'');
    if !matches!(digits.len(), 2 | 4) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(CellError::InvalidYear);
    }
    let year: i64 = digits.parse().map_err(|_| CellError::InvalidYear)?;
    expand_year(year, threshold)
}

pub fn parse_year(cell: &Cell, threshold: u32) -> Result<i64, CellError> {
    match cell {
        Cell::Empty => Err(CellError::Required),
        Cell::Number(_) => {
            let year = cell.as_integer().ok_or(CellError::InvalidYear)?;
            expand_year(year, threshold)
        }
        Cell::Date(d) => Ok(d.year() as i64),
        Cell::Text(s) => year_from_str(s, threshold),
        Cell::Bool(_) => Err(CellError::InvalidYear),
    }
}

/// Parse a date; bare or shorthand years default to January 1st
pub fn parse_date(cell: &Cell, threshold: u32) -> Result<NaiveDate, CellError> {
    let text = match cell {
        Cell::Empty => return Err(CellError::Required),
        Cell::Date(d) => return Ok(*d),
        Cell::Bool(_) => return Err(CellError::InvalidDate),
        Cell::Number(_) => {
            let year = parse_year(cell, threshold).map_err(|_| CellError::InvalidDate)?;
            return ymd(year, 1, 1);
        }
        Cell::Text(s) => s.trim(),
    };

    if let Ok(year) = year_from_str(text, threshold) {
        return ymd(year, 1, 1);
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Ok(datetime.date());
    }

    // Day-first numeric: 24.01.1994, 24/1/94, 24-01-1994, or month-year 03.1994
    let parts: Vec<&str> = text.split(['.', '/', '-']).map(str::trim).collect();
    let number = |s: &str| s.parse::<u32>().map_err(|_| CellError::InvalidDate);
    match parts.as_slice() {
        [day, month, year] => {
            let year = year_from_str(year, threshold).map_err(|_| CellError::InvalidDate)?;
            ymd(year, number(month)?, number(day)?)
        }
        [month, year] => {
            let year = year_from_str(year, threshold).map_err(|_| CellError::InvalidDate)?;
            ymd(year, number(month)?, 1)
        }
        _ => Err(CellError::InvalidDate),
    }
}

fn ymd(year: i64, month: u32, day: u32) -> Result<NaiveDate, CellError> {
    let year = i32::try_from(year).map_err(|_| CellError::InvalidDate)?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or(CellError::InvalidDate)
}

/// Parse `NUMBER/YEAR`, e.g. `10/17` → 10, 2017
pub fn parse_nr_year(cell: &Cell, threshold: u32) -> Result<NrYear, CellError> {
    let text = match cell {
        Cell::Empty => return Err(CellError::Required),
        Cell::Text(s) => s.trim(),
        _ => return Err(CellError::InvalidNrYear),
    };
    nr_year_from_str(text, threshold)
}

pub fn nr_year_from_str(text: &str, threshold: u32) -> Result<NrYear, CellError> {
    let (number, year) = text.split_once('/').ok_or(CellError::InvalidNrYear)?;
    let number = number.trim();
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(CellError::InvalidNrYear);
    }
    let number: i64 = number.parse().map_err(|_| CellError::InvalidNrYear)?;
    let year = year_from_str(year, threshold).map_err(|_| CellError::InvalidNrYear)?;
    Ok(NrYear { number, year })
}

pub fn parse_money(cell: &Cell) -> Result<Decimal, CellError> {
    match cell {
        Cell::Empty => Err(CellError::Required),
        Cell::Number(n) => Decimal::try_from(*n).map_err(|_| CellError::InvalidMoney),
        Cell::Text(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| if c == ',' { '.' } else { c })
                .collect();
            Decimal::from_str(&cleaned).map_err(|_| CellError::InvalidMoney)
        }
        _ => Err(CellError::InvalidMoney),
    }
}

/// Blank reads as "no": registers leave the box empty when nothing was done
pub fn parse_bool(cell: &Cell) -> Result<bool, CellError> {
    match cell {
        Cell::Empty => Ok(false),
        Cell::Bool(b) => Ok(*b),
        Cell::Number(_) => match cell.as_integer() {
            Some(1) => Ok(true),
            Some(0) => Ok(false),
            _ => Err(CellError::InvalidBool),
        },
        Cell::Text(s) => match s.trim().to_lowercase().as_str() {
            "da" | "yes" | "y" | "x" | "1" | "true" => Ok(true),
            "nu" | "no" | "n" | "0" | "false" => Ok(false),
            _ => Err(CellError::InvalidBool),
        },
        Cell::Date(_) => Err(CellError::InvalidBool),
    }
}

fn parse_phone(cell: &Cell) -> Result<Value, CellError> {
    let Some(text) = cell.to_text() else {
        return Ok(Value::Null);
    };
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(CellError::InvalidPhone);
    }
    Ok(Value::Text(digits))
}

fn parse_name(cell: &Cell) -> Result<String, CellError> {
    let text = cell.to_text().ok_or(CellError::Required)?;
    Ok(person_name(&text))
}

/// Collapse whitespace and title-case every space- or hyphen-separated part
pub fn person_name(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            word.split('-')
                .map(capitalize)
                .collect::<Vec<_>>()
                .join("-")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
