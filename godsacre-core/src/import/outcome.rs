//! Row outcomes, sheet reports and the import summary

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{EntityId, EntityKind};

use super::error::RowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Fail,
    Duplicate,
    Add,
}

/// Reconciliation stage a failed row stopped at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Prepare,
    Identify,
    Update,
    Save,
    Attach,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Parse => "parse",
            Stage::Prepare => "prepare",
            Stage::Identify => "identify",
            Stage::Update => "update",
            Stage::Save => "save",
            Stage::Attach => "attach",
        }
    }
}

/// Entity left behind by a row that failed after creating it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartialEntity {
    pub kind: EntityKind,
    pub id: EntityId,
}

/// Result of reconciling one data row
#[derive(Debug, Clone, Serialize)]
pub struct RowOutcome {
    /// 1-based position below the header row
    pub row: usize,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Error class of a failed row, e.g. `ParseError`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    pub info: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_entity: Option<PartialEntity>,
}

impl RowOutcome {
    pub fn added(row: usize, info: String, detail: String) -> Self {
        Self {
            row,
            status: OutcomeStatus::Add,
            stage: None,
            error_kind: None,
            info,
            detail,
            partial_entity: None,
        }
    }

    pub fn duplicate(row: usize, info: String, detail: String) -> Self {
        Self {
            row,
            status: OutcomeStatus::Duplicate,
            stage: None,
            error_kind: None,
            info,
            detail,
            partial_entity: None,
        }
    }

    /// Failed row; `detail` is `<ErrorKind>: <message>`
    pub fn failed(row: usize, info: String, error: &RowError) -> Self {
        let partial_entity = match error {
            RowError::PartialEntity { kind, id, .. } => Some(PartialEntity {
                kind: *kind,
                id: *id,
            }),
            _ => None,
        };
        Self {
            row,
            status: OutcomeStatus::Fail,
            stage: Some(error.stage()),
            error_kind: Some(error.kind()),
            info,
            detail: format!("{}: {}", error.kind(), error),
            partial_entity,
        }
    }
}

/// Outcomes of one sheet, in input row order
#[derive(Debug, Clone, Serialize)]
pub struct SheetReport {
    pub sheet: String,
    pub kind: EntityKind,
    pub rows: Vec<RowOutcome>,
}

impl SheetReport {
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for outcome in &self.rows {
            counts.record(outcome.status);
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub fail: usize,
    pub duplicate: usize,
    pub add: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, status: OutcomeStatus) {
        match status {
            OutcomeStatus::Fail => self.fail += 1,
            OutcomeStatus::Duplicate => self.duplicate += 1,
            OutcomeStatus::Add => self.add += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.fail + self.duplicate + self.add
    }
}

/// Sheet name → outcome counts
pub type ImportSummary = BTreeMap<String, OutcomeCounts>;

pub fn summarize(reports: &[SheetReport]) -> ImportSummary {
    reports
        .iter()
        .map(|report| (report.sheet.clone(), report.counts()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::error::{CellError, ParseError};

    #[test]
    fn test_summary_matches_report() {
        let parse_error: RowError = ParseError {
            field: "spot",
            raw: "?".to_string(),
            source: CellError::Required,
        }
        .into();
        let report = SheetReport {
            sheet: "Operatii".to_string(),
            kind: EntityKind::Operation,
            rows: vec![
                RowOutcome::added(1, "a".into(), String::new()),
                RowOutcome::failed(2, "b".into(), &parse_error),
                RowOutcome::duplicate(3, "c".into(), String::new()),
                RowOutcome::added(4, "d".into(), String::new()),
            ],
        };

        let summary = summarize(std::slice::from_ref(&report));
        let counts = summary["Operatii"];
        assert_eq!(
            counts,
            OutcomeCounts {
                fail: 1,
                duplicate: 1,
                add: 2
            }
        );
        assert_eq!(counts.total(), report.rows.len());
    }

    #[test]
    fn test_failed_outcome_shape() {
        let err: RowError = ParseError {
            field: "date",
            raw: "x".to_string(),
            source: CellError::InvalidDate,
        }
        .into();
        let outcome = RowOutcome::failed(5, "Could not parse field 'date' from 'x'".into(), &err);
        assert_eq!(outcome.stage, Some(Stage::Parse));
        assert!(outcome.detail.starts_with("ParseError: "));
        assert_eq!(outcome.error_kind, Some("ParseError"));

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "fail");
        assert_eq!(json["stage"], "parse");
        assert_eq!(json["error_kind"], "ParseError");
        assert!(json.get("partial_entity").is_none());
    }
}
