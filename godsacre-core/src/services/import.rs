//! Import service - sheet/file driver for the reconciliation engine

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::config::ImportSettings;
use crate::domain::result::Error;
use crate::domain::EntityKind;
use crate::import::{
    cemetery_descriptors, summarize, Cell, ImportDescriptor, ImportSummary, OutcomeCounts,
    ParseOptions, RowCells, RowReconciler, Sheet, SheetReport, Workbook,
};
use crate::ports::Repository;
use crate::services::logging::{LogEvent, LoggingService};

/// Result of importing one document
#[derive(Debug, Serialize)]
pub struct ImportResult {
    pub source: String,
    pub wiped: bool,
    /// Entities removed by the wipe
    pub deleted: u64,
    pub reports: Vec<SheetReport>,
    pub summary: ImportSummary,
}

impl ImportResult {
    /// Counts over every sheet
    pub fn totals(&self) -> OutcomeCounts {
        let mut totals = OutcomeCounts::default();
        for counts in self.summary.values() {
            totals.fail += counts.fail;
            totals.duplicate += counts.duplicate;
            totals.add += counts.add;
        }
        totals
    }
}

/// Import service driving descriptors over a workbook
pub struct ImportService {
    repository: Arc<DuckDbRepository>,
    descriptors: Vec<ImportDescriptor>,
    wipe_kinds: Vec<EntityKind>,
    settings: ImportSettings,
    logger: Option<Arc<LoggingService>>,
}

impl ImportService {
    /// Service over the cemetery sheets; a wipe clears every entity kind
    pub fn new(repository: Arc<DuckDbRepository>, settings: ImportSettings) -> Self {
        Self::with_descriptors(
            repository,
            cemetery_descriptors(),
            EntityKind::ALL.to_vec(),
            settings,
        )
    }

    pub fn with_descriptors(
        repository: Arc<DuckDbRepository>,
        descriptors: Vec<ImportDescriptor>,
        wipe_kinds: Vec<EntityKind>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            repository,
            descriptors,
            wipe_kinds,
            settings,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Import a workbook, csv file or directory of csv files
    pub fn import_path(&self, path: &Path, wipe: bool) -> Result<ImportResult> {
        let source = path.display().to_string();
        self.log(LogEvent::new("import_started").with_command(&source));

        let result = Workbook::open(path)
            .with_context(|| format!("Failed to read {}", source))
            .and_then(|workbook| self.import_workbook(&workbook, &source, wipe));

        if let Err(e) = &result {
            self.log(
                LogEvent::new("import_aborted")
                    .with_command(&source)
                    .with_error(format!("{:#}", e)),
            );
        }
        result
    }

    /// Validate, optionally wipe, then reconcile every sheet in descriptor order
    pub fn import_workbook(
        &self,
        workbook: &Workbook,
        source: &str,
        wipe: bool,
    ) -> Result<ImportResult> {
        if wipe && !self.settings.allow_wipe {
            bail!("Wiping existing data is disabled (allowWipe is off)");
        }

        let plan = self.plan(workbook)?;

        let mut deleted = 0;
        if wipe {
            for kind in &self.wipe_kinds {
                deleted += self
                    .repository
                    .delete_all(*kind)
                    .with_context(|| format!("Failed to wipe {}", kind))?;
            }
        }

        let options = ParseOptions::from(&self.settings);
        let reconciler = RowReconciler::new(self.repository.as_ref(), &options);
        let reports: Vec<SheetReport> = plan
            .iter()
            .map(|(descriptor, sheet, columns)| {
                self.import_sheet(&reconciler, descriptor, sheet, columns)
            })
            .collect();
        let summary = summarize(&reports);

        let result = ImportResult {
            source: source.to_string(),
            wiped: wipe,
            deleted,
            reports,
            summary,
        };
        let totals = result.totals();
        self.log(LogEvent::new("import_completed").with_command(format!(
            "{}: {} added, {} duplicate, {} failed",
            source, totals.add, totals.duplicate, totals.fail
        )));
        Ok(result)
    }

    /// Resolve every descriptor to its sheet and column positions before anything is written
    fn plan<'w>(&self, workbook: &'w Workbook) -> Result<Vec<Plan<'w>>> {
        let mut problems = Vec::new();
        let mut plan = Vec::with_capacity(self.descriptors.len());

        let mut missing_sheet = false;

        for descriptor in &self.descriptors {
            let Some(sheet) = workbook.sheet(descriptor.sheet_name) else {
                problems.push(format!("missing sheet '{}'", descriptor.sheet_name));
                missing_sheet = true;
                continue;
            };
            let mut columns = Vec::with_capacity(descriptor.columns.len());
            for &(field, header) in descriptor.columns {
                match sheet.column_index(header) {
                    Some(index) => columns.push((field, index)),
                    None => problems.push(format!(
                        "sheet '{}' has no column '{}'",
                        descriptor.sheet_name, header
                    )),
                }
            }
            plan.push((*descriptor, sheet, columns));
        }

        if missing_sheet {
            problems.push(format!(
                "document has sheets: {}",
                workbook.sheet_names().join(", ")
            ));
        }
        if !problems.is_empty() {
            return Err(Error::workbook(problems.join("; ")).into());
        }
        Ok(plan)
    }

    fn import_sheet(
        &self,
        reconciler: &RowReconciler<'_>,
        descriptor: &ImportDescriptor,
        sheet: &Sheet,
        columns: &[(&'static str, usize)],
    ) -> SheetReport {
        let mut rows = Vec::new();

        for (index, raw) in sheet.rows.iter().enumerate() {
            let row = index + 1;
            let cells: RowCells = columns
                .iter()
                .map(|&(field, column)| {
                    let cell = raw.get(column).cloned().unwrap_or(Cell::Empty);
                    (field, cell.blank_out(&self.settings.blank_markers))
                })
                .collect();
            if cells.values().all(Cell::is_empty) {
                continue;
            }

            let outcome = reconciler.reconcile(descriptor, row, &cells);
            // Only the failure class is logged; cell values stay in the report
            if let (Some(stage), Some(kind)) = (outcome.stage, outcome.error_kind) {
                self.log(
                    LogEvent::new("row_failed")
                        .with_sheet(&sheet.name)
                        .with_row(row)
                        .with_error(kind)
                        .with_error_details(format!("stage={}", stage.as_str())),
                );
            }
            rows.push(outcome);
        }

        SheetReport {
            sheet: sheet.name.clone(),
            kind: descriptor.kind,
            rows,
        }
    }

    /// Logging never interrupts an import
    fn log(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            let _ = logger.log(event);
        }
    }
}

type Plan<'w> = (ImportDescriptor, &'w Sheet, Vec<(&'static str, usize)>);
