//! Import command - reconcile a register document into the database

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use colored::Colorize;
use comfy_table::Cell;
use dialoguer::Confirm;

use godsacre_core::services::{ImportResult, LogEvent};
use godsacre_core::OutcomeStatus;

use super::{get_context, get_logger, log_event};
use crate::output;

pub fn run(file: &Path, wipe: bool, force: bool, failures_only: bool, json: bool) -> Result<()> {
    let logger = get_logger().map(Arc::new);
    log_event(
        logger.as_deref(),
        LogEvent::new("command_executed").with_command("import"),
    );

    let mut ctx = get_context()?;
    if let Some(logger) = &logger {
        ctx = ctx.with_logger(Arc::clone(logger));
    }

    if wipe {
        if !ctx.config.import.allow_wipe {
            bail!("--wipe is disabled by settings (import.allowWipe = false)");
        }
        if !force {
            if atty::isnt(atty::Stream::Stdin) {
                bail!("Refusing to wipe without confirmation; pass --force");
            }
            println!(
                "\n{}",
                "This will delete ALL register data before importing.".yellow()
            );
            if !Confirm::new()
                .with_prompt("Are you sure?")
                .default(false)
                .interact()?
            {
                println!("{}\n", "Cancelled".dimmed());
                return Ok(());
            }
        }
    }

    let result = ctx.import_service.import_path(file, wipe)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    print_result(&result, failures_only);
    Ok(())
}

fn print_result(result: &ImportResult, failures_only: bool) {
    println!();
    if result.wiped {
        output::warning(&format!("Wiped {} existing entities", result.deleted));
    }

    for report in &result.reports {
        let rows: Vec<_> = report
            .rows
            .iter()
            .filter(|o| !failures_only || o.status == OutcomeStatus::Fail)
            .collect();
        if rows.is_empty() {
            continue;
        }

        println!("{} ({})", report.sheet.bold(), report.kind);
        let mut table = output::create_table();
        table.set_header(vec!["Row", "Status", "Info", "Detail"]);
        for outcome in rows {
            table.add_row(vec![
                Cell::new(outcome.row),
                output::status_cell(outcome.status, outcome.partial_entity.is_some()),
                Cell::new(&outcome.info),
                Cell::new(&outcome.detail),
            ]);
        }
        println!("{}\n", table);
    }

    let mut summary = output::create_table();
    summary.set_header(vec!["Sheet", "Added", "Duplicate", "Failed"]);
    for (sheet, counts) in &result.summary {
        summary.add_row(vec![
            Cell::new(sheet),
            Cell::new(counts.add),
            Cell::new(counts.duplicate),
            Cell::new(counts.fail),
        ]);
    }
    println!("{}", summary);

    let totals = result.totals();
    let line = format!(
        "{} added, {} duplicate, {} failed",
        totals.add, totals.duplicate, totals.fail
    );
    if totals.fail == 0 {
        output::success(&line);
    } else {
        output::error(&line);
        let partial = result
            .reports
            .iter()
            .flat_map(|r| &r.rows)
            .filter(|o| o.partial_entity.is_some())
            .count();
        if partial > 0 {
            output::warning(&format!(
                "{} rows left an entity with incomplete relations; fix the sheet and re-run",
                partial
            ));
        }
    }
}
