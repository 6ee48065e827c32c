//! Status command - show register contents

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Register Status".bold());
    println!();

    let mut table = output::create_table();
    table.set_header(vec!["Entity", "Count"]);
    for kind in &status.kinds {
        table.add_row(vec![kind.name.clone(), kind.count.to_string()]);
    }
    table.add_row(vec!["Total".to_string(), status.total_entities.to_string()]);
    println!("{}", table);

    if let Some(database) = &status.database {
        println!();
        output::info(&format!("Database: {}", database));
    }

    Ok(())
}
