use anyhow::Result;
use colored::*;

use crate::cli::ToolchainArgs;
use crate::matrix::{self, FamilyId};

use super::common::{select_families, Session};

/// Prints every cell of the selected families with its output path and
/// whether it can run here.
pub fn execute_list_pipeline(session: &Session, platform: &[FamilyId], all: bool) -> Result<()> {
    let ctx = session.matrix_context(&ToolchainArgs::default())?;
    let families = if all {
        FamilyId::ALL.to_vec()
    } else {
        select_families(platform, ctx.host)
    };
    let cells = matrix::generate(&families, &ctx)?;

    for cell in &cells {
        let status = if !cell.available {
            "unavailable on this host".yellow().to_string()
        } else if let Err(e) = cell.options.validate() {
            format!("{} {}", "invalid:".red(), e)
        } else {
            "ready".green().to_string()
        };
        println!(
            "{:<48} {}{:<16} {}",
            cell.task_name, cell.relative_dir, cell.options.artifact_name, status
        );
    }

    let runnable = cells.iter().filter(|c| c.available).count();
    println!(
        "{} {} cell(s) across {} famil{}, {} runnable on this host",
        "[INFO]".cyan(),
        cells.len(),
        families.len(),
        if families.len() == 1 { "y" } else { "ies" },
        runnable
    );
    Ok(())
}
