use anyhow::Result;
use colored::*;
use std::path::Path;
use std::time::Instant;

use crate::cli::{CellFilter, ToolchainArgs};
use crate::cmake::{build_args, configure_args, host_parallelism, render_command};
use crate::executor::{run_matrix, CellContext, CellOutcome, CellReport, Summary};
use crate::matrix::{self, MatrixCell};
use crate::packager;
use crate::runner::{CancelToken, ProcessRunner, SystemRunner};

use super::common::{filter_cells, select_families, Session};

#[derive(Debug, Default, Clone, Copy)]
pub struct BuildFlags {
    pub jobs: Option<usize>,
    pub fail_fast: bool,
    pub dry_run: bool,
    pub no_archive: bool,
}

/// Execute the matrix build
///
/// Flow:
/// 1. Resolve toolchains and expand the selected families
/// 2. Run every cell on the worker pool
/// 3. Zip the artifacts of the cells that succeeded
/// 4. Report, failing if any cell failed
pub fn execute_build_pipeline(
    session: &Session,
    filter: &CellFilter,
    toolchain: &ToolchainArgs,
    flags: BuildFlags,
) -> Result<()> {
    let start_time = Instant::now();

    // --- 1. Matrix ---
    let ctx = session.matrix_context(toolchain)?;
    let families = select_families(&filter.platform, ctx.host);
    let cells = filter_cells(matrix::generate(&families, &ctx)?, filter);
    if cells.is_empty() {
        anyhow::bail!("No matrix cells match the selected platform/arch/link/profile.");
    }

    let cmake = session.cmake(toolchain);
    let jobs = flags.jobs.unwrap_or_else(host_parallelism).max(1);

    let names: Vec<&str> = families.iter().map(|f| f.as_str()).collect();
    println!(
        "{} Building {} cell(s) [{}] with {} worker(s)",
        "[LEVELDB]".green().bold(),
        cells.len(),
        names.join(", "),
        jobs
    );

    if flags.dry_run {
        print_plan(&cells, &cmake, jobs);
        return Ok(());
    }

    if !ctx.source_dir.is_dir() {
        anyhow::bail!(
            "LevelDB sources not found at {}. Check out the submodule or set [paths].source_dir.",
            ctx.source_dir.display()
        );
    }

    // --- 2. Execution ---
    let cancel = CancelToken::new();
    let runner = SystemRunner::new(cancel.clone());
    let reports = run_cells(&cells, &runner, &cmake, jobs, flags.fail_fast, &cancel)?;

    // --- 3 & 4. Archives and report ---
    let archives_dir = session.archives_dir();
    finish_build(
        &reports,
        (!flags.no_archive).then_some((ctx.output_root.as_path(), archives_dir.as_path())),
        start_time,
    )
}

/// Runs `cells` with the given runner and `jobs` workers.
pub fn run_cells(
    cells: &[MatrixCell],
    runner: &dyn ProcessRunner,
    cmake: &Path,
    jobs: usize,
    fail_fast: bool,
    cancel: &CancelToken,
) -> Result<Vec<CellReport>> {
    let ctx = CellContext {
        cmake,
        runner,
        build_jobs: jobs,
        cancel,
    };
    run_matrix(cells, &ctx, jobs, fail_fast)
}

/// Archives what succeeded (when `archive` names the output root and the
/// archives directory), prints the summary and fails if any cell failed.
///
/// Archiving happens before the failure check so one broken cell does not
/// hold back the artifacts of the others.
pub fn finish_build(
    reports: &[CellReport],
    archive: Option<(&Path, &Path)>,
    start_time: Instant,
) -> Result<()> {
    if let Some((output_root, archives_dir)) = archive {
        packager::collect_platform_archives(reports, output_root, archives_dir)?;
    }

    let summary = Summary::from_reports(reports);
    let failed: Vec<String> = reports
        .iter()
        .filter(|r| r.is_failure())
        .filter_map(|r| match &r.outcome {
            CellOutcome::Failed(e) => Some(format!("  - {} ({})", r.task_name, e.kind())),
            _ => None,
        })
        .collect();
    if !failed.is_empty() {
        eprintln!("{} Failed cells:\n{}", "[WARN]".yellow(), failed.join("\n"));
    }

    println!(
        "{} {} succeeded, {} failed, {} skipped, {} cancelled",
        "[INFO]".cyan(),
        summary.succeeded,
        summary.failed,
        summary.skipped,
        summary.cancelled
    );

    if summary.failed > 0 {
        anyhow::bail!("{} of {} cells failed", summary.failed, summary.total());
    }
    if summary.cancelled > 0 {
        anyhow::bail!("{} of {} cells were cancelled", summary.cancelled, summary.total());
    }

    println!(
        "{} Build completed in {:.2}s",
        "[DONE]".green().bold(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

fn print_plan(cells: &[MatrixCell], cmake: &Path, jobs: usize) {
    for cell in cells {
        if !cell.available {
            println!("{} {} (not buildable on this host)", "[SKIP]".yellow(), cell.task_name);
            continue;
        }
        if let Err(e) = cell.options.validate() {
            println!("{} {}: {}", "[WARN]".yellow(), cell.task_name, e);
            continue;
        }
        println!("{} {}", "[PLAN]".cyan(), cell.task_name);
        println!("  {}", render_command(cmake, &configure_args(&cell.options)));
        println!("  {}", render_command(cmake, &build_args(&cell.options, jobs)));
    }
}
