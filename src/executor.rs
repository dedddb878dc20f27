use crate::cmake::{build_args, configure_args, render_command};
use crate::matrix::{FamilyId, MatrixCell};
use crate::options::OptionsError;
use crate::runner::{CancelToken, ProcessOutput, ProcessRunner, RunError};
use anyhow::Context;
use colored::*;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a single cell did not produce its artifact.
#[derive(Debug, Error)]
pub enum CellError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] OptionsError),

    #[error("toolchain not found: {}", .0.display())]
    ToolchainMissing(PathBuf),

    #[error("configure step exited with {}\n{stderr}", exit_label(.code))]
    ConfigureFailed { code: Option<i32>, stderr: String },

    #[error("build step exited with {}\n{stderr}", exit_label(.code))]
    BuildFailed { code: Option<i32>, stderr: String },

    #[error("build reported success but {} is missing", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("{0:#}")]
    Io(anyhow::Error),

    #[error("cancelled")]
    Cancelled,
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

impl CellError {
    pub fn kind(&self) -> &'static str {
        match self {
            CellError::Configuration(_) => "configuration",
            CellError::ToolchainMissing(_) => "toolchain-missing",
            CellError::ConfigureFailed { .. } => "configure",
            CellError::BuildFailed { .. } => "build",
            CellError::ArtifactMissing(_) => "artifact-missing",
            CellError::Io(_) => "io",
            CellError::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug)]
pub enum CellOutcome {
    Succeeded { artifact: PathBuf },
    Failed(CellError),
    /// Not runnable on this host.
    Skipped,
}

#[derive(Debug)]
pub struct CellReport {
    pub family: FamilyId,
    pub task_name: String,
    pub relative_dir: String,
    pub outcome: CellOutcome,
}

impl CellReport {
    pub fn artifact(&self) -> Option<&Path> {
        match &self.outcome {
            CellOutcome::Succeeded { artifact } => Some(artifact),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.outcome,
            CellOutcome::Failed(ref e) if !matches!(e, CellError::Cancelled)
        )
    }
}

/// Everything a cell needs besides its own options.
pub struct CellContext<'a> {
    pub cmake: &'a Path,
    pub runner: &'a dyn ProcessRunner,
    /// Value of `-j` for the build invocation.
    pub build_jobs: usize,
    pub cancel: &'a CancelToken,
}

/// Configure, then build, then check the artifact.
///
/// A non-zero configure exit aborts the cell; the build step is not attempted.
pub fn run_cell(cell: &MatrixCell, ctx: &CellContext<'_>) -> CellReport {
    let outcome = if !cell.available {
        println!(
            "{} {} (not buildable on this host)",
            "[SKIP]".yellow(),
            cell.task_name
        );
        CellOutcome::Skipped
    } else {
        match execute(cell, ctx) {
            Ok(artifact) => {
                println!(
                    "{} {} → {}",
                    "[OK]".green().bold(),
                    cell.task_name,
                    artifact.display()
                );
                CellOutcome::Succeeded { artifact }
            }
            Err(e) => {
                if !matches!(e, CellError::Cancelled) {
                    eprintln!("{} {}: {}", "[FAIL]".red().bold(), cell.task_name, e);
                }
                CellOutcome::Failed(e)
            }
        }
    };

    CellReport {
        family: cell.family,
        task_name: cell.task_name.clone(),
        relative_dir: cell.relative_dir.clone(),
        outcome,
    }
}

fn execute(cell: &MatrixCell, ctx: &CellContext<'_>) -> Result<PathBuf, CellError> {
    if ctx.cancel.is_cancelled() {
        return Err(CellError::Cancelled);
    }

    let options = &cell.options;
    options.validate()?;

    std::fs::create_dir_all(&options.output_dir)
        .with_context(|| format!("Failed to create {}", options.output_dir.display()))
        .map_err(CellError::Io)?;

    let configure = invoke(cell, ctx, "configure", &configure_args(options))?;
    if !configure.success() {
        return Err(CellError::ConfigureFailed {
            code: configure.code,
            stderr: configure.stderr,
        });
    }

    let build = invoke(cell, ctx, "build", &build_args(options, ctx.build_jobs))?;
    if !build.success() {
        return Err(CellError::BuildFailed {
            code: build.code,
            stderr: build.stderr,
        });
    }

    let artifact = options.output_artifact();
    if !artifact.is_file() {
        return Err(CellError::ArtifactMissing(artifact));
    }
    Ok(artifact)
}

fn invoke(
    cell: &MatrixCell,
    ctx: &CellContext<'_>,
    phase: &str,
    args: &[String],
) -> Result<ProcessOutput, CellError> {
    println!(
        "{} [{}] Executing {}",
        "[INFO]".cyan(),
        cell.task_name,
        render_command(ctx.cmake, args)
    );

    let output = ctx.runner.run(ctx.cmake, args).map_err(|e| {
        if let Some(partial) = e.partial_output() {
            forward_output(&cell.task_name, phase, partial);
        }
        match e {
            RunError::NotFound(program) => CellError::ToolchainMissing(program),
            RunError::Cancelled { .. } => CellError::Cancelled,
            other => CellError::Io(anyhow::Error::new(other)),
        }
    })?;

    forward_output(&cell.task_name, phase, &output);
    Ok(output)
}

/// Surfaces captured streams: stdout as information, stderr at error level.
///
/// Each stream is written in one call so parallel cells do not interleave
/// within a block.
pub fn forward_output(task: &str, phase: &str, output: &ProcessOutput) {
    let stdout = output.stdout.trim_end();
    if !stdout.is_empty() {
        println!("{} [{task}] {phase} stdout:\n{stdout}", "[INFO]".cyan());
    }

    let stderr = output.stderr.trim_end();
    if !stderr.is_empty() {
        eprintln!("{} [{task}] {phase} stderr:\n{stderr}", "[ERROR]".red());
    }
}

/// Runs every cell on a bounded pool of `workers` threads.
///
/// Reports come back in input order. With `fail_fast`, the first failure
/// cancels the shared token: running children are killed and cells that
/// have not started yet report `Cancelled`.
pub fn run_matrix(
    cells: &[MatrixCell],
    ctx: &CellContext<'_>,
    workers: usize,
    fail_fast: bool,
) -> anyhow::Result<Vec<CellReport>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("cell-worker-{i}"))
        .build()
        .context("Failed to start worker pool")?;

    let reports = pool.install(|| {
        cells
            .par_iter()
            .map(|cell| {
                let report = run_cell(cell, ctx);
                if fail_fast && report.is_failure() {
                    ctx.cancel.cancel();
                }
                report
            })
            .collect()
    });

    Ok(reports)
}

/// Counts per outcome, derived from finished reports.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl Summary {
    pub fn from_reports(reports: &[CellReport]) -> Self {
        reports
            .iter()
            .fold(Summary::default(), |mut acc, r| {
                match &r.outcome {
                    CellOutcome::Succeeded { .. } => acc.succeeded += 1,
                    CellOutcome::Skipped => acc.skipped += 1,
                    CellOutcome::Failed(CellError::Cancelled) => acc.cancelled += 1,
                    CellOutcome::Failed(_) => acc.failed += 1,
                }
                acc
            })
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped + self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{expand, family, HostOs, MatrixContext};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted runner: creates the artifact on `--build` unless told to fail.
    #[derive(Default)]
    struct ScriptedRunner {
        fail_configure: bool,
        fail_build_for: Option<&'static str>,
        skip_artifact: bool,
        missing_tool: bool,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ProcessRunner for ScriptedRunner {
        fn run(&self, program: &Path, args: &[String]) -> Result<ProcessOutput, RunError> {
            if self.missing_tool {
                return Err(RunError::NotFound(program.to_path_buf()));
            }
            self.calls.lock().unwrap().push(args.to_vec());
            let ok = ProcessOutput {
                code: Some(0),
                stdout: "ok".to_string(),
                stderr: String::new(),
            };
            if args[0] != "--build" {
                if self.fail_configure {
                    return Ok(ProcessOutput {
                        code: Some(1),
                        stdout: String::new(),
                        stderr: "CMake Error: no compiler".to_string(),
                    });
                }
                return Ok(ok);
            }
            let dir = PathBuf::from(&args[1]);
            if let Some(marker) = self.fail_build_for {
                if args[1].contains(marker) {
                    return Ok(ProcessOutput {
                        code: Some(2),
                        stdout: String::new(),
                        stderr: "ld: cannot find -lstdc++".to_string(),
                    });
                }
            }
            if !self.skip_artifact {
                for name in ["libleveldb.a", "libleveldb.so"] {
                    std::fs::write(dir.join(name), b"lib").unwrap();
                }
            }
            Ok(ok)
        }
    }

    fn linux_cells(root: &Path) -> Vec<MatrixCell> {
        let ctx = MatrixContext {
            source_dir: root.join("leveldb"),
            output_root: root.join("out"),
            android_ndk: None,
            host: HostOs::Linux,
        };
        expand(family(FamilyId::Linux).as_ref(), &ctx)
    }

    fn run_all(runner: &ScriptedRunner, cells: &[MatrixCell], fail_fast: bool) -> Vec<CellReport> {
        let cancel = CancelToken::new();
        let ctx = CellContext {
            cmake: Path::new("cmake"),
            runner,
            build_jobs: 4,
            cancel: &cancel,
        };
        run_matrix(cells, &ctx, 2, fail_fast).unwrap()
    }

    #[test]
    fn configure_precedes_build_in_each_cell() {
        let tmp = tempfile::tempdir().unwrap();
        let cells = linux_cells(tmp.path());
        let runner = ScriptedRunner::default();
        let reports = run_all(&runner, &cells[..1], false);
        assert!(reports[0].artifact().is_some());

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0][0], "-DLEVELDB_BUILD_TESTS=OFF");
        assert_eq!(calls[1][0], "--build");
        assert_eq!(calls[1][3], "4");
    }

    #[test]
    fn configure_failure_skips_build_step() {
        let tmp = tempfile::tempdir().unwrap();
        let cells = linux_cells(tmp.path());
        let runner = ScriptedRunner {
            fail_configure: true,
            ..Default::default()
        };
        let reports = run_all(&runner, &cells[..1], false);
        assert!(matches!(
            reports[0].outcome,
            CellOutcome::Failed(CellError::ConfigureFailed { code: Some(1), .. })
        ));
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn failing_build_is_isolated_to_its_cell() {
        let tmp = tempfile::tempdir().unwrap();
        let cells = linux_cells(tmp.path());
        let runner = ScriptedRunner {
            fail_build_for: Some("shared"),
            ..Default::default()
        };
        let reports = run_all(&runner, &cells, false);
        let summary = Summary::from_reports(&reports);
        assert_eq!(summary.failed, 6);
        assert_eq!(summary.succeeded, 6);

        for report in &reports {
            if report.relative_dir.contains("shared") {
                match &report.outcome {
                    CellOutcome::Failed(CellError::BuildFailed { stderr, .. }) => {
                        assert!(stderr.contains("cannot find"))
                    }
                    other => panic!("unexpected outcome {other:?}"),
                }
            } else {
                assert!(report.artifact().is_some());
            }
        }
    }

    #[test]
    fn missing_artifact_is_a_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let cells = linux_cells(tmp.path());
        let runner = ScriptedRunner {
            skip_artifact: true,
            ..Default::default()
        };
        let reports = run_all(&runner, &cells[..1], false);
        assert!(matches!(
            reports[0].outcome,
            CellOutcome::Failed(CellError::ArtifactMissing(_))
        ));
    }

    #[test]
    fn missing_cmake_is_toolchain_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cells = linux_cells(tmp.path());
        let runner = ScriptedRunner {
            missing_tool: true,
            ..Default::default()
        };
        let reports = run_all(&runner, &cells[..2], false);
        for report in reports {
            match report.outcome {
                CellOutcome::Failed(e) => assert_eq!(e.kind(), "toolchain-missing"),
                other => panic!("unexpected outcome {other:?}"),
            }
        }
    }

    #[test]
    fn invalid_options_never_spawn() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = MatrixContext {
            source_dir: tmp.path().join("leveldb"),
            output_root: tmp.path().join("out"),
            android_ndk: None,
            host: HostOs::Linux,
        };
        let cells = expand(family(FamilyId::Android).as_ref(), &ctx);
        let runner = ScriptedRunner::default();
        let reports = run_all(&runner, &cells, false);
        assert!(reports.iter().all(|r| matches!(
            r.outcome,
            CellOutcome::Failed(CellError::Configuration(_))
        )));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn unavailable_cells_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = MatrixContext {
            source_dir: tmp.path().join("leveldb"),
            output_root: tmp.path().join("out"),
            android_ndk: None,
            host: HostOs::Linux,
        };
        let cells = expand(family(FamilyId::Apple).as_ref(), &ctx);
        let runner = ScriptedRunner::default();
        let summary = Summary::from_reports(&run_all(&runner, &cells, false));
        assert_eq!(summary.skipped, cells.len());
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn fail_fast_cancels_remaining_cells() {
        let tmp = tempfile::tempdir().unwrap();
        let cells = linux_cells(tmp.path());
        let runner = ScriptedRunner {
            fail_configure: true,
            ..Default::default()
        };
        let cancel = CancelToken::new();
        let ctx = CellContext {
            cmake: Path::new("cmake"),
            runner: &runner,
            build_jobs: 1,
            cancel: &cancel,
        };
        let reports = run_matrix(&cells, &ctx, 1, true).unwrap();
        let summary = Summary::from_reports(&reports);
        assert!(cancel.is_cancelled());
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, cells.len() - 1);
    }

    #[test]
    fn reports_keep_input_order() {
        let tmp = tempfile::tempdir().unwrap();
        let cells = linux_cells(tmp.path());
        let reports = run_all(&ScriptedRunner::default(), &cells, false);
        let names: Vec<_> = reports.iter().map(|r| r.task_name.clone()).collect();
        let expected: Vec<_> = cells.iter().map(|c| c.task_name.clone()).collect();
        assert_eq!(names, expected);
        let by_family: HashMap<_, usize> =
            reports.iter().fold(HashMap::new(), |mut m, r| {
                *m.entry(r.family).or_default() += 1;
                m
            });
        assert_eq!(by_family[&FamilyId::Linux], 12);
    }

    /// Behaves like a runner whose child was killed mid-build.
    struct KilledRunner;

    impl ProcessRunner for KilledRunner {
        fn run(&self, _program: &Path, _args: &[String]) -> Result<ProcessOutput, RunError> {
            Err(RunError::Cancelled {
                output: ProcessOutput {
                    code: None,
                    stdout: "-- Detecting C compiler".to_string(),
                    stderr: String::new(),
                },
            })
        }
    }

    #[test]
    fn killed_child_reports_cancelled_not_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let cells = linux_cells(tmp.path());
        let cancel = CancelToken::new();
        let ctx = CellContext {
            cmake: Path::new("cmake"),
            runner: &KilledRunner,
            build_jobs: 1,
            cancel: &cancel,
        };
        let report = run_cell(&cells[0], &ctx);
        assert!(matches!(report.outcome, CellOutcome::Failed(CellError::Cancelled)));
        assert!(!report.is_failure());
    }
}
