use anyhow::Result;
use clap::Parser;
use colored::*;
use leveldb_builds::cli::{Cli, Commands, ReleaseCommands};
use leveldb_builds::pipelines;

fn main() {
    let cli = Cli::parse();

    // Show the context chain, not a backtrace.
    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "[ERROR]".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let session = pipelines::Session::load(&cli.config, cli.verbose)?;

    match cli.command {
        Commands::List { platform, all } => pipelines::execute_list_pipeline(&session, &platform, all),
        Commands::Build {
            filter,
            jobs,
            fail_fast,
            dry_run,
            no_archive,
            toolchain,
        } => pipelines::execute_build_pipeline(
            &session,
            &filter,
            &toolchain,
            pipelines::BuildFlags {
                jobs,
                fail_fast,
                dry_run,
                no_archive,
            },
        ),
        Commands::Merge { from } => pipelines::execute_merge_pipeline(&session, from.as_deref()),
        Commands::Clean => pipelines::execute_clean_pipeline(&session),
        Commands::Releases { command } => match command {
            ReleaseCommands::Check { dry_run } => {
                pipelines::execute_release_check_pipeline(&session, dry_run)
            }
            ReleaseCommands::Weekly { dry_run } => {
                pipelines::execute_weekly_pipeline(&session, dry_run)
            }
        },
    }
}
