use crate::config::DEFAULT_CONFIG_FILE;
use crate::matrix::FamilyId;
use crate::options::{BuildType, LinkMode};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Build LevelDB for every supported platform with CMake")]
pub struct Cli {
    /// Harness configuration file (optional)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Print debug output
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the build matrix for the selected platforms
    List {
        /// Platform families to list (defaults to the ones this host can build)
        #[arg(short, long, value_enum)]
        platform: Vec<FamilyId>,

        /// List every family regardless of host
        #[arg(long, default_value_t = false)]
        all: bool,
    },

    /// Configure and build the selected cells, then archive their artifacts
    Build {
        #[command(flatten)]
        filter: CellFilter,

        /// Worker threads; also passed to the native build as -j
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Stop scheduling and kill running builds after the first failure
        #[arg(long, default_value_t = false)]
        fail_fast: bool,

        /// Print the cmake invocations without running them
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Skip the per-platform zip archives
        #[arg(long, default_value_t = false)]
        no_archive: bool,

        #[command(flatten)]
        toolchain: ToolchainArgs,
    },

    /// Merge per-platform archives and public headers into leveldb.zip
    Merge {
        /// Merge every leveldb-*.zip found below this directory
        #[arg(long)]
        from: Option<PathBuf>,
    },

    /// Delete the build directory
    Clean,

    /// Poll upstream releases and trigger the build workflow
    Releases {
        #[command(subcommand)]
        command: ReleaseCommands,
    },
}

#[derive(clap::Args, Debug, Default, Clone)]
pub struct CellFilter {
    /// Platform families to build (defaults to the ones this host can build)
    #[arg(short, long, value_enum)]
    pub platform: Vec<FamilyId>,

    /// Restrict to these architecture directories (x64, arm64, armv7a, ...)
    #[arg(short, long)]
    pub arch: Vec<String>,

    #[arg(long, value_enum)]
    pub link: Option<LinkMode>,

    #[arg(long, value_enum)]
    pub profile: Option<BuildType>,
}

#[derive(clap::Args, Debug, Default, Clone)]
pub struct ToolchainArgs {
    /// Android NDK root
    #[arg(long)]
    pub ndk_dir: Option<PathBuf>,

    /// Android SDK root, probed for ndk/<version>
    #[arg(long)]
    pub sdk_dir: Option<PathBuf>,

    /// cmake executable
    #[arg(long)]
    pub cmake: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum ReleaseCommands {
    /// Dispatch a build for every upstream release not built yet
    Check {
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Dispatch the weekly build of upstream main
    Weekly {
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}
