use crate::options::{BuildOptions, BuildType, LinkMode, Platform};
use anyhow::Result;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

pub mod android;
pub mod apple;
pub mod linux;
pub mod windows;

/// Operating system the harness itself runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            HostOs::Linux
        } else if cfg!(target_os = "macos") {
            HostOs::MacOs
        } else if cfg!(target_os = "windows") {
            HostOs::Windows
        } else {
            HostOs::Other
        }
    }
}

/// Archive-producing group of targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum FamilyId {
    #[value(name = "windows-arm64")]
    WindowsArm64,
    #[value(name = "windows-x64")]
    WindowsX64,
    Linux,
    Android,
    Apple,
}

impl FamilyId {
    pub const ALL: [FamilyId; 5] = [
        FamilyId::WindowsArm64,
        FamilyId::WindowsX64,
        FamilyId::Linux,
        FamilyId::Android,
        FamilyId::Apple,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FamilyId::WindowsArm64 => "windows-arm64",
            FamilyId::WindowsX64 => "windows-x64",
            FamilyId::Linux => "linux",
            FamilyId::Android => "android",
            FamilyId::Apple => "apple",
        }
    }

    /// File stem of the family's zip archive.
    pub fn archive_name(self) -> String {
        format!("leveldb-{}", self.as_str())
    }

    /// Families built by default on a given host.
    pub fn host_defaults(host: HostOs) -> Vec<FamilyId> {
        match host {
            HostOs::MacOs => vec![FamilyId::Apple, FamilyId::Android],
            HostOs::Linux => vec![
                FamilyId::Linux,
                FamilyId::Android,
                FamilyId::WindowsX64,
                FamilyId::WindowsArm64,
            ],
            HostOs::Windows => vec![
                FamilyId::WindowsX64,
                FamilyId::WindowsArm64,
                FamilyId::Android,
            ],
            HostOs::Other => vec![FamilyId::Android],
        }
    }
}

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One link mode / build type combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variant {
    pub link: LinkMode,
    pub build_type: BuildType,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant {
            link: LinkMode::Static,
            build_type: BuildType::Release,
        },
        Variant {
            link: LinkMode::Shared,
            build_type: BuildType::Release,
        },
        Variant {
            link: LinkMode::Static,
            build_type: BuildType::Debug,
        },
        Variant {
            link: LinkMode::Shared,
            build_type: BuildType::Debug,
        },
    ];
}

/// Row of a family's toolchain table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// First output path segment; Apple uses the SDK name here.
    pub platform_dir: &'static str,
    /// Architecture segment of the output path.
    pub arch: &'static str,
    pub c_compiler: &'static str,
    pub cxx_compiler: &'static str,
    pub system_name: Option<&'static str>,
    pub system_processor: Option<&'static str>,
    /// Toolchain-specific architecture id (Android ABI), when it differs from `arch`.
    pub abi: Option<&'static str>,
}

impl Target {
    pub const fn new(platform_dir: &'static str, arch: &'static str) -> Self {
        Self {
            platform_dir,
            arch,
            c_compiler: "gcc",
            cxx_compiler: "g++",
            system_name: None,
            system_processor: None,
            abi: None,
        }
    }

    pub const fn compilers(mut self, c: &'static str, cxx: &'static str) -> Self {
        self.c_compiler = c;
        self.cxx_compiler = cxx;
        self
    }

    pub const fn system(mut self, name: &'static str) -> Self {
        self.system_name = Some(name);
        self
    }

    pub const fn processor(mut self, processor: &'static str) -> Self {
        self.system_processor = Some(processor);
        self
    }

    pub const fn abi(mut self, abi: &'static str) -> Self {
        self.abi = Some(abi);
        self
    }
}

/// Inputs shared by every cell, resolved before expansion starts.
#[derive(Debug, Clone)]
pub struct MatrixContext {
    pub source_dir: PathBuf,
    pub output_root: PathBuf,
    pub android_ndk: Option<PathBuf>,
    pub host: HostOs,
}

/// Declarative description of one platform family.
///
/// The generic [`expand`] routine walks `targets() x Variant::ALL`, asks
/// `supports` whether the combination exists, fills the matrix-invariant
/// defaults and lets the family override toolchain, flags and cross-compile
/// parameters.
pub trait TargetFamily: Send + Sync {
    fn id(&self) -> FamilyId;

    fn platform(&self) -> Platform;

    fn targets(&self) -> &'static [Target];

    /// Availability predicate; unavailable cells are listed but never run.
    fn is_available(&self, _host: HostOs) -> bool {
        true
    }

    fn supports(&self, _target: &Target, _variant: Variant) -> bool {
        true
    }

    fn generator(&self) -> Option<&'static str> {
        None
    }

    fn artifact_name(&self, link: LinkMode) -> &'static str;

    fn cxx_flags(&self, _target: &Target, _variant: Variant) -> Vec<String> {
        Vec::new()
    }

    fn c_flags(&self, _target: &Target, _variant: Variant) -> Vec<String> {
        Vec::new()
    }

    /// Hook for cross-compile parameters (NDK, SDK, system version).
    fn apply(
        &self,
        _target: &Target,
        _variant: Variant,
        _ctx: &MatrixContext,
        _options: &mut BuildOptions,
    ) {
    }
}

/// A concrete platform/arch/link/build-type combination ready to run.
#[derive(Debug, Clone)]
pub struct MatrixCell {
    pub family: FamilyId,
    pub task_name: String,
    /// `<platform>/<link>/<arch>/<build_type>/`, relative to the output root.
    pub relative_dir: String,
    pub options: BuildOptions,
    pub available: bool,
}

pub fn family(id: FamilyId) -> Box<dyn TargetFamily> {
    match id {
        FamilyId::WindowsArm64 => Box::new(windows::WindowsArm64),
        FamilyId::WindowsX64 => Box::new(windows::WindowsX64),
        FamilyId::Linux => Box::new(linux::Linux),
        FamilyId::Android => Box::new(android::Android),
        FamilyId::Apple => Box::new(apple::Apple),
    }
}

pub fn task_name(target: &Target, variant: Variant) -> String {
    let link = match variant.link {
        LinkMode::Static => "Static",
        LinkMode::Shared => "Shared",
    };
    format!(
        "buildLeveldb{link}{}{}{}",
        variant.build_type.cmake_name(),
        capitalize(target.platform_dir),
        capitalize(target.arch)
    )
}

pub fn relative_dir(target: &Target, variant: Variant) -> String {
    format!(
        "{}/{}/{}/{}/",
        target.platform_dir,
        variant.link.dir_name(),
        target.arch,
        variant.build_type.dir_name()
    )
    .to_lowercase()
}

/// Expands one family into its cells, in table order then variant order.
pub fn expand(family: &dyn TargetFamily, ctx: &MatrixContext) -> Vec<MatrixCell> {
    let available = family.is_available(ctx.host);
    let mut cells = Vec::new();

    for target in family.targets() {
        for variant in Variant::ALL {
            if !family.supports(target, variant) {
                continue;
            }

            let relative_dir = relative_dir(target, variant);
            let mut options = BuildOptions::new(
                family.platform(),
                target.arch,
                variant.link,
                variant.build_type,
                ctx.source_dir.clone(),
                ctx.output_root.join(relative_dir.trim_end_matches('/')),
                family.artifact_name(variant.link),
            );
            options.c_compiler = target.c_compiler.to_string();
            options.cxx_compiler = target.cxx_compiler.to_string();
            options.generator = family.generator().map(str::to_string);
            options.system_name = target.system_name.map(str::to_string);
            options.system_processor = target.system_processor.map(str::to_string);
            options.cxx_flags = family.cxx_flags(target, variant);
            options.c_flags = family.c_flags(target, variant);
            family.apply(target, variant, ctx, &mut options);

            cells.push(MatrixCell {
                family: family.id(),
                task_name: task_name(target, variant),
                relative_dir,
                options,
                available,
            });
        }
    }

    cells
}

/// Expands several families and checks the output-directory invariant.
pub fn generate(ids: &[FamilyId], ctx: &MatrixContext) -> Result<Vec<MatrixCell>> {
    let cells: Vec<MatrixCell> = ids
        .iter()
        .flat_map(|id| expand(family(*id).as_ref(), ctx))
        .collect();
    ensure_unique_output_dirs(&cells)?;
    Ok(cells)
}

/// Two cells sharing an output directory would overwrite each other's artifacts.
pub fn ensure_unique_output_dirs(cells: &[MatrixCell]) -> Result<()> {
    let mut seen: HashMap<&PathBuf, &str> = HashMap::new();
    for cell in cells {
        if let Some(previous) = seen.insert(&cell.options.output_dir, &cell.task_name) {
            anyhow::bail!(
                "Output directory collision: {} and {} both write to {}",
                previous,
                cell.task_name,
                cell.options.output_dir.display()
            );
        }
    }
    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
