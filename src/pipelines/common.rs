use anyhow::{Context, Result};
use colored::*;
use std::path::{Path, PathBuf};

use crate::cli::{CellFilter, ToolchainArgs};
use crate::config::{self, HarnessConfig};
use crate::discovery::{self, DiscoveryContext};
use crate::matrix::{FamilyId, HostOs, MatrixCell, MatrixContext};

/// Everything a pipeline needs that is resolved once per invocation.
pub struct Session {
    pub config: HarnessConfig,
    pub project_dir: PathBuf,
    pub discovery: DiscoveryContext,
    pub host: HostOs,
    pub verbose: bool,
}

impl Session {
    pub fn load(config_path: &Path, verbose: bool) -> Result<Self> {
        let mut config = config::load_or_default(config_path)?;

        let project_dir = match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let project_dir = absolute(&project_dir)?;

        config.paths.source_dir = absolute(&config.paths.source_dir)?;
        config.paths.build_dir = absolute(&config.paths.build_dir)?;

        let discovery = DiscoveryContext::from_process(&project_dir)?;

        let session = Self {
            config,
            project_dir,
            discovery,
            host: HostOs::current(),
            verbose,
        };
        session.debug(format!(
            "Config: {} (exists: {})",
            config_path.display(),
            config_path.exists()
        ));
        session.debug(format!("Host: {:?}", session.host));
        Ok(session)
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        if self.verbose {
            println!("{} {}", "[DEBUG]".dimmed(), message.as_ref());
        }
    }

    pub fn output_root(&self) -> PathBuf {
        self.config.paths.output_root()
    }

    pub fn archives_dir(&self) -> PathBuf {
        self.config.paths.archives_dir()
    }

    pub fn is_ci(&self) -> bool {
        discovery::is_ci(&self.discovery)
    }

    /// Resolves toolchain locations. CLI flags beat the config file, which
    /// beats `local.properties` and the environment.
    ///
    /// Paths handed to cmake are absolute: it resolves relative ones against
    /// the binary dir, not our working directory.
    pub fn matrix_context(&self, toolchain: &ToolchainArgs) -> Result<MatrixContext> {
        let ndk = toolchain
            .ndk_dir
            .clone()
            .or_else(|| self.config.android.ndk_dir.clone())
            .map(|p| absolute(&p))
            .transpose()?;
        let sdk = toolchain
            .sdk_dir
            .clone()
            .or_else(|| self.config.android.sdk_dir.clone())
            .map(|p| absolute(&p))
            .transpose()?;

        let android_ndk = discovery::resolve_android_ndk(ndk, sdk, &self.discovery)
            .map(|p| absolute(&p))
            .transpose()?;
        match &android_ndk {
            Some(path) => self.debug(format!("Android NDK: {}", path.display())),
            None => self.debug("Android NDK: not found"),
        }

        Ok(MatrixContext {
            source_dir: self.config.paths.source_dir.clone(),
            output_root: self.output_root(),
            android_ndk,
            host: self.host,
        })
    }

    pub fn cmake(&self, toolchain: &ToolchainArgs) -> PathBuf {
        let cmake = discovery::resolve_cmake(
            toolchain
                .cmake
                .clone()
                .or_else(|| self.config.toolchain.cmake.clone()),
        );
        self.debug(format!("cmake: {}", cmake.display()));
        cmake
    }
}

/// Requested families in order, without duplicates; none means host defaults.
pub fn select_families(requested: &[FamilyId], host: HostOs) -> Vec<FamilyId> {
    if requested.is_empty() {
        return FamilyId::host_defaults(host);
    }
    let mut families = Vec::new();
    for id in requested {
        if !families.contains(id) {
            families.push(*id);
        }
    }
    families
}

pub fn filter_cells(cells: Vec<MatrixCell>, filter: &CellFilter) -> Vec<MatrixCell> {
    cells
        .into_iter()
        .filter(|cell| {
            filter.arch.is_empty()
                || filter
                    .arch
                    .iter()
                    .any(|a| a.eq_ignore_ascii_case(&cell.options.arch))
        })
        .filter(|cell| filter.link.map_or(true, |l| l == cell.options.link))
        .filter(|cell| filter.profile.map_or(true, |p| p == cell.options.build_type))
        .collect()
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Failed to resolve {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix;
    use crate::options::{BuildType, LinkMode};

    fn ctx() -> MatrixContext {
        MatrixContext {
            source_dir: PathBuf::from("/work/leveldb"),
            output_root: PathBuf::from("/work/build/compilations/leveldb"),
            android_ndk: Some(PathBuf::from("/opt/ndk")),
            host: HostOs::Linux,
        }
    }

    #[test]
    fn empty_selection_means_host_defaults() {
        assert_eq!(
            select_families(&[], HostOs::MacOs),
            vec![FamilyId::Apple, FamilyId::Android]
        );
    }

    #[test]
    fn explicit_selection_is_deduplicated() {
        assert_eq!(
            select_families(
                &[FamilyId::Linux, FamilyId::Android, FamilyId::Linux],
                HostOs::Linux
            ),
            vec![FamilyId::Linux, FamilyId::Android]
        );
    }

    #[test]
    fn filter_narrows_to_one_cell() {
        let cells = matrix::generate(&[FamilyId::Linux], &ctx()).unwrap();
        let filter = CellFilter {
            platform: vec![],
            arch: vec!["X64".to_string()],
            link: Some(LinkMode::Static),
            profile: Some(BuildType::Release),
        };
        let selected = filter_cells(cells, &filter);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].task_name, "buildLeveldbStaticReleaseLinuxX64");
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let cells = matrix::generate(&[FamilyId::Android], &ctx()).unwrap();
        assert_eq!(filter_cells(cells, &CellFilter::default()).len(), 16);
    }
}
