use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "leveldb-builds.toml";

/// Harness configuration, read from `leveldb-builds.toml` at the project root.
///
/// Every section is optional; a missing file yields the defaults.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct HarnessConfig {
    pub paths: PathsConfig,
    pub toolchain: ToolchainConfig,
    pub android: AndroidConfig,
    pub releases: ReleasesConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PathsConfig {
    /// LevelDB checkout, shared read-only by every cell.
    pub source_dir: PathBuf,

    /// Root for compilations and archives.
    pub build_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("leveldb"),
            build_dir: PathBuf::from("build"),
        }
    }
}

impl PathsConfig {
    /// Per-cell output directories live below this root.
    pub fn output_root(&self) -> PathBuf {
        self.build_dir.join("compilations").join("leveldb")
    }

    pub fn archives_dir(&self) -> PathBuf {
        self.build_dir.join("archives")
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Explicit cmake executable; otherwise looked up on PATH.
    pub cmake: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AndroidConfig {
    pub sdk_dir: Option<PathBuf>,
    pub ndk_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ReleasesConfig {
    pub api_base: String,
    /// `owner/repo` publishing LevelDB releases.
    pub upstream: String,
    /// `owner/repo` hosting the build workflow and its releases.
    pub builds: String,
    pub workflow: String,
    pub git_ref: String,
    /// Oldest upstream version worth building.
    pub minimum_version: String,
}

impl Default for ReleasesConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            upstream: "google/leveldb".to_string(),
            builds: "lamba92/leveldb-builds".to_string(),
            workflow: "build.yml".to_string(),
            git_ref: "master".to_string(),
            minimum_version: "1.21.0".to_string(),
        }
    }
}

/// Loads and parses a configuration file.
pub fn load(path: &Path) -> Result<HarnessConfig> {
    if !path.exists() {
        anyhow::bail!("Configuration file '{}' not found.", path.display());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config: HarnessConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(config)
}

/// Like [`load`], but a missing file means "use the defaults".
///
/// Relative paths inside the file are resolved against the file's directory.
pub fn load_or_default(path: &Path) -> Result<HarnessConfig> {
    if !path.exists() {
        return Ok(HarnessConfig::default());
    }
    let mut config = load(path)?;
    if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        config.rebase(base);
    }
    Ok(config)
}

impl HarnessConfig {
    fn rebase(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        rebase(&mut self.paths.source_dir);
        rebase(&mut self.paths.build_dir);
        if let Some(p) = self.toolchain.cmake.as_mut() {
            // A bare program name is a PATH lookup, not a relative path.
            if p.components().count() > 1 {
                rebase(p);
            }
        }
        if let Some(p) = self.android.sdk_dir.as_mut() {
            rebase(p);
        }
        if let Some(p) = self.android.ndk_dir.as_mut() {
            rebase(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(&dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config.paths.source_dir, PathBuf::from("leveldb"));
        assert_eq!(
            config.paths.output_root(),
            PathBuf::from("build/compilations/leveldb")
        );
        assert_eq!(config.paths.archives_dir(), PathBuf::from("build/archives"));
        assert_eq!(config.releases.minimum_version, "1.21.0");
    }

    #[test]
    fn load_rejects_missing_file() {
        let err = load(Path::new("/nonexistent/leveldb-builds.toml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn partial_file_keeps_other_defaults_and_rebases_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            "[paths]\nsource_dir = \"third_party/leveldb\"\n\n[toolchain]\ncmake = \"cmake3\"\n\n[android]\nndk_dir = \"/opt/ndk\"\n",
        )
        .unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(
            config.paths.source_dir,
            dir.path().join("third_party/leveldb")
        );
        assert_eq!(config.paths.build_dir, dir.path().join("build"));
        assert_eq!(config.toolchain.cmake, Some(PathBuf::from("cmake3")));
        assert_eq!(config.android.ndk_dir, Some(PathBuf::from("/opt/ndk")));
        assert_eq!(config.releases.upstream, "google/leveldb");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[paths\nsource_dir = 1").unwrap();
        let err = load_or_default(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
