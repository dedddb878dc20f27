use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Operating system family a cell targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    Linux,
    Android,
    Apple,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Android => "android",
            Platform::Apple => "apple",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum LinkMode {
    Static,
    Shared,
}

impl LinkMode {
    pub fn is_shared(self) -> bool {
        matches!(self, LinkMode::Shared)
    }

    /// Lower-case path segment (`static` / `shared`).
    pub fn dir_name(self) -> &'static str {
        match self {
            LinkMode::Static => "static",
            LinkMode::Shared => "shared",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum BuildType {
    Debug,
    Release,
}

impl BuildType {
    pub fn from_debug(debug: bool) -> Self {
        if debug {
            BuildType::Debug
        } else {
            BuildType::Release
        }
    }

    pub fn is_debug(self) -> bool {
        matches!(self, BuildType::Debug)
    }

    /// Value passed to `CMAKE_BUILD_TYPE`.
    pub fn cmake_name(self) -> &'static str {
        match self {
            BuildType::Debug => "Debug",
            BuildType::Release => "Release",
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            BuildType::Debug => "debug",
            BuildType::Release => "release",
        }
    }
}

/// Android NDK parameters. The ABI, NDK root and STL flavour always travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidOptions {
    pub abi: String,
    pub ndk_path: PathBuf,
    pub stl_type: String,
}

/// Apple SDK parameters, set as a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppleOptions {
    pub osx_arch: String,
    pub osx_sysroot: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("Android and Apple parameters are both set on {0}")]
    ConflictingPlatformFields(String),

    #[error("{0} targets Android but no NDK toolchain was resolved (set --ndk-dir, ndk.dir or ANDROID_NDK_HOME)")]
    MissingAndroidToolchain(String),

    #[error("{0} targets an Apple platform but carries no SDK parameters")]
    MissingAppleSdk(String),

    #[error("{cell} sets {fields} parameters on a {platform} target")]
    UnexpectedPlatformFields {
        cell: String,
        fields: &'static str,
        platform: Platform,
    },

    #[error("{cell} is missing required field '{field}'")]
    MissingField { cell: String, field: &'static str },
}

/// Fully resolved parameters of a single matrix cell.
///
/// Built once by the matrix generator and only read afterwards: the command
/// builder turns it into CMake arguments and the executor uses the paths to
/// locate the produced artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub platform: Platform,
    pub arch: String,
    pub link: LinkMode,
    pub build_type: BuildType,

    pub c_compiler: String,
    pub cxx_compiler: String,
    pub generator: Option<String>,
    pub cxx_standard: Option<String>,

    pub with_tests: bool,
    pub with_benchmarks: bool,

    pub c_flags: Vec<String>,
    pub cxx_flags: Vec<String>,

    pub system_name: Option<String>,
    pub system_processor: Option<String>,
    pub system_version: Option<u32>,
    pub android: Option<AndroidOptions>,
    pub apple: Option<AppleOptions>,

    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub artifact_name: String,
}

impl BuildOptions {
    /// Matrix-invariant defaults; platform families override the rest.
    pub fn new(
        platform: Platform,
        arch: impl Into<String>,
        link: LinkMode,
        build_type: BuildType,
        source_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        artifact_name: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            arch: arch.into(),
            link,
            build_type,
            c_compiler: "gcc".to_string(),
            cxx_compiler: "g++".to_string(),
            generator: None,
            cxx_standard: None,
            with_tests: false,
            with_benchmarks: false,
            c_flags: Vec::new(),
            cxx_flags: Vec::new(),
            system_name: None,
            system_processor: None,
            system_version: None,
            android: None,
            apple: None,
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
            artifact_name: artifact_name.into(),
        }
    }

    pub fn is_shared(&self) -> bool {
        self.link.is_shared()
    }

    pub fn is_debug(&self) -> bool {
        self.build_type.is_debug()
    }

    /// Path of the library this cell is expected to produce.
    pub fn output_artifact(&self) -> PathBuf {
        self.output_dir.join(&self.artifact_name)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn label(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.platform,
            self.link.dir_name(),
            self.arch,
            self.build_type.dir_name()
        )
    }

    /// Checks the cross-field contract before anything is spawned.
    pub fn validate(&self) -> Result<(), OptionsError> {
        let cell = self.label();

        if self.android.is_some() && self.apple.is_some() {
            return Err(OptionsError::ConflictingPlatformFields(cell));
        }

        match self.platform {
            Platform::Android if self.android.is_none() => {
                return Err(OptionsError::MissingAndroidToolchain(cell));
            }
            Platform::Apple if self.apple.is_none() => {
                return Err(OptionsError::MissingAppleSdk(cell));
            }
            Platform::Android | Platform::Apple => {}
            platform => {
                let fields = if self.android.is_some() {
                    Some("Android")
                } else if self.apple.is_some() {
                    Some("Apple")
                } else {
                    None
                };
                if let Some(fields) = fields {
                    return Err(OptionsError::UnexpectedPlatformFields {
                        cell,
                        fields,
                        platform,
                    });
                }
            }
        }

        let required = [
            ("arch", self.arch.as_str()),
            ("c_compiler", self.c_compiler.as_str()),
            ("cxx_compiler", self.cxx_compiler.as_str()),
            ("artifact_name", self.artifact_name.as_str()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(OptionsError::MissingField { cell, field });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux() -> BuildOptions {
        BuildOptions::new(
            Platform::Linux,
            "x64",
            LinkMode::Static,
            BuildType::Release,
            "/src/leveldb",
            "/out/linux/static/x64/release",
            "libleveldb.a",
        )
    }

    fn android_fields() -> AndroidOptions {
        AndroidOptions {
            abi: "arm64-v8a".to_string(),
            ndk_path: PathBuf::from("/opt/ndk"),
            stl_type: "c++_static".to_string(),
        }
    }

    fn apple_fields() -> AppleOptions {
        AppleOptions {
            osx_arch: "arm64".to_string(),
            osx_sysroot: "macosx".to_string(),
        }
    }

    #[test]
    fn defaults_are_plain_gcc_without_tests() {
        let opts = linux();
        assert_eq!(opts.c_compiler, "gcc");
        assert_eq!(opts.cxx_compiler, "g++");
        assert!(!opts.with_tests);
        assert!(!opts.with_benchmarks);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn output_artifact_joins_dir_and_name() {
        assert_eq!(
            linux().output_artifact(),
            PathBuf::from("/out/linux/static/x64/release/libleveldb.a")
        );
    }

    #[test]
    fn android_and_apple_together_fail_fast() {
        let mut opts = linux();
        opts.platform = Platform::Android;
        opts.android = Some(android_fields());
        opts.apple = Some(apple_fields());
        assert!(matches!(
            opts.validate(),
            Err(OptionsError::ConflictingPlatformFields(_))
        ));
    }

    #[test]
    fn android_without_ndk_is_rejected() {
        let mut opts = linux();
        opts.platform = Platform::Android;
        let err = opts.validate().unwrap_err();
        assert!(matches!(err, OptionsError::MissingAndroidToolchain(_)));
        assert!(err.to_string().contains("ANDROID_NDK_HOME"));
    }

    #[test]
    fn apple_fields_on_linux_are_rejected() {
        let mut opts = linux();
        opts.apple = Some(apple_fields());
        assert_eq!(
            opts.validate(),
            Err(OptionsError::UnexpectedPlatformFields {
                cell: "linux/static/x64/release".to_string(),
                fields: "Apple",
                platform: Platform::Linux,
            })
        );
    }

    #[test]
    fn empty_compiler_is_rejected() {
        let mut opts = linux();
        opts.cxx_compiler.clear();
        assert!(matches!(
            opts.validate(),
            Err(OptionsError::MissingField {
                field: "cxx_compiler",
                ..
            })
        ));
    }

    #[test]
    fn build_type_follows_debug_flag() {
        assert_eq!(BuildType::from_debug(true).cmake_name(), "Debug");
        assert_eq!(BuildType::from_debug(false).cmake_name(), "Release");
    }
}
