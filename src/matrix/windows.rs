use super::{FamilyId, HostOs, Target, TargetFamily, Variant};
use crate::options::{LinkMode, Platform};

const ARM64_TARGETS: &[Target] = &[Target::new("windows", "arm64")
    .compilers("clang", "clang++")
    .system("Windows")
    .processor("ARM64")];

const X64_TARGETS: &[Target] = &[Target::new("windows", "x64")
    .compilers("x86_64-w64-mingw32-gcc-posix", "x86_64-w64-mingw32-g++-posix")
    .system("Windows")
    .processor("x86_64")];

/// Native clang build for Windows on ARM; needs a Windows host with MinGW make.
pub struct WindowsArm64;

impl TargetFamily for WindowsArm64 {
    fn id(&self) -> FamilyId {
        FamilyId::WindowsArm64
    }

    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn targets(&self) -> &'static [Target] {
        ARM64_TARGETS
    }

    fn is_available(&self, host: HostOs) -> bool {
        host == HostOs::Windows
    }

    fn generator(&self) -> Option<&'static str> {
        Some("MinGW Makefiles")
    }

    fn artifact_name(&self, link: LinkMode) -> &'static str {
        match link {
            LinkMode::Static => "leveldb.lib",
            LinkMode::Shared => "leveldb.dll",
        }
    }

    fn cxx_flags(&self, _target: &Target, _variant: Variant) -> Vec<String> {
        vec![
            "-D_CRT_SECURE_NO_WARNINGS".to_string(),
            "-Dstrdup=_strdup".to_string(),
            "--target=aarch64-windows".to_string(),
        ]
    }
}

/// MinGW-w64 cross build, runnable from any host that has the posix-thread toolchain.
pub struct WindowsX64;

impl TargetFamily for WindowsX64 {
    fn id(&self) -> FamilyId {
        FamilyId::WindowsX64
    }

    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn targets(&self) -> &'static [Target] {
        X64_TARGETS
    }

    fn artifact_name(&self, link: LinkMode) -> &'static str {
        match link {
            LinkMode::Static => "libleveldb.a",
            LinkMode::Shared => "libleveldb.dll",
        }
    }

    fn cxx_flags(&self, _target: &Target, variant: Variant) -> Vec<String> {
        let mut flags = vec!["-static-libgcc".to_string(), "-static-libstdc++".to_string()];
        if variant.link.is_shared() {
            flags.push("-lpthread".to_string());
        }
        flags
    }
}
