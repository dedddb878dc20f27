use super::{FamilyId, Target, TargetFamily, Variant};
use crate::options::{LinkMode, Platform};

/// GCC 8 cross toolchains from the Debian/Ubuntu `*-linux-gnu*` packages.
const TARGETS: &[Target] = &[
    Target::new("linux", "x64").compilers("gcc-8", "g++-8"),
    Target::new("linux", "arm64").compilers("aarch64-linux-gnu-gcc-8", "aarch64-linux-gnu-g++-8"),
    Target::new("linux", "armv7a")
        .compilers("arm-linux-gnueabihf-gcc-8", "arm-linux-gnueabihf-g++-8"),
];

pub struct Linux;

impl TargetFamily for Linux {
    fn id(&self) -> FamilyId {
        FamilyId::Linux
    }

    fn platform(&self) -> Platform {
        Platform::Linux
    }

    fn targets(&self) -> &'static [Target] {
        TARGETS
    }

    fn artifact_name(&self, link: LinkMode) -> &'static str {
        match link {
            LinkMode::Static => "libleveldb.a",
            LinkMode::Shared => "libleveldb.so",
        }
    }

    fn cxx_flags(&self, target: &Target, variant: Variant) -> Vec<String> {
        let mut flags = Vec::new();
        if variant.link.is_shared() {
            flags.push("-static-libgcc".to_string());
            flags.push("-static-libstdc++".to_string());
        }
        // GCC's ABI-change note for ARM parameter passing is noise here.
        if target.arch == "armv7a" {
            flags.push("-Wno-psabi".to_string());
        }
        flags
    }
}
