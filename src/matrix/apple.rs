use super::{FamilyId, HostOs, MatrixContext, Target, TargetFamily, Variant};
use crate::options::{AppleOptions, BuildOptions, LinkMode, Platform};

/// The only SDK for which a shared library is produced.
const MACOS_SYSROOT: &str = "macosx";

/// (SDK, architecture) pairs; the SDK name doubles as the output directory.
const TARGETS: &[Target] = &[
    Target::new("macosx", "x86_64").system("Darwin"),
    Target::new("macosx", "arm64").system("Darwin"),
    Target::new("iphoneos", "arm64").system("iOS"),
    Target::new("iphonesimulator", "arm64").system("iOS"),
    Target::new("iphonesimulator", "x86_64").system("iOS"),
    Target::new("appletvos", "arm64").system("tvOS"),
    Target::new("appletvsimulator", "arm64").system("tvOS"),
    Target::new("appletvsimulator", "x86_64").system("tvOS"),
    Target::new("watchos", "arm64").system("watchOS"),
    Target::new("watchsimulator", "arm64").system("watchOS"),
    Target::new("watchsimulator", "x86_64").system("watchOS"),
];

pub struct Apple;

impl TargetFamily for Apple {
    fn id(&self) -> FamilyId {
        FamilyId::Apple
    }

    fn platform(&self) -> Platform {
        Platform::Apple
    }

    fn targets(&self) -> &'static [Target] {
        TARGETS
    }

    fn is_available(&self, host: HostOs) -> bool {
        host == HostOs::MacOs
    }

    fn supports(&self, target: &Target, variant: Variant) -> bool {
        !variant.link.is_shared() || target.platform_dir == MACOS_SYSROOT
    }

    fn artifact_name(&self, link: LinkMode) -> &'static str {
        match link {
            LinkMode::Static => "libleveldb.a",
            LinkMode::Shared => "libleveldb.dylib",
        }
    }

    fn apply(
        &self,
        target: &Target,
        _variant: Variant,
        _ctx: &MatrixContext,
        options: &mut BuildOptions,
    ) {
        options.apple = Some(AppleOptions {
            osx_arch: target.arch.to_string(),
            osx_sysroot: target.platform_dir.to_string(),
        });
    }
}
