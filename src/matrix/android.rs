use super::{FamilyId, MatrixContext, Target, TargetFamily, Variant};
use crate::options::{AndroidOptions, BuildOptions, LinkMode, Platform};

/// API level passed as `CMAKE_SYSTEM_VERSION`.
pub const ANDROID_API_LEVEL: u32 = 35;

const TARGETS: &[Target] = &[
    Target::new("android", "arm64").system("Android").abi("arm64-v8a"),
    Target::new("android", "armv7a").system("Android").abi("armeabi-v7a"),
    Target::new("android", "x86").system("Android").abi("x86"),
    Target::new("android", "x64").system("Android").abi("x86_64"),
];

pub struct Android;

impl Android {
    fn stl_type(link: LinkMode) -> &'static str {
        match link {
            LinkMode::Static => "c++_static",
            LinkMode::Shared => "c++_shared",
        }
    }
}

impl TargetFamily for Android {
    fn id(&self) -> FamilyId {
        FamilyId::Android
    }

    fn platform(&self) -> Platform {
        Platform::Android
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

    fn apply(
        &self,
        target: &Target,
        variant: Variant,
        ctx: &MatrixContext,
        options: &mut BuildOptions,
    ) {
        options.system_version = Some(ANDROID_API_LEVEL);
        // Without an NDK the cell keeps no Android group and fails validation
        // before anything is spawned.
        if let Some(ndk) = &ctx.android_ndk {
            options.android = Some(AndroidOptions {
                abi: target.abi.unwrap_or(target.arch).to_string(),
                ndk_path: ndk.clone(),
                stl_type: Self::stl_type(variant.link).to_string(),
            });
        }
    }
}
