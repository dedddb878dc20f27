use crate::options::BuildOptions;
use std::path::Path;

fn on_off(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}

fn define(name: &str, value: impl std::fmt::Display) -> String {
    format!("-D{name}={value}")
}

/// Arguments of the configure invocation (`cmake -B <out> -S <src> ...`).
///
/// The order is fixed so two runs over the same options produce the same
/// command line, which keeps logs diffable.
pub fn configure_args(options: &BuildOptions) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(generator) = &options.generator {
        args.push("-G".to_string());
        args.push(generator.clone());
    }
    args.push(define("LEVELDB_BUILD_TESTS", on_off(options.with_tests)));
    args.push(define("CMAKE_BUILD_TYPE", options.build_type.cmake_name()));
    args.push(define(
        "LEVELDB_BUILD_BENCHMARKS",
        on_off(options.with_benchmarks),
    ));

    if let Some(name) = &options.system_name {
        args.push(define("CMAKE_SYSTEM_NAME", name));
    }
    if let Some(apple) = &options.apple {
        args.push(define("CMAKE_OSX_ARCHITECTURES", &apple.osx_arch));
        args.push(define("CMAKE_OSX_SYSROOT", &apple.osx_sysroot));
    }
    if let Some(android) = &options.android {
        args.push(define("CMAKE_ANDROID_ARCH_ABI", &android.abi));
        args.push(define("CMAKE_ANDROID_NDK", android.ndk_path.display()));
    }
    if let Some(version) = options.system_version {
        args.push(define("CMAKE_SYSTEM_VERSION", version));
    }
    if let Some(android) = &options.android {
        args.push(define("CMAKE_ANDROID_STL_TYPE", &android.stl_type));
    }
    if let Some(standard) = &options.cxx_standard {
        args.push(define("CMAKE_CXX_STANDARD", standard));
    }
    if let Some(processor) = &options.system_processor {
        args.push(define("CMAKE_SYSTEM_PROCESSOR", processor));
    }

    args.push(define("BUILD_SHARED_LIBS", on_off(options.is_shared())));
    args.push(define("CMAKE_C_COMPILER", &options.c_compiler));
    args.push(define("CMAKE_CXX_COMPILER", &options.cxx_compiler));

    if !options.cxx_flags.is_empty() {
        args.push(define("CMAKE_CXX_FLAGS", options.cxx_flags.join(" ")));
    }
    if !options.c_flags.is_empty() {
        args.push(define("CMAKE_C_FLAGS", options.c_flags.join(" ")));
    }

    args.push("-B".to_string());
    args.push(options.output_dir.display().to_string());
    args.push("-S".to_string());
    args.push(options.source_dir.display().to_string());

    args
}

/// Arguments of the build invocation (`cmake --build <out> -j <jobs>`).
pub fn build_args(options: &BuildOptions, jobs: usize) -> Vec<String> {
    vec![
        "--build".to_string(),
        options.output_dir.display().to_string(),
        "-j".to_string(),
        jobs.max(1).to_string(),
    ]
}

/// Number of processing units on this host, never less than one.
pub fn host_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Human readable command line used for logging and `--dry-run`.
pub fn render_command(program: &Path, args: &[String]) -> String {
    let mut line = quote(&program.display().to_string());
    for arg in args {
        line.push(' ');
        line.push_str(&quote(arg));
    }
    line
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.contains(char::is_whitespace) {
        format!("\"{arg}\"")
    } else {
        arg.to_string()
    }
}
