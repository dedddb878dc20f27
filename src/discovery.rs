//! Explicit resolution of toolchain locations.
//!
//! Values come from an ordered list of candidate sources and the first
//! present one wins. Callers resolve everything up front and pass plain paths
//! into the matrix, so nothing reads the environment mid-build.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const LOCAL_PROPERTIES: &str = "local.properties";

const SDK_ENV_VARS: [&str; 3] = ["ANDROID_SDK_HOME", "ANDROID_SDK_ROOT", "ANDROID_SDK"];
const NDK_ENV_VARS: [&str; 3] = ["ANDROID_NDK_HOME", "ANDROID_NDK_ROOT", "ANDROID_NDK"];

/// Snapshot of the ambient inputs discovery may consult.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryContext {
    pub properties: HashMap<String, String>,
    pub env: HashMap<String, String>,
}

impl DiscoveryContext {
    /// Captures the process environment and `<project_dir>/local.properties`.
    pub fn from_process(project_dir: &Path) -> Result<Self> {
        let properties = match project_dir.join(LOCAL_PROPERTIES) {
            path if path.exists() => load_properties(&path)?,
            _ => HashMap::new(),
        };
        Ok(Self {
            properties,
            env: std::env::vars().collect(),
        })
    }

    fn env(&self, key: &str) -> Option<&str> {
        self.env
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// One place a value may come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// CLI flag or config file entry.
    Explicit(Option<PathBuf>),
    /// Key in `local.properties`.
    Property(&'static str),
    EnvVar(&'static str),
    /// Newest (lexically last) sub-directory of a directory.
    NewestSubdir(PathBuf),
}

impl Candidate {
    fn evaluate(&self, ctx: &DiscoveryContext) -> Option<PathBuf> {
        match self {
            Candidate::Explicit(value) => value.clone(),
            Candidate::Property(key) => ctx
                .properties
                .get(*key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            Candidate::EnvVar(key) => ctx.env(key).map(PathBuf::from),
            Candidate::NewestSubdir(dir) => newest_subdir(dir),
        }
    }
}

/// Returns the first candidate that yields a value.
///
/// With `must_exist`, values pointing at missing paths are skipped.
pub fn resolve_first(
    candidates: &[Candidate],
    ctx: &DiscoveryContext,
    must_exist: bool,
) -> Option<PathBuf> {
    candidates
        .iter()
        .filter_map(|c| c.evaluate(ctx))
        .find(|p| !must_exist || p.exists())
}

pub fn sdk_candidates(explicit: Option<PathBuf>) -> Vec<Candidate> {
    let mut candidates = vec![Candidate::Explicit(explicit), Candidate::Property("sdk.dir")];
    candidates.extend(SDK_ENV_VARS.into_iter().map(Candidate::EnvVar));
    candidates
}

pub fn ndk_candidates(explicit: Option<PathBuf>, sdk: Option<&Path>) -> Vec<Candidate> {
    let mut candidates = vec![Candidate::Explicit(explicit), Candidate::Property("ndk.dir")];
    candidates.extend(NDK_ENV_VARS.into_iter().map(Candidate::EnvVar));
    if let Some(sdk) = sdk {
        candidates.push(Candidate::NewestSubdir(sdk.join("ndk")));
    }
    candidates
}

pub fn resolve_android_sdk(explicit: Option<PathBuf>, ctx: &DiscoveryContext) -> Option<PathBuf> {
    resolve_first(&sdk_candidates(explicit), ctx, false)
}

/// NDK root: explicit, `ndk.dir`, NDK variables, then `<sdk>/ndk/<newest>`.
pub fn resolve_android_ndk(
    explicit_ndk: Option<PathBuf>,
    explicit_sdk: Option<PathBuf>,
    ctx: &DiscoveryContext,
) -> Option<PathBuf> {
    let sdk = resolve_android_sdk(explicit_sdk, ctx);
    resolve_first(&ndk_candidates(explicit_ndk, sdk.as_deref()), ctx, true)
}

/// CI runners export `CI=true`.
pub fn is_ci(ctx: &DiscoveryContext) -> bool {
    ctx.env("CI").is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// cmake executable: explicit path, then PATH lookup, then the bare name so
/// the spawn error surfaces per cell.
pub fn resolve_cmake(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| which::which("cmake").ok())
        .unwrap_or_else(|| PathBuf::from("cmake"))
}

fn newest_subdir(dir: &Path) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs.pop()
}

/// Reads a Java-style properties file (the subset Android tooling writes).
pub fn load_properties(path: &Path) -> Result<HashMap<String, String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(parse_properties(&content))
}

pub fn parse_properties(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        // Separator is the first unescaped '=' or ':'.
        let mut split = None;
        let mut escaped = false;
        for (i, ch) in line.char_indices() {
            match ch {
                '\\' if !escaped => escaped = true,
                '=' | ':' if !escaped => {
                    split = Some(i);
                    break;
                }
                _ => escaped = false,
            }
        }

        let (key, value) = match split {
            Some(i) => (&line[..i], &line[i + 1..]),
            None => (line, ""),
        };
        map.insert(unescape(key.trim()), unescape(value.trim()));
    }
    map
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
