use crate::executor::CellReport;
use crate::matrix::FamilyId;
use anyhow::{Context, Result};
use colored::*;
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Public C API headers shipped next to the libraries.
const PUBLIC_HEADERS: [&str; 2] = ["c.h", "export.h"];

/// Prefix of every archive this tool writes.
pub const ARCHIVE_PREFIX: &str = "leveldb-";

/// Name of the merged archive (without extension).
pub const MERGED_ARCHIVE: &str = "leveldb";

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644)
}

/// Zip entry name of `path` relative to `root`, always `/`-separated.
pub fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).with_context(|| {
        format!(
            "{} is not inside the output root {}",
            path.display(),
            root.display()
        )
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Writes `artifacts` into a new zip at `dest`, keyed by their path below `root`.
///
/// Every artifact must exist; a missing one means the toolchain wrote
/// somewhere unexpected and is reported rather than skipped.
pub fn write_archive(dest: &Path, root: &Path, artifacts: &[PathBuf]) -> Result<PathBuf> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let file =
        File::create(dest).with_context(|| format!("Failed to create {}", dest.display()))?;
    let mut zip = ZipWriter::new(file);

    for artifact in artifacts {
        let name = entry_name(root, artifact)?;
        let mut input = File::open(artifact)
            .with_context(|| format!("Expected artifact not found at: {}", artifact.display()))?;
        zip.start_file(name.as_str(), file_options())
            .with_context(|| format!("Failed to add {name} to {}", dest.display()))?;
        io::copy(&mut input, &mut zip)
            .with_context(|| format!("Failed to write {name} to {}", dest.display()))?;
    }

    zip.finish()
        .with_context(|| format!("Failed to finalize {}", dest.display()))?;
    Ok(dest.to_path_buf())
}

/// One `<archive_name>.zip` per family that produced at least one artifact.
///
/// Only succeeded cells are collected; failed, skipped and cancelled cells
/// contribute nothing.
pub fn collect_platform_archives(
    reports: &[CellReport],
    output_root: &Path,
    archives_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut by_family: BTreeMap<FamilyId, Vec<PathBuf>> = BTreeMap::new();
    for report in reports {
        if let Some(artifact) = report.artifact() {
            by_family
                .entry(report.family)
                .or_default()
                .push(artifact.to_path_buf());
        }
    }

    let mut written = Vec::new();
    for (family, artifacts) in by_family {
        let dest = archives_dir.join(format!("{}.zip", family.archive_name()));
        write_archive(&dest, output_root, &artifacts)?;
        println!(
            "{} Archived {} artifact(s) → {}",
            "[INFO]".cyan(),
            artifacts.len(),
            dest.display()
        );
        written.push(dest);
    }
    Ok(written)
}

/// Every `leveldb-*.zip` below `dir`, sorted. Used to merge CI job outputs.
pub fn find_archives(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk(dir, &mut |path| {
        let is_archive = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(ARCHIVE_PREFIX) && n.ends_with(".zip"));
        if is_archive {
            found.push(path.to_path_buf());
        }
    })?;
    found.sort();
    Ok(found)
}

/// Public headers under `<source>/include`, paired with their entry names
/// (`headers/include/leveldb/c.h`, ...).
pub fn public_headers(source_dir: &Path) -> Result<Vec<(PathBuf, String)>> {
    let include = source_dir.join("include");
    if !include.is_dir() {
        anyhow::bail!("Header directory not found: {}", include.display());
    }

    let mut headers = Vec::new();
    walk(&include, &mut |path| {
        let wanted = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| PUBLIC_HEADERS.contains(&n));
        if wanted {
            headers.push(path.to_path_buf());
        }
    })?;
    headers.sort();

    headers
        .into_iter()
        .map(|path| -> Result<(PathBuf, String)> {
            let name = format!("headers/include/{}", entry_name(&include, &path)?);
            Ok((path, name))
        })
        .collect()
}

/// Combines several archives and the public headers into `dest`.
///
/// Entries keep their names. If two archives carry the same entry, the first
/// one wins and the rest are reported.
pub fn merge_archives(
    dest: &Path,
    archives: &[PathBuf],
    headers: &[(PathBuf, String)],
) -> Result<PathBuf> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let file =
        File::create(dest).with_context(|| format!("Failed to create {}", dest.display()))?;
    let mut zip = ZipWriter::new(file);
    let mut seen = HashSet::new();

    for (path, name) in headers {
        let mut input =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        zip.start_file(name.as_str(), file_options())?;
        io::copy(&mut input, &mut zip)?;
        seen.insert(name.clone());
    }

    for archive in archives {
        if archive == dest {
            continue;
        }
        let file = File::open(archive)
            .with_context(|| format!("Failed to open archive: {}", archive.display()))?;
        let mut reader = ZipArchive::new(file)
            .with_context(|| format!("Failed to read zip archive: {}", archive.display()))?;

        for i in 0..reader.len() {
            let mut entry = reader.by_index(i).context("Failed to read zip entry")?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            if !seen.insert(name.clone()) {
                println!(
                    "{} Duplicate entry '{}' in {} ignored",
                    "[WARN]".yellow(),
                    name,
                    archive.display()
                );
                continue;
            }
            zip.start_file(name.as_str(), file_options())?;
            io::copy(&mut entry, &mut zip)
                .with_context(|| format!("Failed to copy {name} from {}", archive.display()))?;
        }
    }

    let mut file = zip
        .finish()
        .with_context(|| format!("Failed to finalize {}", dest.display()))?;
    file.flush()?;
    Ok(dest.to_path_buf())
}

/// Visits regular files below `dir`. Symlinks are not followed, so a link
/// cycle inside a checkout cannot recurse forever.
fn walk(dir: &Path, visit: &mut dyn FnMut(&Path)) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read dir: {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read dir: {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            walk(&path, visit)?;
        } else if file_type.is_file() {
            visit(&path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CellError, CellOutcome};
    use std::io::Read;

    fn entries(path: &Path) -> Vec<String> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }

    fn touch(path: &Path, body: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn entry_names_are_relative_and_slash_separated() {
        let root = Path::new("/build/compilations/leveldb");
        let artifact = root.join("linux").join("static").join("x64").join("release").join("libleveldb.a");
        assert_eq!(
            entry_name(root, &artifact).unwrap(),
            "linux/static/x64/release/libleveldb.a"
        );
        assert!(entry_name(root, Path::new("/elsewhere/libleveldb.a")).is_err());
    }

    #[test]
    fn only_succeeded_cells_are_archived() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("out");
        let ok = root.join("linux/static/x64/release/libleveldb.a");
        touch(&ok, b"static");

        let reports = vec![
            CellReport {
                family: FamilyId::Linux,
                task_name: "buildLeveldbStaticReleaseLinuxX64".to_string(),
                relative_dir: "linux/static/x64/release/".to_string(),
                outcome: CellOutcome::Succeeded { artifact: ok },
            },
            CellReport {
                family: FamilyId::Linux,
                task_name: "buildLeveldbSharedReleaseLinuxX64".to_string(),
                relative_dir: "linux/shared/x64/release/".to_string(),
                outcome: CellOutcome::Failed(CellError::Cancelled),
            },
            CellReport {
                family: FamilyId::Apple,
                task_name: "buildLeveldbStaticReleaseMacosxArm64".to_string(),
                relative_dir: "macosx/static/arm64/release/".to_string(),
                outcome: CellOutcome::Skipped,
            },
        ];

        let archives = tmp.path().join("archives");
        let written = collect_platform_archives(&reports, &root, &archives).unwrap();
        assert_eq!(written, vec![archives.join("leveldb-linux.zip")]);
        assert_eq!(
            entries(&written[0]),
            vec!["linux/static/x64/release/libleveldb.a"]
        );
    }

    #[test]
    fn missing_artifact_fails_collection() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("out");
        let err = write_archive(
            &tmp.path().join("a.zip"),
            &root,
            &[root.join("linux/static/x64/release/libleveldb.a")],
        )
        .unwrap_err();
        assert!(err.to_string().contains("Expected artifact not found"));
    }

    #[test]
    fn headers_are_mapped_under_headers_include() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("leveldb");
        touch(&src.join("include/leveldb/c.h"), b"// c api");
        touch(&src.join("include/leveldb/export.h"), b"// export");
        touch(&src.join("include/leveldb/db.h"), b"// c++ api");

        let headers = public_headers(&src).unwrap();
        let names: Vec<&str> = headers.iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "headers/include/leveldb/c.h",
                "headers/include/leveldb/export.h"
            ]
        );
    }

    #[test]
    fn merge_combines_archives_and_headers() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("out");
        let linux = root.join("linux/static/x64/release/libleveldb.a");
        let android = root.join("android/shared/arm64/debug/libleveldb.so");
        touch(&linux, b"linux");
        touch(&android, b"android");

        let archives = tmp.path().join("archives");
        let a = write_archive(&archives.join("leveldb-linux.zip"), &root, &[linux]).unwrap();
        let b = write_archive(&archives.join("leveldb-android.zip"), &root, &[android]).unwrap();

        let header = tmp.path().join("c.h");
        touch(&header, b"// c api");
        let merged = merge_archives(
            &archives.join("leveldb.zip"),
            &[a, b],
            &[(header, "headers/include/leveldb/c.h".to_string())],
        )
        .unwrap();

        assert_eq!(
            entries(&merged),
            vec![
                "android/shared/arm64/debug/libleveldb.so",
                "headers/include/leveldb/c.h",
                "linux/static/x64/release/libleveldb.a",
            ]
        );

        let mut archive = ZipArchive::new(File::open(&merged).unwrap()).unwrap();
        let mut body = String::new();
        archive
            .by_name("linux/static/x64/release/libleveldb.a")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "linux");
    }

    #[test]
    fn find_archives_filters_by_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("job-a/leveldb-linux.zip"), b"");
        touch(&tmp.path().join("job-b/leveldb-apple.zip"), b"");
        touch(&tmp.path().join("job-b/other.zip"), b"");
        touch(&tmp.path().join("leveldb-notes.txt"), b"");

        let found = find_archives(tmp.path()).unwrap();
        assert_eq!(
            found,
            vec![
                tmp.path().join("job-a/leveldb-linux.zip"),
                tmp.path().join("job-b/leveldb-apple.zip"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn find_archives_ignores_symlink_cycles() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("leveldb/leveldb-linux.zip"), b"");
        std::os::unix::fs::symlink(tmp.path(), tmp.path().join("leveldb/loop")).unwrap();
        std::os::unix::fs::symlink(
            tmp.path().join("leveldb/leveldb-linux.zip"),
            tmp.path().join("leveldb-alias.zip"),
        )
        .unwrap();

        let found = find_archives(tmp.path()).unwrap();
        assert_eq!(found, vec![tmp.path().join("leveldb/leveldb-linux.zip")]);
    }
}
