use anyhow::{Context, Result};
use colored::*;
use std::path::Path;

use crate::matrix::FamilyId;
use crate::packager::{self, MERGED_ARCHIVE};

use super::common::Session;

/// Builds `leveldb.zip` from per-platform archives plus the public headers.
///
/// With `--from` or on CI every `leveldb-*.zip` below the directory is taken
/// (CI jobs download their siblings' archives there); otherwise the archives
/// of the families this host builds by default.
pub fn execute_merge_pipeline(session: &Session, from: Option<&Path>) -> Result<()> {
    let archives_dir = session.archives_dir();
    let dest = archives_dir.join(format!("{MERGED_ARCHIVE}.zip"));

    let archives = match from {
        Some(dir) => packager::find_archives(dir)?,
        None if session.is_ci() => packager::find_archives(&session.project_dir)?,
        None => {
            let mut archives = Vec::new();
            for family in FamilyId::host_defaults(session.host) {
                let path = archives_dir.join(format!("{}.zip", family.archive_name()));
                if path.is_file() {
                    archives.push(path);
                } else {
                    println!(
                        "{} No archive for {} at {}",
                        "[WARN]".yellow(),
                        family,
                        path.display()
                    );
                }
            }
            archives
        }
    };
    let archives: Vec<_> = archives.into_iter().filter(|p| p != &dest).collect();

    if archives.is_empty() {
        anyhow::bail!("No leveldb-*.zip archives to merge. Run `build` first.");
    }
    for archive in &archives {
        session.debug(format!("Merging {}", archive.display()));
    }

    let headers = packager::public_headers(&session.config.paths.source_dir)
        .context("Failed to collect public headers")?;

    packager::merge_archives(&dest, &archives, &headers)?;

    println!(
        "{} Merged {} archive(s) and {} header(s) → {}",
        "[DONE]".green().bold(),
        archives.len(),
        headers.len(),
        dest.display()
    );
    Ok(())
}
