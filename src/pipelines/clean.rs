use anyhow::{Context, Result};
use colored::*;
use std::fs;

use super::common::Session;

pub fn execute_clean_pipeline(session: &Session) -> Result<()> {
    let build_dir = &session.config.paths.build_dir;
    if !build_dir.exists() {
        println!(
            "{} Nothing to clean at {}",
            "[INFO]".cyan(),
            build_dir.display()
        );
        return Ok(());
    }

    fs::remove_dir_all(build_dir)
        .with_context(|| format!("Failed to remove {}", build_dir.display()))?;

    println!("{} Removed {}", "[DONE]".green().bold(), build_dir.display());
    Ok(())
}
