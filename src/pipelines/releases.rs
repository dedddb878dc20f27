use anyhow::{Context, Result};
use colored::*;
use std::collections::HashSet;

use crate::releases::{self, GithubClient};

use super::common::Session;

/// Dispatches one build per upstream release that has not been built yet.
pub fn execute_release_check_pipeline(session: &Session, dry_run: bool) -> Result<()> {
    let cfg = &session.config.releases;
    let minimum = releases::normalize_version(&cfg.minimum_version).with_context(|| {
        format!("Invalid minimum version '{}'", cfg.minimum_version)
    })?;

    let client = GithubClient::from_env(&cfg.api_base)?;

    let upstream = client
        .release_tags(&cfg.upstream)
        .with_context(|| format!("Failed to list releases of {}", cfg.upstream))?;
    let built: HashSet<String> = client
        .release_tags(&cfg.builds)
        .with_context(|| format!("Failed to list releases of {}", cfg.builds))?
        .into_iter()
        .collect();
    session.debug(format!("Already built: {built:?}"));

    let new_releases = releases::select_new_releases(&upstream, &built, &minimum);
    if new_releases.is_empty() {
        println!(
            "{} No new releases to build after version {}",
            "[INFO]".cyan(),
            minimum
        );
        return Ok(());
    }

    println!(
        "{} New releases to build: {}",
        "[INFO]".cyan(),
        new_releases.join(", ")
    );

    for release in &new_releases {
        let inputs = releases::release_inputs(release);
        if dry_run {
            println!(
                "{} Would dispatch {} on {}@{} with {:?}",
                "[PLAN]".cyan(),
                cfg.workflow,
                cfg.builds,
                cfg.git_ref,
                inputs
            );
            continue;
        }
        client
            .dispatch_workflow(&cfg.builds, &cfg.workflow, &cfg.git_ref, &inputs)
            .with_context(|| format!("Failed to dispatch build for {release}"))?;
        println!("{} Dispatched build for {}", "[DONE]".green().bold(), release);
    }
    Ok(())
}

/// Dispatches the weekly build of upstream `main`.
pub fn execute_weekly_pipeline(session: &Session, dry_run: bool) -> Result<()> {
    let cfg = &session.config.releases;
    let inputs = releases::weekly_inputs(releases::today_utc());

    if dry_run {
        println!(
            "{} Would dispatch {} on {}@{} with {:?}",
            "[PLAN]".cyan(),
            cfg.workflow,
            cfg.builds,
            cfg.git_ref,
            inputs
        );
        return Ok(());
    }

    let client = GithubClient::from_env(&cfg.api_base)?;
    client.dispatch_workflow(&cfg.builds, &cfg.workflow, &cfg.git_ref, &inputs)?;
    println!(
        "{} Dispatched weekly build {}",
        "[DONE]".green().bold(),
        inputs["version-name"]
    );
    Ok(())
}
