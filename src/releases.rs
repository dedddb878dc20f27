//! Upstream release polling and build-workflow dispatch.
//!
//! Both entry points talk to the GitHub REST API through a thin blocking
//! client. The selection logic is kept free of I/O so it can be tested
//! without a network.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use time::{Date, OffsetDateTime};

const PAGE_SIZE: usize = 100;
const USER_AGENT: &str = concat!("leveldb-builds/", env!("CARGO_PKG_VERSION"));

/// Parses a release tag leniently: a leading `v` is dropped and missing
/// minor/patch components are filled with zero.
pub fn normalize_version(tag: &str) -> Option<semver::Version> {
    let trimmed = tag.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    let mut parts: Vec<&str> = trimmed.split('.').collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    semver::Version::parse(&parts.join(".")).ok()
}

/// Upstream tags that have no build yet and are at least `minimum`.
///
/// Order follows `upstream`. Tags that do not parse as versions are ignored.
pub fn select_new_releases(
    upstream: &[String],
    built: &HashSet<String>,
    minimum: &semver::Version,
) -> Vec<String> {
    upstream
        .iter()
        .filter(|tag| !built.contains(*tag))
        .filter(|tag| normalize_version(tag).is_some_and(|v| &v >= minimum))
        .cloned()
        .collect()
}

/// Inputs for a build of a tagged upstream release.
pub fn release_inputs(version: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("leveldb-version".to_string(), version.to_string()),
        ("enable-windows".to_string(), "true".to_string()),
        ("debug".to_string(), "false".to_string()),
    ])
}

/// Inputs for the weekly build of upstream `main`.
pub fn weekly_inputs(today: Date) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("leveldb-ref".to_string(), "main".to_string()),
        ("debug".to_string(), "false".to_string()),
        ("version-name".to_string(), weekly_version_name(today)),
    ])
}

/// `weekly-YYYY-MM-DD` for the day after `today`.
pub fn weekly_version_name(today: Date) -> String {
    let day = today.next_day().unwrap_or(today);
    format!(
        "weekly-{:04}-{:02}-{:02}",
        day.year(),
        u8::from(day.month()),
        day.day()
    )
}

pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

/// `owner/repo` split into its two halves.
pub fn split_repo(slug: &str) -> Result<(&str, &str)> {
    match slug.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => anyhow::bail!("Invalid repository '{slug}', expected 'owner/repo'"),
    }
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
    inputs: &'a BTreeMap<String, String>,
}

/// Minimal GitHub REST client.
pub struct GithubClient {
    client: reqwest::blocking::Client,
    base_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Reads the token from `GITHUB_TOKEN`.
    pub fn from_env(base_url: &str) -> Result<Self> {
        Self::new(base_url, std::env::var("GITHUB_TOKEN").ok())
    }

    /// Tag names of every release of `repo`, newest first as GitHub lists them.
    pub fn release_tags(&self, repo: &str) -> Result<Vec<String>> {
        let (owner, name) = split_repo(repo)?;
        let mut tags = Vec::new();

        for page in 1.. {
            let url = format!(
                "{}/repos/{owner}/{name}/releases?per_page={PAGE_SIZE}&page={page}",
                self.base_url
            );
            let resp = self
                .request(reqwest::Method::GET, &url)
                .send()
                .with_context(|| format!("Failed to connect to {url}"))?;
            let body = check_status(resp, &url)?;
            let releases: Vec<Release> = serde_json::from_str(&body)
                .with_context(|| format!("Failed to parse releases of {repo}"))?;

            let count = releases.len();
            tags.extend(releases.into_iter().map(|r| r.tag_name));
            if count < PAGE_SIZE {
                break;
            }
        }
        Ok(tags)
    }

    /// Triggers a `workflow_dispatch` run. Requires a token.
    pub fn dispatch_workflow(
        &self,
        repo: &str,
        workflow: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<()> {
        if self.token.is_none() {
            anyhow::bail!("GITHUB_TOKEN is not set; cannot dispatch workflows.");
        }
        let (owner, name) = split_repo(repo)?;
        let url = format!(
            "{}/repos/{owner}/{name}/actions/workflows/{workflow}/dispatches",
            self.base_url
        );
        let payload = DispatchRequest { git_ref, inputs };
        let resp = self
            .request(reqwest::Method::POST, &url)
            .json(&payload)
            .send()
            .with_context(|| format!("Failed to connect to {url}"))?;
        check_status(resp, &url)?;
        Ok(())
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::blocking::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {token}")),
            None => builder,
        }
    }
}

fn check_status(resp: reqwest::blocking::Response, url: &str) -> Result<String> {
    let status = resp.status();
    if status.is_success() {
        return resp
            .text()
            .with_context(|| format!("Failed to read response from {url}"));
    }
    let body = body_or_reason(resp.text());
    Err(status_error(status, url, &body))
}

/// Error bodies are diagnostics only; a read failure is reported in their place.
fn body_or_reason<E: std::fmt::Display>(body: std::result::Result<String, E>) -> String {
    body.unwrap_or_else(|e| format!("<unreadable body: {e}>"))
}

fn status_error(status: reqwest::StatusCode, url: &str, body: &str) -> anyhow::Error {
    match status.as_u16() {
        401 | 403 => anyhow::anyhow!("GitHub rejected the request to {url} (HTTP {status}): {body}"),
        404 => anyhow::anyhow!("Not found: {url}"),
        _ => anyhow::anyhow!("Unexpected response from {url} (HTTP {status}): {body}"),
    }
}
