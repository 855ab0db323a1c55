//! Sequencing of the individual statistics steps.
//!
//! Each step can be run on its own (the CLI exposes one subcommand per step)
//! or all together through [`run_all`], which collects everything into a
//! [`RunReport`] for the reporting layer.
//!
//! Failures of a single unit of work (one page, one pull request, one
//! release) are logged and recorded but never abort the run. Only setup
//! failures, such as an invalid merge subject pattern or a worker pool that
//! cannot be built, are returned as errors.

use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::instrument;

use crate::contributor_tally::{self, ContributorTally, DEFAULT_COMMENT_CONCURRENCY};
use crate::error::{ReleaseStatsError, Result};
use crate::forge::{ForgeClient, RateLimitStatus};
use crate::history::GitHistory;
use crate::merge_subject::{DEFAULT_MERGE_PATTERN, MergeNumberParser};
use crate::pull_requests::{self, PageFetchOptions, PullRequestRow};
use crate::release_delta::{ReleaseDefinition, ReleaseDeltaAnalyzer, ReleaseStats};

/// Resolved settings for a run, after config and CLI merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Local git repository.
    pub repository: PathBuf,
    /// Branch new authors are measured against.
    pub mainline_branch: String,
    /// Releases in report order.
    pub releases: Vec<ReleaseDefinition>,
    /// Releases analyzed at once.
    pub jobs: usize,
    /// Regex recognising pull request merges in commit subjects.
    pub merge_subject_pattern: String,
    /// Pull request listing limits.
    pub page_fetch: PageFetchOptions,
    /// Pull requests whose comments are fetched at once.
    pub comment_concurrency: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            repository: PathBuf::from("."),
            mainline_branch: "master".to_string(),
            releases: Vec::new(),
            jobs: num_cpus::get(),
            merge_subject_pattern: DEFAULT_MERGE_PATTERN.to_string(),
            page_fetch: PageFetchOptions::default(),
            comment_concurrency: DEFAULT_COMMENT_CONCURRENCY,
        }
    }
}

/// A release that could not be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseFailure {
    /// Release name.
    pub release: String,
    /// Error kind, see [`ReleaseStatsError::name`].
    pub kind: String,
    /// Rendered error.
    pub message: String,
}

impl ReleaseFailure {
    fn new(release: &ReleaseDefinition, error: &ReleaseStatsError) -> Self {
        Self {
            release: release.name.clone(),
            kind: error.name().to_string(),
            message: error.to_string(),
        }
    }
}

/// Outcome of the releases step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseOutcome {
    /// Successfully analyzed releases, in configuration order.
    pub releases: Vec<ReleaseStats>,
    /// Releases that failed, in configuration order.
    pub failures: Vec<ReleaseFailure>,
}

/// Everything produced by [`run_all`].
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Rate-limit status at the start of the run, when it could be queried.
    pub rate_limit: Option<RateLimitStatus>,
    /// Pull requests merged into the mainline branch.
    pub merged_pull_requests: Vec<PullRequestRow>,
    /// Per-release statistics.
    pub releases: Vec<ReleaseStats>,
    /// Releases that could not be analyzed.
    pub failed_releases: Vec<ReleaseFailure>,
    /// Comment counts over the pull list.
    pub tally: ContributorTally,
}

/// Queries the rate limit and warns when the quota is used up.
///
/// An exhausted quota is not an error; the run continues and later requests
/// will fail on their own.
#[instrument(skip(client))]
pub fn check_rate_limit(client: &ForgeClient) -> Result<RateLimitStatus> {
    let status = client.check_rate_limit()?;
    tracing::info!(
        limit = status.limit,
        remaining = status.remaining,
        used = status.used,
        reset = %status.reset,
        "rate limit"
    );
    if let Err(e) = status.ensure_quota() {
        tracing::warn!(error = %e, "continuing with an exhausted rate limit");
    }
    Ok(status)
}

/// Best-effort [`check_rate_limit`] run before a step that talks to the
/// forge. A failed query is logged and yields `None`.
pub fn rate_limit_before_requests(client: &ForgeClient) -> Option<RateLimitStatus> {
    match check_rate_limit(client) {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!(error = %e, "rate limit unavailable");
            None
        }
    }
}

/// Fetches every closed pull request and keeps those merged into
/// `mainline_branch`, sorted by number.
#[instrument(skip(client, options))]
pub fn merged_pull_requests(
    client: &ForgeClient,
    options: &PageFetchOptions,
    mainline_branch: &str,
) -> Result<Vec<PullRequestRow>> {
    let rows = pull_requests::fetch_all_closed_prs(client, options)?;
    let mut merged: Vec<PullRequestRow> = pull_requests::merged_into(&rows, mainline_branch)
        .into_iter()
        .cloned()
        .collect();
    merged.sort_by_key(|row| row.number);
    tracing::info!(
        closed = rows.len(),
        merged = merged.len(),
        "pull requests merged into mainline"
    );
    Ok(merged)
}

/// Analyzes every configured release on a pool of `settings.jobs` workers.
///
/// Each worker opens its own repository handle. A release that fails is
/// logged with its name and listed in [`ReleaseOutcome::failures`].
#[instrument(skip(settings), fields(releases = settings.releases.len()))]
pub fn analyze_releases(settings: &RunSettings) -> Result<ReleaseOutcome> {
    let parser = MergeNumberParser::with_pattern(&settings.merge_subject_pattern)?;
    let analyzer = ReleaseDeltaAnalyzer::new(settings.mainline_branch.clone(), Arc::new(parser));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.jobs.max(1))
        .thread_name(|i| format!("release-{i}"))
        .build()?;

    let results: Vec<(&ReleaseDefinition, Result<ReleaseStats>)> = pool.install(|| {
        settings
            .releases
            .par_iter()
            .map(|release| {
                let outcome = GitHistory::open(&settings.repository)
                    .and_then(|history| analyzer.analyze(&history, release));
                (release, outcome)
            })
            .collect()
    });

    let mut outcome = ReleaseOutcome::default();
    for (release, result) in results {
        match result {
            Ok(stats) => outcome.releases.push(stats),
            Err(e) => {
                tracing::warn!(release = %release.name, error = %e, "release skipped");
                outcome.failures.push(ReleaseFailure::new(release, &e));
            }
        }
    }
    Ok(outcome)
}

/// Tallies comment authors over `pr_numbers`.
pub fn tally_commenters(
    client: &ForgeClient,
    pr_numbers: &[u64],
    concurrency: usize,
) -> Result<ContributorTally> {
    contributor_tally::tally(pr_numbers, client, concurrency)
}

/// Runs every step: rate limit, merged pull requests, releases, commenters.
///
/// The rate-limit and merged steps are best effort; their failures are
/// logged and leave the corresponding report fields empty.
#[instrument(skip_all)]
pub fn run_all(
    settings: &RunSettings,
    client: &ForgeClient,
    pr_numbers: &[u64],
) -> Result<RunReport> {
    let rate_limit = rate_limit_before_requests(client);

    let merged = match merged_pull_requests(client, &settings.page_fetch, &settings.mainline_branch) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(error = %e, "merged pull requests unavailable");
            Vec::new()
        }
    };

    let outcome = analyze_releases(settings)?;
    let tally = tally_commenters(client, pr_numbers, settings.comment_concurrency)?;

    Ok(RunReport {
        rate_limit,
        merged_pull_requests: merged,
        releases: outcome.releases,
        failed_releases: outcome.failures,
        tally,
    })
}
