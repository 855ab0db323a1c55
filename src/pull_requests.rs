//! Closed pull request pagination.
//!
//! [`fetch_all_closed_prs`] walks the closed pull request listing page by
//! page, starting at page 1, until it sees an empty page or reaches the
//! configured page cap. Pages are requested in waves of
//! [`PageFetchOptions::concurrency`] on a bounded worker pool and reassembled
//! in page order.
//!
//! A page whose retries are exhausted is logged and contributes nothing; a
//! record missing required fields is logged and skipped. Neither stops the
//! walk.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::error::{ReleaseStatsError, Result};
use crate::forge::ForgeClient;

/// Default page cap.
pub const DEFAULT_MAX_PAGES: u32 = 100;

/// Default number of pages fetched at once.
pub const DEFAULT_PAGE_CONCURRENCY: usize = 8;

/// Pull request state as reported by the forge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    /// Still open.
    Open,
    /// Closed, merged or not.
    Closed,
}

/// A normalized pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRow {
    /// Pull request number.
    pub number: u64,
    /// Login of the author.
    pub author: String,
    /// Open or closed.
    pub state: PullRequestState,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Close time, if closed.
    pub closed_at: Option<DateTime<Utc>>,
    /// Merge time, if merged.
    pub merged_at: Option<DateTime<Utc>>,
    /// Target branch name.
    pub base_ref: String,
}

#[derive(Deserialize)]
struct RawUser {
    login: Option<String>,
}

#[derive(Deserialize)]
struct RawBase {
    #[serde(rename = "ref")]
    ref_name: Option<String>,
}

#[derive(Deserialize)]
struct RawPullRequest {
    number: Option<u64>,
    user: Option<RawUser>,
    state: Option<PullRequestState>,
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
    base: Option<RawBase>,
}

fn missing(field: &str, number: Option<u64>) -> ReleaseStatsError {
    let message = match number {
        Some(n) => format!("pull request {} has no '{}'", n, field),
        None => format!("record has no '{}'", field),
    };
    ReleaseStatsError::malformed_record("pull request", message)
}

impl PullRequestRow {
    /// Normalizes one raw listing record.
    ///
    /// `number`, `user.login`, `state`, `created_at` and `base.ref` are
    /// required; `closed_at` and `merged_at` may be null.
    pub fn from_raw(record: &Value) -> Result<Self> {
        let raw: RawPullRequest = serde_json::from_value(record.clone())
            .map_err(|e| ReleaseStatsError::malformed_record("pull request", e.to_string()))?;
        let number = raw.number.ok_or_else(|| missing("number", None))?;
        let author = raw
            .user
            .and_then(|u| u.login)
            .ok_or_else(|| missing("user.login", Some(number)))?;
        let state = raw.state.ok_or_else(|| missing("state", Some(number)))?;
        let created_at = raw
            .created_at
            .ok_or_else(|| missing("created_at", Some(number)))?;
        let base_ref = raw
            .base
            .and_then(|b| b.ref_name)
            .ok_or_else(|| missing("base.ref", Some(number)))?;
        Ok(Self {
            number,
            author,
            state,
            created_at,
            closed_at: raw.closed_at,
            merged_at: raw.merged_at,
            base_ref,
        })
    }

    /// True when the pull request was merged into `branch`.
    pub fn is_merged_into(&self, branch: &str) -> bool {
        self.merged_at.is_some() && self.base_ref == branch
    }
}

/// Pull requests merged into `branch`, in input order.
pub fn merged_into<'a>(rows: &'a [PullRequestRow], branch: &str) -> Vec<&'a PullRequestRow> {
    rows.iter().filter(|pr| pr.is_merged_into(branch)).collect()
}

/// Pagination limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFetchOptions {
    /// Highest page number that may be requested.
    pub max_pages: u32,
    /// Pages requested at once. Zero is treated as one.
    pub concurrency: usize,
}

impl Default for PageFetchOptions {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            concurrency: DEFAULT_PAGE_CONCURRENCY,
        }
    }
}

fn normalize_page(page: u32, records: &[Value], rows: &mut Vec<PullRequestRow>) {
    for record in records {
        match PullRequestRow::from_raw(record) {
            Ok(row) => rows.push(row),
            Err(e) => tracing::warn!(page, error = %e, "skipping malformed pull request record"),
        }
    }
}

/// Pages of the wave starting at `next_page`, or `None` once past the cap.
fn wave_bounds(next_page: u32, width: u32, max_pages: u32) -> Option<(u32, u32)> {
    if next_page == 0 || next_page > max_pages {
        return None;
    }
    let last_page = next_page
        .saturating_add(width.saturating_sub(1))
        .min(max_pages);
    Some((next_page, last_page))
}

/// Fetches every closed pull request up to the page cap.
///
/// Pages are requested in waves of `options.concurrency` pages. The first
/// empty page ends pagination, but with a concurrency above one the pages
/// after it in the same wave have already been requested; their records are
/// discarded and no further wave starts. Use a concurrency of one when no
/// page past the empty one may be requested at all.
#[instrument(skip(client), fields(repo = %client.settings().repo))]
pub fn fetch_all_closed_prs(
    client: &ForgeClient,
    options: &PageFetchOptions,
) -> Result<Vec<PullRequestRow>> {
    let width = options.concurrency.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(width)
        .thread_name(|i| format!("page-fetch-{i}"))
        .build()?;

    let mut rows = Vec::new();
    let mut reached_end = false;
    let wave_width = u32::try_from(width).unwrap_or(u32::MAX);
    let mut next_page = Some(1u32);

    'waves: while let Some((first_page, last_page)) =
        next_page.and_then(|page| wave_bounds(page, wave_width, options.max_pages))
    {
        let pages: Vec<u32> = (first_page..=last_page).collect();
        let fetched: Vec<(u32, Result<Vec<Value>>)> = pool.install(|| {
            pages
                .par_iter()
                .map(|&page| (page, client.fetch_pull_request_page(page)))
                .collect()
        });

        for (page, outcome) in fetched {
            match outcome {
                Ok(records) if records.is_empty() => {
                    tracing::debug!(page, "empty page, pagination complete");
                    reached_end = true;
                    break 'waves;
                }
                Ok(records) => {
                    tracing::debug!(page, records = records.len(), "fetched pull request page");
                    normalize_page(page, &records, &mut rows);
                }
                Err(e) => {
                    tracing::warn!(page, error = %e, "pull request page unavailable, continuing");
                }
            }
        }
        next_page = last_page.checked_add(1);
    }

    if !reached_end {
        tracing::warn!(
            max_pages = options.max_pages,
            "page cap reached before an empty page; raise forge.max_pages to see older pull requests"
        );
    }
    tracing::info!(count = rows.len(), "fetched closed pull requests");
    Ok(rows)
}
