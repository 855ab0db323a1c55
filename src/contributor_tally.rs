//! Comment counts per author across a set of pull requests.
//!
//! For each pull request both the conversation comments and the review
//! comments are fetched. Every comment whose author is known adds one to
//! that author's count. Work is spread over a bounded worker pool; each
//! worker builds its own partial [`ContributorTally`] and the partials are
//! merged at the end, so the final counts do not depend on fetch order.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::instrument;

use crate::error::Result;
use crate::forge::{Comment, ForgeClient};

/// Default number of pull requests whose comments are fetched at once.
pub const DEFAULT_COMMENT_CONCURRENCY: usize = 8;

/// One row of a sorted tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommenterRow {
    /// Forge login.
    pub commenter: String,
    /// Number of comments.
    pub comments: u64,
}

/// Comment count per login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContributorTally {
    counts: HashMap<String, u64>,
}

impl ContributorTally {
    /// Empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` comments for `login`.
    pub fn record(&mut self, login: &str, count: u64) {
        *self.counts.entry(login.to_string()).or_insert(0) += count;
    }

    /// Counts one comment per authored entry; orphaned comments are ignored.
    pub fn record_comments(&mut self, comments: &[Comment]) {
        for author in comments.iter().filter_map(Comment::author) {
            self.record(author, 1);
        }
    }

    /// Adds every count of `other` into `self`.
    pub fn merge(&mut self, other: ContributorTally) {
        for (login, count) in other.counts {
            *self.counts.entry(login).or_insert(0) += count;
        }
    }

    /// Comments recorded for `login`, zero when unknown.
    pub fn get(&self, login: &str) -> u64 {
        self.counts.get(login).copied().unwrap_or(0)
    }

    /// Number of distinct commenters.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// True when nobody has commented.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total comments across all commenters.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Rows sorted by comment count descending, then login ascending.
    pub fn sorted_rows(&self) -> Vec<CommenterRow> {
        let mut rows: Vec<CommenterRow> = self
            .counts
            .iter()
            .map(|(login, &count)| CommenterRow {
                commenter: login.clone(),
                comments: count,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.comments
                .cmp(&a.comments)
                .then_with(|| a.commenter.cmp(&b.commenter))
        });
        rows
    }
}

impl FromIterator<(String, u64)> for ContributorTally {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut tally = Self::new();
        for (login, count) in iter {
            tally.record(&login, count);
        }
        tally
    }
}

fn tally_one(client: &ForgeClient, pr: u64) -> ContributorTally {
    let mut partial = ContributorTally::new();

    match client.fetch_issue_comments(pr) {
        Ok(comments) if comments.is_empty() => tracing::info!(pr, "no pr comments"),
        Ok(comments) => {
            tracing::debug!(pr, count = comments.len(), "pr comments");
            partial.record_comments(&comments);
        }
        Err(e) => tracing::warn!(pr, error = %e, "could not fetch pr comments"),
    }

    match client.fetch_review_comments(pr) {
        Ok(comments) if comments.is_empty() => tracing::info!(pr, "no review comments"),
        Ok(comments) => {
            tracing::debug!(pr, count = comments.len(), "review comments");
            partial.record_comments(&comments);
        }
        Err(e) => tracing::warn!(pr, error = %e, "could not fetch review comments"),
    }

    partial
}

/// Tallies comment authors over `pr_numbers`, `concurrency` pull requests at
/// a time.
///
/// Failed fetches are logged with the pull request number and skipped; the
/// only error returned is a failure to build the worker pool.
#[instrument(skip(client, pr_numbers), fields(prs = pr_numbers.len()))]
pub fn tally(
    pr_numbers: &[u64],
    client: &ForgeClient,
    concurrency: usize,
) -> Result<ContributorTally> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .thread_name(|i| format!("comment-fetch-{i}"))
        .build()?;

    let result = pool.install(|| {
        pr_numbers
            .par_iter()
            .map(|&pr| tally_one(client, pr))
            .reduce(ContributorTally::new, |mut acc, partial| {
                acc.merge(partial);
                acc
            })
    });

    tracing::info!(
        commenters = result.len(),
        comments = result.total(),
        "comment tally complete"
    );
    Ok(result)
}
