//! Release delta analysis.
//!
//! This module derives per-release statistics by comparing two branch
//! references through the repository history:
//!
//! - **Commit count**: non-merge commits reachable from `branch` but not from
//!   `previous_branch`
//! - **Merge count**: commits in the same range whose subject records a pull
//!   request merge (see [`crate::merge_subject`])
//! - **Authors**: distinct author names of the non-merge commits in the range
//! - **New authors**: authors in the range that never authored a non-merge
//!   commit reachable from the merge-base of the mainline branch and
//!   `previous_branch`
//! - **Top committers**: the ten authors with the most non-merge commits in
//!   the range, ordered by commit count descending and then by author name
//!   ascending
//!
//! Authors are compared by exact display name. Two spellings of the same
//! person count as two authors.
//!
//! # Errors
//!
//! Any reference that does not resolve fails the whole release with
//! `UnresolvedReference`; no partial [`ReleaseStats`] is produced.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Result;
use crate::history::{GitHistory, History, RevisionRange};
use crate::merge_subject::{MergeNumberParser, MergeSubjectParser};

/// Number of committers kept in [`ReleaseStats::top_committers`].
pub const TOP_COMMITTERS: usize = 10;

/// A release and the branch it is measured against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseDefinition {
    /// Release name, e.g. `0.15`.
    pub name: String,
    /// Branch of the preceding release.
    pub previous_branch: String,
    /// Branch of this release.
    pub branch: String,
}

/// Commits attributed to one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitterCount {
    /// Author display name.
    pub author: String,
    /// Non-merge commits in the range.
    pub commits: usize,
}

/// Statistics for one release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStats {
    /// Release name.
    pub release: String,
    /// Non-merge commits in the release.
    pub commit_count: usize,
    /// Pull request merges in the release.
    pub merge_count: usize,
    /// Distinct authors in the release.
    pub author_count: usize,
    /// Authors with no earlier commit on the mainline.
    pub new_author_count: usize,
    /// At most [`TOP_COMMITTERS`] authors, most commits first.
    pub top_committers: Vec<CommitterCount>,
}

/// Ranks authors by commit count, descending, ties by name ascending.
pub fn rank_committers(counts: &HashMap<String, usize>, limit: usize) -> Vec<CommitterCount> {
    let mut ranked: Vec<CommitterCount> = counts
        .iter()
        .map(|(author, &commits)| CommitterCount {
            author: author.clone(),
            commits,
        })
        .collect();
    ranked.sort_by(|a, b| b.commits.cmp(&a.commits).then_with(|| a.author.cmp(&b.author)));
    ranked.truncate(limit);
    ranked
}

/// Computes [`ReleaseStats`] from a [`History`].
#[derive(Clone)]
pub struct ReleaseDeltaAnalyzer {
    mainline_branch: String,
    parser: Arc<dyn MergeSubjectParser>,
}

impl std::fmt::Debug for ReleaseDeltaAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseDeltaAnalyzer")
            .field("mainline_branch", &self.mainline_branch)
            .finish_non_exhaustive()
    }
}

impl ReleaseDeltaAnalyzer {
    /// Analyzer measuring new authors against `mainline_branch`.
    pub fn new(mainline_branch: impl Into<String>, parser: Arc<dyn MergeSubjectParser>) -> Self {
        Self {
            mainline_branch: mainline_branch.into(),
            parser,
        }
    }

    /// Analyzer using the default `Merge #N` subject parser.
    pub fn with_default_parser(mainline_branch: impl Into<String>) -> Result<Self> {
        Ok(Self::new(mainline_branch, Arc::new(MergeNumberParser::new()?)))
    }

    /// The branch new authors are measured against.
    pub fn mainline_branch(&self) -> &str {
        &self.mainline_branch
    }

    /// Analyzes one release.
    #[instrument(skip(self, history), fields(release = %release.name))]
    pub fn analyze<H: History + ?Sized>(
        &self,
        history: &H,
        release: &ReleaseDefinition,
    ) -> Result<ReleaseStats> {
        let previous = history.resolve(&release.previous_branch)?;
        let current = history.resolve(&release.branch)?;
        let mainline = history.resolve(&self.mainline_branch)?;

        let range = history.list_commits(&RevisionRange::between(previous.clone(), current))?;

        let mut per_author: HashMap<String, usize> = HashMap::new();
        let mut merge_count = 0;
        let mut merged_pull_requests = Vec::new();
        for commit in &range {
            if self.parser.is_merge(&commit.subject) {
                merge_count += 1;
                if let Some(number) = self.parser.merged_pull_request(&commit.subject) {
                    merged_pull_requests.push(number);
                }
            }
            if !commit.is_merge() {
                *per_author.entry(commit.author.clone()).or_insert(0) += 1;
            }
        }
        let commit_count: usize = per_author.values().sum();
        merged_pull_requests.sort_unstable();
        tracing::debug!(?merged_pull_requests, "merged pull requests in range");

        let base = history.merge_base(&mainline, &previous)?;
        let old_authors = history.commit_authors(&RevisionRange::ancestry_of(base))?;
        let authors: BTreeSet<&String> = per_author.keys().collect();
        let new_authors: Vec<&&String> = authors
            .iter()
            .filter(|author| !old_authors.contains(author.as_str()))
            .collect();
        tracing::debug!(?new_authors, "first-time authors");

        let stats = ReleaseStats {
            release: release.name.clone(),
            commit_count,
            merge_count,
            author_count: authors.len(),
            new_author_count: new_authors.len(),
            top_committers: rank_committers(&per_author, TOP_COMMITTERS),
        };
        tracing::info!(
            commits = stats.commit_count,
            authors = stats.author_count,
            new_authors = stats.new_author_count,
            merges = stats.merge_count,
            "release analyzed"
        );
        Ok(stats)
    }
}

/// Analyzes `release` in the git repository at `repo_path` with the default
/// merge subject parser.
pub fn analyze_release(
    repo_path: &Path,
    release: &ReleaseDefinition,
    mainline_branch: &str,
) -> Result<ReleaseStats> {
    let history = GitHistory::open(repo_path)?;
    ReleaseDeltaAnalyzer::with_default_parser(mainline_branch)?.analyze(&history, release)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReleaseStatsError;
    use crate::history::MemoryHistory;

    /// ```text
    /// a1 - a2 - t14                          (0.14)
    ///        \
    ///         a3 ---- mg1 ---- mg2 - rv - e1 - e2   (master, 0.15)
    ///          \      /   \    /
    ///           `- f1     `- f2
    /// ```
    fn fixture() -> MemoryHistory {
        let mut h = MemoryHistory::new();
        let a1 = h.commit("a1", "Alice", "Initial commit", &[]);
        let a2 = h.commit("a2", "Bob", "Add foo", &[&a1]);
        let t14 = h.commit("t14", "Bob", "Backport fix", &[&a2]);
        let f1 = h.commit("f1", "Carol", "Feature work", &[&a2]);
        let a3 = h.commit("a3", "Alice", "Refactor", &[&a2]);
        let mg1 = h.commit("mg1", "Alice", "Merge #101: Feature work", &[&a3, &f1]);
        let f2 = h.commit("f2", "Dave", "First patch", &[&mg1]);
        let mg2 = h.commit("mg2", "Bob", "Merge #102: First patch", &[&mg1, &f2]);
        let rv = h.commit("rv", "Alice", "Revert \"Merge #101: Feature work\"", &[&mg2]);
        let e1 = h.commit("e1", "Erin", "Docs", &[&rv]);
        let e2 = h.commit("e2", "Alice", "More docs", &[&e1]);
        h.set_ref("0.14", &t14);
        h.set_ref("0.15", &e2);
        h.set_ref("master", &e2);
        h
    }

    fn release(previous: &str, branch: &str) -> ReleaseDefinition {
        ReleaseDefinition {
            name: "0.15".to_string(),
            previous_branch: previous.to_string(),
            branch: branch.to_string(),
        }
    }

    fn analyzer() -> ReleaseDeltaAnalyzer {
        ReleaseDeltaAnalyzer::with_default_parser("master").unwrap()
    }

    #[test]
    fn test_analyze_matches_hand_computed_counts() {
        let stats = analyzer().analyze(&fixture(), &release("0.14", "0.15")).unwrap();

        assert_eq!(stats.release, "0.15");
        assert_eq!(stats.commit_count, 6, "a3 f1 f2 rv e1 e2");
        assert_eq!(stats.merge_count, 2, "mg1 and mg2; the revert does not count");
        assert_eq!(stats.author_count, 4, "Alice Carol Dave Erin");
        assert_eq!(stats.new_author_count, 3, "only Alice predates the merge-base");
    }

    #[test]
    fn test_top_committers_sorted_with_alphabetical_ties() {
        let stats = analyzer().analyze(&fixture(), &release("0.14", "0.15")).unwrap();

        let top: Vec<(&str, usize)> = stats
            .top_committers
            .iter()
            .map(|c| (c.author.as_str(), c.commits))
            .collect();
        assert_eq!(top, vec![("Alice", 3), ("Carol", 1), ("Dave", 1), ("Erin", 1)]);
    }

    #[test]
    fn test_merge_committer_is_not_an_author() {
        let stats = analyzer().analyze(&fixture(), &release("0.14", "0.15")).unwrap();
        assert!(stats.top_committers.iter().all(|c| c.author != "Bob"));
    }

    #[test]
    fn test_empty_range_yields_zero_counts() {
        let stats = analyzer().analyze(&fixture(), &release("0.15", "0.15")).unwrap();
        assert_eq!(stats.commit_count, 0);
        assert_eq!(stats.merge_count, 0);
        assert_eq!(stats.author_count, 0);
        assert_eq!(stats.new_author_count, 0);
        assert!(stats.top_committers.is_empty());
    }

    #[test]
    fn test_unresolved_branch_fails_whole_release() {
        let err = analyzer()
            .analyze(&fixture(), &release("0.14", "0.16"))
            .unwrap_err();
        assert!(
            matches!(err, ReleaseStatsError::UnresolvedReference { ref reference, .. } if reference == "0.16")
        );
    }

    #[test]
    fn test_unresolved_mainline_fails_release() {
        let analyzer = ReleaseDeltaAnalyzer::with_default_parser("main").unwrap();
        let err = analyzer.analyze(&fixture(), &release("0.14", "0.15")).unwrap_err();
        assert!(matches!(err, ReleaseStatsError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_rank_committers_truncates_to_limit() {
        let counts: HashMap<String, usize> = (0..12)
            .map(|i| (format!("author{i:02}"), 12 - i))
            .collect();
        let ranked = rank_committers(&counts, TOP_COMMITTERS);
        assert_eq!(ranked.len(), 10);
        assert_eq!(ranked[0].author, "author00");
        assert!(ranked.windows(2).all(|w| w[0].commits >= w[1].commits));
    }

    #[test]
    fn test_custom_parser_changes_merge_count_only() {
        struct NeverMerged;
        impl MergeSubjectParser for NeverMerged {
            fn is_merge(&self, _subject: &str) -> bool {
                false
            }
        }
        let analyzer = ReleaseDeltaAnalyzer::new("master", Arc::new(NeverMerged));
        let stats = analyzer.analyze(&fixture(), &release("0.14", "0.15")).unwrap();
        assert_eq!(stats.merge_count, 0);
        assert_eq!(stats.commit_count, 6);
    }

    #[test]
    fn test_pattern_without_number_group_counts_merges() {
        let parser = MergeNumberParser::with_pattern(r"^Merge #\d+").unwrap();
        let analyzer = ReleaseDeltaAnalyzer::new("master", Arc::new(parser));
        let stats = analyzer.analyze(&fixture(), &release("0.14", "0.15")).unwrap();
        assert_eq!(stats.merge_count, 2, "merges are counted by match, not by number");
    }

    #[test]
    fn test_release_stats_serializes_to_json() {
        let stats = analyzer().analyze(&fixture(), &release("0.14", "0.15")).unwrap();
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"new_author_count\":3"));
        assert!(json.contains("\"top_committers\""));
    }
}
