//! Recognizing pull request merges from commit subjects.
//!
//! Merge commits in the tracked repository carry subjects of the form
//! `Merge #1234: title`. The format is a convention of the project's merge
//! tooling, not something git guarantees, so parsing sits behind the
//! [`MergeSubjectParser`] trait and can be replaced by a different strategy
//! without touching the analyzer.

use regex::Regex;

use crate::error::Result;

/// Default pattern; the first capture group, when present, is the pull
/// request number.
pub const DEFAULT_MERGE_PATTERN: &str = r"Merge #(\d+)";

/// Subjects containing this marker are reverts and never count as merges.
const REVERT_MARKER: &str = "Revert \"Merge";

/// Decides whether a commit subject records a pull request merge.
pub trait MergeSubjectParser: Send + Sync {
    /// True when `subject` records a pull request merge.
    fn is_merge(&self, subject: &str) -> bool;

    /// The merged pull request number, when the subject carries one that
    /// fits a `u64`. Only used for logging; merges are counted by
    /// [`Self::is_merge`].
    fn merged_pull_request(&self, _subject: &str) -> Option<u64> {
        None
    }
}

/// Regex-driven [`MergeSubjectParser`].
#[derive(Debug, Clone)]
pub struct MergeNumberParser {
    pattern: Regex,
}

impl MergeNumberParser {
    /// Parser for [`DEFAULT_MERGE_PATTERN`].
    pub fn new() -> Result<Self> {
        Self::with_pattern(DEFAULT_MERGE_PATTERN)
    }

    /// Parser for a custom pattern.
    ///
    /// Any match counts as a merge. The first capture group, if the pattern
    /// has one, is read as the pull request number.
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl MergeSubjectParser for MergeNumberParser {
    fn is_merge(&self, subject: &str) -> bool {
        !subject.contains(REVERT_MARKER) && self.pattern.is_match(subject)
    }

    fn merged_pull_request(&self, subject: &str) -> Option<u64> {
        if subject.contains(REVERT_MARKER) {
            return None;
        }
        self.pattern
            .captures(subject)
            .and_then(|caps| caps.get(1))
            .and_then(|number| number.as_str().parse().ok())
    }
}
