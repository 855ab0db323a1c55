//! Read-only access to version-control history.
//!
//! The release delta analyzer only needs four questions answered: what
//! commit does a reference name, which commits are in a range, where do two
//! lines of history meet, and who authored the commits in a range. The
//! [`History`] trait captures exactly that so the analyzer can run against a
//! real repository ([`GitHistory`], backed by `git2`) or an in-memory commit
//! graph ([`MemoryHistory`]).

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};

use git2::{Oid, Repository, Sort};
use tracing::instrument;

use crate::error::{ReleaseStatsError, Result};

/// A commit identifier (full hex object id for git).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(String);

impl CommitId {
    /// Wraps a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Commits reachable from `include` but not from `exclude`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRange {
    /// Tip of the range.
    pub include: CommitId,
    /// Commits reachable from here are left out.
    pub exclude: Option<CommitId>,
}

impl RevisionRange {
    /// `exclude..include`.
    pub fn between(exclude: CommitId, include: CommitId) -> Self {
        Self {
            include,
            exclude: Some(exclude),
        }
    }

    /// Everything reachable from `include`.
    pub fn ancestry_of(include: CommitId) -> Self {
        Self {
            include,
            exclude: None,
        }
    }
}

/// The parts of a commit the analyzer looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    /// Commit id.
    pub id: CommitId,
    /// Author display name, verbatim.
    pub author: String,
    /// First line of the message.
    pub subject: String,
    /// Number of parents.
    pub parent_count: usize,
}

impl CommitSummary {
    /// Two or more parents.
    pub fn is_merge(&self) -> bool {
        self.parent_count >= 2
    }
}

/// Narrow read-only view over a repository's history.
pub trait History {
    /// Resolves a branch, tag or revision expression to a commit.
    ///
    /// Fails with `UnresolvedReference` when nothing matches.
    fn resolve(&self, reference: &str) -> Result<CommitId>;

    /// Lists every commit in `range`, merges included.
    fn list_commits(&self, range: &RevisionRange) -> Result<Vec<CommitSummary>>;

    /// The best common ancestor of `a` and `b`.
    fn merge_base(&self, a: &CommitId, b: &CommitId) -> Result<CommitId>;

    /// Distinct author names of the non-merge commits in `range`.
    fn commit_authors(&self, range: &RevisionRange) -> Result<BTreeSet<String>> {
        Ok(self
            .list_commits(range)?
            .into_iter()
            .filter(|c| !c.is_merge())
            .map(|c| c.author)
            .collect())
    }
}

/// [`History`] over a local git repository.
pub struct GitHistory {
    repo: Repository,
    path: PathBuf,
}

impl fmt::Debug for GitHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHistory").field("path", &self.path).finish()
    }
}

impl GitHistory {
    /// Opens the repository at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path).map_err(|e| ReleaseStatsError::GitError {
            operation: "open repository".to_string(),
            repo_path: Some(path.to_path_buf()),
            source: Some(Box::new(e)),
        })?;
        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    /// Path the repository was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn failure(&self, operation: impl Into<String>, err: git2::Error) -> ReleaseStatsError {
        ReleaseStatsError::GitError {
            operation: operation.into(),
            repo_path: Some(self.path.clone()),
            source: Some(Box::new(err)),
        }
    }

    fn oid(&self, id: &CommitId) -> Result<Oid> {
        Oid::from_str(id.as_str()).map_err(|e| self.failure(format!("parse commit id {}", id), e))
    }
}

impl History for GitHistory {
    fn resolve(&self, reference: &str) -> Result<CommitId> {
        let unresolved = |e: git2::Error| ReleaseStatsError::UnresolvedReference {
            reference: reference.to_string(),
            source: Some(Box::new(e)),
        };
        let object = self.repo.revparse_single(reference).map_err(unresolved)?;
        let commit = object.peel_to_commit().map_err(unresolved)?;
        Ok(CommitId::new(commit.id().to_string()))
    }

    #[instrument(skip(self), level = "debug")]
    fn list_commits(&self, range: &RevisionRange) -> Result<Vec<CommitSummary>> {
        let mut revwalk = self
            .repo
            .revwalk()
            .map_err(|e| self.failure("create revwalk", e))?;
        revwalk
            .set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
            .map_err(|e| self.failure("sort revwalk", e))?;
        revwalk
            .push(self.oid(&range.include)?)
            .map_err(|e| self.failure(format!("walk from {}", range.include), e))?;
        if let Some(exclude) = &range.exclude {
            revwalk
                .hide(self.oid(exclude)?)
                .map_err(|e| self.failure(format!("hide {}", exclude), e))?;
        }

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid.map_err(|e| self.failure("walk history", e))?;
            let commit = self
                .repo
                .find_commit(oid)
                .map_err(|e| self.failure(format!("read commit {}", oid), e))?;
            commits.push(CommitSummary {
                id: CommitId::new(oid.to_string()),
                author: String::from_utf8_lossy(commit.author().name_bytes()).into_owned(),
                subject: commit.summary().unwrap_or_default().to_string(),
                parent_count: commit.parent_count(),
            });
        }
        tracing::debug!(count = commits.len(), "listed commits");
        Ok(commits)
    }

    fn merge_base(&self, a: &CommitId, b: &CommitId) -> Result<CommitId> {
        let oid = self
            .repo
            .merge_base(self.oid(a)?, self.oid(b)?)
            .map_err(|e| self.failure(format!("merge-base {} {}", a, b), e))?;
        Ok(CommitId::new(oid.to_string()))
    }
}

#[derive(Debug, Clone)]
struct MemoryCommit {
    author: String,
    subject: String,
    parents: Vec<CommitId>,
}

/// In-memory commit graph implementing [`History`].
///
/// Commits are listed newest-first in creation order.
#[derive(Debug, Default, Clone)]
pub struct MemoryHistory {
    commits: HashMap<CommitId, MemoryCommit>,
    order: Vec<CommitId>,
    refs: HashMap<String, CommitId>,
}

impl MemoryHistory {
    /// An empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a commit and returns its id. Parents must already exist.
    pub fn commit(&mut self, id: &str, author: &str, subject: &str, parents: &[&CommitId]) -> CommitId {
        let commit_id = CommitId::new(id);
        self.commits.insert(
            commit_id.clone(),
            MemoryCommit {
                author: author.to_string(),
                subject: subject.to_string(),
                parents: parents.iter().map(|p| (*p).clone()).collect(),
            },
        );
        self.order.push(commit_id.clone());
        commit_id
    }

    /// Points `name` at `target`.
    pub fn set_ref(&mut self, name: &str, target: &CommitId) {
        self.refs.insert(name.to_string(), target.clone());
    }

    fn ancestry(&self, tip: &CommitId) -> Result<HashSet<CommitId>> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([tip.clone()]);
        while let Some(id) = queue.pop_front() {
            let commit = self
                .commits
                .get(&id)
                .ok_or_else(|| ReleaseStatsError::git_error(format!("unknown commit {}", id)))?;
            if seen.insert(id) {
                queue.extend(commit.parents.iter().cloned());
            }
        }
        Ok(seen)
    }
}

impl History for MemoryHistory {
    fn resolve(&self, reference: &str) -> Result<CommitId> {
        if let Some(id) = self.refs.get(reference) {
            return Ok(id.clone());
        }
        let id = CommitId::new(reference);
        if self.commits.contains_key(&id) {
            return Ok(id);
        }
        Err(ReleaseStatsError::unresolved_reference(reference))
    }

    fn list_commits(&self, range: &RevisionRange) -> Result<Vec<CommitSummary>> {
        let included = self.ancestry(&range.include)?;
        let excluded = match &range.exclude {
            Some(exclude) => self.ancestry(exclude)?,
            None => HashSet::new(),
        };
        Ok(self
            .order
            .iter()
            .rev()
            .filter(|id| included.contains(*id) && !excluded.contains(*id))
            .map(|id| {
                let commit = &self.commits[id];
                CommitSummary {
                    id: id.clone(),
                    author: commit.author.clone(),
                    subject: commit.subject.clone(),
                    parent_count: commit.parents.len(),
                }
            })
            .collect())
    }

    fn merge_base(&self, a: &CommitId, b: &CommitId) -> Result<CommitId> {
        let from_a = self.ancestry(a)?;
        let from_b = self.ancestry(b)?;
        let common: Vec<&CommitId> = self
            .order
            .iter()
            .filter(|id| from_a.contains(*id) && from_b.contains(*id))
            .collect();
        // The best common ancestor is not an ancestor of any other common one.
        for candidate in common.iter().rev() {
            let dominated = common.iter().any(|other| {
                other != candidate
                    && self
                        .ancestry(other)
                        .map(|anc| anc.contains(*candidate))
                        .unwrap_or(false)
            });
            if !dominated {
                return Ok((*candidate).clone());
            }
        }
        Err(ReleaseStatsError::git_error(format!(
            "no merge-base between {} and {}",
            a, b
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// master: a - b - d - m(merge c)
    ///              \- c (feature)
    fn graph() -> (MemoryHistory, Vec<CommitId>) {
        let mut h = MemoryHistory::new();
        let a = h.commit("a", "Alice", "Initial", &[]);
        let b = h.commit("b", "Bob", "Second", &[&a]);
        let c = h.commit("c", "Carol", "Feature", &[&b]);
        let d = h.commit("d", "Alice", "Third", &[&b]);
        let m = h.commit("m", "Alice", "Merge #5: feature", &[&d, &c]);
        h.set_ref("master", &m);
        h.set_ref("feature", &c);
        (h, vec![a, b, c, d, m])
    }

    #[test]
    fn test_resolve_refs_and_ids() {
        let (h, ids) = graph();
        assert_eq!(h.resolve("master").unwrap(), ids[4]);
        assert_eq!(h.resolve("b").unwrap(), ids[1]);
        let err = h.resolve("nope").unwrap_err();
        assert!(matches!(err, ReleaseStatsError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_list_commits_excludes_hidden_ancestry() {
        let (h, ids) = graph();
        let range = RevisionRange::between(ids[1].clone(), ids[4].clone());
        let listed: Vec<String> = h
            .list_commits(&range)
            .unwrap()
            .into_iter()
            .map(|c| c.id.to_string())
            .collect();
        assert_eq!(listed, vec!["m", "d", "c"]);
    }

    #[test]
    fn test_commit_authors_skip_merges() {
        let (h, ids) = graph();
        let range = RevisionRange::between(ids[1].clone(), ids[4].clone());
        let authors = h.commit_authors(&range).unwrap();
        assert_eq!(
            authors.into_iter().collect::<Vec<_>>(),
            vec!["Alice".to_string(), "Carol".to_string()]
        );
    }

    #[test]
    fn test_merge_base_picks_nearest_common_ancestor() {
        let (h, ids) = graph();
        assert_eq!(h.merge_base(&ids[3], &ids[2]).unwrap(), ids[1]);
        assert_eq!(h.merge_base(&ids[4], &ids[2]).unwrap(), ids[2]);
    }

    #[test]
    fn test_merge_summary_flags_two_parents() {
        let (h, ids) = graph();
        let all = h.list_commits(&RevisionRange::ancestry_of(ids[4].clone())).unwrap();
        let merges: Vec<&CommitSummary> = all.iter().filter(|c| c.is_merge()).collect();
        assert_eq!(merges.len(), 1);
        assert_eq!(merges[0].subject, "Merge #5: feature");
    }

    #[test]
    fn test_git_history_open_fails_outside_repository() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let err = GitHistory::open(dir.path()).unwrap_err();
        assert!(matches!(err, ReleaseStatsError::GitError { .. }));
    }
}
