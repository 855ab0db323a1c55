//! Release statistics computed against a real git repository.
//!
//! The fixture is built with git2 in a temporary directory:
//!
//! ```text
//! a1 - a2 - t14                                  (0.14)
//!        \
//!         a3 ---- mg1 ---- mg2 - rv - e1 - e2    (master, 0.15)
//!          \      /   \    /
//!           `- f1     `- f2
//! ```

use git2::{Oid, Repository, Signature, Time};
use release_stats::orchestrator::{RunSettings, analyze_releases};
use release_stats::{Error, ReleaseDefinition, analyze_release};
use tempfile::TempDir;

struct Fixture {
    repo: Repository,
    clock: i64,
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let repo = Repository::init(dir.path()).expect("Failed to init repository");
        Self {
            repo,
            clock: 1_480_000_000,
            dir,
        }
    }

    fn path(&self) -> &std::path::Path {
        self.dir.path()
    }

    fn commit(&mut self, author: &str, subject: &str, parents: &[Oid]) -> Oid {
        self.clock += 60;
        let email = format!("{}@example.com", author.to_lowercase());
        let sig = Signature::new(author, &email, &Time::new(self.clock, 0)).unwrap();
        let tree_id = self.repo.treebuilder(None).unwrap().write().unwrap();
        let tree = self.repo.find_tree(tree_id).unwrap();
        let parents: Vec<git2::Commit<'_>> = parents
            .iter()
            .map(|id| self.repo.find_commit(*id).unwrap())
            .collect();
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        let message = format!("{subject}\n\nbody text\n");
        self.repo
            .commit(None, &sig, &sig, &message, &tree, &parent_refs)
            .unwrap()
    }

    fn branch(&self, name: &str, target: Oid) {
        self.repo
            .reference(&format!("refs/heads/{name}"), target, true, "fixture")
            .unwrap();
    }
}

fn build_fixture() -> Fixture {
    let mut f = Fixture::new();
    let a1 = f.commit("Alice", "Initial commit", &[]);
    let a2 = f.commit("Bob", "Add foo", &[a1]);
    let t14 = f.commit("Bob", "Backport fix", &[a2]);
    let f1 = f.commit("Carol", "Feature work", &[a2]);
    let a3 = f.commit("Alice", "Refactor", &[a2]);
    let mg1 = f.commit("Alice", "Merge #101: Feature work", &[a3, f1]);
    let f2 = f.commit("Dave", "First patch", &[mg1]);
    let mg2 = f.commit("Bob", "Merge #102: First patch", &[mg1, f2]);
    let rv = f.commit("Alice", "Revert \"Merge #101: Feature work\"", &[mg2]);
    let e1 = f.commit("Erin", "Docs", &[rv]);
    let e2 = f.commit("Alice", "More docs", &[e1]);
    f.branch("master", e2);
    f.branch("0.14", t14);
    f.branch("0.15", e2);
    f
}

fn release(name: &str, previous: &str, branch: &str) -> ReleaseDefinition {
    ReleaseDefinition {
        name: name.to_string(),
        previous_branch: previous.to_string(),
        branch: branch.to_string(),
    }
}

#[test]
fn test_git_release_counts_match_hand_computed_values() {
    let fixture = build_fixture();
    let stats = analyze_release(fixture.path(), &release("0.15", "0.14", "0.15"), "master")
        .expect("analysis should succeed");

    assert_eq!(stats.commit_count, 6, "non-merge commits in 0.14..0.15");
    assert_eq!(stats.merge_count, 2, "Merge #101 and #102, revert excluded");
    assert_eq!(stats.author_count, 4);
    assert_eq!(
        stats.new_author_count, 3,
        "Carol, Dave and Erin never committed before the merge-base"
    );

    let top: Vec<(&str, usize)> = stats
        .top_committers
        .iter()
        .map(|c| (c.author.as_str(), c.commits))
        .collect();
    assert_eq!(top, vec![("Alice", 3), ("Carol", 1), ("Dave", 1), ("Erin", 1)]);
}

#[test]
fn test_unknown_branch_is_unresolved_reference() {
    let fixture = build_fixture();
    let err = analyze_release(fixture.path(), &release("0.16", "0.15", "0.16"), "master")
        .expect_err("0.16 does not exist");
    assert!(
        matches!(err, Error::UnresolvedReference { ref reference, .. } if reference == "0.16"),
        "unexpected error: {err:?}"
    );
}

#[test]
fn test_analyze_releases_keeps_order_and_isolates_failures() {
    let fixture = build_fixture();
    let settings = RunSettings {
        repository: fixture.path().to_path_buf(),
        releases: vec![
            release("0.15", "0.14", "0.15"),
            release("0.16", "0.15", "0.16"),
            release("0.14", "0.14", "0.14"),
        ],
        jobs: 3,
        ..RunSettings::default()
    };

    let outcome = analyze_releases(&settings).expect("setup should succeed");

    let names: Vec<&str> = outcome.releases.iter().map(|s| s.release.as_str()).collect();
    assert_eq!(names, vec!["0.15", "0.14"]);
    assert_eq!(outcome.releases[1].commit_count, 0);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].release, "0.16");
    for stats in &outcome.releases {
        assert!(stats.top_committers.len() <= 10);
        assert!(
            stats
                .top_committers
                .windows(2)
                .all(|w| w[0].commits >= w[1].commits),
            "{} top committers must be sorted by commits",
            stats.release
        );
    }
}

#[test]
fn test_top_committers_capped_at_ten() {
    let mut f = Fixture::new();
    let root = f.commit("Root", "root", &[]);
    f.branch("0.1", root);
    let mut tip = root;
    for i in 0..12 {
        let author = format!("Author{i:02}");
        for _ in 0..(12 - i) {
            tip = f.commit(&author, "work", &[tip]);
        }
    }
    f.branch("0.2", tip);
    f.branch("master", tip);

    let stats = analyze_release(f.path(), &release("0.2", "0.1", "0.2"), "master").unwrap();
    assert_eq!(stats.author_count, 12);
    assert_eq!(stats.new_author_count, 12);
    assert_eq!(stats.top_committers.len(), 10);
    assert_eq!(stats.top_committers[0].author, "Author00");
    assert_eq!(stats.top_committers[0].commits, 12);
    assert_eq!(stats.top_committers[9].author, "Author09");
}
