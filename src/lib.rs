//! # release-stats
//!
//! Release-over-release contribution statistics for a project hosted on a
//! GitHub-compatible forge:
//!
//! - **Release deltas**: commits, pull request merges, authors and first-time
//!   authors between two release branches, plus the most prolific committers
//! - **Merged pull requests**: closed pull requests merged into the mainline
//! - **Commenters**: comment counts per author over a list of pull requests
//!
//! ## Architecture
//!
//! - [`forge`] - forge API client with injected retry policy and transport
//! - [`pull_requests`] - concurrent pagination over closed pull requests
//! - [`history`] - read-only commit history (`git2` or in memory)
//! - [`merge_subject`] - recognises pull request merges in commit subjects
//! - [`release_delta`] - per-release statistics
//! - [`contributor_tally`] - comment counts per author
//! - [`orchestrator`] - runs the steps and collects a [`RunReport`]
//! - [`reporting`] - table, text, JSON, YAML and CSV rendering
//! - [`config`] and [`cli`] - TOML configuration merged with CLI arguments
//! - [`error`] - the crate error type
//!
//! ## Usage as a Library
//!
//! ```rust,no_run
//! use release_stats::{ReleaseDefinition, analyze_release};
//! use std::path::Path;
//!
//! # fn main() -> release_stats::Result<()> {
//! let release = ReleaseDefinition {
//!     name: "0.15".to_string(),
//!     previous_branch: "0.14".to_string(),
//!     branch: "0.15".to_string(),
//! };
//! let stats = analyze_release(Path::new("."), &release, "master")?;
//! println!("{} commits from {} authors", stats.commit_count, stats.author_count);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod contributor_tally;
pub mod error;
pub mod forge;
pub mod history;
pub mod merge_subject;
pub mod orchestrator;
pub mod pull_requests;
pub mod release_delta;
pub mod reporting;

pub use crate::cli::{
    AllArgs, Cli, Commands, CommentersArgs, CommentersOutputFormat, ForgeArgs, MergedArgs,
    MergedOutputFormat, ReleasesArgs, ReleasesOutputFormat,
};
pub use crate::config::{
    ForgeConfig, GeneralConfig, ReleaseStatsConfig, load_config, load_pull_list,
    parse_pull_list,
};
pub use crate::contributor_tally::{ContributorTally, tally};
pub use crate::error::{ReleaseStatsError as Error, Result};
pub use crate::forge::{
    AuthMode, Credentials, ForgeClient, ForgeSettings, RateLimitStatus, RetryPolicy,
};
pub use crate::history::{GitHistory, History, MemoryHistory};
pub use crate::merge_subject::{MergeNumberParser, MergeSubjectParser};
pub use crate::orchestrator::{RunReport, RunSettings, run_all};
pub use crate::pull_requests::{PageFetchOptions, PullRequestRow, fetch_all_closed_prs};
pub use crate::release_delta::{
    ReleaseDefinition, ReleaseDeltaAnalyzer, ReleaseStats, analyze_release,
};
