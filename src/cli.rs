//! Command-line interface definitions.
//!
//! Every option that also exists in the configuration file is optional here;
//! a value given on the command line overrides the file, see
//! [`crate::config`].

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Release-over-release contribution statistics.
#[derive(Debug, Parser)]
#[command(name = "release-stats", version, about)]
pub struct Cli {
    /// Configuration file. Defaults to the nearest `ReleaseStats.toml`,
    /// `.release-stats.toml` or `release-stats.toml`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Which statistics to produce.
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands, one per statistics step.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Per-release commit, merge and author statistics.
    Releases(ReleasesArgs),
    /// Comment counts per author over the pull list.
    Commenters(CommentersArgs),
    /// Closed pull requests merged into the mainline branch.
    Merged(MergedArgs),
    /// Show the forge API rate-limit status.
    RateLimit(ForgeArgs),
    /// Run every step.
    All(AllArgs),
}

/// Forge overrides shared by subcommands that talk to the API.
#[derive(Debug, Clone, Default, Args)]
pub struct ForgeArgs {
    /// Repository owner on the forge.
    #[arg(long)]
    pub owner: Option<String>,

    /// Repository name on the forge.
    #[arg(long)]
    pub repo: Option<String>,

    /// Forge API root URL.
    #[arg(long)]
    pub api_url: Option<String>,
}

/// Output formats for release statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReleasesOutputFormat {
    /// Table on the terminal.
    #[default]
    Table,
    /// One summary paragraph per release.
    Text,
    /// JSON array.
    Json,
    /// YAML sequence.
    Yaml,
    /// One CSV row per release.
    Csv,
}

/// Output formats for comment tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum CommentersOutputFormat {
    /// `commenter,comments` CSV.
    #[default]
    Csv,
    /// Table on the terminal.
    Table,
    /// JSON array.
    Json,
}

/// Output formats for merged pull requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum MergedOutputFormat {
    /// Table on the terminal.
    #[default]
    Table,
    /// JSON array.
    Json,
}

/// Arguments for `releases`.
#[derive(Debug, Clone, Default, Args)]
pub struct ReleasesArgs {
    /// Local git repository.
    #[arg(long)]
    pub repository: Option<PathBuf>,

    /// Branch new authors are measured against.
    #[arg(long)]
    pub mainline_branch: Option<String>,

    /// Releases analyzed at once.
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = ReleasesOutputFormat::Table)]
    pub output: ReleasesOutputFormat,

    /// Write the report here instead of stdout.
    #[arg(long)]
    pub output_file: Option<PathBuf>,
}

/// Arguments for `commenters`.
#[derive(Debug, Clone, Default, Args)]
pub struct CommentersArgs {
    /// File with one pull request number per line.
    #[arg(long)]
    pub pull_list: Option<PathBuf>,

    /// Pull requests whose comments are fetched at once.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = CommentersOutputFormat::Csv)]
    pub output: CommentersOutputFormat,

    /// Write the report here instead of stdout.
    #[arg(long)]
    pub output_file: Option<PathBuf>,

    /// Forge overrides.
    #[command(flatten)]
    pub forge: ForgeArgs,
}

/// Arguments for `merged`.
#[derive(Debug, Clone, Default, Args)]
pub struct MergedArgs {
    /// Integration branch pull requests must be merged into.
    #[arg(long)]
    pub mainline_branch: Option<String>,

    /// Highest pull request page to request.
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Pages requested at once.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = MergedOutputFormat::Table)]
    pub output: MergedOutputFormat,

    /// Forge overrides.
    #[command(flatten)]
    pub forge: ForgeArgs,
}

/// Arguments for `all`.
#[derive(Debug, Clone, Default, Args)]
pub struct AllArgs {
    /// Local git repository.
    #[arg(long)]
    pub repository: Option<PathBuf>,

    /// Mainline branch.
    #[arg(long)]
    pub mainline_branch: Option<String>,

    /// File with one pull request number per line.
    #[arg(long)]
    pub pull_list: Option<PathBuf>,

    /// Releases analyzed at once.
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Output format for the release statistics.
    #[arg(long, value_enum, default_value_t = ReleasesOutputFormat::Table)]
    pub output: ReleasesOutputFormat,

    /// Write the commenter CSV here instead of stdout.
    #[arg(long)]
    pub commenters_output: Option<PathBuf>,

    /// Forge overrides.
    #[command(flatten)]
    pub forge: ForgeArgs,
}
