//! Configuration file support for release-stats.
//!
//! Configuration is read from a TOML file and merged with command-line
//! arguments. CLI arguments take precedence over config file values, which
//! take precedence over built-in defaults.
//!
//! ```toml
//! [general]
//! repository = "../servo"
//! mainline_branch = "master"
//! pull_list = "prs.txt"
//!
//! [forge]
//! owner = "servo"
//! repo = "servo"
//!
//! [[releases]]
//! name = "0.15"
//! previous_branch = "0.14"
//! branch = "0.15"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{AllArgs, CommentersArgs, ForgeArgs, MergedArgs, ReleasesArgs};
use crate::contributor_tally::DEFAULT_COMMENT_CONCURRENCY;
use crate::error::{ReleaseStatsError, Result};
use crate::forge::{
    AuthMode, Backoff, Credentials, DEFAULT_API_URL, DEFAULT_MAX_ATTEMPTS, ForgeSettings,
    HttpSettings, RetryPolicy,
};
use crate::merge_subject::DEFAULT_MERGE_PATTERN;
use crate::orchestrator::RunSettings;
use crate::pull_requests::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_CONCURRENCY, PageFetchOptions};
use crate::release_delta::ReleaseDefinition;

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] =
    &["ReleaseStats.toml", ".release-stats.toml", "release-stats.toml"];

/// Environment variable consulted when `forge.client_id` is not set.
pub const CLIENT_ID_ENV: &str = "RELEASE_STATS_CLIENT_ID";

/// Environment variable consulted when `forge.client_secret` is not set.
pub const CLIENT_SECRET_ENV: &str = "RELEASE_STATS_CLIENT_SECRET";

/// Main configuration structure representing a release-stats configuration
/// file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReleaseStatsConfig {
    /// Repository and output settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Forge API settings.
    #[serde(default)]
    pub forge: ForgeConfig,

    /// Releases to analyze, in report order.
    #[serde(default)]
    pub releases: Vec<ReleaseDefinition>,
}

/// General configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Local git repository.
    #[serde(default = "default_repository")]
    pub repository: PathBuf,

    /// Branch new authors are measured against and pull requests are merged
    /// into.
    #[serde(default = "default_mainline_branch")]
    pub mainline_branch: String,

    /// File with one pull request number per line.
    pub pull_list: Option<PathBuf>,

    /// Where the commenter CSV is written. Stdout when unset.
    pub commenters_output: Option<PathBuf>,

    /// Releases analyzed at once. Number of CPUs when unset.
    pub jobs: Option<usize>,

    /// Regex recognising pull request merges in commit subjects. The first
    /// capture group must be the pull request number.
    #[serde(default = "default_merge_subject_pattern")]
    pub merge_subject_pattern: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            mainline_branch: default_mainline_branch(),
            pull_list: None,
            commenters_output: None,
            jobs: None,
            merge_subject_pattern: default_merge_subject_pattern(),
        }
    }
}

fn default_repository() -> PathBuf {
    PathBuf::from(".")
}

fn default_mainline_branch() -> String {
    "master".to_string()
}

fn default_merge_subject_pattern() -> String {
    DEFAULT_MERGE_PATTERN.to_string()
}

/// Backoff strategy names accepted in the config file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Same delay between every attempt.
    #[default]
    Fixed,
    /// Doubling delay capped at `max_backoff_ms`.
    Exponential,
}

/// Forge API configuration.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ForgeConfig {
    /// API root URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Repository owner.
    pub owner: Option<String>,

    /// Repository name.
    pub repo: Option<String>,

    /// OAuth client id. Falls back to `RELEASE_STATS_CLIENT_ID`.
    pub client_id: Option<String>,

    /// OAuth client secret. Falls back to `RELEASE_STATS_CLIENT_SECRET`.
    pub client_secret: Option<String>,

    /// How credentials are attached to requests.
    #[serde(default)]
    pub auth: AuthMode,

    /// Highest pull request page to request.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Pull request pages requested at once.
    #[serde(default = "default_page_concurrency")]
    pub page_concurrency: usize,

    /// Pull requests whose comments are fetched at once.
    #[serde(default = "default_comment_concurrency")]
    pub comment_concurrency: usize,

    /// Attempts per pull request page.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff strategy between attempts.
    #[serde(default)]
    pub backoff: BackoffKind,

    /// Delay after the first failed attempt, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Upper bound for exponential backoff, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// `User-Agent` header override.
    pub user_agent: Option<String>,
}

impl std::fmt::Debug for ForgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForgeConfig")
            .field("api_url", &self.api_url)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("auth", &self.auth)
            .field("max_pages", &self.max_pages)
            .field("page_concurrency", &self.page_concurrency)
            .field("comment_concurrency", &self.comment_concurrency)
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("backoff_ms", &self.backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("timeout_secs", &self.timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            owner: None,
            repo: None,
            client_id: None,
            client_secret: None,
            auth: AuthMode::default(),
            max_pages: default_max_pages(),
            page_concurrency: default_page_concurrency(),
            comment_concurrency: default_comment_concurrency(),
            max_attempts: default_max_attempts(),
            backoff: BackoffKind::default(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            user_agent: None,
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_max_pages() -> u32 {
    DEFAULT_MAX_PAGES
}

fn default_page_concurrency() -> usize {
    DEFAULT_PAGE_CONCURRENCY
}

fn default_comment_concurrency() -> usize {
    DEFAULT_COMMENT_CONCURRENCY
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_timeout_secs() -> u64 {
    30
}

impl ForgeConfig {
    /// Retry policy for the pull request listing.
    pub fn retry_policy(&self) -> RetryPolicy {
        let initial = Duration::from_millis(self.backoff_ms);
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed(initial),
            BackoffKind::Exponential => Backoff::Exponential {
                initial,
                max: Duration::from_millis(self.max_backoff_ms.max(self.backoff_ms)),
            },
        };
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff,
        }
    }

    /// Settings for the HTTP transport.
    pub fn http_settings(&self) -> HttpSettings {
        let mut settings = HttpSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            ..HttpSettings::default()
        };
        if let Some(agent) = &self.user_agent {
            settings.user_agent = agent.clone();
        }
        settings
    }

    /// Resolves credentials from the file, falling back to `lookup` for each
    /// missing half. Both halves are needed; a lone id or secret is an error.
    pub fn credentials_with<F>(&self, lookup: F) -> Result<Option<Credentials>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_id = self.client_id.clone().or_else(|| lookup(CLIENT_ID_ENV));
        let client_secret = self
            .client_secret
            .clone()
            .or_else(|| lookup(CLIENT_SECRET_ENV));
        match (client_id, client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(Some(Credentials {
                client_id,
                client_secret,
            })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(ReleaseStatsError::config_error(format!(
                "forge.client_id is set but no client secret was found (set forge.client_secret or {})",
                CLIENT_SECRET_ENV
            ))),
            (None, Some(_)) => Err(ReleaseStatsError::config_error(format!(
                "forge.client_secret is set but no client id was found (set forge.client_id or {})",
                CLIENT_ID_ENV
            ))),
        }
    }

    /// Resolves credentials, falling back to the process environment.
    pub fn credentials(&self) -> Result<Option<Credentials>> {
        self.credentials_with(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    /// Builds the forge client settings. Owner and repository are required.
    pub fn forge_settings(&self) -> Result<ForgeSettings> {
        let owner = self
            .owner
            .clone()
            .ok_or_else(|| ReleaseStatsError::config_error("forge.owner is not set"))?;
        let repo = self
            .repo
            .clone()
            .ok_or_else(|| ReleaseStatsError::config_error("forge.repo is not set"))?;
        Ok(ForgeSettings {
            api_url: self.api_url.trim_end_matches('/').to_string(),
            owner,
            repo,
            credentials: self.credentials()?,
            auth: self.auth,
            retry: self.retry_policy(),
        })
    }
}

impl ReleaseStatsConfig {
    /// Checks values serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        if self.general.jobs == Some(0) {
            return Err(ReleaseStatsError::config_error(
                "general.jobs must be at least 1",
            ));
        }
        if self.forge.page_concurrency == 0 || self.forge.comment_concurrency == 0 {
            return Err(ReleaseStatsError::config_error(
                "forge.page_concurrency and forge.comment_concurrency must be at least 1",
            ));
        }
        if self.forge.max_attempts == 0 {
            return Err(ReleaseStatsError::config_error(
                "forge.max_attempts must be at least 1",
            ));
        }
        regex::Regex::new(&self.general.merge_subject_pattern)?;
        for release in &self.releases {
            if release.name.trim().is_empty()
                || release.previous_branch.trim().is_empty()
                || release.branch.trim().is_empty()
            {
                return Err(ReleaseStatsError::config_error(format!(
                    "release {:?} needs a name, previous_branch and branch",
                    release.name
                )));
            }
        }
        Ok(())
    }

    /// Resolved run settings.
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            repository: self.general.repository.clone(),
            mainline_branch: self.general.mainline_branch.clone(),
            releases: self.releases.clone(),
            jobs: self.general.jobs.unwrap_or_else(num_cpus::get),
            merge_subject_pattern: self.general.merge_subject_pattern.clone(),
            page_fetch: PageFetchOptions {
                max_pages: self.forge.max_pages,
                concurrency: self.forge.page_concurrency,
            },
            comment_concurrency: self.forge.comment_concurrency,
        }
    }
}

/// Load configuration from a TOML file.
///
/// Returns `Ok(None)` if the file doesn't exist and an error if it exists
/// but cannot be parsed or fails validation.
pub fn load_config_from_path(path: &Path) -> Result<Option<ReleaseStatsConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ReleaseStatsError::io_error_with_source("read config", path.to_path_buf(), e))?;
    let config: ReleaseStatsConfig =
        toml::from_str(&content).map_err(|e| ReleaseStatsError::from(e).with_path(path.to_path_buf()))?;
    config
        .validate()
        .map_err(|e| e.with_path(path.to_path_buf()))?;

    tracing::debug!(path = %path.display(), releases = config.releases.len(), "loaded config");
    Ok(Some(config))
}

/// Searches `start` and its ancestors for one of [`DEFAULT_CONFIG_FILES`].
pub fn discover_config_from(start: &Path) -> Result<Option<(PathBuf, ReleaseStatsConfig)>> {
    let mut current_dir = start.to_path_buf();

    loop {
        for config_name in DEFAULT_CONFIG_FILES {
            let config_path = current_dir.join(config_name);
            if let Some(config) = load_config_from_path(&config_path)? {
                return Ok(Some((config_path, config)));
            }
        }

        if !current_dir.pop() {
            break;
        }
    }

    Ok(None)
}

/// Discover and load configuration starting from the working directory.
pub fn discover_and_load_config() -> Result<Option<(PathBuf, ReleaseStatsConfig)>> {
    discover_config_from(&std::env::current_dir()?)
}

/// Load configuration from a specified path or discover it.
///
/// An explicitly given path must exist.
pub fn load_config(config_path: Option<&Path>) -> Result<Option<(PathBuf, ReleaseStatsConfig)>> {
    match config_path {
        Some(path) => match load_config_from_path(path)? {
            Some(config) => Ok(Some((path.to_path_buf(), config))),
            None => Err(ReleaseStatsError::config_error_with_path(
                "config file not found",
                path.to_path_buf(),
            )),
        },
        None => discover_and_load_config(),
    }
}

/// Parses a pull list: one number per line, `#` starts a comment.
pub fn parse_pull_list(content: &str) -> Result<Vec<u64>> {
    let mut numbers = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let number = line.parse::<u64>().map_err(|_| {
            ReleaseStatsError::invalid_input_with_arg(
                format!("line {} is not a pull request number: {:?}", index + 1, line),
                "pull_list",
            )
        })?;
        numbers.push(number);
    }
    Ok(numbers)
}

/// Reads and parses the pull list file at `path`.
pub fn load_pull_list(path: &Path) -> Result<Vec<u64>> {
    let content = fs::read_to_string(path).map_err(|e| {
        ReleaseStatsError::io_error_with_source("read pull list", path.to_path_buf(), e)
    })?;
    let numbers = parse_pull_list(&content)?;
    tracing::debug!(path = %path.display(), count = numbers.len(), "loaded pull list");
    Ok(numbers)
}

/// Overrides forge settings with the CLI values that are set.
pub fn merge_forge_args(cli_args: &ForgeArgs, config: &ReleaseStatsConfig) -> ReleaseStatsConfig {
    let mut merged = config.clone();

    if let Some(owner) = &cli_args.owner {
        merged.forge.owner = Some(owner.clone());
    }
    if let Some(repo) = &cli_args.repo {
        merged.forge.repo = Some(repo.clone());
    }
    if let Some(api_url) = &cli_args.api_url {
        merged.forge.api_url = api_url.clone();
    }

    merged
}

/// Merge `releases` CLI args with config file values.
pub fn merge_releases_args(
    cli_args: &ReleasesArgs,
    config: &ReleaseStatsConfig,
) -> ReleaseStatsConfig {
    let mut merged = config.clone();

    if let Some(repository) = &cli_args.repository {
        merged.general.repository = repository.clone();
    }
    if let Some(branch) = &cli_args.mainline_branch {
        merged.general.mainline_branch = branch.clone();
    }
    if cli_args.jobs.is_some() {
        merged.general.jobs = cli_args.jobs;
    }

    merged
}

/// Merge `commenters` CLI args with config file values.
///
/// `--output-file` overrides `general.commenters_output`.
pub fn merge_commenters_args(
    cli_args: &CommentersArgs,
    config: &ReleaseStatsConfig,
) -> ReleaseStatsConfig {
    let mut merged = merge_forge_args(&cli_args.forge, config);

    if let Some(pull_list) = &cli_args.pull_list {
        merged.general.pull_list = Some(pull_list.clone());
    }
    if let Some(concurrency) = cli_args.concurrency {
        merged.forge.comment_concurrency = concurrency;
    }
    if let Some(output_file) = &cli_args.output_file {
        merged.general.commenters_output = Some(output_file.clone());
    }

    merged
}

/// Merge `merged` CLI args with config file values.
pub fn merge_merged_args(cli_args: &MergedArgs, config: &ReleaseStatsConfig) -> ReleaseStatsConfig {
    let mut merged = merge_forge_args(&cli_args.forge, config);

    if let Some(branch) = &cli_args.mainline_branch {
        merged.general.mainline_branch = branch.clone();
    }
    if let Some(max_pages) = cli_args.max_pages {
        merged.forge.max_pages = max_pages;
    }
    if let Some(concurrency) = cli_args.concurrency {
        merged.forge.page_concurrency = concurrency;
    }

    merged
}

/// Merge `all` CLI args with config file values.
pub fn merge_all_args(cli_args: &AllArgs, config: &ReleaseStatsConfig) -> ReleaseStatsConfig {
    let mut merged = merge_forge_args(&cli_args.forge, config);

    if let Some(repository) = &cli_args.repository {
        merged.general.repository = repository.clone();
    }
    if let Some(branch) = &cli_args.mainline_branch {
        merged.general.mainline_branch = branch.clone();
    }
    if let Some(pull_list) = &cli_args.pull_list {
        merged.general.pull_list = Some(pull_list.clone());
    }
    if cli_args.jobs.is_some() {
        merged.general.jobs = cli_args.jobs;
    }
    if let Some(output) = &cli_args.commenters_output {
        merged.general.commenters_output = Some(output.clone());
    }

    merged
}
