//! Error types for release-stats.
//!
//! This module defines the error type shared by the forge client, the
//! release delta analyzer, the contributor tally and the orchestration
//! layer. Variants are scoped so that callers can tell a failure confined to
//! one unit of work (a page, a pull request, a release) from a failure that
//! should stop the whole run (configuration loading).

use chrono::{DateTime, Utc};
use std::fmt;
use std::io;
use std::path::PathBuf;

/// The main error type for release-stats operations.
#[derive(Debug)]
pub enum ReleaseStatsError {
    /// A forge request did not produce a 200 response, after retries where
    /// the endpoint is retried.
    ForgeRequest {
        /// Endpoint URL, without query parameters (they may carry credentials).
        url: String,
        /// The last HTTP status seen, `None` when no response was received.
        status: Option<u16>,
        /// How many attempts were made.
        attempts: u32,
        /// The underlying transport error, if any.
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A record fetched from the forge is missing required fields.
    MalformedRecord {
        /// The kind of record, e.g. `pull request`.
        kind: String,
        /// What was wrong with it.
        message: String,
    },

    /// A configured git reference does not resolve to a commit.
    UnresolvedReference {
        /// The reference as written in the configuration.
        reference: String,
        /// The underlying git error.
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The forge reports zero remaining request quota.
    RateLimitExceeded {
        /// When the quota resets.
        reset: DateTime<Utc>,
    },

    /// An error occurred during a Git operation.
    GitError {
        /// Context about what Git operation was being performed.
        operation: String,
        /// Additional context about the repository.
        repo_path: Option<PathBuf>,
        /// The underlying error.
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An error occurred during file system operations.
    IoError {
        /// The operation being performed.
        operation: String,
        /// The path involved in the error.
        path: Option<PathBuf>,
        /// The underlying IO error.
        source: Option<io::Error>,
    },

    /// An error occurred while loading or parsing configuration.
    ConfigError {
        /// Description of the configuration issue.
        message: String,
        /// The config file path, if applicable.
        path: Option<PathBuf>,
        /// The underlying error.
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An error indicating an invalid argument or input.
    InvalidInput {
        /// Description of the invalid input.
        message: String,
        /// The argument or value that was invalid.
        argument: Option<String>,
    },

    /// Rendering or writing a report failed.
    OutputError {
        /// The output format being produced.
        format: String,
        /// Description of what went wrong.
        message: String,
        /// The underlying error.
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ReleaseStatsError {
    /// Creates a `ForgeRequest` error for a response with the given status.
    pub fn forge_request(url: impl Into<String>, status: Option<u16>, attempts: u32) -> Self {
        Self::ForgeRequest {
            url: url.into(),
            status,
            attempts,
            source: None,
        }
    }

    /// Creates a `MalformedRecord` error.
    ///
    /// # Arguments
    /// * `kind` - The kind of record, e.g. `pull request` or `comment`.
    /// * `message` - What was missing or invalid.
    pub fn malformed_record(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Creates an `UnresolvedReference` error for the given reference.
    pub fn unresolved_reference(reference: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            reference: reference.into(),
            source: None,
        }
    }

    /// Creates a `GitError` with the given operation description.
    ///
    /// # Arguments
    /// * `operation` - A description of the Git operation being performed.
    pub fn git_error(operation: impl Into<String>) -> Self {
        Self::GitError {
            operation: operation.into(),
            repo_path: None,
            source: None,
        }
    }

    /// Creates a `GitError` with a repository path.
    ///
    /// # Arguments
    /// * `operation` - A description of the Git operation being performed.
    /// * `repo_path` - The path to the repository.
    pub fn git_error_with_repo(operation: impl Into<String>, repo_path: PathBuf) -> Self {
        Self::GitError {
            operation: operation.into(),
            repo_path: Some(repo_path),
            source: None,
        }
    }

    /// Creates a new `IoError` with a path and underlying error.
    pub fn io_error_with_source(
        operation: impl Into<String>,
        path: PathBuf,
        source: io::Error,
    ) -> Self {
        Self::IoError {
            operation: operation.into(),
            path: Some(path),
            source: Some(source),
        }
    }

    /// Creates a new `ConfigError` with the given message.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Creates a new `ConfigError` with a file path.
    pub fn config_error_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::ConfigError {
            message: message.into(),
            path: Some(path),
            source: None,
        }
    }

    /// Creates a new `InvalidInput` error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            argument: None,
        }
    }

    /// Creates a new `InvalidInput` error with an argument name.
    pub fn invalid_input_with_arg(message: impl Into<String>, argument: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            argument: Some(argument.into()),
        }
    }

    /// Attaches a path to a `ConfigError` or `IoError` that has none.
    pub fn with_path(self, path: PathBuf) -> Self {
        match self {
            Self::ConfigError {
                message,
                path: None,
                source,
            } => Self::ConfigError {
                message,
                path: Some(path),
                source,
            },
            Self::IoError {
                operation,
                path: None,
                source,
            } => Self::IoError {
                operation,
                path: Some(path),
                source,
            },
            other => other,
        }
    }

    /// Returns the name of the error variant.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ForgeRequest { .. } => "ForgeRequestError",
            Self::MalformedRecord { .. } => "MalformedRecordError",
            Self::UnresolvedReference { .. } => "UnresolvedReferenceError",
            Self::RateLimitExceeded { .. } => "RateLimitExceededError",
            Self::GitError { .. } => "GitError",
            Self::IoError { .. } => "IoError",
            Self::ConfigError { .. } => "ConfigError",
            Self::InvalidInput { .. } => "InvalidInput",
            Self::OutputError { .. } => "OutputError",
        }
    }

    /// Returns true for errors that only abandon a single unit of work.
    ///
    /// Configuration and IO errors are the only ones that stop a run.
    pub fn is_unit_scoped(&self) -> bool {
        matches!(
            self,
            Self::ForgeRequest { .. }
                | Self::MalformedRecord { .. }
                | Self::UnresolvedReference { .. }
                | Self::RateLimitExceeded { .. }
                | Self::GitError { .. }
        )
    }

    /// Returns suggested recovery actions for the error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ForgeRequest { status, .. } => {
                let mut s = vec![
                    "Check network connectivity to the forge API".to_string(),
                    "Re-run later; the failed page or pull request is logged above".to_string(),
                ];
                if matches!(status, Some(401) | Some(403)) {
                    s.push("Verify client_id and client_secret in the [forge] section".to_string());
                }
                if matches!(status, Some(404)) {
                    s.push("Verify the forge owner and repo names".to_string());
                }
                s
            }
            Self::MalformedRecord { .. } => vec![
                "Check that api_url points at a GitHub-compatible API".to_string(),
            ],
            Self::UnresolvedReference { reference, .. } => vec![
                format!("Check the spelling of '{}' in the [[releases]] table", reference),
                "Run `git fetch` in the repository so the branch exists locally".to_string(),
            ],
            Self::RateLimitExceeded { reset } => vec![format!(
                "Wait until {} and re-run",
                reset.format("%Y-%m-%d %H:%M:%S UTC")
            )],
            Self::GitError { .. } => vec![
                "Ensure the path is a valid Git repository".to_string(),
                "Check that you have permissions to access the repository".to_string(),
            ],
            Self::IoError { operation, .. } => {
                let mut s = vec![
                    "Check that the path exists and is accessible".to_string(),
                    "Verify you have the necessary permissions".to_string(),
                ];
                if operation.contains("read") || operation.contains("open") {
                    s.push("Ensure the file is not locked by another process".to_string());
                }
                s
            }
            Self::ConfigError { .. } => vec![
                "Check the configuration file syntax".to_string(),
                "Verify all required fields are present".to_string(),
                "Ensure the file is valid TOML format".to_string(),
            ],
            Self::InvalidInput { .. } => vec![
                "Review the command-line arguments".to_string(),
                "Verify all required arguments are provided".to_string(),
            ],
            Self::OutputError { format, .. } => vec![format!(
                "Try a different output format than '{}'",
                format
            )],
        }
    }
}

impl fmt::Display for ReleaseStatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForgeRequest {
                url,
                status,
                attempts,
                ..
            } => match status {
                Some(code) => write!(
                    f,
                    "Forge request to '{}' failed with status {} after {} attempt(s)",
                    url, code, attempts
                ),
                None => write!(
                    f,
                    "Forge request to '{}' failed without a response after {} attempt(s)",
                    url, attempts
                ),
            },
            Self::MalformedRecord { kind, message } => {
                write!(f, "Malformed {} record: {}", kind, message)
            }
            Self::UnresolvedReference { reference, .. } => {
                write!(f, "Reference '{}' does not resolve to a commit", reference)
            }
            Self::RateLimitExceeded { reset } => write!(
                f,
                "Forge rate limit exhausted until {}",
                reset.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            Self::GitError {
                operation,
                repo_path,
                ..
            } => {
                if let Some(path) = repo_path {
                    write!(
                        f,
                        "Git error during '{}' at '{}': operation failed",
                        operation,
                        path.display()
                    )
                } else {
                    write!(f, "Git error during '{}': operation failed", operation)
                }
            }
            Self::IoError {
                operation, path, ..
            } => {
                if let Some(p) = path {
                    write!(
                        f,
                        "IO error during '{}' at '{}': operation failed",
                        operation,
                        p.display()
                    )
                } else {
                    write!(f, "IO error during '{}': operation failed", operation)
                }
            }
            Self::ConfigError { message, path, .. } => {
                if let Some(p) = path {
                    write!(f, "Configuration error in '{}': {}", p.display(), message)
                } else {
                    write!(f, "Configuration error: {}", message)
                }
            }
            Self::InvalidInput { message, argument } => {
                if let Some(arg) = argument {
                    write!(f, "Invalid input '{}': {}", arg, message)
                } else {
                    write!(f, "Invalid input: {}", message)
                }
            }
            Self::OutputError {
                format, message, ..
            } => write!(f, "Failed to produce {} output: {}", format, message),
        }
    }
}

impl std::error::Error for ReleaseStatsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ForgeRequest { source, .. } => source.as_ref().map(|s| s.as_ref() as _),
            Self::UnresolvedReference { source, .. } => source.as_ref().map(|s| s.as_ref() as _),
            Self::GitError { source, .. } => source.as_ref().map(|s| s.as_ref() as _),
            Self::IoError { source, .. } => source.as_ref().map(|e| e as _),
            Self::ConfigError { source, .. } => source.as_ref().map(|s| s.as_ref() as _),
            Self::OutputError { source, .. } => source.as_ref().map(|s| s.as_ref() as _),
            Self::MalformedRecord { .. }
            | Self::RateLimitExceeded { .. }
            | Self::InvalidInput { .. } => None,
        }
    }
}

// Implement From conversions for common error types

impl From<io::Error> for ReleaseStatsError {
    fn from(err: io::Error) -> Self {
        Self::IoError {
            operation: "file operation".to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<toml::de::Error> for ReleaseStatsError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError {
            message: format!("Failed to parse TOML: {}", err),
            path: None,
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for ReleaseStatsError {
    fn from(err: serde_json::Error) -> Self {
        Self::OutputError {
            format: "json".to_string(),
            message: format!("Failed to parse/serialize JSON: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_yaml::Error> for ReleaseStatsError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::OutputError {
            format: "yaml".to_string(),
            message: format!("Failed to serialize YAML: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

impl From<csv::Error> for ReleaseStatsError {
    fn from(err: csv::Error) -> Self {
        Self::OutputError {
            format: "csv".to_string(),
            message: format!("Failed to write CSV: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

impl From<git2::Error> for ReleaseStatsError {
    fn from(err: git2::Error) -> Self {
        Self::GitError {
            operation: "git operation".to_string(),
            repo_path: None,
            source: Some(Box::new(err)),
        }
    }
}

impl From<reqwest::Error> for ReleaseStatsError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| {
                let mut u = u.clone();
                u.set_query(None);
                u.to_string()
            })
            .unwrap_or_default();
        Self::ForgeRequest {
            url,
            status: err.status().map(|s| s.as_u16()),
            attempts: 1,
            source: Some(Box::new(err.without_url())),
        }
    }
}

impl From<regex::Error> for ReleaseStatsError {
    fn from(err: regex::Error) -> Self {
        Self::ConfigError {
            message: format!("Invalid merge subject pattern: {}", err),
            path: None,
            source: Some(Box::new(err)),
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for ReleaseStatsError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Self::InvalidInput {
            message: format!("Failed to build worker pool: {}", err),
            argument: None,
        }
    }
}

/// A type alias for `Result<T, ReleaseStatsError>`.
pub type Result<T> = std::result::Result<T, ReleaseStatsError>;
