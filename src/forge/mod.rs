//! Forge API client.
//!
//! [`ForgeClient`] issues authenticated GET requests against a
//! GitHub-compatible REST API. Credentials, endpoint and retry behaviour are
//! all carried by an immutable [`ForgeSettings`] handed to the constructor;
//! there is no process-wide client state.
//!
//! Only the closed pull request listing is retried. Rate-limit and comment
//! lookups make a single attempt.

mod retry;
mod transport;
mod types;

pub use retry::{
    Backoff, DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS, RecordingSleeper, RetryPolicy, Sleeper,
    ThreadSleeper,
};
pub use transport::{ForgeRequest, HttpSettings, ReqwestTransport, Transport, TransportResponse};
pub use types::{Comment, CommentAuthor, RateLimitStatus};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use crate::error::{ReleaseStatsError, Result};

/// Default forge API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Page size used for pull request listings.
pub const PAGE_SIZE: u32 = 100;

/// Client identifier and secret; opaque to this crate.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// How credentials are attached to requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// `client_id` and `client_secret` query parameters.
    #[default]
    Query,
    /// HTTP basic auth with the id as user and the secret as password.
    Basic,
}

/// Everything the client needs to talk to one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgeSettings {
    /// API root, e.g. `https://api.github.com`.
    pub api_url: String,
    /// Repository owner or organisation.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Optional static credentials.
    pub credentials: Option<Credentials>,
    /// Credential placement.
    pub auth: AuthMode,
    /// Retry policy for the pull request listing.
    pub retry: RetryPolicy,
}

impl ForgeSettings {
    /// Settings for `owner/repo` on the default API with no credentials.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            owner: owner.into(),
            repo: repo.into(),
            credentials: None,
            auth: AuthMode::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Blocking forge API client.
#[derive(Clone)]
pub struct ForgeClient {
    settings: ForgeSettings,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for ForgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForgeClient")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ForgeClient {
    /// Creates a client over an arbitrary transport.
    pub fn new(settings: ForgeSettings, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Creates a client over the reqwest transport.
    pub fn connect(settings: ForgeSettings, http: &HttpSettings) -> Result<Self> {
        let transport = ReqwestTransport::new(http)?;
        Ok(Self::new(settings, Arc::new(transport)))
    }

    /// Replaces the sleeper used between retry attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// The settings this client was built with.
    pub fn settings(&self) -> &ForgeSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.settings.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn repo_path(&self, rest: &str) -> String {
        format!("repos/{}/{}/{}", self.settings.owner, self.settings.repo, rest)
    }

    fn build_request(&self, path: &str, params: &[(&str, String)]) -> ForgeRequest {
        let mut query: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        let mut basic_auth = None;
        if let Some(credentials) = &self.settings.credentials {
            match self.settings.auth {
                AuthMode::Query => {
                    query.push(("client_id".to_string(), credentials.client_id.clone()));
                    query.push((
                        "client_secret".to_string(),
                        credentials.client_secret.clone(),
                    ));
                }
                AuthMode::Basic => {
                    basic_auth = Some((
                        credentials.client_id.clone(),
                        credentials.client_secret.clone(),
                    ));
                }
            }
        }
        ForgeRequest {
            url: self.endpoint(path),
            query,
            basic_auth,
        }
    }

    /// One round trip; any non-200 status is a `ForgeRequest` error.
    fn get_once(&self, request: &ForgeRequest) -> Result<String> {
        let response = self.transport.get(request).map_err(|e| match e {
            ReleaseStatsError::ForgeRequest { status, source, .. } => {
                ReleaseStatsError::ForgeRequest {
                    url: request.url.clone(),
                    status,
                    attempts: 1,
                    source,
                }
            }
            other => other,
        })?;
        if response.status != 200 {
            return Err(ReleaseStatsError::forge_request(
                request.url.clone(),
                Some(response.status),
                1,
            ));
        }
        Ok(response.body)
    }

    /// Repeats [`Self::get_once`] per the retry policy.
    fn get_with_retry(&self, request: &ForgeRequest) -> Result<String> {
        let policy = self.settings.retry;
        let max_attempts = policy.attempts();
        let mut attempt = 1;
        loop {
            match self.get_once(request) {
                Ok(body) => {
                    if attempt > 1 {
                        tracing::debug!(url = %request.url, attempt, "forge request succeeded after retry");
                    }
                    return Ok(body);
                }
                Err(ReleaseStatsError::ForgeRequest {
                    url,
                    status,
                    source,
                    ..
                }) => {
                    if attempt >= max_attempts {
                        return Err(ReleaseStatsError::ForgeRequest {
                            url,
                            status,
                            attempts: attempt,
                            source,
                        });
                    }
                    let delay = policy.delay_after(attempt);
                    tracing::debug!(
                        %url,
                        ?status,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "forge request failed, retrying"
                    );
                    self.sleeper.sleep(delay);
                    attempt += 1;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Queries the remaining API quota. Never retried.
    #[instrument(skip(self), level = "debug")]
    pub fn check_rate_limit(&self) -> Result<RateLimitStatus> {
        let request = self.build_request("rate_limit", &[]);
        let body = self.get_once(&request)?;
        RateLimitStatus::from_body(&body)
    }

    /// Fetches one page of closed pull requests as raw JSON records.
    ///
    /// Pages are 1-based. Retried per the configured [`RetryPolicy`].
    #[instrument(skip(self), level = "debug")]
    pub fn fetch_pull_request_page(&self, page: u32) -> Result<Vec<Value>> {
        let request = self.build_request(
            &self.repo_path("pulls"),
            &[
                ("state", "closed".to_string()),
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ],
        );
        let body = self.get_with_retry(&request)?;
        serde_json::from_str(&body).map_err(|e| {
            ReleaseStatsError::malformed_record(
                "pull request page",
                format!("page {} is not a JSON array: {}", page, e),
            )
        })
    }

    /// Fetches the conversation comments of a pull request. Not retried.
    #[instrument(skip(self), level = "debug")]
    pub fn fetch_issue_comments(&self, number: u64) -> Result<Vec<Comment>> {
        let path = self.repo_path(&format!("issues/{}/comments", number));
        self.fetch_comments(&path, number)
    }

    /// Fetches the review (diff) comments of a pull request. Not retried.
    #[instrument(skip(self), level = "debug")]
    pub fn fetch_review_comments(&self, number: u64) -> Result<Vec<Comment>> {
        let path = self.repo_path(&format!("pulls/{}/comments", number));
        self.fetch_comments(&path, number)
    }

    fn fetch_comments(&self, path: &str, number: u64) -> Result<Vec<Comment>> {
        let request = self.build_request(path, &[]);
        let body = self.get_once(&request)?;
        serde_json::from_str(&body).map_err(|e| {
            ReleaseStatsError::malformed_record(
                "comment",
                format!("comments of pull request {}: {}", number, e),
            )
        })
    }
}
