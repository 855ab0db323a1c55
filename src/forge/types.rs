//! Wire types returned by the forge API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReleaseStatsError, Result};

/// Core API quota as reported by `GET /rate_limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Requests allowed per window.
    pub limit: u64,
    /// Requests left in the current window.
    pub remaining: u64,
    /// Requests already spent in the current window.
    #[serde(default)]
    pub used: u64,
    /// When the window resets.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub reset: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RateLimitEnvelope {
    rate: RateLimitStatus,
}

impl RateLimitStatus {
    /// Parses the body of a `/rate_limit` response.
    pub fn from_body(body: &str) -> Result<Self> {
        let envelope: RateLimitEnvelope = serde_json::from_str(body).map_err(|e| {
            ReleaseStatsError::malformed_record("rate limit", e.to_string())
        })?;
        Ok(envelope.rate)
    }

    /// Fails with `RateLimitExceeded` when no quota is left.
    pub fn ensure_quota(&self) -> Result<()> {
        if self.remaining == 0 {
            return Err(ReleaseStatsError::RateLimitExceeded { reset: self.reset });
        }
        Ok(())
    }
}

/// The `user` object attached to comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    /// Account login.
    pub login: String,
}

/// An issue comment or a review comment.
///
/// Only the author is of interest; `user` is null for deleted accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Comment id.
    #[serde(default)]
    pub id: Option<u64>,
    /// Author, if the account still exists.
    #[serde(default)]
    pub user: Option<CommentAuthor>,
}

impl Comment {
    /// Creates a comment by `login`.
    pub fn by(login: impl Into<String>) -> Self {
        Self {
            id: None,
            user: Some(CommentAuthor {
                login: login.into(),
            }),
        }
    }

    /// Creates a comment whose author is gone.
    pub fn orphaned() -> Self {
        Self {
            id: None,
            user: None,
        }
    }

    /// The author's login, if any.
    pub fn author(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.login.as_str())
    }
}
