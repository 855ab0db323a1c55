//! HTTP transport seam for the forge client.

use crate::error::Result;
use std::time::Duration;
use tracing::instrument;

/// A fully described GET request.
#[derive(Clone, PartialEq, Eq)]
pub struct ForgeRequest {
    /// Absolute endpoint URL without query string.
    pub url: String,
    /// Query parameters, in order.
    pub query: Vec<(String, String)>,
    /// Basic-auth user and password, when that auth mode is selected.
    pub basic_auth: Option<(String, String)>,
}

impl ForgeRequest {
    /// Looks up a query parameter by name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Debug for ForgeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Credentials may live in either the query or basic auth.
        let query: Vec<(&str, &str)> = self
            .query
            .iter()
            .map(|(k, v)| {
                if k == "client_secret" {
                    (k.as_str(), "<redacted>")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("ForgeRequest")
            .field("url", &self.url)
            .field("query", &query)
            .field("basic_auth", &self.basic_auth.as_ref().map(|(u, _)| u))
            .finish()
    }
}

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

/// Executes forge requests.
///
/// An `Err` means no response was received at all; any received response,
/// whatever its status, is returned as `Ok`.
pub trait Transport: Send + Sync {
    /// Performs one GET round trip.
    fn get(&self, request: &ForgeRequest) -> Result<TransportResponse>;
}

/// Settings for the reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Value of the `User-Agent` header; GitHub rejects requests without one.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!("release-stats/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Blocking reqwest transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Builds the underlying HTTP client.
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        let client = reqwest::blocking::Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    #[instrument(skip(self), level = "trace")]
    fn get(&self, request: &ForgeRequest) -> Result<TransportResponse> {
        let mut builder = self.client.get(&request.url).query(&request.query);
        if let Some((user, password)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }
        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_client_secret() {
        let request = ForgeRequest {
            url: "https://api.github.com/rate_limit".to_string(),
            query: vec![
                ("client_id".to_string(), "id123".to_string()),
                ("client_secret".to_string(), "hunter2".to_string()),
            ],
            basic_auth: Some(("id123".to_string(), "hunter2".to_string())),
        };
        let debug = format!("{:?}", request);
        assert!(!debug.contains("hunter2"), "secret leaked: {debug}");
        assert!(debug.contains("id123"));
    }

    #[test]
    fn test_query_param_lookup() {
        let request = ForgeRequest {
            url: "u".to_string(),
            query: vec![("page".to_string(), "3".to_string())],
            basic_auth: None,
        };
        assert_eq!(request.query_param("page"), Some("3"));
        assert_eq!(request.query_param("state"), None);
    }

    #[test]
    fn test_reqwest_transport_builds_with_defaults() {
        assert!(ReqwestTransport::new(&HttpSettings::default()).is_ok());
    }
}
