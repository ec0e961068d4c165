//! Policy evaluation client (OPA data API).
//!
//! # Wire format
//!
//! ```text
//! POST <opa_url>
//! {"input":{"identity":"spiffe://trust/serviceB","attested":true}}
//!
//! 200 OK
//! {"result":true}
//! ```
//!
//! Every failure comes back as a [`PolicyError`]. This client never picks a
//! verdict on its own; turning an error into a denial is the handler's job.

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::Result;

/// Longest response-body excerpt carried in a [`PolicyError::Status`].
const MAX_ERROR_BODY: usize = 512;

// ── Wire types ────────────────────────────────────────────────────────────

/// Query sent to the policy evaluator. Built fresh per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyQuery {
    /// Caller identity (empty when unattested).
    pub identity: String,
    /// Whether a SPIFFE identity was extracted from a verified certificate.
    pub attested: bool,
}

impl PolicyQuery {
    /// Build a query.
    #[must_use]
    pub fn new(identity: impl Into<String>, attested: bool) -> Self {
        Self {
            identity: identity.into(),
            attested,
        }
    }
}

/// OPA request envelope.
#[derive(Debug, Serialize)]
struct OpaRequest<'a> {
    input: &'a PolicyQuery,
}

/// Verdict returned by the policy evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PolicyVerdict {
    /// Allow flag (`result` on the wire).
    #[serde(rename = "result")]
    pub allow: bool,
}

// ── Errors ────────────────────────────────────────────────────────────────

/// Why a policy evaluation produced no verdict.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The evaluator did not answer within the configured bound.
    #[error("policy request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or transport failure.
    #[error("{0}")]
    Transport(String),

    /// The evaluator answered with a status of 300 or above.
    #[error("opa error (HTTP {status}): {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body excerpt, for diagnosis
        body: String,
    },

    /// The response body was not a verdict.
    #[error("unparseable policy response: {0}")]
    Decode(String),
}

impl PolicyError {
    fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return Self::Timeout(timeout);
        }
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message = format!("{message}: {cause}");
            source = cause.source();
        }
        Self::Transport(message)
    }
}

// ── Decider seam ──────────────────────────────────────────────────────────

/// Something that can answer "may `identity` proceed?".
#[async_trait]
pub trait PolicyDecider: Send + Sync {
    /// Evaluate `(identity, attested)` and return the allow flag.
    async fn decide(&self, identity: &str, attested: bool) -> std::result::Result<bool, PolicyError>;
}

// ── OPA client ────────────────────────────────────────────────────────────

/// HTTP client for an OPA-style decision endpoint.
#[derive(Debug, Clone)]
pub struct OpaClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl OpaClient {
    /// Create a client for `endpoint`, bounding every call by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Http` if the HTTP client cannot be constructed.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(crate::Error::Http)?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            timeout,
        })
    }
}

#[async_trait]
impl PolicyDecider for OpaClient {
    async fn decide(&self, identity: &str, attested: bool) -> std::result::Result<bool, PolicyError> {
        let query = PolicyQuery::new(identity, attested);

        let response = self
            .http
            .post(&self.endpoint)
            .json(&OpaRequest { input: &query })
            .send()
            .await
            .map_err(|e| PolicyError::from_reqwest(&e, self.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PolicyError::from_reqwest(&e, self.timeout))?;

        if status.as_u16() >= 300 {
            return Err(PolicyError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let verdict: PolicyVerdict =
            serde_json::from_str(&body).map_err(|e| PolicyError::Decode(e.to_string()))?;

        debug!(identity = %identity, attested, allow = verdict.allow, "Policy verdict");
        Ok(verdict.allow)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
