//! Configuration management
//!
//! Settings come from an optional YAML file overlaid with plain environment
//! variables (`OPA_URL`, `AUDIT_PATH`, ...). Only the keys listed in
//! [`GATEWAY_ENV_KEYS`] / [`POLLER_ENV_KEYS`] are read from the environment.
//!
//! ```yaml
//! opa_url: "http://opa:8181/v1/data/authz/allow"
//! audit_path: "/shared/audit.jsonl"
//! server_cert: "/certs/serviceA.crt"
//! server_key: "/certs/serviceA.key"
//! ca_cert: "/certs/ca.crt"
//! identity_expect: "spiffe://trust/serviceB"
//! opa_timeout: "3s"
//! ```

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variables read by the gateway (`serve`).
pub const GATEWAY_ENV_KEYS: &[&str] = &[
    "OPA_URL",
    "AUDIT_PATH",
    "SERVER_CERT",
    "SERVER_KEY",
    "CA_CERT",
    "CRL_PATH",
    "IDENTITY_EXPECT",
    "LISTEN_ADDR",
    "OPA_TIMEOUT",
];

/// Environment variables read by the peripheral caller (`poll`).
pub const POLLER_ENV_KEYS: &[&str] = &[
    "TARGET_URL",
    "CLIENT_CERT",
    "CLIENT_KEY",
    "CA_CERT",
    "CALL_INTERVAL",
    "CALL_TIMEOUT",
];

/// Default bound on a single policy evaluation.
pub const DEFAULT_OPA_TIMEOUT: Duration = Duration::from_secs(3);

/// Default poll period in seconds.
pub const DEFAULT_CALL_INTERVAL_SECS: i64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Gateway configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Gateway configuration. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Policy evaluation endpoint (required).
    pub opa_url: String,
    /// NDJSON audit log path; parent directories are created on demand.
    pub audit_path: PathBuf,
    /// PEM server certificate chain.
    pub server_cert: String,
    /// PEM server private key.
    pub server_key: String,
    /// PEM trust root used to verify client certificates.
    pub ca_cert: String,
    /// Optional PEM certificate revocation list.
    pub crl_path: Option<String>,
    /// Expected caller identity. When set, an approving verdict for any
    /// other identity is overridden to a denial.
    pub identity_expect: Option<String>,
    /// Socket address to listen on.
    pub listen_addr: String,
    /// Bound on a single policy evaluation.
    #[serde(with = "humantime_serde")]
    pub opa_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            opa_url: String::new(),
            audit_path: PathBuf::from("/shared/audit.jsonl"),
            server_cert: "/certs/serviceA.crt".to_string(),
            server_key: "/certs/serviceA.key".to_string(),
            ca_cert: "/certs/ca.crt".to_string(),
            crl_path: None,
            identity_expect: None,
            listen_addr: "0.0.0.0:8443".to_string(),
            opa_timeout: DEFAULT_OPA_TIMEOUT,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from an optional YAML file and the environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file is missing, a value cannot be
    /// parsed, or a required setting is absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let figment = base_figment(path)?.merge(Env::raw().only(GATEWAY_ENV_KEYS));
        Self::from_figment(&figment)
    }

    /// Extract and validate configuration from a prepared [`Figment`].
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.normalise();
        config.validate()?;
        Ok(config)
    }

    /// Parsed listen address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| Error::Config(format!("Invalid LISTEN_ADDR '{}': {e}", self.listen_addr)))
    }

    /// An empty `IDENTITY_EXPECT` means "no expectation".
    fn normalise(&mut self) {
        if self
            .identity_expect
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            self.identity_expect = None;
        }
        if self.crl_path.as_deref().is_some_and(str::is_empty) {
            self.crl_path = None;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.opa_url.is_empty() {
            return Err(Error::Config("missing required setting OPA_URL".to_string()));
        }
        url::Url::parse(&self.opa_url)
            .map_err(|e| Error::Config(format!("Invalid OPA_URL '{}': {e}", self.opa_url)))?;

        for (name, value) in [
            ("SERVER_CERT", &self.server_cert),
            ("SERVER_KEY", &self.server_key),
            ("CA_CERT", &self.ca_cert),
        ] {
            if value.is_empty() {
                return Err(Error::Config(format!("missing required setting {name}")));
            }
        }
        if self.audit_path.as_os_str().is_empty() {
            return Err(Error::Config("missing required setting AUDIT_PATH".to_string()));
        }
        if self.opa_timeout.is_zero() {
            return Err(Error::Config("OPA_TIMEOUT must be greater than zero".to_string()));
        }
        self.socket_addr()?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Poller configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the peripheral caller that exercises `/protected`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// URL to call on every tick.
    pub target_url: String,
    /// PEM client certificate presented during the handshake.
    pub client_cert: String,
    /// PEM client private key.
    pub client_key: String,
    /// PEM trust root used to verify the gateway.
    pub ca_cert: String,
    /// Seconds between calls. Non-positive, empty or non-integer values fall
    /// back to the default.
    #[serde(deserialize_with = "lenient_seconds")]
    pub call_interval: i64,
    /// Per-call timeout.
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            target_url: "https://serviceA:8443/protected".to_string(),
            client_cert: "/certs/serviceB.crt".to_string(),
            client_key: "/certs/serviceB.key".to_string(),
            ca_cert: "/certs/ca.crt".to_string(),
            call_interval: DEFAULT_CALL_INTERVAL_SECS,
            call_timeout: Duration::from_secs(3),
        }
    }
}

impl PollerConfig {
    /// Load configuration from an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let figment = base_figment(path)?.merge(Env::raw().only(POLLER_ENV_KEYS));
        Self::from_figment(&figment)
    }

    /// Extract and validate configuration from a prepared [`Figment`].
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        url::Url::parse(&config.target_url).map_err(|e| {
            Error::Config(format!("Invalid TARGET_URL '{}': {e}", config.target_url))
        })?;
        Ok(config)
    }

    /// Effective interval between calls.
    #[must_use]
    pub fn interval(&self) -> Duration {
        let secs = if self.call_interval > 0 {
            self.call_interval
        } else {
            DEFAULT_CALL_INTERVAL_SECS
        };
        Duration::from_secs(secs.unsigned_abs())
    }
}

fn base_figment(path: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::new();
    if let Some(p) = path {
        if !p.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
        figment = figment.merge(Yaml::file(p));
    }
    Ok(figment)
}

/// Whole seconds, where anything that is not an integer reads as 0.
fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Other(serde_json::Value),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Int(n) => n,
        Raw::Other(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
        Raw::Other(_) => 0,
    })
}

/// Load a `.env` file into the process environment, if one exists.
pub fn load_env_file(path: Option<&Path>) {
    let result = match path {
        Some(p) => dotenvy::from_path(p).map(|()| p.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match result {
        Ok(loaded) => tracing::info!("Loaded env file: {}", loaded.display()),
        Err(e) if e.not_found() => tracing::debug!("No env file loaded"),
        Err(e) => tracing::warn!("Failed to load env file: {e}"),
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(u64),
        Text(String),
    }

    /// Serialize Duration to human-readable string (e.g., "30s", "250ms")
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize a bare number of seconds or a string like "30s", "5m", "100ms"
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = match RawDuration::deserialize(deserializer)? {
            RawDuration::Seconds(secs) => return Ok(Duration::from_secs(secs)),
            RawDuration::Text(s) => s,
        };
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse `"250ms"`, `"30s"`, `"5m"` or a bare number of seconds.
///
/// # Errors
///
/// Returns a message naming the input when it is not one of those forms.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    // "ms" before "s"/"m": both are suffixes of it
    let (digits, unit_ms) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1_000)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60_000)
    } else {
        (s, 1_000)
    };
    let n: u64 = digits
        .trim()
        .parse()
        .map_err(|e| format!("invalid duration '{s}': {e}"))?;
    n.checked_mul(unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
