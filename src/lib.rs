//! mTLS Authorization Gateway Library
//!
//! Terminates mutually-authenticated TLS, derives a SPIFFE identity from the
//! client certificate, asks an external policy evaluator (OPA) for a verdict,
//! and appends every decision to an NDJSON audit trail.
//!
//! # Request path
//!
//! ```text
//! TCP connection
//!   → TLS 1.3 handshake  (rustls verifies the client cert against the CA)
//!   → PeerCertificates attached to the request
//!   → AuthzHandler: identify → evaluate → record → respond
//! ```
//!
//! The authorization endpoint is fail-closed: any policy-call failure is a
//! denial, and callers only ever see `200` or `403`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod mtls;
pub mod policy;
pub mod poller;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber
                .with(fmt::layer().json())
                .try_init()
                .map_err(|e| Error::Internal(format!("tracing already initialised: {e}")))?;
        }
        _ => {
            subscriber
                .with(fmt::layer())
                .try_init()
                .map_err(|e| Error::Internal(format!("tracing already initialised: {e}")))?;
        }
    }

    Ok(())
}
