//! Peripheral caller that exercises the authorization endpoint.
//!
//! Presents a client certificate, calls the target on a fixed interval and
//! logs what came back. No retries and no backoff: every tick is one call.

use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::config::PollerConfig;
use crate::mtls::build_client_config;
use crate::{Error, Result};

/// mTLS client for the gateway's protected endpoint.
#[derive(Debug, Clone)]
pub struct Poller {
    http: reqwest::Client,
    config: PollerConfig,
}

/// Outcome of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
}

impl Poller {
    /// Build the client from the configured certificate material.
    pub fn new(config: PollerConfig) -> Result<Self> {
        let tls = build_client_config(&config.client_cert, &config.client_key, &config.ca_cert)?;
        let http = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .timeout(config.call_timeout)
            .build()
            .map_err(Error::Http)?;
        Ok(Self { http, config })
    }

    /// Make a single call to the target.
    pub async fn call_once(&self) -> Result<CallResult> {
        let response = self.http.get(&self.config.target_url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(CallResult { status, body })
    }

    /// Call the target forever, one request per interval.
    pub async fn run(&self) -> Result<()> {
        let period = self.config.interval();
        info!(url = %self.config.target_url, interval = ?period, "Starting poller");

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.call_once().await {
                Ok(result) => info!(
                    status = result.status,
                    body = %result.body.trim_end(),
                    "serviceA response"
                ),
                Err(e) => warn!(error = %e, "request failed"),
            }
        }
    }
}
