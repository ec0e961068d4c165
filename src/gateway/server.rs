//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use tokio::signal;
use tracing::{info, warn};

use super::handler::AuthzHandler;
use super::router::create_router;
use crate::config::GatewayConfig;
use crate::mtls::{PeerCertAcceptor, build_server_config};
use crate::{Error, Result};

/// Grace period for in-flight requests after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// mTLS authorization gateway
pub struct Gateway {
    config: GatewayConfig,
    handler: Arc<AuthzHandler>,
}

impl Gateway {
    /// Create a new gateway. Fails before binding if the policy client
    /// cannot be built.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let handler = Arc::new(AuthzHandler::from_config(&config)?);
        Ok(Self { config, handler })
    }

    /// Run the gateway until Ctrl-C or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let addr = self.config.socket_addr()?;

        // Trust material is read once; any failure is fatal at startup
        let tls = build_server_config(&self.config)?;
        let acceptor = PeerCertAcceptor::new(RustlsAcceptor::new(RustlsConfig::from_config(
            Arc::new(tls),
        )));

        let app = create_router(Arc::clone(&self.handler));

        info!("============================================================");
        info!("AUTHZ GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(addr = %addr, "Listening (mTLS, TLS 1.3, client certificate required)");
        info!(opa_url = %self.config.opa_url, timeout = ?self.config.opa_timeout, "Policy evaluator");
        info!(path = %self.config.audit_path.display(), "Audit log");
        match &self.config.identity_expect {
            Some(expected) => info!(expected = %expected, "Expected caller identity enforced"),
            None => warn!("IDENTITY_EXPECT not set - any identity approved by policy is allowed"),
        }
        if let Some(crl) = &self.config.crl_path {
            info!(path = %crl, "Certificate revocation list loaded");
        }
        info!("============================================================");

        let handle: Handle<SocketAddr> = Handle::new();
        tokio::spawn(shutdown_signal(handle.clone()));

        axum_server::bind(addr)
            .acceptor(acceptor)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
