//! Authorization handler: identify → evaluate → record → respond.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use rustls::pki_types::CertificateDer;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditRecord, AuditWriter, MonotonicClock};
use crate::config::GatewayConfig;
use crate::mtls::{PeerCertificates, identity};
use crate::policy::{Decision, DecisionInput, OpaClient, PolicyDecider, decide};
use crate::Result;

/// Body of a denied response. The reason is never sent to the caller.
pub const DENIED_BODY: &str = "access denied";

/// Per-process authorization state, shared by every request.
pub struct AuthzHandler {
    decider: Arc<dyn PolicyDecider>,
    audit: Arc<AuditWriter>,
    clock: MonotonicClock,
    expected_identity: Option<String>,
}

impl AuthzHandler {
    /// Assemble a handler from its collaborators.
    #[must_use]
    pub fn new(
        decider: Arc<dyn PolicyDecider>,
        audit: Arc<AuditWriter>,
        expected_identity: Option<String>,
    ) -> Self {
        Self {
            decider,
            audit,
            clock: MonotonicClock::new(),
            expected_identity,
        }
    }

    /// Build the production handler: OPA client plus file audit writer.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let decider = OpaClient::new(config.opa_url.clone(), config.opa_timeout)?;
        Ok(Self::new(
            Arc::new(decider),
            Arc::new(AuditWriter::new(config.audit_path.clone())),
            config.identity_expect.clone(),
        ))
    }

    /// Audit writer used by this handler.
    #[must_use]
    pub fn audit(&self) -> &AuditWriter {
        &self.audit
    }

    /// Decide one request and append its audit record.
    ///
    /// The record is written before this returns. Dropping the future
    /// part-way loses the record; [`AuthzHandler::authorize_detached`] is the
    /// cancellation-safe entry point.
    pub async fn authorize(
        &self,
        peer_certificates: Option<&[CertificateDer<'_>]>,
        method: &str,
        path: &str,
    ) -> Decision {
        let peer = identity::inspect(peer_certificates);
        let spiffe_id = peer.as_ref().and_then(|p| p.spiffe_id.clone());
        let attested = spiffe_id.is_some();
        let caller = spiffe_id.unwrap_or_default();
        let label = peer.as_ref().map_or("<none>", |p| p.display_name.as_str());
        if let Some(p) = &peer {
            debug!(
                cn = ?p.common_name,
                san_uris = ?p.san_uris,
                san_dns = ?p.san_dns_names,
                "Peer certificate"
            );
        }

        let outcome = self.decider.decide(&caller, attested).await;
        let decision = decide(&DecisionInput {
            identity: &caller,
            outcome: &outcome,
            expected_identity: self.expected_identity.as_deref(),
        });

        if decision.allowed {
            info!(caller = %caller, peer = %label, path = %path, "access granted to {label}");
        } else {
            warn!(
                caller = %caller,
                peer = %label,
                path = %path,
                reason = %decision.reason,
                "access denied to {label} (reason={})",
                decision.reason
            );
        }

        let record = AuditRecord::from_decision(
            self.clock.now(),
            caller,
            attested,
            decision.clone(),
            path,
            method,
        );
        self.audit.append(record).await;

        decision
    }

    /// Run [`AuthzHandler::authorize`] on its own task and wait for it.
    ///
    /// Once started, the decision and its audit record complete even if the
    /// caller stops waiting (for example because the connection closed).
    pub async fn authorize_detached(
        self: Arc<Self>,
        peer: Option<PeerCertificates>,
        method: String,
        path: String,
    ) -> Decision {
        let task = tokio::spawn(async move {
            self.authorize(peer.as_ref().and_then(PeerCertificates::chain), &method, &path)
                .await
        });
        match task.await {
            Ok(decision) => decision,
            Err(e) => {
                error!(error = %e, "Authorization task failed");
                Decision::deny(format!("internal error: {e}"))
            }
        }
    }
}

/// `GET /protected`
pub async fn protected_handler(
    State(handler): State<Arc<AuthzHandler>>,
    request: Request<Body>,
) -> Response {
    let (parts, _body) = request.into_parts();
    let decision = handler
        .authorize_detached(
            parts.extensions.get::<PeerCertificates>().cloned(),
            parts.method.to_string(),
            parts.uri.path().to_string(),
        )
        .await;

    if decision.allowed {
        (
            StatusCode::OK,
            Json(json!({"status": "ok", "message": "access granted"})),
        )
            .into_response()
    } else {
        (
            StatusCode::FORBIDDEN,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            DENIED_BODY,
        )
            .into_response()
    }
}

/// `GET /health`: liveness only, never touches the authorization path.
pub async fn health_handler() -> &'static str {
    "ok"
}
