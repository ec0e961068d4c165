//! Gateway over real mutual TLS: rcgen CA, axum-server with `PeerCertAcceptor`,
//! and the poller as the client.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use authz_gateway::audit::{AuditRecord, AuditWriter};
use authz_gateway::config::{GatewayConfig, PollerConfig};
use authz_gateway::gateway::{AuthzHandler, create_router};
use authz_gateway::mtls::{PeerCertAcceptor, build_server_config, load_certs};
use authz_gateway::policy::{PolicyDecider, PolicyError};
use authz_gateway::poller::Poller;
use axum_server::Handle;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rcgen::string::Ia5String;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use rustls::{ClientConfig, RootCertStore};

// ── PKI ────────────────────────────────────────────────────────────────────

struct Pki {
    dir: tempfile::TempDir,
}

impl Pki {
    /// CA, a server cert for 127.0.0.1, and a serviceB client cert.
    fn generate() -> Self {
        let dir = tempfile::tempdir().unwrap();

        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::default();
        ca_params.distinguished_name = dn("Test Root CA");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();
        write(dir.path(), "ca.crt", &ca_cert.pem());
        let issuer = Issuer::new(ca_params, ca_key);

        let server_key = KeyPair::generate().unwrap();
        let mut server_params = CertificateParams::default();
        server_params.distinguished_name = dn("serviceA");
        server_params.subject_alt_names = vec![
            SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            SanType::DnsName(Ia5String::try_from("localhost").unwrap()),
        ];
        server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let server_cert = server_params.signed_by(&server_key, &issuer).unwrap();
        write(dir.path(), "serviceA.crt", &server_cert.pem());
        write(dir.path(), "serviceA.key", &server_key.serialize_pem());

        let client_key = KeyPair::generate().unwrap();
        let mut client_params = CertificateParams::default();
        client_params.distinguished_name = dn("serviceB");
        client_params.subject_alt_names = vec![SanType::URI(
            Ia5String::try_from("spiffe://trust/serviceB").unwrap(),
        )];
        client_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let client_cert = client_params.signed_by(&client_key, &issuer).unwrap();
        write(dir.path(), "serviceB.crt", &client_cert.pem());
        write(dir.path(), "serviceB.key", &client_key.serialize_pem());

        Self { dir }
    }

    fn path(&self, name: &str) -> String {
        self.dir.path().join(name).to_string_lossy().into_owned()
    }

    fn audit_path(&self) -> PathBuf {
        self.dir.path().join("shared/audit.jsonl")
    }
}

fn dn(cn: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    dn
}

fn write(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

fn read_audit(path: &Path) -> Vec<AuditRecord> {
    match std::fs::read_to_string(path) {
        Ok(content) => content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect(),
        Err(_) => Vec::new(),
    }
}

// ── gateway ────────────────────────────────────────────────────────────────

/// Approves everyone and records the queries it saw.
#[derive(Default)]
struct Recording {
    calls: Mutex<Vec<(String, bool)>>,
}

#[async_trait]
impl PolicyDecider for Recording {
    async fn decide(&self, identity: &str, attested: bool) -> Result<bool, PolicyError> {
        self.calls.lock().push((identity.to_string(), attested));
        Ok(true)
    }
}

/// Serve the gateway on an ephemeral port; returns its address.
async fn serve(pki: &Pki, decider: Arc<Recording>) -> SocketAddr {
    let config = GatewayConfig {
        opa_url: "http://127.0.0.1:8181/v1/data/authz/allow".to_string(),
        server_cert: pki.path("serviceA.crt"),
        server_key: pki.path("serviceA.key"),
        ca_cert: pki.path("ca.crt"),
        ..Default::default()
    };
    let tls = build_server_config(&config).unwrap();
    let acceptor = PeerCertAcceptor::new(RustlsAcceptor::new(RustlsConfig::from_config(Arc::new(
        tls,
    ))));

    let handler = AuthzHandler::new(decider, Arc::new(AuditWriter::new(pki.audit_path())), None);
    let app = create_router(Arc::new(handler));

    let handle: Handle<SocketAddr> = Handle::new();
    let server = axum_server::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .acceptor(acceptor)
        .handle(handle.clone());
    tokio::spawn(async move {
        server.serve(app.into_make_service()).await.unwrap();
    });
    handle.listening().await.unwrap()
}

fn poller_config(pki: &Pki, addr: SocketAddr) -> PollerConfig {
    PollerConfig {
        target_url: format!("https://{addr}/protected"),
        client_cert: pki.path("serviceB.crt"),
        client_key: pki.path("serviceB.key"),
        ca_cert: pki.path("ca.crt"),
        call_interval: 5,
        call_timeout: Duration::from_secs(3),
    }
}

// ── tests ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn verified_client_chain_reaches_the_handler() {
    // GIVEN: the gateway behind mTLS and serviceB's CA-signed certificate
    let pki = Pki::generate();
    let decider = Arc::new(Recording::default());
    let addr = serve(&pki, Arc::clone(&decider)).await;
    let poller = Poller::new(poller_config(&pki, addr)).unwrap();

    // WHEN: calling /protected once
    let result = poller.call_once().await.unwrap();

    // THEN: access granted for the identity in the certificate
    assert_eq!(result.status, 200);
    let body: serde_json::Value = serde_json::from_str(&result.body).unwrap();
    assert_eq!(body, serde_json::json!({"status": "ok", "message": "access granted"}));
    assert_eq!(
        decider.calls.lock().clone(),
        vec![("spiffe://trust/serviceB".to_string(), true)]
    );

    let records = read_audit(&pki.audit_path());
    assert_eq!(records.len(), 1);
    assert!(records[0].tls_verified);
    assert_eq!(records[0].caller_id, "spiffe://trust/serviceB");
}

#[tokio::test]
async fn handshake_without_client_certificate_is_rejected_unaudited() {
    // GIVEN: a client that trusts the CA but presents no certificate
    let pki = Pki::generate();
    let decider = Arc::new(Recording::default());
    let addr = serve(&pki, Arc::clone(&decider)).await;

    let mut roots = RootCertStore::empty();
    for cert in load_certs(&pki.path("ca.crt")).unwrap() {
        roots.add(cert).unwrap();
    }
    let tls = ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
        .with_root_certificates(roots)
        .with_no_client_auth();
    let client = reqwest::Client::builder()
        .use_preconfigured_tls(tls)
        .timeout(Duration::from_secs(3))
        .build()
        .unwrap();

    // WHEN: calling /protected
    let result = client.get(format!("https://{addr}/protected")).send().await;

    // THEN: the transport fails and the handler never runs
    assert!(result.is_err(), "got {result:?}");
    assert!(decider.calls.lock().is_empty());
    assert!(read_audit(&pki.audit_path()).is_empty());
}

#[tokio::test]
async fn poller_calls_immediately_then_waits_for_the_interval() {
    let pki = Pki::generate();
    let decider = Arc::new(Recording::default());
    let addr = serve(&pki, Arc::clone(&decider)).await;
    let poller = Poller::new(poller_config(&pki, addr)).unwrap();

    // First tick fires at once; the next is 5s away
    let stopped = tokio::time::timeout(Duration::from_millis(1500), poller.run()).await;

    assert!(stopped.is_err());
    assert_eq!(decider.calls.lock().len(), 1);
    assert_eq!(read_audit(&pki.audit_path()).len(), 1);
}

#[tokio::test]
async fn poller_reports_unreachable_target() {
    // GIVEN: a port nothing listens on
    let pki = Pki::generate();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let poller = Poller::new(poller_config(&pki, addr)).unwrap();

    assert!(poller.call_once().await.is_err());
}
