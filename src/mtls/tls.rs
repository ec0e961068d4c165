//! Certificate loading and rustls config building.
//!
//! Provides:
//! - [`build_server_config`]: `rustls::ServerConfig` that requires and
//!   verifies client certificates
//! - [`build_client_config`]: `rustls::ClientConfig` presenting a client
//!   certificate (used by the poller)
//! - [`load_certs`] / [`load_private_key`] / [`load_crls`]: PEM file loading
//!
//! # File format
//!
//! All certificate, key and CRL files are expected in **PEM format**.
//! Every failure here is a startup-time `Error::Config`.

use std::fs;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, CertificateRevocationListDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tracing::debug;

use crate::config::GatewayConfig;
use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Public: server / client configs
// ─────────────────────────────────────────────────────────────────────────────

/// Build the mutual-TLS `rustls::ServerConfig` for the gateway.
///
/// Clients without a certificate chaining to `config.ca_cert` are rejected
/// during the handshake; such connections never reach the handler.
///
/// # Errors
///
/// Returns an error if any certificate, key or CRL file cannot be read or
/// parsed, or if the server key does not match its certificate.
pub fn build_server_config(config: &GatewayConfig) -> Result<ServerConfig> {
    let server_certs = load_certs(&config.server_cert)?;
    let server_key = load_private_key(&config.server_key)?;
    let root_store = load_root_store(&config.ca_cert)?;

    let crls = match config.crl_path {
        Some(ref crl_path) => load_crls(crl_path)?,
        None => Vec::new(),
    };

    let client_verifier = WebPkiClientVerifier::builder(Arc::new(root_store))
        .with_crls(crls)
        .build()
        .map_err(|e| Error::Config(format!("Failed to build client verifier: {e}")))?;

    let mut tls_cfg = ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(server_certs, server_key)
        .map_err(|e| Error::Config(format!("TLS config error (cert/key mismatch?): {e}")))?;

    tls_cfg.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    debug!(
        server_cert = %config.server_cert,
        ca_cert = %config.ca_cert,
        crl = config.crl_path.is_some(),
        "mTLS server config built"
    );

    Ok(tls_cfg)
}

/// Build a TLS 1.3 client config that trusts `ca_cert` and presents the
/// given client certificate.
///
/// # Errors
///
/// Returns an error if any file cannot be read or parsed, or the key does
/// not match the certificate.
pub fn build_client_config(client_cert: &str, client_key: &str, ca_cert: &str) -> Result<ClientConfig> {
    let certs = load_certs(client_cert)?;
    let key = load_private_key(client_key)?;
    let root_store = load_root_store(ca_cert)?;

    ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
        .with_root_certificates(root_store)
        .with_client_auth_cert(certs, key)
        .map_err(|e| Error::Config(format!("Client TLS config error (cert/key mismatch?): {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Public: PEM loading
// ─────────────────────────────────────────────────────────────────────────────

/// Load all certificates from a PEM file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or contains no valid PEM
/// certificate blocks.
pub fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let pem_data = read_file(path)?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut pem_data.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Config(format!("Failed to parse certs from '{path}': {e}")))?;

    if certs.is_empty() {
        return Err(Error::Config(format!("No certificates found in '{path}'")));
    }

    Ok(certs)
}

/// Load the first private key from a PEM file.
///
/// Supports RSA (`RSA PRIVATE KEY`), PKCS#8 (`PRIVATE KEY`), and EC keys.
///
/// # Errors
///
/// Returns an error if the file cannot be read or contains no private key.
pub fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let pem_data = read_file(path)?;
    rustls_pemfile::private_key(&mut pem_data.as_slice())
        .map_err(|e| Error::Config(format!("Failed to parse private key from '{path}': {e}")))?
        .ok_or_else(|| Error::Config(format!("No private key found in '{path}'")))
}

/// Load CRL entries from a PEM file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_crls(path: &str) -> Result<Vec<CertificateRevocationListDer<'static>>> {
    let pem_data = read_file(path)?;
    rustls_pemfile::crls(&mut pem_data.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Config(format!("Failed to parse CRL from '{path}': {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Private helpers
// ─────────────────────────────────────────────────────────────────────────────

fn read_file(path: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::Config(format!("Cannot read '{path}': {e}")))
}

/// Build a trust store from every certificate in `path`.
fn load_root_store(path: &str) -> Result<RootCertStore> {
    let mut root_store = RootCertStore::empty();
    for cert in load_certs(path)? {
        root_store
            .add(cert)
            .map_err(|e| Error::Config(format!("Failed to add CA cert to trust store: {e}")))?;
    }
    Ok(root_store)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::string::Ia5String;
    use rcgen::{
        BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, SanType,
    };
    use std::path::Path;

    struct Pem {
        cert: String,
        key: String,
    }

    fn self_signed(cn: &str, is_ca: bool) -> Pem {
        let key_pair = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        params.distinguished_name = dn;
        if is_ca {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        } else {
            params.subject_alt_names = vec![SanType::DnsName(Ia5String::try_from(cn).unwrap())];
        }
        let cert = params.self_signed(&key_pair).unwrap();
        Pem {
            cert: cert.pem(),
            key: key_pair.serialize_pem(),
        }
    }

    fn write(dir: &Path, name: &str, contents: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn gateway_config(dir: &Path) -> GatewayConfig {
        let ca = self_signed("Test Root CA", true);
        let server = self_signed("localhost", false);
        GatewayConfig {
            opa_url: "http://127.0.0.1:8181/v1/data/authz/allow".to_string(),
            server_cert: write(dir, "server.crt", &server.cert),
            server_key: write(dir, "server.key", &server.key),
            ca_cert: write(dir, "ca.crt", &ca.cert),
            ..Default::default()
        }
    }

    // ─── build_server_config ─────────────────────────────────────────────────

    #[test]
    fn server_config_builds_from_valid_pem_files() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = gateway_config(dir.path());

        let tls = build_server_config(&cfg).unwrap();
        assert_eq!(tls.alpn_protocols, vec![b"h2".to_vec(), b"http/1.1".to_vec()]);
    }

    #[test]
    fn server_config_rejects_mismatched_key() {
        // GIVEN: a server cert paired with someone else's key
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = gateway_config(dir.path());
        let other = self_signed("other", false);
        cfg.server_key = write(dir.path(), "other.key", &other.key);

        // THEN: startup fails with a configuration error
        let err = build_server_config(&cfg).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn server_config_fails_on_unreadable_trust_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = gateway_config(dir.path());
        cfg.ca_cert = "/nonexistent/ca.crt".to_string();

        let msg = build_server_config(&cfg).unwrap_err().to_string();
        assert!(msg.contains("Cannot read"));
    }

    #[test]
    fn server_config_fails_on_missing_crl_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = gateway_config(dir.path());
        cfg.crl_path = Some("/nonexistent/ca.crl".to_string());

        assert!(build_server_config(&cfg).is_err());
    }

    // ─── build_client_config ─────────────────────────────────────────────────

    #[test]
    fn client_config_builds_with_matching_key() {
        let dir = tempfile::tempdir().unwrap();
        let ca = self_signed("Test Root CA", true);
        let client = self_signed("serviceB", false);

        let result = build_client_config(
            &write(dir.path(), "client.crt", &client.cert),
            &write(dir.path(), "client.key", &client.key),
            &write(dir.path(), "ca.crt", &ca.cert),
        );
        assert!(result.is_ok());
    }

    // ─── PEM loading ─────────────────────────────────────────────────────────

    #[test]
    fn load_certs_reads_generated_pem() {
        let dir = tempfile::tempdir().unwrap();
        let ca = self_signed("CA", true);
        let path = write(dir.path(), "ca.crt", &ca.cert);

        assert_eq!(load_certs(&path).unwrap().len(), 1);
    }

    #[test]
    fn load_certs_returns_error_for_empty_pem_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "empty.crt", "");

        let msg = load_certs(&path).unwrap_err().to_string();
        assert!(msg.contains("No certificates found"));
    }

    #[test]
    fn load_private_key_reads_generated_pem() {
        let dir = tempfile::tempdir().unwrap();
        let ca = self_signed("CA", true);
        let path = write(dir.path(), "ca.key", &ca.key);

        let key = load_private_key(&path).unwrap();
        assert!(!key.secret_der().is_empty());
    }

    #[test]
    fn load_private_key_returns_error_when_no_key_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let ca = self_signed("CA", true);
        let path = write(dir.path(), "cert_only.pem", &ca.cert);

        assert!(load_private_key(&path).is_err());
    }

    #[test]
    fn load_crls_of_file_without_crls_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ca = self_signed("CA", true);
        let path = write(dir.path(), "no.crl", &ca.cert);

        assert!(load_crls(&path).unwrap().is_empty());
    }
}
