//! Certificate identity extraction.
//!
//! Parses the leaf of a verified client chain and derives the caller's
//! SPIFFE identity: the first SAN URI whose scheme is `spiffe`
//! (case-insensitive). Extraction never fails; an unusable chain is simply
//! "no identity", and policy decides what that means.

use rustls::pki_types::CertificateDer;
use tracing::debug;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use crate::{Error, Result};

/// URI scheme of a SPIFFE identity.
pub const SPIFFE_SCHEME: &str = "spiffe";

// ─────────────────────────────────────────────────────────────────────────────
// Identity extractor
// ─────────────────────────────────────────────────────────────────────────────

/// Derive the caller identity from the peer certificate chain.
///
/// Returns `None` when no certificate was presented, the leaf cannot be
/// parsed, or the leaf carries no SPIFFE URI.
#[must_use]
pub fn extract(peer_certificates: Option<&[CertificateDer<'_>]>) -> Option<String> {
    inspect(peer_certificates)?.spiffe_id
}

/// Parse the leaf of the peer chain.
///
/// Returns `None` when no certificate was presented or the leaf cannot be
/// parsed. Only the leaf is ever inspected.
#[must_use]
pub fn inspect(peer_certificates: Option<&[CertificateDer<'_>]>) -> Option<CertIdentity> {
    let leaf = peer_certificates?.first()?;
    match CertIdentity::from_der(leaf) {
        Ok(identity) => Some(identity),
        Err(e) => {
            debug!(error = %e, "Peer leaf certificate unreadable, treating caller as unattested");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Certificate identity
// ─────────────────────────────────────────────────────────────────────────────

/// Identity fields read from a client certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertIdentity {
    /// Certificate Common Name (CN).
    pub common_name: Option<String>,

    /// Subject Alternative Name: URI entries, in certificate order.
    pub san_uris: Vec<String>,

    /// Subject Alternative Name: DNS entries.
    pub san_dns_names: Vec<String>,

    /// First SAN URI with a `spiffe` scheme, normalised.
    pub spiffe_id: Option<String>,

    /// Pre-computed human-readable label for logs.
    pub display_name: String,
}

impl CertIdentity {
    /// Parse a DER-encoded certificate and extract its identity fields.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the certificate cannot be parsed.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::Config(format!("Failed to parse client certificate: {e}")))?;

        let common_name = extract_cn(&cert);
        let (san_uris, san_dns_names) = extract_sans(&cert);
        let spiffe_id = san_uris.iter().find_map(|u| spiffe_uri(u));

        let display_name = spiffe_id
            .as_deref()
            .or(common_name.as_deref())
            .unwrap_or("<unknown>")
            .to_owned();

        Ok(Self {
            common_name,
            san_uris,
            san_dns_names,
            spiffe_id,
            display_name,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Extract the CN attribute from the subject DN.
fn extract_cn(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}

/// Extract SAN URI and SAN DNS entries from the certificate extensions.
fn extract_sans(cert: &X509Certificate<'_>) -> (Vec<String>, Vec<String>) {
    let mut uris = Vec::new();
    let mut dns_names = Vec::new();

    if let Ok(Some(san_ext)) = cert.subject_alternative_name() {
        for name in &san_ext.value.general_names {
            match name {
                GeneralName::URI(uri) => uris.push((*uri).to_owned()),
                GeneralName::DNSName(dns) => dns_names.push((*dns).to_owned()),
                _ => {}
            }
        }
    }

    (uris, dns_names)
}

/// Return the URI in canonical form if its scheme is `spiffe`.
///
/// The scheme comparison is case-insensitive; `url` lowercases it on parse.
fn spiffe_uri(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    (parsed.scheme() == SPIFFE_SCHEME).then(|| parsed.as_str().to_owned())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
