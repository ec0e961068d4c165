//! Mutual TLS: trust configuration and caller identity.
//!
//! # Architecture
//!
//! ```text
//! TCP connection
//!   → TLS 1.3 handshake  (rustls verifies client cert against CA [+ CRL])
//!   → PeerCertificates attached to request extensions   (acceptor)
//!   → SPIFFE identity extracted from the leaf            (identity)
//! ```
//!
//! # Modules
//!
//! - [`tls`]: PEM loading and rustls server/client config building
//! - [`acceptor`]: `axum-server` acceptor exposing the verified peer chain
//! - [`identity`]: SPIFFE identity extraction from X.509 SAN URIs

pub mod acceptor;
pub mod identity;
pub mod tls;

pub use acceptor::{PeerCertAcceptor, PeerCertificates};
pub use identity::{CertIdentity, extract};
pub use tls::{build_client_config, build_server_config, load_certs, load_crls, load_private_key};
