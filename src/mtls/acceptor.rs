//! TLS acceptor that exposes the verified peer chain to handlers.
//!
//! Wraps [`RustlsAcceptor`]: once the handshake succeeds, the client's
//! certificate chain is copied out of the rustls session and attached to
//! every request on the connection as an [`axum::Extension`]. A failed
//! handshake drops the connection before any request exists.

use std::io;
use std::sync::Arc;

use axum::Extension;
use axum::middleware::AddExtension;
use axum_server::accept::Accept;
use axum_server::tls_rustls::RustlsAcceptor;
use futures::future::BoxFuture;
use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tower::Layer;

/// Client certificate chain presented (and verified) during the handshake.
///
/// Leaf first. Empty when the client sent no certificate.
#[derive(Debug, Clone, Default)]
pub struct PeerCertificates(pub Arc<[CertificateDer<'static>]>);

impl PeerCertificates {
    /// Borrow the chain, or `None` when it is empty.
    #[must_use]
    pub fn chain(&self) -> Option<&[CertificateDer<'static>]> {
        (!self.0.is_empty()).then_some(&*self.0)
    }
}

impl From<Vec<CertificateDer<'static>>> for PeerCertificates {
    fn from(certs: Vec<CertificateDer<'static>>) -> Self {
        Self(certs.into())
    }
}

/// Rustls acceptor that injects [`PeerCertificates`] into each connection's
/// service.
#[derive(Debug, Clone)]
pub struct PeerCertAcceptor {
    inner: RustlsAcceptor,
}

impl PeerCertAcceptor {
    /// Wrap an existing rustls acceptor.
    #[must_use]
    pub fn new(inner: RustlsAcceptor) -> Self {
        Self { inner }
    }
}

impl<I, S> Accept<I, S> for PeerCertAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = TlsStream<I>;
    type Service = AddExtension<S, PeerCertificates>;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let acceptor = self.inner.clone();

        Box::pin(async move {
            let (stream, service) = acceptor.accept(stream, service).await?;
            let (_, session) = stream.get_ref();
            let peer = session
                .peer_certificates()
                .map(<[CertificateDer<'static>]>::to_vec)
                .unwrap_or_default();

            let service = Extension(PeerCertificates::from(peer)).layer(service);
            Ok((stream, service))
        })
    }
}
