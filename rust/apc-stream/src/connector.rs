//! Dialing the agent server.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{DigitallySignedStruct, SignatureScheme};
use tracing::debug;

/// A factory that dials the agent server on demand.
///
/// The session layer consumes only the byte stream, so anything that can
/// produce one fits here; in particular the legacy TLS 1.0 compatibility
/// transport is an implementation of this trait supplied by the caller.
pub trait Connector: Send + Sync + 'static {
    /// The stream type (e.g. `TcpStream`, `TlsStream<TcpStream>`).
    type Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Establish a new connection.
    fn connect(&self) -> impl std::future::Future<Output = io::Result<Self::Transport>> + Send;
}

/// Plain TCP, no TLS. Useful against local test harnesses.
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// Dial `addr` (`host:port`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl Connector for TcpConnector {
    type Transport = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        TcpStream::connect(&self.addr).await
    }
}

/// TCP wrapped in TLS.
///
/// Production agent servers present self-signed certificates, so
/// [`TlsConnector::insecure`] disables verification; the default verifies
/// against the webpki root set.
pub struct TlsConnector {
    addr: String,
    skip_verify: bool,
}

impl TlsConnector {
    /// Dial `addr` (`host:port`) with certificate verification.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            skip_verify: false,
        }
    }

    /// Dial `addr` accepting any server certificate.
    pub fn insecure(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            skip_verify: true,
        }
    }

    fn client_config(&self) -> rustls::ClientConfig {
        if self.skip_verify {
            rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification))
                .with_no_client_auth()
        } else {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        }
    }

    fn server_name(&self) -> io::Result<ServerName<'static>> {
        let host = self
            .addr
            .rsplit_once(':')
            .map(|(host, _port)| host)
            .unwrap_or(&self.addr);
        ServerName::try_from(host.to_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }
}

impl Connector for TlsConnector {
    type Transport = TlsStream<TcpStream>;

    async fn connect(&self) -> io::Result<TlsStream<TcpStream>> {
        let server_name = self.server_name()?;
        let tcp = TcpStream::connect(&self.addr).await?;
        debug!(addr = %self.addr, skip_verify = self.skip_verify, "starting TLS handshake");

        let connector = tokio_rustls::TlsConnector::from(Arc::new(self.client_config()));
        connector.connect(server_name, tcp).await
    }
}

/// Accepts any certificate chain. Self-signed deployments only.
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
