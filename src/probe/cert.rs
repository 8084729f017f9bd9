//! TLS certificate inspection for HTTPS endpoints.
//!
//! Chain and hostname checks are skipped so that expired or otherwise invalid
//! certificates can still be reported, but handshake signatures are verified
//! against the presented leaf key. Only the leaf's validity is read.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// Certificate inspection errors. None of these fail a probe.
#[derive(Error, Debug)]
pub enum CertError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("tls setup failed: {0}")]
    Setup(#[from] rustls::Error),
    #[error("connect failed: {0}")]
    Connect(std::io::Error),
    #[error("handshake failed: {0}")]
    Handshake(std::io::Error),
    #[error("no peer certificate presented")]
    NoCertificate,
    #[error("certificate parse failed: {0}")]
    Parse(String),
    #[error("certificate check timed out after {0:?}")]
    Timeout(Duration),
}

/// Validity of the leaf certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertStatus {
    /// Whole days until `notAfter`; negative once expired.
    pub days_remaining: i64,
    pub expired: bool,
}

impl CertStatus {
    pub fn from_not_after(not_after: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let days_remaining = (not_after - now).num_days();
        Self {
            days_remaining,
            expired: days_remaining <= 0,
        }
    }
}

/// Reads the certificate presented by an HTTPS endpoint.
pub trait CertInspector: Send + Sync {
    fn inspect(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<CertStatus, CertError>> + Send;
}

/// Inspector that performs a real TLS handshake.
#[derive(Clone)]
pub struct TlsInspector {
    connector: TlsConnector,
}

impl TlsInspector {
    pub fn new() -> Result<Self, CertError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(InspectOnlyVerifier { provider }))
            .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
        })
    }

    async fn handshake(&self, host: String, port: u16) -> Result<CertStatus, CertError> {
        let server_name =
            ServerName::try_from(host.clone()).map_err(|e| CertError::InvalidUrl(e.to_string()))?;

        let tcp = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(CertError::Connect)?;
        let tls = self
            .connector
            .connect(server_name, tcp)
            .await
            .map_err(CertError::Handshake)?;

        let (_, conn) = tls.get_ref();
        let leaf = conn
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or(CertError::NoCertificate)?;

        let not_after = leaf_not_after(leaf)?;
        Ok(CertStatus::from_not_after(not_after, Utc::now()))
    }
}

impl CertInspector for TlsInspector {
    async fn inspect(&self, url: &str, timeout: Duration) -> Result<CertStatus, CertError> {
        let (host, port) = host_port(url)?;
        tokio::time::timeout(timeout, self.handshake(host, port))
            .await
            .map_err(|_| CertError::Timeout(timeout))?
    }
}

/// Host and port to dial for a URL; the port defaults per scheme.
fn host_port(url: &str) -> Result<(String, u16), CertError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| CertError::InvalidUrl(e.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| CertError::InvalidUrl(format!("{} has no host", url)))?;
    let port = parsed.port_or_known_default().unwrap_or(443);

    // IPv6 literals come back bracketed
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok((host.to_string(), port))
}

fn leaf_not_after(der: &CertificateDer<'_>) -> Result<DateTime<Utc>, CertError> {
    let (_, cert) = x509_parser::parse_x509_certificate(der.as_ref())
        .map_err(|e| CertError::Parse(e.to_string()))?;
    let timestamp = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| CertError::Parse(format!("notAfter out of range: {}", timestamp)))
}

/// Accepts any chain but still checks handshake signatures.
#[derive(Debug)]
struct InspectOnlyVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for InspectOnlyVerifier {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
