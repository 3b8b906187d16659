//! RTSPS client handshake.
//!
//! Without a pinned fingerprint the server certificate is checked against
//! the Mozilla root set. With one, the chain is ignored and the leaf
//! certificate must hash (SHA-256) to the configured value; this is how
//! cameras with self-signed certificates are trusted.

use std::net::TcpStream;
use std::sync::Arc;
use std::time::Instant;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    CertificateError, ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore,
    SignatureScheme, StreamOwned,
};
use sha2::{Digest, Sha256};

use crate::cancel::CancelToken;
use crate::error::{Result, SourceError, TimeoutKind, is_timeout};

pub type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// Upper-case hex SHA-256 of a DER certificate.
pub fn fingerprint(cert: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(cert))
}

#[derive(Debug)]
struct PinnedCertVerifier {
    fingerprint: String,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let actual = fingerprint(end_entity.as_ref());
        if actual == self.fingerprint {
            Ok(ServerCertVerified::assertion())
        } else {
            tracing::warn!(expected = %self.fingerprint, %actual, "server certificate fingerprint mismatch");
            Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
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
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
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

fn client_config(pin: Option<&str>) -> Result<Arc<ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| SourceError::InvalidConfig(format!("TLS setup failed: {e}")))?;

    let config = match pin {
        Some(fingerprint) => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(PinnedCertVerifier {
                fingerprint: fingerprint.to_string(),
                provider,
            }))
            .with_no_client_auth(),
        None => {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        }
    };
    Ok(Arc::new(config))
}

/// Run the TLS handshake over an established TCP connection.
///
/// `tcp` must already carry a short read timeout so the loop can observe
/// `deadline` and cancellation.
pub fn connect(
    mut tcp: TcpStream,
    server_name: &str,
    pin: Option<&str>,
    deadline: Instant,
    cancel: &CancelToken,
) -> Result<TlsStream> {
    let config = client_config(pin)?;
    let name = ServerName::try_from(server_name.to_string())
        .map_err(|e| SourceError::InvalidSourceUrl(format!("invalid TLS server name: {e}")))?;
    let mut conn = ClientConnection::new(config, name)
        .map_err(|e| SourceError::ConnectionLost(format!("TLS setup failed: {e}")))?;

    while conn.is_handshaking() {
        cancel.check()?;
        match conn.complete_io(&mut tcp) {
            Ok(_) => {}
            Err(e) if is_timeout(&e) => {
                if Instant::now() >= deadline {
                    return Err(SourceError::Timeout(TimeoutKind::Connect));
                }
            }
            Err(e) => {
                let rejected = e
                    .get_ref()
                    .and_then(|inner| inner.downcast_ref::<rustls::Error>())
                    .is_some_and(|tls| matches!(tls, rustls::Error::InvalidCertificate(_)));
                return Err(match (rejected, pin) {
                    (true, Some(expected)) => SourceError::CertificateMismatch {
                        expected: expected.to_string(),
                    },
                    _ => cancel.filter(SourceError::ConnectionLost(format!(
                        "TLS handshake failed: {e}"
                    ))),
                });
            }
        }
    }

    tracing::debug!(
        version = ?conn.protocol_version(),
        cipher = ?conn.negotiated_cipher_suite().map(|s| s.suite()),
        "TLS established"
    );
    Ok(StreamOwned::new(conn, tcp))
}
