//! Trust-store loading and client TLS configuration.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::ring;
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, warn};

/// Platform CA bundle read once at core construction.
pub(crate) const CA_BUNDLE_PATH: &str = "/etc/ssl/certs/ca-certificates.crt";

/// Loads the platform trust store, returning the raw PEM bytes alongside the
/// parsed root store. A missing or unreadable bundle yields an empty store.
pub(crate) fn load_trust_store() -> (Vec<u8>, RootCertStore) {
    let mut roots = RootCertStore::empty();
    let pem = match std::fs::read(CA_BUNDLE_PATH) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path = CA_BUNDLE_PATH, %err, "could not read system trust store");
            return (Vec::new(), roots);
        }
    };

    let mut binding = pem.as_slice();
    let certs = rustls_pemfile::certs(&mut binding).filter_map(Result::ok);
    let (added, ignored) = roots.add_parsable_certificates(certs);
    debug!(added, ignored, "loaded system trust store");
    (pem, roots)
}

/// Builds a client config against the given roots, or one that accepts any
/// server certificate when `allow_self_signed` is set.
pub(crate) fn client_config(roots: &Arc<RootCertStore>, allow_self_signed: bool) -> Arc<ClientConfig> {
    let config = if allow_self_signed {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new()))
            .with_no_client_auth()
    } else {
        ClientConfig::builder()
            .with_root_certificates(Arc::clone(roots))
            .with_no_client_auth()
    };
    Arc::new(config)
}

/// Verifier that accepts every presented certificate chain. Only installed
/// when the caller explicitly allows self-signed peers.
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyServerCert {
    fn new() -> Self {
        Self {
            algorithms: ring::default_provider().signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
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
        self.algorithms.supported_schemes()
    }
}
