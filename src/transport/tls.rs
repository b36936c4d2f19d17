use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use super::Error;
use crate::fsutil;

/// Builds the TLS client configuration for the inventory transport.
///
/// Without a readable CA bundle server certificates are not verified. A
/// readable bundle replaces that with verification against the bundle only.
///
/// # Errors
///
/// Returns [`Error::InvalidCaBundle`] if the bundle can be read but holds no
/// usable certificate.
pub fn client_config(ca_path: Option<&Path>) -> Result<ClientConfig, Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let roots = match ca_path {
        Some(path) => load_ca_bundle(path)?,
        None => None,
    };

    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(Error::Tls)?;

    let config = match roots {
        Some(roots) => builder.with_root_certificates(roots).with_no_client_auth(),
        None => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification::new(provider)))
            .with_no_client_auth(),
    };

    Ok(config)
}

/// Reads a PEM bundle into a root store.
///
/// Returns `Ok(None)` when the file cannot be read.
fn load_ca_bundle(path: &Path) -> Result<Option<RootCertStore>, Error> {
    let pem = match fsutil::read_file(path) {
        Ok(pem) => pem,
        Err(err) => {
            log::warn!("{}; server certificates will not be verified", err);
            return Ok(None);
        }
    };

    let mut pem = pem.as_slice();
    let certs = rustls_pemfile::certs(&mut pem).map_while(|cert| match cert {
        Ok(cert) => Some(cert),
        Err(err) => {
            log::warn!("stopping at unreadable PEM block in `{}`: {}", path.display(), err);
            None
        }
    });

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    log::debug!(
        "Loaded {} CA certificates from `{}` ({} ignored)",
        added,
        path.display(),
        ignored
    );
    if added == 0 {
        return Err(Error::InvalidCaBundle {
            path: path.to_path_buf(),
        });
    }

    Ok(Some(roots))
}

/// Accepts any server certificate chain. Handshake signatures are still checked.
#[derive(Debug)]
struct SkipServerVerification(Arc<CryptoProvider>);

impl SkipServerVerification {
    fn new(provider: Arc<CryptoProvider>) -> Self {
        Self(provider)
    }
}

impl ServerCertVerifier for SkipServerVerification {
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
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
