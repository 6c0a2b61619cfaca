//! rustls backend
//!
//! Builds `rustls::ServerConfig` / `rustls::ClientConfig` on the ring
//! provider. Cipher suites are named the way rustls prints them
//! (`TLS13_AES_128_GCM_SHA256`, `TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256`).
//! Peer certificates go through the same trust validators as the OpenSSL
//! backend via the verifier adapters below.

use std::sync::Arc;

use openssl::x509::X509;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{
    ClientConfig, DigitallySignedStruct, DistinguishedName, OtherError, ServerConfig,
    SignatureScheme, SupportedCipherSuite,
};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use tracing::debug;

use super::{check_chain, EngineInput};
use crate::tls::context::EngineContext;
use crate::tls::key::KeyProvider;
use crate::tls::options::{ClientAuth, Role};
use crate::tls::validator::{CertificateError, TrustValidator};
use crate::tls::{Error, Result};

fn suite_name(suite: &SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

pub(crate) fn default_cipher_suites() -> Vec<String> {
    ring::default_provider()
        .cipher_suites
        .iter()
        .map(suite_name)
        .collect()
}

/// Ring provider restricted to `names`, in the given order
fn provider_for(names: &[String]) -> Result<Arc<CryptoProvider>> {
    let base = ring::default_provider();
    let mut suites = Vec::with_capacity(names.len());
    for name in names {
        let suite = base
            .cipher_suites
            .iter()
            .find(|suite| suite_name(suite) == *name)
            .ok_or_else(|| Error::Config(format!("Unsupported cipher suite for rustls: {}", name)))?;
        suites.push(*suite);
    }
    Ok(Arc::new(CryptoProvider {
        cipher_suites: suites,
        ..base
    }))
}

/// Build a rustls configuration for the requested role
pub(crate) fn build(input: &EngineInput<'_>) -> Result<EngineContext> {
    let provider = provider_for(input.cipher_suites)?;
    let alpn_protocols: Vec<Vec<u8>> = input
        .alpn
        .map(|alpn| alpn.protocols().iter().map(|p| p.as_bytes().to_vec()).collect())
        .unwrap_or_default();

    match input.role {
        Role::Server => {
            let identity = input
                .key
                .provider()
                .ok_or_else(|| Error::Config("Key/certificate is mandatory for SSL".to_string()))?;

            let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
                .with_safe_default_protocol_versions()?;
            let builder = if input.verifies_peer() {
                let verifier = ValidatorClientVerifier {
                    validators: input.trust.validators(),
                    root_hints: root_hints(&input.trust.accepted_issuers())?,
                    mandatory: input.client_auth == ClientAuth::Required,
                    provider: Arc::clone(&provider),
                };
                builder.with_client_cert_verifier(Arc::new(verifier))
            } else {
                builder.with_no_client_auth()
            };

            let mut config = builder.with_single_cert(cert_chain(identity)?, private_key(identity)?)?;
            config.alpn_protocols = alpn_protocols;
            debug!("built rustls server configuration");
            Ok(EngineContext::RustlsServer(Arc::new(config)))
        }
        Role::Client => {
            let verifier = ValidatorServerVerifier {
                validators: if input.verifies_peer() {
                    input.trust.validators()
                } else {
                    Vec::new()
                },
                provider: Arc::clone(&provider),
            };
            let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
                .with_safe_default_protocol_versions()?
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(verifier));

            let mut config = match input.key.provider() {
                Some(identity) => {
                    builder.with_client_auth_cert(cert_chain(identity)?, private_key(identity)?)?
                }
                None => builder.with_no_client_auth(),
            };
            config.alpn_protocols = alpn_protocols;
            debug!("built rustls client configuration");
            Ok(EngineContext::RustlsClient(Arc::new(config)))
        }
    }
}

fn cert_chain(identity: &KeyProvider) -> Result<Vec<CertificateDer<'static>>> {
    identity
        .chain()
        .iter()
        .map(|cert| -> Result<CertificateDer<'static>> { Ok(CertificateDer::from(cert.to_der()?)) })
        .collect()
}

fn private_key(identity: &KeyProvider) -> Result<PrivateKeyDer<'static>> {
    let der = identity.private_key().private_key_to_pkcs8()?;
    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der)))
}

fn root_hints(issuers: &[X509]) -> Result<Vec<DistinguishedName>> {
    issuers
        .iter()
        .map(|issuer| -> Result<DistinguishedName> {
            Ok(DistinguishedName::from(issuer.subject_name().to_der()?))
        })
        .collect()
}

fn to_x509_chain(
    end_entity: &CertificateDer<'_>,
    intermediates: &[CertificateDer<'_>],
) -> std::result::Result<Vec<X509>, rustls::Error> {
    std::iter::once(end_entity)
        .chain(intermediates)
        .map(|der| {
            X509::from_der(der.as_ref())
                .map_err(|_| rustls::Error::InvalidCertificate(rustls::CertificateError::BadEncoding))
        })
        .collect()
}

fn to_rustls_error(err: CertificateError) -> rustls::Error {
    match err {
        CertificateError::Revoked => {
            rustls::Error::InvalidCertificate(rustls::CertificateError::Revoked)
        }
        other => rustls::Error::InvalidCertificate(rustls::CertificateError::Other(OtherError(
            Arc::new(other),
        ))),
    }
}

/// Server certificate verifier backed by trust validators
///
/// An empty validator set accepts every certificate.
#[derive(Debug)]
struct ValidatorServerVerifier {
    validators: Vec<Arc<dyn TrustValidator>>,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for ValidatorServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if !self.validators.is_empty() {
            let chain = to_x509_chain(end_entity, intermediates)?;
            check_chain(&self.validators, Role::Client, &chain).map_err(to_rustls_error)?;
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

/// Client certificate verifier backed by trust validators
#[derive(Debug)]
struct ValidatorClientVerifier {
    validators: Vec<Arc<dyn TrustValidator>>,
    root_hints: Vec<DistinguishedName>,
    mandatory: bool,
    provider: Arc<CryptoProvider>,
}

impl ClientCertVerifier for ValidatorClientVerifier {
    fn client_auth_mandatory(&self) -> bool {
        self.mandatory
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &self.root_hints
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> std::result::Result<ClientCertVerified, rustls::Error> {
        let chain = to_x509_chain(end_entity, intermediates)?;
        check_chain(&self.validators, Role::Server, &chain).map_err(to_rustls_error)?;
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
