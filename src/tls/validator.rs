//! Trust validators
//!
//! A [`TrustValidator`] decides whether a peer's certificate chain is
//! accepted. Validators are symmetric: the same instance checks chains sent
//! by servers (client role) and by clients (server role).

use std::fmt;
use std::sync::Arc;

use openssl::stack::Stack;
use openssl::x509::store::{X509Store, X509StoreBuilder};
use openssl::x509::{X509StoreContext, X509};

use super::cert::CertInfo;

/// Per-handshake certificate rejection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CertificateError {
    #[error("Certificate revoked")]
    Revoked,

    #[error("Certificate rejected: {0}")]
    Rejected(String),

    #[error("Empty certificate chain")]
    EmptyChain,
}

/// Capability deciding whether a presented certificate chain is trusted
///
/// `chain[0]` is the peer's end-entity certificate, followed by whatever
/// intermediates the peer sent.
pub trait TrustValidator: Send + Sync + fmt::Debug {
    /// Validate a chain presented by a client
    fn check_client_trusted(&self, chain: &[X509]) -> Result<(), CertificateError>;

    /// Validate a chain presented by a server
    fn check_server_trusted(&self, chain: &[X509]) -> Result<(), CertificateError>;

    /// Issuers this validator trusts
    fn accepted_issuers(&self) -> Vec<X509>;

    /// Whether chains are checked against revocation lists first
    fn checks_revocation(&self) -> bool {
        false
    }
}

impl<T: TrustValidator + ?Sized> TrustValidator for Arc<T> {
    fn check_client_trusted(&self, chain: &[X509]) -> Result<(), CertificateError> {
        (**self).check_client_trusted(chain)
    }

    fn check_server_trusted(&self, chain: &[X509]) -> Result<(), CertificateError> {
        (**self).check_server_trusted(chain)
    }

    fn accepted_issuers(&self) -> Vec<X509> {
        (**self).accepted_issuers()
    }

    fn checks_revocation(&self) -> bool {
        (**self).checks_revocation()
    }
}

/// Validator accepting every chain (explicit insecure mode)
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustAllValidator;

impl TrustValidator for TrustAllValidator {
    fn check_client_trusted(&self, _chain: &[X509]) -> Result<(), CertificateError> {
        Ok(())
    }

    fn check_server_trusted(&self, _chain: &[X509]) -> Result<(), CertificateError> {
        Ok(())
    }

    fn accepted_issuers(&self) -> Vec<X509> {
        Vec::new()
    }
}

/// Validator backed by an OpenSSL certificate store
///
/// Path building and signature checks are done by OpenSSL's
/// `X509_verify_cert`.
pub struct StoreValidator {
    store: X509Store,
    anchors: Vec<X509>,
}

impl StoreValidator {
    /// Trust exactly the given anchors
    pub fn new(anchors: Vec<X509>) -> super::Result<Self> {
        let mut builder = X509StoreBuilder::new()?;
        for anchor in &anchors {
            builder.add_cert(anchor.clone())?;
        }
        Ok(StoreValidator {
            store: builder.build(),
            anchors,
        })
    }

    /// Trust the platform's default CA locations
    pub fn system() -> super::Result<Self> {
        let mut builder = X509StoreBuilder::new()?;
        builder.set_default_paths()?;
        Ok(StoreValidator {
            store: builder.build(),
            anchors: Vec::new(),
        })
    }

    fn verify(&self, chain: &[X509]) -> Result<(), CertificateError> {
        let (leaf, rest) = chain.split_first().ok_or(CertificateError::EmptyChain)?;
        let rejected = |e: openssl::error::ErrorStack| CertificateError::Rejected(e.to_string());

        let mut untrusted = Stack::new().map_err(rejected)?;
        for cert in rest {
            untrusted.push(cert.clone()).map_err(rejected)?;
        }

        let mut ctx = X509StoreContext::new().map_err(rejected)?;
        let failure = ctx
            .init(&self.store, leaf, &untrusted, |c| {
                if c.verify_cert()? {
                    Ok(None)
                } else {
                    Ok(Some(c.error()))
                }
            })
            .map_err(rejected)?;

        match failure {
            None => Ok(()),
            Some(err) => {
                tracing::trace!(
                    subject = %CertInfo::from_x509_ref(leaf).subject,
                    "chain rejected by store: {}",
                    err.error_string()
                );
                Err(CertificateError::Rejected(err.error_string().to_string()))
            }
        }
    }
}

impl TrustValidator for StoreValidator {
    fn check_client_trusted(&self, chain: &[X509]) -> Result<(), CertificateError> {
        self.verify(chain)
    }

    fn check_server_trusted(&self, chain: &[X509]) -> Result<(), CertificateError> {
        self.verify(chain)
    }

    fn accepted_issuers(&self) -> Vec<X509> {
        self.anchors.clone()
    }
}

impl fmt::Debug for StoreValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreValidator")
            .field("anchors", &self.anchors.len())
            .finish()
    }
}
