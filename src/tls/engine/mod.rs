//! Engine backends
//!
//! Each backend turns resolved key/trust material into its own context type:
//! [`native`] drives OpenSSL, [`platform`] drives rustls.

pub mod native;
pub mod platform;

use std::sync::Arc;

use openssl::x509::X509;

use super::context::AlpnConfig;
use super::key::KeyMaterial;
use super::options::{ClientAuth, Role};
use super::trust::TrustMaterial;
use super::validator::{CertificateError, TrustValidator};

/// Everything an engine needs to build one context
pub(crate) struct EngineInput<'a> {
    pub role: Role,
    pub key: &'a KeyMaterial,
    pub trust: &'a TrustMaterial,
    pub cipher_suites: &'a [String],
    pub alpn: Option<&'a AlpnConfig>,
    pub session_cache_enabled: bool,
    pub client_auth: ClientAuth,
}

impl EngineInput<'_> {
    /// Whether the peer is asked for a certificate that is then validated
    pub fn verifies_peer(&self) -> bool {
        if self.trust.is_none() {
            return false;
        }
        match self.role {
            Role::Client => true,
            Role::Server => self.client_auth != ClientAuth::None,
        }
    }
}

/// Run `chain` through the validators for the peer of `role`
///
/// The chain is accepted as soon as one validator accepts it. A revocation
/// verdict is final.
pub(crate) fn check_chain(
    validators: &[Arc<dyn TrustValidator>],
    role: Role,
    chain: &[X509],
) -> Result<(), CertificateError> {
    let mut rejection = None;
    for validator in validators {
        let result = match role {
            Role::Client => validator.check_server_trusted(chain),
            Role::Server => validator.check_client_trusted(chain),
        };
        match result {
            Ok(()) => return Ok(()),
            Err(CertificateError::Revoked) => return Err(CertificateError::Revoked),
            Err(err) => {
                rejection.get_or_insert(err);
            }
        }
    }
    Err(rejection.unwrap_or_else(|| CertificateError::Rejected("no trust validator configured".to_string())))
}
