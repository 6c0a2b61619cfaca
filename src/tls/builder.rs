//! TLS context construction
//!
//! Turns resolved key/trust material plus [`TlsOptions`] into a [`TlsContext`]
//! for one role, on the configured engine.

use tracing::debug;

use super::context::{AlpnConfig, EngineContext, ListenerFailure, SelectorFailure, TlsContext};
use super::engine::{native, platform, EngineInput};
use super::key::KeyMaterial;
use super::options::{Engine, Role, TlsOptions};
use super::trust::TrustMaterial;
use super::{Error, Result};

/// Builds contexts from options and resolved material
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    options: TlsOptions,
}

impl ContextBuilder {
    pub fn new(options: TlsOptions) -> Self {
        ContextBuilder { options }
    }

    pub fn options(&self) -> &TlsOptions {
        &self.options
    }

    /// Build a context for `role`
    ///
    /// A server context requires key material. Cipher suites fall back to the
    /// engine defaults when none are configured, and ALPN is only set up when
    /// `use_alpn` is true and protocols are configured.
    pub fn build(
        &self,
        role: Role,
        use_alpn: bool,
        key: KeyMaterial,
        trust: TrustMaterial,
    ) -> Result<TlsContext> {
        if role.is_server() && key.is_none() {
            return Err(Error::Config("Key/certificate is mandatory for SSL".to_string()));
        }

        let engine = self.options.engine();
        let cipher_suites = if self.options.cipher_suites().is_empty() {
            engine.default_cipher_suites()
        } else {
            self.options.cipher_suites().to_vec()
        };

        let protocols = self.options.application_protocols();
        let alpn = (use_alpn && !protocols.is_empty())
            .then(|| {
                let (selector, listener) = alpn_failure_behavior(engine);
                AlpnConfig::new(protocols.to_vec(), selector, listener)
            })
            .transpose()?;

        let session_cache_enabled = (engine == Engine::OpenSsl && role.is_server())
            .then_some(self.options.session_cache_enabled());

        let input = EngineInput {
            role,
            key: &key,
            trust: &trust,
            cipher_suites: &cipher_suites,
            alpn: alpn.as_ref(),
            session_cache_enabled: session_cache_enabled.unwrap_or(false),
            client_auth: self.options.client_auth(),
        };
        let verifies_peer = input.verifies_peer();

        let inner = match engine {
            Engine::OpenSsl => EngineContext::OpenSsl(native::build(&input)?),
            Engine::Rustls => platform::build(&input)?,
        };

        debug!(
            role = ?role,
            engine = %engine,
            cipher_suites = cipher_suites.len(),
            alpn = alpn.is_some(),
            verifies_peer,
            "built TLS context"
        );

        Ok(TlsContext {
            role,
            engine,
            cipher_suites,
            alpn,
            session_cache_enabled,
            accepted_issuers: trust.accepted_issuers(),
            key,
            verifies_peer,
            inner,
        })
    }
}

/// ALPN failure handling each engine provides
///
/// Servers on both engines skip the extension when nothing matches (rustls
/// through [`TlsContext::rustls_server_config_for`]). A rustls client aborts
/// when the server picks a protocol it never offered.
fn alpn_failure_behavior(engine: Engine) -> (SelectorFailure, ListenerFailure) {
    match engine {
        Engine::OpenSsl => (SelectorFailure::NoAdvertise, ListenerFailure::Accept),
        Engine::Rustls => (SelectorFailure::NoAdvertise, ListenerFailure::FatalAlert),
    }
}
