//! Context factory

use tracing::{debug, warn};

use super::builder::ContextBuilder;
use super::context::TlsContext;
use super::options::{Role, TlsOptions};
use super::resolver::CredentialResolver;
use super::Result;

/// Creates TLS contexts from one set of options
///
/// Each call resolves credentials for the given server name and builds a new
/// context. Any failure, whether while reading files, parsing material or
/// configuring the engine, comes back as a [`super::Error`].
#[derive(Debug, Clone)]
pub struct SslContextFactory {
    resolver: CredentialResolver,
    builder: ContextBuilder,
}

impl SslContextFactory {
    pub fn new(options: TlsOptions) -> Self {
        SslContextFactory {
            resolver: CredentialResolver::new(options.clone()),
            builder: ContextBuilder::new(options),
        }
    }

    pub fn options(&self) -> &TlsOptions {
        self.resolver.options()
    }

    /// Create a context
    ///
    /// * `server_name` - SNI name used to pick per-name key and trust material
    /// * `use_alpn` - set up application protocol negotiation
    /// * `role` - client or server
    /// * `trust_all` - accept every peer certificate
    pub fn create_context(
        &self,
        server_name: Option<&str>,
        use_alpn: bool,
        role: Role,
        trust_all: bool,
    ) -> Result<TlsContext> {
        debug!(?server_name, ?role, use_alpn, trust_all, "creating TLS context");
        let (key, trust) = self
            .resolver
            .resolve(server_name, trust_all)
            .map_err(|err| {
                warn!(?server_name, "failed to resolve TLS credentials: {}", err);
                err
            })?;

        self.builder
            .build(role, use_alpn, key, trust)
            .map_err(|err| {
                warn!(?server_name, ?role, "failed to build TLS context: {}", err);
                err
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::context::ListenerFailure;
    use crate::tls::key::{KeyCertSource, KeyMapper, KeyProvider, PemKeyCert};
    use crate::tls::resources::MemoryResourceLoader;
    use crate::tls::testutil::Pki;
    use crate::tls::trust::PemTrust;
    use crate::tls::Error;
    use std::sync::Arc;

    #[test]
    fn test_server_context_with_sni_identity() {
        let pki = Pki::new("Factory CA");
        let default = pki.leaf("default.example.com", 1);
        let named = pki.leaf("api.example.com", 2);
        let factory = SslContextFactory::new(
            TlsOptions::builder()
                .key_source(Arc::new(
                    PemKeyCert::from_values(default.key_pem(), default.cert_pem())
                        .with_values(named.key_pem(), named.cert_pem()),
                ))
                .build(),
        );

        let ctx = factory
            .create_context(Some("api.example.com"), false, Role::Server, false)
            .unwrap();
        let identity = ctx.key_material().provider().unwrap();
        assert_eq!(identity.info().subject, "api.example.com");

        let ctx = factory.create_context(None, false, Role::Server, false).unwrap();
        let identity = ctx.key_material().provider().unwrap();
        assert_eq!(identity.info().subject, "default.example.com");
    }

    /// Identity for one server name only
    struct SingleName {
        name: &'static str,
        provider: KeyProvider,
    }

    impl KeyCertSource for SingleName {
        fn default_key_material(&self) -> Result<Option<KeyProvider>> {
            Ok(None)
        }

        fn key_material_mapper(&self) -> Result<Option<KeyMapper>> {
            let name = self.name;
            let provider = self.provider.clone();
            Ok(Some(Box::new(move |n: &str| Ok((n == name).then(|| provider.clone())))))
        }
    }

    #[test]
    fn test_per_name_identity_with_alpn() {
        let pki = Pki::new("Factory CA");
        let leaf = pki.leaf("example.com", 4);
        let provider =
            KeyProvider::from_pem(leaf.key_pem().as_bytes(), leaf.cert_pem().as_bytes()).unwrap();
        let factory = SslContextFactory::new(
            TlsOptions::builder()
                .key_source(Arc::new(SingleName {
                    name: "example.com",
                    provider,
                }))
                .application_protocols(["h2", "http/1.1"])
                .build(),
        );

        let ctx = factory
            .create_context(Some("example.com"), true, Role::Server, false)
            .unwrap();
        assert_eq!(ctx.key_material().provider().unwrap().info().subject, "example.com");
        let alpn = ctx.alpn().unwrap();
        assert_eq!(alpn.protocols(), ["h2", "http/1.1"]);
        assert_eq!(alpn.listener_failure(), ListenerFailure::Accept);

        let err = factory
            .create_context(Some("other.com"), true, Role::Server, false)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_repeated_calls_are_equivalent() {
        let pki = Pki::new("Factory CA");
        let leaf = pki.leaf("localhost", 1);
        let factory = SslContextFactory::new(
            TlsOptions::builder()
                .key_source(Arc::new(PemKeyCert::from_values(leaf.key_pem(), leaf.cert_pem())))
                .trust_source(Arc::new(PemTrust::from_values([pki.ca_pem()])))
                .application_protocols(["h2"])
                .build(),
        );

        let first = factory.create_context(None, true, Role::Server, false).unwrap();
        let second = factory.create_context(None, true, Role::Server, false).unwrap();
        assert_eq!(first.cipher_suites(), second.cipher_suites());
        assert_eq!(first.alpn(), second.alpn());
        let issuers = |ctx: &TlsContext| -> Vec<Vec<u8>> {
            ctx.accepted_issuers().iter().map(|c| c.to_der().unwrap()).collect()
        };
        assert_eq!(issuers(&first), issuers(&second));
    }

    #[test]
    fn test_server_without_key_fails() {
        let factory = SslContextFactory::new(TlsOptions::default());
        let err = factory
            .create_context(Some("example.com"), false, Role::Server, false)
            .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg == "Key/certificate is mandatory for SSL"));
    }

    #[test]
    fn test_trust_all_client() {
        let pki = Pki::new("Factory CA");
        let factory = SslContextFactory::new(
            TlsOptions::builder()
                .trust_source(Arc::new(PemTrust::from_values([pki.ca_pem()])))
                .crl_value(pki.crl(&[3]).der)
                .build(),
        );
        let ctx = factory.create_context(None, false, Role::Client, true).unwrap();
        assert!(ctx.verifies_peer());
        assert!(ctx.accepted_issuers().is_empty());
    }

    #[test]
    fn test_failures_surface_as_one_error_type() {
        let missing_key = SslContextFactory::new(
            TlsOptions::builder()
                .key_source(Arc::new(
                    PemKeyCert::from_paths("missing.key", "missing.pem")
                        .with_loader(Arc::new(MemoryResourceLoader::new())),
                ))
                .build(),
        );
        assert!(matches!(
            missing_key.create_context(None, false, Role::Server, false),
            Err(Error::Io { .. })
        ));

        let pki = Pki::new("Factory CA");
        let bad_crl = SslContextFactory::new(
            TlsOptions::builder()
                .trust_source(Arc::new(PemTrust::from_values([pki.ca_pem()])))
                .crl_value(b"not a crl".to_vec())
                .build(),
        );
        assert!(matches!(
            bad_crl.create_context(None, false, Role::Client, false),
            Err(Error::Parse(_))
        ));
    }
}
