//! TLS context construction
//!
//! This module turns a [`TlsOptions`] value into an immutable [`TlsContext`]
//! for either the client or the server role.
//!
//! # Architecture
//!
//! Construction runs in two stages:
//!
//! 1. [`CredentialResolver`] picks the key material and trust material for the
//!    connection, trying the per-server-name (SNI) mappings first and falling
//!    back to the defaults. Configured CRLs are loaded here and wrapped around
//!    every trust validator.
//! 2. [`ContextBuilder`] feeds the resolved material, cipher suites and ALPN
//!    protocols into the selected engine (OpenSSL or rustls).
//!
//! [`SslContextFactory`] ties both stages together and is the entry point most
//! callers want.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use tls_context::tls::{PemKeyCert, PemTrust, Role, SslContextFactory, TlsOptions};
//!
//! let options = TlsOptions::builder()
//!     .key_source(Arc::new(PemKeyCert::from_paths("server.key", "server.pem")))
//!     .trust_source(Arc::new(PemTrust::from_paths(["ca.pem"])))
//!     .crl_path("revoked.crl")
//!     .application_protocols(["h2", "http/1.1"])
//!     .build();
//!
//! let factory = SslContextFactory::new(options);
//! let ctx = factory
//!     .create_context(Some("example.com"), true, Role::Server, false)
//!     .unwrap();
//! assert_eq!(ctx.application_protocols(), ["h2", "http/1.1"]);
//! ```

pub mod builder;
pub mod cert;
pub mod context;
pub mod engine;
pub mod factory;
pub mod key;
pub mod options;
pub mod resolver;
pub mod resources;
pub mod revocation;
pub mod session;
pub mod settings;
pub mod trust;
pub mod validator;

#[cfg(test)]
pub(crate) mod testutil;

use std::path::PathBuf;

pub use builder::ContextBuilder;
pub use cert::CertInfo;
pub use context::{AlpnConfig, ListenerFailure, SelectorFailure, TlsContext};
pub use factory::SslContextFactory;
pub use key::{KeyCertSource, KeyMapper, KeyMaterial, KeyProvider, PemKeyCert, Pkcs12KeyCert};
pub use options::{ClientAuth, Engine, Role, TlsOptions, TlsOptionsBuilder};
pub use resolver::CredentialResolver;
pub use resources::{FsResourceLoader, MemoryResourceLoader, ResourceLoader};
pub use revocation::{decorate_all, parse_revocation_lists, RevocationDecorator, RevocationList};
pub use session::TlsStream;
pub use settings::{KeySettings, PemPairSettings, TlsSettings, TrustSettings};
pub use trust::{PemTrust, SniTrust, SystemTrust, TrustMaterial, TrustSource, ValidatorMapper};
pub use validator::{CertificateError, StoreValidator, TrustAllValidator, TrustValidator};

/// Result type for TLS context operations
pub type Result<T> = std::result::Result<T, Error>;

/// TLS context errors
///
/// Every failure raised while resolving credentials or building a context is
/// reported through this one type. Engine specific error types are flattened
/// into [`Error::Provider`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("TLS provider error: {0}")]
    Provider(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<openssl::error::ErrorStack> for Error {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Error::Provider(err.to_string())
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::Provider(err.to_string())
    }
}
