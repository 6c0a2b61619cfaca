//! tls-context - TLS context factory
//!
//! This crate builds ready-to-use TLS contexts (OpenSSL or rustls) from a
//! declarative set of options: key material, trust material, certificate
//! revocation lists, cipher suites and ALPN protocols.

pub mod tls;

pub use tls::{
    ContextBuilder, CredentialResolver, Engine, Error, KeyMaterial, Result, Role,
    SslContextFactory, TlsContext, TlsOptions, TrustMaterial,
};
