//! TLS options
//!
//! [`TlsOptions`] is the immutable, listener-scoped configuration every
//! context is built from. It is created once with [`TlsOptions::builder`] and
//! shared by all connections using that configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::key::KeyCertSource;
use super::resources::{FsResourceLoader, ResourceLoader};
use super::trust::TrustSource;
use super::Error;

/// TLS engine used to build contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// OpenSSL through the `openssl` crate (native engine)
    #[default]
    OpenSsl,
    /// rustls with the ring crypto provider (platform engine)
    Rustls,
}

impl Engine {
    /// Parse engine name (case-insensitive)
    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "openssl" | "native" => Ok(Engine::OpenSsl),
            "rustls" | "platform" => Ok(Engine::Rustls),
            _ => Err(Error::Config(format!("Unknown TLS engine: {}", s))),
        }
    }

    /// Get engine name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::OpenSsl => "openssl",
            Engine::Rustls => "rustls",
        }
    }

    /// Cipher suites used when none are configured
    pub fn default_cipher_suites(&self) -> Vec<String> {
        match self {
            Engine::OpenSsl => super::engine::native::default_cipher_suites(),
            Engine::Rustls => super::engine::platform::default_cipher_suites(),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side of the handshake a context is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn is_server(&self) -> bool {
        matches!(self, Role::Server)
    }
}

/// Client certificate verification mode (server-side)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientAuth {
    /// Don't request client certificates
    #[default]
    None,
    /// Request client certificate but don't require it
    Request,
    /// Require client certificate
    Required,
}

/// Immutable TLS options shared by every context built from them
#[derive(Clone)]
pub struct TlsOptions {
    pub(crate) engine: Engine,
    pub(crate) session_cache_enabled: bool,
    pub(crate) key_source: Option<Arc<dyn KeyCertSource>>,
    pub(crate) trust_source: Option<Arc<dyn TrustSource>>,
    pub(crate) crl_paths: Vec<PathBuf>,
    pub(crate) crl_values: Vec<Vec<u8>>,
    pub(crate) cipher_suites: Vec<String>,
    pub(crate) application_protocols: Vec<String>,
    pub(crate) client_auth: ClientAuth,
    pub(crate) resources: Arc<dyn ResourceLoader>,
}

impl TlsOptions {
    /// Create a new options builder
    pub fn builder() -> TlsOptionsBuilder {
        TlsOptionsBuilder::new()
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Session cache flag, only applied to OpenSSL server contexts
    pub fn session_cache_enabled(&self) -> bool {
        self.session_cache_enabled
    }

    pub fn cipher_suites(&self) -> &[String] {
        &self.cipher_suites
    }

    pub fn application_protocols(&self) -> &[String] {
        &self.application_protocols
    }

    pub fn client_auth(&self) -> ClientAuth {
        self.client_auth
    }

    /// Whether any CRL source (path or value) is configured
    pub fn has_crls(&self) -> bool {
        !self.crl_paths.is_empty() || !self.crl_values.is_empty()
    }

    pub fn resources(&self) -> &Arc<dyn ResourceLoader> {
        &self.resources
    }
}

impl Default for TlsOptions {
    fn default() -> Self {
        TlsOptionsBuilder::new().build()
    }
}

impl fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsOptions")
            .field("engine", &self.engine)
            .field("session_cache_enabled", &self.session_cache_enabled)
            .field("key_source", &self.key_source.is_some())
            .field("trust_source", &self.trust_source.is_some())
            .field("crl_paths", &self.crl_paths)
            .field("crl_values", &self.crl_values.len())
            .field("cipher_suites", &self.cipher_suites)
            .field("application_protocols", &self.application_protocols)
            .field("client_auth", &self.client_auth)
            .finish()
    }
}

/// Options builder
pub struct TlsOptionsBuilder {
    options: TlsOptions,
}

impl TlsOptionsBuilder {
    fn new() -> Self {
        TlsOptionsBuilder {
            options: TlsOptions {
                engine: Engine::OpenSsl,
                session_cache_enabled: true,
                key_source: None,
                trust_source: None,
                crl_paths: Vec::new(),
                crl_values: Vec::new(),
                cipher_suites: Vec::new(),
                application_protocols: Vec::new(),
                client_auth: ClientAuth::None,
                resources: Arc::new(FsResourceLoader::current_dir()),
            },
        }
    }

    /// Select the TLS engine
    pub fn engine(mut self, engine: Engine) -> Self {
        self.options.engine = engine;
        self
    }

    /// Enable/disable the server session cache (OpenSSL only)
    pub fn session_cache_enabled(mut self, enabled: bool) -> Self {
        self.options.session_cache_enabled = enabled;
        self
    }

    pub fn key_source(mut self, source: Arc<dyn KeyCertSource>) -> Self {
        self.options.key_source = Some(source);
        self
    }

    pub fn trust_source(mut self, source: Arc<dyn TrustSource>) -> Self {
        self.options.trust_source = Some(source);
        self
    }

    /// Add a CRL file, resolved through the resource loader
    pub fn crl_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.crl_paths.push(path.into());
        self
    }

    /// Add an in-memory CRL (DER or PEM)
    pub fn crl_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.options.crl_values.push(value.into());
        self
    }

    /// Add an enabled cipher suite; duplicates are ignored
    pub fn cipher_suite(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.options.cipher_suites.contains(&name) {
            self.options.cipher_suites.push(name);
        }
        self
    }

    /// Add several enabled cipher suites
    pub fn cipher_suites<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(self, |b, name| b.cipher_suite(name))
    }

    /// Set ALPN protocols, in preference order
    pub fn application_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.application_protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Set client certificate verification mode for server contexts
    pub fn client_auth(mut self, mode: ClientAuth) -> Self {
        self.options.client_auth = mode;
        self
    }

    /// Replace the loader used for CRL and key/trust files
    pub fn resources(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.options.resources = loader;
        self
    }

    /// Build the options
    pub fn build(self) -> TlsOptions {
        self.options
    }
}
