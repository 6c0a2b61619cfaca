//! Key material
//!
//! Identities (a private key plus its certificate chain) come from a
//! [`KeyCertSource`]. A source exposes a default identity and, optionally, a
//! mapper selecting an identity per SNI server name.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;

use super::cert::CertInfo;
use super::resources::{FsResourceLoader, ResourceLoader};
use super::{Error, Result};

/// Per-name key material lookup, obtained once and applied per server name
pub type KeyMapper = Box<dyn Fn(&str) -> Result<Option<KeyProvider>> + Send + Sync>;

/// Reusable identity handle understood by every engine
///
/// Cloning is cheap; all clones share the same key and chain.
#[derive(Clone)]
pub struct KeyProvider {
    inner: Arc<Identity>,
}

struct Identity {
    key: PKey<Private>,
    chain: Vec<X509>,
    info: CertInfo,
}

impl KeyProvider {
    /// Package a private key and its certificate chain (leaf first)
    pub fn new(key: PKey<Private>, chain: Vec<X509>) -> Result<Self> {
        let leaf = chain
            .first()
            .ok_or_else(|| Error::Config("Certificate chain is empty".to_string()))?;

        if !leaf.public_key()?.public_eq(&key) {
            return Err(Error::Config(
                "Private key does not match the leaf certificate".to_string(),
            ));
        }

        let info = CertInfo::from_x509_ref(leaf);
        Ok(KeyProvider {
            inner: Arc::new(Identity { key, chain, info }),
        })
    }

    /// Load a PEM private key and a PEM certificate chain
    pub fn from_pem(key_pem: &[u8], chain_pem: &[u8]) -> Result<Self> {
        let key = PKey::private_key_from_pem(key_pem)
            .map_err(|e| Error::Parse(format!("Failed to load private key: {}", e)))?;
        let chain = X509::stack_from_pem(chain_pem)
            .map_err(|e| Error::Parse(format!("Failed to load certificate: {}", e)))?;
        if chain.is_empty() {
            return Err(Error::Parse("No certificate found in PEM input".to_string()));
        }
        Self::new(key, chain)
    }

    /// Load the identity stored in a PKCS#12 archive
    pub fn from_pkcs12(der: &[u8], password: &str) -> Result<Self> {
        let parsed = Pkcs12::from_der(der)
            .and_then(|p12| p12.parse2(password))
            .map_err(|e| Error::Parse(format!("Failed to load PKCS#12 archive: {}", e)))?;

        let key = parsed
            .pkey
            .ok_or_else(|| Error::Parse("PKCS#12 archive has no private key".to_string()))?;
        let leaf = parsed
            .cert
            .ok_or_else(|| Error::Parse("PKCS#12 archive has no certificate".to_string()))?;

        let mut chain = vec![leaf];
        if let Some(ca) = parsed.ca {
            chain.extend(ca.into_iter());
        }
        Self::new(key, chain)
    }

    pub fn private_key(&self) -> &PKey<Private> {
        &self.inner.key
    }

    /// Certificate chain, leaf first
    pub fn chain(&self) -> &[X509] {
        &self.inner.chain
    }

    pub fn leaf(&self) -> &X509 {
        &self.inner.chain[0]
    }

    pub fn info(&self) -> &CertInfo {
        &self.inner.info
    }

    /// Whether the leaf certificate is valid for `host`
    pub fn matches_host(&self, host: &str) -> bool {
        self.inner.info.matches_host(host)
    }
}

impl fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyProvider")
            .field("subject", &self.inner.info.subject)
            .field("chain", &self.inner.chain.len())
            .finish()
    }
}

/// Resolved identity for one context
#[derive(Debug, Clone, Default)]
pub enum KeyMaterial {
    /// No identity
    #[default]
    None,
    /// Private key and certificate chain
    Identity(KeyProvider),
}

impl KeyMaterial {
    pub fn is_none(&self) -> bool {
        matches!(self, KeyMaterial::None)
    }

    pub fn provider(&self) -> Option<&KeyProvider> {
        match self {
            KeyMaterial::None => None,
            KeyMaterial::Identity(provider) => Some(provider),
        }
    }
}

impl From<Option<KeyProvider>> for KeyMaterial {
    fn from(provider: Option<KeyProvider>) -> Self {
        provider.map_or(KeyMaterial::None, KeyMaterial::Identity)
    }
}

/// Source of key material
pub trait KeyCertSource: Send + Sync {
    /// Identity used when no per-name identity applies
    fn default_key_material(&self) -> Result<Option<KeyProvider>>;

    /// Per-name lookup, if the source supports SNI selection
    fn key_material_mapper(&self) -> Result<Option<KeyMapper>> {
        Ok(None)
    }
}

/// PEM bytes, either on disk or in memory
#[derive(Debug, Clone)]
pub(crate) enum PemData {
    Path(PathBuf),
    Value(Vec<u8>),
}

impl PemData {
    pub(crate) fn load(&self, loader: &dyn ResourceLoader) -> Result<Vec<u8>> {
        match self {
            PemData::Path(path) => loader.load(path),
            PemData::Value(value) => Ok(value.clone()),
        }
    }
}

/// Key source holding one or more PEM key/certificate pairs
///
/// The first pair is the default identity. With several pairs, the per-name
/// mapper picks the first one whose certificate matches the server name.
pub struct PemKeyCert {
    entries: Vec<(PemData, PemData)>,
    loader: Arc<dyn ResourceLoader>,
}

impl PemKeyCert {
    pub fn new() -> Self {
        PemKeyCert {
            entries: Vec::new(),
            loader: Arc::new(FsResourceLoader::current_dir()),
        }
    }

    /// Single pair loaded from files
    pub fn from_paths(key: impl Into<PathBuf>, cert: impl Into<PathBuf>) -> Self {
        Self::new().with_paths(key, cert)
    }

    /// Single pair held in memory
    pub fn from_values(key: impl Into<Vec<u8>>, cert: impl Into<Vec<u8>>) -> Self {
        Self::new().with_values(key, cert)
    }

    pub fn with_paths(mut self, key: impl Into<PathBuf>, cert: impl Into<PathBuf>) -> Self {
        self.entries
            .push((PemData::Path(key.into()), PemData::Path(cert.into())));
        self
    }

    pub fn with_values(mut self, key: impl Into<Vec<u8>>, cert: impl Into<Vec<u8>>) -> Self {
        self.entries
            .push((PemData::Value(key.into()), PemData::Value(cert.into())));
        self
    }

    /// Read file-backed pairs through `loader`
    pub fn with_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loader = loader;
        self
    }

    fn load_all(&self) -> Result<Vec<KeyProvider>> {
        self.entries
            .iter()
            .map(|(key, cert)| {
                let key = key.load(self.loader.as_ref())?;
                let cert = cert.load(self.loader.as_ref())?;
                KeyProvider::from_pem(&key, &cert)
            })
            .collect()
    }
}

impl Default for PemKeyCert {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyCertSource for PemKeyCert {
    fn default_key_material(&self) -> Result<Option<KeyProvider>> {
        match self.entries.first() {
            None => Ok(None),
            Some((key, cert)) => {
                let key = key.load(self.loader.as_ref())?;
                let cert = cert.load(self.loader.as_ref())?;
                KeyProvider::from_pem(&key, &cert).map(Some)
            }
        }
    }

    fn key_material_mapper(&self) -> Result<Option<KeyMapper>> {
        let providers = self.load_all()?;
        Ok(Some(Box::new(move |name: &str| {
            Ok(providers.iter().find(|p| p.matches_host(name)).cloned())
        })))
    }
}

/// Key source backed by a PKCS#12 archive
pub struct Pkcs12KeyCert {
    archive: PemData,
    password: String,
    loader: Arc<dyn ResourceLoader>,
}

impl Pkcs12KeyCert {
    pub fn from_path(path: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        Pkcs12KeyCert {
            archive: PemData::Path(path.into()),
            password: password.into(),
            loader: Arc::new(FsResourceLoader::current_dir()),
        }
    }

    pub fn from_value(der: impl Into<Vec<u8>>, password: impl Into<String>) -> Self {
        Pkcs12KeyCert {
            archive: PemData::Value(der.into()),
            password: password.into(),
            loader: Arc::new(FsResourceLoader::current_dir()),
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loader = loader;
        self
    }

    fn load(&self) -> Result<KeyProvider> {
        let der = self.archive.load(self.loader.as_ref())?;
        KeyProvider::from_pkcs12(&der, &self.password)
    }
}

impl KeyCertSource for Pkcs12KeyCert {
    fn default_key_material(&self) -> Result<Option<KeyProvider>> {
        self.load().map(Some)
    }

    fn key_material_mapper(&self) -> Result<Option<KeyMapper>> {
        let provider = self.load()?;
        Ok(Some(Box::new(move |name: &str| {
            Ok(provider.matches_host(name).then(|| provider.clone()))
        })))
    }
}
