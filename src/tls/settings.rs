//! Declarative TLS settings
//!
//! [`TlsSettings`] mirrors [`TlsOptions`] in a serde friendly shape so it can
//! be embedded in an application's configuration file:
//!
//! ```toml
//! engine = "openssl"
//! application_protocols = ["h2", "http/1.1"]
//! crl_paths = ["revoked.crl"]
//! crl_values = ["-----BEGIN X509 CRL-----\n...\n-----END X509 CRL-----\n"]
//!
//! [key]
//! type = "pem"
//! key_path = "server.key"
//! cert_path = "server.pem"
//!
//! [trust]
//! type = "pem"
//! ca_paths = ["ca.pem"]
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use super::key::{KeyCertSource, PemKeyCert, Pkcs12KeyCert};
use super::options::{ClientAuth, Engine, TlsOptions};
use super::resources::{FsResourceLoader, ResourceLoader};
use super::trust::{PemTrust, SystemTrust, TrustSource};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsSettings {
    pub engine: Engine,
    pub session_cache_enabled: bool,
    /// Directory relative paths are resolved against
    pub root: Option<PathBuf>,
    pub key: Option<KeySettings>,
    pub trust: Option<TrustSettings>,
    pub crl_paths: Vec<PathBuf>,
    /// PEM encoded CRLs, applied after the ones read from `crl_paths`
    pub crl_values: Vec<String>,
    pub cipher_suites: Vec<String>,
    pub application_protocols: Vec<String>,
    pub client_auth: ClientAuth,
}

impl Default for TlsSettings {
    fn default() -> Self {
        TlsSettings {
            engine: Engine::default(),
            session_cache_enabled: true,
            root: None,
            key: None,
            trust: None,
            crl_paths: Vec::new(),
            crl_values: Vec::new(),
            cipher_suites: Vec::new(),
            application_protocols: Vec::new(),
            client_auth: ClientAuth::default(),
        }
    }
}

/// Where the local identity comes from
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum KeySettings {
    Pem {
        key_path: PathBuf,
        cert_path: PathBuf,
        /// Extra pairs selected by SNI
        #[serde(default)]
        sni: Vec<PemPairSettings>,
    },
    Pkcs12 {
        path: PathBuf,
        #[serde(default)]
        password: String,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PemPairSettings {
    pub key_path: PathBuf,
    pub cert_path: PathBuf,
}

/// Where trusted CAs come from
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum TrustSettings {
    Pem { ca_paths: Vec<PathBuf> },
    System,
}

impl TlsSettings {
    /// Convert into options; files are read when contexts are created
    pub fn into_options(self) -> TlsOptions {
        let loader: Arc<dyn ResourceLoader> = match self.root {
            Some(root) => Arc::new(FsResourceLoader::new(root)),
            None => Arc::new(FsResourceLoader::current_dir()),
        };

        let mut builder = TlsOptions::builder()
            .engine(self.engine)
            .session_cache_enabled(self.session_cache_enabled)
            .cipher_suites(self.cipher_suites)
            .application_protocols(self.application_protocols)
            .client_auth(self.client_auth)
            .resources(Arc::clone(&loader));

        if let Some(key) = self.key {
            builder = builder.key_source(key.into_source(Arc::clone(&loader)));
        }
        if let Some(trust) = self.trust {
            builder = builder.trust_source(trust.into_source(Arc::clone(&loader)));
        }
        for path in self.crl_paths {
            builder = builder.crl_path(path);
        }
        for value in self.crl_values {
            builder = builder.crl_value(value.into_bytes());
        }
        builder.build()
    }
}

impl KeySettings {
    fn into_source(self, loader: Arc<dyn ResourceLoader>) -> Arc<dyn KeyCertSource> {
        match self {
            KeySettings::Pem {
                key_path,
                cert_path,
                sni,
            } => {
                let source = sni.into_iter().fold(
                    PemKeyCert::from_paths(key_path, cert_path),
                    |source, pair| source.with_paths(pair.key_path, pair.cert_path),
                );
                Arc::new(source.with_loader(loader))
            }
            KeySettings::Pkcs12 { path, password } => {
                Arc::new(Pkcs12KeyCert::from_path(path, password).with_loader(loader))
            }
        }
    }
}

impl TrustSettings {
    fn into_source(self, loader: Arc<dyn ResourceLoader>) -> Arc<dyn TrustSource> {
        match self {
            TrustSettings::Pem { ca_paths } => {
                Arc::new(PemTrust::from_paths(ca_paths).with_loader(loader))
            }
            TrustSettings::System => Arc::new(SystemTrust),
        }
    }
}
