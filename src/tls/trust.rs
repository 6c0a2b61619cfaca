//! Trust material
//!
//! A [`TrustSource`] yields the validators used to authenticate the peer,
//! optionally selected per SNI server name.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use openssl::x509::X509;

use super::key::PemData;
use super::resources::{FsResourceLoader, ResourceLoader};
use super::revocation::RevocationList;
use super::validator::{StoreValidator, TrustAllValidator, TrustValidator};
use super::{Error, Result};

/// Per-name validator lookup, obtained once and applied per server name
pub type ValidatorMapper =
    Box<dyn Fn(&str) -> Result<Option<Vec<Arc<dyn TrustValidator>>>> + Send + Sync>;

/// Resolved trust configuration for one context
#[derive(Debug, Clone, Default)]
pub enum TrustMaterial {
    /// Peer is not authenticated
    #[default]
    None,
    /// Every chain is accepted; loaded CRLs are kept but never consulted
    TrustAll {
        revocation_lists: Vec<RevocationList>,
    },
    /// Ordered validators; all of them are revocation-decorated when
    /// `revocation_lists` is non-empty
    Validators {
        validators: Vec<Arc<dyn TrustValidator>>,
        revocation_lists: Vec<RevocationList>,
    },
}

impl TrustMaterial {
    pub fn trust_all() -> Self {
        TrustMaterial::TrustAll {
            revocation_lists: Vec::new(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, TrustMaterial::None)
    }

    pub fn is_trust_all(&self) -> bool {
        matches!(self, TrustMaterial::TrustAll { .. })
    }

    /// Validators to run, in order
    ///
    /// Trust-all yields a single [`TrustAllValidator`].
    pub fn validators(&self) -> Vec<Arc<dyn TrustValidator>> {
        match self {
            TrustMaterial::None => Vec::new(),
            TrustMaterial::TrustAll { .. } => vec![Arc::new(TrustAllValidator)],
            TrustMaterial::Validators { validators, .. } => validators.clone(),
        }
    }

    pub fn revocation_lists(&self) -> &[RevocationList] {
        match self {
            TrustMaterial::None => &[],
            TrustMaterial::TrustAll { revocation_lists }
            | TrustMaterial::Validators {
                revocation_lists, ..
            } => revocation_lists,
        }
    }

    /// Union of the issuers trusted by every validator
    pub fn accepted_issuers(&self) -> Vec<X509> {
        self.validators()
            .iter()
            .flat_map(|v| v.accepted_issuers())
            .collect()
    }
}

/// Source of trust validators
pub trait TrustSource: Send + Sync {
    /// Validators used when no per-name validators apply
    fn default_validators(&self) -> Result<Option<Vec<Arc<dyn TrustValidator>>>>;

    /// Per-name lookup, if the source supports SNI selection
    fn validator_mapper(&self) -> Result<Option<ValidatorMapper>> {
        Ok(None)
    }
}

/// Trust source holding PEM CA certificates
pub struct PemTrust {
    certs: Vec<PemData>,
    loader: Arc<dyn ResourceLoader>,
}

impl PemTrust {
    pub fn new() -> Self {
        PemTrust {
            certs: Vec::new(),
            loader: Arc::new(FsResourceLoader::current_dir()),
        }
    }

    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        paths.into_iter().fold(Self::new(), |t, p| t.with_path(p))
    }

    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<u8>>,
    {
        values.into_iter().fold(Self::new(), |t, v| t.with_value(v))
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.certs.push(PemData::Path(path.into()));
        self
    }

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.certs.push(PemData::Value(value.into()));
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loader = loader;
        self
    }

    fn load_anchors(&self) -> Result<Vec<X509>> {
        let mut anchors = Vec::new();
        for data in &self.certs {
            let pem = data.load(self.loader.as_ref())?;
            let certs = X509::stack_from_pem(&pem)
                .map_err(|e| Error::Parse(format!("Failed to load CA certificate: {}", e)))?;
            if certs.is_empty() {
                return Err(Error::Parse("No CA certificate found in PEM input".to_string()));
            }
            anchors.extend(certs);
        }
        Ok(anchors)
    }
}

impl Default for PemTrust {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustSource for PemTrust {
    fn default_validators(&self) -> Result<Option<Vec<Arc<dyn TrustValidator>>>> {
        if self.certs.is_empty() {
            return Ok(None);
        }
        let validator = StoreValidator::new(self.load_anchors()?)?;
        Ok(Some(vec![Arc::new(validator)]))
    }
}

/// Trust source using the platform's default CA locations
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTrust;

impl TrustSource for SystemTrust {
    fn default_validators(&self) -> Result<Option<Vec<Arc<dyn TrustValidator>>>> {
        Ok(Some(vec![Arc::new(StoreValidator::system()?)]))
    }
}

/// Trust source with explicit per-server-name validators
///
/// Names without an entry fall back to the wrapped default source.
pub struct SniTrust {
    default: Option<Arc<dyn TrustSource>>,
    by_name: HashMap<String, Vec<Arc<dyn TrustValidator>>>,
}

impl SniTrust {
    pub fn new() -> Self {
        SniTrust {
            default: None,
            by_name: HashMap::new(),
        }
    }

    pub fn with_default(mut self, source: Arc<dyn TrustSource>) -> Self {
        self.default = Some(source);
        self
    }

    /// Validators for `name` (matched case-insensitively)
    pub fn with_name(
        mut self,
        name: impl Into<String>,
        validators: Vec<Arc<dyn TrustValidator>>,
    ) -> Self {
        self.by_name
            .insert(name.into().to_ascii_lowercase(), validators);
        self
    }
}

impl Default for SniTrust {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustSource for SniTrust {
    fn default_validators(&self) -> Result<Option<Vec<Arc<dyn TrustValidator>>>> {
        match &self.default {
            Some(source) => source.default_validators(),
            None => Ok(None),
        }
    }

    fn validator_mapper(&self) -> Result<Option<ValidatorMapper>> {
        let by_name = self.by_name.clone();
        Ok(Some(Box::new(move |name: &str| {
            Ok(by_name.get(&name.to_ascii_lowercase()).cloned())
        })))
    }
}

impl fmt::Debug for SniTrust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SniTrust")
            .field("default", &self.default.is_some())
            .field("names", &self.by_name.keys().collect::<Vec<_>>())
            .finish()
    }
}
