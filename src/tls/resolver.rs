//! Credential resolution
//!
//! Picks the key material and trust material for one context. Per-name (SNI)
//! lookups are tried first and the source defaults are the fallback, for both
//! key and trust.

use std::sync::Arc;

use tracing::debug;

use super::key::KeyMaterial;
use super::options::TlsOptions;
use super::revocation::{decorate_all, parse_revocation_lists, RevocationList};
use super::trust::TrustMaterial;
use super::validator::TrustValidator;
use super::Result;

/// Resolves key and trust material from [`TlsOptions`]
///
/// Holds no state between calls; every [`resolve`](Self::resolve) reads the
/// options and asks the sources again.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    options: TlsOptions,
}

impl CredentialResolver {
    pub fn new(options: TlsOptions) -> Self {
        CredentialResolver { options }
    }

    pub fn options(&self) -> &TlsOptions {
        &self.options
    }

    /// Resolve key and trust material for `server_name`
    pub fn resolve(
        &self,
        server_name: Option<&str>,
        trust_all: bool,
    ) -> Result<(KeyMaterial, TrustMaterial)> {
        let trust = self.resolve_trust(server_name, trust_all)?;
        let key = self.resolve_key(server_name)?;
        Ok((key, trust))
    }

    /// Resolve trust material, loading and applying configured CRLs
    pub fn resolve_trust(&self, server_name: Option<&str>, trust_all: bool) -> Result<TrustMaterial> {
        if trust_all {
            debug!("trust-all requested, peer certificates are not verified");
            let revocation_lists = self.load_revocation_lists()?;
            return Ok(TrustMaterial::TrustAll { revocation_lists });
        }

        let validators = match self.lookup_validators(server_name)? {
            Some(validators) => validators,
            None => {
                debug!("no trust validators resolved");
                return Ok(TrustMaterial::None);
            }
        };

        let revocation_lists = self.load_revocation_lists()?;
        let validators = if revocation_lists.is_empty() {
            validators
        } else {
            let lists: Arc<[RevocationList]> = revocation_lists.clone().into();
            decorate_all(validators, lists)
        };

        Ok(TrustMaterial::Validators {
            validators,
            revocation_lists,
        })
    }

    fn lookup_validators(
        &self,
        server_name: Option<&str>,
    ) -> Result<Option<Vec<Arc<dyn TrustValidator>>>> {
        let source = match &self.options.trust_source {
            Some(source) => source,
            None => return Ok(None),
        };

        if let Some(name) = server_name {
            if let Some(mapper) = source.validator_mapper()? {
                match mapper(name)? {
                    Some(validators) if !validators.is_empty() => {
                        debug!(server_name = name, "using per-name trust validators");
                        return Ok(Some(validators));
                    }
                    _ => debug!(server_name = name, "no per-name trust validators, using default"),
                }
            }
        }

        Ok(source
            .default_validators()?
            .filter(|validators| !validators.is_empty()))
    }

    /// Resolve key material, per-name first
    pub fn resolve_key(&self, server_name: Option<&str>) -> Result<KeyMaterial> {
        let source = match &self.options.key_source {
            Some(source) => source,
            None => return Ok(KeyMaterial::None),
        };

        if let Some(name) = server_name {
            if let Some(mapper) = source.key_material_mapper()? {
                if let Some(provider) = mapper(name)? {
                    debug!(
                        server_name = name,
                        subject = %provider.info().subject,
                        "using per-name key material"
                    );
                    return Ok(KeyMaterial::Identity(provider));
                }
                debug!(server_name = name, "no per-name key material, using default");
            }
        }

        Ok(source.default_key_material()?.into())
    }

    /// Load CRLs: files first, then in-memory values
    fn load_revocation_lists(&self) -> Result<Vec<RevocationList>> {
        if !self.options.has_crls() {
            return Ok(Vec::new());
        }

        let loader = &self.options.resources;
        let mut lists = Vec::new();
        for path in &self.options.crl_paths {
            let bytes = loader.load(path)?;
            lists.extend(parse_revocation_lists(&bytes)?);
        }
        for value in &self.options.crl_values {
            lists.extend(parse_revocation_lists(value)?);
        }

        debug!(count = lists.len(), "loaded certificate revocation lists");
        Ok(lists)
    }
}
