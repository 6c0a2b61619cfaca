//! Certificate revocation
//!
//! CRLs are parsed into [`RevocationList`]s and enforced by wrapping trust
//! validators in a [`RevocationDecorator`]. The decorator rejects a chain as
//! soon as one of its certificates appears on any list, before the wrapped
//! validator is consulted.

use std::fmt;
use std::sync::Arc;

use openssl::x509::{CrlStatus, X509Crl, X509};
use tracing::{trace, warn};
use x509_parser::pem::Pem;
use x509_parser::prelude::{CertificateRevocationList, FromDer};

use super::cert::CertInfo;
use super::validator::{CertificateError, TrustValidator};
use super::{Error, Result};

const PEM_CRL_LABEL: &str = "X509 CRL";

/// One parsed certificate revocation list
#[derive(Clone)]
pub struct RevocationList {
    crl: Arc<X509Crl>,
}

impl RevocationList {
    /// Parse a single DER encoded CRL
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let crl = X509Crl::from_der(der)
            .map_err(|e| Error::Parse(format!("Failed to load CRL: {}", e)))?;
        Ok(RevocationList { crl: Arc::new(crl) })
    }

    /// Whether `cert` is listed, matching both issuer name and serial
    pub fn is_revoked(&self, cert: &X509) -> bool {
        matches!(self.crl.get_by_cert(cert), CrlStatus::Revoked(_))
    }

    /// Issuer common name
    pub fn issuer(&self) -> String {
        CertInfo::get_cn(self.crl.issuer_name())
    }

    pub fn revoked_count(&self) -> usize {
        self.crl.get_revoked().map_or(0, |revoked| revoked.len())
    }
}

impl fmt::Debug for RevocationList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevocationList")
            .field("issuer", &self.issuer())
            .field("revoked", &self.revoked_count())
            .finish()
    }
}

/// Parse one or more CRLs from `data`
///
/// Accepts either a concatenation of DER encoded CRLs or PEM text with any
/// number of `X509 CRL` blocks. Empty input yields no lists.
pub fn parse_revocation_lists(data: &[u8]) -> Result<Vec<RevocationList>> {
    let start = match data.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(start) => start,
        None => return Ok(Vec::new()),
    };

    if data[start..].starts_with(b"-----BEGIN") {
        parse_pem(data)
    } else {
        parse_der(data)
    }
}

fn parse_pem(data: &[u8]) -> Result<Vec<RevocationList>> {
    let mut lists = Vec::new();
    for pem in Pem::iter_from_buffer(data) {
        let pem = pem.map_err(|e| Error::Parse(format!("Invalid PEM CRL: {}", e)))?;
        if pem.label != PEM_CRL_LABEL {
            return Err(Error::Parse(format!(
                "Unexpected PEM block '{}' in CRL input",
                pem.label
            )));
        }
        lists.push(RevocationList::from_der(&pem.contents)?);
    }
    Ok(lists)
}

fn parse_der(data: &[u8]) -> Result<Vec<RevocationList>> {
    let mut lists = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let (remaining, _) = CertificateRevocationList::from_der(rest)
            .map_err(|e| Error::Parse(format!("Invalid CRL: {}", e)))?;
        let consumed = &rest[..rest.len() - remaining.len()];
        lists.push(RevocationList::from_der(consumed)?);
        rest = remaining;
    }
    Ok(lists)
}

/// Trust validator checking revocation before delegating
#[derive(Debug)]
pub struct RevocationDecorator<V> {
    inner: V,
    lists: Arc<[RevocationList]>,
}

impl<V: TrustValidator> RevocationDecorator<V> {
    pub fn new(inner: V, lists: Arc<[RevocationList]>) -> Self {
        RevocationDecorator { inner, lists }
    }

    /// The wrapped validator
    pub fn inner(&self) -> &V {
        &self.inner
    }

    fn check_revoked(&self, chain: &[X509]) -> std::result::Result<(), CertificateError> {
        for cert in chain {
            trace!(serial = %CertInfo::from_x509_ref(cert).serial, "checking revocation");
            if self.lists.iter().any(|list| list.is_revoked(cert)) {
                let info = CertInfo::from_x509_ref(cert);
                warn!(
                    subject = %info.subject,
                    issuer = %info.issuer,
                    serial = %info.serial,
                    "rejecting revoked certificate"
                );
                return Err(CertificateError::Revoked);
            }
        }
        Ok(())
    }
}

impl<V: TrustValidator> TrustValidator for RevocationDecorator<V> {
    fn check_client_trusted(&self, chain: &[X509]) -> std::result::Result<(), CertificateError> {
        self.check_revoked(chain)?;
        self.inner.check_client_trusted(chain)
    }

    fn check_server_trusted(&self, chain: &[X509]) -> std::result::Result<(), CertificateError> {
        self.check_revoked(chain)?;
        self.inner.check_server_trusted(chain)
    }

    fn accepted_issuers(&self) -> Vec<X509> {
        self.inner.accepted_issuers()
    }

    fn checks_revocation(&self) -> bool {
        true
    }
}

/// Wrap every validator with revocation checking against `lists`
pub fn decorate_all(
    validators: Vec<Arc<dyn TrustValidator>>,
    lists: Arc<[RevocationList]>,
) -> Vec<Arc<dyn TrustValidator>> {
    validators
        .into_iter()
        .map(|v| Arc::new(RevocationDecorator::new(v, Arc::clone(&lists))) as Arc<dyn TrustValidator>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::testutil::Pki;
    use crate::tls::validator::{StoreValidator, TrustAllValidator};

    #[test]
    fn test_parse_der_and_pem() {
        let pki = Pki::new("CRL CA");
        let crl = pki.crl(&[10, 11]);

        let from_der = parse_revocation_lists(&crl.der).unwrap();
        let from_pem = parse_revocation_lists(crl.pem.as_bytes()).unwrap();

        assert_eq!(from_der.len(), 1);
        assert_eq!(from_pem.len(), 1);
        assert_eq!(from_der[0].revoked_count(), 2);
        assert_eq!(from_pem[0].revoked_count(), 2);
        assert_eq!(from_der[0].issuer(), "CRL CA");
    }

    #[test]
    fn test_parse_concatenated_der() {
        let a = Pki::new("CA A");
        let b = Pki::new("CA B");
        let mut data = a.crl(&[1]).der;
        data.extend_from_slice(&b.crl(&[2, 3]).der);

        let lists = parse_revocation_lists(&data).unwrap();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].issuer(), "CA A");
        assert_eq!(lists[1].revoked_count(), 2);
    }

    #[test]
    fn test_parse_multiple_pem_blocks() {
        let a = Pki::new("CA A");
        let b = Pki::new("CA B");
        let text = format!("{}\n{}", a.crl(&[1]).pem, b.crl(&[2]).pem);

        let lists = parse_revocation_lists(text.as_bytes()).unwrap();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[1].issuer(), "CA B");
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_revocation_lists(b"").unwrap().is_empty());
        assert!(parse_revocation_lists(b"  \n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_revocation_lists(b"\x30\x03\x01\x02"),
            Err(Error::Parse(_))
        ));

        let pki = Pki::new("CRL CA");
        let mut data = pki.crl(&[1]).der;
        data.extend_from_slice(b"trailing");
        assert!(matches!(parse_revocation_lists(&data), Err(Error::Parse(_))));
    }

    #[test]
    fn test_parse_rejects_certificate_pem() {
        let pki = Pki::new("CRL CA");
        assert!(matches!(
            parse_revocation_lists(pki.ca_pem().as_bytes()),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_is_revoked_matches_issuer_and_serial() {
        let pki = Pki::new("CRL CA");
        let other = Pki::new("Other CA");
        let lists = parse_revocation_lists(&pki.crl(&[42]).der).unwrap();

        assert!(lists[0].is_revoked(&pki.leaf("revoked.example", 42).x509()));
        assert!(!lists[0].is_revoked(&pki.leaf("good.example", 43).x509()));
        // Same serial, different issuer
        assert!(!lists[0].is_revoked(&other.leaf("foreign.example", 42).x509()));
    }

    #[test]
    fn test_decorator_rejects_before_delegating() {
        let pki = Pki::new("CRL CA");
        let lists: Arc<[RevocationList]> = parse_revocation_lists(&pki.crl(&[42]).der)
            .unwrap()
            .into();
        let decorated = RevocationDecorator::new(TrustAllValidator, lists);

        let revoked = pki.leaf("revoked.example", 42).x509();
        let good = pki.leaf("good.example", 43).x509();

        assert_eq!(
            decorated.check_server_trusted(&[revoked.clone()]),
            Err(CertificateError::Revoked)
        );
        assert_eq!(
            decorated.check_client_trusted(&[good.clone(), revoked]),
            Err(CertificateError::Revoked)
        );
        assert!(decorated.check_client_trusted(&[good]).is_ok());
        assert!(decorated.checks_revocation());
    }

    #[test]
    fn test_decorator_passes_through_inner_result() {
        let pki = Pki::new("CRL CA");
        let stranger = Pki::new("Stranger CA");
        let lists: Arc<[RevocationList]> = parse_revocation_lists(&pki.crl(&[42]).der)
            .unwrap()
            .into();
        let store = StoreValidator::new(vec![pki.ca_x509()]).unwrap();
        let decorated = RevocationDecorator::new(store, lists);

        assert!(decorated
            .check_server_trusted(&[pki.leaf("ok.example", 1).x509()])
            .is_ok());
        assert!(matches!(
            decorated.check_server_trusted(&[stranger.leaf("x.example", 1).x509()]),
            Err(CertificateError::Rejected(_))
        ));
        assert_eq!(decorated.accepted_issuers().len(), 1);
    }

    #[test]
    fn test_decorate_all_wraps_each_validator() {
        let pki = Pki::new("CRL CA");
        let lists: Arc<[RevocationList]> = parse_revocation_lists(&pki.crl(&[1]).der)
            .unwrap()
            .into();
        let validators: Vec<Arc<dyn TrustValidator>> = vec![
            Arc::new(StoreValidator::new(vec![pki.ca_x509()]).unwrap()),
            Arc::new(StoreValidator::new(vec![]).unwrap()),
        ];

        let decorated = decorate_all(validators, lists);
        assert_eq!(decorated.len(), 2);
        assert!(decorated.iter().all(|v| v.checks_revocation()));
        assert_eq!(decorated[0].accepted_issuers().len(), 1);
    }
}
