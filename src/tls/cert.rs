//! Certificate inspection
//!
//! This module extracts the identity fields of X.509 certificates and matches
//! them against server names when selecting per-name key material.

use openssl::nid::Nid;
use openssl::x509::{X509NameRef, X509Ref};

/// Certificate information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Certificate subject (Common Name)
    pub subject: String,
    /// Certificate issuer (Common Name)
    pub issuer: String,
    /// Subject Alternative Names of type DNS
    pub dns_names: Vec<String>,
    /// Serial number as upper-case hex
    pub serial: String,
}

impl CertInfo {
    /// Extract certificate information from an X.509 certificate reference
    pub fn from_x509_ref(cert: &X509Ref) -> Self {
        CertInfo {
            subject: Self::get_cn(cert.subject_name()),
            issuer: Self::get_cn(cert.issuer_name()),
            dns_names: Self::get_dns_names(cert),
            serial: cert
                .serial_number()
                .to_bn()
                .and_then(|bn| bn.to_hex_str().map(|s| s.to_string()))
                .unwrap_or_else(|_| "<undef>".to_string()),
        }
    }

    /// Get Common Name from X509_NAME
    pub(crate) fn get_cn(name: &X509NameRef) -> String {
        name.entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "<undef>".to_string())
    }

    fn get_dns_names(cert: &X509Ref) -> Vec<String> {
        cert.subject_alt_names()
            .map(|sans| {
                sans.iter()
                    .filter_map(|name| name.dnsname().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether this certificate is valid for `host`
    ///
    /// DNS SANs are authoritative when present; the Common Name is only
    /// consulted for certificates without any.
    pub fn matches_host(&self, host: &str) -> bool {
        if self.dns_names.is_empty() {
            return hostname_matches(&self.subject, host);
        }
        self.dns_names.iter().any(|pattern| hostname_matches(pattern, host))
    }
}

/// Match `host` against a DNS pattern, allowing a single left-most `*` label
pub fn hostname_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    match pattern.strip_prefix("*.") {
        Some(suffix) => match host.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest == suffix,
            None => false,
        },
        None => pattern == host,
    }
}
