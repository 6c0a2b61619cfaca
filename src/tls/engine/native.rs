//! OpenSSL backend
//!
//! Builds an `openssl::ssl::SslContext`. Peer certificates are handed to the
//! configured trust validators from the verify callback; OpenSSL's own chain
//! verdict is not used.

use std::sync::Arc;

use openssl::ssl::{
    AlpnError, SslContext, SslContextBuilder, SslMethod,
    SslSessionCacheMode, SslVerifyMode, SslVersion,
};
use openssl::x509::{X509StoreContextRef, X509VerifyResult, X509};
use tracing::debug;

use super::{check_chain, EngineInput};
use crate::tls::context::{select_protocol, wire_entries, AlpnConfig};
use crate::tls::options::{ClientAuth, Role};
use crate::tls::validator::{CertificateError, TrustValidator};
use crate::tls::Result;

/// Cipher suites used when none are configured
const DEFAULT_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "ECDHE-ECDSA-AES128-GCM-SHA256",
    "ECDHE-RSA-AES128-GCM-SHA256",
    "ECDHE-ECDSA-AES256-GCM-SHA384",
    "ECDHE-RSA-AES256-GCM-SHA384",
    "ECDHE-ECDSA-CHACHA20-POLY1305",
    "ECDHE-RSA-CHACHA20-POLY1305",
];

pub(crate) fn default_cipher_suites() -> Vec<String> {
    DEFAULT_CIPHER_SUITES.iter().map(|s| s.to_string()).collect()
}

/// TLS 1.3 suites are configured separately from the older cipher list
fn is_tls13_suite(name: &str) -> bool {
    name.starts_with("TLS_") && !name.contains("_WITH_")
}

/// Build an OpenSSL context
pub(crate) fn build(input: &EngineInput<'_>) -> Result<SslContext> {
    let method = match input.role {
        Role::Client => SslMethod::tls_client(),
        Role::Server => SslMethod::tls_server(),
    };
    let mut builder = SslContextBuilder::new(method)?;

    if let Some(provider) = input.key.provider() {
        builder.set_private_key(provider.private_key())?;
        builder.set_certificate(provider.leaf())?;
        for cert in &provider.chain()[1..] {
            builder.add_extra_chain_cert(cert.clone())?;
        }
        builder.check_private_key()?;
    }

    set_cipher_suites(&mut builder, input.cipher_suites)?;
    set_trust(&mut builder, input)?;

    if let Some(alpn) = input.alpn {
        set_alpn(&mut builder, input.role, alpn)?;
    }

    if input.role.is_server() {
        let mode = if input.session_cache_enabled {
            SslSessionCacheMode::SERVER
        } else {
            SslSessionCacheMode::OFF
        };
        builder.set_session_cache_mode(mode);
    }

    Ok(builder.build())
}

fn set_cipher_suites(builder: &mut SslContextBuilder, suites: &[String]) -> Result<()> {
    let (tls13, legacy): (Vec<&str>, Vec<&str>) =
        suites.iter().map(String::as_str).partition(|s| is_tls13_suite(s));

    // An empty TLS 1.3 list disables TLS 1.3
    builder.set_ciphersuites(&tls13.join(":"))?;
    if tls13.is_empty() {
        builder.set_max_proto_version(Some(SslVersion::TLS1_2))?;
    }

    if legacy.is_empty() {
        builder.set_min_proto_version(Some(SslVersion::TLS1_3))?;
    } else {
        builder.set_cipher_list(&legacy.join(":"))?;
    }
    Ok(())
}

fn set_trust(builder: &mut SslContextBuilder, input: &EngineInput<'_>) -> Result<()> {
    if input.role.is_server() {
        for issuer in input.trust.accepted_issuers() {
            builder.add_client_ca(&issuer)?;
        }
    }

    if !input.verifies_peer() {
        builder.set_verify(SslVerifyMode::NONE);
        return Ok(());
    }

    let mode = match (input.role, input.client_auth) {
        (Role::Server, ClientAuth::Required) => {
            SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT
        }
        _ => SslVerifyMode::PEER,
    };

    let validators = input.trust.validators();
    let role = input.role;
    builder.set_verify_callback(mode, move |_preverify_ok, ctx| {
        verify_peer(&validators, role, ctx)
    });
    Ok(())
}

/// Verify callback body
///
/// OpenSSL invokes the callback once per chain depth, possibly more than once
/// at depth 0. Only the depth 0 calls decide, using the chain built so far.
fn verify_peer(
    validators: &[Arc<dyn TrustValidator>],
    role: Role,
    ctx: &mut X509StoreContextRef,
) -> bool {
    if ctx.error_depth() != 0 {
        return true;
    }

    let chain: Vec<X509> = match ctx.chain() {
        Some(chain) => chain.iter().map(|cert| cert.to_owned()).collect(),
        None => ctx.current_cert().map(|cert| vec![cert.to_owned()]).unwrap_or_default(),
    };

    match check_chain(validators, role, &chain) {
        Ok(()) => {
            ctx.set_error(X509VerifyResult::OK);
            true
        }
        Err(err) => {
            debug!("peer certificate rejected: {}", err);
            ctx.set_error(verify_result(&err));
            false
        }
    }
}

fn verify_result(err: &CertificateError) -> X509VerifyResult {
    let raw = match err {
        CertificateError::Revoked => openssl_sys::X509_V_ERR_CERT_REVOKED,
        CertificateError::Rejected(_) | CertificateError::EmptyChain => {
            openssl_sys::X509_V_ERR_CERT_REJECTED
        }
    };
    // SAFETY: from_raw only requires a code OpenSSL defines for X509 verify
    // results, since error_string() hands it to X509_verify_cert_error_string.
    // Both constants come from openssl-sys' X509_V_ERR_* set.
    unsafe { X509VerifyResult::from_raw(raw) }
}

fn set_alpn(builder: &mut SslContextBuilder, role: Role, alpn: &AlpnConfig) -> Result<()> {
    match role {
        Role::Client => builder.set_alpn_protos(&alpn.wire_format())?,
        Role::Server => {
            // Server preference order; no overlap means no ALPN extension in
            // the ServerHello rather than a failed handshake
            let protocols: Vec<Vec<u8>> =
                alpn.protocols().iter().map(|p| p.as_bytes().to_vec()).collect();
            builder.set_alpn_select_callback(move |_ssl, client_protos| {
                select_alpn(&protocols, client_protos)
            });
        }
    }
    Ok(())
}

/// Server side selection; the chosen name is returned from the client's list
fn select_alpn<'a>(
    protocols: &[Vec<u8>],
    client_protos: &'a [u8],
) -> std::result::Result<&'a [u8], AlpnError> {
    let offered = wire_entries(client_protos);
    select_protocol(protocols, &offered).ok_or_else(|| {
        debug!("no application protocol in common with client");
        AlpnError::NOACK
    })
}
