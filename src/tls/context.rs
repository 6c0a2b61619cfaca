//! Built TLS contexts
//!
//! A [`TlsContext`] is immutable and cheap to clone. It can be shared by any
//! number of connections, across threads, once built.

use std::fmt;
use std::sync::Arc;

use openssl::ssl::SslContext;
use openssl::x509::X509;
use rustls::server::{Accepted, ClientHello};
use rustls::ServerConnection;
use tracing::debug;

use super::key::KeyMaterial;
use super::options::{Engine, Role};
use super::{Error, Result};

/// Longest protocol name the length-prefixed wire format can carry
const MAX_PROTOCOL_LEN: usize = 255;

/// What happens when the server finds no protocol in common with the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorFailure {
    /// Continue the handshake without selecting a protocol
    NoAdvertise,
    /// Abort with a `no_application_protocol` alert
    FatalAlert,
}

/// What happens when the peer's protocol selection cannot be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerFailure {
    /// Continue the handshake with no protocol agreed
    Accept,
    /// Abort the handshake
    FatalAlert,
}

/// ALPN settings attached to a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlpnConfig {
    protocols: Vec<String>,
    selector_failure: SelectorFailure,
    listener_failure: ListenerFailure,
}

impl AlpnConfig {
    /// Protocol names must be 1 to 255 bytes long
    pub(crate) fn new(
        protocols: Vec<String>,
        selector_failure: SelectorFailure,
        listener_failure: ListenerFailure,
    ) -> Result<Self> {
        for proto in &protocols {
            if proto.is_empty() || proto.len() > MAX_PROTOCOL_LEN {
                return Err(Error::Config(format!(
                    "application protocol must be 1 to {} bytes long, got {} bytes",
                    MAX_PROTOCOL_LEN,
                    proto.len()
                )));
            }
        }
        Ok(AlpnConfig {
            protocols,
            selector_failure,
            listener_failure,
        })
    }

    /// Protocols in preference order
    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    pub fn selector_failure(&self) -> SelectorFailure {
        self.selector_failure
    }

    pub fn listener_failure(&self) -> ListenerFailure {
        self.listener_failure
    }

    /// Wire format: each protocol prefixed by its length
    pub fn wire_format(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for proto in &self.protocols {
            bytes.push(proto.len() as u8);
            bytes.extend_from_slice(proto.as_bytes());
        }
        bytes
    }
}

/// Split a length-prefixed protocol list into names
///
/// A truncated trailing entry ends the list.
pub(crate) fn wire_entries(mut list: &[u8]) -> Vec<&[u8]> {
    let mut entries = Vec::new();
    while let Some((&len, rest)) = list.split_first() {
        let len = len as usize;
        if len == 0 || len > rest.len() {
            break;
        }
        entries.push(&rest[..len]);
        list = &rest[len..];
    }
    entries
}

/// First of `ours` the peer also offered, in our preference order
///
/// The returned slice borrows from `offered`.
pub(crate) fn select_protocol<'a, P: AsRef<[u8]>>(
    ours: &[P],
    offered: &[&'a [u8]],
) -> Option<&'a [u8]> {
    ours.iter()
        .find_map(|proto| offered.iter().copied().find(|peer| *peer == proto.as_ref()))
}

/// Engine object backing a context
#[derive(Clone)]
pub(crate) enum EngineContext {
    OpenSsl(SslContext),
    RustlsServer(Arc<rustls::ServerConfig>),
    RustlsClient(Arc<rustls::ClientConfig>),
}

/// Immutable TLS context bound to a role and to resolved key/trust material
#[derive(Clone)]
pub struct TlsContext {
    pub(crate) role: Role,
    pub(crate) engine: Engine,
    pub(crate) cipher_suites: Vec<String>,
    pub(crate) alpn: Option<AlpnConfig>,
    pub(crate) session_cache_enabled: Option<bool>,
    pub(crate) key: KeyMaterial,
    pub(crate) accepted_issuers: Vec<X509>,
    pub(crate) verifies_peer: bool,
    pub(crate) inner: EngineContext,
}

impl TlsContext {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Effective cipher suites, either the configured ones or the engine
    /// defaults
    pub fn cipher_suites(&self) -> &[String] {
        &self.cipher_suites
    }

    /// ALPN settings, when protocol negotiation is enabled
    pub fn alpn(&self) -> Option<&AlpnConfig> {
        self.alpn.as_ref()
    }

    /// Advertised application protocols (empty when ALPN is disabled)
    pub fn application_protocols(&self) -> &[String] {
        self.alpn.as_ref().map_or(&[], |alpn| alpn.protocols())
    }

    /// Session cache state; only OpenSSL server contexts have one
    pub fn session_cache_enabled(&self) -> Option<bool> {
        self.session_cache_enabled
    }

    /// Identity presented during handshakes
    pub fn key_material(&self) -> &KeyMaterial {
        &self.key
    }

    /// Issuers trusted for peer certificates
    pub fn accepted_issuers(&self) -> &[X509] {
        &self.accepted_issuers
    }

    /// Whether peer certificates are run through trust validators
    pub fn verifies_peer(&self) -> bool {
        self.verifies_peer
    }

    /// Underlying OpenSSL context
    pub fn openssl_context(&self) -> Option<&SslContext> {
        match &self.inner {
            EngineContext::OpenSsl(ctx) => Some(ctx),
            _ => None,
        }
    }

    /// Underlying rustls server configuration
    pub fn rustls_server_config(&self) -> Option<Arc<rustls::ServerConfig>> {
        match &self.inner {
            EngineContext::RustlsServer(config) => Some(Arc::clone(config)),
            _ => None,
        }
    }

    /// rustls server configuration for one ClientHello
    ///
    /// When the client offers protocols and none of ours match, the returned
    /// configuration advertises no protocol, so the handshake completes without
    /// one instead of ending with a `no_application_protocol` alert.
    pub fn rustls_server_config_for(
        &self,
        hello: &ClientHello<'_>,
    ) -> Option<Arc<rustls::ServerConfig>> {
        let config = self.rustls_server_config()?;
        let offered: Vec<&[u8]> = match hello.alpn() {
            Some(protocols) => protocols.collect(),
            None => return Some(config),
        };
        if config.alpn_protocols.is_empty()
            || select_protocol(&config.alpn_protocols, &offered).is_some()
        {
            return Some(config);
        }

        debug!("no application protocol in common with client, not advertising ALPN");
        let mut fallback = (*config).clone();
        fallback.alpn_protocols.clear();
        Some(Arc::new(fallback))
    }

    /// Turn a read ClientHello into a server connection
    ///
    /// Applies the same ALPN fallback as [`Self::rustls_server_config_for`].
    pub fn rustls_accept(&self, accepted: Accepted) -> Result<ServerConnection> {
        let config = self
            .rustls_server_config_for(&accepted.client_hello())
            .ok_or_else(|| Error::Config("not a rustls server context".to_string()))?;
        accepted
            .into_connection(config)
            .map_err(|(err, _alert)| Error::Handshake(err.to_string()))
    }

    /// Underlying rustls client configuration
    pub fn rustls_client_config(&self) -> Option<Arc<rustls::ClientConfig>> {
        match &self.inner {
            EngineContext::RustlsClient(config) => Some(Arc::clone(config)),
            _ => None,
        }
    }
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("role", &self.role)
            .field("engine", &self.engine)
            .field("cipher_suites", &self.cipher_suites)
            .field("alpn", &self.alpn)
            .field("session_cache_enabled", &self.session_cache_enabled)
            .field("key", &self.key)
            .field("accepted_issuers", &self.accepted_issuers.len())
            .field("verifies_peer", &self.verifies_peer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alpn(protocols: &[&str]) -> Result<AlpnConfig> {
        AlpnConfig::new(
            protocols.iter().map(|p| p.to_string()).collect(),
            SelectorFailure::NoAdvertise,
            ListenerFailure::Accept,
        )
    }

    #[test]
    fn test_alpn_wire_format() {
        let alpn = alpn(&["h2", "http/1.1"]).unwrap();
        assert_eq!(alpn.wire_format(), b"\x02h2\x08http/1.1");
        assert_eq!(alpn.protocols(), ["h2", "http/1.1"]);
        assert_eq!(wire_entries(&alpn.wire_format()), [&b"h2"[..], &b"http/1.1"[..]]);
    }

    #[test]
    fn test_protocol_name_length_limits() {
        let longest = "a".repeat(255);
        assert_eq!(alpn(&[&longest]).unwrap().wire_format().len(), 256);

        let too_long = "a".repeat(256);
        assert!(matches!(alpn(&["h2", &too_long]), Err(Error::Config(_))));
        assert!(matches!(alpn(&[""]), Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_wire_list_is_cut_short() {
        assert_eq!(wire_entries(b"\x02h2\x09http/1.1"), [&b"h2"[..]]);
        assert_eq!(wire_entries(b"\x00\x02h2"), Vec::<&[u8]>::new());
        assert!(wire_entries(b"").is_empty());
    }

    #[test]
    fn test_select_protocol_uses_our_preference() {
        let ours = [b"h2".to_vec(), b"http/1.1".to_vec()];
        let offered = wire_entries(b"\x08http/1.1\x02h2");
        assert_eq!(select_protocol(&ours, &offered), Some(&b"h2"[..]));

        let offered = wire_entries(b"\x08http/1.1\x06spdy/3");
        assert_eq!(select_protocol(&ours, &offered), Some(&b"http/1.1"[..]));

        let offered = wire_entries(b"\x06spdy/3");
        assert_eq!(select_protocol(&ours, &offered), None);
    }

    #[test]
    fn test_context_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TlsContext>();
    }
}
