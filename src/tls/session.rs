//! Blocking TLS connections over TCP
//!
//! Handshakes run on OpenSSL contexts only. rustls configurations are meant
//! to be driven by the caller through `rustls::ServerConnection` /
//! `rustls::ClientConnection`.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

use openssl::ssl::{HandshakeError, Ssl, SslContext, SslStream};
use tracing::debug;

use super::cert::CertInfo;
use super::context::TlsContext;
use super::options::Role;
use super::{Error, Result};

impl TlsContext {
    /// Client handshake over `tcp`, sending `server_name` as SNI
    pub fn connect(&self, tcp: TcpStream, server_name: Option<&str>) -> Result<TlsStream> {
        let ctx = self.handshake_context(Role::Client)?;
        let mut ssl = Ssl::new(ctx)?;
        if let Some(name) = server_name {
            ssl.set_hostname(name)?;
        }

        let stream = ssl
            .connect(tcp)
            .map_err(|e| handshake_error("Connection failed", e))?;
        debug!(?server_name, version = stream.ssl().version_str(), "TLS client handshake complete");
        Ok(TlsStream::new(stream))
    }

    /// Server handshake over `tcp`
    pub fn accept(&self, tcp: TcpStream) -> Result<TlsStream> {
        let ctx = self.handshake_context(Role::Server)?;
        let stream = Ssl::new(ctx)?
            .accept(tcp)
            .map_err(|e| handshake_error("Accept failed", e))?;
        debug!(version = stream.ssl().version_str(), "TLS server handshake complete");
        Ok(TlsStream::new(stream))
    }

    fn handshake_context(&self, role: Role) -> Result<&SslContext> {
        if self.role != role {
            return Err(Error::Config(format!(
                "{:?} handshake on a {:?} context",
                role, self.role
            )));
        }
        self.openssl_context().ok_or_else(|| {
            Error::Config(format!(
                "Blocking handshakes need the openssl engine, context uses {}",
                self.engine
            ))
        })
    }
}

/// Reports the certificate verdict when one caused the failure
fn handshake_error(what: &str, err: HandshakeError<TcpStream>) -> Error {
    match err {
        HandshakeError::Failure(mid) => {
            let verify = mid.ssl().verify_result();
            if verify.as_raw() != 0 {
                Error::Handshake(format!("{}: certificate rejected: {}", what, verify.error_string()))
            } else {
                Error::Handshake(format!("{}: {}", what, mid.error()))
            }
        }
        other => Error::Handshake(format!("{}: {}", what, other)),
    }
}

/// Established TLS connection
pub struct TlsStream {
    stream: SslStream<TcpStream>,
    failed: bool,
}

impl TlsStream {
    fn new(stream: SslStream<TcpStream>) -> Self {
        TlsStream {
            stream,
            failed: false,
        }
    }

    /// Negotiated protocol version, e.g. "TLSv1.3"
    pub fn version(&self) -> &'static str {
        self.stream.ssl().version_str()
    }

    /// Negotiated cipher name
    pub fn cipher(&self) -> Option<String> {
        self.stream
            .ssl()
            .current_cipher()
            .map(|c| c.name().to_string())
    }

    /// ALPN protocol agreed during the handshake
    pub fn selected_alpn_protocol(&self) -> Option<String> {
        self.stream
            .ssl()
            .selected_alpn_protocol()
            .map(|p| String::from_utf8_lossy(p).into_owned())
    }

    /// SNI name sent by the client
    pub fn servername(&self) -> Option<String> {
        self.stream
            .ssl()
            .servername(openssl::ssl::NameType::HOST_NAME)
            .map(str::to_string)
    }

    /// Certificate presented by the peer
    pub fn peer_certificate(&self) -> Option<CertInfo> {
        self.stream
            .ssl()
            .peer_certificate()
            .map(|cert| CertInfo::from_x509_ref(&cert))
    }

    pub fn get_ref(&self) -> &TcpStream {
        self.stream.get_ref()
    }

    /// Send close_notify (unless an I/O error occurred) and close the socket
    pub fn shutdown(&mut self) -> io::Result<()> {
        if !self.failed {
            let _ = self.stream.shutdown();
        }
        self.stream.get_mut().shutdown(Shutdown::Both)
    }
}

impl Read for TlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).inspect_err(|_| self.failed = true)
    }
}

impl Write for TlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf).inspect_err(|_| self.failed = true)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush().inspect_err(|_| self.failed = true)
    }
}
