//! In-memory handshakes between rustls contexts
//!
//! Records are pumped between a `ClientConnection` and a `ServerConnection`
//! without any socket. The server reads the ClientHello through an
//! `Acceptor` first, the way a server applying per-hello settings does.

#[path = "../src/tls/testutil.rs"]
mod testutil;

use std::sync::Arc;

use rustls::server::Acceptor;
use rustls::{CertificateError, ClientConnection, ServerConnection};
use rustls_pki_types::ServerName;
use tls_context::tls::{
    ClientAuth, Engine, Error, PemKeyCert, PemTrust, Role, SslContextFactory, TlsContext, TlsOptions,
    TlsOptionsBuilder,
};
use testutil::Pki;

#[derive(Debug)]
enum Failure {
    Client(rustls::Error),
    Server(rustls::Error),
    Accept(Error),
}

fn handshake(
    server_ctx: &TlsContext,
    client: &TlsContext,
) -> Result<(ServerConnection, ClientConnection), Failure> {
    let mut client = ClientConnection::new(
        client.rustls_client_config().unwrap(),
        ServerName::try_from("localhost").unwrap(),
    )
    .unwrap();

    let mut acceptor = Acceptor::default();
    let accepted = loop {
        let mut buf = Vec::new();
        client.write_tls(&mut buf).unwrap();
        acceptor.read_tls(&mut buf.as_slice()).unwrap();
        match acceptor.accept() {
            Ok(Some(accepted)) => break accepted,
            Ok(None) if !buf.is_empty() => continue,
            Ok(None) => panic!("client stopped before a complete ClientHello"),
            Err((err, _)) => return Err(Failure::Server(err)),
        }
    };
    let mut server = server_ctx.rustls_accept(accepted).map_err(Failure::Accept)?;

    while client.is_handshaking() || server.is_handshaking() {
        let mut progressed = false;

        while client.wants_write() {
            let mut buf = Vec::new();
            client.write_tls(&mut buf).unwrap();
            server.read_tls(&mut buf.as_slice()).unwrap();
            server.process_new_packets().map_err(Failure::Server)?;
            progressed = true;
        }

        while server.wants_write() {
            let mut buf = Vec::new();
            server.write_tls(&mut buf).unwrap();
            client.read_tls(&mut buf.as_slice()).unwrap();
            client.process_new_packets().map_err(Failure::Client)?;
            progressed = true;
        }

        if !progressed {
            break;
        }
    }
    Ok((server, client))
}

fn rustls_options() -> TlsOptionsBuilder {
    TlsOptions::builder().engine(Engine::Rustls)
}

fn server_context(pki: &Pki, serial: u64, options: TlsOptionsBuilder, use_alpn: bool) -> TlsContext {
    let leaf = pki.leaf("localhost", serial);
    SslContextFactory::new(
        options
            .key_source(Arc::new(PemKeyCert::from_values(leaf.key_pem(), leaf.cert_pem())))
            .build(),
    )
    .create_context(Some("localhost"), use_alpn, Role::Server, false)
    .unwrap()
}

fn client_context(pki: &Pki, options: TlsOptionsBuilder, use_alpn: bool) -> TlsContext {
    SslContextFactory::new(
        options
            .trust_source(Arc::new(PemTrust::from_values([pki.ca_pem()])))
            .build(),
    )
    .create_context(Some("localhost"), use_alpn, Role::Client, false)
    .unwrap()
}

#[test]
fn test_handshake_with_alpn() {
    let pki = Pki::new("Rustls CA");
    let server = server_context(
        &pki,
        1,
        rustls_options().application_protocols(["h2", "http/1.1"]),
        true,
    );
    let client = client_context(&pki, rustls_options().application_protocols(["h2"]), true);

    let (server, client) = handshake(&server, &client).unwrap();
    assert_eq!(client.alpn_protocol(), Some(&b"h2"[..]));
    assert_eq!(server.alpn_protocol(), Some(&b"h2"[..]));
}

#[test]
fn test_revoked_server_certificate() {
    let pki = Pki::new("Rustls CA");
    let server = server_context(&pki, 5, rustls_options(), false);
    let client = client_context(&pki, rustls_options().crl_value(pki.crl(&[5]).der), false);

    match handshake(&server, &client) {
        Err(Failure::Client(rustls::Error::InvalidCertificate(CertificateError::Revoked))) => {}
        other => panic!("expected revoked certificate, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_unknown_issuer() {
    let pki = Pki::new("Rustls CA");
    let other = Pki::new("Other CA");
    let server = server_context(&other, 1, rustls_options(), false);
    let client = client_context(&pki, rustls_options(), false);

    assert!(matches!(
        handshake(&server, &client),
        Err(Failure::Client(rustls::Error::InvalidCertificate(CertificateError::Other(_))))
    ));
}

#[test]
fn test_trust_all_client() {
    let other = Pki::new("Other CA");
    let server = server_context(&other, 1, rustls_options(), false);
    let client = SslContextFactory::new(rustls_options().build())
        .create_context(Some("localhost"), false, Role::Client, true)
        .unwrap();

    assert!(handshake(&server, &client).is_ok());
}

#[test]
fn test_alpn_mismatch_completes_without_protocol() {
    let pki = Pki::new("Rustls CA");
    let server = server_context(
        &pki,
        1,
        rustls_options().application_protocols(["h2", "http/1.1"]),
        true,
    );
    let client = client_context(&pki, rustls_options().application_protocols(["spdy/3"]), true);

    let (server_conn, client_conn) = handshake(&server, &client).unwrap();
    assert!(!server_conn.is_handshaking());
    assert_eq!(server_conn.alpn_protocol(), None);
    assert_eq!(client_conn.alpn_protocol(), None);

    // The shared configuration keeps advertising for clients that match
    assert_eq!(
        server.rustls_server_config().unwrap().alpn_protocols,
        vec![b"h2".to_vec(), b"http/1.1".to_vec()]
    );
}

#[test]
fn test_client_without_alpn() {
    let pki = Pki::new("Rustls CA");
    let server = server_context(&pki, 1, rustls_options().application_protocols(["h2"]), true);
    let client = client_context(&pki, rustls_options(), false);

    let (server_conn, client_conn) = handshake(&server, &client).unwrap();
    assert_eq!(server_conn.alpn_protocol(), None);
    assert_eq!(client_conn.alpn_protocol(), None);
}

#[test]
fn test_accept_requires_rustls_server_context() {
    let pki = Pki::new("Rustls CA");
    let client = client_context(&pki, rustls_options(), false);
    let mut conn = ClientConnection::new(
        client.rustls_client_config().unwrap(),
        ServerName::try_from("localhost").unwrap(),
    )
    .unwrap();

    let mut acceptor = Acceptor::default();
    let mut buf = Vec::new();
    conn.write_tls(&mut buf).unwrap();
    acceptor.read_tls(&mut buf.as_slice()).unwrap();
    let Ok(Some(accepted)) = acceptor.accept() else {
        panic!("expected a complete ClientHello");
    };

    assert!(matches!(client.rustls_accept(accepted), Err(Error::Config(_))));
}

#[test]
fn test_restricted_cipher_suite() {
    let pki = Pki::new("Rustls CA");
    let server = server_context(
        &pki,
        1,
        rustls_options().cipher_suite("TLS13_AES_256_GCM_SHA384"),
        false,
    );
    let client = client_context(&pki, rustls_options(), false);

    let (_, client) = handshake(&server, &client).unwrap();
    let suite = client.negotiated_cipher_suite().unwrap();
    assert_eq!(format!("{:?}", suite.suite()), "TLS13_AES_256_GCM_SHA384");
}

#[test]
fn test_client_certificates() {
    let pki = Pki::new("Rustls CA");
    let server = server_context(
        &pki,
        1,
        rustls_options()
            .trust_source(Arc::new(PemTrust::from_values([pki.ca_pem()])))
            .crl_value(pki.crl(&[3]).pem)
            .client_auth(ClientAuth::Required),
        false,
    );

    let client_for = |serial: u64| {
        let leaf = pki.leaf("client", serial);
        client_context(
            &pki,
            rustls_options()
                .key_source(Arc::new(PemKeyCert::from_values(leaf.key_pem(), leaf.cert_pem()))),
            false,
        )
    };

    let (server_conn, _) = handshake(&server, &client_for(2)).unwrap();
    assert_eq!(server_conn.peer_certificates().map(|certs| certs.len()), Some(1));

    match handshake(&server, &client_for(3)) {
        Err(Failure::Server(rustls::Error::InvalidCertificate(CertificateError::Revoked))) => {}
        other => panic!("expected revoked certificate, got {:?}", other.map(|_| ())),
    }
}
