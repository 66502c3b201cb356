//! Shared helpers for the integration tests: an on-disk test PKI, TLS
//! clients, backends and an in-process proxy.

#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{Ssl, SslConnector, SslFiletype, SslMethod, SslVerifyMode, SslVersion};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_openssl::SslStream;

use crywrap::common::Destination;
use crywrap::config::ProxyConfig;
use crywrap::{Proxy, ProxyContext, ServerCredentials};

pub const ANON_CIPHERS: &str = "aNULL:!eNULL:@SECLEVEL=0";

static SERIAL: AtomicU32 = AtomicU32::new(1);

/// Certificates and keys written to a temporary directory
pub struct TestPki {
    pub dir: TempDir,
    pub ca_cert: PathBuf,
    pub server_cert: PathBuf,
    pub server_key: PathBuf,
    /// Client identity issued by the CA
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    /// Self-signed client identity the CA knows nothing about
    pub rogue_cert: PathBuf,
    pub rogue_key: PathBuf,
}

impl TestPki {
    pub fn generate() -> Self {
        let dir = tempfile::tempdir().unwrap();

        let ca_key = new_key();
        let ca = build_cert("crywrap test CA", &ca_key, None, Role::Ca);
        let server_key = new_key();
        let server = build_cert("localhost", &server_key, Some((&ca, &ca_key)), Role::Server);
        let client_key = new_key();
        let client = build_cert("trusted client", &client_key, Some((&ca, &ca_key)), Role::Client);
        let rogue_key = new_key();
        let rogue = build_cert("rogue client", &rogue_key, None, Role::Client);

        let write_cert = |name: &str, cert: &X509| {
            let path = dir.path().join(name);
            std::fs::write(&path, cert.to_pem().unwrap()).unwrap();
            path
        };
        let write_key = |name: &str, key: &PKey<Private>| {
            let path = dir.path().join(name);
            std::fs::write(&path, key.private_key_to_pem_pkcs8().unwrap()).unwrap();
            path
        };

        Self {
            ca_cert: write_cert("ca.pem", &ca),
            server_cert: write_cert("server.pem", &server),
            server_key: write_key("server.key", &server_key),
            client_cert: write_cert("client.pem", &client),
            client_key: write_key("client.key", &client_key),
            rogue_cert: write_cert("rogue.pem", &rogue),
            rogue_key: write_key("rogue.key", &rogue_key),
            dir,
        }
    }

    /// Certificate mode configuration forwarding to `backend`
    pub fn server_config(&self, backend: SocketAddr) -> ProxyConfig {
        ProxyConfig {
            listen: Some("127.0.0.1:0".parse().unwrap()),
            destination: Some(Destination::new(backend.ip().to_string(), backend.port())),
            cert: self.server_cert.clone(),
            key: self.server_key.clone(),
            ca: Some(self.ca_cert.clone()),
            debug: true,
            connect_timeout: 5,
            ..ProxyConfig::default()
        }
    }
}

/// Anonymous mode configuration forwarding to `backend`
pub fn anonymous_config(backend: SocketAddr) -> ProxyConfig {
    ProxyConfig {
        listen: Some("127.0.0.1:0".parse().unwrap()),
        destination: Some(Destination::new(backend.ip().to_string(), backend.port())),
        anonymous: true,
        debug: true,
        connect_timeout: 5,
        ..ProxyConfig::default()
    }
}

#[derive(Clone, Copy)]
enum Role {
    Ca,
    Server,
    Client,
}

fn new_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn build_cert(cn: &str, key: &PKey<Private>, issuer: Option<(&X509, &PKey<Private>)>, role: Role) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "crywrap").unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(SERIAL.fetch_add(1, Ordering::Relaxed)).unwrap();
    builder.set_serial_number(&serial.to_asn1_integer().unwrap()).unwrap();
    builder.set_subject_name(&name).unwrap();
    match issuer {
        Some((ca, _)) => builder.set_issuer_name(ca.subject_name()).unwrap(),
        None => builder.set_issuer_name(&name).unwrap(),
    }
    builder.set_pubkey(key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(7).unwrap()).unwrap();

    match role {
        Role::Ca => {
            builder.append_extension(BasicConstraints::new().critical().ca().build().unwrap()).unwrap();
            builder.append_extension(KeyUsage::new().critical().key_cert_sign().crl_sign().build().unwrap()).unwrap();
        }
        Role::Server => {
            builder.append_extension(BasicConstraints::new().build().unwrap()).unwrap();
            builder.append_extension(ExtendedKeyUsage::new().server_auth().build().unwrap()).unwrap();
        }
        Role::Client => {
            builder.append_extension(BasicConstraints::new().build().unwrap()).unwrap();
            builder.append_extension(ExtendedKeyUsage::new().client_auth().build().unwrap()).unwrap();
        }
    }

    let ski = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(issuer.map(|(ca, _)| &**ca), None))
        .unwrap();
    builder.append_extension(ski).unwrap();
    if let Some((ca, _)) = issuer {
        let aki = AuthorityKeyIdentifier::new()
            .keyid(false)
            .build(&builder.x509v3_context(Some(&**ca), None))
            .unwrap();
        builder.append_extension(aki).unwrap();
    }

    let signing_key = issuer.map(|(_, k)| k).unwrap_or(key);
    builder.sign(signing_key, MessageDigest::sha256()).unwrap();
    builder.build()
}

/// How a test client sets up its TLS session
#[derive(Clone, Copy, Default)]
pub struct ClientOptions<'a> {
    /// Offer only anonymous cipher suites (TLS 1.2)
    pub anonymous: bool,
    /// Client certificate and key to present
    pub identity: Option<(&'a Path, &'a Path)>,
}

/// Connect to `addr` and complete a client handshake
pub async fn tls_connect(addr: SocketAddr, options: ClientOptions<'_>) -> Result<SslStream<TcpStream>, String> {
    let tcp = TcpStream::connect(addr).await.map_err(|e| e.to_string())?;
    tls_handshake(tcp, options).await
}

/// Complete a client handshake over an established TCP connection
pub async fn tls_handshake(tcp: TcpStream, options: ClientOptions<'_>) -> Result<SslStream<TcpStream>, String> {
    let mut builder = SslConnector::builder(SslMethod::tls()).map_err(|e| e.to_string())?;
    builder.set_verify(SslVerifyMode::NONE);
    if options.anonymous {
        builder.set_cipher_list(ANON_CIPHERS).map_err(|e| e.to_string())?;
        builder.set_max_proto_version(Some(SslVersion::TLS1_2)).map_err(|e| e.to_string())?;
    }
    if let Some((cert, key)) = options.identity {
        builder.set_certificate_file(cert, SslFiletype::PEM).map_err(|e| e.to_string())?;
        builder.set_private_key_file(key, SslFiletype::PEM).map_err(|e| e.to_string())?;
    }
    let connector = builder.build();

    let ssl: Ssl = connector
        .configure()
        .map_err(|e| e.to_string())?
        .verify_hostname(false)
        .into_ssl("localhost")
        .map_err(|e| e.to_string())?;
    let mut stream = SslStream::new(ssl, tcp).map_err(|e| e.to_string())?;
    Pin::new(&mut stream).connect().await.map_err(|e| e.to_string())?;
    Ok(stream)
}

/// Read until the peer closes or an error occurs
///
/// Returns the bytes read and whether the stream ended with a clean EOF.
pub async fn read_to_close<S: AsyncReadExt + Unpin>(stream: &mut S) -> (Vec<u8>, bool) {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match tokio::time::timeout(Duration::from_secs(10), stream.read(&mut buf)).await {
            Ok(Ok(0)) => return (data, true),
            Ok(Ok(n)) => data.extend_from_slice(&buf[..n]),
            Ok(Err(_)) => return (data, false),
            Err(_) => panic!("timed out waiting for the peer to close"),
        }
    }
}

/// Backend that echoes everything back
pub async fn echo_backend() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
                let _ = writer.shutdown().await;
            });
        }
    });
    (addr, handle)
}

/// Backend listener the test drives by hand
pub async fn manual_backend() -> (SocketAddr, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    (listener.local_addr().unwrap(), listener)
}

/// An address with nothing listening on it
pub fn closed_port() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Proxy serving in a background task
pub struct RunningProxy {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<crywrap::Result<()>>,
}

impl RunningProxy {
    pub async fn start(config: ProxyConfig) -> Self {
        let credentials = ServerCredentials::load(&config).unwrap();
        let proxy = Proxy::new(ProxyContext::new(config, credentials).unwrap());
        let listener = Proxy::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            proxy.serve(listener, async {
                let _ = rx.await;
            }).await
        });

        Self { addr, shutdown: Some(tx), handle }
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let result = tokio::time::timeout(Duration::from_secs(10), &mut self.handle)
            .await
            .expect("proxy did not stop")
            .unwrap();
        assert!(result.is_ok(), "serve failed: {:?}", result.err());
    }
}
