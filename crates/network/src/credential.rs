//! Pinned-identity transport credentials
//!
//! Peers authenticate with bare Ed25519 keys instead of certificate chains.
//! Each side sends its key as a DER SubjectPublicKeyInfo in place of a
//! certificate and proves possession through the TLS 1.3 handshake
//! signature. The dialing side accepts the far end only if the presented key
//! equals, byte for byte, the key the address lookup said to expect.

use std::fmt;
use std::sync::Arc;

use cairn_types::{PublicKey, PUBLIC_KEY_BYTES};
use ed25519_dalek::{Signature, Signer as _, SigningKey as Ed25519SigningKey};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::ResolvesClientCert;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::{CertifiedKey, Signer, SigningKey};
use rustls::{
    CertificateError, ClientConfig, DigitallySignedStruct, DistinguishedName, Error as TlsError,
    OtherError, ServerConfig, SignatureAlgorithm, SignatureScheme,
};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::errors::{DialError, Result};

/// DER prefix of an Ed25519 SubjectPublicKeyInfo:
/// SEQUENCE { SEQUENCE { OID 1.3.101.112 } BIT STRING (0 unused bits) }.
const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// Encode `key` as the SubjectPublicKeyInfo sent in place of a certificate.
pub fn encode_spki(key: &PublicKey) -> Vec<u8> {
    let mut spki = Vec::with_capacity(ED25519_SPKI_PREFIX.len() + PUBLIC_KEY_BYTES);
    spki.extend_from_slice(&ED25519_SPKI_PREFIX);
    spki.extend_from_slice(key.as_bytes());
    spki
}

/// Extract the Ed25519 key from a presented SubjectPublicKeyInfo.
pub fn decode_spki(der: &[u8]) -> Option<PublicKey> {
    let raw = der.strip_prefix(&ED25519_SPKI_PREFIX[..])?;
    PublicKey::from_slice(raw).ok()
}

/// Supplies the local identity presented to remote peers.
pub trait TlsConfigProvider: Send + Sync {
    fn signing_key(&self) -> anyhow::Result<Ed25519SigningKey>;
}

/// Provider around a fixed in-memory key.
#[derive(Clone)]
pub struct StaticIdentity {
    key: Ed25519SigningKey,
}

impl StaticIdentity {
    pub fn new(key: Ed25519SigningKey) -> Self {
        Self { key }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(self.key.verifying_key())
    }
}

impl TlsConfigProvider for StaticIdentity {
    fn signing_key(&self) -> anyhow::Result<Ed25519SigningKey> {
        Ok(self.key.clone())
    }
}

/// Where to reach a peer and which key it must present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPeer {
    pub network: String,
    pub address: String,
    pub expected_key: PublicKey,
}

/// Maps the transport's `(network, nominal address)` to the real target.
pub type AddressLookup = Arc<dyn Fn(&str, &str) -> Result<ResolvedPeer> + Send + Sync>;

/// Credential that only completes handshakes with the key named by `lookup`.
#[derive(Clone)]
pub struct PinnedIdentity {
    config: Arc<dyn TlsConfigProvider>,
    lookup: AddressLookup,
}

impl PinnedIdentity {
    pub fn new(config: Arc<dyn TlsConfigProvider>, lookup: AddressLookup) -> Self {
        Self { config, lookup }
    }

    pub fn resolve(&self, network: &str, nominal_addr: &str) -> Result<ResolvedPeer> {
        (self.lookup)(network, nominal_addr)
    }

    /// Client configuration pinned to `expected`, presenting the local key
    /// when the far end asks for client authentication.
    pub fn client_config(&self, expected: PublicKey) -> Result<ClientConfig> {
        let local = self
            .config
            .signing_key()
            .map_err(DialError::LocalIdentity)?;
        let resolver = RawKeyResolver::new(local);
        let config = ClientConfig::builder_with_provider(provider())
            .with_protocol_versions(&[&rustls::version::TLS13])?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(PinnedKeyVerifier::new(expected)))
            .with_client_cert_resolver(Arc::new(resolver));
        Ok(config)
    }

    /// Acceptor configuration presenting the local key and requiring the
    /// dialer to prove possession of an Ed25519 key.
    pub fn server_config(config: &dyn TlsConfigProvider) -> Result<ServerConfig> {
        let local = config.signing_key().map_err(DialError::LocalIdentity)?;
        let resolver = RawKeyResolver::new(local);
        let config = ServerConfig::builder_with_provider(provider())
            .with_protocol_versions(&[&rustls::version::TLS13])?
            .with_client_cert_verifier(Arc::new(RawKeyClientVerifier))
            .with_cert_resolver(Arc::new(resolver));
        Ok(config)
    }

    /// Run the TLS handshake over `tcp`, failing unless the far end is
    /// `peer.expected_key`.
    pub async fn handshake(
        &self,
        peer: &ResolvedPeer,
        server_name: ServerName<'static>,
        tcp: TcpStream,
    ) -> Result<TlsStream<TcpStream>> {
        let connector = TlsConnector::from(Arc::new(self.client_config(peer.expected_key)?));
        connector
            .connect(server_name, tcp)
            .await
            .map_err(classify_handshake_error)
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Key of the remote side of an accepted or dialed connection.
pub fn presented_key(certs: Option<&[CertificateDer<'_>]>) -> Option<PublicKey> {
    certs?.first().and_then(|cert| decode_spki(cert.as_ref()))
}

#[derive(Debug)]
struct IdentityMismatch {
    expected: PublicKey,
    presented: PublicKey,
}

impl fmt::Display for IdentityMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected peer key {}, got {}", self.expected, self.presented)
    }
}

impl std::error::Error for IdentityMismatch {}

fn classify_handshake_error(err: std::io::Error) -> DialError {
    let tls = match err.get_ref().and_then(|inner| inner.downcast_ref::<TlsError>()) {
        Some(tls) => tls.clone(),
        None => return DialError::Io(err),
    };
    if let TlsError::InvalidCertificate(CertificateError::Other(OtherError(cause))) = &tls {
        if let Some(mismatch) = cause.downcast_ref::<IdentityMismatch>() {
            return DialError::HandshakeIdentityMismatch {
                expected: mismatch.expected,
                presented: mismatch.presented,
            };
        }
    }
    DialError::Tls(tls)
}

fn verify_ed25519(
    message: &[u8],
    cert: &CertificateDer<'_>,
    dss: &DigitallySignedStruct,
) -> std::result::Result<HandshakeSignatureValid, TlsError> {
    verify_signature(message, cert.as_ref(), dss.scheme, dss.signature())
}

fn verify_signature(
    message: &[u8],
    spki: &[u8],
    scheme: SignatureScheme,
    signature: &[u8],
) -> std::result::Result<HandshakeSignatureValid, TlsError> {
    if scheme != SignatureScheme::ED25519 {
        return Err(TlsError::General(format!(
            "unsupported signature scheme {scheme:?}"
        )));
    }
    let key =
        decode_spki(spki).ok_or(TlsError::InvalidCertificate(CertificateError::BadEncoding))?;
    let verifying = key
        .verifying_key()
        .map_err(|_| TlsError::InvalidCertificate(CertificateError::BadEncoding))?;
    let signature = Signature::from_slice(signature)
        .map_err(|_| TlsError::InvalidCertificate(CertificateError::BadSignature))?;
    verifying
        .verify_strict(message, &signature)
        .map_err(|_| TlsError::InvalidCertificate(CertificateError::BadSignature))?;
    Ok(HandshakeSignatureValid::assertion())
}

fn tls12_unsupported() -> std::result::Result<HandshakeSignatureValid, TlsError> {
    Err(TlsError::General("raw public keys require TLS 1.3".into()))
}

/// Dial-side verifier accepting exactly one key.
#[derive(Debug)]
pub struct PinnedKeyVerifier {
    expected: PublicKey,
}

impl PinnedKeyVerifier {
    pub fn new(expected: PublicKey) -> Self {
        Self { expected }
    }
}

impl ServerCertVerifier for PinnedKeyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, TlsError> {
        let presented = decode_spki(end_entity.as_ref())
            .ok_or(TlsError::InvalidCertificate(CertificateError::BadEncoding))?;
        presented
            .verifying_key()
            .map_err(|_| TlsError::InvalidCertificate(CertificateError::BadEncoding))?;

        if presented != self.expected {
            warn!(expected = %self.expected, %presented, "peer presented unexpected key");
            let mismatch = IdentityMismatch {
                expected: self.expected,
                presented,
            };
            return Err(TlsError::InvalidCertificate(CertificateError::Other(
                OtherError(Arc::new(mismatch)),
            )));
        }

        debug!(peer = %presented, "peer key matches pinned identity");
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        tls12_unsupported()
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        verify_ed25519(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![SignatureScheme::ED25519]
    }
}

/// Accept-side verifier: any well-formed Ed25519 key whose owner signs the
/// handshake. Who the key belongs to is decided by the application.
#[derive(Debug)]
struct RawKeyClientVerifier;

impl ClientCertVerifier for RawKeyClientVerifier {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> std::result::Result<ClientCertVerified, TlsError> {
        decode_spki(end_entity.as_ref())
            .and_then(|key| key.verifying_key().ok())
            .map(|_| ClientCertVerified::assertion())
            .ok_or(TlsError::InvalidCertificate(CertificateError::BadEncoding))
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        tls12_unsupported()
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        verify_ed25519(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![SignatureScheme::ED25519]
    }
}

/// Presents the local key on both ends of a connection.
#[derive(Debug)]
struct RawKeyResolver {
    certified: Arc<CertifiedKey>,
}

impl RawKeyResolver {
    fn new(key: Ed25519SigningKey) -> Self {
        let public = PublicKey::from(key.verifying_key());
        let cert = CertificateDer::from(encode_spki(&public));
        let certified = CertifiedKey::new(vec![cert], Arc::new(Ed25519Key(key)));
        Self {
            certified: Arc::new(certified),
        }
    }
}

impl ResolvesServerCert for RawKeyResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.certified.clone())
    }
}

impl ResolvesClientCert for RawKeyResolver {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        sigschemes
            .contains(&SignatureScheme::ED25519)
            .then(|| self.certified.clone())
    }

    fn has_certs(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct Ed25519Key(Ed25519SigningKey);

impl SigningKey for Ed25519Key {
    fn choose_scheme(&self, offered: &[SignatureScheme]) -> Option<Box<dyn Signer>> {
        offered
            .contains(&SignatureScheme::ED25519)
            .then(|| Box::new(Ed25519Signer(self.0.clone())) as Box<dyn Signer>)
    }

    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::ED25519
    }
}

#[derive(Debug)]
struct Ed25519Signer(Ed25519SigningKey);

impl Signer for Ed25519Signer {
    fn sign(&self, message: &[u8]) -> std::result::Result<Vec<u8>, TlsError> {
        Ok(self.0.sign(message).to_bytes().to_vec())
    }

    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::ED25519
    }
}
