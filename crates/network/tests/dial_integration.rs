//! Loopback dial tests: a real TLS acceptor on 127.0.0.1 presenting a raw
//! Ed25519 key, dialed through the registry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cairn_network::{
    presented_key, DialConfig, DialError, Dialer, PinnedIdentity, StaticIdentity,
};
use cairn_storage::{MemoryStore, PeerRegistry};
use cairn_types::PublicKey;
use ed25519_dalek::SigningKey;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_rustls::TlsAcceptor;

fn identity() -> StaticIdentity {
    StaticIdentity::new(SigningKey::generate(&mut rand::rngs::OsRng))
}

/// Accepts one connection, reports the dialer's key, then echoes four bytes.
async fn spawn_echo_server(
    server: StaticIdentity,
) -> (String, oneshot::Receiver<Option<PublicKey>>) {
    let config = PinnedIdentity::server_config(&server).expect("server config");
    let acceptor = TlsAcceptor::from(Arc::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr").to_string();
    let (seen_tx, seen_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept");
        let Ok(mut tls) = acceptor.accept(tcp).await else {
            let _ = seen_tx.send(None);
            return;
        };
        let _ = seen_tx.send(presented_key(tls.get_ref().1.peer_certificates()));
        let mut buf = [0u8; 4];
        if tls.read_exact(&mut buf).await.is_ok() {
            let _ = tls.write_all(&buf).await;
            let _ = tls.flush().await;
        }
    });

    (address, seen_rx)
}

fn dialer_with(
    registry: PeerRegistry<MemoryStore>,
    local: StaticIdentity,
    timeout: Duration,
) -> Dialer<MemoryStore> {
    let config = DialConfig {
        connect_timeout: timeout,
    };
    Dialer::new(registry, Arc::new(local), config)
}

#[tokio::test]
async fn dial_authenticates_both_sides_and_carries_bytes() {
    let server = identity();
    let server_key = server.public_key();
    let (address, seen) = spawn_echo_server(server).await;

    let registry = PeerRegistry::new(Arc::new(MemoryStore::new()));
    registry.set_address(&server_key, &address).unwrap();

    let local = identity();
    let local_key = local.public_key();
    let dialer = dialer_with(registry, local, Duration::from_secs(5));

    let mut client = dialer.dial(&server_key).await.expect("dial");
    assert_eq!(client.remote_key(), &server_key);
    assert_eq!(client.address(), address);
    assert_eq!(seen.await.unwrap(), Some(local_key));

    let channel = client.channel().unwrap();
    channel.write_all(b"ping").await.unwrap();
    channel.flush().await.unwrap();
    let mut echoed = [0u8; 4];
    channel.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ping");

    client.close().await.unwrap();
    client.close().await.unwrap();
    assert!(client.is_closed());
    assert!(matches!(client.channel(), Err(DialError::Closed)));
}

#[tokio::test]
async fn dial_rejects_a_server_presenting_another_key() {
    let impostor = identity();
    let presented = impostor.public_key();
    let (address, seen) = spawn_echo_server(impostor).await;

    let expected = identity().public_key();
    let registry = PeerRegistry::new(Arc::new(MemoryStore::new()));
    registry.set_address(&expected, &address).unwrap();

    let dialer = dialer_with(registry, identity(), Duration::from_secs(5));
    let err = dialer.dial(&expected).await.unwrap_err();
    match err {
        DialError::HandshakeIdentityMismatch {
            expected: e,
            presented: p,
        } => {
            assert_eq!(e, expected);
            assert_eq!(p, presented);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(seen.await.unwrap(), None);
}

#[tokio::test]
async fn dial_gives_up_on_a_silent_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    // keep accepted sockets open and never answer the handshake
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((tcp, _)) = listener.accept().await {
            held.push(tcp);
        }
    });

    let key = identity().public_key();
    let registry = PeerRegistry::new(Arc::new(MemoryStore::new()));
    registry.set_address(&key, &address).unwrap();

    let limit = Duration::from_millis(300);
    let dialer = dialer_with(registry, identity(), limit);
    let started = Instant::now();
    let err = dialer.dial(&key).await.unwrap_err();

    assert!(matches!(err, DialError::Timeout(d) if d == limit));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn dial_unknown_peer_is_address_unknown() {
    let registry = PeerRegistry::new(Arc::new(MemoryStore::new()));
    let dialer = dialer_with(registry, identity(), Duration::from_secs(1));
    let err = dialer.dial(&identity().public_key()).await.unwrap_err();
    assert!(matches!(err, DialError::AddressUnknown));
}
