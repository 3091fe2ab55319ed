//! Dialing registered peers
//!
//! A dial resolves the peer's address through the registry, connects, and
//! runs a handshake pinned to the peer's public key. Each attempt moves
//! `Resolving → Handshaking → Authenticated`, or ends in `Failed`. Nothing
//! is retried here; callers own their retry policy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cairn_storage::{PeerRegistry, Store};
use cairn_types::PublicKey;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::client::PeerClient;
use crate::credential::{AddressLookup, PinnedIdentity, ResolvedPeer, TlsConfigProvider};
use crate::errors::{DialError, Result};

/// Only network the dialer speaks.
pub const NETWORK_TCP: &str = "tcp";

/// Nominal target handed to the transport; the real address comes from the
/// registry, never from DNS.
pub const PLACEHOLDER_TARGET: &str = "placeholder.cairn.invalid:443";

/// Server name sent in the handshake. Never resolved, never verified.
pub const PLACEHOLDER_SERVER_NAME: &str = "placeholder.cairn.invalid";

/// Dial configuration
#[derive(Debug, Clone)]
pub struct DialConfig {
    /// Bound on address lookup, TCP connect and handshake together.
    pub connect_timeout: Duration,
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Progress of a single dial attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialState {
    Resolving,
    Handshaking,
    Authenticated,
    Failed,
}

impl DialState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DialState::Authenticated | DialState::Failed)
    }
}

struct DialAttempt {
    peer: PublicKey,
    state: DialState,
    started: Instant,
}

impl DialAttempt {
    fn start(peer: PublicKey) -> Self {
        debug!(%peer, state = ?DialState::Resolving, "dialing peer");
        Self {
            peer,
            state: DialState::Resolving,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: DialState) {
        debug_assert!(!self.state.is_terminal());
        debug!(peer = %self.peer, from = ?self.state, to = ?next, "dial progress");
        self.state = next;
    }

    fn fail(&mut self, err: &DialError) {
        warn!(
            peer = %self.peer,
            stage = ?self.state,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            error = %err,
            "dial failed"
        );
        self.state = DialState::Failed;
    }
}

/// Opens authenticated connections to peers known to the registry.
pub struct Dialer<S> {
    registry: PeerRegistry<S>,
    tls: Arc<dyn TlsConfigProvider>,
    config: DialConfig,
}

impl<S: Store + 'static> Dialer<S> {
    pub fn new(
        registry: PeerRegistry<S>,
        tls: Arc<dyn TlsConfigProvider>,
        config: DialConfig,
    ) -> Self {
        Self {
            registry,
            tls,
            config,
        }
    }

    pub fn config(&self) -> &DialConfig {
        &self.config
    }

    /// Connect to the peer owning `key`.
    ///
    /// Fails with `AddressUnknown` before touching the network when no
    /// address is on file, with `HandshakeIdentityMismatch` when the far end
    /// presents any other key, and with `Timeout` once `connect_timeout`
    /// passes. A failed attempt leaves no open socket behind.
    pub async fn dial(&self, key: &PublicKey) -> Result<PeerClient> {
        let mut attempt = DialAttempt::start(*key);
        let limit = self.config.connect_timeout;

        let outcome = timeout(limit, self.establish(key, &mut attempt))
            .await
            .unwrap_or_else(|_| Err(DialError::Timeout(limit)));

        match outcome {
            Ok(client) => {
                attempt.advance(DialState::Authenticated);
                info!(peer = %key, addr = %client.address(), "peer connection authenticated");
                Ok(client)
            }
            Err(err) => {
                attempt.fail(&err);
                Err(err)
            }
        }
    }

    async fn establish(&self, key: &PublicKey, attempt: &mut DialAttempt) -> Result<PeerClient> {
        let credential = PinnedIdentity::new(self.tls.clone(), self.lookup_for(*key));

        // the registry read finishes here, before any socket is opened
        let peer = credential.resolve(NETWORK_TCP, PLACEHOLDER_TARGET)?;
        if peer.network != NETWORK_TCP {
            return Err(DialError::UnsupportedNetwork(peer.network));
        }
        let server_name = ServerName::try_from(PLACEHOLDER_SERVER_NAME)?;

        let tcp = TcpStream::connect(peer.address.as_str()).await?;
        attempt.advance(DialState::Handshaking);
        let stream = credential.handshake(&peer, server_name, tcp).await?;

        Ok(PeerClient::new(peer.expected_key, peer.address, stream))
    }

    fn lookup_for(&self, key: PublicKey) -> AddressLookup {
        let registry = self.registry.clone();
        Arc::new(move |network: &str, _nominal: &str| {
            let address = registry.resolve_address(&key)?;
            Ok(ResolvedPeer {
                network: network.to_string(),
                address,
                expected_key: key,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticIdentity;
    use cairn_storage::MemoryStore;
    use ed25519_dalek::SigningKey;

    fn dialer(registry: PeerRegistry<MemoryStore>) -> Dialer<MemoryStore> {
        let local = StaticIdentity::new(SigningKey::generate(&mut rand::rngs::OsRng));
        Dialer::new(registry, Arc::new(local), DialConfig::default())
    }

    #[test]
    fn default_timeout_is_thirty_seconds() {
        assert_eq!(DialConfig::default().connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn only_final_states_are_terminal() {
        assert!(!DialState::Resolving.is_terminal());
        assert!(!DialState::Handshaking.is_terminal());
        assert!(DialState::Authenticated.is_terminal());
        assert!(DialState::Failed.is_terminal());
    }

    #[test]
    fn lookup_ignores_nominal_address() {
        let registry = PeerRegistry::new(Arc::new(MemoryStore::new()));
        let key = PublicKey::from_bytes([5; 32]);
        registry.set_address(&key, "192.0.2.10:7000").unwrap();

        let lookup = dialer(registry).lookup_for(key);
        let resolved = lookup("tcp", "example.org:1").unwrap();
        assert_eq!(
            resolved,
            ResolvedPeer {
                network: "tcp".to_string(),
                address: "192.0.2.10:7000".to_string(),
                expected_key: key,
            }
        );
    }

    #[tokio::test]
    async fn missing_address_fails_before_connecting() {
        let registry = PeerRegistry::new(Arc::new(MemoryStore::new()));
        let key = PublicKey::from_bytes([6; 32]);
        registry.get_or_create(&key).unwrap();

        let err = dialer(registry).dial(&key).await.unwrap_err();
        assert!(matches!(err, DialError::AddressUnknown));
    }
}
