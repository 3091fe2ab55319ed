//! Peer facade over the registry, storage resolution and dialing.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use cairn_network::{DialError, Dialer, PeerClient, PinnedIdentity, StaticIdentity};
use cairn_storage::{
    BackendFactory, KvStore, Multiplexer, PeerRegistry, RegistryError, SledStore,
    StorageResolver,
};
use cairn_types::{Peer, PublicKey};
use rustls::ServerConfig;
use tracing::info;

use crate::config::AppConfig;
use crate::identity::load_or_generate_identity;

/// Everything a node needs to talk about and to other peers.
pub struct App {
    config: AppConfig,
    identity: Arc<StaticIdentity>,
    registry: PeerRegistry<SledStore>,
    resolver: StorageResolver<SledStore>,
    dialer: Dialer<SledStore>,
}

impl App {
    /// Open the peer database and local identity under `config.data_dir`.
    pub fn open(
        config: AppConfig,
        factory: Arc<dyn BackendFactory>,
        multiplexer: Arc<dyn Multiplexer>,
    ) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("create data dir {}", config.data_dir.display()))?;

        let db_file = config.db_file();
        let store = SledStore::open_with(&db_file, config.sync_writes)
            .with_context(|| format!("open peer database {}", db_file.display()))?;
        let identity = Arc::new(StaticIdentity::new(load_or_generate_identity(
            &config.identity_file(),
        )?));

        let registry = PeerRegistry::new(Arc::new(store));
        let resolver = StorageResolver::new(registry.clone(), factory, multiplexer);
        let dialer = Dialer::new(registry.clone(), identity.clone(), config.dial_config());

        info!(
            db = %db_file.display(),
            local = %identity.public_key(),
            "peer registry ready"
        );

        Ok(Self {
            config,
            identity,
            registry,
            resolver,
            dialer,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn local_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    pub fn registry(&self) -> &PeerRegistry<SledStore> {
        &self.registry
    }

    /// Registered peer for `key`; never creates one.
    pub fn get_peer(&self, key: &PublicKey) -> Result<Peer, RegistryError> {
        self.registry.lookup(key)
    }

    /// Registered peer for `key`, allocating an id on first sight.
    pub fn make_peer(&self, key: &PublicKey) -> Result<Peer, RegistryError> {
        self.registry.get_or_create(key)
    }

    pub fn open_kv_for_peer(&self, key: &PublicKey) -> Result<Arc<dyn KvStore>, RegistryError> {
        self.resolver.open_storage(key)
    }

    pub async fn dial_peer(&self, key: &PublicKey) -> Result<PeerClient, DialError> {
        self.dialer.dial(key).await
    }

    /// Acceptor settings presenting this node's key, for serving pinned dials.
    pub fn server_config(&self) -> Result<ServerConfig, DialError> {
        PinnedIdentity::server_config(self.identity.as_ref())
    }

    pub fn flush(&self) -> Result<(), RegistryError> {
        self.registry.store().flush()
    }
}
