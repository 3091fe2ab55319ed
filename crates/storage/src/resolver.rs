//! Storage resolution for peers
//!
//! Turns the storage binding of a peer into one logical key-value handle.
//! Opening individual backends and combining them are both delegated to
//! collaborators supplied by the hosting application.

use std::sync::Arc;

use cairn_types::PublicKey;
use tracing::{debug, warn};

use crate::errors::{RegistryError, Result};
use crate::registry::PeerRegistry;
use crate::store::Store;

/// Key-value handle, either a single backend or a merged view.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> anyhow::Result<()>;
    fn delete(&self, key: &[u8]) -> anyhow::Result<()>;
}

/// Opens a backend by the identifier recorded in a storage binding.
pub trait BackendFactory: Send + Sync {
    fn open_backend(&self, backend: &str) -> anyhow::Result<Arc<dyn KvStore>>;
}

/// Combines several backends into one logical store.
pub trait Multiplexer: Send + Sync {
    fn merge(&self, backends: Vec<Arc<dyn KvStore>>) -> Arc<dyn KvStore>;
}

pub struct StorageResolver<S> {
    registry: PeerRegistry<S>,
    factory: Arc<dyn BackendFactory>,
    multiplexer: Arc<dyn Multiplexer>,
}

impl<S: Store> StorageResolver<S> {
    pub fn new(
        registry: PeerRegistry<S>,
        factory: Arc<dyn BackendFactory>,
        multiplexer: Arc<dyn Multiplexer>,
    ) -> Self {
        Self {
            registry,
            factory,
            multiplexer,
        }
    }

    /// Merged storage offered to `key`.
    ///
    /// Fails with `NoStorageForPeer` when no binding exists, and with
    /// `BackendOpenFailure` on the first backend that cannot be opened. An
    /// existing but empty binding yields an empty merged handle.
    pub fn open_storage(&self, key: &PublicKey) -> Result<Arc<dyn KvStore>> {
        let backends = self.registry.storage_binding(key)?;

        let mut handles = Vec::with_capacity(backends.len());
        for backend in backends {
            match self.factory.open_backend(&backend) {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    warn!(peer = %key, %backend, error = %source, "backend failed to open");
                    return Err(RegistryError::BackendOpenFailure { backend, source });
                }
            }
        }

        debug!(peer = %key, backends = handles.len(), "merging peer storage");
        Ok(self.multiplexer.merge(handles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use anyhow::anyhow;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct MapKv(Mutex<BTreeMap<Vec<u8>, Vec<u8>>>);

    impl KvStore for MapKv {
        fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
            Ok(self.0.lock().get(key).cloned())
        }
        fn put(&self, key: &[u8], value: &[u8]) -> anyhow::Result<()> {
            self.0.lock().insert(key.to_vec(), value.to_vec());
            Ok(())
        }
        fn delete(&self, key: &[u8]) -> anyhow::Result<()> {
            self.0.lock().remove(key);
            Ok(())
        }
    }

    struct Factory;

    impl BackendFactory for Factory {
        fn open_backend(&self, backend: &str) -> anyhow::Result<Arc<dyn KvStore>> {
            if backend.starts_with("broken") {
                return Err(anyhow!("backend {backend} is offline"));
            }
            Ok(Arc::new(MapKv::default()))
        }
    }

    /// Records how many handles it was asked to merge.
    #[derive(Default)]
    struct CountingMux(Mutex<Vec<usize>>);

    impl Multiplexer for CountingMux {
        fn merge(&self, backends: Vec<Arc<dyn KvStore>>) -> Arc<dyn KvStore> {
            self.0.lock().push(backends.len());
            Arc::new(MapKv::default())
        }
    }

    fn resolver() -> (StorageResolver<MemoryStore>, Arc<CountingMux>) {
        let registry = PeerRegistry::new(Arc::new(MemoryStore::new()));
        let mux = Arc::new(CountingMux::default());
        let resolver = StorageResolver::new(registry, Arc::new(Factory), mux.clone());
        (resolver, mux)
    }

    #[test]
    fn known_peer_without_binding_has_no_storage() {
        let (resolver, mux) = resolver();
        let key = PublicKey::from_bytes([1; 32]);
        resolver.registry.get_or_create(&key).unwrap();

        let err = resolver.open_storage(&key).err().expect("no binding");
        assert!(matches!(err, RegistryError::NoStorageForPeer));
        assert!(mux.0.lock().is_empty());
    }

    #[test]
    fn all_offered_backends_are_merged() {
        let (resolver, mux) = resolver();
        let key = PublicKey::from_bytes([2; 32]);
        resolver.registry.offer_storage(&key, "disk").unwrap();
        resolver.registry.offer_storage(&key, "cloud").unwrap();

        resolver.open_storage(&key).expect("merged handle");
        assert_eq!(*mux.0.lock(), vec![2]);
    }

    #[test]
    fn one_failed_backend_aborts_the_merge() {
        let (resolver, mux) = resolver();
        let key = PublicKey::from_bytes([3; 32]);
        resolver.registry.offer_storage(&key, "disk").unwrap();
        resolver.registry.offer_storage(&key, "broken-nas").unwrap();

        let err = resolver.open_storage(&key).err().expect("must fail");
        match err {
            RegistryError::BackendOpenFailure { backend, .. } => assert_eq!(backend, "broken-nas"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(mux.0.lock().is_empty());
    }
}
