//! Peer registry
//!
//! Maps peer public keys to dense numeric ids, addresses and storage
//! offers. All state lives in the [`Store`]; the registry keeps nothing in
//! memory between calls.

use std::collections::BTreeSet;
use std::sync::Arc;

use cairn_types::{Peer, PeerId, PublicKey};
use tracing::{debug, info};

use crate::errors::{RegistryError, Result};
use crate::records::{decode, encode, PeerRecord, PeerStorageRecord};
use crate::store::{Bucket, ReadTxn, Store};

/// Phases of [`PeerRegistry::get_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    /// Plain lookup under a read-only transaction.
    Optimistic,
    /// Lookup again and allocate under the write transaction.
    Locked,
}

pub struct PeerRegistry<S> {
    store: Arc<S>,
}

impl<S> Clone for PeerRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> PeerRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the identity record for `key`, or `PeerNotFound`.
    pub fn lookup(&self, key: &PublicKey) -> Result<Peer> {
        self.store.view(|tx| find_peer(tx, key))
    }

    /// Returns the identity record for `key`, registering it if necessary.
    pub fn get_or_create(&self, key: &PublicKey) -> Result<Peer> {
        let mut phase = Registration::Optimistic;
        loop {
            match phase {
                Registration::Optimistic => match self.lookup(key) {
                    Err(RegistryError::PeerNotFound) => phase = Registration::Locked,
                    found_or_failed => return found_or_failed,
                },
                Registration::Locked => {
                    return self.store.update(|tx| {
                        // a concurrent caller may have registered it since
                        match find_peer(&*tx, key) {
                            Err(RegistryError::PeerNotFound) => {}
                            found_or_failed => return found_or_failed,
                        }

                        let id = next_peer_id(&*tx)?;
                        tx.put(Bucket::PeerId, &id.to_be_bytes(), key.as_bytes())?;
                        let record = encode(&PeerRecord { id: id.get() })?;
                        tx.put(Bucket::Peer, key.as_bytes(), &record)?;

                        info!(peer = %key, %id, "registered peer");
                        Ok(Peer::new(id, *key))
                    });
                }
            }
        }
    }

    /// Reverse lookup through the id index.
    pub fn peer_by_id(&self, id: PeerId) -> Result<Peer> {
        self.store.view(|tx| {
            let raw = tx
                .get(Bucket::PeerId, &id.to_be_bytes())?
                .ok_or(RegistryError::PeerNotFound)?;
            let key = PublicKey::from_slice(&raw)
                .map_err(|e| RegistryError::corrupt(Bucket::PeerId.name(), e.to_string()))?;
            Ok(Peer::new(id, key))
        })
    }

    /// Last known address of `key`, or `AddressUnknown`.
    pub fn resolve_address(&self, key: &PublicKey) -> Result<String> {
        let raw = self
            .store
            .view(|tx| tx.get(Bucket::PeerAddr, key.as_bytes()))?
            .ok_or(RegistryError::AddressUnknown)?;
        let addr = String::from_utf8(raw)
            .map_err(|e| RegistryError::corrupt(Bucket::PeerAddr.name(), e.to_string()))?;
        debug!(peer = %key, %addr, "resolved peer address");
        Ok(addr)
    }

    /// Record `address` as the current address of `key`, replacing any older one.
    pub fn set_address(&self, key: &PublicKey, address: &str) -> Result<()> {
        self.store
            .update(|tx| tx.put(Bucket::PeerAddr, key.as_bytes(), address.as_bytes()))
    }

    /// Offer `backend` to the peer; offering the same backend twice is a no-op.
    pub fn offer_storage(&self, key: &PublicKey, backend: &str) -> Result<()> {
        self.store.update(|tx| {
            let mut record = match tx.get(Bucket::PeerStorage, key.as_bytes())? {
                Some(raw) => decode::<PeerStorageRecord>(Bucket::PeerStorage, &raw)?,
                None => PeerStorageRecord::default(),
            };
            if !record.backends.insert(backend.to_string()) {
                return Ok(());
            }
            tx.put(Bucket::PeerStorage, key.as_bytes(), &encode(&record)?)
        })
    }

    /// Backends offered to `key`, or `NoStorageForPeer` when nothing was offered.
    pub fn storage_binding(&self, key: &PublicKey) -> Result<BTreeSet<String>> {
        self.store.view(|tx| {
            let raw = tx
                .get(Bucket::PeerStorage, key.as_bytes())?
                .ok_or(RegistryError::NoStorageForPeer)?;
            let record: PeerStorageRecord = decode(Bucket::PeerStorage, &raw)?;
            Ok(record.backends)
        })
    }
}

fn find_peer<T: ReadTxn + ?Sized>(tx: &T, key: &PublicKey) -> Result<Peer> {
    let raw = tx
        .get(Bucket::Peer, key.as_bytes())?
        .ok_or(RegistryError::PeerNotFound)?;
    let record: PeerRecord = decode(Bucket::Peer, &raw)?;
    Ok(Peer::new(record.peer_id()?, *key))
}

/// One past the largest id in the index; the index is keyed big-endian so
/// its last entry holds the maximum.
fn next_peer_id<T: ReadTxn + ?Sized>(tx: &T) -> Result<PeerId> {
    match tx.last(Bucket::PeerId)? {
        None => Ok(PeerId::FIRST),
        Some((raw, _)) => PeerId::from_be_bytes(&raw)
            .ok_or_else(|| RegistryError::corrupt(Bucket::PeerId.name(), "malformed id key"))?
            .checked_next()
            .ok_or(RegistryError::IdentifierSpaceExhausted),
    }
}
