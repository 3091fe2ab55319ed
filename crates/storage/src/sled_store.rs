//! Sled-backed store: one tree per bucket.

use parking_lot::Mutex;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};
use std::path::Path;

use crate::errors::Result;
use crate::store::{Bucket, Entry, ReadTxn, Snapshot, Staged, Store, WriteSet, WriteTxn};

/// Durable `Store` on top of sled.
///
/// Update scopes run one at a time under `writer`, stage their writes, and
/// commit them with a single multi-tree sled transaction, so readers see
/// either none or all of a scope's writes.
pub struct SledStore {
    db: Db,
    trees: [Tree; 4],
    writer: Mutex<()>,
    sync_writes: bool,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, true)
    }

    /// Open the database at `path`; with `sync_writes` every committed
    /// update is flushed to disk before `update` returns.
    pub fn open_with<P: AsRef<Path>>(path: P, sync_writes: bool) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db, sync_writes)
    }

    /// Throwaway database removed when dropped.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, false)
    }

    fn from_db(db: Db, sync_writes: bool) -> Result<Self> {
        let trees = [
            db.open_tree(Bucket::Peer.name())?,
            db.open_tree(Bucket::PeerId.name())?,
            db.open_tree(Bucket::PeerAddr.name())?,
            db.open_tree(Bucket::PeerStorage.name())?,
        ];
        Ok(Self {
            db,
            trees,
            writer: Mutex::new(()),
            sync_writes,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn tree(&self, bucket: Bucket) -> &Tree {
        &self.trees[bucket.index()]
    }

    fn commit(&self, writes: WriteSet) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let [peer, peer_id, peer_addr, peer_storage] = &self.trees;
        let outcome = (peer, peer_id, peer_addr, peer_storage).transaction(
            |(t_peer, t_id, t_addr, t_storage)| {
                let trees = [t_peer, t_id, t_addr, t_storage];
                for ((bucket, key), value) in &writes {
                    let tree = trees[bucket.index()];
                    match value {
                        Some(value) => {
                            tree.insert(key.as_slice(), value.as_slice())?;
                        }
                        None => {
                            tree.remove(key.as_slice())?;
                        }
                    }
                }
                Ok::<(), ConflictableTransactionError<sled::Error>>(())
            },
        );

        match outcome {
            Ok(()) => {}
            Err(TransactionError::Abort(err)) | Err(TransactionError::Storage(err)) => {
                return Err(err.into())
            }
        }

        if self.sync_writes {
            self.db.flush()?;
        }
        Ok(())
    }
}

struct SledSnapshot<'a> {
    store: &'a SledStore,
}

impl ReadTxn for SledSnapshot<'_> {
    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.store.tree(bucket).get(key)?.map(|v| v.to_vec()))
    }

    fn last(&self, bucket: Bucket) -> Result<Option<Entry>> {
        Ok(self
            .store
            .tree(bucket)
            .last()?
            .map(|(k, v)| (k.to_vec(), v.to_vec())))
    }
}

impl Snapshot for SledSnapshot<'_> {
    fn scan_rev<'s>(&'s self, bucket: Bucket) -> Box<dyn Iterator<Item = Result<Entry>> + 's> {
        Box::new(self.store.tree(bucket).iter().rev().map(|item| {
            let (k, v) = item?;
            Ok((k.to_vec(), v.to_vec()))
        }))
    }
}

impl Store for SledStore {
    fn view<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn ReadTxn) -> Result<T>,
    {
        f(&SledSnapshot { store: self })
    }

    fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn WriteTxn) -> Result<T>,
    {
        let _writer = self.writer.lock();
        let base = SledSnapshot { store: self };
        let mut txn = Staged::new(&base);
        let out = f(&mut txn)?;
        self.commit(txn.into_writes())?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RegistryError;

    #[test]
    fn aborted_update_leaves_trees_untouched() {
        let store = SledStore::temporary().unwrap();
        let result: Result<()> = store.update(|tx| {
            tx.put(Bucket::Peer, b"key", b"value")?;
            tx.put(Bucket::PeerId, &[0, 0, 0, 1], b"key")?;
            Err(RegistryError::IdentifierSpaceExhausted)
        });
        assert!(matches!(result, Err(RegistryError::IdentifierSpaceExhausted)));
        assert!(store.view(|tx| tx.get(Bucket::Peer, b"key")).unwrap().is_none());
        assert!(store.view(|tx| tx.last(Bucket::PeerId)).unwrap().is_none());
    }

    #[test]
    fn committed_update_spans_buckets() {
        let store = SledStore::temporary().unwrap();
        store
            .update(|tx| {
                tx.put(Bucket::Peer, b"key", b"{\"id\":1}")?;
                tx.put(Bucket::PeerId, &[0, 0, 0, 1], b"key")
            })
            .unwrap();

        let (peer, index) = store
            .view(|tx| Ok((tx.get(Bucket::Peer, b"key")?, tx.last(Bucket::PeerId)?)))
            .unwrap();
        assert_eq!(peer, Some(b"{\"id\":1}".to_vec()));
        assert_eq!(index, Some((vec![0, 0, 0, 1], b"key".to_vec())));
    }
}
