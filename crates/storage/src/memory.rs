//! In-memory store for tests and ephemeral nodes.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::errors::Result;
use crate::store::{Bucket, Entry, ReadTxn, Snapshot, Staged, Store, WriteSet, WriteTxn};

type Buckets = [BTreeMap<Vec<u8>, Vec<u8>>; 4];

/// `Store` over ordered maps. The write lock is held for the whole of an
/// update scope, so update scopes are serialized like in the sled store.
#[derive(Default)]
pub struct MemoryStore {
    buckets: RwLock<Buckets>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently committed to `bucket`.
    pub fn len(&self, bucket: Bucket) -> usize {
        self.buckets.read()[bucket.index()].len()
    }
}

struct MemorySnapshot<'a> {
    buckets: &'a Buckets,
}

impl ReadTxn for MemorySnapshot<'_> {
    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.buckets[bucket.index()].get(key).cloned())
    }

    fn last(&self, bucket: Bucket) -> Result<Option<Entry>> {
        Ok(self.buckets[bucket.index()]
            .iter()
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone())))
    }
}

impl Snapshot for MemorySnapshot<'_> {
    fn scan_rev<'s>(&'s self, bucket: Bucket) -> Box<dyn Iterator<Item = Result<Entry>> + 's> {
        Box::new(
            self.buckets[bucket.index()]
                .iter()
                .rev()
                .map(|(k, v)| Ok((k.clone(), v.clone()))),
        )
    }
}

fn apply(buckets: &mut Buckets, writes: WriteSet) {
    for ((bucket, key), value) in writes {
        let tree = &mut buckets[bucket.index()];
        match value {
            Some(value) => {
                tree.insert(key, value);
            }
            None => {
                tree.remove(&key);
            }
        }
    }
}

impl Store for MemoryStore {
    fn view<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn ReadTxn) -> Result<T>,
    {
        let guard = self.buckets.read();
        f(&MemorySnapshot { buckets: &guard })
    }

    fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn WriteTxn) -> Result<T>,
    {
        let mut guard = self.buckets.write();
        let (out, writes) = {
            let base = MemorySnapshot { buckets: &guard };
            let mut txn = Staged::new(&base);
            let out = f(&mut txn)?;
            (out, txn.into_writes())
        };
        apply(&mut guard, writes);
        Ok(out)
    }
}
