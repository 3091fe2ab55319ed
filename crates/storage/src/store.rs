//! Durable store abstraction
//!
//! The registry only talks to storage through scoped transactions: `view`
//! for read-only work and `update` for read-write work. An `update` scope
//! commits every staged write atomically when its closure returns `Ok` and
//! discards them all otherwise. Update scopes never interleave.

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::Result;

/// Named partitions of the peer database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    /// public key → encoded identity record
    Peer,
    /// big-endian id → public key
    PeerId,
    /// public key → address string
    PeerAddr,
    /// public key → encoded storage binding
    PeerStorage,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::Peer,
        Bucket::PeerId,
        Bucket::PeerAddr,
        Bucket::PeerStorage,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Bucket::Peer => "peer",
            Bucket::PeerId => "peer_id",
            Bucket::PeerAddr => "peer_addr",
            Bucket::PeerStorage => "peer_storage",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type Entry = (Vec<u8>, Vec<u8>);

/// Read access inside a transaction scope.
pub trait ReadTxn {
    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Greatest entry of `bucket` in ascending key order.
    fn last(&self, bucket: Bucket) -> Result<Option<Entry>>;
}

/// Write access inside an `update` scope. Reads observe earlier writes of
/// the same scope.
pub trait WriteTxn: ReadTxn {
    fn put(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&mut self, bucket: Bucket, key: &[u8]) -> Result<()>;
}

/// Transactional ordered key-value engine backing the registry.
pub trait Store: Send + Sync {
    fn view<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn ReadTxn) -> Result<T>;

    fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn WriteTxn) -> Result<T>;
}

/// Committed state an update scope stages its writes against.
pub(crate) trait Snapshot: ReadTxn {
    fn scan_rev<'s>(&'s self, bucket: Bucket) -> Box<dyn Iterator<Item = Result<Entry>> + 's>;
}

/// Pending writes of one update scope; `None` marks a delete.
pub(crate) type WriteSet = BTreeMap<(Bucket, Vec<u8>), Option<Vec<u8>>>;

/// Write transaction that buffers mutations until the store commits them.
pub(crate) struct Staged<'s, S: Snapshot> {
    base: &'s S,
    writes: WriteSet,
}

impl<'s, S: Snapshot> Staged<'s, S> {
    pub(crate) fn new(base: &'s S) -> Self {
        Self {
            base,
            writes: WriteSet::new(),
        }
    }

    pub(crate) fn into_writes(self) -> WriteSet {
        self.writes
    }

    fn last_staged(&self, bucket: Bucket) -> Option<Entry> {
        self.writes
            .range((bucket, Vec::new())..)
            .take_while(|((b, _), _)| *b == bucket)
            .filter_map(|((_, key), value)| value.as_ref().map(|v| (key.clone(), v.clone())))
            .last()
    }

    fn last_committed(&self, bucket: Bucket) -> Result<Option<Entry>> {
        for item in self.base.scan_rev(bucket) {
            let (key, value) = item?;
            match self.writes.get(&(bucket, key.clone())) {
                Some(None) => continue,
                Some(Some(staged)) => return Ok(Some((key, staged.clone()))),
                None => return Ok(Some((key, value))),
            }
        }
        Ok(None)
    }
}

impl<S: Snapshot> ReadTxn for Staged<'_, S> {
    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.writes.get(&(bucket, key.to_vec())) {
            Some(staged) => Ok(staged.clone()),
            None => self.base.get(bucket, key),
        }
    }

    fn last(&self, bucket: Bucket) -> Result<Option<Entry>> {
        let staged = self.last_staged(bucket);
        let committed = self.last_committed(bucket)?;
        Ok(match (staged, committed) {
            (Some(s), Some(c)) => Some(if c.0 > s.0 { c } else { s }),
            (s, c) => s.or(c),
        })
    }
}

impl<S: Snapshot> WriteTxn for Staged<'_, S> {
    fn put(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> Result<()> {
        self.writes
            .insert((bucket, key.to_vec()), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, bucket: Bucket, key: &[u8]) -> Result<()> {
        self.writes.insert((bucket, key.to_vec()), None);
        Ok(())
    }
}
