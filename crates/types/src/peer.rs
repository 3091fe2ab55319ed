use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

use crate::key::PublicKey;

/// Width in bytes of an encoded [`PeerId`] index key.
pub const PEER_ID_BYTES: usize = 4;

/// Dense numeric surrogate for a peer public key.
///
/// Ids start at 1 and are never reused; zero is never a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(NonZeroU32);

impl PeerId {
    /// The first id handed out by an empty registry.
    pub const FIRST: PeerId = PeerId(NonZeroU32::MIN);

    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// The id following this one, or `None` once the 32-bit space is used up.
    pub fn checked_next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Big-endian encoding so byte order of index keys matches numeric order.
    pub fn to_be_bytes(self) -> [u8; PEER_ID_BYTES] {
        self.get().to_be_bytes()
    }

    pub fn from_be_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; PEER_ID_BYTES] = bytes.try_into().ok()?;
        Self::new(u32::from_be_bytes(raw))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity record: a known public key and the id it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub public_key: PublicKey,
}

impl Peer {
    pub fn new(id: PeerId, public_key: PublicKey) -> Self {
        Self { id, public_key }
    }
}
