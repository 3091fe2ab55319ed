//! Stored record layouts.
//!
//! Records are JSON objects: fields are named, and unknown fields are
//! ignored on decode so records written by newer nodes stay readable.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use cairn_types::PeerId;

use crate::errors::{RegistryError, Result};
use crate::store::Bucket;

/// Value of the `peer` bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: u32,
}

impl PeerRecord {
    pub fn peer_id(&self) -> Result<PeerId> {
        PeerId::new(self.id).ok_or_else(|| RegistryError::corrupt(Bucket::Peer.name(), "peer id 0"))
    }
}

/// Value of the `peer_storage` bucket: backends offered to one peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStorageRecord {
    #[serde(default)]
    pub backends: BTreeSet<String>,
}

pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(record)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bucket: Bucket, raw: &[u8]) -> Result<T> {
    serde_json::from_slice(raw).map_err(|e| RegistryError::corrupt(bucket.name(), e.to_string()))
}
