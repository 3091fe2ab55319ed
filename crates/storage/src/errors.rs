//! Error types for the peer registry

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("peer not found")]
    PeerNotFound,

    #[error("no storage offered to peer")]
    NoStorageForPeer,

    #[error("no address known for peer")]
    AddressUnknown,

    #[error("out of peer ids")]
    IdentifierSpaceExhausted,

    #[error("corrupt record in bucket {bucket}: {detail}")]
    RecordCorrupt { bucket: &'static str, detail: String },

    #[error("failed to open storage backend {backend}: {source}")]
    BackendOpenFailure {
        backend: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RegistryError {
    pub(crate) fn corrupt(bucket: &'static str, detail: impl Into<String>) -> Self {
        Self::RecordCorrupt {
            bucket,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
