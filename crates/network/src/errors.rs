//! Dial errors

use std::time::Duration;

use cairn_storage::RegistryError;
use cairn_types::PublicKey;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DialError {
    #[error("no address known for peer")]
    AddressUnknown,

    #[error("registry error: {0}")]
    Registry(RegistryError),

    #[error("peer presented key {presented}, expected {expected}")]
    HandshakeIdentityMismatch {
        expected: PublicKey,
        presented: PublicKey,
    },

    #[error("dial timed out after {0:?}")]
    Timeout(Duration),

    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("invalid server name: {0}")]
    InvalidServerName(#[from] rustls::pki_types::InvalidDnsNameError),

    #[error("local identity unavailable: {0}")]
    LocalIdentity(#[source] anyhow::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer connection is closed")]
    Closed,
}

impl From<RegistryError> for DialError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AddressUnknown => DialError::AddressUnknown,
            other => DialError::Registry(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DialError>;
