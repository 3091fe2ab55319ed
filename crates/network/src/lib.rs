//! Cairn Network
//!
//! Authenticated connections between peers that trust public keys instead
//! of certificate authorities.
//!
//! ## Modules
//! - `credential`: pinned-identity TLS credential and raw-key certificates
//! - `dial`: registry-backed dialer with a bounded connect timeout
//! - `client`: the closable connection handed to callers
//! - `errors`: dial failure causes

pub mod client;
pub mod credential;
pub mod dial;
pub mod errors;

pub use client::PeerClient;
pub use credential::{
    decode_spki, encode_spki, presented_key, AddressLookup, PinnedIdentity, PinnedKeyVerifier,
    ResolvedPeer, StaticIdentity, TlsConfigProvider,
};
pub use dial::{DialConfig, DialState, Dialer, PLACEHOLDER_SERVER_NAME, PLACEHOLDER_TARGET};
pub use errors::{DialError, Result};
