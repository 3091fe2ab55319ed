//! Cairn Types
//!
//! Identity primitives shared by the registry and the connection layer.
//! Every participant is named by an Ed25519 public key; the registry maps
//! each key to a small dense [`PeerId`] used for compact indexing.

pub mod key;
pub mod peer;

pub use key::*;
pub use peer::*;
