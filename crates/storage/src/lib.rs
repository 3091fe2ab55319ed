//! Cairn Storage
//!
//! Durable peer registry for nodes that identify each other by public key.
//!
//! ## Modules
//! - `store`: transactional store abstraction and bucket layout
//! - `sled_store`: sled-backed store
//! - `memory`: in-memory store for tests
//! - `records`: stored record encoding
//! - `registry`: identity records, id allocation, address and storage bindings
//! - `resolver`: merged storage handles for peers

pub mod errors;
pub mod memory;
pub mod records;
pub mod registry;
pub mod resolver;
pub mod sled_store;
pub mod store;

pub use errors::{RegistryError, Result};
pub use memory::MemoryStore;
pub use records::{PeerRecord, PeerStorageRecord};
pub use registry::PeerRegistry;
pub use resolver::{BackendFactory, KvStore, Multiplexer, StorageResolver};
pub use sled_store::SledStore;
pub use store::{Bucket, Entry, ReadTxn, Store, WriteTxn};
