//! Cairn core wiring.
//!
//! Opens the peer database, loads the node's own key and hands out a single
//! [`App`] that answers peer lookups, resolves storage and dials peers.

pub mod app;
pub mod config;
pub mod identity;
pub mod logging;

pub use app::App;
pub use config::AppConfig;
pub use identity::load_or_generate_identity;
pub use logging::init_logging;
