//! Quorum-write discipline and peer gossip for the skyclaw coordinator.

mod client;
mod discovery;
mod quorum;

pub use client::PeerClient;
pub use discovery::{discover_once, sync_once};
pub use quorum::QuorumWriter;
