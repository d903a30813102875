//! Test-only utilities shared across the workspace: an in-memory
//! `StateStore`, fixture builders for jobs/hosts/requirements, and a mock
//! peer HTTP server for replication tests.

mod fixtures;
mod memory_store;
mod mock_peer;

pub use fixtures::{
    host_capabilities, now_rfc3339, openclaw_job_fixture, requirement_fixture, shell_job_fixture,
};
pub use memory_store::InMemoryStore;
pub use mock_peer::MockPeer;
