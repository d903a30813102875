use thiserror::Error;

use crate::store::StoreError;

/// Error kinds surfaced by the coordinator state machine.
///
/// Each variant maps to one HTTP status in `skyclaw-server`'s error
/// translation layer (see spec §7); this crate has no knowledge of HTTP
/// itself so the mapping lives closer to the transport.
#[derive(Debug, Error, Clone)]
pub enum CoordinatorError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl CoordinatorError {
    pub fn unknown_host(host_id: &str) -> Self {
        CoordinatorError::Internal(format!("unknown host: {host_id}"))
    }

    pub fn unknown_job(job_id: &str) -> Self {
        CoordinatorError::Internal(format!("unknown job: {job_id}"))
    }
}

impl From<StoreError> for CoordinatorError {
    fn from(err: StoreError) -> Self {
        CoordinatorError::Internal(err.to_string())
    }
}
