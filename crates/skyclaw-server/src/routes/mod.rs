pub mod hosts;
pub mod jobs;
pub mod misc;
pub mod network;
pub mod public;
pub mod services;

use skyclaw_core::{CoordinatorError, JobPayload};

pub(crate) fn parse_payload(value: serde_json::Value) -> Result<JobPayload, CoordinatorError> {
    serde_json::from_value(value)
        .map_err(|e| CoordinatorError::BadRequest(format!("invalid job payload: {e}")))
}
