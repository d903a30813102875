//! Fixture builders for coordinator tests.

use chrono::Utc;
use skyclaw_core::{JobPayload, Requirement};

pub fn host_capabilities(caps: &[&str]) -> Vec<String> {
    caps.iter().map(|c| c.to_string()).collect()
}

pub fn shell_job_fixture(command: &str) -> JobPayload {
    JobPayload::Shell {
        command: command.to_string(),
        args: Vec::new(),
        cwd: None,
        env: Default::default(),
        timeout_ms: None,
    }
}

pub fn openclaw_job_fixture(args: &[&str]) -> JobPayload {
    JobPayload::OpenclawRun {
        args: args.iter().map(|a| a.to_string()).collect(),
        openclaw_dir: None,
        env: Default::default(),
        timeout_ms: None,
    }
}

pub fn requirement_fixture(caps: &[&str]) -> Requirement {
    Requirement::normalized(&host_capabilities(caps))
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
