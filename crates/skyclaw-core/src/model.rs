//! Data model: hosts, jobs, services, idempotency records, and snapshots.
//!
//! Types here are plain serde structs/enums. Payloads keep `serde_json::Value`
//! passthrough fields where the spec calls for preserving unknown data across
//! persist/replicate cycles (see spec.md §9 "Dynamic-typed JSON payloads").

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalize a capability set: trim, drop empties, dedupe, sort.
pub fn normalize_capabilities<I, S>(caps: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let set: BTreeSet<String> = caps
        .into_iter()
        .map(|c| c.as_ref().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    set.into_iter().collect()
}

/// `required ⊆ have`, both assumed normalized.
pub fn capabilities_satisfied(required: &[String], have: &[String]) -> bool {
    required.iter().all(|r| have.contains(r))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub id: String,
    pub name: String,
    pub registered_at: DateTime<Utc>,
    pub capabilities: Vec<String>,
    pub max_parallel: u32,
    pub active_leases: u32,
    pub last_seen_at: DateTime<Utc>,
    pub version: u64,
    pub updated_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Leased,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum JobPayload {
    Shell {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        cwd: Option<String>,
        #[serde(default)]
        env: serde_json::Map<String, serde_json::Value>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    #[serde(rename = "openclaw-run")]
    OpenclawRun {
        #[serde(default)]
        args: Vec<String>,
        openclaw_dir: Option<String>,
        #[serde(default)]
        env: serde_json::Map<String, serde_json::Value>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Requirement {
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

impl Requirement {
    pub fn normalized(caps: &[String]) -> Self {
        Requirement {
            required_capabilities: normalize_capabilities(caps),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
    pub attempts: u32,
    pub assigned_host_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub payload: JobPayload,
    pub requirement: Requirement,
    pub submitted_by: Option<String>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub version: u64,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Pending,
    Running,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Pending,
    Running,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAssignment {
    pub host_id: String,
    pub status: AssignmentStatus,
    pub endpoint: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Trim a trailing `/` from a service endpoint, per spec.md §3.
pub fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.trim_end_matches('/').to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub env: serde_json::Map<String, serde_json::Value>,
    pub replicas: u32,
    pub required_capabilities: Vec<String>,
    pub status: ServiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub assignments: Vec<ServiceAssignment>,
    pub version: u64,
    pub updated_by: String,
}

impl Service {
    /// Recompute `status` from the assignment aggregate (spec.md §3):
    /// running if any assignment running; else pending if any pending;
    /// else failed.
    pub fn recompute_status(&mut self) {
        self.status = if self
            .assignments
            .iter()
            .any(|a| a.status == AssignmentStatus::Running)
        {
            ServiceStatus::Running
        } else if self
            .assignments
            .iter()
            .any(|a| a.status == AssignmentStatus::Pending)
        {
            ServiceStatus::Pending
        } else {
            ServiceStatus::Failed
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencyRecord {
    pub route: String,
    pub key: String,
    pub request_hash: String,
    pub status_code: u16,
    pub response_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub node_id: String,
    pub hosts: Vec<Host>,
    pub jobs: Vec<Job>,
    pub services: Vec<Service>,
}

/// Last-writer-wins conflict resolution used by `mergeSnapshot` (spec.md §4.1).
///
/// Higher `version` wins; ties broken by `updated_at` (lexicographic), then
/// by `updated_by`. Total because `next_version` only grows.
pub fn should_adopt(
    local_version: u64,
    local_updated_at: &str,
    local_updated_by: &str,
    incoming_version: u64,
    incoming_updated_at: &str,
    incoming_updated_by: &str,
) -> bool {
    if incoming_version != local_version {
        return incoming_version > local_version;
    }
    if incoming_updated_at != local_updated_at {
        return incoming_updated_at > local_updated_at;
    }
    incoming_updated_by > local_updated_by
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_capabilities_trims_dedupes_and_sorts() {
        let out = normalize_capabilities(vec![" shell ", "openclaw", "shell", ""]);
        assert_eq!(out, vec!["openclaw".to_string(), "shell".to_string()]);
    }

    #[test]
    fn capabilities_satisfied_checks_subset() {
        let have = vec!["openclaw".to_string(), "shell".to_string()];
        assert!(capabilities_satisfied(&["shell".to_string()], &have));
        assert!(!capabilities_satisfied(&["gpu".to_string()], &have));
    }

    #[test]
    fn normalize_endpoint_strips_trailing_slash() {
        assert_eq!(normalize_endpoint("http://host:9000/"), "http://host:9000");
        assert_eq!(normalize_endpoint("http://host:9000"), "http://host:9000");
    }

    #[test]
    fn recompute_status_prefers_running_over_pending_over_failed() {
        let mut svc = Service {
            id: "svc_1".to_string(),
            name: "api".to_string(),
            command: "node".to_string(),
            args: vec![],
            cwd: None,
            env: Default::default(),
            replicas: 2,
            required_capabilities: vec![],
            status: ServiceStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            assignments: vec![
                ServiceAssignment {
                    host_id: "h1".to_string(),
                    status: AssignmentStatus::Failed,
                    endpoint: None,
                    error: Some("boom".to_string()),
                    started_at: None,
                    updated_at: Utc::now(),
                },
                ServiceAssignment {
                    host_id: "h2".to_string(),
                    status: AssignmentStatus::Pending,
                    endpoint: None,
                    error: None,
                    started_at: None,
                    updated_at: Utc::now(),
                },
            ],
            version: 1,
            updated_by: "node-a".to_string(),
        };
        svc.recompute_status();
        assert_eq!(svc.status, ServiceStatus::Pending);

        svc.assignments[1].status = AssignmentStatus::Running;
        svc.recompute_status();
        assert_eq!(svc.status, ServiceStatus::Running);

        svc.assignments.clear();
        svc.assignments.push(ServiceAssignment {
            host_id: "h3".to_string(),
            status: AssignmentStatus::Failed,
            endpoint: None,
            error: None,
            started_at: None,
            updated_at: Utc::now(),
        });
        svc.recompute_status();
        assert_eq!(svc.status, ServiceStatus::Failed);
    }

    #[test]
    fn should_adopt_compares_version_then_updated_at_then_updated_by() {
        assert!(should_adopt(1, "t0", "node-a", 2, "t0", "node-a"));
        assert!(!should_adopt(2, "t0", "node-a", 1, "t0", "node-a"));
        assert!(should_adopt(1, "t0", "node-a", 1, "t1", "node-a"));
        assert!(should_adopt(1, "t0", "node-a", 1, "t0", "node-b"));
        assert!(!should_adopt(1, "t0", "node-b", 1, "t0", "node-a"));
    }
}
