//! The synchronous, coarse-locked coordinator state machine (spec.md §4.1).
//!
//! All public methods lock `Inner` for their full body. This is the "coarse
//! exclusive lock" discipline spec.md §5 calls for: no `.await` point can
//! exist inside a mutation, so a `checkpoint()` taken immediately before one
//! is an exact pre-image.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde_json::Map;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::CoordinatorError;
use crate::model::{
    capabilities_satisfied, normalize_capabilities, normalize_endpoint, should_adopt,
    AssignmentStatus, Host, Job, JobPayload, JobResult, JobStatus, Requirement, Service,
    ServiceAssignment, ServiceStatus, Snapshot,
};
use crate::store::StateStore;

pub struct CompleteOutcome {
    pub host_id: String,
    pub success: bool,
    pub duration_ms: u64,
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

pub struct ReportOutcome {
    pub host_id: String,
    pub status: AssignmentStatus,
    pub endpoint: Option<String>,
    pub error: Option<String>,
}

pub struct MergeOutcome {
    pub changed: bool,
}

struct Inner {
    hosts: BTreeMap<String, Host>,
    jobs: BTreeMap<String, Job>,
    services: BTreeMap<String, Service>,
    next_version: u64,
}

impl Inner {
    fn empty() -> Self {
        Inner {
            hosts: BTreeMap::new(),
            jobs: BTreeMap::new(),
            services: BTreeMap::new(),
            next_version: 1,
        }
    }

    fn next_version(&mut self) -> u64 {
        let v = self.next_version;
        self.next_version += 1;
        v
    }

    fn adopt_version(&mut self, version: u64) {
        if version + 1 > self.next_version {
            self.next_version = version + 1;
        }
    }

    fn snapshot(&self, node_id: &str) -> Snapshot {
        let mut hosts: Vec<Host> = self.hosts.values().cloned().collect();
        hosts.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        let mut jobs: Vec<Job> = self.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let mut services: Vec<Service> = self.services.values().cloned().collect();
        services.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Snapshot {
            node_id: node_id.to_string(),
            hosts,
            jobs,
            services,
        }
    }

    fn load(&mut self, snapshot: Snapshot) {
        self.hosts = snapshot
            .hosts
            .into_iter()
            .map(|h| (h.id.clone(), h))
            .collect();
        self.jobs = snapshot
            .jobs
            .into_iter()
            .map(|j| (j.id.clone(), j))
            .collect();
        self.services = snapshot
            .services
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        let max_version = self
            .hosts
            .values()
            .map(|h| h.version)
            .chain(self.jobs.values().map(|j| j.version))
            .chain(self.services.values().map(|s| s.version))
            .max()
            .unwrap_or(0);
        self.next_version = max_version + 1;
    }
}

/// The authoritative in-memory map of hosts/jobs/services, mirrored to a
/// durable store on every mutation.
pub struct CoordinatorState {
    node_id: String,
    lease: Duration,
    store: Arc<dyn StateStore>,
    inner: Mutex<Inner>,
}

impl CoordinatorState {
    /// Build state from whatever the durable store has persisted, per
    /// spec.md §1 "durable queue state" / §3 Versioning on restart.
    pub fn new(
        node_id: impl Into<String>,
        store: Arc<dyn StateStore>,
        lease_ms: i64,
    ) -> Result<Self, CoordinatorError> {
        let node_id = node_id.into();
        let mut inner = Inner::empty();
        let snapshot = store
            .load_snapshot(&node_id)
            .map_err(|e| CoordinatorError::Internal(e.to_string()))?;
        let recovered = snapshot.hosts.len() + snapshot.jobs.len() + snapshot.services.len();
        inner.load(snapshot);
        if recovered > 0 {
            info!(recovered, node_id = %node_id, "recovered durable state on startup");
        }
        Ok(CoordinatorState {
            node_id,
            lease: Duration::milliseconds(lease_ms),
            store,
            inner: Mutex::new(inner),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    fn persist_host(&self, host: &Host) -> Result<(), CoordinatorError> {
        self.store
            .put_host(host)
            .map_err(|e| CoordinatorError::Internal(e.to_string()))
    }

    fn persist_job(&self, job: &Job) -> Result<(), CoordinatorError> {
        self.store
            .put_job(job)
            .map_err(|e| CoordinatorError::Internal(e.to_string()))
    }

    fn persist_service(&self, service: &Service) -> Result<(), CoordinatorError> {
        self.store
            .put_service(service)
            .map_err(|e| CoordinatorError::Internal(e.to_string()))
    }

    pub fn register_host(
        &self,
        host_id: Option<String>,
        name: String,
        capabilities: Vec<String>,
        max_parallel: u32,
    ) -> Result<Host, CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let id = host_id.unwrap_or_else(|| format!("host_{}", Uuid::new_v4()));
        let capabilities = normalize_capabilities(capabilities);
        let max_parallel = max_parallel.max(1);
        let version = inner.next_version();

        let host = if let Some(existing) = inner.hosts.get(&id) {
            Host {
                id: id.clone(),
                name,
                registered_at: existing.registered_at,
                capabilities,
                max_parallel,
                active_leases: existing.active_leases,
                last_seen_at: now,
                version,
                updated_by: self.node_id.clone(),
            }
        } else {
            Host {
                id: id.clone(),
                name,
                registered_at: now,
                capabilities,
                max_parallel,
                active_leases: 0,
                last_seen_at: now,
                version,
                updated_by: self.node_id.clone(),
            }
        };
        inner.hosts.insert(id.clone(), host.clone());
        drop(inner);
        self.persist_host(&host)?;
        debug!(host_id = %id, "registered host");
        Ok(host)
    }

    pub fn heartbeat(
        &self,
        host_id: &str,
        active_leases: Option<i64>,
    ) -> Result<Host, CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        let version = inner.next_version();
        let host = inner
            .hosts
            .get_mut(host_id)
            .ok_or_else(|| CoordinatorError::unknown_host(host_id))?;
        host.last_seen_at = Utc::now();
        if let Some(n) = active_leases {
            if n >= 0 {
                host.active_leases = n as u32;
            }
        }
        host.version = version;
        host.updated_by = self.node_id.clone();
        let host = host.clone();
        drop(inner);
        self.persist_host(&host)?;
        Ok(host)
    }

    pub fn enqueue_job(
        &self,
        payload: JobPayload,
        requirement: Option<Requirement>,
        submitted_by: Option<String>,
    ) -> Result<Job, CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let version = inner.next_version();
        let requirement = requirement
            .map(|r| Requirement::normalized(&r.required_capabilities))
            .unwrap_or_default();
        let submitted_by = submitted_by
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let job = Job {
            id: format!("job_{}", Uuid::new_v4()),
            created_at: now,
            status: JobStatus::Queued,
            attempts: 0,
            assigned_host_id: None,
            lease_expires_at: None,
            payload,
            requirement,
            submitted_by,
            result: None,
            error: None,
            version,
            updated_by: self.node_id.clone(),
            updated_at: now,
        };
        inner.jobs.insert(job.id.clone(), job.clone());
        drop(inner);
        self.persist_job(&job)?;
        debug!(job_id = %job.id, "enqueued job");
        Ok(job)
    }

    /// Return expired leases to `queued`. Public because both `claimJob` and
    /// `snapshot()` call it per spec.md §4.1.
    pub fn requeue_expired_leases(&self) -> Result<u64, CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let expired_ids: Vec<String> = inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Leased)
            .filter(|j| j.lease_expires_at.map(|l| l <= now).unwrap_or(false))
            .map(|j| j.id.clone())
            .collect();

        let mut touched_jobs = Vec::new();
        let mut touched_hosts = Vec::new();
        for job_id in &expired_ids {
            let host_id = inner.jobs.get(job_id).and_then(|j| j.assigned_host_id.clone());
            let version = inner.next_version();
            if let Some(job) = inner.jobs.get_mut(job_id) {
                job.status = JobStatus::Queued;
                job.assigned_host_id = None;
                job.lease_expires_at = None;
                job.version = version;
                job.updated_by = self.node_id.clone();
                job.updated_at = now;
                touched_jobs.push(job.clone());
            }
            if let Some(host_id) = host_id {
                let hversion = inner.next_version();
                if let Some(host) = inner.hosts.get_mut(&host_id) {
                    host.active_leases = host.active_leases.saturating_sub(1);
                    host.version = hversion;
                    host.updated_by = self.node_id.clone();
                    touched_hosts.push(host.clone());
                }
            }
        }
        drop(inner);
        for job in &touched_jobs {
            self.persist_job(job)?;
        }
        for host in &touched_hosts {
            self.persist_host(host)?;
        }
        if !expired_ids.is_empty() {
            warn!(count = expired_ids.len(), "requeued expired leases");
        }
        Ok(expired_ids.len() as u64)
    }

    pub fn claim_job(&self, host_id: &str) -> Result<Option<Job>, CoordinatorError> {
        self.requeue_expired_leases()?;
        let mut inner = self.inner.lock().unwrap();
        let host = inner
            .hosts
            .get(host_id)
            .ok_or_else(|| CoordinatorError::unknown_host(host_id))?
            .clone();
        if host.active_leases >= host.max_parallel {
            return Ok(None);
        }

        let chosen_id = inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .filter(|j| {
                capabilities_satisfied(&j.requirement.required_capabilities, &host.capabilities)
            })
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .map(|j| j.id.clone());

        let Some(job_id) = chosen_id else {
            return Ok(None);
        };

        let now = Utc::now();
        let lease_expires_at = now + self.lease;
        let jversion = inner.next_version();
        let job = {
            let job = inner.jobs.get_mut(&job_id).unwrap();
            job.status = JobStatus::Leased;
            job.assigned_host_id = Some(host_id.to_string());
            job.attempts += 1;
            job.lease_expires_at = Some(lease_expires_at);
            job.version = jversion;
            job.updated_by = self.node_id.clone();
            job.updated_at = now;
            job.clone()
        };
        let hversion = inner.next_version();
        let host = {
            let host = inner.hosts.get_mut(host_id).unwrap();
            host.active_leases += 1;
            host.version = hversion;
            host.updated_by = self.node_id.clone();
            host.clone()
        };
        drop(inner);
        self.persist_job(&job)?;
        self.persist_host(&host)?;
        info!(job_id = %job.id, host_id = %host_id, attempts = job.attempts, "claimed job");
        Ok(Some(job))
    }

    pub fn complete_job(
        &self,
        job_id: &str,
        outcome: CompleteOutcome,
    ) -> Result<Job, CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.hosts.contains_key(&outcome.host_id) {
            return Err(CoordinatorError::unknown_host(&outcome.host_id));
        }
        let job = inner
            .jobs
            .get(job_id)
            .ok_or_else(|| CoordinatorError::unknown_job(job_id))?;
        if job.status != JobStatus::Leased {
            return Err(CoordinatorError::Internal(format!(
                "job {job_id} is not leased"
            )));
        }
        if job.assigned_host_id.as_deref() != Some(outcome.host_id.as_str()) {
            return Err(CoordinatorError::Internal(format!(
                "job {job_id} is assigned to a different host"
            )));
        }

        let now = Utc::now();
        let jversion = inner.next_version();
        let job = {
            let job = inner.jobs.get_mut(job_id).unwrap();
            job.status = if outcome.success {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            };
            job.lease_expires_at = None;
            if outcome.success {
                job.result = Some(JobResult {
                    finished_at: now,
                    duration_ms: outcome.duration_ms,
                    exit_code: outcome.exit_code,
                    stdout: outcome.stdout,
                    stderr: outcome.stderr,
                });
                job.error = None;
            } else {
                job.error = Some(outcome.error.unwrap_or_else(|| "job failed".to_string()));
            }
            job.version = jversion;
            job.updated_by = self.node_id.clone();
            job.updated_at = now;
            job.clone()
        };
        let hversion = inner.next_version();
        let host = {
            let host = inner.hosts.get_mut(&outcome.host_id).unwrap();
            host.active_leases = host.active_leases.saturating_sub(1);
            host.version = hversion;
            host.updated_by = self.node_id.clone();
            host.clone()
        };
        drop(inner);
        self.persist_job(&job)?;
        self.persist_host(&host)?;
        info!(job_id = %job.id, success = outcome.success, "completed job");
        Ok(job)
    }

    pub fn deploy_service(
        &self,
        name: String,
        command: String,
        args: Vec<String>,
        cwd: Option<String>,
        env: Map<String, serde_json::Value>,
        replicas: Option<u32>,
        required_capabilities: Option<Vec<String>>,
    ) -> Result<Service, CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let version = inner.next_version();
        let required_capabilities = required_capabilities
            .map(|c| normalize_capabilities(c))
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| vec!["service-host".to_string()]);
        let service = Service {
            id: format!("svc_{}", Uuid::new_v4()),
            name,
            command,
            args,
            cwd,
            env,
            replicas: replicas.unwrap_or(1).max(1),
            required_capabilities,
            status: ServiceStatus::Pending,
            created_at: now,
            updated_at: now,
            assignments: Vec::new(),
            version,
            updated_by: self.node_id.clone(),
        };
        inner.services.insert(service.id.clone(), service.clone());
        drop(inner);
        self.persist_service(&service)?;
        Ok(service)
    }

    pub fn get_job(&self, id: &str) -> Option<Job> {
        let inner = self.inner.lock().unwrap();
        inner.jobs.get(id).cloned()
    }

    pub fn list_services(&self) -> Vec<Service> {
        let inner = self.inner.lock().unwrap();
        let mut services: Vec<Service> = inner.services.values().cloned().collect();
        services.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        services
    }

    pub fn get_service(&self, id: &str) -> Option<Service> {
        let inner = self.inner.lock().unwrap();
        inner.services.get(id).cloned()
    }

    pub fn claim_service(&self, host_id: &str) -> Result<Option<Service>, CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        let host = inner
            .hosts
            .get(host_id)
            .ok_or_else(|| CoordinatorError::unknown_host(host_id))?
            .clone();

        let mut ordered_ids: Vec<String> = inner.services.keys().cloned().collect();
        ordered_ids.sort_by_key(|id| inner.services[id].created_at);

        for service_id in ordered_ids {
            let eligible = {
                let service = &inner.services[&service_id];
                capabilities_satisfied(&service.required_capabilities, &host.capabilities)
            };
            if !eligible {
                continue;
            }
            let existing_status = inner.services[&service_id]
                .assignments
                .iter()
                .find(|a| a.host_id == host_id)
                .map(|a| a.status.clone());
            match existing_status {
                Some(AssignmentStatus::Failed) => continue,
                Some(_) => {
                    let service = inner.services[&service_id].clone();
                    return Ok(Some(service));
                }
                None => {}
            }
            let has_capacity = inner.services[&service_id].assignments.len()
                < inner.services[&service_id].replicas as usize;
            if !has_capacity {
                continue;
            }
            let now = Utc::now();
            let version = inner.next_version();
            let service = {
                let service = inner.services.get_mut(&service_id).unwrap();
                service.assignments.push(ServiceAssignment {
                    host_id: host_id.to_string(),
                    status: AssignmentStatus::Pending,
                    endpoint: None,
                    error: None,
                    started_at: None,
                    updated_at: now,
                });
                service.recompute_status();
                service.updated_at = now;
                service.version = version;
                service.updated_by = self.node_id.clone();
                service.clone()
            };
            drop(inner);
            self.persist_service(&service)?;
            return Ok(Some(service));
        }
        Ok(None)
    }

    pub fn report_service(
        &self,
        id: &str,
        outcome: ReportOutcome,
    ) -> Result<Service, CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let version = inner.next_version();
        let service = inner
            .services
            .get_mut(id)
            .ok_or_else(|| CoordinatorError::NotFound(format!("unknown service: {id}")))?;
        let assignment = service
            .assignments
            .iter_mut()
            .find(|a| a.host_id == outcome.host_id)
            .ok_or_else(|| {
                CoordinatorError::Internal(format!(
                    "host {} has no assignment on service {id}",
                    outcome.host_id
                ))
            })?;
        let entering_running =
            outcome.status == AssignmentStatus::Running && assignment.status != AssignmentStatus::Running;
        assignment.status = outcome.status;
        assignment.endpoint = outcome.endpoint.map(|e| normalize_endpoint(&e));
        assignment.error = outcome.error;
        assignment.updated_at = now;
        if entering_running && assignment.started_at.is_none() {
            assignment.started_at = Some(now);
        }
        service.recompute_status();
        service.updated_at = now;
        service.version = version;
        service.updated_by = self.node_id.clone();
        let service = service.clone();
        drop(inner);
        self.persist_service(&service)?;
        Ok(service)
    }

    pub fn snapshot(&self) -> Result<Snapshot, CoordinatorError> {
        self.requeue_expired_leases()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.snapshot(&self.node_id))
    }

    /// A snapshot without requeuing expired leases, used as the pre-image
    /// for quorum rollback (spec.md §4.1).
    pub fn checkpoint(&self) -> Snapshot {
        let inner = self.inner.lock().unwrap();
        inner.snapshot(&self.node_id)
    }

    pub fn restore(&self, snapshot: Snapshot) -> Result<(), CoordinatorError> {
        self.store
            .replace_all(&snapshot)
            .map_err(|e| CoordinatorError::Internal(e.to_string()))?;
        let mut inner = self.inner.lock().unwrap();
        inner.load(snapshot);
        Ok(())
    }

    pub fn merge_snapshot(&self, incoming: Snapshot) -> Result<MergeOutcome, CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        let mut changed = false;
        let mut adopted_hosts = Vec::new();
        let mut adopted_jobs = Vec::new();
        let mut adopted_services = Vec::new();

        for host in incoming.hosts {
            let adopt = match inner.hosts.get(&host.id) {
                None => true,
                Some(local) => should_adopt(
                    local.version,
                    &local.last_seen_at.to_rfc3339(),
                    &local.updated_by,
                    host.version,
                    &host.last_seen_at.to_rfc3339(),
                    &host.updated_by,
                ),
            };
            if adopt {
                inner.adopt_version(host.version);
                inner.hosts.insert(host.id.clone(), host.clone());
                adopted_hosts.push(host);
                changed = true;
            }
        }
        for job in incoming.jobs {
            let adopt = match inner.jobs.get(&job.id) {
                None => true,
                Some(local) => should_adopt(
                    local.version,
                    &local.updated_at.to_rfc3339(),
                    &local.updated_by,
                    job.version,
                    &job.updated_at.to_rfc3339(),
                    &job.updated_by,
                ),
            };
            if adopt {
                inner.adopt_version(job.version);
                inner.jobs.insert(job.id.clone(), job.clone());
                adopted_jobs.push(job);
                changed = true;
            }
        }
        for service in incoming.services {
            let adopt = match inner.services.get(&service.id) {
                None => true,
                Some(local) => should_adopt(
                    local.version,
                    &local.updated_at.to_rfc3339(),
                    &local.updated_by,
                    service.version,
                    &service.updated_at.to_rfc3339(),
                    &service.updated_by,
                ),
            };
            if adopt {
                inner.adopt_version(service.version);
                inner.services.insert(service.id.clone(), service.clone());
                adopted_services.push(service);
                changed = true;
            }
        }
        drop(inner);
        for host in &adopted_hosts {
            self.persist_host(host)?;
        }
        for job in &adopted_jobs {
            self.persist_job(job)?;
        }
        for service in &adopted_services {
            self.persist_service(service)?;
        }
        Ok(MergeOutcome { changed })
    }
}
