//! A `StateStore` backed by plain `Mutex<HashMap<..>>`, for tests that don't
//! need real persistence semantics.

use std::collections::HashMap;
use std::sync::Mutex;

use skyclaw_core::{Host, IdempotencyRecord, Job, Service, Snapshot, StateStore, StoreError};

#[derive(Default)]
pub struct InMemoryStore {
    hosts: Mutex<HashMap<String, Host>>,
    jobs: Mutex<HashMap<String, Job>>,
    services: Mutex<HashMap<String, Service>>,
    idempotency: Mutex<HashMap<(String, String), IdempotencyRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStore {
    fn put_host(&self, host: &Host) -> Result<(), StoreError> {
        self.hosts.lock().unwrap().insert(host.id.clone(), host.clone());
        Ok(())
    }

    fn put_job(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.lock().unwrap().insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn put_service(&self, service: &Service) -> Result<(), StoreError> {
        self.services
            .lock()
            .unwrap()
            .insert(service.id.clone(), service.clone());
        Ok(())
    }

    fn replace_all(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        *self.hosts.lock().unwrap() = snapshot
            .hosts
            .iter()
            .map(|h| (h.id.clone(), h.clone()))
            .collect();
        *self.jobs.lock().unwrap() = snapshot
            .jobs
            .iter()
            .map(|j| (j.id.clone(), j.clone()))
            .collect();
        *self.services.lock().unwrap() = snapshot
            .services
            .iter()
            .map(|s| (s.id.clone(), s.clone()))
            .collect();
        Ok(())
    }

    fn load_snapshot(&self, node_id: &str) -> Result<Snapshot, StoreError> {
        Ok(Snapshot {
            node_id: node_id.to_string(),
            hosts: self.hosts.lock().unwrap().values().cloned().collect(),
            jobs: self.jobs.lock().unwrap().values().cloned().collect(),
            services: self.services.lock().unwrap().values().cloned().collect(),
        })
    }

    fn put_idempotency(&self, record: &IdempotencyRecord) -> Result<(), StoreError> {
        self.idempotency
            .lock()
            .unwrap()
            .insert((record.route.clone(), record.key.clone()), record.clone());
        Ok(())
    }

    fn get_idempotency(
        &self,
        route: &str,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        Ok(self
            .idempotency
            .lock()
            .unwrap()
            .get(&(route.to_string(), key.to_string()))
            .cloned())
    }

    fn gc_idempotency(&self, now_rfc3339: &str) -> Result<u64, StoreError> {
        let mut guard = self.idempotency.lock().unwrap();
        let before = guard.len();
        guard.retain(|_, record| record.expires_at.to_rfc3339().as_str() > now_rfc3339);
        Ok((before - guard.len()) as u64)
    }
}
