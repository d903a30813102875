//! `rusqlite`-backed [`StateStore`] with crash recovery on open.
//!
//! One `execute`/`query` per method, no query builder — matching the SQL
//! style of the teacher crate's Postgres job store. WAL + `synchronous =
//! NORMAL` are the recommended durability pragmas for spec.md §6.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use skyclaw_core::{Host, IdempotencyRecord, Job, Service, Snapshot, StateStore, StoreError};
use skyclaw_persistence::{from_json_text, to_json_text};
use tracing::info;

fn io_err(e: rusqlite::Error) -> StoreError {
    StoreError::Io(e.to_string())
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if absent) the database at `path`, run schema
    /// migration, and apply WAL/normal-synchronous pragmas.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(io_err)?;
        Self::init(conn, path)
    }

    /// In-memory database, useful for tests that want real SQL semantics
    /// without touching disk.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(io_err)?;
        Self::init(conn, ":memory:")
    }

    fn init(conn: Connection, label: &str) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(io_err)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(io_err)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS hosts (
                id TEXT PRIMARY KEY,
                json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs (created_at);
            CREATE TABLE IF NOT EXISTS services (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS idempotency (
                route TEXT NOT NULL,
                key TEXT NOT NULL,
                request_hash TEXT NOT NULL,
                status_code INTEGER NOT NULL,
                response_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                PRIMARY KEY (route, key)
            );
            CREATE INDEX IF NOT EXISTS idx_idempotency_expires_at ON idempotency (expires_at);",
        )
        .map_err(io_err)?;
        info!(db = %label, "opened durable store");
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }
}

impl StateStore for SqliteStore {
    fn put_host(&self, host: &Host) -> Result<(), StoreError> {
        let json = to_json_text(host)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO hosts (id, json) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET json = excluded.json",
            params![host.id, json],
        )
        .map_err(io_err)?;
        Ok(())
    }

    fn put_job(&self, job: &Job) -> Result<(), StoreError> {
        let json = to_json_text(job)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO jobs (id, created_at, json) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET json = excluded.json",
            params![job.id, job.created_at.to_rfc3339(), json],
        )
        .map_err(io_err)?;
        Ok(())
    }

    fn put_service(&self, service: &Service) -> Result<(), StoreError> {
        let json = to_json_text(service)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO services (id, created_at, json) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET json = excluded.json",
            params![service.id, service.created_at.to_rfc3339(), json],
        )
        .map_err(io_err)?;
        Ok(())
    }

    fn replace_all(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(io_err)?;
        tx.execute("DELETE FROM hosts", []).map_err(io_err)?;
        tx.execute("DELETE FROM jobs", []).map_err(io_err)?;
        tx.execute("DELETE FROM services", []).map_err(io_err)?;
        for host in &snapshot.hosts {
            let json = to_json_text(host)?;
            tx.execute(
                "INSERT INTO hosts (id, json) VALUES (?1, ?2)",
                params![host.id, json],
            )
            .map_err(io_err)?;
        }
        for job in &snapshot.jobs {
            let json = to_json_text(job)?;
            tx.execute(
                "INSERT INTO jobs (id, created_at, json) VALUES (?1, ?2, ?3)",
                params![job.id, job.created_at.to_rfc3339(), json],
            )
            .map_err(io_err)?;
        }
        for service in &snapshot.services {
            let json = to_json_text(service)?;
            tx.execute(
                "INSERT INTO services (id, created_at, json) VALUES (?1, ?2, ?3)",
                params![service.id, service.created_at.to_rfc3339(), json],
            )
            .map_err(io_err)?;
        }
        tx.commit().map_err(io_err)?;
        Ok(())
    }

    fn load_snapshot(&self, node_id: &str) -> Result<Snapshot, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut hosts = Vec::new();
        {
            let mut stmt = conn.prepare("SELECT json FROM hosts").map_err(io_err)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(io_err)?;
            for row in rows {
                let json = row.map_err(io_err)?;
                hosts.push(from_json_text::<Host>(&json)?);
            }
        }
        let mut jobs = Vec::new();
        {
            let mut stmt = conn
                .prepare("SELECT json FROM jobs ORDER BY created_at")
                .map_err(io_err)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(io_err)?;
            for row in rows {
                let json = row.map_err(io_err)?;
                jobs.push(from_json_text::<Job>(&json)?);
            }
        }
        let mut services = Vec::new();
        {
            let mut stmt = conn
                .prepare("SELECT json FROM services ORDER BY created_at")
                .map_err(io_err)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(io_err)?;
            for row in rows {
                let json = row.map_err(io_err)?;
                services.push(from_json_text::<Service>(&json)?);
            }
        }
        Ok(Snapshot {
            node_id: node_id.to_string(),
            hosts,
            jobs,
            services,
        })
    }

    fn put_idempotency(&self, record: &IdempotencyRecord) -> Result<(), StoreError> {
        let response_json = serde_json::to_string(&record.response_json)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO idempotency
                (route, key, request_hash, status_code, response_json, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(route, key) DO UPDATE SET
                request_hash = excluded.request_hash,
                status_code = excluded.status_code,
                response_json = excluded.response_json,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at",
            params![
                record.route,
                record.key,
                record.request_hash,
                record.status_code,
                response_json,
                record.created_at.to_rfc3339(),
                record.expires_at.to_rfc3339(),
            ],
        )
        .map_err(io_err)?;
        Ok(())
    }

    fn get_idempotency(
        &self,
        route: &str,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT route, key, request_hash, status_code, response_json, created_at, expires_at
                 FROM idempotency WHERE route = ?1 AND key = ?2",
                params![route, key],
                |row| {
                    let response_text: String = row.get(4)?;
                    let created_at: String = row.get(5)?;
                    let expires_at: String = row.get(6)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u16>(3)?,
                        response_text,
                        created_at,
                        expires_at,
                    ))
                },
            )
            .optional()
            .map_err(io_err)?;

        let Some((route, key, request_hash, status_code, response_text, created_at, expires_at)) =
            row
        else {
            return Ok(None);
        };
        let response_json = serde_json::from_str(&response_text)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let created_at = parse_rfc3339(&created_at)?;
        let expires_at = parse_rfc3339(&expires_at)?;
        Ok(Some(IdempotencyRecord {
            route,
            key,
            request_hash,
            status_code,
            response_json,
            created_at,
            expires_at,
        }))
    }

    fn gc_idempotency(&self, now_rfc3339: &str) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute(
                "DELETE FROM idempotency WHERE expires_at <= ?1",
                params![now_rfc3339],
            )
            .map_err(io_err)?;
        Ok(deleted as u64)
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyclaw_core::{JobPayload, JobStatus, Requirement};

    fn sample_host() -> Host {
        Host {
            id: "host_1".to_string(),
            name: "a".to_string(),
            registered_at: Utc::now(),
            capabilities: vec!["shell".to_string()],
            max_parallel: 2,
            active_leases: 0,
            last_seen_at: Utc::now(),
            version: 1,
            updated_by: "node-a".to_string(),
        }
    }

    fn sample_job() -> Job {
        Job {
            id: "job_1".to_string(),
            created_at: Utc::now(),
            status: JobStatus::Queued,
            attempts: 0,
            assigned_host_id: None,
            lease_expires_at: None,
            payload: JobPayload::Shell {
                command: "echo".to_string(),
                args: vec![],
                cwd: None,
                env: Default::default(),
                timeout_ms: None,
            },
            requirement: Requirement::default(),
            submitted_by: None,
            result: None,
            error: None,
            version: 2,
            updated_by: "node-a".to_string(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn round_trips_host_and_job_through_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let path_str = path.to_str().unwrap().to_string();

        {
            let store = SqliteStore::open(&path_str).unwrap();
            store.put_host(&sample_host()).unwrap();
            store.put_job(&sample_job()).unwrap();
        }

        let store = SqliteStore::open(&path_str).unwrap();
        let snapshot = store.load_snapshot("node-a").unwrap();
        assert_eq!(snapshot.hosts.len(), 1);
        assert_eq!(snapshot.jobs.len(), 1);
        assert_eq!(snapshot.hosts[0].id, "host_1");
    }

    #[test]
    fn replace_all_clears_prior_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put_host(&sample_host()).unwrap();
        store
            .replace_all(&Snapshot {
                node_id: "node-a".to_string(),
                hosts: vec![],
                jobs: vec![],
                services: vec![],
            })
            .unwrap();
        let snapshot = store.load_snapshot("node-a").unwrap();
        assert!(snapshot.hosts.is_empty());
    }

    #[test]
    fn s5_idempotent_persistence_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idem.db");
        let path_str = path.to_str().unwrap().to_string();
        let record = IdempotencyRecord {
            route: "/v1/jobs".to_string(),
            key: "req-123".to_string(),
            request_hash: "hash-abc".to_string(),
            status_code: 200,
            response_json: serde_json::json!({"job": {"id": "j1"}}),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::milliseconds(60_000),
        };

        {
            let store = SqliteStore::open(&path_str).unwrap();
            store.put_idempotency(&record).unwrap();
        }

        let store = SqliteStore::open(&path_str).unwrap();
        let loaded = store
            .get_idempotency("/v1/jobs", "req-123")
            .unwrap()
            .unwrap();
        assert_eq!(loaded.request_hash, "hash-abc");
        assert_eq!(loaded.status_code, 200);
        assert_eq!(loaded.response_json, record.response_json);
    }

    #[test]
    fn gc_idempotency_deletes_expired_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        let past = Utc::now() - chrono::Duration::seconds(10);
        store
            .put_idempotency(&IdempotencyRecord {
                route: "/v1/jobs".to_string(),
                key: "old".to_string(),
                request_hash: "h".to_string(),
                status_code: 200,
                response_json: serde_json::json!({}),
                created_at: past,
                expires_at: past,
            })
            .unwrap();
        let deleted = store.gc_idempotency(&Utc::now().to_rfc3339()).unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_idempotency("/v1/jobs", "old").unwrap().is_none());
    }
}
