//! Environment-variable configuration loading (spec.md §6, `SPEC_FULL.md`
//! "Configuration loading"), modeled on `fourthplaces-mntogether`'s
//! `Config::from_env` (dotenvy + `env::var` + `anyhow::Context`).

use std::env;
use std::fs;

use anyhow::{Context, Result};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyConfig {
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub allowed_capabilities: Vec<String>,
    #[serde(default)]
    pub allow_shell: bool,
}

impl ApiKeyConfig {
    pub fn allowed_capabilities_or_default(&self) -> Vec<String> {
        if self.allowed_capabilities.is_empty() {
            vec!["openclaw".to_string()]
        } else {
            self.allowed_capabilities.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub auth_token: Option<String>,
    pub lease_ms: i64,
    pub db_path: String,
    pub node_id: String,
    pub public_url: Option<String>,
    pub peer_urls: Vec<String>,
    pub peer_sync_interval_ms: u64,
    pub min_replicas: u32,
    pub idempotency_ttl_ms: i64,
    pub peer_discovery_enabled: bool,
    pub public_cors_origin: String,
    pub api_keys: Vec<ApiKeyConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let api_keys = match env::var("SKYCLAW_API_KEYS_PATH").ok() {
            Some(path) => {
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read SKYCLAW_API_KEYS_PATH at {path}"))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("invalid JSON in API keys file at {path}"))?
            }
            None => Vec::new(),
        };

        Ok(Config {
            port: env::var("SKYCLAW_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("SKYCLAW_PORT must be a valid port number")?,
            host: env::var("SKYCLAW_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            auth_token: env::var("SKYCLAW_AUTH_TOKEN").ok(),
            lease_ms: env::var("SKYCLAW_LEASE_MS")
                .unwrap_or_else(|_| "60000".to_string())
                .parse()
                .context("SKYCLAW_LEASE_MS must be an integer")?,
            db_path: env::var("SKYCLAW_DB_PATH").unwrap_or_else(|_| "skyclaw.db".to_string()),
            node_id: env::var("SKYCLAW_NODE_ID")
                .unwrap_or_else(|_| format!("node_{}", Uuid::new_v4())),
            public_url: env::var("SKYCLAW_PUBLIC_URL").ok(),
            peer_urls: env::var("SKYCLAW_PEER_URLS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            peer_sync_interval_ms: env::var("SKYCLAW_PEER_SYNC_INTERVAL_MS")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("SKYCLAW_PEER_SYNC_INTERVAL_MS must be an integer")?,
            min_replicas: env::var("SKYCLAW_MIN_REPLICAS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("SKYCLAW_MIN_REPLICAS must be an integer")?,
            idempotency_ttl_ms: env::var("SKYCLAW_IDEMPOTENCY_TTL_MS")
                .unwrap_or_else(|_| "86400000".to_string())
                .parse()
                .context("SKYCLAW_IDEMPOTENCY_TTL_MS must be an integer")?,
            peer_discovery_enabled: env::var("SKYCLAW_PEER_DISCOVERY_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            public_cors_origin: env::var("SKYCLAW_PUBLIC_CORS_ORIGIN")
                .unwrap_or_else(|_| "*".to_string()),
            api_keys,
        })
    }
}
