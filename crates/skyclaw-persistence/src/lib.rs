//! Persistence-layer glue shared by every `StateStore` backend: error
//! conversion into `CoordinatorError` and idempotency-record JSON helpers.
//!
//! The `StateStore` trait itself lives in `skyclaw-core` (it's a method on
//! `CoordinatorState`'s seam, so the core crate owns it to avoid a
//! dependency cycle); this crate re-exports it so backend crates have one
//! place to import the persistence contract from.

pub use skyclaw_core::{StateStore, StoreError};

/// Serialize a value to the canonical JSON text persisted in a backend's
/// `json TEXT` columns (spec.md §9 "preserve unknown fields").
pub fn to_json_text<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub fn from_json_text<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, StoreError> {
    serde_json::from_str(text).map_err(|e| StoreError::Serialization(e.to_string()))
}
