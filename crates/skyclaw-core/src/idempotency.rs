//! Canonical-JSON hashing for the idempotency ledger (spec.md §4.3).

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Recursively sort object keys so semantically identical JSON bodies hash
/// the same regardless of field order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(&String, &Value)> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), canonicalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// `sha256(route + "\n" + canonical_json(body))`, hex-encoded.
pub fn request_hash(route: &str, body: &Value) -> String {
    let canonical = canonicalize(body);
    let serialized = serde_json::to_string(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(route.as_bytes());
    hasher.update(b"\n");
    hasher.update(serialized.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalize_sorts_nested_keys() {
        let a = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let b = json!({"a": {"c": 3, "d": 2}, "b": 1});
        assert_eq!(canonicalize(&a), canonicalize(&b));
    }

    #[test]
    fn request_hash_stable_under_key_reorder() {
        let a = json!({"command": "echo", "args": ["hi"]});
        let b = json!({"args": ["hi"], "command": "echo"});
        assert_eq!(request_hash("/v1/jobs", &a), request_hash("/v1/jobs", &b));
    }

    #[test]
    fn request_hash_differs_by_route() {
        let body = json!({"x": 1});
        assert_ne!(
            request_hash("/v1/jobs", &body),
            request_hash("/v1/services", &body)
        );
    }
}
