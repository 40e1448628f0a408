//! Deterministic fingerprints over serialised records.
//!
//! The contract: a 32-bit hash over the JSON structure with the `checksum` and
//! `timestamp` fields removed at any depth and all object keys sorted recursively.
//! Same inputs produce the same output across compliant implementations, independent
//! of key-insertion order.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Schema version written into every persisted record
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Fields excluded from fingerprinting at every depth
const EXCLUDED_KEYS: [&str; 2] = ["checksum", "timestamp"];

/// Produce the canonical form of a value: excluded keys stripped, object keys sorted.
///
/// `serde_json`'s map is already ordered; the rebuild here makes the sorting explicit
/// so the canonical form survives a `preserve_order` feature unification.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(&String, &Value)> = map
                .iter()
                .filter(|(key, _)| !EXCLUDED_KEYS.contains(&key.as_str()))
                .collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (key, inner) in sorted {
                out.insert(key.clone(), canonicalize(inner));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// The canonical JSON text of a value
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

/// Compute the 32-bit fingerprint of a value, rendered as 8 hex characters.
///
/// The value is canonicalised, hashed with SHA-256, and the first four bytes of the
/// digest become the checksum.
pub fn checksum32(value: &Value) -> String {
    let canonical = canonical_json(value);
    let digest = Sha256::digest(canonical.as_bytes());
    let word = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    format!("{:08x}", word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn checksum_ignores_checksum_and_timestamp_fields() {
        let a = json!({"nodes": {"t1": 1}, "checksum": "deadbeef", "timestamp": "now"});
        let b = json!({"nodes": {"t1": 1}});
        assert_eq!(checksum32(&a), checksum32(&b));
    }

    #[test]
    fn checksum_is_order_independent() {
        let a = json!({"b": 1, "a": {"y": 2, "x": 3}});
        let b = json!({"a": {"x": 3, "y": 2}, "b": 1});
        assert_eq!(checksum32(&a), checksum32(&b));
    }

    #[test]
    fn checksum_sees_nested_changes() {
        let a = json!({"edges": {"a->b": {"weight": 1.0}}});
        let b = json!({"edges": {"a->b": {"weight": 2.0}}});
        assert_ne!(checksum32(&a), checksum32(&b));
    }

    #[test]
    fn excluded_keys_are_stripped_at_depth() {
        let a = json!({"meta": {"timestamp": "x", "count": 2}});
        let b = json!({"meta": {"count": 2}});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }
}
