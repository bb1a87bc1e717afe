//! The single canonical-JSON serializer used everywhere a hash is taken
//! over structured data: commit hashes (§4.5), author hashes (§4.2),
//! event payload hashes (§3 `EventEnvelope`), and consumer state commits
//! (§3 `ConsumerState`). Design note §9 calls out that exactly one
//! canonicalizer must be used throughout — this is it.
//!
//! Canonicalization is RFC 8785-compatible in spirit: object keys are
//! sorted recursively and the result contains no insignificant
//! whitespace. We do not implement the full RFC (e.g. its number
//! formatting rules) since all OMS hash inputs are application data
//! produced by `serde_json`, not arbitrary JSON from the wire.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Serialize `value` to a canonical JSON string: object keys sorted
/// recursively, arrays left in place (order is semantically meaningful
/// there), no extraneous whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let raw = serde_json::to_value(value)?;
    Ok(sort_value(raw).to_string())
}

fn sort_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_value(v))).collect();
            let mut out = serde_json::Map::with_capacity(sorted.len());
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_value).collect()),
        other => other,
    }
}

/// Full hex-encoded SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

/// `new_commit = sha256(canonical_json(doc))[0:12]` (§4.5). Truncated to
/// 12 hex characters, matching the original's
/// `core/concurrency/optimistic_lock.py::_calculate_commit_hash`.
pub fn commit_hash<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let canonical = canonical_json(value)?;
    let full = sha256_hex(canonical.as_bytes());
    Ok(full[..12].to_string())
}
