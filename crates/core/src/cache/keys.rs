//! Deterministic cache keys for filtered queries.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compute the cache key for a query with the given filter object.
///
/// Object keys are sorted before hashing so two filter objects with the same
/// fields in a different order share a key. `null` and `{}` hash identically.
pub fn query_key(prefix: &str, filters: &Value) -> String {
    let mut canonical = String::new();
    match filters {
        Value::Null => write_canonical(&Value::Object(Default::default()), &mut canonical),
        other => write_canonical(other, &mut canonical),
    }

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{prefix}_{}", hex::encode(hasher.finalize()))
}

/// Stable stringification: objects with sorted keys, everything else as serde_json prints it.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
