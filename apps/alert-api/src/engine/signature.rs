//! Dedup key derivation.
//!
//! Equivalent alerts must map to the same key no matter which producer sent
//! them or in what order their payload fields were serialized.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::AlertRequest;

/// Derive the dedup key for `request`.
///
/// - explicit ID present: `id:<explicit>`
/// - otherwise: `sig:<sha256 hex>` over canonical payload, class, coordinates
///   bucketed to two decimals (~1.1 km), and radius.
pub fn dedup_key(request: &AlertRequest) -> String {
    if let Some(id) = &request.explicit_id {
        return format!("id:{id}");
    }

    let material = format!(
        "{}|{}|{}|{}|{}",
        canonical_json(&request.payload),
        request.class_id.as_deref().unwrap_or(""),
        bucket(request.center.latitude),
        bucket(request.center.longitude),
        request.radius_km,
    );
    let digest = Sha256::digest(material.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("sig:{hex}")
}

/// Compact JSON with object keys sorted at every depth.
///
/// Written out by hand rather than through `serde_json::to_string` so the
/// output does not depend on whether `preserve_order` is enabled anywhere in
/// the dependency graph.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
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

/// Round to two decimals and print exactly two, folding `-0.00` into `0.00`.
fn bucket(degrees: f64) -> String {
    let rounded = (degrees * 100.0).round() / 100.0;
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{rounded:.2}")
}
