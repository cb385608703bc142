use serde_json::{Number, Value};
use sha2::{Digest, Sha256};

/// Hash a payload so structurally equal JSON hashes equally regardless of
/// the key order the caller built it with.
pub fn payload_hash(payload: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(payload, &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    to_hex_lower(&hasher.finalize())
}

/// Serialize with object keys sorted at every depth.
pub(crate) fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
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
        Value::Number(n) => out.push_str(&canonical_number(n)),
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Largest magnitude below which every integral f64 is exact (2^53)
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// `1` and `1.0` are the same number; integral floats are written as integers.
fn canonical_number(n: &Number) -> String {
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            if f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER {
                return (f as i64).to_string();
            }
        }
    }
    n.to_string()
}

fn to_hex_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":{"b":2,"a":[1,{"q":1,"p":2}]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y":{"a":[1,{"p":2,"q":1}],"b":2},"x":1}"#).unwrap();
        assert_eq!(payload_hash(&a), payload_hash(&b));
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(payload_hash(&json!([1, 2])), payload_hash(&json!([2, 1])));
    }

    #[test]
    fn test_different_values_differ() {
        assert_ne!(payload_hash(&json!({"x": 1})), payload_hash(&json!({"x": 2})));
        assert_ne!(payload_hash(&json!({"x": "1"})), payload_hash(&json!({"x": 1})));
    }

    #[test]
    fn test_integral_floats_match_integers() {
        let int: Value = serde_json::from_str(r#"{"dest":{"tx":1,"ty":-3}}"#).unwrap();
        let float: Value = serde_json::from_str(r#"{"dest":{"tx":1.0,"ty":-3.0}}"#).unwrap();
        assert_eq!(payload_hash(&int), payload_hash(&float));
        assert_eq!(payload_hash(&json!(0)), payload_hash(&json!(-0.0)));

        assert_ne!(payload_hash(&json!({"x": 1})), payload_hash(&json!({"x": 1.5})));
        assert_ne!(payload_hash(&json!(1e300)), payload_hash(&json!(1)));
    }

    #[test]
    fn test_canonical_form() {
        let mut out = String::new();
        write_canonical(&json!({"b": [true, null], "a": "q\"uote"}), &mut out);
        assert_eq!(out, r#"{"a":"q\"uote","b":[true,null]}"#);
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = payload_hash(&json!({}));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
