//! Canonicalization of manifest JSON for HMAC signing/verification.
//!
//! Host and device share this function so they provably agree
//! bytewise: signature field removed, object keys sorted at every
//! nesting level, no insignificant whitespace.  We build our own sorted
//! `BTreeMap` rather than leaning on `serde_json`'s `preserve_order`
//! feature, so this is correct regardless of how that feature is (or
//! isn't) enabled elsewhere in the crate for manifest parsing.
use std::collections::BTreeMap;

use serde_json::Value;


/// Re-serialize `doc` with `signature_field` removed from the top-level
/// object and all object keys sorted recursively, producing the exact
/// bytes that get HMAC'd.
///
/// Returns `None` if `doc` isn't a JSON object (a malformed manifest --
/// callers should treat that as a parse failure, not attempt to sign or
/// verify it).
pub fn canonical_bytes(doc: &Value, signature_field: &str) -> Option<Vec<u8>>
{
	let obj = doc.as_object()?;

	let mut stripped = serde_json::Map::new();
	for (k, v) in obj
	{
		if k == signature_field { continue; }
		stripped.insert(k.clone(), v.clone());
	}

	let sorted = sort_value(Value::Object(stripped));
	Some(serde_json::to_vec(&sorted).expect("Value always serializes"))
}


/// Recursively re-sort every object in a `Value` tree into key order.
fn sort_value(v: Value) -> Value
{
	match v {
		Value::Object(map) => {
			let sorted: BTreeMap<String, Value> = map.into_iter()
					.map(|(k, v)| (k, sort_value(v)))
					.collect();
			let mut out = serde_json::Map::with_capacity(sorted.len());
			for (k, v) in sorted { out.insert(k, v); }
			Value::Object(out)
		}
		Value::Array(items) => Value::Array(items.into_iter().map(sort_value).collect()),
		other => other,
	}
}


#[cfg(test)]
mod tests
{
	use super::*;
	use serde_json::json;

	#[test]
	fn strips_signature_field()
	{
		let doc = json!({"version": "1", "files": {}, "signature": "deadbeef"});
		let got = canonical_bytes(&doc, "signature").unwrap();
		let s = String::from_utf8(got).unwrap();
		assert!(!s.contains("deadbeef"));
		assert!(!s.contains("signature"));
	}

	#[test]
	fn sorts_keys_regardless_of_input_order()
	{
		let a = json!({"b": 1, "a": 2, "signature": "x"});
		let b = json!({"a": 2, "b": 1, "signature": "y"});
		assert_eq!(canonical_bytes(&a, "signature"), canonical_bytes(&b, "signature"));
	}

	#[test]
	fn respects_configured_field_name()
	{
		let doc = json!({"version": "1", "sig": "deadbeef"});
		let got = canonical_bytes(&doc, "sig").unwrap();
		let s = String::from_utf8(got).unwrap();
		assert!(!s.contains("deadbeef"));
	}

	#[test]
	fn non_object_returns_none()
	{
		assert!(canonical_bytes(&json!([1, 2, 3]), "signature").is_none());
	}

	#[test]
	fn nested_objects_also_sorted()
	{
		let a = json!({"files": {"b.py": {"z": 1, "a": 2}}});
		let b = json!({"files": {"b.py": {"a": 2, "z": 1}}});
		assert_eq!(canonical_bytes(&a, "signature"), canonical_bytes(&b, "signature"));
	}
}
