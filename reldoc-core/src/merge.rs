//! The merge engine: deep-merges partial updates into stored documents.
//!
//! [`merge`] is a pure function from (existing document, update, operation
//! metadata) to the complete new document. The laws:
//!
//! - object values merge recursively, key by key
//! - array values replace wholesale, never element-merge
//! - [`Patch::Clear`](crate::update::Patch::Clear) deletes the key; an
//!   omitted key is untouched
//! - `id` and `createdAt` are never affected; `updatedAt` is overwritten
//!   with the operation instant when timestamps are enabled
//! - prototype-forging key names are rejected anywhere in the payload

use serde_json::{Map, Value};

use crate::document::{CREATED_AT_KEY, ID_KEY, UPDATED_AT_KEY};
use crate::error::{Error, Result};
use crate::update::{Patch, Update};

/// Key names that could forge object internals in downstream consumers.
/// Update payloads carrying them are rejected outright.
const FORBIDDEN_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Per-operation metadata the merge needs.
#[derive(Debug, Clone, Copy)]
pub struct MergeContext {
    /// Whether the schema manages `createdAt`/`updatedAt`.
    pub timestamps: bool,
    /// The operation's wall-clock instant, epoch milliseconds. Captured once
    /// per logical operation by the orchestrator.
    pub now_ms: i64,
}

/// Computes the complete new document from `existing` and `update`.
///
/// Deterministic for given inputs; performs no I/O.
pub fn merge(existing: &Value, update: &Update, ctx: &MergeContext) -> Result<Value> {
    let mut result = match existing {
        Value::Object(map) => map.clone(),
        other => {
            return Err(Error::Validation {
                operation: "merge".to_string(),
                field: None,
                value: Some(other.clone()),
                message: "existing document must be a JSON object".to_string(),
            })
        }
    };

    apply_entries(&mut result, update.entries(), true)?;

    if ctx.timestamps {
        result.insert(UPDATED_AT_KEY.to_string(), Value::from(ctx.now_ms));
    }

    Ok(Value::Object(result))
}

fn apply_entries(
    target: &mut Map<String, Value>,
    entries: &[(String, Patch)],
    top_level: bool,
) -> Result<()> {
    for (key, patch) in entries {
        check_key(key)?;
        // Reserved metadata keys pass through a merge untouched.
        if top_level && (key == ID_KEY || key == CREATED_AT_KEY || key == UPDATED_AT_KEY) {
            continue;
        }
        match patch {
            Patch::Clear => {
                target.remove(key);
            }
            Patch::Set(value) => {
                check_value(value)?;
                let merged = match (target.get(key), value) {
                    (Some(Value::Object(old)), Value::Object(new)) => {
                        Value::Object(merge_objects(old, new))
                    }
                    _ => value.clone(),
                };
                target.insert(key.clone(), merged);
            }
            Patch::Object(nested) => {
                let slot = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(map) = slot {
                    apply_entries(map, nested, false)?;
                }
            }
        }
    }
    Ok(())
}

/// Key-wise recursive merge of two plain objects. Arrays and scalars from
/// `new` replace; nested objects recurse.
fn merge_objects(old: &Map<String, Value>, new: &Map<String, Value>) -> Map<String, Value> {
    let mut out = old.clone();
    for (key, incoming) in new {
        let merged = match (out.get(key), incoming) {
            (Some(Value::Object(o)), Value::Object(n)) => Value::Object(merge_objects(o, n)),
            _ => incoming.clone(),
        };
        out.insert(key.clone(), merged);
    }
    out
}

fn check_key(key: &str) -> Result<()> {
    if FORBIDDEN_KEYS.contains(&key) {
        return Err(Error::Validation {
            operation: "merge".to_string(),
            field: Some(key.to_string()),
            value: None,
            message: "reserved property name is not allowed in update payloads".to_string(),
        });
    }
    Ok(())
}

/// Walks a `Set` value rejecting forbidden keys at any depth.
fn check_value(value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            for (key, sub) in map {
                check_key(key)?;
                check_value(sub)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                check_value(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> MergeContext {
        MergeContext { timestamps: false, now_ms: 0 }
    }

    #[test]
    fn objects_merge_recursively() {
        let existing = json!({
            "id": "u1",
            "profile": {"age": 25, "city": "NYC"},
            "tags": ["user"],
        });
        let update = Update::new().set("profile", json!({"age": 26}));
        let merged = merge(&existing, &update, &ctx()).unwrap();
        assert_eq!(
            merged,
            json!({"id": "u1", "profile": {"age": 26, "city": "NYC"}, "tags": ["user"]})
        );
    }

    #[test]
    fn arrays_replace_wholesale() {
        let existing = json!({"id": "u1", "tags": ["a", "b", "c"]});
        let update = Update::new().set("tags", json!(["x"]));
        let merged = merge(&existing, &update, &ctx()).unwrap();
        assert_eq!(merged["tags"], json!(["x"]));
    }

    #[test]
    fn clear_deletes_and_omission_preserves() {
        let existing = json!({"id": "u1", "a": 1, "b": 2});
        let cleared = merge(&existing, &Update::new().clear("a"), &ctx()).unwrap();
        assert_eq!(cleared, json!({"id": "u1", "b": 2}));

        let untouched = merge(&existing, &Update::new(), &ctx()).unwrap();
        assert_eq!(untouched, existing);
    }

    #[test]
    fn nested_clear_reaches_below_top_level() {
        let existing = json!({"id": "u1", "profile": {"age": 25, "city": "NYC"}});
        let update = Update::new().nested("profile", Update::new().clear("city"));
        let merged = merge(&existing, &update, &ctx()).unwrap();
        assert_eq!(merged, json!({"id": "u1", "profile": {"age": 25}}));
    }

    #[test]
    fn reserved_metadata_keys_are_untouched() {
        let existing = json!({"id": "u1", "createdAt": 100, "updatedAt": 100, "a": 1});
        let update = Update::new()
            .set("id", "forged")
            .set("createdAt", 999)
            .set("a", 2);
        let merged = merge(
            &existing,
            &update,
            &MergeContext { timestamps: true, now_ms: 500 },
        )
        .unwrap();
        assert_eq!(merged["id"], json!("u1"));
        assert_eq!(merged["createdAt"], json!(100));
        assert_eq!(merged["updatedAt"], json!(500));
        assert_eq!(merged["a"], json!(2));
    }

    #[test]
    fn prototype_forging_keys_are_rejected() {
        let existing = json!({"id": "u1"});
        let direct = Update::new().set("__proto__", json!({"polluted": true}));
        assert!(matches!(merge(&existing, &direct, &ctx()), Err(Error::Validation { .. })));

        let nested = Update::new().set("a", json!({"constructor": {"bad": 1}}));
        assert!(matches!(merge(&existing, &nested, &ctx()), Err(Error::Validation { .. })));
    }

    #[test]
    fn merge_is_deterministic() {
        let existing = json!({"id": "u1", "n": {"a": 1}});
        let update = Update::new().set("n", json!({"b": 2}));
        let first = merge(&existing, &update, &ctx()).unwrap();
        let second = merge(&existing, &update, &ctx()).unwrap();
        assert_eq!(first, second);
    }
}
