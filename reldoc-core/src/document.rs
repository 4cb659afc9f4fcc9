//! Core traits and types for document representation and serialization.
//!
//! Documents are JSON objects carrying a string `id` plus arbitrary fields.
//! The reserved metadata keys (`id`, `createdAt`, `updatedAt`) are managed by
//! the collection orchestrator, never by callers.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{from_value, to_value, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};

/// The immutable document identifier key.
pub const ID_KEY: &str = "id";
/// Creation timestamp key (epoch milliseconds), managed when timestamps are
/// enabled on the schema.
pub const CREATED_AT_KEY: &str = "createdAt";
/// Last-write timestamp key (epoch milliseconds).
pub const UPDATED_AT_KEY: &str = "updatedAt";

/// Keys the merge engine and replace path must never treat as data.
pub const RESERVED_KEYS: [&str; 3] = [ID_KEY, CREATED_AT_KEY, UPDATED_AT_KEY];

/// A pluggable generator of globally-unique document id strings.
///
/// One generator is owned per store instance; [`uuid_ids`] is the default.
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// The default id generator: random UUID v4 strings.
pub fn uuid_ids() -> IdGenerator {
    Arc::new(|| Uuid::new_v4().to_string())
}

/// Core trait for strongly-typed documents.
///
/// # Example
///
/// ```ignore
/// use reldoc::prelude::*;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     pub id: String,
///     pub name: String,
/// }
///
/// impl Document for User {
///     fn id(&self) -> &str {
///         &self.id
///     }
///
///     fn collection_name() -> &'static str {
///         "users"
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Returns this document's unique identifier.
    fn id(&self) -> &str;

    /// Returns the name of the collection this document belongs to.
    fn collection_name() -> &'static str;
}

/// Extension trait providing JSON conversion for typed documents.
///
/// Automatically implemented for all [`Document`] types.
pub trait DocumentExt: Document {
    /// Converts this document to its stored JSON representation.
    fn to_json(&self) -> Result<Value>;

    /// Reconstructs a document from its stored JSON representation.
    fn from_json(value: Value) -> Result<Self>;
}

impl<D: Document> DocumentExt for D {
    fn to_json(&self) -> Result<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> Result<Self> {
        Ok(from_value(value)?)
    }
}

/// Extracts the id of a raw document, if present and a string.
pub fn document_id(document: &Value) -> Option<&str> {
    document.get(ID_KEY).and_then(Value::as_str)
}

/// Borrows a raw document as a JSON object map, rejecting anything else.
pub fn as_object<'a>(operation: &str, document: &'a Value) -> Result<&'a Map<String, Value>> {
    document.as_object().ok_or_else(|| Error::Validation {
        operation: operation.to_string(),
        field: None,
        value: Some(document.clone()),
        message: "document must be a JSON object".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uuid_ids_are_nonempty_and_distinct() {
        let ids = uuid_ids();
        let a = ids();
        let b = ids();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn document_id_requires_string() {
        assert_eq!(document_id(&json!({"id": "u1"})), Some("u1"));
        assert_eq!(document_id(&json!({"id": 7})), None);
        assert_eq!(document_id(&json!({})), None);
    }

    #[test]
    fn as_object_rejects_scalars() {
        assert!(as_object("insertOne", &json!({"a": 1})).is_ok());
        assert!(as_object("insertOne", &json!([1, 2])).is_err());
    }
}
