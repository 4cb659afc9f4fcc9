//! Partial-update payloads.
//!
//! An [`Update`] is an ordered set of per-key patches. Delete-intent is an
//! explicit [`Patch::Clear`] sentinel rather than a null or absent value, so
//! "not mentioned" (untouched) and "explicitly cleared" (deleted) stay
//! distinguishable in the type system.
//!
//! # Example
//!
//! ```ignore
//! use reldoc::prelude::*;
//! use serde_json::json;
//!
//! let update = Update::new()
//!     .set("profile", json!({"age": 26}))   // merges into the stored object
//!     .set("tags", json!(["admin"]))        // arrays replace wholesale
//!     .clear("nickname");                   // deletes the key
//! ```

use serde_json::Value;

use crate::error::{Error, Result};

/// One patch applied to a document key.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Sets the key. Object values merge recursively into an existing
    /// object; arrays and scalars replace.
    Set(Value),
    /// Deletes the key from the result.
    Clear,
    /// A nested partial object, allowing `Clear` below the top level.
    Object(Vec<(String, Patch)>),
}

/// An ordered partial-document update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    entries: Vec<(String, Patch)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((key.into(), Patch::Set(value.into())));
        self
    }

    /// Deletes `key` from the document.
    pub fn clear(mut self, key: impl Into<String>) -> Self {
        self.entries.push((key.into(), Patch::Clear));
        self
    }

    /// Applies a nested update under `key`, for clears below the top level.
    pub fn nested(mut self, key: impl Into<String>, update: Update) -> Self {
        self.entries.push((key.into(), Patch::Object(update.entries)));
        self
    }

    /// Builds an update from a plain partial document: every key becomes a
    /// `Set`. Clears cannot be expressed this way; use the builder for those.
    pub fn from_document(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                entries: map.into_iter().map(|(k, v)| (k, Patch::Set(v))).collect(),
            }),
            other => Err(Error::Validation {
                operation: "update".to_string(),
                field: None,
                value: Some(other),
                message: "update payload must be a JSON object".to_string(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The patches in insertion order.
    pub fn entries(&self) -> &[(String, Patch)] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_preserves_insertion_order() {
        let update = Update::new().set("b", 1).clear("a").set("c", json!([1]));
        let keys: Vec<_> = update.entries().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn from_document_requires_an_object() {
        assert!(Update::from_document(json!({"a": 1})).is_ok());
        assert!(matches!(
            Update::from_document(json!([1])),
            Err(Error::Validation { .. })
        ));
    }
}
