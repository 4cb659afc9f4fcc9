//! Schema model: fields, physical types, compound indexes, validators.
//!
//! A [`Schema`] is an immutable description of a collection, produced by the
//! [`SchemaBuilder`] accumulator. All structural validation happens in
//! [`SchemaBuilder::build`]; a `Schema` value in hand is known-good, and the
//! index planner can derive DDL from it without further checks.

use serde_json::Value;
use std::sync::Arc;

use crate::document::RESERVED_KEYS;
use crate::error::{Error, Result};
use crate::path::JsonPath;

/// Physical storage types a field can be extracted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Real,
    /// Boolean, stored as 0/1.
    Boolean,
    /// Arbitrary JSON, stored as serialized text.
    Json,
}

/// Caller-facing description of one schema field, accumulated by the builder.
///
/// The path defaults to the top-level `$.<name>` when not set explicitly.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub path: Option<String>,
    pub field_type: FieldType,
    pub nullable: bool,
    pub indexed: bool,
    pub unique: bool,
    pub default: Option<Value>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            path: None,
            field_type,
            nullable: true,
            indexed: false,
            unique: false,
            default: None,
        }
    }

    /// Sets an explicit dot/bracket JSON path rooted at `$`.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Marks the field non-nullable: every stored document must carry a
    /// non-null value at the field's path, checked before any write.
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Requests a generated physical column plus a lookup index.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Requests a physical uniqueness constraint. Implies nothing about
    /// `indexed`: a unique-but-unindexed field still gets its constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Default value applied on insert when the field's top-level key is
    /// absent.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// A resolved schema field with its parsed path.
#[derive(Debug, Clone)]
pub struct SchemaField {
    pub name: String,
    pub path: JsonPath,
    pub field_type: FieldType,
    pub nullable: bool,
    pub indexed: bool,
    pub unique: bool,
    pub default: Option<Value>,
}

/// A multi-column index over previously declared fields, in declared order.
#[derive(Debug, Clone)]
pub struct CompoundIndex {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
}

impl CompoundIndex {
    pub fn new(name: impl Into<String>, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A user-supplied document validator.
///
/// Validation is synchronous by construction; there is deliberately no async
/// variant of this trait. A blanket implementation covers plain
/// `Fn(&Value) -> bool` predicates.
pub trait Validator: Send + Sync {
    /// Returns `Ok(())` for an acceptable document, `Err(message)` otherwise.
    fn validate(&self, candidate: &Value) -> std::result::Result<(), String>;
}

impl<F> Validator for F
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    fn validate(&self, candidate: &Value) -> std::result::Result<(), String> {
        if self(candidate) {
            Ok(())
        } else {
            Err("validator rejected the document".to_string())
        }
    }
}

/// Immutable collection schema.
///
/// Built once via [`SchemaBuilder`]; there is no mutation surface after
/// construction.
#[derive(Clone)]
pub struct Schema {
    fields: Vec<SchemaField>,
    compound_indexes: Vec<CompoundIndex>,
    timestamps: bool,
    validator: Option<Arc<dyn Validator>>,
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("fields", &self.fields)
            .field("compound_indexes", &self.compound_indexes)
            .field("timestamps", &self.timestamps)
            .field("validator", &self.validator.as_ref().map(|_| "<validator>"))
            .finish()
    }
}

impl Schema {
    /// Starts an empty builder.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn compound_indexes(&self) -> &[CompoundIndex] {
        &self.compound_indexes
    }

    pub fn timestamps(&self) -> bool {
        self.timestamps
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Runs the user validator against a candidate document, if one is set.
    ///
    /// A `false` return or an error message both surface as `Err(message)`;
    /// the orchestrator wraps them into [`Error::Validation`] with operation
    /// context.
    pub fn run_validator(&self, candidate: &Value) -> std::result::Result<(), String> {
        match &self.validator {
            Some(v) => v.validate(candidate),
            None => Ok(()),
        }
    }
}

/// Plain accumulator for building a [`Schema`].
#[derive(Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldDef>,
    compound_indexes: Vec<CompoundIndex>,
    timestamps: bool,
    validator: Option<Arc<dyn Validator>>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn add_compound_index(mut self, index: CompoundIndex) -> Self {
        self.compound_indexes.push(index);
        self
    }

    /// Enables automatic `createdAt`/`updatedAt` management.
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Validates the accumulated definition and freezes it into a [`Schema`].
    ///
    /// All malformed-definition failures (duplicate names, bad paths,
    /// dangling compound-index references) surface here as
    /// [`Error::SchemaValidation`], never at query time.
    pub fn build(self) -> Result<Schema> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for def in self.fields {
            if def.name.is_empty() {
                return Err(Error::SchemaValidation {
                    field: None,
                    message: "field name must not be empty".to_string(),
                });
            }
            if RESERVED_KEYS.contains(&def.name.as_str()) {
                return Err(Error::schema(
                    def.name.clone(),
                    "field name collides with a reserved document key",
                ));
            }
            if fields.iter().any(|f: &SchemaField| f.name == def.name) {
                return Err(Error::schema(def.name.clone(), "duplicate field name"));
            }
            let path = match &def.path {
                Some(p) => JsonPath::parse(p),
                None => JsonPath::for_field(&def.name),
            }
            .map_err(|message| Error::SchemaValidation {
                field: Some(def.name.clone()),
                message,
            })?;
            if fields.iter().any(|f: &SchemaField| f.path == path) {
                return Err(Error::schema(
                    def.name.clone(),
                    format!("path {path} is already mapped by another field"),
                ));
            }
            fields.push(SchemaField {
                name: def.name,
                path,
                field_type: def.field_type,
                nullable: def.nullable,
                indexed: def.indexed,
                unique: def.unique,
                default: def.default,
            });
        }

        for index in &self.compound_indexes {
            if index.fields.is_empty() {
                return Err(Error::schema(index.name.clone(), "compound index has no fields"));
            }
            if self
                .compound_indexes
                .iter()
                .filter(|other| other.name == index.name)
                .count()
                > 1
            {
                return Err(Error::schema(index.name.clone(), "duplicate compound index name"));
            }
            for field in &index.fields {
                if !fields.iter().any(|f| &f.name == field) {
                    return Err(Error::schema(
                        index.name.clone(),
                        format!("compound index references unknown field {field:?}"),
                    ));
                }
            }
        }

        Ok(Schema {
            fields,
            compound_indexes: self.compound_indexes,
            timestamps: self.timestamps,
            validator: self.validator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn age_field() -> FieldDef {
        FieldDef::new("age", FieldType::Integer).indexed()
    }

    #[test]
    fn build_resolves_default_paths() {
        let schema = Schema::builder()
            .add_field(age_field())
            .add_field(FieldDef::new("city", FieldType::Text).path("$.profile.city"))
            .build()
            .unwrap();
        assert_eq!(schema.field("age").unwrap().path.as_str(), "$.age");
        assert_eq!(schema.field("city").unwrap().path.as_str(), "$.profile.city");
    }

    #[test]
    fn build_rejects_duplicates_and_bad_paths() {
        let dup = Schema::builder()
            .add_field(age_field())
            .add_field(FieldDef::new("age", FieldType::Text))
            .build();
        assert!(matches!(dup, Err(Error::SchemaValidation { .. })));

        let bad_path = Schema::builder()
            .add_field(FieldDef::new("x", FieldType::Text).path("no-dollar"))
            .build();
        assert!(matches!(bad_path, Err(Error::SchemaValidation { .. })));

        let reserved = Schema::builder()
            .add_field(FieldDef::new("id", FieldType::Text))
            .build();
        assert!(matches!(reserved, Err(Error::SchemaValidation { .. })));
    }

    #[test]
    fn build_rejects_dangling_compound_index() {
        let result = Schema::builder()
            .add_field(age_field())
            .add_compound_index(CompoundIndex::new("age_status", ["age", "status"]))
            .build();
        assert!(matches!(result, Err(Error::SchemaValidation { .. })));
    }

    #[test]
    fn closure_validators_map_false_to_err() {
        let schema = Schema::builder()
            .validator(|doc: &Value| doc.get("name").is_some())
            .build()
            .unwrap();
        assert!(schema.run_validator(&json!({"name": "a"})).is_ok());
        assert!(schema.run_validator(&json!({})).is_err());
    }
}
