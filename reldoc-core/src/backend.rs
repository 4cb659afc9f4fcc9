//! Storage engine abstraction for the document store.
//!
//! The [`StorageEngine`] trait is the seam between the engine-independent
//! orchestration layer and a concrete relational engine. An engine owns the
//! physical mapping (tables, indexes, SQL text) and receives only logical
//! inputs: collection table names, schemas, filter expressions and whole
//! documents.
//!
//! Document-level operations are async. Transaction and savepoint hooks are
//! synchronous so that guard types can roll back from `Drop`.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

use crate::error::Result;
use crate::filter::{Expr, FindOptions};
use crate::schema::Schema;

/// Abstract interface over a relational storage engine.
///
/// Implementations must be thread-safe; the orchestration layer shares one
/// engine across collections and tasks behind an `Arc`.
///
/// # Document shape
///
/// Engines exchange complete documents as JSON objects. The reserved keys
/// `id`, `createdAt` and `updatedAt` are present on every document handed
/// to [`insert`](StorageEngine::insert) and
/// [`replace`](StorageEngine::replace) (timestamps only when the schema
/// enables them), and engines must reproduce them on every document they
/// return.
#[async_trait]
pub trait StorageEngine: Send + Sync + Debug + 'static {
    /// Creates or reconciles the physical table and indexes backing a
    /// collection. Must be idempotent: planning the same schema twice is a
    /// no-op, and planning a schema with added fields extends the existing
    /// table without touching stored documents.
    async fn init_collection(&self, table: &str, schema: &Schema) -> Result<()>;

    /// Returns the documents matching `filter`, sorted and paginated per
    /// `options`. A `None` filter matches every document.
    async fn fetch(
        &self,
        table: &str,
        schema: &Schema,
        filter: Option<&Expr>,
        options: &FindOptions,
    ) -> Result<Vec<Value>>;

    /// Inserts a complete document. Fails with
    /// [`Error::UniqueConstraint`](crate::error::Error::UniqueConstraint)
    /// when the id or a unique index collides.
    async fn insert(&self, table: &str, schema: &Schema, document: &Value) -> Result<()>;

    /// Replaces the stored body of the document with id `id`. Returns
    /// `false` when no such document exists.
    async fn replace(
        &self,
        table: &str,
        schema: &Schema,
        id: &str,
        document: &Value,
    ) -> Result<bool>;

    /// Deletes one document by id. Returns `false` when nothing matched.
    async fn delete_by_id(&self, table: &str, id: &str) -> Result<bool>;

    /// Deletes every document matching `filter` and returns the count.
    async fn delete_where(
        &self,
        table: &str,
        schema: &Schema,
        filter: Option<&Expr>,
    ) -> Result<usize>;

    /// Drops the collection's table and all its indexes. Dropping a
    /// collection that was never created succeeds.
    async fn drop_collection(&self, table: &str) -> Result<()>;

    /// Opens an engine-level transaction. Engines that serialize writes may
    /// block here until the connection is available.
    fn begin_transaction(&self) -> Result<()>;

    fn commit_transaction(&self) -> Result<()>;

    fn rollback_transaction(&self) -> Result<()>;

    /// Opens a named savepoint. Savepoints nest inside an open transaction
    /// and inside each other.
    fn begin_savepoint(&self, name: &str) -> Result<()>;

    fn release_savepoint(&self, name: &str) -> Result<()>;

    fn rollback_savepoint(&self, name: &str) -> Result<()>;
}

/// Factory trait for constructing engine instances.
#[async_trait]
pub trait StorageEngineBuilder {
    type Engine: StorageEngine;

    async fn build(self) -> Result<Self::Engine>;
}
