//! Collection handles and the write orchestrator.
//!
//! A [`Collection`] is a cheap cloneable handle binding a name, a
//! [`Schema`](crate::schema::Schema) and a shared engine. All document
//! semantics live here: id assignment, timestamp management, deep-merge
//! updates, upsert seeding and validator enforcement. The engine below only
//! ever sees complete documents and filter expressions.
//!
//! Multi-statement operations (everything in the `update`/`replace`/
//! `find_one_and_*` family) run inside a savepoint so a mid-operation
//! failure can never leave a partial write behind, and so each retry
//! attempt starts from a clean slate. Savepoint scopes are serialized
//! store-wide: engines run on one shared connection, where interleaved
//! savepoints would release or roll back each other's state.
//!
//! # Example
//!
//! ```ignore
//! use reldoc::prelude::*;
//! use serde_json::json;
//!
//! # async fn example(users: &reldoc::Collection<impl reldoc::StorageEngine>) -> reldoc::Result<()> {
//! let alice = users.insert_one(json!({"name": "Alice", "age": 30})).await?;
//! let grown = users.find(Some(&Filter::gte("age", 21)), &FindOptions::default()).await?;
//! # Ok(()) }
//! ```

use chrono::Utc;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::backend::StorageEngine;
use crate::document::{
    as_object, document_id, IdGenerator, CREATED_AT_KEY, ID_KEY, RESERVED_KEYS, UPDATED_AT_KEY,
};
use crate::error::{BatchError, Error, Result};
use crate::events::{ChangeEvent, ChangeKind, EventBus};
use crate::filter::{Expr, FindOptions};
use crate::merge::{merge, MergeContext};
use crate::path::{JsonPath, Segment};
use crate::retry::{run_with_retry, CallOptions, CancellationToken, RetryOptions, RetryPolicy};
use crate::schema::Schema;
use crate::transaction::SavepointGuard;
use crate::update::Update;

/// Options for `insert_many`.
#[derive(Debug, Clone)]
pub struct InsertManyOptions {
    /// When `true` (the default) the batch stops at the first failing
    /// document; when `false` every document is attempted and failures are
    /// collected per index.
    pub ordered: bool,
}

impl Default for InsertManyOptions {
    fn default() -> Self {
        Self { ordered: true }
    }
}

/// Outcome of `insert_many`: the documents actually stored plus any
/// per-document failures, tagged with the input index.
#[derive(Debug, Default)]
pub struct InsertManyOutcome {
    pub inserted: Vec<Value>,
    pub errors: Vec<BatchError>,
}

/// Options for `update_one` and `update_many`.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Insert a document seeded from the filter's equality constraints when
    /// nothing matches.
    pub upsert: bool,
}

/// Options for `replace_one`.
#[derive(Debug, Clone, Default)]
pub struct ReplaceOptions {
    pub upsert: bool,
}

/// Which version of the document `find_one_and_*` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnDocument {
    /// The document as stored before the write.
    Before,
    /// The document as stored after the write.
    #[default]
    After,
}

/// Options for `find_one_and_update` and `find_one_and_replace`.
#[derive(Debug, Clone, Default)]
pub struct ModifyOptions {
    pub return_document: ReturnDocument,
    pub upsert: bool,
}

/// Counters reported by the `update`/`replace` family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: usize,
    pub modified: usize,
    /// Id of the document inserted by an upsert, when one happened.
    pub upserted_id: Option<String>,
}

struct CollectionInner<E: StorageEngine> {
    name: String,
    schema: Schema,
    engine: Arc<E>,
    events: Arc<EventBus>,
    ids: IdGenerator,
    store_retry: RetryOptions,
    // Serializes savepoint scopes across all collections of one store.
    // SQLite's RELEASE pops every savepoint opened after the named one, so
    // two interleaved read-modify-write scopes on the shared connection
    // would swallow each other's savepoints.
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

/// A handle to one named collection.
///
/// Handles are cheap to clone and share one engine. Per-call behavior is
/// layered through [`with_retry`](Collection::with_retry) (collection-wide)
/// and [`with_options`](Collection::with_options) (single chain of calls).
pub struct Collection<E: StorageEngine> {
    inner: Arc<CollectionInner<E>>,
    retry: RetryOptions,
    call: CallOptions,
}

impl<E: StorageEngine> Clone for Collection<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            retry: self.retry.clone(),
            call: self.call.clone(),
        }
    }
}

impl<E: StorageEngine> std::fmt::Debug for Collection<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl<E: StorageEngine> Collection<E> {
    pub(crate) fn new(
        name: String,
        schema: Schema,
        engine: Arc<E>,
        events: Arc<EventBus>,
        ids: IdGenerator,
        store_retry: RetryOptions,
        write_lock: Arc<tokio::sync::Mutex<()>>,
    ) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                name,
                schema,
                engine,
                events,
                ids,
                store_retry,
                write_lock,
            }),
            retry: RetryOptions::default(),
            call: CallOptions::default(),
        }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Returns a handle with collection-level retry options. These sit
    /// between store-wide defaults and per-call options.
    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    /// Returns a handle whose operations run with the given call options.
    pub fn with_options(&self, call: CallOptions) -> Self {
        let mut handle = self.clone();
        handle.call = call;
        handle
    }

    fn policy(&self) -> Option<RetryPolicy> {
        RetryOptions::resolve(&self.call.retry, &self.retry, &self.inner.store_retry)
    }

    fn cancellation(&self) -> Option<CancellationToken> {
        self.call.cancellation.clone()
    }

    fn emit(&self, kind: ChangeKind) {
        self.inner.events.emit(ChangeEvent::new(self.inner.name.clone(), kind));
    }

    /// Inserts one document and returns it as stored, with id and
    /// timestamps assigned. A caller-supplied string `id` is honored;
    /// otherwise the store's id generator runs.
    pub async fn insert_one(&self, document: Value) -> Result<Value> {
        let now_ms = Utc::now().timestamp_millis();
        let prepared = self.prepare_insert("insertOne", document, now_ms)?;
        let stored = run_with_retry("insertOne", self.policy(), self.cancellation(), || {
            self.try_insert(&prepared).boxed()
        })
        .await?;
        if let Some(id) = document_id(&stored) {
            self.emit(ChangeKind::Insert { id: id.to_string() });
        }
        Ok(stored)
    }

    /// Inserts a batch of documents.
    ///
    /// One timestamp is captured for the whole batch. Failures never abort
    /// documents already stored: in ordered mode the batch stops at the
    /// first error, in unordered mode every document is attempted and the
    /// outcome carries one [`BatchError`] per failed index.
    pub async fn insert_many(
        &self,
        documents: Vec<Value>,
        options: &InsertManyOptions,
    ) -> Result<InsertManyOutcome> {
        let now_ms = Utc::now().timestamp_millis();
        let mut outcome = InsertManyOutcome::default();
        for (index, document) in documents.into_iter().enumerate() {
            if self.cancellation().is_some_and(|t| t.is_cancelled()) {
                outcome.errors.push(BatchError {
                    index,
                    error: Error::Cancelled { operation: "insertMany".to_string() },
                });
                break;
            }
            let attempt = match self.prepare_insert("insertMany", document, now_ms) {
                Ok(prepared) => {
                    run_with_retry("insertMany", self.policy(), self.cancellation(), || {
                        self.try_insert(&prepared).boxed()
                    })
                    .await
                }
                Err(error) => Err(error),
            };
            match attempt {
                Ok(stored) => outcome.inserted.push(stored),
                Err(error) => {
                    outcome.errors.push(BatchError { index, error });
                    if options.ordered {
                        break;
                    }
                }
            }
        }
        if !outcome.inserted.is_empty() {
            let ids = outcome
                .inserted
                .iter()
                .filter_map(|doc| document_id(doc).map(str::to_string))
                .collect();
            self.emit(ChangeKind::InsertMany { ids });
        }
        Ok(outcome)
    }

    /// Returns all documents matching `filter`, sorted and paginated per
    /// `options`. `None` matches everything.
    pub async fn find(&self, filter: Option<&Expr>, options: &FindOptions) -> Result<Vec<Value>> {
        run_with_retry("find", self.policy(), self.cancellation(), || {
            let inner = &self.inner;
            async move { inner.engine.fetch(&inner.name, &inner.schema, filter, options).await }
                .boxed()
        })
        .await
    }

    /// Returns the first document matching `filter`, if any.
    pub async fn find_one(&self, filter: &Expr) -> Result<Option<Value>> {
        let options = FindOptions::default().limit(1);
        let mut found = self.find(Some(filter), &options).await?;
        Ok(if found.is_empty() { None } else { Some(found.remove(0)) })
    }

    /// Applies a deep-merge update to the first matching document.
    pub async fn update_one(
        &self,
        filter: &Expr,
        update: &Update,
        options: &UpdateOptions,
    ) -> Result<UpdateResult> {
        let now_ms = Utc::now().timestamp_millis();
        let (result, kind) =
            run_with_retry("updateOne", self.policy(), self.cancellation(), || {
                self.try_modify_one(
                    "updateOne",
                    filter,
                    WriteBody::Merge(update),
                    options.upsert,
                    now_ms,
                )
                .boxed()
            })
            .await
            .map(|(before, after, result)| (result, change_for_update(before, after)))?;
        if let Some(kind) = kind {
            self.emit(kind);
        }
        Ok(result)
    }

    /// Applies a deep-merge update to every matching document inside one
    /// savepoint; a failure on any document rolls the whole operation back.
    pub async fn update_many(&self, filter: &Expr, update: &Update) -> Result<UpdateResult> {
        if update.is_empty() {
            return Err(Error::validation("updateMany", "update has no entries"));
        }
        let now_ms = Utc::now().timestamp_millis();
        let result = run_with_retry("updateMany", self.policy(), self.cancellation(), || {
            self.try_update_many(filter, update, now_ms).boxed()
        })
        .await?;
        if result.modified > 0 {
            self.emit(ChangeKind::UpdateMany { count: result.modified });
        }
        Ok(result)
    }

    /// Replaces the body of the first matching document wholesale, keeping
    /// its id and creation timestamp.
    pub async fn replace_one(
        &self,
        filter: &Expr,
        replacement: Value,
        options: &ReplaceOptions,
    ) -> Result<UpdateResult> {
        let now_ms = Utc::now().timestamp_millis();
        let (result, kind) =
            run_with_retry("replaceOne", self.policy(), self.cancellation(), || {
                self.try_modify_one(
                    "replaceOne",
                    filter,
                    WriteBody::Replace(&replacement),
                    options.upsert,
                    now_ms,
                )
                .boxed()
            })
            .await
            .map(|(before, after, result)| (result, change_for_replace(before, after)))?;
        if let Some(kind) = kind {
            self.emit(kind);
        }
        Ok(result)
    }

    /// Like [`update_one`](Collection::update_one), returning the document
    /// before or after the write per `options.return_document`.
    pub async fn find_one_and_update(
        &self,
        filter: &Expr,
        update: &Update,
        options: &ModifyOptions,
    ) -> Result<Option<Value>> {
        let now_ms = Utc::now().timestamp_millis();
        let (before, after, _) =
            run_with_retry("findOneAndUpdate", self.policy(), self.cancellation(), || {
                self.try_modify_one(
                    "findOneAndUpdate",
                    filter,
                    WriteBody::Merge(update),
                    options.upsert,
                    now_ms,
                )
                .boxed()
            })
            .await?;
        if let Some(kind) = change_for_update(before.clone(), after.clone()) {
            self.emit(kind);
        }
        Ok(match options.return_document {
            ReturnDocument::Before => before,
            ReturnDocument::After => after,
        })
    }

    /// Like [`replace_one`](Collection::replace_one), returning the
    /// document before or after the write per `options.return_document`.
    pub async fn find_one_and_replace(
        &self,
        filter: &Expr,
        replacement: Value,
        options: &ModifyOptions,
    ) -> Result<Option<Value>> {
        let now_ms = Utc::now().timestamp_millis();
        let (before, after, _) =
            run_with_retry("findOneAndReplace", self.policy(), self.cancellation(), || {
                self.try_modify_one(
                    "findOneAndReplace",
                    filter,
                    WriteBody::Replace(&replacement),
                    options.upsert,
                    now_ms,
                )
                .boxed()
            })
            .await?;
        if let Some(kind) = change_for_replace(before.clone(), after.clone()) {
            self.emit(kind);
        }
        Ok(match options.return_document {
            ReturnDocument::Before => before,
            ReturnDocument::After => after,
        })
    }

    /// Deletes the first matching document and returns it.
    pub async fn find_one_and_delete(&self, filter: &Expr) -> Result<Option<Value>> {
        let deleted = run_with_retry("findOneAndDelete", self.policy(), self.cancellation(), || {
            self.try_delete_one(filter).boxed()
        })
        .await?;
        if let Some(id) = deleted.as_ref().and_then(document_id) {
            self.emit(ChangeKind::Delete { id: id.to_string() });
        }
        Ok(deleted)
    }

    /// Deletes the first matching document. Returns the number of documents
    /// removed (0 or 1).
    pub async fn delete_one(&self, filter: &Expr) -> Result<usize> {
        Ok(usize::from(self.find_one_and_delete(filter).await?.is_some()))
    }

    /// Deletes every matching document and returns the count. `None`
    /// deletes the whole collection's contents.
    pub async fn delete_many(&self, filter: Option<&Expr>) -> Result<usize> {
        let count = run_with_retry("deleteMany", self.policy(), self.cancellation(), || {
            let inner = &self.inner;
            async move { inner.engine.delete_where(&inner.name, &inner.schema, filter).await }
                .boxed()
        })
        .await?;
        if count > 0 {
            self.emit(ChangeKind::DeleteMany { count });
        }
        Ok(count)
    }

    /// Drops the collection's table and indexes. The handle is unusable for
    /// further writes until the store re-initializes the collection.
    pub async fn drop(&self) -> Result<()> {
        self.inner.engine.drop_collection(&self.inner.name).await?;
        self.emit(ChangeKind::Drop);
        Ok(())
    }

    async fn try_insert(&self, prepared: &Value) -> Result<Value> {
        self.inner
            .engine
            .insert(&self.inner.name, &self.inner.schema, prepared)
            .await?;
        Ok(prepared.clone())
    }

    /// One attempt of the single-document read-modify-write cycle, wrapped
    /// in a savepoint. Returns the document before and after the write
    /// (either may be `None`) plus the outcome counters.
    async fn try_modify_one(
        &self,
        operation: &'static str,
        filter: &Expr,
        body: WriteBody<'_>,
        upsert: bool,
        now_ms: i64,
    ) -> Result<(Option<Value>, Option<Value>, UpdateResult)> {
        if let WriteBody::Merge(update) = body {
            if update.is_empty() {
                return Err(Error::validation(operation, "update has no entries"));
            }
        }
        let inner = &self.inner;
        let _write = inner.write_lock.lock().await;
        let guard = SavepointGuard::begin(inner.engine.as_ref())?;
        let options = FindOptions::default().limit(1);
        let mut found = inner
            .engine
            .fetch(&inner.name, &inner.schema, Some(filter), &options)
            .await?;

        if let Some(existing) = found.pop() {
            let rewritten = self.rewrite_document(operation, &existing, &body, now_ms)?;
            self.check_document(operation, &rewritten)?;
            let id = document_id(&rewritten)
                .ok_or_else(|| Error::validation(operation, "stored document has no id"))?
                .to_string();
            let replaced = inner
                .engine
                .replace(&inner.name, &inner.schema, &id, &rewritten)
                .await?;
            if !replaced {
                return Err(Error::Transaction(format!(
                    "document {id} disappeared during {operation}"
                )));
            }
            guard.release()?;
            let result = UpdateResult { matched: 1, modified: 1, upserted_id: None };
            return Ok((Some(existing), Some(rewritten), result));
        }

        if !upsert {
            guard.release()?;
            return Ok((None, None, UpdateResult::default()));
        }

        let seeded = self.build_upsert(operation, filter, &body, now_ms)?;
        self.check_document(operation, &seeded)?;
        inner.engine.insert(&inner.name, &inner.schema, &seeded).await?;
        guard.release()?;
        let id = document_id(&seeded).map(str::to_string);
        debug!(collection = %inner.name, operation, "upsert inserted new document");
        let result = UpdateResult { matched: 0, modified: 0, upserted_id: id };
        Ok((None, Some(seeded), result))
    }

    async fn try_update_many(
        &self,
        filter: &Expr,
        update: &Update,
        now_ms: i64,
    ) -> Result<UpdateResult> {
        let inner = &self.inner;
        let _write = inner.write_lock.lock().await;
        let guard = SavepointGuard::begin(inner.engine.as_ref())?;
        let found = inner
            .engine
            .fetch(&inner.name, &inner.schema, Some(filter), &FindOptions::default())
            .await?;
        let matched = found.len();
        let ctx = MergeContext { timestamps: inner.schema.timestamps(), now_ms };
        for existing in found {
            let merged = merge(&existing, update, &ctx)?;
            self.check_document("updateMany", &merged)?;
            let id = document_id(&merged)
                .ok_or_else(|| Error::validation("updateMany", "stored document has no id"))?
                .to_string();
            let replaced = inner
                .engine
                .replace(&inner.name, &inner.schema, &id, &merged)
                .await?;
            if !replaced {
                return Err(Error::Transaction(format!(
                    "document {id} disappeared during updateMany"
                )));
            }
        }
        guard.release()?;
        Ok(UpdateResult { matched, modified: matched, upserted_id: None })
    }

    async fn try_delete_one(&self, filter: &Expr) -> Result<Option<Value>> {
        let inner = &self.inner;
        let _write = inner.write_lock.lock().await;
        let guard = SavepointGuard::begin(inner.engine.as_ref())?;
        let options = FindOptions::default().limit(1);
        let mut found = inner
            .engine
            .fetch(&inner.name, &inner.schema, Some(filter), &options)
            .await?;
        let Some(existing) = found.pop() else {
            guard.release()?;
            return Ok(None);
        };
        let id = document_id(&existing)
            .ok_or_else(|| Error::validation("deleteOne", "stored document has no id"))?;
        inner.engine.delete_by_id(&inner.name, id).await?;
        guard.release()?;
        Ok(Some(existing))
    }

    /// Produces the complete stored document for an insert: forbidden-key
    /// screening, schema defaults, id and timestamp assignment.
    fn prepare_insert(&self, operation: &str, document: Value, now_ms: i64) -> Result<Value> {
        as_object(operation, &document)?;
        let caller_id = document_id(&document).map(str::to_string);
        let body = Update::from_document(document)?;
        // Routing through the merge engine screens forbidden keys at every
        // depth and strips the reserved keys from the body.
        let ctx = MergeContext { timestamps: false, now_ms };
        let merged = merge(&Value::Object(Map::new()), &body, &ctx)?;
        let Value::Object(mut map) = merged else {
            return Err(Error::validation(operation, "document must be a JSON object"));
        };
        self.apply_defaults(&mut map);
        let id = match caller_id {
            Some(id) if !id.is_empty() => id,
            _ => (self.inner.ids)(),
        };
        let prepared = self.finalize(map, id, now_ms, now_ms);
        self.check_document(operation, &prepared)?;
        Ok(prepared)
    }

    /// Computes the full replacement body for a matched document.
    fn rewrite_document(
        &self,
        operation: &str,
        existing: &Value,
        body: &WriteBody<'_>,
        now_ms: i64,
    ) -> Result<Value> {
        match body {
            WriteBody::Merge(update) => {
                let ctx = MergeContext { timestamps: self.inner.schema.timestamps(), now_ms };
                merge(existing, update, &ctx)
            }
            WriteBody::Replace(replacement) => {
                as_object(operation, replacement)?;
                let body = Update::from_document((*replacement).clone())?;
                let ctx = MergeContext { timestamps: false, now_ms };
                let merged = merge(&Value::Object(Map::new()), &body, &ctx)?;
                let Value::Object(map) = merged else {
                    return Err(Error::validation(operation, "replacement must be a JSON object"));
                };
                let id = document_id(existing)
                    .ok_or_else(|| Error::validation(operation, "stored document has no id"))?
                    .to_string();
                let created = existing
                    .get(CREATED_AT_KEY)
                    .and_then(Value::as_i64)
                    .unwrap_or(now_ms);
                Ok(self.finalize(map, id, created, now_ms))
            }
        }
    }

    /// Builds the document inserted by an upsert: the filter's equality
    /// constraints seed the base, then the write body applies on top.
    fn build_upsert(
        &self,
        operation: &str,
        filter: &Expr,
        body: &WriteBody<'_>,
        now_ms: i64,
    ) -> Result<Value> {
        let mut base = Map::new();
        let mut filter_id = None;
        for (field, value) in filter.equality_constraints() {
            if field == ID_KEY {
                if let Value::String(id) = &value {
                    filter_id = Some(id.clone());
                }
                continue;
            }
            if RESERVED_KEYS.contains(&field.as_str()) {
                continue;
            }
            let path = JsonPath::normalize(&field).map_err(|message| Error::Validation {
                operation: operation.to_string(),
                field: Some(field.clone()),
                value: None,
                message,
            })?;
            path.seed(&mut base, value);
        }

        let update = match body {
            WriteBody::Merge(update) => (*update).clone(),
            WriteBody::Replace(replacement) => {
                as_object(operation, replacement)?;
                Update::from_document((*replacement).clone())?
            }
        };
        let ctx = MergeContext { timestamps: false, now_ms };
        let merged = merge(&Value::Object(base), &update, &ctx)?;
        let Value::Object(mut map) = merged else {
            return Err(Error::validation(operation, "upsert produced a non-object document"));
        };
        self.apply_defaults(&mut map);
        let id = match filter_id {
            Some(id) if !id.is_empty() => id,
            _ => (self.inner.ids)(),
        };
        Ok(self.finalize(map, id, now_ms, now_ms))
    }

    fn apply_defaults(&self, map: &mut Map<String, Value>) {
        for field in self.inner.schema.fields() {
            if let Some(default) = &field.default {
                if !path_present(&field.path, map) {
                    field.path.seed(map, default.clone());
                }
            }
        }
    }

    fn finalize(
        &self,
        mut map: Map<String, Value>,
        id: String,
        created_ms: i64,
        updated_ms: i64,
    ) -> Value {
        map.insert(ID_KEY.to_string(), Value::String(id));
        if self.inner.schema.timestamps() {
            map.insert(CREATED_AT_KEY.to_string(), Value::from(created_ms));
            map.insert(UPDATED_AT_KEY.to_string(), Value::from(updated_ms));
        }
        Value::Object(map)
    }

    /// Schema checks applied to every candidate document before it reaches
    /// the engine: non-nullable fields must hold a non-null value, then the
    /// user validator runs.
    fn check_document(&self, operation: &str, candidate: &Value) -> Result<()> {
        for field in self.inner.schema.fields() {
            if field.nullable {
                continue;
            }
            if !field.path.lookup(candidate).is_some_and(|v| !v.is_null()) {
                return Err(Error::Constraint(format!(
                    "non-nullable field {:?} is missing or null",
                    field.name
                )));
            }
        }
        self.inner.schema.run_validator(candidate).map_err(|message| Error::Validation {
            operation: operation.to_string(),
            field: None,
            value: Some(candidate.clone()),
            message,
        })
    }
}

fn path_present(path: &JsonPath, map: &Map<String, Value>) -> bool {
    let mut segments = path.segments().iter();
    let Some(Segment::Key(first)) = segments.next() else {
        return true;
    };
    let Some(mut current) = map.get(first) else {
        return false;
    };
    for segment in segments {
        let next = match segment {
            Segment::Key(key) => current.get(key.as_str()),
            Segment::Index(index) => current.get(*index),
        };
        match next {
            Some(value) => current = value,
            None => return false,
        }
    }
    true
}

/// The write applied by the `modify_one` family.
enum WriteBody<'a> {
    Merge(&'a Update),
    Replace(&'a Value),
}

fn change_for_update(before: Option<Value>, after: Option<Value>) -> Option<ChangeKind> {
    let after = after?;
    let id = document_id(&after)?.to_string();
    Some(ChangeKind::Update { id, upserted: before.is_none() })
}

fn change_for_replace(before: Option<Value>, after: Option<Value>) -> Option<ChangeKind> {
    let after = after?;
    let id = document_id(&after)?.to_string();
    if before.is_none() {
        Some(ChangeKind::Update { id, upserted: true })
    } else {
        Some(ChangeKind::Replace { id })
    }
}
