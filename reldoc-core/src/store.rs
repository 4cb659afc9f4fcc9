//! Main document store interface.
//!
//! A [`DocumentStore`] owns one shared engine plus the store-wide pieces of
//! configuration: the id generator, default retry options and the change
//! event bus. Collections are obtained from the store, which plans their
//! physical layout on first access.
//!
//! # Example
//!
//! ```ignore
//! use reldoc::prelude::*;
//! use serde_json::json;
//!
//! # async fn example(engine: impl reldoc::StorageEngine) -> reldoc::Result<()> {
//! let store = DocumentStore::new(engine);
//! let schema = Schema::builder()
//!     .add_field(FieldDef::new("email", FieldType::Text).unique())
//!     .timestamps(true)
//!     .build()?;
//! let users = store.collection("users", schema).await?;
//! users.insert_one(json!({"email": "alice@example.com"})).await?;
//! # Ok(()) }
//! ```

use futures::future::BoxFuture;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::info;

use crate::backend::{StorageEngine, StorageEngineBuilder};
use crate::collection::Collection;
use crate::document::{uuid_ids, Document, IdGenerator};
use crate::error::{Error, Result};
use crate::events::{ChangeEvent, ChangeKind, EventBus};
use crate::retry::RetryOptions;
use crate::schema::Schema;
use crate::transaction::Transaction;

/// A document store bound to a concrete engine.
///
/// Stores are cheap to clone; all clones share the engine and event bus.
pub struct DocumentStore<E: StorageEngine> {
    engine: Arc<E>,
    ids: IdGenerator,
    retry: RetryOptions,
    events: Arc<EventBus>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl<E: StorageEngine> Clone for DocumentStore<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            ids: Arc::clone(&self.ids),
            retry: self.retry.clone(),
            events: Arc::clone(&self.events),
            write_lock: Arc::clone(&self.write_lock),
        }
    }
}

impl<E: StorageEngine> std::fmt::Debug for DocumentStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl<E: StorageEngine> DocumentStore<E> {
    /// Creates a store over the given engine, with UUID ids and retry
    /// disabled by default.
    pub fn new(engine: E) -> Self {
        Self {
            engine: Arc::new(engine),
            ids: uuid_ids(),
            retry: RetryOptions::default(),
            events: Arc::new(EventBus::new()),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Builds the engine through its [`StorageEngineBuilder`] and wraps it.
    pub async fn from_builder<B>(builder: B) -> Result<Self>
    where
        B: StorageEngineBuilder<Engine = E>,
    {
        Ok(Self::new(builder.build().await?))
    }

    /// Replaces the document id generator.
    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Sets store-wide default retry options, overridable per collection
    /// and per call.
    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Subscribes to change events from every collection of this store.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    /// Opens a collection, planning its table and indexes first.
    ///
    /// Planning is idempotent: opening an existing collection with the same
    /// schema changes nothing, and opening it with added fields extends the
    /// physical layout in place.
    ///
    /// The returned handle is a cheap clone over the store's shared engine,
    /// so the store keeps no handle cache; callers that want the
    /// open-once-and-reuse lifecycle simply hold on to the handle, and
    /// re-opening a name is how a widened schema is applied.
    pub async fn collection(&self, name: &str, schema: Schema) -> Result<Collection<E>> {
        validate_collection_name(name)?;
        self.engine.init_collection(name, &schema).await?;
        info!(collection = name, "collection initialized");
        Ok(Collection::new(
            name.to_string(),
            schema,
            Arc::clone(&self.engine),
            Arc::clone(&self.events),
            Arc::clone(&self.ids),
            self.retry.clone(),
            Arc::clone(&self.write_lock),
        ))
    }

    /// Opens the collection named by a [`Document`] type.
    pub async fn typed_collection<D: Document>(&self, schema: Schema) -> Result<Collection<E>> {
        self.collection(D::collection_name(), schema).await
    }

    /// Drops a collection's table and indexes. Dropping a collection that
    /// was never created succeeds.
    pub async fn drop_collection(&self, name: &str) -> Result<()> {
        validate_collection_name(name)?;
        self.engine.drop_collection(name).await?;
        self.events.emit(ChangeEvent::new(name.to_string(), ChangeKind::Drop));
        Ok(())
    }

    /// Begins an explicit engine-level transaction.
    ///
    /// Collection operations performed while the transaction is open join
    /// it (their savepoints nest inside), and an early drop of the returned
    /// handle rolls everything back.
    pub fn begin_transaction(&self) -> Result<Transaction<E>> {
        Transaction::begin(Arc::clone(&self.engine))
    }

    /// Runs `body` inside a transaction, committing on `Ok` and rolling
    /// back on `Err`.
    pub async fn transaction<T, F>(&self, body: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a Self) -> BoxFuture<'a, Result<T>>,
    {
        let mut tx = self.begin_transaction()?;
        match body(self).await {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(error) => {
                tx.rollback()?;
                Err(error)
            }
        }
    }
}

/// Collection names become SQL identifiers, so only word characters are
/// accepted and the first character must not be a digit.
fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::validation(
            "collection",
            format!("invalid collection name {name:?}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names_are_identifier_safe() {
        assert!(validate_collection_name("users").is_ok());
        assert!(validate_collection_name("audit_log2").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("2fast").is_err());
        assert!(validate_collection_name("users; drop table users").is_err());
        assert!(validate_collection_name("a-b").is_err());
    }
}
