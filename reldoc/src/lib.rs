//! Main reldoc crate providing a document store over an embedded
//! relational engine.
//!
//! This crate is the primary entry point for users of reldoc. It re-exports
//! the engine-independent core and bundles the SQLite engine.
//!
//! # Features
//!
//! - **Document collections** - Schemaful JSON documents with managed ids
//!   and timestamps
//! - **Real indexes** - Declared fields become generated columns with SQL
//!   indexes; filters on them use the engine's planner
//! - **Deep-merge updates** - Partial updates with an explicit clear
//!   sentinel, so "omitted" and "deleted" never blur
//! - **Resilience** - Layered retry policies with jittered backoff,
//!   cancellation tokens, and drop-safe transactions
//!
//! # Quick Start
//!
//! ```ignore
//! use reldoc::prelude::*;
//! use reldoc::sqlite::SqliteEngine;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> reldoc::Result<()> {
//!     let store = DocumentStore::new(SqliteEngine::open("app.db")?);
//!
//!     let schema = Schema::builder()
//!         .add_field(FieldDef::new("email", FieldType::Text).unique())
//!         .add_field(FieldDef::new("age", FieldType::Integer).indexed())
//!         .timestamps(true)
//!         .build()?;
//!     let users = store.collection("users", schema).await?;
//!
//!     users.insert_one(json!({"email": "alice@example.com", "age": 30})).await?;
//!
//!     let adults = users
//!         .find(Some(&Filter::gte("age", 21)), &FindOptions::default())
//!         .await?;
//!     println!("found {} adults", adults.len());
//!
//!     users
//!         .update_one(
//!             &Filter::eq("email", "alice@example.com"),
//!             &Update::new().set("profile", json!({"city": "Berlin"})),
//!             &UpdateOptions::default(),
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod prelude;

pub use reldoc_core::{
    backend, collection, document, error, events, filter, merge, path, retry, schema, store,
    transaction, update,
};

pub use reldoc_core::backend::StorageEngine;
pub use reldoc_core::collection::Collection;
pub use reldoc_core::error::{Error, Result};
pub use reldoc_core::store::DocumentStore;

/// SQLite engine implementation.
pub mod sqlite {
    pub use reldoc_sqlite::{engine, planner, translate, SqliteEngine, SqliteEngineBuilder};
}
