//! A document-oriented data-access layer over an embedded relational engine.
//!
//! This crate is the engine-independent core of the reldoc project and
//! provides:
//!
//! - **Document model** ([`document`]) - JSON documents, reserved keys, id
//!   generation and the typed [`Document`](document::Document) trait
//! - **Schemas** ([`schema`]) - Field declarations, compound indexes,
//!   timestamps and user validators
//! - **Filters** ([`filter`]) - The typed filter AST, its structured JSON
//!   surface and the visitor engines translate through
//! - **Partial updates** ([`update`], [`merge`]) - Deep-merge update
//!   payloads with an explicit clear sentinel
//! - **Orchestration** ([`collection`], [`store`]) - CRUD and upsert
//!   semantics over any [`StorageEngine`](backend::StorageEngine)
//! - **Resilience** ([`retry`], [`transaction`]) - Layered retry policies,
//!   cancellation and drop-safe transactions
//! - **Change events** ([`events`]) - Post-commit notifications per write
//!
//! # Example
//!
//! ```ignore
//! use reldoc_core::filter::Filter;
//! use reldoc_core::schema::{FieldDef, FieldType, Schema};
//! use reldoc_core::store::DocumentStore;
//! use serde_json::json;
//!
//! # async fn example(engine: impl reldoc_core::backend::StorageEngine) -> reldoc_core::error::Result<()> {
//! let store = DocumentStore::new(engine);
//! let schema = Schema::builder()
//!     .add_field(FieldDef::new("age", FieldType::Integer).indexed())
//!     .build()?;
//! let users = store.collection("users", schema).await?;
//! users.insert_one(json!({"name": "Alice", "age": 30})).await?;
//! let adults = users.find(Some(&Filter::gte("age", 18)), &Default::default()).await?;
//! # Ok(()) }
//! ```

pub mod backend;
pub mod collection;
pub mod document;
pub mod error;
pub mod events;
pub mod filter;
pub mod merge;
pub mod path;
pub mod retry;
pub mod schema;
pub mod store;
pub mod transaction;
pub mod update;
