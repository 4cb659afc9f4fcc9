//! SQLite engine for the reldoc document layer.
//!
//! Maps each collection to one table: a `TEXT` primary key, the canonical
//! JSON body, timestamp columns when the schema enables them, and a virtual
//! generated column per declared field so declared-field filters run
//! against real indexes.
//!
//! - [`engine`] - The [`SqliteEngine`](engine::SqliteEngine) connection
//!   wrapper and its [`StorageEngine`](reldoc_core::backend::StorageEngine)
//!   implementation
//! - [`planner`] - Schema to idempotent DDL
//! - [`translate`] - Filter expressions to SQL predicates

pub mod engine;
pub mod planner;
pub mod translate;

pub use engine::{SqliteEngine, SqliteEngineBuilder};
