//! Convenient re-exports of commonly used types from reldoc.
//!
//! ```ignore
//! use reldoc::prelude::*;
//! ```
//!
//! This provides access to the store and collection interfaces, schema
//! construction, filter and update builders, retry configuration and the
//! error types.

pub use reldoc_core::{
    backend::{StorageEngine, StorageEngineBuilder},
    collection::{
        Collection, InsertManyOptions, InsertManyOutcome, ModifyOptions, ReplaceOptions,
        ReturnDocument, UpdateOptions, UpdateResult,
    },
    document::{Document, DocumentExt, IdGenerator},
    error::{BatchError, Error, Result},
    events::{ChangeEvent, ChangeKind},
    filter::{Expr, FieldOp, Filter, FindOptions, Sort, SortDirection},
    retry::{CallOptions, CancellationToken, RetryOptions, RetryPolicy},
    schema::{CompoundIndex, FieldDef, FieldType, Schema, SchemaBuilder, Validator},
    store::DocumentStore,
    transaction::{Transaction, TransactionState},
    update::{Patch, Update},
};
