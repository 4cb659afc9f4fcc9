//! SQLite storage engine.
//!
//! Implements [`StorageEngine`] over rusqlite (bundled). The connection is
//! protected by a `parking_lot::ReentrantMutex<RefCell<Connection>>` so
//! transaction hooks can hold the lock while nested statements re-acquire
//! it on the same thread. All statement text is deterministic for a given
//! schema and filter shape, so `prepare_cached` keeps the hot paths on
//! precompiled statements.

use parking_lot::ReentrantMutex;
use rusqlite::{params, params_from_iter};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use tracing::debug;

use async_trait::async_trait;
use reldoc_core::backend::{StorageEngine, StorageEngineBuilder};
use reldoc_core::document::{CREATED_AT_KEY, ID_KEY, UPDATED_AT_KEY};
use reldoc_core::error::{Error, Result};
use reldoc_core::filter::{Expr, FindOptions};
use reldoc_core::schema::Schema;

use crate::planner::collection_ddl;
use crate::translate::{order_by, predicate};

/// Maps a rusqlite failure to the engine-independent error model.
///
/// Unique-index violations surface the offending index name parsed from
/// SQLite's message; everything else keeps the extended result code so the
/// retry layer can classify it.
fn map_sqlite_err(table: &str, err: rusqlite::Error) -> Error {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            let text = message.unwrap_or_else(|| code.to_string());
            match code.extended_code {
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    // Message shape: "UNIQUE constraint failed: users.f_email"
                    let column = text.rsplit('.').next().unwrap_or_default().trim();
                    let index = column.strip_prefix("f_").unwrap_or(column).to_string();
                    Error::UniqueConstraint {
                        collection: table.to_string(),
                        index,
                        value: Value::Null,
                    }
                }
                _ if code.code == rusqlite::ErrorCode::ConstraintViolation => {
                    Error::Constraint(text)
                }
                _ if matches!(
                    code.code,
                    rusqlite::ErrorCode::CannotOpen | rusqlite::ErrorCode::NotADatabase
                ) =>
                {
                    Error::Connection(text)
                }
                extended => Error::Engine { code: extended, message: text },
            }
        }
        other => Error::Engine {
            code: rusqlite::ffi::SQLITE_ERROR,
            message: other.to_string(),
        },
    }
}

/// Splits a complete document into its stored parts: the id, the body JSON
/// without reserved keys, and the timestamp columns.
fn split_document(
    table: &str,
    document: &Value,
) -> Result<(String, String, Option<i64>, Option<i64>)> {
    let map = document.as_object().ok_or_else(|| Error::Validation {
        operation: "write".to_string(),
        field: None,
        value: Some(document.clone()),
        message: format!("document for {table:?} must be a JSON object"),
    })?;
    let id = map
        .get(ID_KEY)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::validation("write", "document has no string id"))?
        .to_string();
    let created = map.get(CREATED_AT_KEY).and_then(Value::as_i64);
    let updated = map.get(UPDATED_AT_KEY).and_then(Value::as_i64);
    let mut body = map.clone();
    body.remove(ID_KEY);
    body.remove(CREATED_AT_KEY);
    body.remove(UPDATED_AT_KEY);
    let body_text = serde_json::to_string(&Value::Object(body))?;
    Ok((id, body_text, created, updated))
}

/// Reassembles a stored row into a complete document, id first.
fn compose_document(
    timestamps: bool,
    id: String,
    body_text: &str,
    created: Option<i64>,
    updated: Option<i64>,
) -> Result<Value> {
    let body: Map<String, Value> = serde_json::from_str(body_text)?;
    let mut doc = Map::with_capacity(body.len() + 3);
    doc.insert(ID_KEY.to_string(), Value::String(id));
    doc.extend(body);
    if timestamps {
        if let Some(ms) = created {
            doc.insert(CREATED_AT_KEY.to_string(), Value::from(ms));
        }
        if let Some(ms) = updated {
            doc.insert(UPDATED_AT_KEY.to_string(), Value::from(ms));
        }
    }
    Ok(Value::Object(doc))
}

/// Savepoint names are interpolated into SQL, so only identifier
/// characters pass.
fn validate_savepoint_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Transaction(format!("invalid savepoint name {name:?}")))
    }
}

type Row = (String, String, Option<i64>, Option<i64>);

/// An embedded SQLite engine.
pub struct SqliteEngine {
    conn: ReentrantMutex<RefCell<rusqlite::Connection>>,
}

impl std::fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEngine").finish_non_exhaustive()
    }
}

impl SqliteEngine {
    /// Opens a file-backed database with WAL journaling and a busy timeout.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = rusqlite::Connection::open(path.as_ref())
            .map_err(|e| map_sqlite_err("", e))?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            rusqlite::Connection::open_in_memory().map_err(|e| map_sqlite_err("", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )
        .map_err(|e| map_sqlite_err("", e))?;
        Ok(Self { conn: ReentrantMutex::new(RefCell::new(conn)) })
    }

    /// Execute `f` with a shared reference to the underlying connection.
    fn with_conn<F, T>(&self, table: &str, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T>,
    {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        f(&conn).map_err(|e| map_sqlite_err(table, e))
    }

    fn existing_columns(&self, table: &str) -> Result<Vec<String>> {
        self.with_conn(table, |conn| {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
            rows.collect()
        })
    }

    fn select_columns(timestamps: bool) -> &'static str {
        if timestamps {
            "id, body, created_at, updated_at"
        } else {
            "id, body"
        }
    }

    fn read_row(row: &rusqlite::Row<'_>, timestamps: bool) -> rusqlite::Result<Row> {
        let id: String = row.get(0)?;
        let body: String = row.get(1)?;
        let (created, updated) = if timestamps {
            (row.get(2)?, row.get(3)?)
        } else {
            (None, None)
        };
        Ok((id, body, created, updated))
    }
}

#[async_trait]
impl StorageEngine for SqliteEngine {
    async fn init_collection(&self, table: &str, schema: &Schema) -> Result<()> {
        let existing = self.existing_columns(table)?;
        let statements = collection_ddl(table, schema, &existing);
        debug!(table, statements = statements.len(), "planning collection layout");
        self.with_conn(table, |conn| {
            for sql in &statements {
                conn.execute_batch(sql)?;
            }
            Ok(())
        })
    }

    async fn fetch(
        &self,
        table: &str,
        schema: &Schema,
        filter: Option<&Expr>,
        options: &FindOptions,
    ) -> Result<Vec<Value>> {
        let timestamps = schema.timestamps();
        let mut sql = format!(
            "SELECT {} FROM \"{table}\"",
            Self::select_columns(timestamps)
        );
        let mut params: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(expr) = filter {
            let predicate = predicate(schema, expr)?;
            sql.push_str(" WHERE ");
            sql.push_str(&predicate.sql);
            params.extend(predicate.params);
        }
        if let Some(sort) = &options.sort {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_by(schema, sort)?);
        }
        if let Some(limit) = options.limit {
            sql.push_str(" LIMIT ?");
            params.push(rusqlite::types::Value::Integer(limit as i64));
        }
        if let Some(offset) = options.offset {
            // OFFSET requires a LIMIT clause; -1 means unbounded.
            if options.limit.is_none() {
                sql.push_str(" LIMIT -1");
            }
            sql.push_str(" OFFSET ?");
            params.push(rusqlite::types::Value::Integer(offset as i64));
        }

        let rows = self.with_conn(table, |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params), |row| {
                    Self::read_row(row, timestamps)
                })?
                .collect::<rusqlite::Result<Vec<Row>>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(id, body, created, updated)| {
                compose_document(timestamps, id, &body, created, updated)
            })
            .collect()
    }

    async fn insert(&self, table: &str, schema: &Schema, document: &Value) -> Result<()> {
        let (id, body, created, updated) = split_document(table, document)?;
        if schema.timestamps() {
            self.with_conn(table, |conn| {
                let mut stmt = conn.prepare_cached(&format!(
                    "INSERT INTO \"{table}\" (id, body, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)"
                ))?;
                stmt.execute(params![id, body, created, updated])?;
                Ok(())
            })
        } else {
            self.with_conn(table, |conn| {
                let mut stmt = conn.prepare_cached(&format!(
                    "INSERT INTO \"{table}\" (id, body) VALUES (?1, ?2)"
                ))?;
                stmt.execute(params![id, body])?;
                Ok(())
            })
        }
    }

    async fn replace(
        &self,
        table: &str,
        schema: &Schema,
        id: &str,
        document: &Value,
    ) -> Result<bool> {
        let (doc_id, body, created, updated) = split_document(table, document)?;
        if doc_id != id {
            return Err(Error::validation(
                "replace",
                format!("document id {doc_id:?} does not match target {id:?}"),
            ));
        }
        let changed = if schema.timestamps() {
            self.with_conn(table, |conn| {
                let mut stmt = conn.prepare_cached(&format!(
                    "UPDATE \"{table}\" SET body = ?2, created_at = ?3, updated_at = ?4 WHERE id = ?1"
                ))?;
                stmt.execute(params![id, body, created, updated])
            })?
        } else {
            self.with_conn(table, |conn| {
                let mut stmt = conn.prepare_cached(&format!(
                    "UPDATE \"{table}\" SET body = ?2 WHERE id = ?1"
                ))?;
                stmt.execute(params![id, body])
            })?
        };
        Ok(changed > 0)
    }

    async fn delete_by_id(&self, table: &str, id: &str) -> Result<bool> {
        let deleted = self.with_conn(table, |conn| {
            let mut stmt =
                conn.prepare_cached(&format!("DELETE FROM \"{table}\" WHERE id = ?1"))?;
            stmt.execute(params![id])
        })?;
        Ok(deleted > 0)
    }

    async fn delete_where(
        &self,
        table: &str,
        schema: &Schema,
        filter: Option<&Expr>,
    ) -> Result<usize> {
        let mut sql = format!("DELETE FROM \"{table}\"");
        let mut params: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(expr) = filter {
            let predicate = predicate(schema, expr)?;
            sql.push_str(" WHERE ");
            sql.push_str(&predicate.sql);
            params.extend(predicate.params);
        }
        self.with_conn(table, |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            stmt.execute(params_from_iter(params))
        })
    }

    async fn drop_collection(&self, table: &str) -> Result<()> {
        self.with_conn(table, |conn| {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{table}\""))
        })
    }

    fn begin_transaction(&self) -> Result<()> {
        self.with_conn("", |conn| conn.execute_batch("BEGIN IMMEDIATE"))
    }

    fn commit_transaction(&self) -> Result<()> {
        self.with_conn("", |conn| conn.execute_batch("COMMIT"))
    }

    fn rollback_transaction(&self) -> Result<()> {
        self.with_conn("", |conn| conn.execute_batch("ROLLBACK"))
    }

    fn begin_savepoint(&self, name: &str) -> Result<()> {
        validate_savepoint_name(name)?;
        self.with_conn("", |conn| conn.execute_batch(&format!("SAVEPOINT {name}")))
    }

    fn release_savepoint(&self, name: &str) -> Result<()> {
        validate_savepoint_name(name)?;
        self.with_conn("", |conn| {
            conn.execute_batch(&format!("RELEASE SAVEPOINT {name}"))
        })
    }

    fn rollback_savepoint(&self, name: &str) -> Result<()> {
        validate_savepoint_name(name)?;
        self.with_conn("", |conn| {
            conn.execute_batch(&format!("ROLLBACK TO SAVEPOINT {name}"))
        })
    }
}

/// Builder for [`SqliteEngine`].
#[derive(Debug, Clone, Default)]
pub struct SqliteEngineBuilder {
    path: Option<PathBuf>,
}

impl SqliteEngineBuilder {
    /// A file-backed database at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self { path: Some(path.into()) }
    }

    /// An in-memory database.
    pub fn memory() -> Self {
        Self { path: None }
    }
}

#[async_trait]
impl StorageEngineBuilder for SqliteEngineBuilder {
    type Engine = SqliteEngine;

    async fn build(self) -> Result<SqliteEngine> {
        match self.path {
            Some(path) => SqliteEngine::open(path),
            None => SqliteEngine::open_in_memory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reldoc_core::filter::Filter;
    use reldoc_core::schema::{FieldDef, FieldType};
    use serde_json::json;

    fn user_schema() -> Schema {
        Schema::builder()
            .add_field(FieldDef::new("email", FieldType::Text).unique())
            .add_field(FieldDef::new("age", FieldType::Integer).indexed())
            .timestamps(true)
            .build()
            .unwrap()
    }

    async fn engine_with_users() -> (SqliteEngine, Schema) {
        let engine = SqliteEngine::open_in_memory().unwrap();
        let schema = user_schema();
        engine.init_collection("users", &schema).await.unwrap();
        (engine, schema)
    }

    fn alice() -> Value {
        json!({
            "id": "u1",
            "email": "alice@example.com",
            "age": 30,
            "createdAt": 1000,
            "updatedAt": 1000,
        })
    }

    #[tokio::test]
    async fn insert_and_fetch_roundtrip() {
        let (engine, schema) = engine_with_users().await;
        engine.insert("users", &schema, &alice()).await.unwrap();

        let found = engine
            .fetch("users", &schema, Some(&Filter::gte("age", 21)), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], "u1");
        assert_eq!(found[0]["email"], "alice@example.com");
        assert_eq!(found[0]["createdAt"], 1000);
    }

    #[tokio::test]
    async fn init_collection_is_idempotent() {
        let (engine, schema) = engine_with_users().await;
        engine.insert("users", &schema, &alice()).await.unwrap();
        engine.init_collection("users", &schema).await.unwrap();

        let found = engine
            .fetch("users", &schema, None, &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn unique_violation_names_the_index() {
        let (engine, schema) = engine_with_users().await;
        engine.insert("users", &schema, &alice()).await.unwrap();

        let mut duplicate = alice();
        duplicate["id"] = json!("u2");
        let err = engine.insert("users", &schema, &duplicate).await.unwrap_err();
        match err {
            Error::UniqueConstraint { collection, index, .. } => {
                assert_eq!(collection, "users");
                assert_eq!(index, "email");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn replace_reports_missing_rows() {
        let (engine, schema) = engine_with_users().await;
        let replaced = engine
            .replace("users", &schema, "ghost", &json!({"id": "ghost", "age": 1}))
            .await
            .unwrap();
        assert!(!replaced);
    }

    #[tokio::test]
    async fn savepoint_rollback_restores_state() {
        let (engine, schema) = engine_with_users().await;
        engine.begin_savepoint("sp_test").unwrap();
        engine.insert("users", &schema, &alice()).await.unwrap();
        engine.rollback_savepoint("sp_test").unwrap();
        engine.release_savepoint("sp_test").unwrap();

        let found = engine
            .fetch("users", &schema, None, &FindOptions::default())
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn transaction_rollback_discards_writes() {
        let (engine, schema) = engine_with_users().await;
        engine.begin_transaction().unwrap();
        engine.insert("users", &schema, &alice()).await.unwrap();
        engine.rollback_transaction().unwrap();

        let found = engine
            .fetch("users", &schema, None, &FindOptions::default())
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
