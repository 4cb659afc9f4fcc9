//! Filter expression to SQL predicate translation.
//!
//! Implements the core [`FilterVisitor`] over the physical layout the
//! planner creates: declared fields resolve to their generated columns (so
//! the indexes apply), reserved keys resolve to real columns, and anything
//! else falls back to a `json_extract` on the body.
//!
//! Translation is deterministic: expression traversal follows document
//! order, so a structurally identical filter always produces the same SQL
//! text and hits the connection's prepared-statement cache.

use serde_json::Value;

use reldoc_core::document::{CREATED_AT_KEY, ID_KEY, UPDATED_AT_KEY};
use reldoc_core::error::{Error, Result};
use reldoc_core::filter::{Expr, FieldOp, FilterVisitor, Sort, SortDirection};
use reldoc_core::path::JsonPath;
use reldoc_core::schema::Schema;

use crate::planner::field_column;

/// A translated predicate: SQL text with positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlPredicate {
    pub sql: String,
    pub params: Vec<rusqlite::types::Value>,
}

/// Translates a filter expression against `schema`.
pub fn predicate(schema: &Schema, expr: &Expr) -> Result<SqlPredicate> {
    PredicateBuilder { schema }.visit_expr(expr)
}

/// Resolves the ORDER BY target for a sort specification.
pub fn order_by(schema: &Schema, sort: &Sort) -> Result<String> {
    let target = resolve_target(schema, &sort.field)?;
    let direction = match sort.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    Ok(format!("{target} {direction}"))
}

/// Converts a JSON literal to a SQL parameter.
///
/// Objects and arrays compare against their serialized form, matching how
/// `json_extract` surfaces them.
fn json_value_to_sql(v: &Value) -> rusqlite::types::Value {
    match v {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                rusqlite::types::Value::Integer(i)
            } else {
                rusqlite::types::Value::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        other => rusqlite::types::Value::Text(other.to_string()),
    }
}

/// Maps a logical field reference to the SQL expression that reads it.
fn resolve_target(schema: &Schema, field: &str) -> Result<String> {
    if field == ID_KEY {
        return Ok("id".to_string());
    }
    if schema.timestamps() {
        if field == CREATED_AT_KEY {
            return Ok("created_at".to_string());
        }
        if field == UPDATED_AT_KEY {
            return Ok("updated_at".to_string());
        }
    }
    if let Some(schema_field) = schema.field(field) {
        return Ok(format!("\"{}\"", field_column(&schema_field.name)));
    }
    let path = parse_filter_path(field)?;
    // A path that spells out a declared field's extraction still uses the
    // generated column.
    if let Some(schema_field) = schema.fields().iter().find(|f| f.path == path) {
        return Ok(format!("\"{}\"", field_column(&schema_field.name)));
    }
    Ok(format!("json_extract(body, '{}')", path.as_str()))
}

/// The JSON path a field reference probes for `$exists`, which must see the
/// body directly: a generated column cannot distinguish an explicit null
/// from an absent key, `json_type` can.
fn resolve_probe_path(schema: &Schema, field: &str) -> Result<Option<JsonPath>> {
    if field == ID_KEY
        || (schema.timestamps() && (field == CREATED_AT_KEY || field == UPDATED_AT_KEY))
    {
        return Ok(None);
    }
    if let Some(schema_field) = schema.field(field) {
        return Ok(Some(schema_field.path.clone()));
    }
    Ok(Some(parse_filter_path(field)?))
}

fn parse_filter_path(field: &str) -> Result<JsonPath> {
    JsonPath::normalize(field).map_err(|message| Error::Validation {
        operation: "filter".to_string(),
        field: Some(field.to_string()),
        value: None,
        message,
    })
}

struct PredicateBuilder<'a> {
    schema: &'a Schema,
}

impl PredicateBuilder<'_> {
    fn join(&mut self, exprs: &[Expr], joiner: &str, empty: &str) -> Result<SqlPredicate> {
        if exprs.is_empty() {
            return Ok(SqlPredicate { sql: empty.to_string(), params: Vec::new() });
        }
        let mut parts = Vec::with_capacity(exprs.len());
        let mut params = Vec::new();
        for expr in exprs {
            let sub = self.visit_expr(expr)?;
            parts.push(format!("({})", sub.sql));
            params.extend(sub.params);
        }
        Ok(SqlPredicate { sql: parts.join(joiner), params })
    }
}

impl FilterVisitor for PredicateBuilder<'_> {
    type Output = SqlPredicate;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<SqlPredicate> {
        self.join(exprs, " AND ", "1=1")
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<SqlPredicate> {
        self.join(exprs, " OR ", "0=1")
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<SqlPredicate> {
        let sub = self.visit_expr(expr)?;
        Ok(SqlPredicate { sql: format!("NOT ({})", sub.sql), params: sub.params })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<SqlPredicate> {
        let sql = match resolve_probe_path(self.schema, field)? {
            Some(path) => {
                let probe = format!("json_type(body, '{}')", path.as_str());
                if should_exist {
                    format!("{probe} IS NOT NULL")
                } else {
                    format!("{probe} IS NULL")
                }
            }
            // Reserved keys always exist on stored rows.
            None => String::from(if should_exist { "1=1" } else { "0=1" }),
        };
        Ok(SqlPredicate { sql, params: Vec::new() })
    }

    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Value) -> Result<SqlPredicate> {
        let target = resolve_target(self.schema, field)?;
        let predicate = match op {
            // IS compares null-safely, so Eq against null matches missing
            // and null alike.
            FieldOp::Eq => SqlPredicate {
                sql: format!("{target} IS ?"),
                params: vec![json_value_to_sql(value)],
            },
            FieldOp::Ne => SqlPredicate {
                sql: format!("{target} IS NOT ?"),
                params: vec![json_value_to_sql(value)],
            },
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                let symbol = match op {
                    FieldOp::Gt => ">",
                    FieldOp::Gte => ">=",
                    FieldOp::Lt => "<",
                    _ => "<=",
                };
                SqlPredicate {
                    sql: format!("{target} {symbol} ?"),
                    params: vec![json_value_to_sql(value)],
                }
            }
            FieldOp::In | FieldOp::Nin => {
                let items = value.as_array().ok_or_else(|| {
                    Error::validation("filter", "list operator expects an array")
                })?;
                if items.is_empty() {
                    // Nothing is in the empty list; everything is outside it.
                    let sql = if op == FieldOp::In { "0=1" } else { "1=1" };
                    return Ok(SqlPredicate { sql: sql.to_string(), params: Vec::new() });
                }
                let placeholders = items.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
                let params = items.iter().map(json_value_to_sql).collect();
                if op == FieldOp::In {
                    SqlPredicate { sql: format!("{target} IN ({placeholders})"), params }
                } else {
                    // Missing and null values are outside any list.
                    SqlPredicate {
                        sql: format!("({target} NOT IN ({placeholders}) OR {target} IS NULL)"),
                        params,
                    }
                }
            }
        };
        Ok(predicate)
    }
}
