//! Filter construction and the structured filter surface.
//!
//! Filters exist in two forms: a typed [`Expr`] AST built through the
//! [`Filter`] helper, and the structured JSON surface accepted by
//! [`Expr::parse`], where keys are field paths or `$and`/`$or`/`$not`
//! combinators and values are literals (implicit equality) or operator
//! objects (`$gt`, `$in`, ...). A bare string parses as id equality.
//!
//! Backends consume filters through the [`FilterVisitor`] trait; traversal is
//! strictly document-order so that structurally identical filters translate
//! to byte-identical statements.
//!
//! # Example
//!
//! ```ignore
//! use reldoc::prelude::*;
//! use serde_json::json;
//!
//! let typed = Filter::gte("age", 21).and(Filter::eq("status", "active"));
//! let parsed = Expr::parse(&json!({"age": {"$gte": 21}, "status": "active"}))?;
//! ```

use serde_json::Value;

use crate::document::ID_KEY;
use crate::error::{Error, Result};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort specification: a field (or path) and a direction.
#[derive(Debug, Clone)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Options for `find`-family operations.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<Sort>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl FindOptions {
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(Sort { field: field.into(), direction });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Field comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to.
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Member of a literal list.
    In,
    /// Not a member of a literal list (missing fields match).
    Nin,
}

/// A filter expression for matching documents.
#[derive(Debug, Clone)]
pub enum Expr {
    /// All sub-expressions must match.
    And(Vec<Expr>),
    /// Any sub-expression must match.
    Or(Vec<Expr>),
    /// Inverts the sub-expression.
    Not(Box<Expr>),
    /// Tests presence (or absence) of a path.
    Exists(String, bool),
    /// Field comparison.
    Field {
        /// Field name or dot path.
        field: String,
        op: FieldOp,
        value: Value,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Value) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND, flattening
    /// an existing AND list.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR, flattening an
    /// existing OR list.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression.
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Parses the structured filter surface.
    ///
    /// Keys are visited in document order; unknown `$` operators are a
    /// [`Error::Validation`], never ignored.
    pub fn parse(value: &Value) -> Result<Expr> {
        match value {
            // A bare string is shorthand for id equality.
            Value::String(id) => Ok(Filter::id(id.clone())),
            Value::Object(map) => {
                let mut clauses = Vec::with_capacity(map.len());
                for (key, sub) in map {
                    clauses.push(Self::parse_entry(key, sub)?);
                }
                match clauses.len() {
                    0 => Ok(Expr::And(Vec::new())),
                    1 => Ok(clauses.remove(0)),
                    _ => Ok(Expr::And(clauses)),
                }
            }
            other => Err(Error::Validation {
                operation: "filter".to_string(),
                field: None,
                value: Some(other.clone()),
                message: "filter must be an object or an id string".to_string(),
            }),
        }
    }

    fn parse_entry(key: &str, value: &Value) -> Result<Expr> {
        match key {
            "$and" | "$or" => {
                let items = value.as_array().ok_or_else(|| {
                    Error::validation("filter", format!("{key} expects an array of filters"))
                })?;
                let subs = items.iter().map(Expr::parse).collect::<Result<Vec<_>>>()?;
                if key == "$and" {
                    Ok(Expr::And(subs))
                } else {
                    Ok(Expr::Or(subs))
                }
            }
            "$not" => Ok(Expr::parse(value)?.not()),
            _ if key.starts_with('$') => Err(Error::Validation {
                operation: "filter".to_string(),
                field: Some(key.to_string()),
                value: Some(value.clone()),
                message: format!("unknown filter operator {key:?}"),
            }),
            field => Self::parse_field(field, value),
        }
    }

    fn parse_field(field: &str, value: &Value) -> Result<Expr> {
        let Some(map) = value.as_object() else {
            return Ok(Expr::field(field.to_string(), FieldOp::Eq, value.clone()));
        };
        let operator_object = !map.is_empty() && map.keys().all(|k| k.starts_with('$'));
        if !operator_object {
            // An object literal without operator keys compares by equality.
            if map.keys().any(|k| k.starts_with('$')) {
                return Err(Error::Validation {
                    operation: "filter".to_string(),
                    field: Some(field.to_string()),
                    value: Some(value.clone()),
                    message: "cannot mix operators and literal keys".to_string(),
                });
            }
            return Ok(Expr::field(field.to_string(), FieldOp::Eq, value.clone()));
        }

        // Multiple operators on one field all must hold (implicit AND),
        // in document order.
        let mut clauses = Vec::with_capacity(map.len());
        for (op_key, operand) in map {
            clauses.push(Self::parse_operator(field, op_key, operand)?);
        }
        match clauses.len() {
            1 => Ok(clauses.remove(0)),
            _ => Ok(Expr::And(clauses)),
        }
    }

    fn parse_operator(field: &str, op_key: &str, operand: &Value) -> Result<Expr> {
        let op = match op_key {
            "$eq" => FieldOp::Eq,
            "$ne" => FieldOp::Ne,
            "$gt" => FieldOp::Gt,
            "$gte" => FieldOp::Gte,
            "$lt" => FieldOp::Lt,
            "$lte" => FieldOp::Lte,
            "$in" => FieldOp::In,
            "$nin" => FieldOp::Nin,
            "$exists" => {
                let should_exist = operand.as_bool().ok_or_else(|| {
                    Error::validation("filter", "$exists expects a boolean")
                })?;
                return Ok(Expr::Exists(field.to_string(), should_exist));
            }
            unknown => {
                return Err(Error::Validation {
                    operation: "filter".to_string(),
                    field: Some(field.to_string()),
                    value: Some(operand.clone()),
                    message: format!("unknown filter operator {unknown:?}"),
                })
            }
        };
        if matches!(op, FieldOp::In | FieldOp::Nin) && !operand.is_array() {
            return Err(Error::Validation {
                operation: "filter".to_string(),
                field: Some(field.to_string()),
                value: Some(operand.clone()),
                message: format!("{op_key} expects a literal list"),
            });
        }
        Ok(Expr::field(field.to_string(), op, operand.clone()))
    }

    /// Collects the equality constraints this filter pins down, walking AND
    /// branches only. Used to seed the document inserted by an upsert.
    pub fn equality_constraints(&self) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        self.collect_equalities(&mut out);
        out
    }

    fn collect_equalities(&self, out: &mut Vec<(String, Value)>) {
        match self {
            Expr::And(subs) => {
                for sub in subs {
                    sub.collect_equalities(out);
                }
            }
            Expr::Field { field, op: FieldOp::Eq, value } => {
                out.push((field.clone(), value.clone()));
            }
            _ => {}
        }
    }
}

/// Helper struct for constructing filter expressions.
///
/// # Example
///
/// ```ignore
/// use reldoc::prelude::*;
///
/// let expr = Filter::eq("status", "active").and(Filter::gt("age", 18));
/// ```
pub struct Filter;

impl Filter {
    /// Shorthand for document-id equality.
    pub fn id(id: impl Into<String>) -> Expr {
        Expr::field(ID_KEY.to_string(), FieldOp::Eq, Value::String(id.into()))
    }

    /// Matches documents where the field equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the value.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches documents where the field is greater than the value.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches documents where the field is greater than or equal to the value.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches documents where the field is less than the value.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches documents where the field is less than or equal to the value.
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the field is one of the listed values.
    pub fn is_in(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Value>>) -> Expr {
        let list = values.into_iter().map(Into::into).collect::<Vec<_>>();
        Expr::field(field.into(), FieldOp::In, Value::Array(list))
    }

    /// Matches documents where the field is none of the listed values
    /// (missing fields match).
    pub fn not_in(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Value>>) -> Expr {
        let list = values.into_iter().map(Into::into).collect::<Vec<_>>();
        Expr::field(field.into(), FieldOp::Nin, Value::Array(list))
    }

    /// Matches documents where the path is present.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the path is absent.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// All expressions must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Any expression must match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }
}

/// Visitor for translating filter expressions, implemented by backends.
pub trait FilterVisitor {
    type Output;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output>;
    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output>;
    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Value) -> Result<Self::Output>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, *op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_string_is_id_equality() {
        let expr = Expr::parse(&json!("u1")).unwrap();
        match expr {
            Expr::Field { field, op, value } => {
                assert_eq!(field, "id");
                assert_eq!(op, FieldOp::Eq);
                assert_eq!(value, json!("u1"));
            }
            other => panic!("unexpected expr: {other:?}"),
        }
    }

    #[test]
    fn literal_values_parse_as_equality() {
        let expr = Expr::parse(&json!({"status": "active", "age": 21})).unwrap();
        match expr {
            Expr::And(clauses) => {
                assert_eq!(clauses.len(), 2);
                assert!(matches!(&clauses[0], Expr::Field { field, op: FieldOp::Eq, .. } if field == "status"));
                assert!(matches!(&clauses[1], Expr::Field { field, op: FieldOp::Eq, .. } if field == "age"));
            }
            other => panic!("unexpected expr: {other:?}"),
        }
    }

    #[test]
    fn multiple_operators_on_one_field_are_anded_in_order() {
        let expr = Expr::parse(&json!({"age": {"$gte": 18, "$lt": 65}})).unwrap();
        match expr {
            Expr::And(clauses) => {
                assert!(matches!(&clauses[0], Expr::Field { op: FieldOp::Gte, .. }));
                assert!(matches!(&clauses[1], Expr::Field { op: FieldOp::Lt, .. }));
            }
            other => panic!("unexpected expr: {other:?}"),
        }
    }

    #[test]
    fn combinators_parse_recursively() {
        let expr = Expr::parse(&json!({
            "$or": [{"age": {"$lt": 18}}, {"status": "retired"}],
        }))
        .unwrap();
        assert!(matches!(expr, Expr::Or(ref subs) if subs.len() == 2));

        let negated = Expr::parse(&json!({"$not": {"status": "active"}})).unwrap();
        assert!(matches!(negated, Expr::Not(_)));
    }

    #[test]
    fn unknown_operators_are_rejected() {
        let top = Expr::parse(&json!({"$xor": []}));
        assert!(matches!(top, Err(Error::Validation { .. })));

        let field = Expr::parse(&json!({"age": {"$between": [1, 2]}}));
        assert!(matches!(field, Err(Error::Validation { .. })));
    }

    #[test]
    fn in_requires_a_list() {
        assert!(Expr::parse(&json!({"age": {"$in": 7}})).is_err());
        assert!(Expr::parse(&json!({"age": {"$in": [7, 8]}})).is_ok());
    }

    #[test]
    fn equality_constraints_walk_and_branches() {
        let expr = Expr::parse(&json!({"a": 1, "b": {"$gt": 2}, "c": "x"})).unwrap();
        let pairs = expr.equality_constraints();
        assert_eq!(pairs, vec![("a".to_string(), json!(1)), ("c".to_string(), json!("x"))]);

        // Equality under OR must not seed upserts.
        let or = Expr::parse(&json!({"$or": [{"a": 1}, {"b": 2}]})).unwrap();
        assert!(or.equality_constraints().is_empty());
    }
}
