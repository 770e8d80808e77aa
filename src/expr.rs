//! Expression trees for predicates, projections, grouping and ordering keys.
//!
//! Expressions are plain data: they can be compared, serialized and hashed
//! into a cache fingerprint, and are rendered to SQL by [`crate::query::render`].
//!
//! ```
//! use sqlforge::expr::{col, Expr};
//!
//! let adults = col("age").gte(18).and(col("status").eq("active"));
//! assert!(matches!(adults, Expr::And(_)));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A literal operand, bound as a statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(serde_json::Value),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Convert a JSON cell (as returned in a [`crate::Row`]) back into a bindable value.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            other => Value::Json(other.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }
}

/// A node in a predicate / projection tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// `*`
    Star,
    /// Column reference, optionally qualified (`orders.total`).
    Column(String),
    /// Bound literal.
    Value(Value),
    /// Raw SQL fragment with `?` placeholders for `params`.
    Raw { sql: String, params: Vec<Value> },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    Aggregate { func: AggregateFunc, arg: Box<Expr> },
}

/// Column reference.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// Bound literal.
pub fn val(value: impl Into<Value>) -> Expr {
    Expr::Value(value.into())
}

/// Raw SQL fragment. `?` marks a parameter slot.
pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Expr {
    Expr::Raw {
        sql: sql.into(),
        params,
    }
}

/// `COUNT(*)`
pub fn count_all() -> Expr {
    Expr::Aggregate {
        func: AggregateFunc::Count,
        arg: Box::new(Expr::Star),
    }
}

pub fn aggregate(func: AggregateFunc, arg: impl Into<Expr>) -> Expr {
    Expr::Aggregate {
        func,
        arg: Box::new(arg.into()),
    }
}

impl Expr {
    pub fn binary(left: impl Into<Expr>, op: BinaryOp, right: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(left.into()),
            op,
            right: Box::new(right.into()),
        }
    }

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        Self::binary(self, BinaryOp::Eq, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Self {
        Self::binary(self, BinaryOp::Ne, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Self {
        Self::binary(self, BinaryOp::Gt, other)
    }

    pub fn gte(self, other: impl Into<Expr>) -> Self {
        Self::binary(self, BinaryOp::Gte, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Self {
        Self::binary(self, BinaryOp::Lt, other)
    }

    pub fn lte(self, other: impl Into<Expr>) -> Self {
        Self::binary(self, BinaryOp::Lte, other)
    }

    /// Conjunction; flattens nested `And` nodes.
    pub fn and(self, other: impl Into<Expr>) -> Self {
        let mut parts = match self {
            Expr::And(parts) => parts,
            e => vec![e],
        };
        match other.into() {
            Expr::And(more) => parts.extend(more),
            e => parts.push(e),
        }
        Expr::And(parts)
    }

    /// Disjunction; flattens nested `Or` nodes.
    pub fn or(self, other: impl Into<Expr>) -> Self {
        let mut parts = match self {
            Expr::Or(parts) => parts,
            e => vec![e],
        };
        match other.into() {
            Expr::Or(more) => parts.extend(more),
            e => parts.push(e),
        }
        Expr::Or(parts)
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull(Box::new(self))
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNotNull(Box::new(self))
    }

    pub fn in_list<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Expr>,
    {
        Expr::InList {
            expr: Box::new(self),
            list: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Expr>,
    {
        Expr::InList {
            expr: Box::new(self),
            list: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn like(self, pattern: impl Into<Expr>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: Box::new(pattern.into()),
            negated: false,
        }
    }

    pub fn not_like(self, pattern: impl Into<Expr>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: Box::new(pattern.into()),
            negated: true,
        }
    }

    /// True when this node (or any child) is a raw SQL fragment.
    pub fn contains_raw(&self) -> bool {
        match self {
            Expr::Raw { .. } => true,
            Expr::Star | Expr::Column(_) | Expr::Value(_) => false,
            Expr::Binary { left, right, .. } => left.contains_raw() || right.contains_raw(),
            Expr::And(parts) | Expr::Or(parts) => parts.iter().any(Expr::contains_raw),
            Expr::Not(e) | Expr::IsNull(e) | Expr::IsNotNull(e) => e.contains_raw(),
            Expr::InList { expr, list, .. } => {
                expr.contains_raw() || list.iter().any(Expr::contains_raw)
            }
            Expr::Like { expr, pattern, .. } => expr.contains_raw() || pattern.contains_raw(),
            Expr::Aggregate { arg, .. } => arg.contains_raw(),
        }
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        match self {
            Expr::Not(inner) => *inner,
            e => Expr::Not(Box::new(e)),
        }
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Value(v)
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::Value(v.into())
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::Value(v.into())
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::Value(v.into())
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Value(v.into())
    }
}

/// String literals become bound values; use [`col`] for column references.
impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Expr::Value(v.into())
    }
}

impl From<String> for Expr {
    fn from(v: String) -> Self {
        Expr::Value(v.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_flattens() {
        let e = col("a").eq(1).and(col("b").eq(2)).and(col("c").eq(3));
        match e {
            Expr::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_double_negation_cancels() {
        let e = col("a").eq(1);
        assert_eq!(!!e.clone(), e);
    }

    #[test]
    fn test_contains_raw() {
        assert!(!col("a").eq(1).contains_raw());
        assert!(col("a").eq(1).or(raw("b = ?", vec![2.into()])).contains_raw());
    }

    #[test]
    fn test_value_from_json() {
        assert_eq!(Value::from_json(&serde_json::json!(7)), Value::Int(7));
        assert_eq!(Value::from_json(&serde_json::json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from_json(&serde_json::json!("x")), Value::String("x".into()));
        assert_eq!(Value::from_json(&serde_json::Value::Null), Value::Null);
    }
}
