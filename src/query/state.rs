//! Accumulated query state.
//!
//! A [`QueryState`] is owned by exactly one [`crate::QueryBuilder`]. It records
//! fluent operations in call order and is read-only while being rendered.

use serde::{Deserialize, Serialize};

use crate::expr::{Expr, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    #[default]
    Tracking,
    NoTracking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub key: Expr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectItem {
    pub expr: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// One eager-loading chain: `include("orders")` followed by
/// `then_include("lines")` yields `["orders", "lines"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncludePath {
    pub segments: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinTarget {
    /// Another builder's state, joined on `left_key = right_key`.
    Query {
        state: Box<QueryState>,
        alias: String,
        left_key: Expr,
        right_key: Expr,
    },
    /// A table with a verbatim `ON` condition.
    Raw {
        table: String,
        alias: Option<String>,
        condition: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    pub target: JoinTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    Use,
    Force,
    Ignore,
}

impl IndexMode {
    pub fn keyword(&self) -> &'static str {
        match self {
            IndexMode::Use => "USE INDEX",
            IndexMode::Force => "FORCE INDEX",
            IndexMode::Ignore => "IGNORE INDEX",
        }
    }
}

/// Index hint. Carrying the mode next to the name makes "mode without name"
/// unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexHint {
    pub name: String,
    pub mode: IndexMode,
}

/// Execution hints attached to a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hints {
    /// Advisory statement timeout for the transport.
    pub timeout_seconds: Option<u32>,
    pub index: Option<IndexHint>,
    pub lock_hint: Option<String>,
    /// Engine row hint; unrelated to `take`.
    pub max_rows: Option<u64>,
    /// Bypass the SQL/plan cache for this execution.
    pub no_cache: bool,
    pub optimizer_hints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSql {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Everything a builder has accumulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryState {
    pub entity_type: String,
    #[serde(default)]
    pub wheres: Vec<Expr>,
    #[serde(default)]
    pub selects: Vec<SelectItem>,
    #[serde(default)]
    pub includes: Vec<IncludePath>,
    #[serde(default)]
    pub order_bys: Vec<OrderBy>,
    #[serde(default)]
    pub group_bys: Vec<Expr>,
    #[serde(default)]
    pub joins: Vec<Join>,
    #[serde(default)]
    pub skip: Option<u64>,
    #[serde(default)]
    pub take: Option<u64>,
    #[serde(default)]
    pub tracking: TrackingMode,
    #[serde(default)]
    pub hints: Hints,
    /// Full SQL override; when set, the structured fields are not rendered.
    #[serde(default)]
    pub raw_sql: Option<RawSql>,
}

impl QueryState {
    pub fn new(entity_type: impl Into<String>, tracking: TrackingMode) -> Self {
        Self {
            entity_type: entity_type.into(),
            wheres: Vec::new(),
            selects: Vec::new(),
            includes: Vec::new(),
            order_bys: Vec::new(),
            group_bys: Vec::new(),
            joins: Vec::new(),
            skip: None,
            take: None,
            tracking,
            hints: Hints::default(),
            raw_sql: None,
        }
    }

    /// True when the state renders as a bare `SELECT * FROM table`.
    pub fn is_plain(&self) -> bool {
        self.wheres.is_empty()
            && self.selects.is_empty()
            && self.order_bys.is_empty()
            && self.group_bys.is_empty()
            && self.joins.is_empty()
            && self.skip.is_none()
            && self.take.is_none()
            && self.raw_sql.is_none()
    }

    pub fn is_paginated(&self) -> bool {
        self.skip.is_some() || self.take.is_some()
    }

    /// True when any part of the statement comes from caller-supplied SQL text.
    pub fn uses_raw_sql(&self) -> bool {
        self.raw_sql.is_some()
            || self.wheres.iter().any(Expr::contains_raw)
            || self.selects.iter().any(|s| s.expr.contains_raw())
            || self.joins.iter().any(|j| match &j.target {
                JoinTarget::Raw { .. } => true,
                JoinTarget::Query { state, .. } => state.uses_raw_sql(),
            })
    }
}
