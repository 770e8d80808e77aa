//! The connection boundary.
//!
//! The core never talks to a database directly. A [`Connection`] reports its
//! driver identifier and runs statements; everything else (pooling, transport,
//! transactions) lives behind it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dialect::Dialect;
use crate::error::{QueryError, QueryResult};
use crate::expr::Value;

/// A result row, column name to JSON value.
pub type Row = HashMap<String, serde_json::Value>;

/// Final SQL, its bound parameters and the transport-level hints.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    /// Advisory; the connection decides how to enforce it.
    pub timeout_seconds: Option<u32>,
    pub max_rows: Option<u64>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
            timeout_seconds: None,
            max_rows: None,
        }
    }
}

/// Execution plan as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub sql: String,
    pub steps: Vec<Row>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Timing and size of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub sql: String,
    pub row_count: usize,
    pub execution_time_ms: f64,
    pub executed_at: DateTime<Utc>,
}

/// A database the core can run statements against.
pub trait Connection: Send + Sync {
    /// Driver identifier (`mysql`, `pgsql`, `sqlsrv`, `sqlite3`, ...).
    fn driver(&self) -> &str;

    /// Run a statement and return its rows.
    fn query(&self, statement: &Statement) -> QueryResult<Vec<Row>>;

    /// Ask the engine for the plan of `statement`.
    ///
    /// The default runs the dialect's EXPLAIN form through [`Connection::query`]
    /// and reports the rows untouched. Drivers without an EXPLAIN form get an
    /// empty plan carrying a warning.
    fn explain(&self, statement: &Statement) -> QueryResult<QueryPlan> {
        let dialect = Dialect::from_driver(self.driver());
        let Some(prefix) = dialect.explain_prefix() else {
            warn!(driver = self.driver(), "no plan facility for driver");
            return Ok(QueryPlan {
                sql: statement.sql.clone(),
                warnings: vec![format!(
                    "plan analysis is not available for driver '{}'",
                    self.driver()
                )],
                ..QueryPlan::default()
            });
        };

        let explain = Statement {
            sql: format!("{}{}", prefix, statement.sql),
            ..statement.clone()
        };
        let steps = self.query(&explain)?;
        Ok(QueryPlan {
            sql: statement.sql.clone(),
            steps,
            ..QueryPlan::default()
        })
    }
}

/// A connection that only knows its driver. Useful for rendering SQL offline.
#[derive(Debug, Clone)]
pub struct OfflineConnection {
    driver: String,
}

impl OfflineConnection {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
        }
    }
}

impl Connection for OfflineConnection {
    fn driver(&self) -> &str {
        &self.driver
    }

    fn query(&self, _statement: &Statement) -> QueryResult<Vec<Row>> {
        Err(QueryError::Connection(format!(
            "offline '{}' connection cannot execute statements",
            self.driver
        )))
    }
}
