//! Fluent query composition and terminal execution.
//!
//! Composition methods take `self` and return it, so calls chain left to
//! right and accumulate into the builder's [`QueryState`]. Terminal methods
//! borrow the builder, render the state for the context's dialect and run it
//! through the connection.

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use crate::cache::{QuerySummary, SqlCache};
use crate::connection::{ExecutionStats, QueryPlan, Row, Statement};
use crate::context::DbContext;
use crate::dialect::Dialect;
use crate::error::{QueryError, QueryResult};
use crate::expr::{AggregateFunc, Expr, Value, raw};
use crate::hints::{HintInjector, normalize_lock_hint};
use crate::loader;
use crate::query::render::{AGGREGATE_ALIAS, Projection, RenderedSql, Renderer};
use crate::query::state::{
    IncludePath, IndexHint, IndexMode, Join, JoinKind, JoinTarget, OrderBy, QueryState, RawSql,
    SelectItem, SortDirection, TrackingMode,
};

/// A query under composition against one entity.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    ctx: DbContext,
    state: QueryState,
}

impl QueryBuilder {
    pub fn new(ctx: &DbContext, entity: impl Into<String>) -> Self {
        Self {
            ctx: ctx.clone(),
            state: QueryState::new(entity, ctx.default_tracking()),
        }
    }

    /// Resume composition from previously accumulated state.
    pub fn from_state(ctx: &DbContext, state: QueryState) -> Self {
        Self {
            ctx: ctx.clone(),
            state,
        }
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn into_state(self) -> QueryState {
        self.state
    }

    pub fn context(&self) -> &DbContext {
        &self.ctx
    }

    pub fn dialect(&self) -> Dialect {
        self.ctx.dialect()
    }

    // ---- filtering & projection -------------------------------------------------

    /// Add a predicate. Predicates are ANDed in call order.
    #[doc(alias = "where")]
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.state.wheres.push(predicate);
        self
    }

    /// Add a raw predicate; `?` marks each parameter slot.
    #[doc(alias = "whereRaw")]
    pub fn filter_raw(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.state.wheres.push(raw(sql, params));
        self
    }

    pub fn select(mut self, expr: Expr) -> Self {
        self.state.selects.push(SelectItem { expr, alias: None });
        self
    }

    pub fn select_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.state.selects.push(SelectItem {
            expr,
            alias: Some(alias.into()),
        });
        self
    }

    pub fn select_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .selects
            .extend(columns.into_iter().map(|c| SelectItem {
                expr: Expr::Column(c.into()),
                alias: None,
            }));
        self
    }

    pub fn select_raw(self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.select(raw(sql, params))
    }

    pub fn select_raw_as(
        self,
        sql: impl Into<String>,
        params: Vec<Value>,
        alias: impl Into<String>,
    ) -> Self {
        self.select_as(raw(sql, params), alias)
    }

    /// Replace structured rendering with a full SQL statement.
    pub fn from_sql_raw(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.state.raw_sql = Some(RawSql {
            sql: sql.into(),
            params,
        });
        self
    }

    // ---- eager loading ------------------------------------------------------------

    pub fn include(mut self, navigation: impl Into<String>) -> Self {
        self.state.includes.push(IncludePath {
            segments: vec![navigation.into()],
        });
        self
    }

    /// Extend the most recent include with a nested navigation.
    pub fn then_include(mut self, navigation: impl Into<String>) -> Self {
        if self.state.includes.is_empty() {
            return self.include(navigation);
        }
        if let Some(path) = self.state.includes.last_mut() {
            path.segments.push(navigation.into());
        }
        self
    }

    // ---- ordering, grouping, pagination ------------------------------------------

    /// Primary order; replaces any ordering added before.
    pub fn order_by(mut self, key: Expr) -> Self {
        self.state.order_bys.clear();
        self.then_order_by(key)
    }

    pub fn order_by_desc(mut self, key: Expr) -> Self {
        self.state.order_bys.clear();
        self.then_order_by_desc(key)
    }

    /// Secondary order, applied after the orders already declared.
    pub fn then_order_by(mut self, key: Expr) -> Self {
        self.state.order_bys.push(OrderBy {
            key,
            direction: SortDirection::Ascending,
        });
        self
    }

    pub fn then_order_by_desc(mut self, key: Expr) -> Self {
        self.state.order_bys.push(OrderBy {
            key,
            direction: SortDirection::Descending,
        });
        self
    }

    pub fn group_by(mut self, key: Expr) -> Self {
        self.state.group_bys.push(key);
        self
    }

    pub fn skip(mut self, count: u64) -> Self {
        self.state.skip = Some(count);
        self
    }

    /// Limit the result; `take(0)` always yields no rows.
    pub fn take(mut self, count: u64) -> Self {
        self.state.take = Some(count);
        self
    }

    // ---- joins -----------------------------------------------------------------------

    /// `INNER JOIN` another query, aliased `alias`, on `left_key = right_key`.
    pub fn join(
        self,
        other: QueryBuilder,
        alias: impl Into<String>,
        left_key: Expr,
        right_key: Expr,
    ) -> Self {
        self.push_query_join(JoinKind::Inner, other, alias.into(), left_key, right_key)
    }

    pub fn left_join(
        self,
        other: QueryBuilder,
        alias: impl Into<String>,
        left_key: Expr,
        right_key: Expr,
    ) -> Self {
        self.push_query_join(JoinKind::Left, other, alias.into(), left_key, right_key)
    }

    /// Join a table with a verbatim `ON` condition.
    pub fn join_raw(
        mut self,
        kind: JoinKind,
        table: impl Into<String>,
        alias: Option<&str>,
        condition: impl Into<String>,
    ) -> Self {
        self.state.joins.push(Join {
            kind,
            target: JoinTarget::Raw {
                table: table.into(),
                alias: alias.map(str::to_string),
                condition: condition.into(),
            },
        });
        self
    }

    fn push_query_join(
        mut self,
        kind: JoinKind,
        other: QueryBuilder,
        alias: String,
        left_key: Expr,
        right_key: Expr,
    ) -> Self {
        self.state.joins.push(Join {
            kind,
            target: JoinTarget::Query {
                state: Box::new(other.state),
                alias,
                left_key,
                right_key,
            },
        });
        self
    }

    // ---- tracking --------------------------------------------------------------------

    pub fn as_no_tracking(mut self) -> Self {
        self.state.tracking = TrackingMode::NoTracking;
        self
    }

    pub fn as_tracking(mut self) -> Self {
        self.state.tracking = TrackingMode::Tracking;
        self
    }

    // ---- hints ---------------------------------------------------------------------

    pub fn timeout(mut self, seconds: u32) -> Self {
        self.state.hints.timeout_seconds = Some(seconds);
        self
    }

    pub fn use_index(self, name: impl Into<String>) -> Self {
        self.index_hint(name.into(), IndexMode::Use)
    }

    pub fn force_index(self, name: impl Into<String>) -> Self {
        self.index_hint(name.into(), IndexMode::Force)
    }

    pub fn ignore_index(self, name: impl Into<String>) -> Self {
        self.index_hint(name.into(), IndexMode::Ignore)
    }

    fn index_hint(mut self, name: String, mode: IndexMode) -> Self {
        self.state.hints.index = Some(IndexHint { name, mode });
        self
    }

    /// Table lock hint (SQL Server). Known hints are normalized to upper case.
    pub fn with_lock(mut self, hint: &str) -> Self {
        self.state.hints.lock_hint = Some(normalize_lock_hint(hint));
        self
    }

    pub fn max_rows(mut self, rows: u64) -> Self {
        self.state.hints.max_rows = Some(rows);
        self
    }

    /// Bypass the SQL/plan cache for this query.
    pub fn no_cache(mut self) -> Self {
        self.state.hints.no_cache = true;
        self
    }

    pub fn optimizer_hint(mut self, hint: impl Into<String>) -> Self {
        self.state.hints.optimizer_hints.push(hint.into());
        self
    }

    // ---- terminal operations --------------------------------------------------------

    /// Final SQL, hints included.
    pub fn to_sql(&self) -> String {
        self.prepare(&self.state, &Projection::Rows).sql
    }

    /// Final SQL with its bound parameters and transport hints.
    pub fn to_statement(&self) -> Statement {
        self.prepare(&self.state, &Projection::Rows)
    }

    pub fn to_list(&self) -> QueryResult<Vec<Row>> {
        let rows = self.fetch(&self.state, &Projection::Rows)?;
        self.materialize(&self.state, rows)
    }

    /// First row under the active ORDER BY, or the connection's natural row
    /// order when none is declared. Never fails on zero or many rows.
    pub fn first(&self) -> QueryResult<Option<Row>> {
        let state = self.limited(1);
        let mut rows = self.fetch(&state, &Projection::Rows)?;
        rows.truncate(1);
        Ok(self.materialize(&state, rows)?.into_iter().next())
    }

    pub fn first_or_default(&self) -> QueryResult<Option<Row>> {
        self.first()
    }

    /// Exactly one row: zero rows is [`QueryError::NotFound`], more than one is
    /// [`QueryError::Cardinality`].
    pub fn single(&self) -> QueryResult<Row> {
        self.single_or_default()?
            .ok_or_else(|| QueryError::not_found(&self.state.entity_type))
    }

    /// Zero or one row; more than one is [`QueryError::Cardinality`].
    pub fn single_or_default(&self) -> QueryResult<Option<Row>> {
        let state = self.limited(2);
        let rows = self.fetch(&state, &Projection::Rows)?;
        if rows.len() > 1 {
            return Err(QueryError::cardinality(&state.entity_type, rows.len()));
        }
        Ok(self.materialize(&state, rows)?.into_iter().next())
    }

    pub fn count(&self) -> QueryResult<u64> {
        let value = self.aggregate(AggregateFunc::Count, Expr::Star)?;
        Ok(value.as_ref().and_then(json_to_u64).unwrap_or(0))
    }

    pub fn any(&self) -> QueryResult<bool> {
        let mut state = self.limited(1);
        if state.raw_sql.is_none() {
            state.selects = vec![SelectItem {
                expr: raw("1", Vec::new()),
                alias: Some("present".to_string()),
            }];
        }
        Ok(!self.fetch(&state, &Projection::Rows)?.is_empty())
    }

    /// True when no row fails `predicate`.
    pub fn all(&self, predicate: Expr) -> QueryResult<bool> {
        let violations = self.clone().filter(!predicate);
        Ok(!violations.any()?)
    }

    pub fn sum(&self, expr: Expr) -> QueryResult<Option<serde_json::Value>> {
        self.aggregate(AggregateFunc::Sum, expr)
    }

    pub fn average(&self, expr: Expr) -> QueryResult<Option<serde_json::Value>> {
        self.aggregate(AggregateFunc::Avg, expr)
    }

    pub fn min(&self, expr: Expr) -> QueryResult<Option<serde_json::Value>> {
        self.aggregate(AggregateFunc::Min, expr)
    }

    pub fn max(&self, expr: Expr) -> QueryResult<Option<serde_json::Value>> {
        self.aggregate(AggregateFunc::Max, expr)
    }

    /// Execution plan from the connection's explain facility, cached under the
    /// query fingerprint.
    pub fn analyze_plan(&self) -> QueryResult<QueryPlan> {
        let projection = Projection::Rows;
        let statement = self.prepare(&self.state, &projection);
        let cache = self.ctx.sql_cache().filter(|_| !self.state.hints.no_cache);
        let key = cache.map(|_| {
            let summary = QuerySummary::new(&self.state, &projection).with_hints(&self.state.hints);
            SqlCache::generate_key(&self.ctx, &self.state.entity_type, &summary)
        });

        if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
            if let Some(plan) = cache.get_query_plan(key) {
                return Ok(plan);
            }
        }

        let plan = self
            .ctx
            .connection()
            .explain(&statement)
            .map_err(|err| classify_error(&self.state, err))?;

        if let (Some(cache), Some(key)) = (cache, key) {
            cache.set_query_plan(key, plan.clone());
        }
        Ok(plan)
    }

    /// Execute once and report timing and row count.
    pub fn stats(&self) -> QueryResult<ExecutionStats> {
        let statement = self.prepare(&self.state, &Projection::Rows);
        let started = Instant::now();
        let rows = if skips_execution(&self.state) {
            Vec::new()
        } else {
            self.run(&self.state, &statement)?
        };
        Ok(ExecutionStats {
            sql: statement.sql,
            row_count: rows.len(),
            execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            executed_at: Utc::now(),
        })
    }

    // ---- internals -------------------------------------------------------------------

    /// Copy of the state with `take` capped at `limit`.
    fn limited(&self, limit: u64) -> QueryState {
        let mut state = self.state.clone();
        state.take = Some(state.take.map_or(limit, |take| take.min(limit)));
        state
    }

    fn aggregate(&self, func: AggregateFunc, arg: Expr) -> QueryResult<Option<serde_json::Value>> {
        let rows = self.fetch(&self.state, &Projection::Aggregate { func, arg })?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove(AGGREGATE_ALIAS))
            .filter(|value| !value.is_null()))
    }

    /// Render (through the SQL cache when one is configured) and splice hints.
    fn prepare(&self, state: &QueryState, projection: &Projection) -> Statement {
        let dialect = self.ctx.dialect();
        let catalog = self.ctx.catalog();
        let renderer = Renderer::new(dialect, catalog);

        let rendered = match self.ctx.sql_cache() {
            Some(cache) if !state.hints.no_cache => {
                let summary = QuerySummary::new(state, projection);
                let key = SqlCache::generate_key(&self.ctx, &state.entity_type, &summary);
                match cache.get_sql(&key) {
                    Some(sql) => RenderedSql {
                        sql,
                        params: renderer.collect_params(state, projection),
                    },
                    None => {
                        let rendered = renderer.render(state, projection);
                        cache.set_sql(key, rendered.sql.clone());
                        rendered
                    }
                }
            }
            _ => renderer.render(state, projection),
        };

        let table = catalog.table_for(&state.entity_type);
        let sql = HintInjector::new(dialect).apply(&rendered.sql, table, &state.hints);
        if self.ctx.log_sql() {
            info!(entity = %state.entity_type, %sql, params = rendered.params.len(), "rendered query");
        } else {
            debug!(entity = %state.entity_type, %sql, params = rendered.params.len(), "rendered query");
        }

        Statement {
            sql,
            params: rendered.params,
            timeout_seconds: state.hints.timeout_seconds,
            max_rows: state.hints.max_rows,
        }
    }

    fn fetch(&self, state: &QueryState, projection: &Projection) -> QueryResult<Vec<Row>> {
        if skips_execution(state) {
            debug!(entity = %state.entity_type, "take(0): returning no rows without executing");
            return Ok(Vec::new());
        }
        let statement = self.prepare(state, projection);
        self.run(state, &statement)
    }

    fn run(&self, state: &QueryState, statement: &Statement) -> QueryResult<Vec<Row>> {
        self.ctx
            .connection()
            .query(statement)
            .map_err(|err| classify_error(state, err))
    }

    /// Load includes, then hand rows to the change tracker when tracking.
    fn materialize(&self, state: &QueryState, mut rows: Vec<Row>) -> QueryResult<Vec<Row>> {
        if !state.includes.is_empty() {
            loader::load_includes(
                &self.ctx,
                &state.entity_type,
                &state.includes,
                state.tracking,
                &mut rows,
            )?;
        }
        if state.tracking == TrackingMode::Tracking {
            if let Some(tracker) = self.ctx.change_tracker() {
                for row in &rows {
                    tracker.track(&state.entity_type, row);
                }
            }
        }
        Ok(rows)
    }
}

fn skips_execution(state: &QueryState) -> bool {
    state.raw_sql.is_none() && state.take == Some(0)
}

fn classify_error(state: &QueryState, err: QueryError) -> QueryError {
    match err {
        QueryError::Execution(message) if state.uses_raw_sql() => QueryError::MalformedRawSql(message),
        other => other,
    }
}

fn json_to_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::OfflineConnection;
    use crate::expr::col;
    use std::sync::Arc;

    fn ctx(driver: &str) -> DbContext {
        DbContext::new(Arc::new(OfflineConnection::new(driver)))
    }

    #[test]
    fn test_order_by_replaces_then_order_by_appends() {
        let q = ctx("pgsql")
            .query("users")
            .order_by(col("a"))
            .then_order_by_desc(col("b"))
            .order_by_desc(col("c"))
            .then_order_by(col("d"));
        let orders = &q.state().order_bys;
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].key, col("c"));
        assert_eq!(orders[0].direction, SortDirection::Descending);
        assert_eq!(orders[1].direction, SortDirection::Ascending);
    }

    #[test]
    fn test_last_index_mode_wins() {
        let q = ctx("mysql").query("orders").use_index("a").force_index("b").ignore_index("c");
        assert_eq!(
            q.state().hints.index,
            Some(IndexHint {
                name: "c".into(),
                mode: IndexMode::Ignore
            })
        );
    }

    #[test]
    fn test_then_include_chains_last_include() {
        let q = ctx("sqlite")
            .query("Customer")
            .include("orders")
            .then_include("lines")
            .then_include("product")
            .include("address");
        let includes = &q.state().includes;
        assert_eq!(includes.len(), 2);
        assert_eq!(includes[0].segments, vec!["orders", "lines", "product"]);
        assert_eq!(includes[1].segments, vec!["address"]);
    }

    #[test]
    fn test_tracking_toggle() {
        let q = ctx("sqlite").query("users").as_no_tracking();
        assert_eq!(q.state().tracking, TrackingMode::NoTracking);
        assert_eq!(q.as_tracking().state().tracking, TrackingMode::Tracking);
    }

    #[test]
    fn test_take_zero_does_not_execute() {
        // The offline connection errors on execution, so reaching it would fail.
        let q = ctx("pgsql").query("users").skip(5).take(0);
        assert!(q.to_list().unwrap().is_empty());
        assert_eq!(q.count().unwrap(), 0);
        assert!(!q.any().unwrap());
        assert_eq!(q.first().unwrap(), None);
    }

    #[test]
    fn test_json_to_u64() {
        assert_eq!(json_to_u64(&serde_json::json!(3)), Some(3));
        assert_eq!(json_to_u64(&serde_json::json!("12")), Some(12));
        assert_eq!(json_to_u64(&serde_json::Value::Null), None);
    }
}
