//! SQL rendering for accumulated query state.
//!
//! Rendering is a pure walk over [`QueryState`]: the same state always yields
//! the same text and the same parameter order. The parameter walk can run on its
//! own ([`Renderer::collect_params`]) so that cached SQL text can be reused
//! without re-rendering.

use crate::context::EntityCatalog;
use crate::dialect::Dialect;
use crate::expr::{AggregateFunc, Expr, Value};
use crate::query::state::{JoinTarget, QueryState, SelectItem};

/// Alias of the single column produced by aggregate terminals.
pub const AGGREGATE_ALIAS: &str = "aggregate";
const AGGREGATE_INPUT: &str = "aggregate_input";
const AGGREGATE_SOURCE: &str = "aggregate_source";

/// SQL text plus its bound parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSql {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Result shape requested from the renderer.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    Rows,
    Aggregate { func: AggregateFunc, arg: Expr },
}

/// Accumulates SQL text and parameters. In params-only mode no text is built.
pub(crate) struct SqlWriter {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
    emit_text: bool,
}

impl SqlWriter {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
            emit_text: true,
        }
    }

    pub(crate) fn params_only(dialect: Dialect) -> Self {
        Self {
            emit_text: false,
            ..Self::new(dialect)
        }
    }

    fn push(&mut self, s: &str) {
        if self.emit_text {
            self.sql.push_str(s);
        }
    }

    fn push_char(&mut self, c: char) {
        if self.emit_text {
            self.sql.push(c);
        }
    }

    /// Qualified identifier (`table`, `alias.column`).
    fn push_ident(&mut self, path: &str) {
        if self.emit_text {
            let quoted = self.dialect.quote_qualified(path);
            self.sql.push_str(&quoted);
        }
    }

    fn push_alias(&mut self, alias: &str) {
        if self.emit_text {
            let quoted = self.dialect.quote_identifier(alias);
            self.sql.push_str(&quoted);
        }
    }

    fn push_param(&mut self, value: &Value) {
        self.params.push(value.clone());
        if self.emit_text {
            let placeholder = self.dialect.placeholder(self.params.len());
            self.sql.push_str(&placeholder);
        }
    }

    /// Copy a raw fragment, turning each `?` outside a quoted literal into the
    /// dialect's placeholder. Parameters left over after the last `?` are bound
    /// as-is, for fragments written with native placeholders.
    fn push_raw(&mut self, sql: &str, params: &[Value]) {
        let mut pending = params.iter();
        let mut in_literal = false;
        for c in sql.chars() {
            match c {
                '\'' => {
                    in_literal = !in_literal;
                    self.push_char(c);
                }
                '?' if !in_literal => match pending.next() {
                    Some(value) => self.push_param(value),
                    None => self.push_char(c),
                },
                _ => self.push_char(c),
            }
        }
        self.params.extend(pending.cloned());
    }

    pub(crate) fn finish(self) -> RenderedSql {
        RenderedSql {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Renders query state for one dialect.
pub struct Renderer<'a> {
    dialect: Dialect,
    catalog: &'a EntityCatalog,
}

impl<'a> Renderer<'a> {
    pub fn new(dialect: Dialect, catalog: &'a EntityCatalog) -> Self {
        Self { dialect, catalog }
    }

    pub fn render(&self, state: &QueryState, projection: &Projection) -> RenderedSql {
        let mut w = SqlWriter::new(self.dialect);
        self.write_statement(&mut w, state, projection);
        w.finish()
    }

    /// Parameters `render` would bind, without building the text.
    pub fn collect_params(&self, state: &QueryState, projection: &Projection) -> Vec<Value> {
        let mut w = SqlWriter::params_only(self.dialect);
        self.write_statement(&mut w, state, projection);
        w.finish().params
    }

    fn write_statement(&self, w: &mut SqlWriter, state: &QueryState, projection: &Projection) {
        match projection {
            Projection::Rows => self.write_select(w, state, false),
            Projection::Aggregate { func, arg } => self.write_aggregate(w, state, *func, arg),
        }
    }

    fn write_aggregate(&self, w: &mut SqlWriter, state: &QueryState, func: AggregateFunc, arg: &Expr) {
        let wrap = state.raw_sql.is_some() || state.is_paginated() || !state.group_bys.is_empty();
        if !wrap {
            let mut flat = state.clone();
            flat.selects = vec![SelectItem {
                expr: Expr::Aggregate {
                    func,
                    arg: Box::new(arg.clone()),
                },
                alias: Some(AGGREGATE_ALIAS.to_string()),
            }];
            flat.order_bys.clear();
            self.write_select(w, &flat, false);
            return;
        }

        let mut inner = state.clone();
        let mut outer_func = func;
        let outer_arg = if state.raw_sql.is_some() {
            arg.clone()
        } else if !matches!(arg, Expr::Star) && !state.group_bys.is_empty() {
            // aggregate per group, then across the group results
            inner.selects = state
                .group_bys
                .iter()
                .map(|key| SelectItem {
                    expr: key.clone(),
                    alias: None,
                })
                .chain(std::iter::once(SelectItem {
                    expr: Expr::Aggregate {
                        func,
                        arg: Box::new(arg.clone()),
                    },
                    alias: Some(AGGREGATE_INPUT.to_string()),
                }))
                .collect();
            if func == AggregateFunc::Count {
                outer_func = AggregateFunc::Sum;
            }
            Expr::Column(AGGREGATE_INPUT.to_string())
        } else if matches!(arg, Expr::Star) {
            if inner.selects.is_empty() && !inner.group_bys.is_empty() {
                inner.selects = inner
                    .group_bys
                    .iter()
                    .map(|key| SelectItem {
                        expr: key.clone(),
                        alias: None,
                    })
                    .collect();
            }
            Expr::Star
        } else {
            inner.selects = vec![SelectItem {
                expr: arg.clone(),
                alias: Some(AGGREGATE_INPUT.to_string()),
            }];
            Expr::Column(AGGREGATE_INPUT.to_string())
        };

        w.push("SELECT ");
        w.push(outer_func.as_sql());
        w.push("(");
        self.write_expr(w, &outer_arg);
        w.push(") AS ");
        w.push_alias(AGGREGATE_ALIAS);
        w.push(" FROM (");
        self.write_select(w, &inner, true);
        w.push(") AS ");
        w.push_alias(AGGREGATE_SOURCE);
    }

    /// `nested` selects drop ORDER BY unless it is needed for pagination.
    fn write_select(&self, w: &mut SqlWriter, state: &QueryState, nested: bool) {
        if let Some(raw) = &state.raw_sql {
            w.push_raw(&raw.sql, &raw.params);
            return;
        }

        let sql_server = self.dialect == Dialect::SqlServer;

        w.push("SELECT ");
        if sql_server {
            if let Some(top) = sql_server_top(state) {
                w.push(&format!("TOP {} ", top));
            }
        }

        if state.selects.is_empty() {
            w.push("*");
        } else {
            for (i, item) in state.selects.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                self.write_expr(w, &item.expr);
                if let Some(alias) = &item.alias {
                    w.push(" AS ");
                    w.push_alias(alias);
                }
            }
        }

        w.push(" FROM ");
        w.push_ident(self.catalog.table_for(&state.entity_type));

        self.write_joins(w, state);
        self.write_where(w, &state.wheres);

        if !state.group_bys.is_empty() {
            w.push(" GROUP BY ");
            for (i, key) in state.group_bys.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                self.write_expr(w, key);
            }
        }

        let keep_order = !nested || state.is_paginated();
        if keep_order && !state.order_bys.is_empty() {
            w.push(" ORDER BY ");
            for (i, order) in state.order_bys.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                self.write_expr(w, &order.key);
                w.push(" ");
                w.push(order.direction.as_sql());
            }
        } else if sql_server && sql_server_offset(state) {
            // OFFSET/FETCH is only legal after an ORDER BY
            w.push(" ORDER BY (SELECT NULL)");
        }

        self.write_pagination(w, state);
    }

    fn write_joins(&self, w: &mut SqlWriter, state: &QueryState) {
        for join in &state.joins {
            w.push(" ");
            w.push(join.kind.as_sql());
            w.push(" ");
            match &join.target {
                JoinTarget::Query {
                    state: other,
                    alias,
                    left_key,
                    right_key,
                } => {
                    if other.is_plain() {
                        w.push_ident(self.catalog.table_for(&other.entity_type));
                    } else {
                        w.push("(");
                        self.write_select(w, other, true);
                        w.push(")");
                    }
                    w.push(" AS ");
                    w.push_alias(alias);
                    w.push(" ON ");
                    self.write_operand(w, left_key);
                    w.push(" = ");
                    self.write_operand(w, right_key);
                }
                JoinTarget::Raw {
                    table,
                    alias,
                    condition,
                } => {
                    w.push_ident(table);
                    if let Some(alias) = alias {
                        w.push(" AS ");
                        w.push_alias(alias);
                    }
                    w.push(" ON ");
                    w.push(condition);
                }
            }
        }
    }

    fn write_where(&self, w: &mut SqlWriter, wheres: &[Expr]) {
        if wheres.is_empty() {
            return;
        }
        w.push(" WHERE ");
        if let [only] = wheres {
            self.write_expr(w, only);
            return;
        }
        for (i, unit) in wheres.iter().enumerate() {
            if i > 0 {
                w.push(" AND ");
            }
            let wrap = match unit {
                Expr::Or(parts) => parts.len() > 1,
                Expr::Raw { .. } => true,
                _ => false,
            };
            self.write_wrapped(w, unit, wrap);
        }
    }

    fn write_pagination(&self, w: &mut SqlWriter, state: &QueryState) {
        match self.dialect {
            Dialect::SqlServer => {
                if sql_server_offset(state) {
                    w.push(&format!(" OFFSET {} ROWS", state.skip.unwrap_or(0)));
                    if let Some(take) = state.take {
                        w.push(&format!(" FETCH NEXT {} ROWS ONLY", take));
                    }
                }
            }
            Dialect::MySql | Dialect::Sqlite => match (state.take, state.skip) {
                (Some(take), Some(skip)) => w.push(&format!(" LIMIT {} OFFSET {}", take, skip)),
                (Some(take), None) => w.push(&format!(" LIMIT {}", take)),
                (None, Some(skip)) => {
                    // OFFSET needs a LIMIT in both engines
                    let unbounded = if self.dialect == Dialect::MySql {
                        "18446744073709551615"
                    } else {
                        "-1"
                    };
                    w.push(&format!(" LIMIT {} OFFSET {}", unbounded, skip));
                }
                (None, None) => {}
            },
            Dialect::Postgres | Dialect::Unknown => {
                if let Some(take) = state.take {
                    w.push(&format!(" LIMIT {}", take));
                }
                if let Some(skip) = state.skip {
                    w.push(&format!(" OFFSET {}", skip));
                }
            }
        }
    }

    fn write_wrapped(&self, w: &mut SqlWriter, expr: &Expr, wrap: bool) {
        if wrap {
            w.push("(");
            self.write_expr(w, expr);
            w.push(")");
        } else {
            self.write_expr(w, expr);
        }
    }

    /// Operands of comparisons: compound children get parentheses.
    fn write_operand(&self, w: &mut SqlWriter, expr: &Expr) {
        let wrap = matches!(expr, Expr::Binary { .. } | Expr::And(_) | Expr::Or(_));
        self.write_wrapped(w, expr, wrap);
    }

    fn write_expr(&self, w: &mut SqlWriter, expr: &Expr) {
        match expr {
            Expr::Star => w.push("*"),
            Expr::Column(name) => w.push_ident(name),
            Expr::Value(value) => w.push_param(value),
            Expr::Raw { sql, params } => w.push_raw(sql, params),
            Expr::Binary { left, op, right } => {
                self.write_operand(w, left);
                w.push(" ");
                w.push(op.as_sql());
                w.push(" ");
                self.write_operand(w, right);
            }
            Expr::And(parts) => {
                if parts.is_empty() {
                    w.push("1 = 1");
                }
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        w.push(" AND ");
                    }
                    let wrap = matches!(part, Expr::Or(p) if p.len() > 1)
                        || matches!(part, Expr::Raw { .. });
                    self.write_wrapped(w, part, wrap);
                }
            }
            Expr::Or(parts) => {
                if parts.is_empty() {
                    w.push("1 = 0");
                }
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        w.push(" OR ");
                    }
                    let wrap = matches!(part, Expr::And(p) if p.len() > 1)
                        || matches!(part, Expr::Raw { .. });
                    self.write_wrapped(w, part, wrap);
                }
            }
            Expr::Not(inner) => {
                w.push("NOT (");
                self.write_expr(w, inner);
                w.push(")");
            }
            Expr::IsNull(inner) => {
                self.write_operand(w, inner);
                w.push(" IS NULL");
            }
            Expr::IsNotNull(inner) => {
                self.write_operand(w, inner);
                w.push(" IS NOT NULL");
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                if list.is_empty() {
                    w.push(if *negated { "1 = 1" } else { "1 = 0" });
                    return;
                }
                self.write_operand(w, expr);
                w.push(if *negated { " NOT IN (" } else { " IN (" });
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        w.push(", ");
                    }
                    self.write_expr(w, item);
                }
                w.push(")");
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                self.write_operand(w, expr);
                w.push(if *negated { " NOT LIKE " } else { " LIKE " });
                self.write_operand(w, pattern);
            }
            Expr::Aggregate { func, arg } => {
                w.push(func.as_sql());
                w.push("(");
                self.write_expr(w, arg);
                w.push(")");
            }
        }
    }
}

/// `TOP n` applies when there is no offset to window over (or nothing to return).
fn sql_server_top(state: &QueryState) -> Option<u64> {
    match (state.take, state.skip) {
        (Some(0), _) => Some(0),
        (Some(take), None) => Some(take),
        _ => None,
    }
}

fn sql_server_offset(state: &QueryState) -> bool {
    state.skip.is_some() && state.take != Some(0)
}
