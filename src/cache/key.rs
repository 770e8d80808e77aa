//! Query fingerprints.
//!
//! A fingerprint is the entity name followed by a BLAKE3 digest of a canonical
//! JSON summary of everything that affects the rendered SQL. Bound literal
//! values are part of the summary, so queries differing only in a literal get
//! distinct keys. The tables the context's catalog resolves for the root and
//! joined entities are hashed too, so contexts with different mappings can
//! share one cache.

use serde::Serialize;
use tracing::warn;

use crate::context::DbContext;
use crate::expr::Expr;
use crate::query::render::Projection;
use crate::query::state::{Hints, IncludePath, Join, JoinTarget, OrderBy, QueryState, RawSql, SelectItem};

static ROWS_PROJECTION: Projection = Projection::Rows;

/// The parts of a [`QueryState`] that determine its SQL.
#[derive(Debug, Clone, Serialize)]
pub struct QuerySummary<'a> {
    pub selects: &'a [SelectItem],
    pub wheres: &'a [Expr],
    pub joins: &'a [Join],
    pub group_bys: &'a [Expr],
    pub order_bys: &'a [OrderBy],
    pub includes: &'a [IncludePath],
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub raw_sql: Option<&'a RawSql>,
    pub projection: &'a Projection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<&'a Hints>,
}

impl<'a> QuerySummary<'a> {
    pub fn new(state: &'a QueryState, projection: &'a Projection) -> Self {
        Self {
            selects: &state.selects,
            wheres: &state.wheres,
            joins: &state.joins,
            group_bys: &state.group_bys,
            order_bys: &state.order_bys,
            includes: &state.includes,
            skip: state.skip,
            take: state.take,
            raw_sql: state.raw_sql.as_ref(),
            projection,
            hints: None,
        }
    }

    /// Summary of a row-returning query.
    pub fn of(state: &'a QueryState) -> Self {
        Self::new(state, &ROWS_PROJECTION)
    }

    /// Also fingerprint the hints; plans depend on them where SQL text may not.
    pub fn with_hints(mut self, hints: &'a Hints) -> Self {
        self.hints = Some(hints);
        self
    }
}

#[derive(Serialize)]
struct Fingerprint<'a> {
    dialect: &'a str,
    entity: &'a str,
    tables: Vec<&'a str>,
    query: &'a QuerySummary<'a>,
}

pub(crate) fn generate_key(ctx: &DbContext, entity_type: &str, summary: &QuerySummary<'_>) -> String {
    let catalog = ctx.catalog();
    let mut tables = vec![catalog.table_for(entity_type)];
    collect_join_tables(ctx, summary.joins, &mut tables);

    let fingerprint = Fingerprint {
        dialect: ctx.dialect().name(),
        entity: entity_type,
        tables,
        query: summary,
    };
    let mut hasher = blake3::Hasher::new();
    if let Err(err) = serde_json::to_writer(&mut hasher, &fingerprint) {
        warn!(entity = entity_type, error = %err, "query summary did not serialize; key covers entity only");
    }
    format!("{}:{}", entity_type, hasher.finalize().to_hex())
}

/// Resolved tables of every joined entity, depth first.
fn collect_join_tables<'a>(ctx: &'a DbContext, joins: &'a [Join], tables: &mut Vec<&'a str>) {
    for join in joins {
        if let JoinTarget::Query { state, .. } = &join.target {
            tables.push(ctx.catalog().table_for(&state.entity_type));
            collect_join_tables(ctx, &state.joins, tables);
        }
    }
}
