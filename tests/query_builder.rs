mod common;

use std::sync::Arc;

use common::{RecordingConnection, RecordingTracker, context, row};
use pretty_assertions::assert_eq;
use serde_json::json;
use sqlforge::expr::count_all;
use sqlforge::prelude::*;

fn people() -> Vec<Row> {
    vec![
        row(json!({"id": 1, "name": "Ada"})),
        row(json!({"id": 2, "name": "Grace"})),
    ]
}

#[test]
fn test_rendering_is_deterministic() {
    let (ctx, _) = context(RecordingConnection::new("pgsql"));
    let build = || {
        ctx.query("users")
            .filter(col("active").eq(true).or(col("role").eq("admin")))
            .filter(col("age").gte(18))
            .order_by(col("name"))
            .then_order_by_desc(col("id"))
            .skip(10)
            .take(5)
    };
    let a = build().to_statement();
    let b = build().to_statement();
    assert_eq!(a, b);
    assert_eq!(
        a.sql,
        "SELECT * FROM \"users\" WHERE (\"active\" = $1 OR \"role\" = $2) AND \"age\" >= $3 \
         ORDER BY \"name\" ASC, \"id\" DESC LIMIT 5 OFFSET 10"
    );
    assert_eq!(a.params, vec![Value::Bool(true), Value::from("admin"), Value::Int(18)]);
}

#[test]
fn test_pagination_per_dialect() {
    let (mysql, _) = context(RecordingConnection::new("mysqli"));
    assert_eq!(
        mysql.query("users").skip(5).to_sql(),
        "SELECT * FROM `users` LIMIT 18446744073709551615 OFFSET 5"
    );

    let (sqlite, _) = context(RecordingConnection::new("sqlite3"));
    assert_eq!(sqlite.query("users").skip(5).to_sql(), "SELECT * FROM \"users\" LIMIT -1 OFFSET 5");

    let (sqlsrv, _) = context(RecordingConnection::new("sqlsrv"));
    assert_eq!(sqlsrv.query("users").take(10).to_sql(), "SELECT TOP 10 * FROM [users]");
    assert_eq!(
        sqlsrv.query("users").order_by(col("id")).skip(20).take(10).to_sql(),
        "SELECT * FROM [users] ORDER BY [id] ASC OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
    );
    assert_eq!(
        sqlsrv.query("users").skip(20).to_sql(),
        "SELECT * FROM [users] ORDER BY (SELECT NULL) OFFSET 20 ROWS"
    );
}

#[test]
fn test_take_zero_never_reaches_connection() {
    let (ctx, conn) = context(RecordingConnection::with_rows("pgsql", people()));
    let query = ctx.query("users").skip(3).take(0);
    assert!(query.to_list().unwrap().is_empty());
    assert_eq!(query.first().unwrap(), None);
    assert_eq!(query.count().unwrap(), 0);
    assert_eq!(conn.executed(), 0);
}

fn seeded_sqlite(count: i64) -> DbContext {
    let conn = SqlxConnection::connect_with("sqlite::memory:", 1).unwrap();
    conn.query(&Statement::new("CREATE TABLE items (id INTEGER, name TEXT)", vec![]))
        .unwrap();
    for id in 1..=count {
        conn.query(&Statement::new(
            "INSERT INTO items (id, name) VALUES (?, ?)",
            vec![Value::Int(id), Value::from(format!("item-{}", id))],
        ))
        .unwrap();
    }
    DbContext::new(Arc::new(conn))
}

#[test]
fn test_pagination_against_sqlite() {
    let ctx = seeded_sqlite(4);
    let items = || ctx.query("items").order_by(col("id"));

    let page = items().skip(1).take(2).to_list().unwrap();
    let ids: Vec<_> = page.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(2), json!(3)]);

    assert_eq!(items().skip(3).to_list().unwrap().len(), 1);
    assert!(items().skip(4).to_list().unwrap().is_empty());
    assert!(items().skip(9).take(3).to_list().unwrap().is_empty());
    assert!(items().take(0).to_list().unwrap().is_empty());
    assert_eq!(items().skip(4).count().unwrap(), 0);
}

#[test]
fn test_single_rejects_many_rows() {
    let (ctx, conn) = context(RecordingConnection::with_rows("pgsql", people()));
    let err = ctx.query("users").filter(col("name").like("%a%")).single().unwrap_err();
    assert!(matches!(err, QueryError::Cardinality { ref entity, .. } if entity == "users"));
    assert!(conn.sql()[0].ends_with("LIMIT 2"));

    let err = ctx.query("users").single_or_default().unwrap_err();
    assert!(matches!(err, QueryError::Cardinality { .. }));
}

#[test]
fn test_single_on_empty() {
    let (ctx, _) = context(RecordingConnection::new("pgsql"));
    let err = ctx.query("users").single().unwrap_err();
    assert!(matches!(err, QueryError::NotFound { .. }));
    assert_eq!(err.to_string(), "Sequence for 'users' contains no elements");
    assert_eq!(ctx.query("users").single_or_default().unwrap(), None);
}

#[test]
fn test_single_returns_the_row() {
    let rows = vec![row(json!({"id": 7}))];
    let (ctx, conn) = context(RecordingConnection::with_rows("pgsql", rows));
    let found = ctx.query("users").filter(col("id").eq(7)).single().unwrap();
    assert_eq!(found["id"], json!(7));
    assert_eq!(conn.sql()[0], "SELECT * FROM \"users\" WHERE \"id\" = $1 LIMIT 2");
}

#[test]
fn test_first_takes_the_first_row() {
    let (ctx, conn) = context(RecordingConnection::with_rows("mysql", people()));
    let first = ctx.query("users").order_by(col("name")).first().unwrap().unwrap();
    assert_eq!(first["name"], json!("Ada"));
    assert_eq!(conn.sql()[0], "SELECT * FROM `users` ORDER BY `name` ASC LIMIT 1");

    let (empty, _) = context(RecordingConnection::new("mysql"));
    assert_eq!(empty.query("users").first_or_default().unwrap(), None);
}

#[test]
fn test_count_and_aggregates() {
    let conn = RecordingConnection::responding("pgsql", |statement| {
        if statement.sql.starts_with("SELECT COUNT") {
            Ok(vec![row(json!({"aggregate": 5}))])
        } else {
            Ok(vec![row(json!({"aggregate": null}))])
        }
    });
    let (ctx, conn) = context(conn);

    let active = ctx.query("users").filter(col("active").eq(true)).order_by(col("name"));
    assert_eq!(active.count().unwrap(), 5);
    assert_eq!(
        conn.sql()[0],
        "SELECT COUNT(*) AS \"aggregate\" FROM \"users\" WHERE \"active\" = $1"
    );

    assert_eq!(active.sum(col("score")).unwrap(), None);

    ctx.query("users").take(5).count().unwrap();
    assert_eq!(
        conn.sql()[2],
        "SELECT COUNT(*) AS \"aggregate\" FROM (SELECT * FROM \"users\" LIMIT 5) AS \"aggregate_source\""
    );
}

#[test]
fn test_any_and_all() {
    let (ctx, conn) = context(RecordingConnection::new("pgsql"));
    assert!(!ctx.query("users").filter(col("active").eq(true)).any().unwrap());
    assert!(ctx.query("users").all(col("age").gte(18)).unwrap());

    let sql = conn.sql();
    assert_eq!(sql[0], "SELECT 1 AS \"present\" FROM \"users\" WHERE \"active\" = $1 LIMIT 1");
    assert_eq!(sql[1], "SELECT 1 AS \"present\" FROM \"users\" WHERE NOT (\"age\" >= $1) LIMIT 1");
}

#[test]
fn test_joins() {
    let (ctx, _) = context(RecordingConnection::new("pgsql"));
    let orders = ctx.query("orders");
    let recent = ctx.query("orders").filter(col("total").gt(100));

    let plain = ctx
        .query("users")
        .join(orders, "o", col("users.id"), col("o.user_id"))
        .to_sql();
    assert_eq!(
        plain,
        "SELECT * FROM \"users\" INNER JOIN \"orders\" AS \"o\" ON \"users\".\"id\" = \"o\".\"user_id\""
    );

    let nested = ctx
        .query("users")
        .left_join(recent, "r", col("users.id"), col("r.user_id"))
        .filter(col("users.active").eq(true))
        .to_statement();
    assert_eq!(
        nested.sql,
        "SELECT * FROM \"users\" LEFT JOIN (SELECT * FROM \"orders\" WHERE \"total\" > $1) AS \"r\" \
         ON \"users\".\"id\" = \"r\".\"user_id\" WHERE \"users\".\"active\" = $2"
    );
    assert_eq!(nested.params, vec![Value::Int(100), Value::Bool(true)]);

    let raw_join = ctx
        .query("users")
        .join_raw(JoinKind::Left, "profiles", Some("p"), "p.user_id = users.id")
        .to_sql();
    assert_eq!(
        raw_join,
        "SELECT * FROM \"users\" LEFT JOIN \"profiles\" AS \"p\" ON p.user_id = users.id"
    );
}

#[test]
fn test_grouped_projection() {
    let (ctx, _) = context(RecordingConnection::new("pgsql"));
    let sql = ctx
        .query("users")
        .select(col("dept"))
        .select_as(count_all(), "n")
        .group_by(col("dept"))
        .order_by_desc(col("n"))
        .to_sql();
    assert_eq!(
        sql,
        "SELECT \"dept\", COUNT(*) AS \"n\" FROM \"users\" GROUP BY \"dept\" ORDER BY \"n\" DESC"
    );
}

#[test]
fn test_raw_sql_placeholders_and_errors() {
    let conn = RecordingConnection::responding("pgsql", |statement| {
        if statement.sql.contains("FORM") {
            Err(QueryError::Execution("syntax error at or near \"FORM\"".into()))
        } else {
            Err(QueryError::Execution("relation does not exist".into()))
        }
    });
    let (ctx, conn) = context(conn);

    let err = ctx
        .query("users")
        .from_sql_raw("SELECT * FORM users WHERE id = ? AND note = '?'", vec![Value::Int(1)])
        .to_list()
        .unwrap_err();
    assert!(matches!(err, QueryError::MalformedRawSql(_)));
    assert_eq!(conn.sql()[0], "SELECT * FORM users WHERE id = $1 AND note = '?'");

    let err = ctx.query("missing").to_list().unwrap_err();
    assert!(matches!(err, QueryError::Execution(_)));
}

#[test]
fn test_filter_raw_is_parenthesized() {
    let (ctx, _) = context(RecordingConnection::new("sqlsrv"));
    let statement = ctx
        .query("users")
        .filter(col("active").eq(true))
        .filter_raw("age > ? OR vip = 1", vec![Value::Int(30)])
        .to_statement();
    assert_eq!(
        statement.sql,
        "SELECT * FROM [users] WHERE [active] = @p1 AND (age > @p2 OR vip = 1)"
    );
}

#[test]
fn test_hints_in_final_sql() {
    let (sqlsrv, _) = context(RecordingConnection::new("sqlsrv"));
    assert_eq!(
        sqlsrv.query("orders").with_lock("nolock").to_sql(),
        "SELECT * FROM [orders] WITH (NOLOCK)"
    );

    let (mysql, _) = context(RecordingConnection::new("mysql"));
    let statement = mysql
        .query("orders")
        .filter(col("id").eq(1))
        .use_index("idx_a")
        .optimizer_hint("MAX_EXECUTION_TIME(1000)")
        .timeout(30)
        .max_rows(500)
        .to_statement();
    assert_eq!(
        statement.sql,
        "SELECT /*+ MAX_EXECUTION_TIME(1000) */ * FROM `orders` USE INDEX(idx_a) WHERE `id` = ?"
    );
    assert_eq!(statement.timeout_seconds, Some(30));
    assert_eq!(statement.max_rows, Some(500));

    let (sqlite, _) = context(RecordingConnection::new("sqlite"));
    assert_eq!(
        sqlite.query("orders").with_lock("NOLOCK").use_index("idx_a").to_sql(),
        "SELECT * FROM \"orders\""
    );
}

fn shop_catalog() -> EntityCatalog {
    EntityCatalog::new()
        .with_entity(
            "Customer",
            EntityMeta::new("customers")
                .with_navigation("orders", Navigation::many("Order", "id", "customer_id")),
        )
        .with_entity(
            "Order",
            EntityMeta::new("orders")
                .with_navigation("lines", Navigation::many("OrderLine", "id", "order_id"))
                .with_navigation("customer", Navigation::one("Customer", "customer_id", "id")),
        )
        .with_entity("OrderLine", EntityMeta::new("order_lines"))
}

fn shop_connection() -> RecordingConnection {
    RecordingConnection::responding("pgsql", |statement| {
        let rows = if statement.sql.contains("FROM \"customers\"") {
            vec![row(json!({"id": 1})), row(json!({"id": 2}))]
        } else if statement.sql.contains("FROM \"orders\"") {
            vec![
                row(json!({"id": 10, "customer_id": 1})),
                row(json!({"id": 11, "customer_id": 1})),
            ]
        } else if statement.sql.contains("FROM \"order_lines\"") {
            vec![row(json!({"id": 100, "order_id": 10}))]
        } else {
            Vec::new()
        };
        Ok(rows)
    })
}

#[test]
fn test_include_loads_nested_navigations() {
    let conn = Arc::new(shop_connection());
    let tracker = Arc::new(RecordingTracker::default());
    let ctx = DbContext::new(conn.clone())
        .with_catalog(shop_catalog())
        .with_change_tracker(tracker.clone());

    let customers = ctx
        .query("Customer")
        .include("orders")
        .then_include("lines")
        .to_list()
        .unwrap();

    assert_eq!(customers.len(), 2);
    let orders = customers[0]["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["lines"].as_array().map(Vec::len), Some(1));
    assert_eq!(orders[1]["lines"], json!([]));
    assert_eq!(customers[1]["orders"], json!([]));

    let statements = conn.statements();
    assert_eq!(statements.len(), 3);
    assert_eq!(statements[1].sql, "SELECT * FROM \"orders\" WHERE \"customer_id\" IN ($1, $2)");
    assert_eq!(statements[1].params, vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(statements[2].sql, "SELECT * FROM \"order_lines\" WHERE \"order_id\" IN ($1, $2)");

    let entities = tracker.entities();
    assert_eq!(entities.iter().filter(|e| *e == "Customer").count(), 2);
    assert_eq!(entities.iter().filter(|e| *e == "Order").count(), 2);
    assert_eq!(entities.iter().filter(|e| *e == "OrderLine").count(), 1);
}

#[test]
fn test_reference_navigation_attaches_object() {
    let (ctx, _) = context(shop_connection());
    let ctx = ctx.with_catalog(shop_catalog());
    let orders = ctx.query("Order").include("customer").as_no_tracking().to_list().unwrap();
    assert_eq!(orders[0]["customer"]["id"], json!(1));
}

#[test]
fn test_unknown_navigation_is_an_error() {
    let (ctx, _) = context(shop_connection());
    let ctx = ctx.with_catalog(shop_catalog());
    let err = ctx.query("Customer").include("invoices").to_list().unwrap_err();
    assert!(matches!(
        err,
        QueryError::UnknownNavigation { ref entity, ref navigation } if entity == "Customer" && navigation == "invoices"
    ));
}

#[test]
fn test_no_tracking_skips_tracker() {
    let tracker = Arc::new(RecordingTracker::default());
    let ctx = DbContext::new(Arc::new(RecordingConnection::with_rows("pgsql", people())))
        .with_change_tracker(tracker.clone());

    ctx.query("users").as_no_tracking().to_list().unwrap();
    assert!(tracker.entities().is_empty());

    ctx.query("users").to_list().unwrap();
    assert_eq!(tracker.entities(), vec!["users", "users"]);

    let untracked = ctx.clone().with_default_tracking(TrackingMode::NoTracking);
    untracked.query("users").first().unwrap();
    assert_eq!(tracker.entities().len(), 2);
}

#[test]
fn test_stats_reports_rows() {
    let (ctx, _) = context(RecordingConnection::with_rows("sqlite", people()));
    let stats = ctx.query("users").stats().unwrap();
    assert_eq!(stats.row_count, 2);
    assert_eq!(stats.sql, "SELECT * FROM \"users\"");
    assert!(stats.execution_time_ms >= 0.0);
}

#[test]
fn test_analyze_plan_uses_explain() {
    let (ctx, conn) = context(RecordingConnection::with_rows("pgsql", vec![row(json!({"QUERY PLAN": "Seq Scan"}))]));
    let plan = ctx.query("users").filter(col("id").eq(1)).analyze_plan().unwrap();
    assert_eq!(plan.sql, "SELECT * FROM \"users\" WHERE \"id\" = $1");
    assert_eq!(plan.steps.len(), 1);
    assert_eq!(conn.sql()[0], "EXPLAIN SELECT * FROM \"users\" WHERE \"id\" = $1");
}
