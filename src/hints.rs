//! Hint splicing on rendered SQL.
//!
//! Hints are applied by textual substitution on the first `FROM <table>`
//! reference (or the statement head/tail for optimizer hints), never by
//! re-rendering. Dialects without a syntax for a hint leave the SQL untouched.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{trace, warn};

use crate::dialect::Dialect;
use crate::query::state::{Hints, IndexHint};

/// Lock hints recognized and normalized to upper case.
pub const LOCK_HINTS: &[&str] = &[
    "NOLOCK",
    "READPAST",
    "READUNCOMMITTED",
    "READCOMMITTED",
    "REPEATABLEREAD",
    "SERIALIZABLE",
];

static SELECT_HEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*SELECT\b").expect("static regex"));

static OPTION_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bOPTION\s*\((?P<hints>(?:[^()]|\([^()]*\))*)\)\s*;?\s*$").expect("static regex")
});

/// Normalize a lock hint against [`LOCK_HINTS`]; unknown tokens pass through verbatim.
pub fn normalize_lock_hint(hint: &str) -> String {
    let trimmed = hint.trim();
    let upper = trimmed.to_ascii_uppercase();
    if LOCK_HINTS.contains(&upper.as_str()) {
        upper
    } else {
        trimmed.to_string()
    }
}

/// Splices index, lock and optimizer hints into SQL for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct HintInjector {
    dialect: Dialect,
}

impl HintInjector {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Apply every hint in `hints`: index, then lock, then optimizer hints.
    ///
    /// Timeout and max-row hints have no SQL form; they travel on the statement.
    pub fn apply(&self, sql: &str, table: &str, hints: &Hints) -> String {
        let mut out = sql.to_string();
        if let Some(index) = &hints.index {
            out = self.index_hint(&out, table, index);
        }
        if let Some(lock) = &hints.lock_hint {
            out = self.lock_hint(&out, table, lock);
        }
        if !hints.optimizer_hints.is_empty() {
            out = self.optimizer_hints(&out, &hints.optimizer_hints);
        }
        out
    }

    pub fn index_hint(&self, sql: &str, table: &str, hint: &IndexHint) -> String {
        match self.dialect {
            Dialect::MySql => {
                let Some(re) = self.table_reference(table) else {
                    return sql.to_string();
                };
                let Some(found) = re.find(sql) else {
                    trace!(table, "no FROM reference for index hint");
                    return sql.to_string();
                };
                let mut out = sql.to_string();
                out.insert_str(
                    found.end(),
                    &format!(" {}({})", hint.mode.keyword(), hint.name),
                );
                out
            }
            Dialect::SqlServer => self.merge_table_hint(sql, table, &format!("INDEX({})", hint.name)),
            Dialect::Postgres | Dialect::Sqlite | Dialect::Unknown => sql.to_string(),
        }
    }

    /// SQL Server only: `FROM table [AS alias] WITH (...)`, merging into an
    /// existing WITH clause.
    ///
    /// A hint already listed in that clause is not appended a second time, so
    /// applying the same lock hint twice leaves the SQL unchanged.
    pub fn lock_hint(&self, sql: &str, table: &str, hint: &str) -> String {
        match self.dialect {
            Dialect::SqlServer => self.merge_table_hint(sql, table, &normalize_lock_hint(hint)),
            _ => sql.to_string(),
        }
    }

    pub fn optimizer_hints(&self, sql: &str, hints: &[String]) -> String {
        if hints.is_empty() {
            return sql.to_string();
        }
        match self.dialect {
            Dialect::MySql => match SELECT_HEAD.find(sql) {
                Some(head) => {
                    let mut out = sql.to_string();
                    out.insert_str(head.end(), &format!(" /*+ {} */", hints.join(" ")));
                    out
                }
                None => sql.to_string(),
            },
            Dialect::SqlServer => match OPTION_TAIL.captures(sql) {
                Some(caps) => merge_hint_list(sql, &caps, &hints.join(", ")),
                None => {
                    let body = sql.trim_end().trim_end_matches(';').trim_end();
                    format!("{} OPTION ({})", body, hints.join(", "))
                }
            },
            Dialect::Postgres => format!("/*+ {} */ {}", hints.join(" "), sql),
            // no optimizer-hint syntax
            Dialect::Sqlite | Dialect::Unknown => sql.to_string(),
        }
    }

    /// Regex for `FROM <table> [AS alias] [WITH (...)]`, accepting the quoted or
    /// bare table name.
    fn table_reference(&self, table: &str) -> Option<Regex> {
        let quoted = regex::escape(&self.dialect.quote_qualified(table));
        let bare = regex::escape(table);
        let pattern = format!(
            r"(?i)\bFROM\s+(?:{}|{}\b)(?:\s+AS\s+[^\s,()]+)?(?:\s+WITH\s*\((?P<hints>(?:[^()]|\([^()]*\))*)\))?",
            quoted, bare
        );
        match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                warn!(table, error = %err, "cannot build table reference pattern");
                None
            }
        }
    }

    fn merge_table_hint(&self, sql: &str, table: &str, token: &str) -> String {
        let Some(re) = self.table_reference(table) else {
            return sql.to_string();
        };
        let Some(caps) = re.captures(sql) else {
            trace!(table, "no FROM reference for table hint");
            return sql.to_string();
        };
        if caps.name("hints").is_some() {
            return merge_hint_list(sql, &caps, token);
        }
        let Some(whole) = caps.get(0) else {
            return sql.to_string();
        };
        let mut out = sql.to_string();
        out.insert_str(whole.end(), &format!(" WITH ({})", token));
        out
    }
}

/// Append `token` inside the captured `hints` list unless it is already there.
fn merge_hint_list(sql: &str, caps: &Captures<'_>, token: &str) -> String {
    let Some(existing) = caps.name("hints") else {
        return sql.to_string();
    };
    let current = existing.as_str().trim();
    let present = current
        .split(',')
        .map(str::trim)
        .any(|t| t.eq_ignore_ascii_case(token));
    if present {
        return sql.to_string();
    }
    let merged = if current.is_empty() {
        token.to_string()
    } else {
        format!("{}, {}", current, token)
    };
    format!("{}{}{}", &sql[..existing.start()], merged, &sql[existing.end()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::state::IndexMode;
    use pretty_assertions::assert_eq;

    fn sqlsrv() -> HintInjector {
        HintInjector::new(Dialect::from_driver("sqlsrv"))
    }

    #[test]
    fn test_lock_hint_added_then_merged() {
        let once = sqlsrv().lock_hint("SELECT * FROM [Orders]", "Orders", "NOLOCK");
        assert_eq!(once, "SELECT * FROM [Orders] WITH (NOLOCK)");

        let twice = sqlsrv().lock_hint(&once, "Orders", "NOLOCK");
        assert_eq!(twice, "SELECT * FROM [Orders] WITH (NOLOCK)");

        let other = sqlsrv().lock_hint(&once, "Orders", "readpast");
        assert_eq!(other, "SELECT * FROM [Orders] WITH (NOLOCK, READPAST)");
    }

    #[test]
    fn test_lock_hint_with_alias_and_where() {
        let sql = "SELECT * FROM [Orders] AS o WHERE o.[id] = @p1";
        assert_eq!(
            sqlsrv().lock_hint(sql, "Orders", "updlock"),
            "SELECT * FROM [Orders] AS o WITH (updlock) WHERE o.[id] = @p1"
        );
    }

    #[test]
    fn test_lock_hint_ignored_outside_sql_server() {
        let mysql = HintInjector::new(Dialect::MySql);
        assert_eq!(mysql.lock_hint("SELECT * FROM `Orders`", "Orders", "NOLOCK"), "SELECT * FROM `Orders`");
    }

    #[test]
    fn test_index_hints() {
        let hint = IndexHint {
            name: "idx_created".into(),
            mode: IndexMode::Force,
        };
        let mysql = HintInjector::new(Dialect::MySql);
        assert_eq!(
            mysql.index_hint("SELECT * FROM `orders` WHERE `id` = ?", "orders", &hint),
            "SELECT * FROM `orders` FORCE INDEX(idx_created) WHERE `id` = ?"
        );
        assert_eq!(
            sqlsrv().index_hint("SELECT * FROM [orders]", "orders", &hint),
            "SELECT * FROM [orders] WITH (INDEX(idx_created))"
        );
        let pg = HintInjector::new(Dialect::Postgres);
        assert_eq!(pg.index_hint("SELECT * FROM \"orders\"", "orders", &hint), "SELECT * FROM \"orders\"");
    }

    #[test]
    fn test_index_and_lock_share_with_clause() {
        let hints = Hints {
            index: Some(IndexHint {
                name: "ix_total".into(),
                mode: IndexMode::Use,
            }),
            lock_hint: Some("nolock".into()),
            ..Hints::default()
        };
        assert_eq!(
            sqlsrv().apply("SELECT * FROM [orders]", "orders", &hints),
            "SELECT * FROM [orders] WITH (INDEX(ix_total), NOLOCK)"
        );
    }

    #[test]
    fn test_optimizer_hints() {
        let hints = vec!["MAX_EXECUTION_TIME(1000)".to_string(), "NO_ICP(t1)".to_string()];
        assert_eq!(
            HintInjector::new(Dialect::MySql).optimizer_hints("SELECT * FROM `t1`", &hints),
            "SELECT /*+ MAX_EXECUTION_TIME(1000) NO_ICP(t1) */ * FROM `t1`"
        );
        assert_eq!(
            HintInjector::new(Dialect::Postgres).optimizer_hints("SELECT 1", &["SeqScan(t)".to_string()]),
            "/*+ SeqScan(t) */ SELECT 1"
        );
        assert_eq!(
            HintInjector::new(Dialect::Sqlite).optimizer_hints("SELECT 1", &hints),
            "SELECT 1"
        );
    }

    #[test]
    fn test_sql_server_option_clause_merges() {
        let first = sqlsrv().optimizer_hints("SELECT * FROM [t];", &["RECOMPILE".to_string()]);
        assert_eq!(first, "SELECT * FROM [t] OPTION (RECOMPILE)");
        let second = sqlsrv().optimizer_hints(&first, &["MAXDOP 1".to_string()]);
        assert_eq!(second, "SELECT * FROM [t] OPTION (RECOMPILE, MAXDOP 1)");
    }

    #[test]
    fn test_sql_server_option_clause_with_nested_parens_merges() {
        let sql = "SELECT * FROM [t] WHERE [id] = @p1 OPTION (OPTIMIZE FOR (@p1 = 1))";
        assert_eq!(
            sqlsrv().optimizer_hints(sql, &["RECOMPILE".to_string()]),
            "SELECT * FROM [t] WHERE [id] = @p1 OPTION (OPTIMIZE FOR (@p1 = 1), RECOMPILE)"
        );
    }

    #[test]
    fn test_normalize_lock_hint() {
        assert_eq!(normalize_lock_hint(" nolock "), "NOLOCK");
        assert_eq!(normalize_lock_hint("HOLDLOCK"), "HOLDLOCK");
        assert_eq!(normalize_lock_hint("tablockx"), "tablockx");
    }
}
