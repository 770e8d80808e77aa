//! SQL dialects and their lexical rules.
//!
//! Driver identifiers are matched case-insensitively and aliases collapse onto
//! one variant. Anything unrecognized becomes [`Dialect::Unknown`], which passes
//! identifiers through unescaped and has no dialect-specific features.

use serde::{Deserialize, Serialize};

use crate::expr::Value;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    MySql,
    Postgres,
    SqlServer,
    Sqlite,
    #[default]
    Unknown,
}

impl Dialect {
    /// Resolve a driver identifier (`mysqli`, `pgsql`, `sqlsrv`, ...) to a dialect.
    pub fn from_driver(driver: &str) -> Self {
        match driver.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mysqli" => Dialect::MySql,
            "postgre" | "pgsql" | "postgres" | "postgresql" => Dialect::Postgres,
            "sqlsrv" | "sqlserver" | "mssql" => Dialect::SqlServer,
            "sqlite" | "sqlite3" => Dialect::Sqlite,
            _ => Dialect::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::SqlServer => "sqlserver",
            Dialect::Sqlite => "sqlite",
            Dialect::Unknown => "unknown",
        }
    }

    /// Quote a single identifier, doubling any embedded closing delimiter.
    pub fn quote_identifier(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::SqlServer => format!("[{}]", ident.replace(']', "]]")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
            Dialect::Unknown => ident.to_string(),
        }
    }

    /// Quote a possibly qualified name (`schema.table`, `alias.column`, `alias.*`).
    pub fn quote_qualified(&self, path: &str) -> String {
        path.split('.')
            .map(|part| {
                if part == "*" {
                    part.to_string()
                } else {
                    self.quote_identifier(part)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Single-quote a string literal, doubling embedded single quotes.
    ///
    /// This is minimal injection protection for interpolated fragments and is no
    /// substitute for parameter binding.
    pub fn quote_literal(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Render a value as an inline SQL literal.
    pub fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => match self {
                Dialect::Postgres => (if *b { "TRUE" } else { "FALSE" }).to_string(),
                _ => (if *b { "1" } else { "0" }).to_string(),
            },
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => self.quote_literal(s),
            Value::Json(j) => self.quote_literal(&j.to_string()),
            Value::Timestamp(ts) => self.quote_literal(&ts.to_rfc3339()),
        }
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::SqlServer => format!("@p{}", index),
            Dialect::MySql | Dialect::Sqlite | Dialect::Unknown => "?".to_string(),
        }
    }

    /// Statement prefix that asks the engine for its execution plan, if it has one.
    pub fn explain_prefix(&self) -> Option<&'static str> {
        match self {
            Dialect::MySql | Dialect::Postgres => Some("EXPLAIN "),
            Dialect::Sqlite => Some("EXPLAIN QUERY PLAN "),
            Dialect::SqlServer | Dialect::Unknown => None,
        }
    }
}

impl From<&str> for Dialect {
    fn from(driver: &str) -> Self {
        Dialect::from_driver(driver)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
