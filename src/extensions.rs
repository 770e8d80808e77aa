//! Dialect-specific SQL fragments.
//!
//! [`SqlFragments`] generates the fragment for the active dialect, or `None`
//! when the dialect has no mapping. [`DialectExtensions`] splices fragments into
//! a [`QueryBuilder`] through its raw select/filter operations; a feature
//! without a mapping leaves the builder unchanged.
//!
//! Fragment values are interpolated as escaped literals, not bound parameters.

use tracing::trace;

use crate::dialect::Dialect;
use crate::expr::Value;
use crate::query::{QueryBuilder, SortDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullTextMode {
    #[default]
    NaturalLanguage,
    Boolean,
    QueryExpansion,
}

impl FullTextMode {
    fn mysql_modifier(&self) -> &'static str {
        match self {
            FullTextMode::NaturalLanguage => "IN NATURAL LANGUAGE MODE",
            FullTextMode::Boolean => "IN BOOLEAN MODE",
            FullTextMode::QueryExpansion => "WITH QUERY EXPANSION",
        }
    }
}

/// Fragment generator for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct SqlFragments {
    dialect: Dialect,
}

impl SqlFragments {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    fn column(&self, column: &str) -> String {
        self.dialect.quote_qualified(column)
    }

    fn columns(&self, columns: &[&str], separator: &str) -> String {
        columns
            .iter()
            .map(|c| self.column(c))
            .collect::<Vec<_>>()
            .join(separator)
    }

    pub fn full_text_search(&self, columns: &[&str], term: &str, mode: FullTextMode) -> Option<String> {
        if columns.is_empty() {
            return None;
        }
        let term = self.dialect.quote_literal(term);
        match self.dialect {
            Dialect::MySql => Some(format!(
                "MATCH({}) AGAINST({} {})",
                self.columns(columns, ","),
                term,
                mode.mysql_modifier()
            )),
            Dialect::Postgres => Some(format!(
                "to_tsvector('english',{}) @@ to_tsquery('english',{})",
                self.columns(columns, " || ' ' || "),
                term
            )),
            Dialect::SqlServer => {
                let target = match columns {
                    [single] => self.column(single),
                    many => format!("({})", self.columns(many, ",")),
                };
                Some(format!("CONTAINS({},{})", target, term))
            }
            Dialect::Sqlite | Dialect::Unknown => None,
        }
    }

    pub fn json_extract(&self, column: &str, path: &str) -> Option<String> {
        let col = self.column(column);
        let path = self.dialect.quote_literal(path);
        match self.dialect {
            Dialect::MySql => Some(format!("JSON_EXTRACT({},{})", col, path)),
            Dialect::Postgres => Some(format!("{}->>{}", col, path)),
            Dialect::SqlServer => Some(format!("JSON_VALUE({},{})", col, path)),
            Dialect::Sqlite => Some(format!("json_extract({},{})", col, path)),
            Dialect::Unknown => None,
        }
    }

    /// Containment test of `value` at `path`. Postgres turns a `$.a.b` path into
    /// the nested object `{"a":{"b":value}}` for `@>`.
    pub fn json_contains(&self, column: &str, value: &serde_json::Value, path: &str) -> Option<String> {
        let col = self.column(column);
        match self.dialect {
            Dialect::MySql | Dialect::SqlServer => Some(format!(
                "JSON_CONTAINS({},{},{})",
                col,
                self.dialect.quote_literal(&value.to_string()),
                self.dialect.quote_literal(path)
            )),
            Dialect::Postgres => {
                let document = path
                    .trim_start_matches('$')
                    .split('.')
                    .filter(|segment| !segment.is_empty())
                    .rev()
                    .fold(value.clone(), |inner, segment| {
                        serde_json::Value::Object(serde_json::Map::from_iter([(segment.to_string(), inner)]))
                    });
                Some(format!(
                    "{} @> {}::jsonb",
                    col,
                    self.dialect.quote_literal(&document.to_string())
                ))
            }
            Dialect::Sqlite | Dialect::Unknown => None,
        }
    }

    pub fn json_array_length(&self, column: &str) -> Option<String> {
        let col = self.column(column);
        match self.dialect {
            Dialect::MySql => Some(format!("JSON_LENGTH({})", col)),
            Dialect::Postgres => Some(format!("jsonb_array_length({})", col)),
            Dialect::Sqlite => Some(format!("json_array_length({})", col)),
            Dialect::SqlServer | Dialect::Unknown => None,
        }
    }

    pub fn array_contains(&self, column: &str, value: &Value) -> Option<String> {
        match self.dialect {
            Dialect::Postgres => Some(format!(
                "{} @> ARRAY[{}]",
                self.column(column),
                self.dialect.literal(value)
            )),
            _ => None,
        }
    }

    pub fn array_length(&self, column: &str) -> Option<String> {
        match self.dialect {
            Dialect::Postgres => Some(format!("array_length({},1)", self.column(column))),
            _ => None,
        }
    }

    /// `function OVER (PARTITION BY .. ORDER BY ..)`; empty clauses are omitted.
    pub fn window_function(
        &self,
        function: &str,
        partition_by: &[&str],
        order_by: &[(&str, SortDirection)],
    ) -> String {
        let mut clauses = Vec::new();
        if !partition_by.is_empty() {
            clauses.push(format!("PARTITION BY {}", self.columns(partition_by, ", ")));
        }
        if !order_by.is_empty() {
            let keys = order_by
                .iter()
                .map(|(column, direction)| format!("{} {}", self.column(column), direction.as_sql()))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("ORDER BY {}", keys));
        }
        format!("{} OVER ({})", function, clauses.join(" "))
    }
}

/// Dialect-dispatched operations on a query builder.
pub trait DialectExtensions: Sized {
    /// Filter by a full-text match. No-op on sqlite.
    fn full_text_search(self, columns: &[&str], term: &str, mode: FullTextMode) -> Self;

    /// Select the value at a JSON path.
    fn json_extract(self, column: &str, path: &str, alias: Option<&str>) -> Self;

    /// Filter rows whose JSON document contains `value` at `path`.
    fn json_contains(self, column: &str, value: &serde_json::Value, path: &str) -> Self;

    fn json_array_length(self, column: &str, alias: Option<&str>) -> Self;

    /// Postgres array containment filter.
    fn array_contains(self, column: &str, value: impl Into<Value>) -> Self;

    /// Postgres array length projection.
    fn array_length(self, column: &str, alias: Option<&str>) -> Self;

    /// Select a window function call under `alias`.
    fn window_function(
        self,
        function: &str,
        partition_by: &[&str],
        order_by: &[(&str, SortDirection)],
        alias: &str,
    ) -> Self;

    fn row_number(self, partition_by: &[&str], order_by: &[(&str, SortDirection)], alias: &str) -> Self {
        self.window_function("ROW_NUMBER()", partition_by, order_by, alias)
    }

    fn rank(self, partition_by: &[&str], order_by: &[(&str, SortDirection)], alias: &str) -> Self {
        self.window_function("RANK()", partition_by, order_by, alias)
    }

    fn dense_rank(self, partition_by: &[&str], order_by: &[(&str, SortDirection)], alias: &str) -> Self {
        self.window_function("DENSE_RANK()", partition_by, order_by, alias)
    }
}

impl QueryBuilder {
    fn fragments(&self) -> SqlFragments {
        SqlFragments::new(self.dialect())
    }

    fn select_fragment(self, feature: &str, fragment: Option<String>, alias: Option<&str>) -> Self {
        match (fragment, alias) {
            (Some(sql), Some(alias)) => self.select_raw_as(sql, Vec::new(), alias),
            (Some(sql), None) => self.select_raw(sql, Vec::new()),
            (None, _) => {
                trace!(feature, dialect = %self.dialect(), "no mapping for dialect; skipped");
                self
            }
        }
    }

    fn filter_fragment(self, feature: &str, fragment: Option<String>) -> Self {
        match fragment {
            Some(sql) => self.filter_raw(sql, Vec::new()),
            None => {
                trace!(feature, dialect = %self.dialect(), "no mapping for dialect; skipped");
                self
            }
        }
    }
}

impl DialectExtensions for QueryBuilder {
    fn full_text_search(self, columns: &[&str], term: &str, mode: FullTextMode) -> Self {
        let fragment = self.fragments().full_text_search(columns, term, mode);
        self.filter_fragment("full_text_search", fragment)
    }

    fn json_extract(self, column: &str, path: &str, alias: Option<&str>) -> Self {
        let fragment = self.fragments().json_extract(column, path);
        self.select_fragment("json_extract", fragment, alias)
    }

    fn json_contains(self, column: &str, value: &serde_json::Value, path: &str) -> Self {
        let fragment = self.fragments().json_contains(column, value, path);
        self.filter_fragment("json_contains", fragment)
    }

    fn json_array_length(self, column: &str, alias: Option<&str>) -> Self {
        let fragment = self.fragments().json_array_length(column);
        self.select_fragment("json_array_length", fragment, alias)
    }

    fn array_contains(self, column: &str, value: impl Into<Value>) -> Self {
        let fragment = self.fragments().array_contains(column, &value.into());
        self.filter_fragment("array_contains", fragment)
    }

    fn array_length(self, column: &str, alias: Option<&str>) -> Self {
        let fragment = self.fragments().array_length(column);
        self.select_fragment("array_length", fragment, alias)
    }

    fn window_function(
        self,
        function: &str,
        partition_by: &[&str],
        order_by: &[(&str, SortDirection)],
        alias: &str,
    ) -> Self {
        let fragment = self.fragments().window_function(function, partition_by, order_by);
        self.select_raw_as(fragment, Vec::new(), alias)
    }
}
