//! # sqlforge
//!
//! Fluent relational queries that compile to dialect-aware SQL.
//!
//! A [`DbContext`] wraps a [`Connection`] and the entity catalog. Queries are
//! composed with [`QueryBuilder`] and rendered for the connection's driver
//! (MySQL, PostgreSQL, SQL Server, SQLite) only when a terminal operation runs.
//!
//! ## Quick Example
//!
//! ```
//! use std::sync::Arc;
//! use sqlforge::prelude::*;
//!
//! let ctx = DbContext::new(Arc::new(OfflineConnection::new("pgsql")));
//! let query = ctx
//!     .query("users")
//!     .filter(col("active").eq(true))
//!     .order_by_desc(col("created_at"))
//!     .take(10);
//!
//! assert_eq!(
//!     query.to_sql(),
//!     "SELECT * FROM \"users\" WHERE \"active\" = $1 ORDER BY \"created_at\" DESC LIMIT 10"
//! );
//! ```
//!
//! ## Layers
//!
//! | Module         | Role                                                  |
//! |----------------|-------------------------------------------------------|
//! | [`query`]      | accumulated state, fluent builder, SQL rendering      |
//! | [`extensions`] | full-text, JSON, window and array fragments           |
//! | [`hints`]      | index, lock and optimizer hint splicing               |
//! | [`cache`]      | SQL/plan cache and compiled-query cache               |
//! | [`engine`]     | sqlx-backed connection                                |

pub mod cache;
pub mod config;
pub mod connection;
pub mod context;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod expr;
pub mod extensions;
pub mod hints;
mod loader;
pub mod query;

pub use cache::{CacheStats, CompiledQuery, CompiledQueryCache, SqlCache};
pub use config::ForgeConfig;
pub use connection::{Connection, ExecutionStats, OfflineConnection, QueryPlan, Row, Statement};
pub use context::{ChangeTracker, DbContext, EntityCatalog, EntityMeta, Navigation, NavigationKind};
pub use dialect::Dialect;
pub use error::{QueryError, QueryResult};
pub use query::QueryBuilder;

pub mod prelude {
    pub use crate::cache::{CacheStats, CompiledQuery, CompiledQueryCache, QuerySummary, SqlCache};
    pub use crate::config::{CacheConfig, ForgeConfig, QueryConfig};
    pub use crate::connection::{Connection, ExecutionStats, OfflineConnection, QueryPlan, Row, Statement};
    pub use crate::context::{ChangeTracker, DbContext, EntityCatalog, EntityMeta, Navigation, NavigationKind};
    pub use crate::dialect::Dialect;
    pub use crate::engine::SqlxConnection;
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::expr::{AggregateFunc, BinaryOp, Expr, Value, col, raw, val};
    pub use crate::extensions::{DialectExtensions, FullTextMode, SqlFragments};
    pub use crate::hints::HintInjector;
    pub use crate::query::{IndexMode, JoinKind, QueryBuilder, QueryState, SortDirection, TrackingMode};
}
