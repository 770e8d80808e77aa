//! Caches: rendered SQL and plans by fingerprint, compiled queries by key.

mod compiled;
mod fifo;
mod key;
mod sql;
mod stats;

pub use compiled::{CompiledQuery, CompiledQueryCache, QueryFactory};
pub use fifo::FifoMap;
pub use key::QuerySummary;
pub use sql::SqlCache;
pub use stats::CacheStats;
