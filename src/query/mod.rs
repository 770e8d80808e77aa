//! Query composition: accumulated state, the fluent builder and SQL rendering.

pub mod builder;
pub mod render;
pub mod state;

pub use builder::QueryBuilder;
pub use render::{AGGREGATE_ALIAS, Projection, RenderedSql, Renderer};
pub use state::{
    Hints, IncludePath, IndexHint, IndexMode, Join, JoinKind, JoinTarget, OrderBy, QueryState,
    RawSql, SelectItem, SortDirection, TrackingMode,
};
