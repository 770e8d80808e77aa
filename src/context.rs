//! Database context: connection, entity metadata and shared services.
//!
//! A [`DbContext`] is cheap to clone; every builder created from it shares the
//! same connection, catalog and cache service.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::SqlCache;
use crate::config::ForgeConfig;
use crate::connection::{Connection, Row};
use crate::dialect::Dialect;
use crate::query::{QueryBuilder, TrackingMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationKind {
    One,
    Many,
}

/// A relation from one entity to another, matched on
/// `parent.local_key = child.foreign_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigation {
    pub target: String,
    pub local_key: String,
    pub foreign_key: String,
    pub kind: NavigationKind,
}

impl Navigation {
    pub fn many(
        target: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
            kind: NavigationKind::Many,
        }
    }

    pub fn one(
        target: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: NavigationKind::One,
            ..Self::many(target, local_key, foreign_key)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub table: String,
    #[serde(default)]
    pub navigations: HashMap<String, Navigation>,
}

impl EntityMeta {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            navigations: HashMap::new(),
        }
    }

    pub fn with_navigation(mut self, name: impl Into<String>, navigation: Navigation) -> Self {
        self.navigations.insert(name.into(), navigation);
        self
    }
}

/// Entity metadata lookup.
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    entities: HashMap<String, EntityMeta>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: impl Into<String>, meta: EntityMeta) -> Self {
        self.register(entity, meta);
        self
    }

    pub fn register(&mut self, entity: impl Into<String>, meta: EntityMeta) {
        self.entities.insert(entity.into(), meta);
    }

    pub fn entity(&self, entity: &str) -> Option<&EntityMeta> {
        self.entities.get(entity)
    }

    /// Table backing `entity`; unmapped entities use their own name.
    pub fn table_for<'a>(&'a self, entity: &'a str) -> &'a str {
        self.entities
            .get(entity)
            .map(|meta| meta.table.as_str())
            .unwrap_or(entity)
    }

    pub fn navigation(&self, entity: &str, name: &str) -> Option<&Navigation> {
        self.entities.get(entity)?.navigations.get(name)
    }
}

/// Receives rows materialized under [`TrackingMode::Tracking`].
pub trait ChangeTracker: Send + Sync {
    fn track(&self, entity: &str, row: &Row);
}

#[derive(Clone)]
pub struct DbContext {
    connection: Arc<dyn Connection>,
    dialect: Dialect,
    catalog: Arc<EntityCatalog>,
    sql_cache: Option<Arc<SqlCache>>,
    tracker: Option<Arc<dyn ChangeTracker>>,
    default_tracking: TrackingMode,
    log_sql: bool,
}

impl DbContext {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        let dialect = Dialect::from_driver(connection.driver());
        Self {
            connection,
            dialect,
            catalog: Arc::new(EntityCatalog::default()),
            sql_cache: None,
            tracker: None,
            default_tracking: TrackingMode::Tracking,
            log_sql: false,
        }
    }

    /// Build a context whose defaults and SQL/plan cache come from `config`.
    pub fn from_config(connection: Arc<dyn Connection>, config: &ForgeConfig) -> Self {
        let mut ctx = Self::new(connection).with_default_tracking(config.query.default_tracking);
        ctx.log_sql = config.query.log_sql;
        if config.cache.enabled {
            ctx = ctx.with_sql_cache(Arc::new(SqlCache::from_config(&config.cache)));
        }
        ctx
    }

    pub fn with_catalog(mut self, catalog: EntityCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_sql_cache(mut self, cache: Arc<SqlCache>) -> Self {
        self.sql_cache = Some(cache);
        self
    }

    pub fn with_change_tracker(mut self, tracker: Arc<dyn ChangeTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_default_tracking(mut self, mode: TrackingMode) -> Self {
        self.default_tracking = mode;
        self
    }

    /// Start a query against `entity`.
    pub fn query(&self, entity: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(self, entity)
    }

    pub fn driver(&self) -> &str {
        self.connection.driver()
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    pub fn catalog(&self) -> &EntityCatalog {
        &self.catalog
    }

    pub fn sql_cache(&self) -> Option<&SqlCache> {
        self.sql_cache.as_deref()
    }

    pub fn change_tracker(&self) -> Option<&dyn ChangeTracker> {
        self.tracker.as_deref()
    }

    pub fn default_tracking(&self) -> TrackingMode {
        self.default_tracking
    }

    pub fn log_sql(&self) -> bool {
        self.log_sql
    }
}

impl fmt::Debug for DbContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbContext")
            .field("driver", &self.driver())
            .field("dialect", &self.dialect)
            .field("sql_cache", &self.sql_cache.is_some())
            .field("tracker", &self.tracker.is_some())
            .field("default_tracking", &self.default_tracking)
            .finish()
    }
}
