//! Eager loading of navigations with one follow-up query per path segment.
//!
//! Parent rows are matched on `parent[local_key] = child[foreign_key]`. Related
//! rows are attached under the navigation name: an array for collection
//! navigations and an object (or null) for reference navigations.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::connection::Row;
use crate::context::{DbContext, Navigation, NavigationKind};
use crate::error::{QueryError, QueryResult};
use crate::expr::{Value, col};
use crate::query::state::{IncludePath, TrackingMode};

/// Include paths merged into a tree, so shared prefixes load once.
#[derive(Debug)]
struct IncludeNode<'a> {
    name: &'a str,
    children: Vec<IncludeNode<'a>>,
}

fn build_tree(paths: &[IncludePath]) -> Vec<IncludeNode<'_>> {
    let mut roots = Vec::new();
    for path in paths {
        insert_path(&mut roots, &path.segments);
    }
    roots
}

fn insert_path<'a>(nodes: &mut Vec<IncludeNode<'a>>, segments: &'a [String]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let index = match nodes.iter().position(|node| node.name == head.as_str()) {
        Some(index) => index,
        None => {
            nodes.push(IncludeNode {
                name: head,
                children: Vec::new(),
            });
            nodes.len() - 1
        }
    };
    insert_path(&mut nodes[index].children, rest);
}

pub(crate) fn load_includes(
    ctx: &DbContext,
    entity: &str,
    paths: &[IncludePath],
    tracking: TrackingMode,
    rows: &mut [Row],
) -> QueryResult<()> {
    let tree = build_tree(paths);
    load_level(ctx, entity, &tree, tracking, rows)
}

fn load_level(
    ctx: &DbContext,
    entity: &str,
    nodes: &[IncludeNode<'_>],
    tracking: TrackingMode,
    rows: &mut [Row],
) -> QueryResult<()> {
    for node in nodes {
        let navigation = ctx
            .catalog()
            .navigation(entity, node.name)
            .cloned()
            .ok_or_else(|| QueryError::unknown_navigation(entity, node.name))?;

        let keys = distinct_keys(rows, &navigation.local_key);
        let mut related = if keys.is_empty() {
            Vec::new()
        } else {
            debug!(entity, navigation = node.name, keys = keys.len(), "loading include");
            let child = ctx
                .query(navigation.target.clone())
                .filter(col(navigation.foreign_key.clone()).in_list(keys))
                .no_cache();
            let child = match tracking {
                TrackingMode::Tracking => child.as_tracking(),
                TrackingMode::NoTracking => child.as_no_tracking(),
            };
            child.to_list()?
        };

        if !node.children.is_empty() {
            load_level(ctx, &navigation.target, &node.children, tracking, &mut related)?;
        }
        attach(rows, node.name, &navigation, related);
    }
    Ok(())
}

fn distinct_keys(rows: &[Row], column: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(column))
        .filter(|value| !value.is_null())
        .filter(|value| seen.insert(value.to_string()))
        .map(Value::from_json)
        .collect()
}

fn attach(rows: &mut [Row], name: &str, navigation: &Navigation, related: Vec<Row>) {
    let mut groups: HashMap<String, Vec<serde_json::Value>> = HashMap::new();
    for child in related {
        let Some(key) = child.get(&navigation.foreign_key).map(|v| v.to_string()) else {
            continue;
        };
        groups
            .entry(key)
            .or_default()
            .push(serde_json::Value::Object(child.into_iter().collect()));
    }

    for row in rows.iter_mut() {
        let matched = row
            .get(&navigation.local_key)
            .and_then(|key| groups.get(&key.to_string()));
        let value = match navigation.kind {
            NavigationKind::Many => serde_json::Value::Array(matched.cloned().unwrap_or_default()),
            NavigationKind::One => matched
                .and_then(|children| children.first().cloned())
                .unwrap_or(serde_json::Value::Null),
        };
        row.insert(name.to_string(), value);
    }
}
