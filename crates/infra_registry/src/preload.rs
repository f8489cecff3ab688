//! Association eager loading
//!
//! Eager-load paths are dot paths over association names, such as
//! `"Branch.Organization"`. Paths are validated once against the schema's
//! association graph and kept as a [`PreloadTree`]. Loading runs one query
//! per tree node and attaches the related rows to their parents as
//! [`FieldValue::One`] or [`FieldValue::Many`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use uuid::Uuid;

use crate::entity::{Association, AssociationKind, Schema};
use crate::error::{RegistryError, StorageError};
use crate::filter::{Filter, FilterSet, Query, Sort, SortSet};
use crate::store::{Store, StoreTransaction};
use crate::value::{FieldValue, Record};

/// One association to load, with the associations to load beneath it
#[derive(Debug, Clone)]
pub struct PreloadNode {
    pub association: Association,
    pub children: PreloadTree,
}

/// Validated set of eager-load paths rooted at one schema
#[derive(Debug, Clone, Default)]
pub struct PreloadTree {
    nodes: Vec<PreloadNode>,
}

impl PreloadTree {
    /// Validates and merges a list of dot paths
    ///
    /// # Errors
    ///
    /// Returns a configuration error for empty segments or association
    /// names the schema graph does not define.
    pub fn parse<S: AsRef<str>>(schema: &'static Schema, paths: &[S]) -> Result<Self, RegistryError> {
        let mut tree = Self::default();
        for path in paths {
            tree.insert(schema, path.as_ref())?;
        }
        Ok(tree)
    }

    /// Validates one dot path and adds it to the tree
    pub fn insert(&mut self, schema: &'static Schema, path: &str) -> Result<(), RegistryError> {
        let mut current_schema = schema;
        let mut current = self;
        for segment in path.split('.') {
            if segment.is_empty() {
                return Err(RegistryError::configuration(format!(
                    "malformed eager-load path '{}' on {}",
                    path, schema.name
                )));
            }
            let association = *current_schema.association(segment).ok_or_else(|| {
                RegistryError::configuration(format!(
                    "unknown association '{}' in eager-load path '{}' on {}",
                    segment, path, schema.name
                ))
            })?;
            let position = match current.nodes.iter().position(|n| n.association.name == segment) {
                Some(position) => position,
                None => {
                    current.nodes.push(PreloadNode {
                        association,
                        children: PreloadTree::default(),
                    });
                    current.nodes.len() - 1
                }
            };
            current_schema = (association.target)();
            current = &mut current.nodes[position].children;
        }
        Ok(())
    }

    /// Returns a copy of this tree widened by extra paths
    pub fn widened<S: AsRef<str>>(&self, schema: &'static Schema, paths: &[S]) -> Result<Self, RegistryError> {
        let mut tree = self.clone();
        for path in paths {
            tree.insert(schema, path.as_ref())?;
        }
        Ok(tree)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[PreloadNode] {
        &self.nodes
    }

    /// Flattens the tree back into dot paths, leaves only
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for node in &self.nodes {
            if node.children.is_empty() {
                paths.push(node.association.name.to_string());
            } else {
                for child in node.children.paths() {
                    paths.push(format!("{}.{}", node.association.name, child));
                }
            }
        }
        paths
    }
}

/// Where eager-load queries run
pub enum Source<'s> {
    Store(&'s dyn Store),
    Tx(&'s mut dyn StoreTransaction),
}

impl Source<'_> {
    async fn select(&mut self, schema: &'static Schema, query: &Query) -> Result<Vec<Record>, StorageError> {
        match self {
            Source::Store(store) => store.select(schema, query).await,
            Source::Tx(tx) => tx.select(schema, query).await,
        }
    }
}

type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + 'a>>;

fn live_filters(schema: &Schema, filter: Filter) -> FilterSet {
    let filters = FilterSet::new().and(filter);
    if schema.is_soft_delete() {
        filters.and(Filter::is_empty("deleted_at"))
    } else {
        filters
    }
}

fn uuid_of(record: &Record, column: &str) -> Option<Uuid> {
    match record.value_or_null(column) {
        FieldValue::Uuid(id) => Some(*id),
        _ => None,
    }
}

/// Loads every association in `tree` into `rows`
pub fn load<'a, 's: 'a>(
    source: &'a mut Source<'s>,
    tree: &'a PreloadTree,
    rows: &'a mut Vec<Record>,
) -> LoadFuture<'a> {
    Box::pin(async move {
        if rows.is_empty() {
            return Ok(());
        }
        for node in &tree.nodes {
            let name = node.association.name;
            let target = (node.association.target)();
            match node.association.kind {
                AssociationKind::BelongsTo { foreign_key } => {
                    let mut keys: Vec<Uuid> = rows.iter().filter_map(|r| uuid_of(r, foreign_key)).collect();
                    keys.sort();
                    keys.dedup();

                    let mut related = if keys.is_empty() {
                        Vec::new()
                    } else {
                        let query = Query::filtered(live_filters(target, Filter::in_list("id", keys)));
                        source.select(target, &query).await?
                    };
                    load(source, &node.children, &mut related).await?;

                    let by_id: HashMap<Uuid, Record> = related
                        .into_iter()
                        .filter_map(|r| r.id().map(|id| (id, r)))
                        .collect();
                    for row in rows.iter_mut() {
                        let value = uuid_of(row, foreign_key)
                            .and_then(|id| by_id.get(&id))
                            .map_or(FieldValue::Null, |r| FieldValue::One(Box::new(r.clone())));
                        row.set(name, value);
                    }
                }
                AssociationKind::HasMany { foreign_key } => {
                    let keys: Vec<Uuid> = rows.iter().filter_map(Record::id).collect();
                    let query = Query::filtered(live_filters(target, Filter::in_list(foreign_key, keys)))
                        .with_sorts(SortSet::new().then(Sort::asc("created_at")).then(Sort::asc("id")));
                    let mut related = source.select(target, &query).await?;
                    load(source, &node.children, &mut related).await?;

                    let mut groups: HashMap<Uuid, Vec<Record>> = HashMap::new();
                    for record in related {
                        if let Some(parent) = uuid_of(&record, foreign_key) {
                            groups.entry(parent).or_default().push(record);
                        }
                    }
                    for row in rows.iter_mut() {
                        let children = row.id().and_then(|id| groups.remove(&id)).unwrap_or_default();
                        row.set(name, FieldValue::Many(children));
                    }
                }
            }
        }
        Ok(())
    })
}
