//! Generic entity registry
//!
//! A [`Registry`] gives one entity type uniform create, read, update and
//! delete semantics over a [`Store`]: eager loading of configured
//! associations, filter/sort queries, participation in caller-owned
//! transactions, and one notification per successful mutation, dispatched
//! after commit with the topics of the mutated entity.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = RegistryConfig::new(store, dispatcher, branch_response)
//!     .preload("Organization")
//!     .build()?;
//!
//! let branch = registry.create(&ctx, Branch::new(org_id, "Main", "MAIN")).await?;
//! let loaded = registry.get_by_id(&ctx, branch.id).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use core_kernel::{EntityId, OperationContext};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::dispatch::Dispatcher;
use crate::entity::{db_now, DeletePolicy, Entity, Schema};
use crate::error::RegistryError;
use crate::filter::{Filter, FilterSet, Query, Sort, SortSet};
use crate::preload::{self, PreloadTree, Source};
use crate::projector::{project_many, project_one, Projector};
use crate::store::Store;
use crate::topic::{Lifecycle, LifecycleTopics, Topic};
use crate::transaction::{with_deadline, PendingNotification, Transaction};
use crate::value::{FieldValue, Record};

/// Construction parameters for a [`Registry`]
pub struct RegistryConfig<E: Entity, R> {
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn Dispatcher>,
    projector: Projector<E, R>,
    preloads: Vec<String>,
    topics: LifecycleTopics<E>,
}

impl<E: Entity, R: Serialize + 'static> RegistryConfig<E, R> {
    /// Creates a configuration with the standard topic builders and no eager loads
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<dyn Dispatcher>,
        projector: impl Fn(&E) -> R + Send + Sync + 'static,
    ) -> Self {
        Self {
            store,
            dispatcher,
            projector: Arc::new(projector),
            preloads: Vec::new(),
            topics: LifecycleTopics::default(),
        }
    }

    /// Adds an eager-load path such as `"Branch.Organization"`
    pub fn preload(mut self, path: impl Into<String>) -> Self {
        self.preloads.push(path.into());
        self
    }

    pub fn preloads<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preloads.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn on_create(mut self, builder: impl Fn(&E) -> Vec<Topic> + Send + Sync + 'static) -> Self {
        self.topics.on_create = Arc::new(builder);
        self
    }

    pub fn on_update(mut self, builder: impl Fn(&E) -> Vec<Topic> + Send + Sync + 'static) -> Self {
        self.topics.on_update = Arc::new(builder);
        self
    }

    pub fn on_delete(mut self, builder: impl Fn(&E) -> Vec<Topic> + Send + Sync + 'static) -> Self {
        self.topics.on_delete = Arc::new(builder);
        self
    }

    /// Validates the eager-load paths and builds the registry
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when a path does not follow the entity's
    /// association graph.
    pub fn build(self) -> Result<Registry<E, R>, RegistryError> {
        let preloads = PreloadTree::parse(E::schema(), &self.preloads)?;
        debug!(
            entity = E::schema().name,
            backend = self.store.backend(),
            preloads = ?preloads.paths(),
            "Registry configured"
        );
        Ok(Registry {
            store: self.store,
            dispatcher: self.dispatcher,
            projector: self.projector,
            preloads,
            topics: self.topics,
        })
    }
}

/// CRUD and query facade for one entity type
///
/// `E` is the entity, `R` its response shape. A registry only holds
/// immutable configuration and can be shared freely across tasks.
pub struct Registry<E: Entity, R> {
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn Dispatcher>,
    projector: Projector<E, R>,
    preloads: PreloadTree,
    topics: LifecycleTopics<E>,
}

impl<E: Entity, R> Clone for Registry<E, R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            dispatcher: Arc::clone(&self.dispatcher),
            projector: Arc::clone(&self.projector),
            preloads: self.preloads.clone(),
            topics: self.topics.clone(),
        }
    }
}

impl<E: Entity, R> fmt::Debug for Registry<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entity", &E::schema().name)
            .field("store", &self.store)
            .field("preloads", &self.preloads.paths())
            .finish_non_exhaustive()
    }
}

fn schema_of<E: Entity>() -> &'static Schema {
    E::schema()
}

impl<E: Entity, R: Serialize + 'static> Registry<E, R> {
    /// Builds a fresh registry from its configuration
    pub fn new(config: RegistryConfig<E, R>) -> Result<Self, RegistryError> {
        config.build()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Eager-load paths applied to every read
    pub fn preload_paths(&self) -> Vec<String> {
        self.preloads.paths()
    }

    /// Opens a transaction on this registry's store
    pub async fn start_transaction(&self, ctx: &OperationContext) -> Result<Transaction, RegistryError> {
        Transaction::begin(self.store.as_ref(), ctx.clone()).await
    }

    /// Commits on success; on failure rolls back and returns the original error
    ///
    /// When the commit succeeds but dispatch fails, the committed entity is
    /// attached to the `Notification` error.
    async fn settle<T>(&self, mut tx: Transaction, result: Result<T, RegistryError>) -> Result<T, RegistryError>
    where
        T: Send + Sync + 'static,
    {
        match result {
            Ok(value) => match tx.commit().await {
                Ok(()) => Ok(value),
                Err(error) => Err(error.with_committed(value)),
            },
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(entity = schema_of::<E>().name, error = %rollback_error, "Rollback failed");
                }
                Err(error)
            }
        }
    }

    fn id_query(id: E::Id) -> Query {
        Query::filtered(FilterSet::new().and(Filter::eq("id", FieldValue::id(id))))
    }

    /// Validates a caller query and hides soft-deleted rows
    fn visible(query: Query) -> Result<Query, RegistryError> {
        let schema = schema_of::<E>();
        query.validate(schema)?;
        let mut query = query;
        if schema.delete_policy == DeletePolicy::Soft {
            query.filters.push(Filter::is_empty("deleted_at"));
        }
        Ok(query)
    }

    fn decode(operation: &'static str, target: &str, rows: Vec<Record>) -> Result<Vec<E>, RegistryError> {
        rows.iter()
            .map(|row| {
                E::from_record(row)
                    .map_err(|e| RegistryError::storage(operation, schema_of::<E>().name, target, e))
            })
            .collect()
    }

    async fn fetch(
        &self,
        ctx: &OperationContext,
        operation: &'static str,
        target: &str,
        query: Query,
        preloads: &PreloadTree,
    ) -> Result<Vec<E>, RegistryError> {
        let schema = schema_of::<E>();
        let query = Self::visible(query)?;
        let rows = with_deadline(ctx, operation, async {
            let mut rows = self
                .store
                .select(schema, &query)
                .await
                .map_err(|e| RegistryError::storage(operation, schema.name, target, e))?;
            let mut source = Source::Store(self.store.as_ref());
            preload::load(&mut source, preloads, &mut rows)
                .await
                .map_err(|e| RegistryError::storage(operation, schema.name, target, e))?;
            Ok(rows)
        })
        .await?;
        Self::decode(operation, target, rows)
    }

    async fn fetch_with_tx(
        &self,
        ctx: &OperationContext,
        tx: &mut Transaction,
        operation: &'static str,
        target: &str,
        query: Query,
        preloads: &PreloadTree,
    ) -> Result<Vec<E>, RegistryError> {
        let schema = schema_of::<E>();
        let query = Self::visible(query)?;
        let handle = tx.handle()?;
        let rows = with_deadline(ctx, operation, async {
            let mut rows = handle
                .select(schema, &query)
                .await
                .map_err(|e| RegistryError::storage(operation, schema.name, target, e))?;
            let mut source = Source::Tx(handle);
            preload::load(&mut source, preloads, &mut rows)
                .await
                .map_err(|e| RegistryError::storage(operation, schema.name, target, e))?;
            Ok(rows)
        })
        .await?;
        Self::decode(operation, target, rows)
    }

    /// Reloads a just-written row with the configured eager loads
    async fn reload_with_tx(
        &self,
        ctx: &OperationContext,
        tx: &mut Transaction,
        operation: &'static str,
        row: Record,
    ) -> Result<E, RegistryError> {
        let target = row.id().map(|id| id.to_string()).unwrap_or_default();
        let schema = schema_of::<E>();
        let mut rows = vec![row];
        if !self.preloads.is_empty() {
            let handle = tx.handle()?;
            with_deadline(ctx, operation, async {
                let mut source = Source::Tx(handle);
                preload::load(&mut source, &self.preloads, &mut rows)
                    .await
                    .map_err(|e| RegistryError::storage(operation, schema.name, &target, e))
            })
            .await?;
        }
        Self::decode(operation, &target, rows)?
            .pop()
            .ok_or_else(|| RegistryError::not_found(operation, schema.name, &target))
    }

    /// Queues the notification for a mutation on `tx`
    fn enqueue(&self, tx: &mut Transaction, event: Lifecycle, entity: &E) {
        let topics = self.topics.build(event, entity);
        let payload = serde_json::to_value((self.projector)(entity)).map_err(|e| e.to_string());
        debug!(
            entity = schema_of::<E>().name,
            %event,
            topics = topics.len(),
            "Notification queued"
        );
        tx.enqueue(PendingNotification {
            entity: schema_of::<E>().name,
            target: entity.id().to_string(),
            topics,
            payload,
            dispatcher: Arc::clone(&self.dispatcher),
        });
    }

    /// Inserts an entity in its own transaction
    ///
    /// A nil id is replaced by a freshly generated one. Audit columns are
    /// stamped from the context actor. The creation notification is sent
    /// after commit.
    #[instrument(skip_all, fields(entity = schema_of::<E>().name))]
    pub async fn create(&self, ctx: &OperationContext, entity: E) -> Result<E, RegistryError> {
        let mut tx = self.start_transaction(ctx).await?;
        let result = self.create_with_tx(ctx, &mut tx, entity).await;
        self.settle(tx, result).await
    }

    /// Inserts an entity inside a caller-owned transaction
    #[instrument(skip_all, fields(entity = schema_of::<E>().name))]
    pub async fn create_with_tx(
        &self,
        ctx: &OperationContext,
        tx: &mut Transaction,
        mut entity: E,
    ) -> Result<E, RegistryError> {
        let schema = schema_of::<E>();
        if entity.id().is_nil() {
            entity.set_id(<E::Id as EntityId>::generate());
        }
        entity.audit_mut().stamp_created(ctx.actor, db_now());
        let id = entity.id();
        let record = entity.to_record();

        let handle = tx.handle()?;
        let stored = with_deadline(ctx, "create", async {
            handle
                .insert(schema, &record)
                .await
                .map_err(|e| RegistryError::storage("create", schema.name, id, e))
        })
        .await?;
        let created = self.reload_with_tx(ctx, tx, "create", stored).await?;
        debug!(%id, "Entity created");
        self.enqueue(tx, Lifecycle::Create, &created);
        Ok(created)
    }

    /// Replaces the stored entity `id` in its own transaction
    #[instrument(skip_all, fields(entity = schema_of::<E>().name, id = %id))]
    pub async fn update_by_id(&self, ctx: &OperationContext, id: E::Id, entity: E) -> Result<E, RegistryError> {
        let mut tx = self.start_transaction(ctx).await?;
        let result = self.update_by_id_with_tx(ctx, &mut tx, id, entity).await;
        self.settle(tx, result).await
    }

    /// Replaces the stored entity identified by `entity.id()`
    pub async fn update(&self, ctx: &OperationContext, entity: E) -> Result<E, RegistryError> {
        let id = entity.id();
        self.update_by_id(ctx, id, entity).await
    }

    /// Replaces the stored entity `id` inside a caller-owned transaction
    ///
    /// `id`, `created_at` and `created_by_id` are kept from storage;
    /// `updated_at` moves strictly forward; the soft-delete marker is
    /// never touched.
    #[instrument(skip_all, fields(entity = schema_of::<E>().name, id = %id))]
    pub async fn update_by_id_with_tx(
        &self,
        ctx: &OperationContext,
        tx: &mut Transaction,
        id: E::Id,
        mut entity: E,
    ) -> Result<E, RegistryError> {
        let schema = schema_of::<E>();
        let target = id.to_string();
        let current = self
            .fetch_with_tx(ctx, tx, "update", &target, Self::id_query(id), &PreloadTree::default())
            .await?
            .pop()
            .ok_or_else(|| RegistryError::not_found("update", schema.name, &target))?;

        entity.set_id(id);
        let stored_audit = *current.audit();
        entity.audit_mut().stamp_updated(&stored_audit, ctx.actor, db_now());
        let mut record = entity.to_record();
        record.remove("deleted_at");
        record.remove("deleted_by_id");

        let handle = tx.handle()?;
        let stored = with_deadline(ctx, "update", async {
            handle
                .update(schema, *id.as_uuid(), &record)
                .await
                .map_err(|e| RegistryError::storage("update", schema.name, &target, e))
        })
        .await?;
        let updated = self.reload_with_tx(ctx, tx, "update", stored).await?;
        debug!("Entity updated");
        self.enqueue(tx, Lifecycle::Update, &updated);
        Ok(updated)
    }

    /// Loads entity `id`, applies `patch` to it and persists the result
    pub async fn patch_by_id<F>(&self, ctx: &OperationContext, id: E::Id, patch: F) -> Result<E, RegistryError>
    where
        F: FnOnce(&mut E) + Send,
    {
        let mut tx = self.start_transaction(ctx).await?;
        let result = self.patch_by_id_with_tx(ctx, &mut tx, id, patch).await;
        self.settle(tx, result).await
    }

    /// Partial update inside a caller-owned transaction
    #[instrument(skip_all, fields(entity = schema_of::<E>().name, id = %id))]
    pub async fn patch_by_id_with_tx<F>(
        &self,
        ctx: &OperationContext,
        tx: &mut Transaction,
        id: E::Id,
        patch: F,
    ) -> Result<E, RegistryError>
    where
        F: FnOnce(&mut E) + Send,
    {
        let target = id.to_string();
        let mut current = self
            .fetch_with_tx(ctx, tx, "patch", &target, Self::id_query(id), &PreloadTree::default())
            .await?
            .pop()
            .ok_or_else(|| RegistryError::not_found("patch", schema_of::<E>().name, &target))?;
        patch(&mut current);
        self.update_by_id_with_tx(ctx, tx, id, current).await
    }

    /// Deletes entity `id` in its own transaction and returns its last state
    #[instrument(skip_all, fields(entity = schema_of::<E>().name, id = %id))]
    pub async fn delete(&self, ctx: &OperationContext, id: E::Id) -> Result<E, RegistryError> {
        let mut tx = self.start_transaction(ctx).await?;
        let result = self.delete_with_tx(ctx, &mut tx, id).await;
        self.settle(tx, result).await
    }

    /// Deletes entity `id` inside a caller-owned transaction
    ///
    /// Soft-delete entities get `deleted_at`/`deleted_by_id` set and
    /// disappear from reads; others are removed. Delete topics are built
    /// from the snapshot taken before removal.
    #[instrument(skip_all, fields(entity = schema_of::<E>().name, id = %id))]
    pub async fn delete_with_tx(
        &self,
        ctx: &OperationContext,
        tx: &mut Transaction,
        id: E::Id,
    ) -> Result<E, RegistryError> {
        let schema = schema_of::<E>();
        let target = id.to_string();
        let snapshot = self
            .fetch_with_tx(ctx, tx, "delete", &target, Self::id_query(id), &self.preloads)
            .await?
            .pop()
            .ok_or_else(|| RegistryError::not_found("delete", schema.name, &target))?;

        let handle = tx.handle()?;
        with_deadline(ctx, "delete", async {
            let outcome = match schema.delete_policy {
                DeletePolicy::Hard => handle.delete(schema, *id.as_uuid()).await,
                DeletePolicy::Soft => {
                    let marker = Record::new()
                        .with("deleted_at", db_now())
                        .with("deleted_by_id", ctx.actor);
                    handle.update(schema, *id.as_uuid(), &marker).await.map(|_| ())
                }
            };
            outcome.map_err(|e| RegistryError::storage("delete", schema.name, &target, e))
        })
        .await?;
        debug!(policy = ?schema.delete_policy, "Entity deleted");
        self.enqueue(tx, Lifecycle::Delete, &snapshot);
        Ok(snapshot)
    }

    /// Fetches entity `id` with the configured eager loads
    #[instrument(skip_all, fields(entity = schema_of::<E>().name, id = %id))]
    pub async fn get_by_id(&self, ctx: &OperationContext, id: E::Id) -> Result<E, RegistryError> {
        let target = id.to_string();
        self.fetch(ctx, "get_by_id", &target, Self::id_query(id), &self.preloads)
            .await?
            .pop()
            .ok_or_else(|| RegistryError::not_found("get_by_id", schema_of::<E>().name, &target))
    }

    /// Fetches entity `id` as seen by a caller-owned transaction
    #[instrument(skip_all, fields(entity = schema_of::<E>().name, id = %id))]
    pub async fn get_by_id_with_tx(
        &self,
        ctx: &OperationContext,
        tx: &mut Transaction,
        id: E::Id,
    ) -> Result<E, RegistryError> {
        let target = id.to_string();
        self.fetch_with_tx(ctx, tx, "get_by_id", &target, Self::id_query(id), &self.preloads)
            .await?
            .pop()
            .ok_or_else(|| RegistryError::not_found("get_by_id", schema_of::<E>().name, &target))
    }

    /// Fetches entity `id` and locks its row until `tx` ends
    ///
    /// A second transaction locking the same row waits until the first one
    /// commits or rolls back, or fails with `ConcurrencyTimeout` once the
    /// store's lock timeout elapses.
    #[instrument(skip_all, fields(entity = schema_of::<E>().name, id = %id))]
    pub async fn get_by_id_lock(
        &self,
        ctx: &OperationContext,
        tx: &mut Transaction,
        id: E::Id,
    ) -> Result<E, RegistryError> {
        let target = id.to_string();
        let query = Self::id_query(id).for_update();
        self.fetch_with_tx(ctx, tx, "get_by_id_lock", &target, query, &self.preloads)
            .await?
            .pop()
            .ok_or_else(|| RegistryError::not_found("get_by_id_lock", schema_of::<E>().name, &target))
    }

    /// Equality filters from every non-zero column of `template`
    fn template_filters(template: &E) -> FilterSet {
        let schema = schema_of::<E>();
        template
            .to_record()
            .scalars()
            .filter(|(column, value)| schema.has_column(column) && !value.is_zero())
            .map(|(column, value)| Filter::eq(column, value.clone()))
            .collect()
    }

    /// Exact-match query; zero-valued template fields are ignored
    #[instrument(skip_all, fields(entity = schema_of::<E>().name))]
    pub async fn find(&self, ctx: &OperationContext, template: &E) -> Result<Vec<E>, RegistryError> {
        let query = Query::filtered(Self::template_filters(template));
        self.fetch(ctx, "find", "template", query, &self.preloads).await
    }

    /// First exact match, or `NotFound`
    #[instrument(skip_all, fields(entity = schema_of::<E>().name))]
    pub async fn find_one(&self, ctx: &OperationContext, template: &E) -> Result<E, RegistryError> {
        let query = Query::filtered(Self::template_filters(template)).with_limit(1);
        self.fetch(ctx, "find_one", "template", query, &self.preloads)
            .await?
            .pop()
            .ok_or_else(|| RegistryError::not_found("find_one", schema_of::<E>().name, "template"))
    }

    /// Filter/sort query, optionally widening the eager loads for this call
    #[instrument(skip_all, fields(entity = schema_of::<E>().name, filters = filters.len()))]
    pub async fn arr_find(
        &self,
        ctx: &OperationContext,
        filters: FilterSet,
        sorts: SortSet,
        extra_preloads: &[&str],
    ) -> Result<Vec<E>, RegistryError> {
        self.query(ctx, Query::filtered(filters).with_sorts(sorts), extra_preloads)
            .await
    }

    /// First row of a filter/sort query, or `NotFound`
    #[instrument(skip_all, fields(entity = schema_of::<E>().name, filters = filters.len()))]
    pub async fn arr_find_one(
        &self,
        ctx: &OperationContext,
        filters: FilterSet,
        sorts: SortSet,
        extra_preloads: &[&str],
    ) -> Result<E, RegistryError> {
        let query = Query::filtered(filters).with_sorts(sorts).with_limit(1);
        self.query(ctx, query, extra_preloads)
            .await?
            .pop()
            .ok_or_else(|| RegistryError::not_found("arr_find_one", schema_of::<E>().name, "filters"))
    }

    /// Filter/sort query inside a caller-owned transaction
    #[instrument(skip_all, fields(entity = schema_of::<E>().name, filters = filters.len()))]
    pub async fn arr_find_with_tx(
        &self,
        ctx: &OperationContext,
        tx: &mut Transaction,
        filters: FilterSet,
        sorts: SortSet,
        extra_preloads: &[&str],
    ) -> Result<Vec<E>, RegistryError> {
        let preloads = self.preloads.widened(schema_of::<E>(), extra_preloads)?;
        let query = Query::filtered(filters).with_sorts(sorts);
        self.fetch_with_tx(ctx, tx, "arr_find", "filters", query, &preloads)
            .await
    }

    /// First row of a filter/sort query inside a caller-owned transaction
    pub async fn arr_find_one_with_tx(
        &self,
        ctx: &OperationContext,
        tx: &mut Transaction,
        filters: FilterSet,
        sorts: SortSet,
        extra_preloads: &[&str],
    ) -> Result<E, RegistryError> {
        let preloads = self.preloads.widened(schema_of::<E>(), extra_preloads)?;
        let query = Query::filtered(filters).with_sorts(sorts).with_limit(1);
        self.fetch_with_tx(ctx, tx, "arr_find_one", "filters", query, &preloads)
            .await?
            .pop()
            .ok_or_else(|| RegistryError::not_found("arr_find_one", schema_of::<E>().name, "filters"))
    }

    /// Runs a full [`Query`], including limit and offset
    pub async fn query(
        &self,
        ctx: &OperationContext,
        query: Query,
        extra_preloads: &[&str],
    ) -> Result<Vec<E>, RegistryError> {
        let preloads = self.preloads.widened(schema_of::<E>(), extra_preloads)?;
        self.fetch(ctx, "arr_find", "filters", query, &preloads).await
    }

    /// Every visible row, oldest first
    #[instrument(skip_all, fields(entity = schema_of::<E>().name))]
    pub async fn list(&self, ctx: &OperationContext) -> Result<Vec<E>, RegistryError> {
        let sorts = SortSet::new().then(Sort::asc("created_at")).then(Sort::asc("id"));
        self.fetch(ctx, "list", "all", Query::new().with_sorts(sorts), &self.preloads)
            .await
    }

    /// Number of visible rows matching `filters`
    #[instrument(skip_all, fields(entity = schema_of::<E>().name))]
    pub async fn count(&self, ctx: &OperationContext, filters: FilterSet) -> Result<u64, RegistryError> {
        let schema = schema_of::<E>();
        let query = Self::visible(Query::filtered(filters))?;
        with_deadline(ctx, "count", async {
            self.store
                .count(schema, &query.filters)
                .await
                .map_err(|e| RegistryError::storage("count", schema.name, "filters", e))
        })
        .await
    }

    /// Number of visible rows matching `filters`, as seen by `tx`
    pub async fn count_with_tx(
        &self,
        ctx: &OperationContext,
        tx: &mut Transaction,
        filters: FilterSet,
    ) -> Result<u64, RegistryError> {
        let schema = schema_of::<E>();
        let query = Self::visible(Query::filtered(filters))?;
        let handle = tx.handle()?;
        with_deadline(ctx, "count", async {
            handle
                .count(schema, &query.filters)
                .await
                .map_err(|e| RegistryError::storage("count", schema.name, "filters", e))
        })
        .await
    }

    /// True if a visible row with this id exists
    pub async fn exists(&self, ctx: &OperationContext, id: E::Id) -> Result<bool, RegistryError> {
        let filters = FilterSet::new().and(Filter::eq("id", FieldValue::id(id)));
        Ok(self.count(ctx, filters).await? > 0)
    }

    /// Projects one entity; `None` in, `None` out
    pub fn to_model(&self, entity: Option<&E>) -> Option<R> {
        project_one(entity, |e| (self.projector)(e))
    }

    /// Projects a collection, skipping absent entries
    pub fn to_models<'a, I, T>(&self, entities: I) -> Vec<R>
    where
        I: IntoIterator<Item = T>,
        T: Into<Option<&'a E>>,
    {
        project_many(entities, |e| (self.projector)(e))
    }

    /// The projector this registry was configured with
    pub fn projector(&self) -> &Projector<E, R> {
        &self.projector
    }
}
