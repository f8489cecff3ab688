//! Registry integration tests
//!
//! Exercises the public registry surface on the in-memory store with a
//! small tenant-scoped `Deposit` entity defined here.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use core_kernel::{BranchId, EntityId, OperationContext, OrganizationId};
use infra_registry::{
    Audit, BroadcastDispatcher, DeletePolicy, DispatchFuture, Dispatcher, Entity, FieldValue, Filter, FilterSet,
    FnDispatcher, FromField, Lifecycle, Query, Record, Registry, RegistryCache, RegistryConfig,
    Schema, Sort, SortSet, StorageError, Store, Topic, TopicBuilder,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use test_utils::{
    assert_aborted, assert_concurrency_timeout, assert_configuration_error, assert_not_found,
    assert_sorted_by, assert_standard_topics, init_test_tracing, ContextFixtures,
    RecordingDispatcher, StoreFixtures, TenantFixture,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
struct DepositId(Uuid);

impl EntityId for DepositId {
    fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for DepositId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DEP-{}", self.0)
    }
}

impl From<DepositId> for FieldValue {
    fn from(id: DepositId) -> Self {
        FieldValue::id(id)
    }
}

impl FromField for DepositId {
    fn from_field(value: &FieldValue) -> Option<Self> {
        Uuid::from_field(value).map(Self)
    }
}

static DEPOSIT_SCHEMA: Schema = Schema {
    name: "deposit",
    table: "deposits",
    columns: &["organization_id", "branch_id", "reference", "amount", "postings"],
    unique: &["reference"],
    associations: &[],
    delete_policy: DeletePolicy::Hard,
};

#[derive(Debug, Clone, Default, PartialEq)]
struct Deposit {
    id: DepositId,
    organization_id: OrganizationId,
    branch_id: BranchId,
    reference: String,
    amount: Decimal,
    postings: i64,
    audit: Audit,
}

impl Deposit {
    fn new(tenant: &TenantFixture, reference: &str, amount: Decimal) -> Self {
        Self {
            organization_id: tenant.organization_id,
            branch_id: tenant.branch_id,
            reference: reference.to_string(),
            amount,
            ..Self::default()
        }
    }
}

impl Entity for Deposit {
    type Id = DepositId;

    fn schema() -> &'static Schema {
        &DEPOSIT_SCHEMA
    }

    fn id(&self) -> DepositId {
        self.id
    }

    fn set_id(&mut self, id: DepositId) {
        self.id = id;
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }

    fn organization_id(&self) -> Option<OrganizationId> {
        Some(self.organization_id)
    }

    fn branch_id(&self) -> Option<BranchId> {
        Some(self.branch_id)
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("id", self.id)
            .with("organization_id", self.organization_id)
            .with("branch_id", self.branch_id)
            .with("reference", self.reference.as_str())
            .with("amount", self.amount)
            .with("postings", self.postings);
        self.audit.write(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self, StorageError> {
        Ok(Self {
            id: record.get("id")?,
            organization_id: record.get("organization_id")?,
            branch_id: record.get("branch_id")?,
            reference: record.get("reference")?,
            amount: record.get("amount")?,
            postings: record.get("postings")?,
            audit: Audit::read(record)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct DepositResponse {
    id: Uuid,
    reference: String,
    amount: Decimal,
}

fn deposit_response(deposit: &Deposit) -> DepositResponse {
    DepositResponse {
        id: deposit.uuid(),
        reference: deposit.reference.clone(),
        amount: deposit.amount,
    }
}

type DepositRegistry = Registry<Deposit, DepositResponse>;

fn registry_on(store: Arc<dyn Store>, dispatcher: Arc<dyn Dispatcher>) -> DepositRegistry {
    init_test_tracing();
    RegistryConfig::new(store, dispatcher, deposit_response)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_crud_round_trip_with_standard_topics() {
    let dispatcher = RecordingDispatcher::new();
    let registry = registry_on(StoreFixtures::memory(), dispatcher.shared());
    let ctx = ContextFixtures::system();
    let tenant = TenantFixture::new();

    let created = registry
        .create(&ctx, Deposit::new(&tenant, "DEP-001", dec!(250.00)))
        .await
        .unwrap();
    assert!(!created.id.is_nil());

    let mut changed = created.clone();
    changed.amount = dec!(300.00);
    let updated = registry.update(&ctx, changed).await.unwrap();
    assert_eq!(updated.amount, dec!(300.00));
    assert!(updated.audit.updated_at > created.audit.updated_at);

    let deleted = registry.delete(&ctx, created.id).await.unwrap();
    assert_eq!(deleted.amount, dec!(300.00));
    assert_not_found(&registry.get_by_id(&ctx, created.id).await);
    assert!(!registry.exists(&ctx, created.id).await.unwrap());

    let calls = dispatcher.calls();
    assert_eq!(calls.len(), 3);
    for (call, event) in calls.iter().zip([Lifecycle::Create, Lifecycle::Update, Lifecycle::Delete]) {
        assert_standard_topics(
            &call.topics,
            "deposit",
            event,
            created.uuid(),
            *tenant.branch_id.as_uuid(),
            *tenant.organization_id.as_uuid(),
        );
    }
    assert_eq!(calls[1].payload["amount"], serde_json::json!("300.00"));
}

#[tokio::test]
async fn test_query_sorts_and_pages() {
    let registry = registry_on(StoreFixtures::memory(), RecordingDispatcher::new().shared());
    let ctx = ContextFixtures::system();
    let tenant = TenantFixture::new();

    for (reference, amount) in [("D-3", dec!(30)), ("D-1", dec!(10)), ("D-4", dec!(40)), ("D-2", dec!(20))] {
        registry
            .create(&ctx, Deposit::new(&tenant, reference, amount))
            .await
            .unwrap();
    }

    let page = registry
        .query(
            &ctx,
            Query::filtered(FilterSet::new().and(Filter::gte("amount", dec!(15))))
                .with_sorts(SortSet::new().then(Sort::desc("amount")))
                .with_limit(2)
                .with_offset(1),
            &[],
        )
        .await
        .unwrap();
    let references: Vec<&str> = page.iter().map(|d| d.reference.as_str()).collect();
    assert_eq!(references, vec!["D-3", "D-2"]);

    let listed = registry.list(&ctx).await.unwrap();
    assert_eq!(listed.len(), 4);
    assert_sorted_by(&listed, |d| d.audit.created_at);

    let some = registry
        .arr_find(
            &ctx,
            FilterSet::new().and(Filter::in_list("reference", ["D-1", "D-4"])),
            SortSet::new().then(Sort::asc("reference")),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(some.len(), 2);
    assert_eq!(some[0].reference, "D-1");
}

#[tokio::test]
async fn test_unknown_filter_field_is_configuration_error() {
    let registry = registry_on(StoreFixtures::memory(), RecordingDispatcher::new().shared());
    let ctx = ContextFixtures::system();

    let result = registry
        .arr_find(
            &ctx,
            FilterSet::new().and(Filter::eq("amount; DROP TABLE deposits", 1_i64)),
            SortSet::new(),
            &[],
        )
        .await;
    assert_configuration_error(&result);

    let result = registry
        .arr_find(&ctx, FilterSet::new(), SortSet::new(), &["Nowhere"])
        .await;
    assert_configuration_error(&result);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_locked_increments_are_serialized() {
    let registry = Arc::new(registry_on(StoreFixtures::memory(), RecordingDispatcher::new().shared()));
    let ctx = ContextFixtures::system();
    let tenant = TenantFixture::new();
    let deposit = registry
        .create(&ctx, Deposit::new(&tenant, "COUNTER", Decimal::ZERO))
        .await
        .unwrap();

    let id = deposit.id;
    let mut handles = Vec::new();
    for _ in 0..25 {
        let registry = Arc::clone(&registry);
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            let mut tx = registry.start_transaction(&ctx).await?;
            let outcome = async {
                let mut locked = registry.get_by_id_lock(&ctx, &mut tx, id).await?;
                locked.postings += 1;
                locked.amount += dec!(1.50);
                registry.update_by_id_with_tx(&ctx, &mut tx, id, locked).await
            }
            .await;
            tx.finish(outcome).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = registry.get_by_id(&ctx, deposit.id).await.unwrap();
    assert_eq!(stored.postings, 25);
    assert_eq!(stored.amount, dec!(37.50));
}

#[tokio::test]
async fn test_lock_wait_honours_store_timeout() {
    let registry = registry_on(
        StoreFixtures::memory_with_lock_timeout(Duration::from_millis(30)),
        RecordingDispatcher::new().shared(),
    );
    let ctx = ContextFixtures::system();
    let deposit = registry
        .create(&ctx, Deposit::new(&TenantFixture::new(), "LOCK", dec!(1)))
        .await
        .unwrap();

    let mut holder = registry.start_transaction(&ctx).await.unwrap();
    registry.get_by_id_lock(&ctx, &mut holder, deposit.id).await.unwrap();
    // re-entrant within the holding transaction
    registry.get_by_id_lock(&ctx, &mut holder, deposit.id).await.unwrap();

    let mut waiter = registry.start_transaction(&ctx).await.unwrap();
    let result = registry.get_by_id_lock(&ctx, &mut waiter, deposit.id).await;
    assert_concurrency_timeout(&result);
    assert!(result.unwrap_err().is_retryable());

    waiter.rollback().await.unwrap();
    holder.commit().await.unwrap();
}

#[tokio::test]
async fn test_lock_wait_honours_operation_deadline() {
    let registry = registry_on(StoreFixtures::memory(), RecordingDispatcher::new().shared());
    let ctx = ContextFixtures::system();
    let deposit = registry
        .create(&ctx, Deposit::new(&TenantFixture::new(), "DEADLINE", dec!(1)))
        .await
        .unwrap();

    let mut holder = registry.start_transaction(&ctx).await.unwrap();
    registry.get_by_id_lock(&ctx, &mut holder, deposit.id).await.unwrap();

    let hurried = OperationContext::system().with_timeout(Duration::from_millis(30));
    let mut waiter = registry.start_transaction(&hurried).await.unwrap();
    let result = registry.get_by_id_lock(&hurried, &mut waiter, deposit.id).await;
    assert_aborted(&result);
    assert!(result.unwrap_err().to_string().contains("get_by_id_lock"));

    drop(waiter);
    holder.rollback().await.unwrap();
}

#[tokio::test]
async fn test_finish_wraps_failure_and_discards_notifications() {
    let dispatcher = RecordingDispatcher::new();
    let registry = registry_on(StoreFixtures::memory(), dispatcher.shared());
    let ctx = ContextFixtures::system();
    let tenant = TenantFixture::new();

    let mut tx = registry.start_transaction(&ctx).await.unwrap();
    let outcome = async {
        registry
            .create_with_tx(&ctx, &mut tx, Deposit::new(&tenant, "TX-1", dec!(5)))
            .await?;
        registry
            .create_with_tx(&ctx, &mut tx, Deposit::new(&tenant, "TX-1", dec!(6)))
            .await
    }
    .await;
    let error = tx.finish(outcome).await.unwrap_err();

    assert!(error.is_aborted());
    assert!(error.is_constraint_violation());
    assert!(dispatcher.is_empty());
    assert_eq!(registry.count(&ctx, FilterSet::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_custom_update_topics() {
    let dispatcher = RecordingDispatcher::new();
    let registry = RegistryConfig::new(StoreFixtures::memory(), dispatcher.shared(), deposit_response)
        .on_update(|deposit: &Deposit| {
            vec![Topic::new(format!("ledger.deposit.{}", deposit.reference))]
        })
        .build()
        .unwrap();
    let ctx = ContextFixtures::system();

    let created = registry
        .create(&ctx, Deposit::new(&TenantFixture::new(), "CUSTOM", dec!(1)))
        .await
        .unwrap();
    registry
        .patch_by_id(&ctx, created.id, |d| d.amount = dec!(2))
        .await
        .unwrap();

    let topics = dispatcher.topics();
    assert_eq!(topics[0][0], TopicBuilder::new("deposit", Lifecycle::Create).unscoped().to_string());
    assert_eq!(topics[1], vec!["ledger.deposit.CUSTOM".to_string()]);
}

#[tokio::test]
async fn test_broadcast_subscribers_receive_after_commit() {
    let broadcast = BroadcastDispatcher::new(16);
    let mut receiver = broadcast.subscribe();
    let registry = registry_on(StoreFixtures::memory(), Arc::new(broadcast));
    let ctx = ContextFixtures::system();

    let mut tx = registry.start_transaction(&ctx).await.unwrap();
    registry
        .create_with_tx(&ctx, &mut tx, Deposit::new(&TenantFixture::new(), "BCAST", dec!(9)))
        .await
        .unwrap();
    assert!(receiver.try_recv().is_err());
    tx.commit().await.unwrap();

    let notification = receiver.recv().await.unwrap();
    assert_eq!(notification.topics[0].as_str(), "deposit.create");
    assert_eq!(notification.payload["reference"], "BCAST");
}

#[tokio::test]
async fn test_fn_dispatcher_sees_every_mutation() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let dispatcher = FnDispatcher::new(move |topics: Vec<Topic>, _payload: serde_json::Value| -> DispatchFuture {
        let sink = Arc::clone(&sink);
        Box::pin(async move {
            sink.lock().unwrap().push(topics[0].to_string());
            Ok(())
        })
    });
    let registry = registry_on(StoreFixtures::memory(), Arc::new(dispatcher));
    let ctx = ContextFixtures::system();

    let deposit = registry
        .create(&ctx, Deposit::new(&TenantFixture::new(), "FN", dec!(3)))
        .await
        .unwrap();
    registry.delete(&ctx, deposit.id).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["deposit.create", "deposit.delete"]);
}

#[test]
fn test_cache_returns_one_instance_per_entity() {
    let cache = RegistryCache::new();
    let store = StoreFixtures::memory();
    let dispatcher = RecordingDispatcher::new().shared();

    let first = cache
        .get_or_init(|| Ok(registry_on(Arc::clone(&store), Arc::clone(&dispatcher))))
        .unwrap();
    let second: Arc<DepositRegistry> = cache
        .get_or_init(|| Ok(registry_on(Arc::clone(&store), Arc::clone(&dispatcher))))
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);
    assert!(first.to_model(None).is_none());
}
