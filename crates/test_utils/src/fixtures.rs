//! Pre-built Test Fixtures
//!
//! Provides tenants, actors, operation contexts, stores and realistic
//! names for registry and domain tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use core_kernel::{BranchId, EntityId, OperationContext, OrganizationId, UserId};
use fake::faker::address::en::StreetName;
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use infra_registry::{MemoryStore, Store};
use once_cell::sync::Lazy;
use uuid::Uuid;

static TRACING: Lazy<()> = Lazy::new(|| {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
});

/// Installs a test-friendly tracing subscriber once per process
///
/// Honours `RUST_LOG`; defaults to `warn`.
pub fn init_test_tracing() {
    Lazy::force(&TRACING);
}

/// An organization and one of its branches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantFixture {
    pub organization_id: OrganizationId,
    pub branch_id: BranchId,
}

impl TenantFixture {
    /// A fresh tenant with time-ordered identifiers
    pub fn new() -> Self {
        Self {
            organization_id: OrganizationId::generate(),
            branch_id: BranchId::generate(),
        }
    }

    /// Another branch of the same organization
    pub fn sibling(&self) -> Self {
        Self {
            organization_id: self.organization_id,
            branch_id: BranchId::generate(),
        }
    }
}

impl Default for TenantFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Operation contexts for common test situations
pub struct ContextFixtures;

impl ContextFixtures {
    pub fn system() -> OperationContext {
        OperationContext::system().with_correlation_id("test")
    }

    /// A context for a freshly minted user, returned with its id
    pub fn actor() -> (UserId, OperationContext) {
        let actor = UserId::generate();
        (actor, OperationContext::for_actor(actor).with_correlation_id("test"))
    }

    /// A context whose deadline has already passed
    pub fn expired() -> OperationContext {
        OperationContext::system().with_deadline(Instant::now() - Duration::from_millis(1))
    }

    pub fn with_timeout(timeout: Duration) -> OperationContext {
        OperationContext::system().with_timeout(timeout)
    }
}

/// Stores for tests that do not need PostgreSQL
pub struct StoreFixtures;

impl StoreFixtures {
    pub fn memory() -> Arc<dyn Store> {
        Arc::new(MemoryStore::new())
    }

    /// An in-memory store with a short row lock timeout
    pub fn memory_with_lock_timeout(timeout: Duration) -> Arc<dyn Store> {
        Arc::new(MemoryStore::new().with_lock_timeout(timeout))
    }
}

/// Realistic values generated with `fake`
pub struct NameFixtures;

impl NameFixtures {
    pub fn organization_name() -> String {
        CompanyName().fake()
    }

    pub fn branch_name() -> String {
        format!("{} Branch", StreetName().fake::<String>())
    }

    pub fn first_name() -> String {
        FirstName().fake()
    }

    pub fn last_name() -> String {
        LastName().fake()
    }

    pub fn email() -> String {
        SafeEmail().fake()
    }

    pub fn address() -> String {
        format!("{} {}", (1..999).fake::<u16>(), StreetName().fake::<String>())
    }

    /// A code that is unique per call, e.g. `INV-3F9A21C0`
    pub fn unique_code(prefix: &str) -> String {
        let simple = Uuid::new_v4().simple().to_string().to_uppercase();
        format!("{}-{}", prefix, &simple[..8])
    }
}

/// Fixed instants used by range tests
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// 2024-01-01T00:00:00Z
    pub fn jan_2024() -> DateTime<Utc> {
        Utc.timestamp_opt(1_704_067_200, 0).single().unwrap_or_default()
    }

    /// 2024-02-01T00:00:00Z
    pub fn feb_2024() -> DateTime<Utc> {
        Utc.timestamp_opt(1_706_745_600, 0).single().unwrap_or_default()
    }

    pub fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    pub fn yesterday() -> NaiveDate {
        Self::today() - chrono::Duration::days(1)
    }

    pub fn next_month() -> NaiveDate {
        Self::today() + chrono::Duration::days(30)
    }
}
