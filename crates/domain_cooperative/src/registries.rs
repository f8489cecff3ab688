//! Application registry container
//!
//! [`Registries`] holds one registry per cooperative entity, all sharing a
//! store and a dispatcher. Build it once at startup and pass it by
//! reference; cloning is cheap.

use std::sync::Arc;

use core_kernel::OperationContext;
use infra_registry::{Dispatcher, RegistryCache, RegistryError, Store, Transaction};
use tracing::debug;

use crate::account::{self, AccountRegistry};
use crate::branch::{self, BranchRegistry};
use crate::invitation_code::{self, InvitationCodeRegistry};
use crate::member_profile::{self, MemberProfileRegistry};
use crate::organization::{self, OrganizationRegistry};

#[derive(Debug, Clone)]
pub struct Registries {
    pub organizations: Arc<OrganizationRegistry>,
    pub branches: Arc<BranchRegistry>,
    pub member_profiles: Arc<MemberProfileRegistry>,
    pub accounts: Arc<AccountRegistry>,
    pub invitation_codes: Arc<InvitationCodeRegistry>,
    store: Arc<dyn Store>,
}

impl Registries {
    /// Builds fresh registries for every entity
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if any registry's eager-load paths are invalid
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<dyn Dispatcher>) -> Result<Self, RegistryError> {
        let registries = Self {
            organizations: Arc::new(organization::registry(Arc::clone(&store), Arc::clone(&dispatcher))?),
            branches: Arc::new(branch::registry(Arc::clone(&store), Arc::clone(&dispatcher))?),
            member_profiles: Arc::new(member_profile::registry(Arc::clone(&store), Arc::clone(&dispatcher))?),
            accounts: Arc::new(account::registry(Arc::clone(&store), Arc::clone(&dispatcher))?),
            invitation_codes: Arc::new(invitation_code::registry(Arc::clone(&store), dispatcher)?),
            store,
        };
        debug!(backend = registries.store.backend(), "Registries built");
        Ok(registries)
    }

    /// Returns registries from `cache`, building the missing ones
    ///
    /// The first call for a given cache decides the store and dispatcher;
    /// later calls receive the same instances, and the container's own
    /// transactions open on that first store.
    pub fn cached(
        cache: &RegistryCache,
        store: Arc<dyn Store>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self, RegistryError> {
        let organizations = cache
            .get_or_init(|| organization::registry(Arc::clone(&store), Arc::clone(&dispatcher)))?;
        let bound = Arc::clone(organizations.store());
        if !Arc::ptr_eq(&bound, &store) {
            debug!(backend = bound.backend(), "Reusing registries bound to an earlier store");
        }
        Ok(Self {
            organizations,
            branches: cache.get_or_init(|| branch::registry(Arc::clone(&store), Arc::clone(&dispatcher)))?,
            member_profiles: cache
                .get_or_init(|| member_profile::registry(Arc::clone(&store), Arc::clone(&dispatcher)))?,
            accounts: cache.get_or_init(|| account::registry(Arc::clone(&store), Arc::clone(&dispatcher)))?,
            invitation_codes: cache
                .get_or_init(|| invitation_code::registry(Arc::clone(&store), Arc::clone(&dispatcher)))?,
            store: bound,
        })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Opens a transaction usable with every registry in the container
    pub async fn start_transaction(&self, ctx: &OperationContext) -> Result<Transaction, RegistryError> {
        Transaction::begin(self.store.as_ref(), ctx.clone()).await
    }
}
