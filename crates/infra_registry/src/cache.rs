//! Memoized registry instances
//!
//! [`RegistryCache`] keeps at most one registry per `(entity, response)`
//! type pair. It is an ordinary value passed to whoever needs it; nothing
//! is stored in process-wide statics.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::debug;

use crate::entity::Entity;
use crate::error::RegistryError;
use crate::registry::Registry;

type Entry = Arc<dyn Any + Send + Sync>;

/// Shared cache of registry instances keyed by type
#[derive(Clone, Default)]
pub struct RegistryCache {
    entries: Arc<RwLock<HashMap<TypeId, Entry>>>,
}

impl std::fmt::Debug for RegistryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCache")
            .field("len", &self.len())
            .finish()
    }
}

impl RegistryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached registry for `E`/`R`, if one was built
    pub fn get<E, R>(&self) -> Option<Arc<Registry<E, R>>>
    where
        E: Entity,
        R: Serialize + Send + Sync + 'static,
    {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&TypeId::of::<Registry<E, R>>())
            .cloned()
            .and_then(|entry| entry.downcast::<Registry<E, R>>().ok())
    }

    /// Returns the cached registry, building it with `init` on first use
    ///
    /// Concurrent first calls may each run `init`; the first insert wins and
    /// every caller receives that instance.
    pub fn get_or_init<E, R, F>(&self, init: F) -> Result<Arc<Registry<E, R>>, RegistryError>
    where
        E: Entity,
        R: Serialize + Send + Sync + 'static,
        F: FnOnce() -> Result<Registry<E, R>, RegistryError>,
    {
        if let Some(registry) = self.get::<E, R>() {
            return Ok(registry);
        }
        let built: Entry = Arc::new(init()?);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .entry(TypeId::of::<Registry<E, R>>())
            .or_insert_with(|| {
                debug!(entity = E::schema().name, "Registry cached");
                built
            })
            .clone();
        entry
            .downcast::<Registry<E, R>>()
            .map_err(|_| RegistryError::configuration("registry cache entry has unexpected type"))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached instance
    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
