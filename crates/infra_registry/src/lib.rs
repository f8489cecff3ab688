//! Infrastructure Registry Layer
//!
//! This crate provides the generic entity registry every domain module of
//! the cooperative back office is built on.
//!
//! # Architecture
//!
//! - [`value`] and [`entity`]: the record model and the [`Entity`] trait
//! - [`filter`]: the filter/sort query DSL
//! - [`store`]: the storage boundary with PostgreSQL and in-memory backends
//! - [`transaction`]: units of work with post-commit notification
//! - [`topic`] and [`dispatch`]: change notification topics and transports
//! - [`projector`]: nil-safe response projection
//! - [`registry`]: the CRUD/query facade tying the above together
//! - [`cache`]: memoized registry instances
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_registry::{connect_store, RegistryConfig, StoreConfig, TracingDispatcher};
//!
//! let store = Arc::new(connect_store(&StoreConfig::from_env()?).await?);
//! let branches = RegistryConfig::new(store, Arc::new(TracingDispatcher), branch_response)
//!     .preload("Organization")
//!     .build()?;
//! ```

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod filter;
pub mod preload;
pub mod projector;
pub mod registry;
pub mod store;
pub mod topic;
pub mod transaction;
pub mod value;

#[cfg(test)]
mod fixtures;

pub use cache::RegistryCache;
pub use config::{connect_store, create_pool, StoreConfig};
pub use dispatch::{BroadcastDispatcher, DispatchFuture, Dispatcher, FnDispatcher, Notification, TracingDispatcher};
pub use entity::{db_now, Association, AssociationKind, Audit, DeletePolicy, Entity, Schema, SoftDelete};
pub use error::{Committed, DispatchError, RegistryError, StorageError, StorageErrorKind};
pub use filter::{Filter, FilterOp, FilterSet, Query, Sort, SortOrder, SortSet};
pub use preload::PreloadTree;
pub use projector::{project_many, project_one, Projector};
pub use registry::{Registry, RegistryConfig};
pub use store::{MemoryStore, PgStore, Store, StoreTransaction};
pub use topic::{Lifecycle, LifecycleTopics, Topic, TopicBuilder, TopicScope};
pub use transaction::Transaction;
pub use value::{FieldValue, FromField, Record};
