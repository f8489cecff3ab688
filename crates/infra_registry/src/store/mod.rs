//! Store abstraction
//!
//! The registry talks to persistence through two object-safe traits. A
//! [`Store`] hands out transactions and serves autocommit reads; a
//! [`StoreTransaction`] performs writes and (optionally locking) reads that
//! become visible to others only on commit.
//!
//! Two backends are provided:
//! - [`PgStore`] on PostgreSQL via SQLx
//! - [`MemoryStore`] in process, with the same filter and locking semantics

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entity::Schema;
use crate::error::StorageError;
use crate::filter::{FilterSet, Query};
use crate::value::Record;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Entry point to a storage backend
#[async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    /// Short backend name used in logs
    fn backend(&self) -> &'static str;

    /// Opens a new transaction
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError>;

    /// Reads committed rows outside any transaction
    async fn select(&self, schema: &'static Schema, query: &Query)
        -> Result<Vec<Record>, StorageError>;

    async fn count(&self, schema: &'static Schema, filters: &FilterSet)
        -> Result<u64, StorageError>;
}

/// An open unit of work
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Inserts a row and returns it as stored
    async fn insert(&mut self, schema: &'static Schema, record: &Record)
        -> Result<Record, StorageError>;

    /// Overwrites the given columns of row `id` and returns the stored row
    ///
    /// Fails with `NotFound` when no such row exists.
    async fn update(&mut self, schema: &'static Schema, id: Uuid, record: &Record)
        -> Result<Record, StorageError>;

    /// Removes row `id`; fails with `NotFound` when no such row exists
    async fn delete(&mut self, schema: &'static Schema, id: Uuid) -> Result<(), StorageError>;

    /// Reads rows as seen by this transaction
    ///
    /// With [`Query::lock`] set, every returned row stays locked until the
    /// transaction ends. Lock waits are bounded by the store's lock timeout
    /// and fail with `ConcurrencyTimeout`.
    async fn select(&mut self, schema: &'static Schema, query: &Query)
        -> Result<Vec<Record>, StorageError>;

    async fn count(&mut self, schema: &'static Schema, filters: &FilterSet)
        -> Result<u64, StorageError>;

    async fn commit(&mut self) -> Result<(), StorageError>;

    async fn rollback(&mut self) -> Result<(), StorageError>;
}
