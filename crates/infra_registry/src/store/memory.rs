//! In-process store
//!
//! Tables live behind a tokio `RwLock`. A transaction buffers its writes
//! and reads committed state overlaid with its own writes. Updates, deletes
//! and locking selects take a per-row async mutex held until the
//! transaction ends, which gives the same blocking behaviour as
//! `SELECT ... FOR UPDATE`. Uniqueness is checked on every write and again
//! at commit under the table write lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Store, StoreTransaction};
use crate::entity::Schema;
use crate::error::StorageError;
use crate::filter::{FilterSet, Query};
use crate::value::{FieldValue, Record};

/// Default bound on row lock waits
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

type Table = BTreeMap<Uuid, Record>;
type RowKey = (&'static str, Uuid);

#[derive(Debug, Default)]
struct MemoryState {
    tables: RwLock<HashMap<&'static str, Table>>,
    row_locks: StdMutex<HashMap<RowKey, Arc<Mutex<()>>>>,
}

impl MemoryState {
    /// Drops the lock entries in `keys` that nobody holds or waits on
    fn prune_locks(&self, keys: impl IntoIterator<Item = RowKey>) {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            if locks.get(&key).is_some_and(|mutex| Arc::strong_count(mutex) == 1) {
                locks.remove(&key);
            }
        }
    }
}

/// In-memory [`Store`] implementation
///
/// Cloning is cheap and clones share the same data.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use infra_registry::MemoryStore;
///
/// let store = MemoryStore::new().with_lock_timeout(Duration::from_millis(200));
/// assert_eq!(store.lock_timeout(), Duration::from_millis(200));
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<MemoryState>,
    lock_timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MemoryState::default()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Every committed row of a table, soft-deleted rows included
    pub async fn rows(&self, table: &str) -> Vec<Record> {
        let tables = self.state.tables.read().await;
        tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            lock_timeout: self.lock_timeout,
            writes: HashMap::new(),
            guards: HashMap::new(),
            finished: false,
        }))
    }

    async fn select(
        &self,
        schema: &'static Schema,
        query: &Query,
    ) -> Result<Vec<Record>, StorageError> {
        let tables = self.state.tables.read().await;
        let rows = tables
            .get(schema.table)
            .map(|t| t.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(query.apply(rows))
    }

    async fn count(
        &self,
        schema: &'static Schema,
        filters: &FilterSet,
    ) -> Result<u64, StorageError> {
        let tables = self.state.tables.read().await;
        let count = tables
            .get(schema.table)
            .map(|t| t.values().filter(|r| filters.matches(r)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }
}

#[derive(Debug, Clone)]
enum Write {
    Insert(Record),
    Update(Record),
    Delete,
}

#[derive(Debug)]
struct TableWrites {
    schema: &'static Schema,
    rows: BTreeMap<Uuid, Write>,
}

struct MemoryTransaction {
    state: Arc<MemoryState>,
    lock_timeout: Duration,
    writes: HashMap<&'static str, TableWrites>,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    finished: bool,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.finished {
            Err(StorageError::query("transaction already finished"))
        } else {
            Ok(())
        }
    }

    /// Committed rows of a table overlaid with this transaction's writes
    fn view(&self, committed: &HashMap<&'static str, Table>, schema: &Schema) -> Table {
        let mut rows = committed.get(schema.table).cloned().unwrap_or_default();
        if let Some(writes) = self.writes.get(schema.table) {
            overlay(&mut rows, &writes.rows);
        }
        rows
    }

    async fn current_view(&self, schema: &Schema) -> Table {
        let tables = self.state.tables.read().await;
        self.view(&tables, schema)
    }

    /// Locks a row for the rest of the transaction
    async fn lock_row(&mut self, table: &'static str, id: Uuid) -> Result<(), StorageError> {
        let key = (table, id);
        if self.guards.contains_key(&key) {
            return Ok(());
        }
        let mutex = {
            let mut locks = self.state.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key).or_default())
        };
        let locked = tokio::time::timeout(self.lock_timeout, Arc::clone(&mutex).lock_owned()).await;
        match locked {
            Ok(guard) => {
                self.guards.insert(key, guard);
                Ok(())
            }
            Err(_) => {
                drop(mutex);
                self.state.prune_locks([key]);
                warn!(table, %id, timeout_ms = self.lock_timeout.as_millis() as u64, "Row lock wait timed out");
                Err(StorageError::lock_timeout(format!(
                    "could not lock {} row {} within {}ms",
                    table,
                    id,
                    self.lock_timeout.as_millis()
                )))
            }
        }
    }

    fn push_write(&mut self, schema: &'static Schema, id: Uuid, write: Write) {
        let table = self
            .writes
            .entry(schema.table)
            .or_insert_with(|| TableWrites {
                schema,
                rows: BTreeMap::new(),
            });
        let merged = match (table.rows.remove(&id), write) {
            (Some(Write::Insert(_)), Write::Update(record)) => Some(Write::Insert(record)),
            (Some(Write::Insert(_)), Write::Delete) => None,
            (_, write) => Some(write),
        };
        if let Some(write) = merged {
            table.rows.insert(id, write);
        }
    }

    fn release_locks(&mut self) {
        if self.guards.is_empty() {
            return;
        }
        let keys: Vec<RowKey> = self.guards.keys().copied().collect();
        self.guards.clear();
        self.state.prune_locks(keys);
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.release_locks();
    }
}

fn overlay(rows: &mut Table, writes: &BTreeMap<Uuid, Write>) {
    for (id, write) in writes {
        match write {
            Write::Insert(record) | Write::Update(record) => {
                rows.insert(*id, record.clone());
            }
            Write::Delete => {
                rows.remove(id);
            }
        }
    }
}

/// Rejects `record` if another row already holds one of its unique values
fn check_unique(schema: &Schema, rows: &Table, id: Uuid, record: &Record) -> Result<(), StorageError> {
    for column in schema.unique {
        let value = record.value_or_null(column);
        if value.is_null() {
            continue;
        }
        let taken = rows
            .iter()
            .any(|(other, row)| *other != id && row.value_or_null(column) == value);
        if taken {
            return Err(StorageError::constraint(format!(
                "duplicate key value violates unique constraint \"{}_{}_key\"",
                schema.table, column
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert(
        &mut self,
        schema: &'static Schema,
        record: &Record,
    ) -> Result<Record, StorageError> {
        self.ensure_open()?;
        let id = record
            .id()
            .ok_or_else(|| StorageError::constraint(format!("{}: null value in column \"id\"", schema.table)))?;
        let rows = self.current_view(schema).await;
        if rows.contains_key(&id) {
            return Err(StorageError::constraint(format!(
                "duplicate key value violates unique constraint \"{}_pkey\"",
                schema.table
            )));
        }
        check_unique(schema, &rows, id, record)?;

        let stored = record
            .scalars()
            .fold(Record::new(), |r, (k, v)| r.with(k, v.clone()));
        debug!(table = schema.table, %id, "Buffered insert");
        self.push_write(schema, id, Write::Insert(stored.clone()));
        Ok(stored)
    }

    async fn update(
        &mut self,
        schema: &'static Schema,
        id: Uuid,
        record: &Record,
    ) -> Result<Record, StorageError> {
        self.ensure_open()?;
        self.lock_row(schema.table, id).await?;
        let rows = self.current_view(schema).await;
        let mut stored = rows
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(format!("{} row {} does not exist", schema.table, id)))?;
        stored.merge(record);
        stored.set("id", FieldValue::Uuid(id));
        check_unique(schema, &rows, id, &stored)?;

        debug!(table = schema.table, %id, "Buffered update");
        self.push_write(schema, id, Write::Update(stored.clone()));
        Ok(stored)
    }

    async fn delete(&mut self, schema: &'static Schema, id: Uuid) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.lock_row(schema.table, id).await?;
        let rows = self.current_view(schema).await;
        if !rows.contains_key(&id) {
            return Err(StorageError::not_found(format!(
                "{} row {} does not exist",
                schema.table, id
            )));
        }
        debug!(table = schema.table, %id, "Buffered delete");
        self.push_write(schema, id, Write::Delete);
        Ok(())
    }

    async fn select(
        &mut self,
        schema: &'static Schema,
        query: &Query,
    ) -> Result<Vec<Record>, StorageError> {
        self.ensure_open()?;
        let rows = self.current_view(schema).await;
        let selected = query.apply(rows.into_values());
        if !query.lock {
            return Ok(selected);
        }

        // Lock in id order so concurrent lockers cannot deadlock, then
        // re-read since the rows may have changed while we waited.
        let mut ids: Vec<Uuid> = selected.iter().filter_map(Record::id).collect();
        ids.sort();
        for id in &ids {
            self.lock_row(schema.table, *id).await?;
        }
        let rows = self.current_view(schema).await;
        let locked: Vec<Record> = rows
            .into_iter()
            .filter(|(id, _)| ids.binary_search(id).is_ok())
            .map(|(_, record)| record)
            .collect();
        Ok(query.apply(locked))
    }

    async fn count(
        &mut self,
        schema: &'static Schema,
        filters: &FilterSet,
    ) -> Result<u64, StorageError> {
        self.ensure_open()?;
        let rows = self.current_view(schema).await;
        Ok(rows.values().filter(|r| filters.matches(r)).count() as u64)
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.finished = true;
        let writes = std::mem::take(&mut self.writes);
        let outcome = {
            let mut tables = self.state.tables.write().await;
            apply_writes(&mut tables, writes)
        };
        self.release_locks();
        outcome
    }

    async fn rollback(&mut self) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.finished = true;
        self.writes.clear();
        self.release_locks();
        Ok(())
    }
}

/// Validates and applies buffered writes; nothing is applied on failure
fn apply_writes(
    tables: &mut HashMap<&'static str, Table>,
    writes: HashMap<&'static str, TableWrites>,
) -> Result<(), StorageError> {
    let mut staged: Vec<(&'static str, Table)> = Vec::with_capacity(writes.len());
    for (name, table_writes) in &writes {
        let mut rows = tables.get(name).cloned().unwrap_or_default();
        for (id, write) in &table_writes.rows {
            match write {
                Write::Insert(_) if rows.contains_key(id) => {
                    return Err(StorageError::constraint(format!(
                        "duplicate key value violates unique constraint \"{}_pkey\"",
                        name
                    )));
                }
                Write::Update(_) | Write::Delete if !rows.contains_key(id) => {
                    return Err(StorageError::not_found(format!(
                        "{} row {} was removed concurrently",
                        name, id
                    )));
                }
                _ => {}
            }
        }
        overlay(&mut rows, &table_writes.rows);
        for (id, write) in &table_writes.rows {
            if let Write::Insert(record) | Write::Update(record) = write {
                check_unique(table_writes.schema, &rows, *id, record)?;
            }
        }
        staged.push((*name, rows));
    }
    for (name, rows) in staged {
        tables.insert(name, rows);
    }
    Ok(())
}
