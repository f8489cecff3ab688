//! Entity schema and the trait every registry entity implements
//!
//! An entity describes itself through a static [`Schema`]: its topic name,
//! table, columns, unique columns, associations and delete policy. The
//! registry never inspects entity structs directly; it works with the schema
//! and the [`Record`] produced by [`Entity::to_record`].

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use core_kernel::{BranchId, EntityId, OrganizationId, UserId};
use uuid::Uuid;

use crate::error::StorageError;
use crate::topic::TopicScope;
use crate::value::Record;

/// Audit columns every entity carries
pub const AUDIT_COLUMNS: [&str; 5] = [
    "id",
    "created_at",
    "updated_at",
    "created_by_id",
    "updated_by_id",
];

/// Soft-delete marker columns
pub const SOFT_DELETE_COLUMNS: [&str; 2] = ["deleted_at", "deleted_by_id"];

/// How a delete operation removes a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// The row is removed from the table
    Hard,
    /// The row is kept with `deleted_at`/`deleted_by_id` set and hidden from reads
    Soft,
}

/// Shape of an association between two entities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// This entity holds `foreign_key` pointing at the target's `id`
    BelongsTo { foreign_key: &'static str },
    /// The target holds `foreign_key` pointing at this entity's `id`
    HasMany { foreign_key: &'static str },
}

/// A named, eager-loadable association
#[derive(Clone, Copy)]
pub struct Association {
    /// Path segment used in eager-load paths, e.g. `"Branch"`
    pub name: &'static str,
    pub kind: AssociationKind,
    /// Target schema; a function so schemas can refer to each other
    pub target: fn() -> &'static Schema,
}

impl fmt::Debug for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Association")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("target", &(self.target)().name)
            .finish()
    }
}

/// Static description of an entity type
#[derive(Debug)]
pub struct Schema {
    /// Entity name used as the first topic segment, e.g. `"invitation_code"`
    pub name: &'static str,
    /// Table name in the store
    pub table: &'static str,
    /// Entity-specific columns, excluding audit and soft-delete columns
    pub columns: &'static [&'static str],
    /// Columns whose values must be unique across the table
    pub unique: &'static [&'static str],
    pub associations: &'static [Association],
    pub delete_policy: DeletePolicy,
}

impl Schema {
    /// Returns true if `column` is a queryable column of this entity
    pub fn has_column(&self, column: &str) -> bool {
        AUDIT_COLUMNS.contains(&column)
            || self.columns.contains(&column)
            || (self.is_soft_delete() && SOFT_DELETE_COLUMNS.contains(&column))
    }

    /// Every column of this entity in declaration order
    pub fn all_columns(&self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = AUDIT_COLUMNS.to_vec();
        columns.extend_from_slice(self.columns);
        if self.is_soft_delete() {
            columns.extend_from_slice(&SOFT_DELETE_COLUMNS);
        }
        columns
    }

    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name == name)
    }

    pub fn is_soft_delete(&self) -> bool {
        self.delete_policy == DeletePolicy::Soft
    }
}

/// Truncates a timestamp to the microsecond precision PostgreSQL stores
pub fn db_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Creation and modification metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Audit {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by_id: Option<UserId>,
    pub updated_by_id: Option<UserId>,
}

impl Audit {
    /// Stamps a fresh insert
    pub fn stamp_created(&mut self, actor: Option<UserId>, now: DateTime<Utc>) {
        self.created_at = now;
        self.updated_at = now;
        self.created_by_id = actor;
        self.updated_by_id = actor;
    }

    /// Stamps a modification, keeping the creation columns from `stored`
    ///
    /// `updated_at` always moves strictly forward, even when the clock has
    /// not advanced past the stored value.
    pub fn stamp_updated(&mut self, stored: &Audit, actor: Option<UserId>, now: DateTime<Utc>) {
        self.created_at = stored.created_at;
        self.created_by_id = stored.created_by_id;
        self.updated_at = if now > stored.updated_at {
            now
        } else {
            stored.updated_at + chrono::Duration::microseconds(1)
        };
        self.updated_by_id = actor;
    }

    /// Reads the audit columns from a record
    pub fn read(record: &Record) -> Result<Self, StorageError> {
        Ok(Self {
            created_at: record.get("created_at")?,
            updated_at: record.get("updated_at")?,
            created_by_id: record.get("created_by_id")?,
            updated_by_id: record.get("updated_by_id")?,
        })
    }

    /// Writes the audit columns into a record
    pub fn write(&self, record: &mut Record) {
        record.set("created_at", self.created_at);
        record.set("updated_at", self.updated_at);
        record.set("created_by_id", self.created_by_id);
        record.set("updated_by_id", self.updated_by_id);
    }
}

/// Soft-delete marker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftDelete {
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by_id: Option<UserId>,
}

impl SoftDelete {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn read(record: &Record) -> Result<Self, StorageError> {
        Ok(Self {
            deleted_at: record.get("deleted_at")?,
            deleted_by_id: record.get("deleted_by_id")?,
        })
    }

    pub fn write(&self, record: &mut Record) {
        record.set("deleted_at", self.deleted_at);
        record.set("deleted_by_id", self.deleted_by_id);
    }
}

/// A persistable business entity
///
/// Implementations map a struct to and from a [`Record`]. Eager-loaded
/// associations arrive in the record under their association name and are
/// decoded with [`Record::nested`] / [`Record::nested_many`].
pub trait Entity: Clone + Send + Sync + 'static {
    type Id: EntityId;

    fn schema() -> &'static Schema;

    fn id(&self) -> Self::Id;

    fn set_id(&mut self, id: Self::Id);

    fn audit(&self) -> &Audit;

    fn audit_mut(&mut self) -> &mut Audit;

    /// Owning organization, for tenant-scoped entities
    fn organization_id(&self) -> Option<OrganizationId> {
        None
    }

    /// Owning branch, for branch-scoped entities
    fn branch_id(&self) -> Option<BranchId> {
        None
    }

    /// Extra parent scopes appended after the tenant topics
    fn topic_scopes(&self) -> Vec<TopicScope> {
        Vec::new()
    }

    /// Encodes the entity's columns, audit columns included
    fn to_record(&self) -> Record;

    /// Decodes a stored row, including any eager-loaded associations
    fn from_record(record: &Record) -> Result<Self, StorageError>;

    fn uuid(&self) -> Uuid {
        *self.id().as_uuid()
    }
}
