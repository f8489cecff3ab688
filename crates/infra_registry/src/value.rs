//! Column values and records
//!
//! A [`Record`] is the unit exchanged between the registry and a store: an
//! ordered map from column name to [`FieldValue`]. Entities convert to and
//! from records, which lets one registry implementation serve every entity
//! type and lets both store backends share filter semantics.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use core_kernel::{BranchId, EntityId, OrganizationId, UserId};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entity::Entity;
use crate::error::StorageError;

/// A single column value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    /// Operand list for the `In` filter operator
    List(Vec<FieldValue>),
    /// An eager-loaded `BelongsTo` association
    One(Box<Record>),
    /// An eager-loaded `HasMany` association
    Many(Vec<Record>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// True for values that an exact-match template treats as "unset"
    pub fn is_zero(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Bool(b) => !b,
            FieldValue::Int(i) => *i == 0,
            FieldValue::Decimal(d) => d.is_zero(),
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Uuid(u) => u.is_nil(),
            FieldValue::Timestamp(t) => *t == DateTime::<Utc>::default(),
            FieldValue::Date(d) => *d == NaiveDate::default(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::One(_) | FieldValue::Many(_) => true,
        }
    }

    /// True for plain column values, false for operand lists and loaded associations
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            FieldValue::List(_) | FieldValue::One(_) | FieldValue::Many(_)
        )
    }

    /// Short type name used in decode errors
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::Decimal(_) => "decimal",
            FieldValue::Text(_) => "text",
            FieldValue::Uuid(_) => "uuid",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Date(_) => "date",
            FieldValue::List(_) => "list",
            FieldValue::One(_) => "record",
            FieldValue::Many(_) => "records",
        }
    }

    /// Compares two non-null scalar values
    ///
    /// Returns `None` when either side is null or the types are not comparable.
    /// Integers and decimals compare numerically with each other.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        use FieldValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Decimal(a), Decimal(b)) => Some(a.cmp(b)),
            (Int(a), Decimal(b)) => Some(rust_decimal::Decimal::from(*a).cmp(b)),
            (Decimal(a), Int(b)) => Some(a.cmp(&rust_decimal::Decimal::from(*b))),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Uuid(a), Uuid(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Wraps a typed identifier
    pub fn id<I: EntityId>(id: I) -> Self {
        FieldValue::Uuid(*id.as_uuid())
    }

    /// Wraps an optional typed identifier
    pub fn opt_id<I: EntityId>(id: Option<I>) -> Self {
        id.map_or(FieldValue::Null, FieldValue::id)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Decimal(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Uuid(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// Conversion from a column value back into a Rust type
pub trait FromField: Sized {
    /// Returns `None` when the value has the wrong type
    fn from_field(value: &FieldValue) -> Option<Self>;
}

impl FromField for bool {
    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromField for i64 {
    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromField for i32 {
    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Int(i) => i32::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl FromField for Decimal {
    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Decimal(d) => Some(*d),
            FieldValue::Int(i) => Some(Decimal::from(*i)),
            _ => None,
        }
    }
}

impl FromField for String {
    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromField for Uuid {
    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Uuid(u) => Some(*u),
            _ => None,
        }
    }
}

impl FromField for DateTime<Utc> {
    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl FromField for NaiveDate {
    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl<T: FromField> FromField for Option<T> {
    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => Some(None),
            other => T::from_field(other).map(Some),
        }
    }
}

macro_rules! id_field_conversions {
    ($($id:ty),* $(,)?) => {
        $(
            impl From<$id> for FieldValue {
                fn from(value: $id) -> Self {
                    FieldValue::id(value)
                }
            }

            impl FromField for $id {
                fn from_field(value: &FieldValue) -> Option<Self> {
                    match value {
                        FieldValue::Uuid(u) => Some(<$id as EntityId>::from_uuid(*u)),
                        _ => None,
                    }
                }
            }
        )*
    };
}

// Tenant scope and audit columns; entity crates convert their own ids.
id_field_conversions!(OrganizationId, BranchId, UserId);

/// An ordered set of named column values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn remove(&mut self, column: &str) -> Option<FieldValue> {
        self.fields.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    /// Raw access; a missing column reads as `None`
    pub fn value(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    /// Returns the value of a column, treating a missing column as null
    pub fn value_or_null(&self, column: &str) -> &FieldValue {
        const NULL: FieldValue = FieldValue::Null;
        self.fields.get(column).unwrap_or(&NULL)
    }

    /// Reads a typed column value
    ///
    /// A missing column reads as null, so `Option<T>` targets accept it.
    pub fn get<T: FromField>(&self, column: &str) -> Result<T, StorageError> {
        let value = self.value_or_null(column);
        T::from_field(value).ok_or_else(|| {
            StorageError::decode(format!(
                "column '{}' holds {} which cannot be read as {}",
                column,
                value.type_name(),
                std::any::type_name::<T>()
            ))
        })
    }

    /// Reads the `id` column as a UUID
    pub fn id(&self) -> Option<Uuid> {
        match self.fields.get("id") {
            Some(FieldValue::Uuid(u)) => Some(*u),
            _ => None,
        }
    }

    /// Decodes an eager-loaded `BelongsTo` association
    ///
    /// Returns `None` when the association was not requested or the
    /// foreign key is null.
    pub fn nested<E: Entity>(&self, name: &str) -> Result<Option<Box<E>>, StorageError> {
        match self.fields.get(name) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::One(record)) => E::from_record(record).map(|e| Some(Box::new(e))),
            Some(other) => Err(StorageError::decode(format!(
                "association '{}' holds {} instead of a record",
                name,
                other.type_name()
            ))),
        }
    }

    /// Decodes an eager-loaded `HasMany` association
    ///
    /// Returns an empty vector when the association was not requested.
    pub fn nested_many<E: Entity>(&self, name: &str) -> Result<Vec<E>, StorageError> {
        match self.fields.get(name) {
            None | Some(FieldValue::Null) => Ok(Vec::new()),
            Some(FieldValue::Many(records)) => records.iter().map(E::from_record).collect(),
            Some(other) => Err(StorageError::decode(format!(
                "association '{}' holds {} instead of a record list",
                name,
                other.type_name()
            ))),
        }
    }

    /// Iterates over all columns in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over plain columns, skipping eager-loaded associations
    pub fn scalars(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.iter().filter(|(_, v)| v.is_scalar())
    }

    /// Overwrites this record's columns with the columns of `other`
    pub fn merge(&mut self, other: &Record) {
        for (column, value) in other.scalars() {
            self.fields.insert(column.to_string(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_typed_reads() {
        let org = OrganizationId::new();
        let record = Record::new()
            .with("name", "Main Branch")
            .with("organization_id", org)
            .with("max_use", 5i64)
            .with("note", None::<String>);

        assert_eq!(record.get::<String>("name").unwrap(), "Main Branch");
        assert_eq!(record.get::<OrganizationId>("organization_id").unwrap(), org);
        assert_eq!(record.get::<i64>("max_use").unwrap(), 5);
        assert_eq!(record.get::<Option<String>>("note").unwrap(), None);
        assert_eq!(record.get::<Option<String>>("missing").unwrap(), None);
    }

    #[test]
    fn test_wrong_type_is_decode_error() {
        let record = Record::new().with("name", 42i64);
        let error = record.get::<String>("name").unwrap_err();
        assert_eq!(error.kind(), crate::error::StorageErrorKind::Decode);
        assert!(error.message().contains("name"));
    }

    #[test]
    fn test_zero_values() {
        assert!(FieldValue::Null.is_zero());
        assert!(FieldValue::from("").is_zero());
        assert!(FieldValue::from(0i64).is_zero());
        assert!(FieldValue::from(Uuid::nil()).is_zero());
        assert!(FieldValue::from(DateTime::<Utc>::default()).is_zero());
        assert!(!FieldValue::from("x").is_zero());
        assert!(!FieldValue::from(true).is_zero());
    }

    #[test]
    fn test_numeric_comparison_across_types() {
        let int = FieldValue::from(10i64);
        let decimal = FieldValue::from(dec!(9.5));
        assert_eq!(int.compare(&decimal), Some(Ordering::Greater));
        assert_eq!(int.compare(&FieldValue::from("10")), None);
        assert_eq!(FieldValue::Null.compare(&int), None);
    }

    #[test]
    fn test_merge_skips_nested() {
        let mut base = Record::new().with("name", "old").with("code", "A");
        let patch = Record::new().with("name", "new");
        base.merge(&patch);
        assert_eq!(base.get::<String>("name").unwrap(), "new");
        assert_eq!(base.get::<String>("code").unwrap(), "A");
    }
}
