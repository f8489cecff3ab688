//! Filter and sort query DSL
//!
//! Filters are `(field, operator, value)` triples combined with AND. Sorts
//! are `(field, order)` pairs applied in sequence. Both are independent of
//! entity type and are validated against a [`Schema`] before any store sees
//! them, so column identifiers reaching SQL always come from the static
//! schema and values are always bound.
//!
//! The in-memory evaluators ([`FilterSet::matches`], [`SortSet::compare`])
//! follow PostgreSQL semantics: comparisons against NULL are false, NULLs
//! sort last ascending and first descending.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::entity::Schema;
use crate::error::RegistryError;
use crate::value::{FieldValue, Record};

/// Comparison operator of a single filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOp {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    /// Column is NULL; the filter value is ignored
    IsEmpty,
    /// Column is not NULL; the filter value is ignored
    IsNotEmpty,
    /// Case-insensitive substring match on text columns
    Contains,
    /// Column equals one of the values in a [`FieldValue::List`]
    In,
}

impl FilterOp {
    /// SQL comparison operator for the binary operators
    pub fn sql_operator(&self) -> Option<&'static str> {
        match self {
            FilterOp::Equal => Some("="),
            FilterOp::NotEqual => Some("<>"),
            FilterOp::GreaterThan => Some(">"),
            FilterOp::GreaterOrEqual => Some(">="),
            FilterOp::LessThan => Some("<"),
            FilterOp::LessOrEqual => Some("<="),
            _ => None,
        }
    }
}

/// A single predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::Equal, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::NotEqual, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::GreaterThan, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::GreaterOrEqual, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::LessThan, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::LessOrEqual, value)
    }

    pub fn is_empty(field: impl Into<String>) -> Self {
        Self::new(field, FilterOp::IsEmpty, FieldValue::Null)
    }

    pub fn is_not_empty(field: impl Into<String>) -> Self {
        Self::new(field, FilterOp::IsNotEmpty, FieldValue::Null)
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::new(field, FilterOp::Contains, FieldValue::Text(needle.into()))
    }

    pub fn in_list<V: Into<FieldValue>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        Self::new(field, FilterOp::In, FieldValue::List(values))
    }

    /// Checks the field against the schema and the value against the operator
    pub fn validate(&self, schema: &Schema) -> Result<(), RegistryError> {
        if !schema.has_column(&self.field) {
            return Err(RegistryError::configuration(format!(
                "unknown filter field '{}' on {}",
                self.field, schema.name
            )));
        }
        let valid = match self.op {
            FilterOp::IsEmpty | FilterOp::IsNotEmpty => true,
            FilterOp::In => matches!(&self.value, FieldValue::List(items) if items.iter().all(FieldValue::is_scalar)),
            FilterOp::Contains => matches!(self.value, FieldValue::Text(_)),
            FilterOp::Equal | FilterOp::NotEqual => self.value.is_scalar(),
            _ => self.value.is_scalar() && !self.value.is_null(),
        };
        if valid {
            Ok(())
        } else {
            Err(RegistryError::configuration(format!(
                "filter {:?} on '{}' cannot take a {} value",
                self.op,
                self.field,
                self.value.type_name()
            )))
        }
    }

    /// Evaluates the predicate against a record
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.value_or_null(&self.field);
        match self.op {
            FilterOp::IsEmpty => actual.is_null(),
            FilterOp::IsNotEmpty => !actual.is_null(),
            FilterOp::Equal if self.value.is_null() => actual.is_null(),
            FilterOp::NotEqual if self.value.is_null() => !actual.is_null(),
            FilterOp::Contains => match (actual, &self.value) {
                (FieldValue::Text(haystack), FieldValue::Text(needle)) => haystack
                    .to_lowercase()
                    .contains(&needle.to_lowercase()),
                _ => false,
            },
            FilterOp::In => match &self.value {
                FieldValue::List(items) => items
                    .iter()
                    .any(|item| actual.compare(item) == Some(Ordering::Equal)),
                _ => false,
            },
            op => match actual.compare(&self.value) {
                None => false,
                Some(ordering) => match op {
                    FilterOp::Equal => ordering == Ordering::Equal,
                    FilterOp::NotEqual => ordering != Ordering::Equal,
                    FilterOp::GreaterThan => ordering == Ordering::Greater,
                    FilterOp::GreaterOrEqual => ordering != Ordering::Less,
                    FilterOp::LessThan => ordering == Ordering::Less,
                    FilterOp::LessOrEqual => ordering != Ordering::Greater,
                    _ => false,
                },
            },
        }
    }
}

/// An AND-combined list of filters
///
/// # Example
///
/// ```rust
/// use infra_registry::{Filter, FilterSet, Record};
///
/// let filters = FilterSet::new()
///     .and(Filter::eq("code", "WELCOME"))
///     .between("max_use", 1i64, 10i64);
///
/// let row = Record::new().with("code", "WELCOME").with("max_use", 5i64);
/// assert!(filters.matches(&row));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// Adds a closed interval `start <= field <= end`
    pub fn between(
        self,
        field: impl Into<String>,
        start: impl Into<FieldValue>,
        end: impl Into<FieldValue>,
    ) -> Self {
        let field = field.into();
        self.and(Filter::gte(field.clone(), start))
            .and(Filter::lte(field, end))
    }

    pub fn extend(&mut self, other: FilterSet) {
        self.filters.extend(other.filters);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Filter> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn validate(&self, schema: &Schema) -> Result<(), RegistryError> {
        self.filters.iter().try_for_each(|f| f.validate(schema))
    }

    /// An empty set matches every record
    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }
}

impl From<Vec<Filter>> for FilterSet {
    fn from(filters: Vec<Filter>) -> Self {
        Self { filters }
    }
}

impl FromIterator<Filter> for FilterSet {
    fn from_iter<T: IntoIterator<Item = Filter>>(iter: T) -> Self {
        Self {
            filters: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FilterSet {
    type Item = &'a Filter;
    type IntoIter = std::slice::Iter<'a, Filter>;

    fn into_iter(self) -> Self::IntoIter {
        self.filters.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn sql(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }

    /// Orders two records by this key; NULL is the largest value
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let left = a.value_or_null(&self.field);
        let right = b.value_or_null(&self.field);
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => left.compare(right).unwrap_or(Ordering::Equal),
        };
        match self.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// An ordered list of sort keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSet {
    sorts: Vec<Sort>,
}

impl SortSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, sort: Sort) -> Self {
        self.sorts.push(sort);
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sort> {
        self.sorts.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.sorts.is_empty()
    }

    pub fn validate(&self, schema: &Schema) -> Result<(), RegistryError> {
        match self.sorts.iter().find(|s| !schema.has_column(&s.field)) {
            Some(sort) => Err(RegistryError::configuration(format!(
                "unknown sort field '{}' on {}",
                sort.field, schema.name
            ))),
            None => Ok(()),
        }
    }

    /// Multi-key comparison; the first non-equal key decides
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        self.sorts
            .iter()
            .map(|s| s.compare(a, b))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl From<Vec<Sort>> for SortSet {
    fn from(sorts: Vec<Sort>) -> Self {
        Self { sorts }
    }
}

impl FromIterator<Sort> for SortSet {
    fn from_iter<T: IntoIterator<Item = Sort>>(iter: T) -> Self {
        Self {
            sorts: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SortSet {
    type Item = &'a Sort;
    type IntoIter = std::slice::Iter<'a, Sort>;

    fn into_iter(self) -> Self::IntoIter {
        self.sorts.iter()
    }
}

/// A complete select handed to a store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: FilterSet,
    pub sorts: SortSet,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Take a row lock on every selected row until the transaction ends
    pub lock: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filtered(filters: FilterSet) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    pub fn with_sorts(mut self, sorts: SortSet) -> Self {
        self.sorts = sorts;
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn for_update(mut self) -> Self {
        self.lock = true;
        self
    }

    pub fn validate(&self, schema: &Schema) -> Result<(), RegistryError> {
        self.filters.validate(schema)?;
        self.sorts.validate(schema)
    }

    /// Applies the query to an in-memory row set
    ///
    /// Sorting is stable, so rows that compare equal keep their input order.
    pub fn apply(&self, rows: impl IntoIterator<Item = Record>) -> Vec<Record> {
        let mut matched: Vec<Record> = rows
            .into_iter()
            .filter(|r| self.filters.matches(r))
            .collect();
        if !self.sorts.is_empty() {
            matched.sort_by(|a, b| self.sorts.compare(a, b));
        }
        let offset = self.offset.unwrap_or(0) as usize;
        let limit = self.limit.map_or(usize::MAX, |l| l as usize);
        matched.into_iter().skip(offset).take(limit).collect()
    }
}
