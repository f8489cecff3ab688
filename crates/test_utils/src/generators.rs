//! Property-Based Test Generators
//!
//! Provides proptest strategies for identifiers, column values and
//! reporting periods.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use core_kernel::{BranchId, EntityId, OrganizationId};
use infra_registry::FieldValue;
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Strategy for any typed identifier
pub fn entity_id_strategy<I: EntityId>() -> impl Strategy<Value = I> {
    any::<[u8; 16]>().prop_map(|bytes| I::from_uuid(Uuid::from_bytes(bytes)))
}

pub fn organization_id_strategy() -> impl Strategy<Value = OrganizationId> {
    entity_id_strategy()
}

pub fn branch_id_strategy() -> impl Strategy<Value = BranchId> {
    entity_id_strategy()
}

/// Strategy for upper-case codes such as `INV-7K2Q`
pub fn code_strategy() -> impl Strategy<Value = String> {
    "[A-Z]{3}-[A-Z0-9]{4,8}"
}

/// Strategy for arbitrary user text, quotes and percent signs included
pub fn hostile_text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<String>(),
        Just("'; DROP TABLE accounts; --".to_string()),
        Just("100% \\_off_".to_string()),
        Just("$1".to_string()),
    ]
}

/// Strategy for timestamps in 2020-2030, truncated to microseconds
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (1_577_836_800i64..1_893_456_000i64, 0u32..1_000_000u32).prop_map(|(secs, micros)| {
        Utc.timestamp_opt(secs, micros * 1_000)
            .single()
            .unwrap_or_default()
    })
}

/// Strategy for dates in 2020-2030
pub fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0i64..3_650i64).prop_map(|days| {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default() + Duration::days(days)
    })
}

/// Strategy for `(year, month)` pairs with a valid month
pub fn month_strategy() -> impl Strategy<Value = (i32, u32)> {
    (2000i32..2100i32, 1u32..=12u32)
}

/// Strategy for Decimal values with up to four decimal places
pub fn decimal_strategy() -> impl Strategy<Value = Decimal> {
    (-1_000_000_000i64..1_000_000_000i64, 0u32..4u32).prop_map(|(m, s)| Decimal::new(m, s))
}

/// Strategy for scalar column values of every storable kind
pub fn scalar_value_strategy() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        Just(FieldValue::Null),
        any::<bool>().prop_map(FieldValue::Bool),
        any::<i64>().prop_map(FieldValue::Int),
        decimal_strategy().prop_map(FieldValue::Decimal),
        hostile_text_strategy().prop_map(FieldValue::Text),
        any::<[u8; 16]>().prop_map(|b| FieldValue::Uuid(Uuid::from_bytes(b))),
        timestamp_strategy().prop_map(FieldValue::Timestamp),
        date_strategy().prop_map(FieldValue::Date),
    ]
}
