//! Custom Test Assertions
//!
//! Provides assertion helpers for registry results and notification topics
//! that give more meaningful failure messages than standard assertions.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use infra_registry::{Lifecycle, RegistryError, Topic, TopicBuilder};
use uuid::Uuid;

/// Asserts that a result failed with `NotFound`
pub fn assert_not_found<T: Debug>(result: &Result<T, RegistryError>) {
    match result {
        Err(error) if error.is_not_found() => {}
        other => panic!("Expected NotFound, got {:?}", other),
    }
}

/// Asserts that a result failed with a constraint violation
pub fn assert_constraint_violation<T: Debug>(result: &Result<T, RegistryError>) {
    match result {
        Err(error) if error.is_constraint_violation() => {}
        other => panic!("Expected ConstraintViolation, got {:?}", other),
    }
}

/// Asserts that a result failed because a row lock could not be acquired in time
pub fn assert_concurrency_timeout<T: Debug>(result: &Result<T, RegistryError>) {
    match result {
        Err(error) if error.is_concurrency_timeout() => {}
        other => panic!("Expected ConcurrencyTimeout, got {:?}", other),
    }
}

/// Asserts that a result failed with `TransactionAborted`
pub fn assert_aborted<T: Debug>(result: &Result<T, RegistryError>) {
    match result {
        Err(error) if error.is_aborted() => {}
        other => panic!("Expected TransactionAborted, got {:?}", other),
    }
}

/// Asserts that a result failed with a configuration error
pub fn assert_configuration_error<T: Debug>(result: &Result<T, RegistryError>) {
    match result {
        Err(error) if error.is_configuration() => {}
        other => panic!("Expected ConfigurationError, got {:?}", other),
    }
}

/// Asserts that topics equal the expected strings, in order
pub fn assert_topics_eq(actual: &[Topic], expected: &[&str]) {
    let actual: Vec<&str> = actual.iter().map(Topic::as_str).collect();
    assert_eq!(actual, expected, "Topic mismatch");
}

/// Asserts the standard topic prefix of a tenant-scoped entity
///
/// Checks the unscoped, id, branch and organization topics, in that order,
/// at the start of `actual`. Extra scopes after them are allowed.
pub fn assert_standard_topics(
    actual: &[Topic],
    entity: &'static str,
    event: Lifecycle,
    id: Uuid,
    branch_id: Uuid,
    organization_id: Uuid,
) {
    let builder = TopicBuilder::new(entity, event);
    let expected = [
        builder.unscoped(),
        builder.by_id(id),
        builder.scoped("branch", branch_id),
        builder.scoped("organization", organization_id),
    ];
    assert!(
        actual.len() >= expected.len(),
        "Expected at least {} topics, got {:?}",
        expected.len(),
        actual
    );
    assert_eq!(&actual[..expected.len()], &expected[..], "Standard topic mismatch");
}

/// Asserts that `items` are ordered by `key`, ascending
pub fn assert_sorted_by<T, K, F>(items: &[T], key: F)
where
    K: PartialOrd + Debug,
    F: Fn(&T) -> K,
{
    for (index, pair) in items.windows(2).enumerate() {
        let (a, b) = (key(&pair[0]), key(&pair[1]));
        assert!(a <= b, "Items out of order at {}: {:?} > {:?}", index, a, b);
    }
}

/// Asserts that an instant lies in the closed interval `[start, end]`
pub fn assert_within(instant: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) {
    assert!(
        instant >= start && instant <= end,
        "Expected {} within [{}, {}]",
        instant,
        start,
        end
    );
}
