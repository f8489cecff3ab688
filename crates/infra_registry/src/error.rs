//! Registry error types
//!
//! Two layers of errors exist. [`StorageError`] is what a store backend
//! reports: a kind plus the backend's message. [`RegistryError`] is what
//! callers see: storage failures annotated with the operation, entity and
//! identifier, plus the failures that only make sense above the store
//! (aborted transactions, failed notifications, bad configuration).

use std::any::Any;
use std::fmt;

use thiserror::Error;

/// Classification of a store failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageErrorKind {
    /// No row matches the identifier or predicate
    NotFound,
    /// Uniqueness, foreign-key or check constraint rejected a write
    ConstraintViolation,
    /// A row lock could not be acquired within the configured bound
    ConcurrencyTimeout,
    /// The store could not be reached or the pool is exhausted
    Connection,
    /// The statement itself failed
    Query,
    /// A row could not be converted into the requested shape
    Decode,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageErrorKind::NotFound => "not found",
            StorageErrorKind::ConstraintViolation => "constraint violation",
            StorageErrorKind::ConcurrencyTimeout => "concurrency timeout",
            StorageErrorKind::Connection => "connection failure",
            StorageErrorKind::Query => "query failure",
            StorageErrorKind::Decode => "decode failure",
        };
        f.write_str(name)
    }
}

/// Error reported by a store backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct StorageError {
    kind: StorageErrorKind,
    message: String,
}

impl StorageError {
    /// Creates an error of the given kind
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::NotFound, message)
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::ConstraintViolation, message)
    }

    pub fn lock_timeout(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::ConcurrencyTimeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Connection, message)
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Query, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Decode, message)
    }

    /// Returns the failure classification
    pub fn kind(&self) -> StorageErrorKind {
        self.kind
    }

    /// Returns the backend message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Maps SQLx errors onto storage error kinds
///
/// PostgreSQL reports constraint and locking failures through SQLSTATE codes.
/// See <https://www.postgresql.org/docs/current/errcodes-appendix.html>.
impl From<&sqlx::Error> for StorageError {
    fn from(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => StorageError::not_found("Record not found"),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StorageError::connection(error.to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => StorageError::connection(error.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StorageError::decode(error.to_string())
            }
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    // unique, foreign key, check, not null, exclusion
                    Some("23505" | "23503" | "23514" | "23502" | "23P01") => {
                        StorageError::constraint(message)
                    }
                    // lock_not_available, deadlock_detected, query_canceled (lock/statement timeout)
                    Some("55P03" | "40P01" | "57014") => StorageError::lock_timeout(message),
                    _ => StorageError::query(message),
                }
            }
            _ => StorageError::query(error.to_string()),
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(error: sqlx::Error) -> Self {
        StorageError::from(&error)
    }
}

/// Error raised by a dispatch callback
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DispatchError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DispatchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result of a unit of work whose commit succeeded before dispatch failed
///
/// Carried by [`RegistryError::Notification`] so the caller still receives
/// what was written. Recover it with [`RegistryError::committed`] or
/// [`RegistryError::into_committed`].
pub struct Committed(Box<dyn Any + Send + Sync>);

impl fmt::Debug for Committed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Committed(..)")
    }
}

/// Errors surfaced by registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The store rejected or failed an operation
    #[error("{operation} on {entity} {target} failed: {source}")]
    Storage {
        operation: &'static str,
        entity: &'static str,
        target: String,
        #[source]
        source: StorageError,
    },

    /// The transaction was rolled back, by the caller or by cancellation
    #[error("Transaction aborted: {reason}")]
    TransactionAborted {
        reason: String,
        #[source]
        source: Option<Box<RegistryError>>,
    },

    /// The mutation committed but publishing its topics failed
    #[error("Notification for {entity} {target} failed on [{}]: {source}", .topics.join(", "))]
    Notification {
        entity: &'static str,
        target: String,
        topics: Vec<String>,
        #[source]
        source: DispatchError,
        committed: Option<Committed>,
    },

    /// Unknown filter field, malformed eager-load path, or similar misuse
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RegistryError {
    /// Annotates a storage failure with its operation context
    pub fn storage(
        operation: &'static str,
        entity: &'static str,
        target: impl fmt::Display,
        source: StorageError,
    ) -> Self {
        RegistryError::Storage {
            operation,
            entity,
            target: target.to_string(),
            source,
        }
    }

    /// Creates a not found error for an entity and identifier
    ///
    /// # Example
    ///
    /// ```rust
    /// use infra_registry::RegistryError;
    ///
    /// let error = RegistryError::not_found("get_by_id", "branch", "BRN-123");
    /// assert!(error.is_not_found());
    /// assert!(error.to_string().contains("branch"));
    /// ```
    pub fn not_found(operation: &'static str, entity: &'static str, target: impl fmt::Display) -> Self {
        let target = target.to_string();
        let source = StorageError::not_found(format!("{} '{}' does not exist", entity, target));
        RegistryError::Storage {
            operation,
            entity,
            target,
            source,
        }
    }

    /// Creates an abort error without an underlying cause
    pub fn aborted(reason: impl Into<String>) -> Self {
        RegistryError::TransactionAborted {
            reason: reason.into(),
            source: None,
        }
    }

    /// Wraps the error that caused a rollback
    pub fn aborted_by(cause: RegistryError) -> Self {
        RegistryError::TransactionAborted {
            reason: cause.to_string(),
            source: Some(Box::new(cause)),
        }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        RegistryError::Configuration(message.into())
    }

    /// Follows abort wrappers down to the error that caused them
    pub fn root(&self) -> &RegistryError {
        match self {
            RegistryError::TransactionAborted {
                source: Some(inner),
                ..
            } => inner.root(),
            other => other,
        }
    }

    /// Returns the storage kind of the root cause, if it is a storage error
    pub fn storage_kind(&self) -> Option<StorageErrorKind> {
        match self.root() {
            RegistryError::Storage { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        self.storage_kind() == Some(StorageErrorKind::NotFound)
    }

    /// Checks if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        self.storage_kind() == Some(StorageErrorKind::ConstraintViolation)
    }

    /// Checks if a row lock could not be acquired in time
    pub fn is_concurrency_timeout(&self) -> bool {
        self.storage_kind() == Some(StorageErrorKind::ConcurrencyTimeout)
    }

    /// Checks if the caller may retry the whole unit of work
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.storage_kind(),
            Some(StorageErrorKind::ConcurrencyTimeout | StorageErrorKind::Connection)
        )
    }

    /// Checks if the transaction was aborted
    pub fn is_aborted(&self) -> bool {
        matches!(self, RegistryError::TransactionAborted { .. })
    }

    /// Checks if the mutation committed but its notification failed
    pub fn is_notification(&self) -> bool {
        matches!(self.root(), RegistryError::Notification { .. })
    }

    /// Attaches the committed result to a notification failure
    ///
    /// Other variants are returned unchanged.
    pub fn with_committed<T: Any + Send + Sync>(self, value: T) -> Self {
        match self {
            RegistryError::Notification {
                entity,
                target,
                topics,
                source,
                ..
            } => RegistryError::Notification {
                entity,
                target,
                topics,
                source,
                committed: Some(Committed(Box::new(value))),
            },
            other => other,
        }
    }

    /// Borrows the committed result of a failed notification
    ///
    /// `None` unless this is a notification failure carrying a `T`.
    pub fn committed<T: Any>(&self) -> Option<&T> {
        match self.root() {
            RegistryError::Notification {
                committed: Some(Committed(value)),
                ..
            } => (**value).downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Takes the committed result of a failed notification
    pub fn into_committed<T: Any>(self) -> Option<T> {
        match self {
            RegistryError::Notification {
                committed: Some(Committed(value)),
                ..
            } => value.downcast::<T>().ok().map(|boxed| *boxed),
            RegistryError::TransactionAborted {
                source: Some(inner),
                ..
            } => (*inner).into_committed(),
            _ => None,
        }
    }

    /// Checks if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self.root(), RegistryError::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let error = RegistryError::storage(
            "create",
            "invitation_code",
            "INV-1",
            StorageError::constraint("duplicate key value violates unique constraint"),
        );
        let message = error.to_string();
        assert!(message.contains("create"));
        assert!(message.contains("invitation_code"));
        assert!(message.contains("INV-1"));
        assert!(error.is_constraint_violation());
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_abort_preserves_root_kind() {
        let cause = RegistryError::storage(
            "get_by_id_lock",
            "invitation_code",
            "INV-1",
            StorageError::lock_timeout("canceling statement due to lock timeout"),
        );
        let aborted = RegistryError::aborted_by(cause);

        assert!(aborted.is_aborted());
        assert!(aborted.is_concurrency_timeout());
        assert!(aborted.is_retryable());
        assert!(matches!(aborted.root(), RegistryError::Storage { .. }));
    }

    #[test]
    fn test_notification_is_not_storage() {
        let error = RegistryError::Notification {
            entity: "branch",
            target: "BRN-1".to_string(),
            topics: vec!["branch.create".to_string(), "branch.create.1".to_string()],
            source: DispatchError::new("broker unavailable"),
            committed: None,
        };
        assert!(error.is_notification());
        assert!(error.storage_kind().is_none());
        assert!(error.to_string().contains("branch.create, branch.create.1"));
        assert!(error.committed::<String>().is_none());
    }

    #[test]
    fn test_committed_value_survives_notification_failure() {
        let error = RegistryError::Notification {
            entity: "branch",
            target: "BRN-1".to_string(),
            topics: vec!["branch.create".to_string()],
            source: DispatchError::new("broker unavailable"),
            committed: None,
        }
        .with_committed(String::from("BRN-1"));

        assert_eq!(error.committed::<String>().map(String::as_str), Some("BRN-1"));
        assert!(error.committed::<u64>().is_none());
        assert_eq!(error.into_committed::<String>(), Some("BRN-1".to_string()));

        let other = RegistryError::configuration("bad path").with_committed(7_u64);
        assert!(other.committed::<u64>().is_none());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let error = StorageError::from(sqlx::Error::RowNotFound);
        assert_eq!(error.kind(), StorageErrorKind::NotFound);
    }
}
