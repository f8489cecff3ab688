//! Operation context
//!
//! Every registry call carries an [`OperationContext`]. It names the actor
//! whose identifier is stamped into audit columns, a correlation id for
//! tracing across systems, and an optional deadline after which in-flight
//! store calls are abandoned.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::identifiers::UserId;

/// Call-scoped metadata passed to every registry operation
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    /// User or system actor that initiated the operation
    pub actor: Option<UserId>,
    /// Correlation ID for tracing across systems
    pub correlation_id: Option<String>,
    /// Point in time after which store calls are cancelled
    pub deadline: Option<Instant>,
    /// Additional context as key-value pairs
    pub context: HashMap<String, String>,
}

impl OperationContext {
    /// Creates a context with no actor, used by system jobs such as seeding
    pub fn system() -> Self {
        Self::default()
    }

    /// Creates a context acting on behalf of the given user
    pub fn for_actor(actor: UserId) -> Self {
        Self {
            actor: Some(actor),
            ..Default::default()
        }
    }

    /// Sets the correlation ID
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Adds context to the metadata
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Returns true once the deadline, if any, has passed
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline; `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}
