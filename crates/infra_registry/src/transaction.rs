//! Registry transactions
//!
//! A [`Transaction`] wraps a store transaction together with the operation
//! context it was started under and the notifications queued by mutations
//! performed inside it. Notifications are dispatched only after the store
//! commit succeeds; a rollback, explicit or by drop, discards them.

use std::future::Future;
use std::sync::Arc;

use core_kernel::OperationContext;
use tracing::{debug, warn};

use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, RegistryError};
use crate::store::{Store, StoreTransaction};
use crate::topic::Topic;

/// Notification queued by a mutation, sent after commit
pub(crate) struct PendingNotification {
    pub entity: &'static str,
    pub target: String,
    pub topics: Vec<Topic>,
    pub payload: Result<serde_json::Value, String>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

/// Runs a store call under the context deadline
///
/// Expiry drops the in-flight call and reports `TransactionAborted`.
pub(crate) async fn with_deadline<T, F>(
    ctx: &OperationContext,
    operation: &'static str,
    future: F,
) -> Result<T, RegistryError>
where
    F: Future<Output = Result<T, RegistryError>>,
{
    match ctx.deadline {
        None => future.await,
        Some(deadline) => {
            match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), future).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(operation, "Operation deadline exceeded");
                    Err(RegistryError::aborted(format!(
                        "deadline exceeded during {}",
                        operation
                    )))
                }
            }
        }
    }
}

/// An open unit of work spanning one or more registries
///
/// Obtain one from [`crate::Registry::start_transaction`] or
/// [`Transaction::begin`], pass it to `*_with_tx` operations, then end it
/// with [`Transaction::finish`], [`Transaction::commit`] or
/// [`Transaction::rollback`]. Dropping it rolls back.
pub struct Transaction {
    inner: Box<dyn StoreTransaction>,
    ctx: OperationContext,
    pending: Vec<PendingNotification>,
    finished: bool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("correlation_id", &self.ctx.correlation_id)
            .field("pending", &self.pending.len())
            .field("finished", &self.finished)
            .finish()
    }
}

impl Transaction {
    /// Opens a transaction on `store`
    pub async fn begin(store: &dyn Store, ctx: OperationContext) -> Result<Self, RegistryError> {
        let inner = with_deadline(&ctx, "begin", async {
            store
                .begin()
                .await
                .map_err(|e| RegistryError::storage("begin", "transaction", store.backend(), e))
        })
        .await?;
        debug!(backend = store.backend(), "Transaction started");
        Ok(Self {
            inner,
            ctx,
            pending: Vec::new(),
            finished: false,
        })
    }

    pub fn context(&self) -> &OperationContext {
        &self.ctx
    }

    /// Number of notifications waiting for commit
    pub fn pending_notifications(&self) -> usize {
        self.pending.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn handle(&mut self) -> Result<&mut dyn StoreTransaction, RegistryError> {
        if self.finished {
            return Err(RegistryError::aborted("transaction already finished"));
        }
        Ok(self.inner.as_mut())
    }

    pub(crate) fn enqueue(&mut self, notification: PendingNotification) {
        self.pending.push(notification);
    }

    fn label(&self) -> String {
        self.ctx
            .correlation_id
            .clone()
            .unwrap_or_else(|| "-".to_string())
    }

    /// Commits, then dispatches every queued notification in order
    ///
    /// A failed dispatch does not undo the commit. All notifications are
    /// attempted and the first failure is returned as
    /// [`RegistryError::Notification`].
    pub async fn commit(&mut self) -> Result<(), RegistryError> {
        if self.finished {
            return Err(RegistryError::aborted("transaction already finished"));
        }
        self.finished = true;

        if self.ctx.is_expired() {
            self.pending.clear();
            if let Err(error) = self.inner.rollback().await {
                warn!(%error, "Rollback after deadline failed");
            }
            return Err(RegistryError::aborted("deadline exceeded before commit"));
        }

        if let Err(error) = self.inner.commit().await {
            self.pending.clear();
            return Err(RegistryError::storage("commit", "transaction", self.label(), error));
        }
        debug!(notifications = self.pending.len(), "Transaction committed");
        self.flush().await
    }

    async fn flush(&mut self) -> Result<(), RegistryError> {
        let mut first_failure = None;
        for notification in std::mem::take(&mut self.pending) {
            let outcome = match &notification.payload {
                Ok(payload) => {
                    notification
                        .dispatcher
                        .dispatch(&notification.topics, payload)
                        .await
                }
                Err(message) => Err(DispatchError::new(format!(
                    "payload serialization failed: {}",
                    message
                ))),
            };
            if let Err(source) = outcome {
                warn!(
                    entity = notification.entity,
                    target = %notification.target,
                    error = %source,
                    "Notification dispatch failed"
                );
                if first_failure.is_none() {
                    first_failure = Some(RegistryError::Notification {
                        entity: notification.entity,
                        target: notification.target,
                        topics: notification.topics.iter().map(Topic::to_string).collect(),
                        source,
                        committed: None,
                    });
                }
            }
        }
        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Rolls back and discards queued notifications
    pub async fn rollback(&mut self) -> Result<(), RegistryError> {
        if self.finished {
            return Err(RegistryError::aborted("transaction already finished"));
        }
        self.finished = true;
        let discarded = self.pending.len();
        self.pending.clear();
        self.inner
            .rollback()
            .await
            .map_err(|e| RegistryError::storage("rollback", "transaction", self.label(), e))?;
        debug!(discarded, "Transaction rolled back");
        Ok(())
    }

    /// Ends the transaction according to `outcome`
    ///
    /// `Ok` commits and passes the value through. If the commit succeeds
    /// but dispatch fails, the value rides along on the `Notification`
    /// error. `Err` rolls back and returns `TransactionAborted` wrapping the
    /// original error.
    pub async fn finish<T>(mut self, outcome: Result<T, RegistryError>) -> Result<T, RegistryError>
    where
        T: Send + Sync + 'static,
    {
        match outcome {
            Ok(value) => match self.commit().await {
                Ok(()) => Ok(value),
                Err(error) => Err(error.with_committed(value)),
            },
            Err(error) => {
                if let Err(rollback_error) = self.rollback().await {
                    warn!(error = %rollback_error, "Rollback failed");
                }
                Err(RegistryError::aborted_by(error))
            }
        }
    }
}
