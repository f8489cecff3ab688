//! Recording Dispatcher
//!
//! A [`Dispatcher`] that keeps every notification it receives so tests can
//! assert on exactly what a registry published and when.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use infra_registry::{DispatchError, Dispatcher, Notification, Topic};

/// Dispatcher that records notifications in memory
///
/// Clones share the same log, so a test can keep one handle and give
/// another to the registry. With [`RecordingDispatcher::set_failing`]
/// every dispatch is still recorded but reports an error.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    calls: Arc<Mutex<Vec<Notification>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dispatcher that fails every call
    pub fn failing() -> Self {
        let dispatcher = Self::default();
        dispatcher.set_failing(true);
        dispatcher
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every notification received so far, oldest first
    pub fn calls(&self) -> Vec<Notification> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The topic lists of every call as plain strings
    pub fn topics(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .map(|n| n.topics.iter().map(Topic::to_string).collect())
            .collect()
    }

    /// Number of calls whose topic list contains `topic`
    pub fn count_for(&self, topic: &str) -> usize {
        self.calls()
            .iter()
            .filter(|n| n.topics.iter().any(|t| t.as_str() == topic))
            .count()
    }

    /// The most recent notification
    pub fn last(&self) -> Option<Notification> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Shared handle suitable for `RegistryConfig::new`
    pub fn shared(&self) -> Arc<dyn Dispatcher> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        topics: &[Topic],
        payload: &serde_json::Value,
    ) -> Result<(), DispatchError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Notification {
                topics: topics.to_vec(),
                payload: payload.clone(),
            });
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::new("broker unavailable"));
        }
        Ok(())
    }
}
