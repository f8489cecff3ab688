//! Change notification dispatch
//!
//! A [`Dispatcher`] receives the topics of a committed mutation together
//! with the projected entity serialized as JSON. Transport is the
//! implementation's business; the registry only reports failures.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::DispatchError;
use crate::topic::Topic;

/// Publishes notifications for committed mutations
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, topics: &[Topic], payload: &serde_json::Value)
        -> Result<(), DispatchError>;
}

/// A published notification, as seen by in-process subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub topics: Vec<Topic>,
    pub payload: serde_json::Value,
}

/// Logs every notification at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDispatcher;

#[async_trait]
impl Dispatcher for TracingDispatcher {
    async fn dispatch(
        &self,
        topics: &[Topic],
        payload: &serde_json::Value,
    ) -> Result<(), DispatchError> {
        let names: Vec<&str> = topics.iter().map(Topic::as_str).collect();
        info!(topics = ?names, %payload, "Notification published");
        Ok(())
    }
}

/// Fans notifications out over a tokio broadcast channel
///
/// Having no subscribers is not an error; notifications are simply dropped.
#[derive(Debug, Clone)]
pub struct BroadcastDispatcher {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl Dispatcher for BroadcastDispatcher {
    async fn dispatch(
        &self,
        topics: &[Topic],
        payload: &serde_json::Value,
    ) -> Result<(), DispatchError> {
        let notification = Notification {
            topics: topics.to_vec(),
            payload: payload.clone(),
        };
        match self.sender.send(notification) {
            Ok(receivers) => debug!(receivers, "Notification broadcast"),
            Err(_) => debug!("Notification dropped, no subscribers"),
        }
        Ok(())
    }
}

/// Boxed future returned by [`FnDispatcher`] closures
pub type DispatchFuture = Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send>>;

/// Adapts an async closure into a dispatcher
pub struct FnDispatcher<F> {
    f: F,
}

impl<F> FnDispatcher<F>
where
    F: Fn(Vec<Topic>, serde_json::Value) -> DispatchFuture + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnDispatcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDispatcher").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Dispatcher for FnDispatcher<F>
where
    F: Fn(Vec<Topic>, serde_json::Value) -> DispatchFuture + Send + Sync,
{
    async fn dispatch(
        &self,
        topics: &[Topic],
        payload: &serde_json::Value,
    ) -> Result<(), DispatchError> {
        (self.f)(topics.to_vec(), payload.clone()).await
    }
}
