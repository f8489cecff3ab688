//! Notification topics
//!
//! Topics are hierarchical strings derived from a mutated entity:
//!
//! - `<entity>.<event>`
//! - `<entity>.<event>.<id>`
//! - `<entity>.<event>.branch.<branch_id>`
//! - `<entity>.<event>.organization.<organization_id>`
//! - `<entity>.<event>.<relation>.<parent_id>` for entity-specific parents
//!
//! Identifiers render as lowercase hyphenated UUIDs without the display
//! prefix of the typed identifier.

use std::fmt;
use std::sync::Arc;

use core_kernel::EntityId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::Entity;

/// Mutation that produced a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Create,
    Update,
    Delete,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Create => "create",
            Lifecycle::Update => "update",
            Lifecycle::Delete => "delete",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully rendered topic string
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for Topic {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A parent relation appended to the standard topic set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicScope {
    pub relation: &'static str,
    pub id: Uuid,
}

impl TopicScope {
    pub fn new<I: EntityId>(relation: &'static str, id: I) -> Self {
        Self {
            relation,
            id: *id.as_uuid(),
        }
    }
}

/// Renders topics for one entity name and lifecycle event
///
/// # Example
///
/// ```rust
/// use infra_registry::{Lifecycle, TopicBuilder};
/// use uuid::Uuid;
///
/// let id = Uuid::nil();
/// let builder = TopicBuilder::new("branch", Lifecycle::Update);
/// assert_eq!(builder.unscoped().as_str(), "branch.update");
/// assert_eq!(
///     builder.by_id(id).as_str(),
///     "branch.update.00000000-0000-0000-0000-000000000000"
/// );
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TopicBuilder {
    entity: &'static str,
    event: Lifecycle,
}

impl TopicBuilder {
    pub fn new(entity: &'static str, event: Lifecycle) -> Self {
        Self { entity, event }
    }

    pub fn unscoped(&self) -> Topic {
        Topic(format!("{}.{}", self.entity, self.event))
    }

    pub fn by_id(&self, id: Uuid) -> Topic {
        Topic(format!("{}.{}.{}", self.entity, self.event, id.hyphenated()))
    }

    pub fn scoped(&self, relation: &str, id: Uuid) -> Topic {
        Topic(format!(
            "{}.{}.{}.{}",
            self.entity,
            self.event,
            relation,
            id.hyphenated()
        ))
    }

    /// The standard topic set for an entity
    ///
    /// Order: unscoped, id, branch, organization, then the entity's extra
    /// scopes. Tenant topics are omitted when the entity has no such scope.
    pub fn standard<E: Entity>(event: Lifecycle, entity: &E) -> Vec<Topic> {
        let builder = Self::new(E::schema().name, event);
        let mut topics = vec![builder.unscoped(), builder.by_id(entity.uuid())];
        if let Some(branch) = entity.branch_id() {
            topics.push(builder.scoped("branch", *branch.as_uuid()));
        }
        if let Some(organization) = entity.organization_id() {
            topics.push(builder.scoped("organization", *organization.as_uuid()));
        }
        topics.extend(
            entity
                .topic_scopes()
                .into_iter()
                .map(|scope| builder.scoped(scope.relation, scope.id)),
        );
        topics
    }
}

/// Function from entity state to topics
pub type TopicFn<E> = Arc<dyn Fn(&E) -> Vec<Topic> + Send + Sync>;

/// The three per-event topic builders of a registry
pub struct LifecycleTopics<E> {
    pub on_create: TopicFn<E>,
    pub on_update: TopicFn<E>,
    pub on_delete: TopicFn<E>,
}

impl<E: Entity> Default for LifecycleTopics<E> {
    fn default() -> Self {
        Self {
            on_create: Arc::new(|e: &E| TopicBuilder::standard(Lifecycle::Create, e)),
            on_update: Arc::new(|e: &E| TopicBuilder::standard(Lifecycle::Update, e)),
            on_delete: Arc::new(|e: &E| TopicBuilder::standard(Lifecycle::Delete, e)),
        }
    }
}

impl<E> Clone for LifecycleTopics<E> {
    fn clone(&self) -> Self {
        Self {
            on_create: Arc::clone(&self.on_create),
            on_update: Arc::clone(&self.on_update),
            on_delete: Arc::clone(&self.on_delete),
        }
    }
}

impl<E> LifecycleTopics<E> {
    pub fn build(&self, event: Lifecycle, entity: &E) -> Vec<Topic> {
        match event {
            Lifecycle::Create => (self.on_create)(entity),
            Lifecycle::Update => (self.on_update)(entity),
            Lifecycle::Delete => (self.on_delete)(entity),
        }
    }
}
