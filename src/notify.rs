//! Fire-and-forget domain events for the real-time channel.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::perm::{Actor, Role};

/// Who an event is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    User(String),
    Department(String),
    Role(Role),
    Everyone,
}

impl Audience {
    pub fn includes(&self, actor: &Actor) -> bool {
        match self {
            Audience::User(id) => *id == actor.id,
            Audience::Department(department) => actor.in_department(Some(department.as_str())),
            Audience::Role(role) => *role == actor.role,
            Audience::Everyone => true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainEvent {
    /// e.g. `customer.created`
    pub kind: &'static str,
    #[serde(skip)]
    pub audience: Vec<Audience>,
    pub data: Value,
}

impl DomainEvent {
    pub fn new(kind: &'static str, data: Value) -> Self {
        Self {
            kind,
            audience: Vec::new(),
            data,
        }
    }

    pub fn to(mut self, audience: Audience) -> Self {
        self.audience.push(audience);
        self
    }

    pub fn is_for(&self, actor: &Actor) -> bool {
        self.audience.iter().any(|a| a.includes(actor))
    }
}

/// Delivery is best effort: `publish` never blocks and never fails the
/// request that triggered it.
pub trait Notifier: Send + Sync {
    fn publish(&self, event: DomainEvent);

    /// A live feed of everything published from now on, when the notifier
    /// has one.
    fn subscribe(&self) -> Option<broadcast::Receiver<DomainEvent>> {
        None
    }
}

pub struct BroadcastNotifier {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, event: DomainEvent) {
        let kind = event.kind;
        // Err only means nobody is listening right now.
        match self.sender.send(event) {
            Ok(receivers) => tracing::debug!(kind, receivers, "event published"),
            Err(_) => tracing::trace!(kind, "event dropped, no subscribers"),
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<DomainEvent>> {
        Some(self.sender.subscribe())
    }
}

pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn publish(&self, _event: DomainEvent) {}
}
