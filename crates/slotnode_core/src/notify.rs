//! Named change notifications posted by nodes.
//!
//! # Responsibility
//! - Carry `didUpdateNode` and focus requests to subscribed observers.
//!
//! # Invariants
//! - Delivery is synchronous, in observer registration order.
//! - Observers receive the notification by reference and cannot reach the
//!   tree, so delivery never re-enters a structural edit.

use crate::model::value::NodeId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Notification channel names understood by the view layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationName {
    #[serde(rename = "didUpdateNode")]
    DidUpdateNode,
    #[serde(rename = "shouldFocusSubnode")]
    ShouldFocusSubnode,
    #[serde(rename = "shouldFocusAndExpandSubnode")]
    ShouldFocusAndExpandSubnode,
}

impl NotificationName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DidUpdateNode => "didUpdateNode",
            Self::ShouldFocusSubnode => "shouldFocusSubnode",
            Self::ShouldFocusAndExpandSubnode => "shouldFocusAndExpandSubnode",
        }
    }
}

/// One posted event with an optional node payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub name: NotificationName,
    pub sender: NodeId,
    pub payload: Option<NodeId>,
}

/// Subscriber contract for posted notifications.
pub trait NotificationObserver: Send + Sync {
    fn observe(&self, notification: &Notification);
}

/// In-process publish/subscribe bus.
#[derive(Default)]
pub struct NotificationCenter {
    observers: Vec<Arc<dyn NotificationObserver>>,
    posted: u64,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Arc<dyn NotificationObserver>) {
        self.observers.push(observer);
    }

    /// Removes an observer by pointer identity. Returns whether it was found.
    pub fn remove_observer(&mut self, observer: &Arc<dyn NotificationObserver>) -> bool {
        let before = self.observers.len();
        self.observers.retain(|candidate| !Arc::ptr_eq(candidate, observer));
        before != self.observers.len()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Total notifications posted since creation.
    pub fn posted_count(&self) -> u64 {
        self.posted
    }

    pub fn post(&mut self, notification: Notification) {
        self.posted += 1;
        for observer in &self.observers {
            observer.observe(&notification);
        }
    }
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("observers", &self.observers.len())
            .field("posted", &self.posted)
            .finish()
    }
}
