//! Action lifecycle notifications.
//!
//! The lifecycle manager publishes one [`ActionEvent`] per status change,
//! after the change is stored. Each listener holds an unbounded flume
//! receiver, so a slow listener buffers and never holds up the manager.

use std::sync::{Arc, Mutex};

use cfo_core::action::AutonomousAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which lifecycle step produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionEventKind {
    /// Stored as pending or parked for approval.
    Created,
    /// `requires_approval -> pending`.
    Approved,
    /// `requires_approval -> failed` with the reviewer's reason.
    Rejected,
    /// Refused by the guardrails at creation.
    Blocked,
    Completed,
    Failed,
}

/// The action as stored right after the step in `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEvent {
    pub kind: ActionEventKind,
    pub action: AutonomousAction,
    pub at: DateTime<Utc>,
}

impl ActionEvent {
    pub fn new(kind: ActionEventKind, action: &AutonomousAction) -> Self {
        Self {
            kind,
            action: action.clone(),
            at: Utc::now(),
        }
    }
}

/// Fan-out of [`ActionEvent`]s to every live listener.
///
/// Listeners only see what is published after they subscribe. Clones share
/// the same listener list.
#[derive(Clone)]
pub struct ActionEventBus {
    listeners: Arc<Mutex<Vec<flume::Sender<ActionEvent>>>>,
}

impl ActionEventBus {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> flume::Receiver<ActionEvent> {
        let (tx, rx) = flume::unbounded();
        self.listeners
            .lock()
            .expect("action listeners lock poisoned")
            .push(tx);
        rx
    }

    /// Send `event` to each listener, forgetting those whose receiver is gone.
    pub fn publish(&self, event: ActionEvent) {
        let mut listeners = self.listeners.lock().expect("action listeners lock poisoned");
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners
            .lock()
            .expect("action listeners lock poisoned")
            .len()
    }
}

impl Default for ActionEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ActionEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
