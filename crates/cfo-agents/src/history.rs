use std::collections::{HashSet, VecDeque};
use std::sync::RwLock;

use cfo_core::action::AutonomousAction;
use cfo_core::types::AgentTask;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// What a history record holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Action { action: AutonomousAction },
    Task { task: AgentTask },
}

/// Immutable snapshot of a terminal action or task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Id of the recorded action or task.
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub entry: HistoryEntry,
}

impl HistoryRecord {
    pub fn action(&self) -> Option<&AutonomousAction> {
        match &self.entry {
            HistoryEntry::Action { action } => Some(action),
            HistoryEntry::Task { .. } => None,
        }
    }

    pub fn task(&self) -> Option<&AgentTask> {
        match &self.entry {
            HistoryEntry::Task { task } => Some(task),
            HistoryEntry::Action { .. } => None,
        }
    }
}

#[derive(Default)]
struct Inner {
    records: VecDeque<HistoryRecord>,
    seen: HashSet<Uuid>,
}

/// Append-only audit log, bounded to the most recent `capacity` records.
///
/// Only terminal snapshots are accepted and each retained id is recorded
/// at most once; a second append for the same id is ignored and reported
/// as `false`. Once full, appending evicts the oldest record.
pub struct HistoryLog {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl HistoryLog {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// A log holding at most `capacity` records (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a terminal action. Returns `true` if it was appended.
    pub fn append_action(&self, action: &AutonomousAction) -> bool {
        if !action.status.is_terminal() {
            debug!(action_id = %action.id, status = %action.status, "skipping non-terminal action");
            return false;
        }
        self.append(
            action.id,
            HistoryEntry::Action {
                action: action.clone(),
            },
        )
    }

    /// Record a terminal task. Returns `true` if it was appended.
    pub fn append_task(&self, task: &AgentTask) -> bool {
        if !task.status.is_terminal() {
            debug!(task_id = %task.id, status = %task.status, "skipping non-terminal task");
            return false;
        }
        self.append(task.id, HistoryEntry::Task { task: task.clone() })
    }

    fn append(&self, id: Uuid, entry: HistoryEntry) -> bool {
        let mut inner = self.inner.write().expect("history lock poisoned");
        if !inner.seen.insert(id) {
            debug!(id = %id, "history already holds this id");
            return false;
        }
        if inner.records.len() == self.capacity {
            if let Some(evicted) = inner.records.pop_front() {
                inner.seen.remove(&evicted.id);
                debug!(id = %evicted.id, "history full, evicted oldest record");
            }
        }
        inner.records.push_back(HistoryRecord {
            id,
            recorded_at: Utc::now(),
            entry,
        });
        true
    }

    /// Up to `limit` records, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryRecord> {
        let inner = self.inner.read().expect("history lock poisoned");
        inner.records.iter().rev().take(limit).cloned().collect()
    }

    /// Up to `limit` action records, most recent first.
    pub fn actions(&self, limit: usize) -> Vec<HistoryRecord> {
        let inner = self.inner.read().expect("history lock poisoned");
        inner
            .records
            .iter()
            .rev()
            .filter(|r| r.action().is_some())
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.inner
            .read()
            .expect("history lock poisoned")
            .seen
            .contains(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("history lock poisoned").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HistoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryLog")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
