//! Task scheduler: concurrent fan-out of agent tasks and a full join.
//!
//! - One tokio task per [`AgentTask`]; results come back in input order.
//! - A batch shares one deadline, computed when the batch starts.
//! - A [`CancelSignal`] is raced against every handler.
//! - Handler errors, timeouts, cancellation, malformed output and panics
//!   all end as a terminal task carrying a [`TaskFault`]; nothing escapes
//!   as an error from [`TaskScheduler::run_batch`].
//! - A task already executing under another worker (a duplicate id in the
//!   batch, or a concurrent batch sharing the task) is awaited, never rerun.

use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};

use cfo_core::reports::{RoleOutput, TaskInput};
use cfo_core::types::{AgentRole, AgentTask, FaultKind, TaskFault, TaskOutcome, TaskStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelSignal;
use crate::history::HistoryLog;
use crate::registry::AgentRegistry;
use crate::schema;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),
    #[error("invalid task transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

// ---------------------------------------------------------------------------
// TaskResult
// ---------------------------------------------------------------------------

/// One entry of a batch result, positionally matching the submitted task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub role: AgentRole,
    pub operation: String,
    pub status: TaskStatus,
    pub outcome: TaskOutcome,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskResult {
    fn from_task(task: &AgentTask, fallback: TaskFault) -> Self {
        Self {
            task_id: task.id,
            role: task.role,
            operation: task.operation.clone(),
            status: task.status,
            outcome: task
                .result
                .clone()
                .unwrap_or(TaskOutcome::Fault { fault: fallback }),
            completed_at: task.completed_at,
        }
    }

    pub fn output(&self) -> Option<&RoleOutput> {
        self.outcome.output()
    }

    pub fn fault(&self) -> Option<&TaskFault> {
        self.outcome.fault()
    }

    pub fn is_error(&self) -> bool {
        self.outcome.is_error()
    }
}

// ---------------------------------------------------------------------------
// TaskScheduler
// ---------------------------------------------------------------------------

struct Shared {
    registry: Arc<AgentRegistry>,
    tasks: DashMap<Uuid, AgentTask>,
    history: Arc<HistoryLog>,
    /// Bumped after every settle; waiters recheck their task on change.
    settled: watch::Sender<u64>,
}

/// Owns the task table and drives batches of tasks to completion.
#[derive(Clone)]
pub struct TaskScheduler {
    shared: Arc<Shared>,
    deadline: Duration,
}

impl TaskScheduler {
    pub fn new(registry: Arc<AgentRegistry>, history: Arc<HistoryLog>, deadline: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                tasks: DashMap::new(),
                history,
                settled: watch::channel(0).0,
            }),
            deadline,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.shared.registry
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Create a task in `pending` and store it in the task table.
    pub fn submit(
        &self,
        role: AgentRole,
        operation: impl Into<String>,
        input: TaskInput,
        priority: i32,
    ) -> AgentTask {
        let task = AgentTask::new(role, operation, input, priority);
        debug!(task_id = %task.id, role = %role, operation = %task.operation, "task submitted");
        self.shared.tasks.insert(task.id, task.clone());
        task
    }

    /// Current snapshot of a task.
    pub fn task(&self, id: Uuid) -> Option<AgentTask> {
        self.shared.tasks.get(&id).map(|t| t.clone())
    }

    pub fn task_count(&self) -> usize {
        self.shared.tasks.len()
    }

    pub fn completed_count(&self) -> usize {
        self.shared
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }

    /// Drop every terminal task from the task table and return how many
    /// went. Their snapshots stay in history. A pruned task handed to a
    /// batch again is stored and run as a new one.
    pub fn prune_settled(&self) -> usize {
        let mut removed = 0;
        self.shared.tasks.retain(|_, task| {
            let keep = !task.status.is_terminal();
            if !keep {
                removed += 1;
            }
            keep
        });
        debug!(removed, remaining = self.shared.tasks.len(), "settled tasks pruned");
        removed
    }

    /// Run every task concurrently and wait for all of them.
    pub async fn run_batch(&self, tasks: Vec<AgentTask>) -> Vec<TaskResult> {
        self.run_batch_with_cancel(tasks, &CancelSignal::new()).await
    }

    /// Run a single task through the same path as a batch.
    pub async fn run_one(&self, task: AgentTask) -> Result<TaskResult> {
        let id = task.id;
        self.run_batch(vec![task])
            .await
            .pop()
            .ok_or(SchedulerError::TaskNotFound(id))
    }

    /// Run every task concurrently, racing each against `cancel` and the
    /// batch deadline. Returns one result per task, in input order, once
    /// every task is terminal.
    pub async fn run_batch_with_cancel(
        &self,
        tasks: Vec<AgentTask>,
        cancel: &CancelSignal,
    ) -> Vec<TaskResult> {
        let started = StdInstant::now();
        let deadline = Instant::now() + self.deadline;
        let batch_size = tasks.len();

        let mut ids = Vec::with_capacity(batch_size);
        let mut handles = Vec::with_capacity(batch_size);
        for task in tasks {
            let id = task.id;
            self.shared.tasks.entry(id).or_insert(task);
            ids.push(id);

            let shared = Arc::clone(&self.shared);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                shared.execute(id, deadline, cancel).await
            }));
        }

        let joined = join_all(handles).await;
        let mut results = Vec::with_capacity(batch_size);
        for (id, joined) in ids.into_iter().zip(joined) {
            let result = match joined {
                Ok(result) => result,
                Err(err) => {
                    let fault = TaskFault::new(
                        FaultKind::HandlerFailure,
                        format!("handler aborted: {err}"),
                    );
                    warn!(task_id = %id, error = %err, "task worker panicked");
                    self.shared.settle(id, Err(fault), Duration::ZERO)
                }
            };
            results.push(result);
        }

        let degraded = results.iter().filter(|r| r.is_error()).count();
        info!(
            tasks = batch_size,
            degraded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch complete"
        );
        results
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("tasks", &self.shared.tasks.len())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Shared {
    async fn execute(&self, id: Uuid, deadline: Instant, cancel: CancelSignal) -> TaskResult {
        if cancel.is_cancelled() {
            let fault = TaskFault::new(FaultKind::Cancelled, "batch cancelled before start");
            // only a task nobody has started; anything else falls through
            if let Ok(result) = self.transition(id, TaskStatus::Pending, Err(fault), Duration::ZERO) {
                return result;
            }
        }

        let task = match self.begin(id) {
            Ok(task) => task,
            Err(SchedulerError::InvalidTransition {
                from: TaskStatus::Executing,
                ..
            }) => {
                debug!(task_id = %id, "task already executing, waiting for it to settle");
                return self.wait_settled(id).await;
            }
            Err(err) => {
                warn!(task_id = %id, error = %err, "task not started");
                return self.current(id, &err);
            }
        };

        let handler = match self.registry.handler(task.role) {
            Ok(handler) => handler,
            Err(err) => {
                let fault = TaskFault::new(FaultKind::HandlerFailure, err.to_string());
                return self.settle(id, Err(fault), Duration::ZERO);
            }
        };

        let started = StdInstant::now();
        let role = task.role;
        let run = tokio::spawn(async move { handler.handle(&task.operation, &task.input).await });
        let abort = run.abort_handle();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                abort.abort();
                Err(TaskFault::new(FaultKind::Cancelled, "batch cancelled"))
            }
            res = tokio::time::timeout_at(deadline, run) => {
                match res {
                    Err(_) => {
                        abort.abort();
                        Err(TaskFault::new(
                            FaultKind::Timeout,
                            format!("{role} did not finish before the batch deadline"),
                        ))
                    }
                    Ok(Err(join)) => Err(TaskFault::new(
                        FaultKind::HandlerFailure,
                        format!("handler aborted: {join}"),
                    )),
                    Ok(Ok(Err(err))) => Err(err.into_fault()),
                    Ok(Ok(Ok(output))) => match schema::validate(role, &output) {
                        Ok(()) => Ok(output),
                        Err(msg) => Err(TaskFault::new(FaultKind::MalformedResult, msg)),
                    },
                }
            }
        };
        self.settle(id, outcome, started.elapsed())
    }

    /// Wait until another worker moves `id` out of `executing`.
    async fn wait_settled(&self, id: Uuid) -> TaskResult {
        let mut settled = self.settled.subscribe();
        loop {
            let status = self.tasks.get(&id).map(|t| t.status);
            if status != Some(TaskStatus::Executing) {
                return self.current(id, &SchedulerError::TaskNotFound(id));
            }
            // the sender lives in `self`, so this only errs during teardown
            if settled.changed().await.is_err() {
                return self.current(id, &SchedulerError::TaskNotFound(id));
            }
        }
    }

    /// `pending -> executing`, checked and written under the entry lock.
    fn begin(&self, id: Uuid) -> Result<AgentTask> {
        let mut entry = self
            .tasks
            .get_mut(&id)
            .ok_or(SchedulerError::TaskNotFound(id))?;
        let from = entry.status;
        if !from.can_transition_to(&TaskStatus::Executing) {
            return Err(SchedulerError::InvalidTransition {
                id,
                from,
                to: TaskStatus::Executing,
            });
        }
        entry.status = TaskStatus::Executing;
        debug!(task_id = %id, from = %from, to = %TaskStatus::Executing, "task transition");
        Ok(entry.clone())
    }

    /// Settle a task this worker started.
    fn settle(
        &self,
        id: Uuid,
        outcome: std::result::Result<RoleOutput, TaskFault>,
        elapsed: Duration,
    ) -> TaskResult {
        self.transition(id, TaskStatus::Executing, outcome, elapsed)
            .unwrap_or_else(|err| {
                warn!(task_id = %id, error = %err, "task transition rejected");
                self.current(id, &err)
            })
    }

    /// Move a task from exactly `from` to its terminal status, record it and
    /// wake waiters. Checked and written under the entry lock.
    fn transition(
        &self,
        id: Uuid,
        from: TaskStatus,
        outcome: std::result::Result<RoleOutput, TaskFault>,
        elapsed: Duration,
    ) -> Result<TaskResult> {
        let (to, outcome) = match outcome {
            Ok(output) => (TaskStatus::Completed, TaskOutcome::Success { output }),
            Err(fault) => {
                let to = if fault.kind.fails_task() {
                    TaskStatus::Failed
                } else {
                    TaskStatus::Completed
                };
                (to, TaskOutcome::Fault { fault })
            }
        };

        let snapshot = {
            let mut entry = self
                .tasks
                .get_mut(&id)
                .ok_or(SchedulerError::TaskNotFound(id))?;
            let current = entry.status;
            if current != from || !current.can_transition_to(&to) {
                return Err(SchedulerError::InvalidTransition {
                    id,
                    from: current,
                    to,
                });
            }
            entry.status = to;
            entry.result = Some(outcome);
            entry.completed_at = Some(Utc::now());
            debug!(task_id = %id, from = %current, to = %to, "task transition");
            entry.clone()
        };

        let success = !snapshot.result.as_ref().is_some_and(TaskOutcome::is_error);
        if let Some(fault) = snapshot.result.as_ref().and_then(TaskOutcome::fault) {
            warn!(task_id = %id, role = %snapshot.role, fault = %fault, "task degraded");
        }
        self.registry.record(snapshot.role, elapsed, success);
        self.history.append_task(&snapshot);
        self.settled.send_modify(|n| *n = n.wrapping_add(1));

        Ok(TaskResult::from_task(
            &snapshot,
            TaskFault::new(FaultKind::HandlerFailure, "missing result"),
        ))
    }

    /// Result view of a task that this worker did not run.
    fn current(&self, id: Uuid, err: &SchedulerError) -> TaskResult {
        let fault = TaskFault::new(FaultKind::HandlerFailure, err.to_string());
        match self.tasks.get(&id) {
            Some(task) => TaskResult::from_task(&task, fault),
            None => TaskResult {
                task_id: id,
                role: AgentRole::ActionExecutor,
                operation: String::new(),
                status: TaskStatus::Failed,
                outcome: TaskOutcome::Fault { fault },
                completed_at: None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
