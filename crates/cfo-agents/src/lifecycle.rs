use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cfo_core::action::{ActionPayload, ActionResult, AutonomousAction};
use cfo_core::types::{ActionStatus, Entity};
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::events::{ActionEvent, ActionEventBus, ActionEventKind};
use crate::executor::ActionExecutor;
use crate::guardrails::{GuardrailEvaluator, GuardrailOutcome};
use crate::history::{HistoryLog, HistoryRecord};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors surfaced to callers of the lifecycle manager.
///
/// Guardrail blocks and executor failures are not errors: they end as
/// `failed` actions with a reason in their result.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// No action with this id exists.
    #[error("action not found: {0}")]
    NotFound(Uuid),

    /// Approve or reject was called on an action that is not waiting for
    /// approval. The action is left untouched.
    #[error("action {id} is not awaiting approval (status: {status})")]
    ApprovalInvalidState { id: Uuid, status: ActionStatus },

    /// A status write lost the check-and-set: the action was not in the
    /// expected predecessor status.
    #[error("invalid action transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: ActionStatus,
        to: ActionStatus,
    },
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

// ---------------------------------------------------------------------------
// ActionLifecycleManager
// ---------------------------------------------------------------------------

struct Slot {
    /// Creation order, used for queue and listing order.
    seq: u64,
    action: AutonomousAction,
}

/// Canonical owner of every autonomous action from creation to a terminal
/// status.
///
/// Every status write goes through [`transition`](Self::transition), which
/// checks the current status and writes the new one under the same entry
/// lock, so two callers approving the same id cannot both win.
pub struct ActionLifecycleManager {
    evaluator: GuardrailEvaluator,
    executor: Arc<dyn ActionExecutor>,
    actions: DashMap<Uuid, Slot>,
    seq: AtomicU64,
    history: Arc<HistoryLog>,
    events: ActionEventBus,
}

impl ActionLifecycleManager {
    pub fn new(
        evaluator: GuardrailEvaluator,
        executor: Arc<dyn ActionExecutor>,
        history: Arc<HistoryLog>,
        events: ActionEventBus,
    ) -> Self {
        Self {
            evaluator,
            executor,
            actions: DashMap::new(),
            seq: AtomicU64::new(0),
            history,
            events,
        }
    }

    pub fn evaluator(&self) -> &GuardrailEvaluator {
        &self.evaluator
    }

    pub fn events(&self) -> &ActionEventBus {
        &self.events
    }

    /// Create an action for `entity`, classify it once, and act on the
    /// decision: record a block, park it for approval, or run it now.
    pub async fn create_action(&self, entity: &Entity, payload: ActionPayload) -> AutonomousAction {
        let action_type = payload.action_type();
        let impact = payload.estimated_monthly_impact();
        let decision = self.evaluator.evaluate(entity, action_type, impact);

        match decision.outcome {
            GuardrailOutcome::Blocked => {
                let mut action = AutonomousAction::new(&entity.id, payload, ActionStatus::Failed);
                action.result = Some(ActionResult::Blocked {
                    reason: decision.reason.clone(),
                });
                action.completed_at = Some(Utc::now());
                warn!(
                    action_id = %action.id,
                    entity_id = %entity.id,
                    action_type = %action_type,
                    tier = %decision.tier,
                    reason = %decision.reason,
                    "action blocked by guardrails"
                );
                self.insert(action.clone());
                self.history.append_action(&action);
                self.publish(ActionEventKind::Blocked, &action);
                action
            }
            GuardrailOutcome::RequiresApproval => {
                let action =
                    AutonomousAction::new(&entity.id, payload, ActionStatus::RequiresApproval);
                info!(
                    action_id = %action.id,
                    entity_id = %entity.id,
                    action_type = %action_type,
                    reason = %decision.reason,
                    "action awaiting approval"
                );
                self.insert(action.clone());
                self.publish(ActionEventKind::Created, &action);
                action
            }
            GuardrailOutcome::AutoExecute => {
                let action = AutonomousAction::new(&entity.id, payload, ActionStatus::Pending);
                let id = action.id;
                info!(
                    action_id = %id,
                    entity_id = %entity.id,
                    action_type = %action_type,
                    "action cleared for autonomous execution"
                );
                self.insert(action.clone());
                self.publish(ActionEventKind::Created, &action);
                match self.run(id).await {
                    Ok(done) => done,
                    Err(err) => {
                        warn!(action_id = %id, error = %err, "autonomous execution did not start");
                        self.get(id).unwrap_or(action)
                    }
                }
            }
        }
    }

    /// `requires_approval -> pending`, then execute.
    pub async fn approve(&self, id: Uuid) -> Result<AutonomousAction> {
        let approved = self
            .transition(id, ActionStatus::RequiresApproval, ActionStatus::Pending, |_| {})
            .map_err(approval_error)?;
        info!(action_id = %id, entity_id = %approved.entity_id, "action approved");
        self.publish(ActionEventKind::Approved, &approved);
        self.run(id).await
    }

    /// `requires_approval -> failed`, recording the reviewer's reason.
    pub fn reject(&self, id: Uuid, reason: impl Into<String>) -> Result<AutonomousAction> {
        let reason = reason.into();
        let rejected = self
            .transition(id, ActionStatus::RequiresApproval, ActionStatus::Failed, |action| {
                action.result = Some(ActionResult::Rejected { reason });
                action.completed_at = Some(Utc::now());
            })
            .map_err(approval_error)?;
        info!(action_id = %id, entity_id = %rejected.entity_id, "action rejected");
        self.history.append_action(&rejected);
        self.publish(ActionEventKind::Rejected, &rejected);
        Ok(rejected)
    }

    /// Actions waiting for a human, in creation order.
    pub fn list_pending_approvals(&self) -> Vec<AutonomousAction> {
        self.ordered(|action| action.status == ActionStatus::RequiresApproval)
    }

    /// Every action, in creation order.
    pub fn list_all(&self) -> Vec<AutonomousAction> {
        self.ordered(|_| true)
    }

    pub fn get(&self, id: Uuid) -> Option<AutonomousAction> {
        self.actions.get(&id).map(|slot| slot.action.clone())
    }

    /// Most recent terminal actions, newest first.
    pub fn history(&self, limit: usize) -> Vec<HistoryRecord> {
        self.history.actions(limit)
    }

    pub fn completed_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|slot| slot.action.status == ActionStatus::Completed)
            .count()
    }

    pub fn pending_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|slot| slot.action.status == ActionStatus::RequiresApproval)
            .count()
    }

    // -- internals ----------------------------------------------------------

    fn insert(&self, action: AutonomousAction) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.actions.insert(action.id, Slot { seq, action });
    }

    fn ordered(&self, keep: impl Fn(&AutonomousAction) -> bool) -> Vec<AutonomousAction> {
        let mut found: Vec<(u64, AutonomousAction)> = self
            .actions
            .iter()
            .filter(|slot| keep(&slot.action))
            .map(|slot| (slot.seq, slot.action.clone()))
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, action)| action).collect()
    }

    fn publish(&self, kind: ActionEventKind, action: &AutonomousAction) {
        self.events.publish(ActionEvent::new(kind, action));
    }

    /// Atomic check-and-set on one action's status. `update` runs under the
    /// same lock, after the check succeeds.
    fn transition(
        &self,
        id: Uuid,
        from: ActionStatus,
        to: ActionStatus,
        update: impl FnOnce(&mut AutonomousAction),
    ) -> Result<AutonomousAction> {
        let mut slot = self.actions.get_mut(&id).ok_or(LifecycleError::NotFound(id))?;
        let current = slot.action.status;
        if current != from || !current.can_transition_to(&to) {
            warn!(action_id = %id, from = %current, to = %to, "action transition rejected");
            return Err(LifecycleError::InvalidTransition {
                id,
                from: current,
                to,
            });
        }
        slot.action.status = to;
        update(&mut slot.action);
        debug!(action_id = %id, from = %current, to = %to, "action transition");
        Ok(slot.action.clone())
    }

    /// `pending -> in_progress -> completed | failed`.
    async fn run(&self, id: Uuid) -> Result<AutonomousAction> {
        let running = self.transition(id, ActionStatus::Pending, ActionStatus::InProgress, |_| {})?;

        // a panicking executor still has to leave a terminal action behind
        let executor = Arc::clone(&self.executor);
        let action = running.clone();
        let joined = tokio::spawn(async move { executor.execute(&action).await }).await;

        let (to, result) = match joined {
            Ok(Ok(result)) => (ActionStatus::Completed, result),
            Ok(Err(err)) => {
                error!(action_id = %id, action_type = %running.action_type, error = %err, "action execution failed");
                (
                    ActionStatus::Failed,
                    ActionResult::Error {
                        message: err.to_string(),
                    },
                )
            }
            Err(err) => {
                error!(action_id = %id, action_type = %running.action_type, error = %err, "action executor aborted");
                (
                    ActionStatus::Failed,
                    ActionResult::Error {
                        message: format!("executor aborted: {err}"),
                    },
                )
            }
        };

        let done = self.transition(id, ActionStatus::InProgress, to, |action| {
            action.result = Some(result);
            action.completed_at = Some(Utc::now());
        })?;
        self.history.append_action(&done);
        let kind = if to == ActionStatus::Completed {
            info!(action_id = %id, action_type = %done.action_type, "action completed");
            ActionEventKind::Completed
        } else {
            ActionEventKind::Failed
        };
        self.publish(kind, &done);
        Ok(done)
    }
}

fn approval_error(err: LifecycleError) -> LifecycleError {
    match err {
        LifecycleError::InvalidTransition { id, from, .. } => {
            LifecycleError::ApprovalInvalidState { id, status: from }
        }
        other => other,
    }
}

impl std::fmt::Debug for ActionLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionLifecycleManager")
            .field("actions", &self.actions.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
