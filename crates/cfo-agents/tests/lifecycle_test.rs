use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use cfo_agents::events::{ActionEventBus, ActionEventKind};
use cfo_agents::executor::{ActionExecutor, ExecutorError, SimulatedExecutor};
use cfo_agents::guardrails::GuardrailEvaluator;
use cfo_agents::history::HistoryLog;
use cfo_agents::lifecycle::{ActionLifecycleManager, LifecycleError};
use cfo_core::action::{ActionPayload, ActionResult, AutonomousAction};
use cfo_core::policy::GuardrailPolicy;
use cfo_core::reports::{LicenseLineItem, Severity};
use cfo_core::types::{ActionStatus, Entity};

/// Simulated executor that takes its time, so concurrent callers overlap.
struct Slow;

#[async_trait::async_trait]
impl ActionExecutor for Slow {
    async fn execute(&self, action: &AutonomousAction) -> Result<ActionResult, ExecutorError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        SimulatedExecutor::new().execute(action).await
    }
}

/// Executor with a bug: panics instead of returning an error.
struct Boom;

#[async_trait::async_trait]
impl ActionExecutor for Boom {
    async fn execute(&self, _action: &AutonomousAction) -> Result<ActionResult, ExecutorError> {
        panic!("vendor client bug");
    }
}

fn manager(executor: Arc<dyn ActionExecutor>) -> Arc<ActionLifecycleManager> {
    Arc::new(ActionLifecycleManager::new(
        GuardrailEvaluator::new(Arc::new(GuardrailPolicy::default())),
        executor,
        Arc::new(HistoryLog::new()),
        ActionEventBus::new(),
    ))
}

fn retailmax() -> Entity {
    Entity::new("client_y", "RetailMax Inc", 3500.0, 2800.0)
}

fn downgrade(waste: f64) -> ActionPayload {
    ActionPayload::LicenseDowngrade {
        optimizations: vec![LicenseLineItem {
            product: "antivirus".into(),
            unused_seats: 2,
            cost_per_seat: waste / 2.0,
            monthly_waste: waste,
        }],
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_execute_once() {
    let mgr = manager(Arc::new(Slow));
    let action = mgr.create_action(&retailmax(), downgrade(100.0)).await;
    assert_eq!(action.status, ActionStatus::RequiresApproval);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let mgr = Arc::clone(&mgr);
        let id = action.id;
        handles.push(tokio::spawn(async move { mgr.approve(id).await }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(done) => {
                wins += 1;
                assert_eq!(done.status, ActionStatus::Completed);
            }
            Err(LifecycleError::ApprovalInvalidState { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(mgr.completed_count(), 1);
    assert_eq!(mgr.history(10).len(), 1);
}

#[tokio::test]
async fn approve_then_reject_is_invalid() {
    let mgr = manager(Arc::new(SimulatedExecutor::new()));
    let action = mgr.create_action(&retailmax(), downgrade(100.0)).await;
    mgr.approve(action.id).await.unwrap();

    let err = mgr.reject(action.id, "too late").unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::ApprovalInvalidState { status: ActionStatus::Completed, .. }
    ));
}

#[tokio::test]
async fn every_terminal_action_appears_once_in_history() {
    let mgr = manager(Arc::new(SimulatedExecutor::new()));
    let healthy = Entity::new("client_z", "HealthFirst Medical", 5000.0, 3200.0);
    let unprofitable = Entity::new("client_x", "TechCorp Solutions", 1500.0, 2000.0);

    let auto = mgr.create_action(&healthy, downgrade(40.0)).await;
    let blocked = mgr.create_action(&unprofitable, downgrade(40.0)).await;
    let queued = mgr.create_action(&healthy, downgrade(400.0)).await;
    let rejected = mgr.create_action(&healthy, downgrade(500.0)).await;
    let waiting = mgr.create_action(&healthy, downgrade(600.0)).await;

    mgr.approve(queued.id).await.unwrap();
    mgr.reject(rejected.id, "renewal under negotiation").unwrap();

    let history = mgr.history(100);
    let ids: Vec<_> = history.iter().map(|r| r.id).collect();
    let unique: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
    assert_eq!(unique.len(), 4);
    for id in [auto.id, blocked.id, queued.id, rejected.id] {
        assert!(unique.contains(&id));
    }
    assert!(!unique.contains(&waiting.id));

    // newest first: the rejection was the last terminal transition
    assert_eq!(history[0].id, rejected.id);

    // snapshots match the final state and never change afterwards
    for record in &history {
        let snapshot = record.action().unwrap();
        assert!(snapshot.status.is_terminal());
        assert_eq!(mgr.get(record.id).unwrap(), *snapshot);
    }
    assert_eq!(mgr.list_pending_approvals().len(), 1);
}

#[tokio::test]
async fn draft_results_always_require_review() {
    let mgr = manager(Arc::new(SimulatedExecutor::new()));
    let healthy = Entity::new("client_z", "HealthFirst Medical", 5000.0, 3200.0);
    // 10/month annualizes under the threshold: runs without approval
    let action = mgr
        .create_action(
            &healthy,
            ActionPayload::DraftNegotiationEmail {
                entity_name: healthy.name.clone(),
                margin: 10.0,
                monthly_revenue: healthy.monthly_revenue,
            },
        )
        .await;
    assert_eq!(action.status, ActionStatus::Completed);
    let Some(ActionResult::Draft(draft)) = &action.result else {
        panic!("expected a draft");
    };
    assert!(draft.requires_review);
}

#[tokio::test]
async fn blocked_and_failed_actions_publish_events() {
    let mgr = manager(Arc::new(SimulatedExecutor::new()));
    let rx = mgr.events().subscribe();
    let unprofitable = Entity::new("client_x", "TechCorp Solutions", 1500.0, 2000.0);

    mgr.create_action(&unprofitable, downgrade(40.0)).await;
    let upsell = mgr
        .create_action(
            &unprofitable,
            ActionPayload::DraftUpsellProposal {
                entity_name: unprofitable.name.clone(),
                opportunities: vec![],
            },
        )
        .await;
    // no opportunities: zero impact, auto-executes, executor refuses
    assert_eq!(upsell.status, ActionStatus::Failed);

    let kinds: Vec<_> = rx.try_iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ActionEventKind::Blocked,
            ActionEventKind::Created,
            ActionEventKind::Failed
        ]
    );
}

#[tokio::test]
async fn panicking_executor_leaves_a_failed_action() {
    let mgr = manager(Arc::new(Boom));
    let healthy = Entity::new("client_z", "HealthFirst Medical", 5000.0, 3200.0);

    let alert = mgr
        .create_action(
            &healthy,
            ActionPayload::SendAlert {
                severity: Severity::Normal,
                message: "renewal in 30 days".into(),
            },
        )
        .await;
    assert_eq!(alert.status, ActionStatus::Failed);
    let Some(ActionResult::Error { message }) = &alert.result else {
        panic!("expected an error result, got {:?}", alert.result);
    };
    assert!(message.contains("executor aborted"));
    assert_eq!(mgr.get(alert.id).unwrap().status, ActionStatus::Failed);

    // an approved action takes the same path
    let queued = mgr.create_action(&healthy, downgrade(400.0)).await;
    assert_eq!(queued.status, ActionStatus::RequiresApproval);
    let approved = mgr.approve(queued.id).await.unwrap();
    assert_eq!(approved.status, ActionStatus::Failed);

    let history = mgr.history(10);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, queued.id);
    assert_eq!(history[1].id, alert.id);
    assert!(mgr.list_pending_approvals().is_empty());
}
