use std::sync::Arc;

use cfo_agents::engine::{CfoEngine, DowngradeOutcome};
use cfo_agents::events::ActionEventBus;
use cfo_agents::executor::SimulatedExecutor;
use cfo_agents::guardrails::GuardrailEvaluator;
use cfo_agents::history::HistoryLog;
use cfo_agents::lifecycle::{ActionLifecycleManager, LifecycleError};
use cfo_core::action::{ActionPayload, ActionResult, AutonomousAction};
use cfo_core::config::Config;
use cfo_core::policy::GuardrailPolicy;
use cfo_core::provider::InMemoryEntityProvider;
use cfo_core::reports::LicenseLineItem;
use cfo_core::types::{ActionStatus, Entity, LicenseUsage};

fn manager() -> ActionLifecycleManager {
    ActionLifecycleManager::new(
        GuardrailEvaluator::new(Arc::new(GuardrailPolicy::default())),
        Arc::new(SimulatedExecutor::new()),
        Arc::new(HistoryLog::new()),
        ActionEventBus::new(),
    )
}

/// An entity with the given margin and exactly `waste` of monthly license
/// waste (10 unused seats).
fn entity_with(id: &str, margin: f64, waste: f64) -> Entity {
    Entity::new(id, id.to_uppercase(), 4000.0 + margin, 4000.0)
        .with_license("microsoft_365", LicenseUsage::new(20, 10, waste / 10.0))
}

fn downgrade_payload(waste: f64) -> ActionPayload {
    ActionPayload::LicenseDowngrade {
        optimizations: vec![LicenseLineItem {
            product: "microsoft_365".into(),
            unused_seats: 10,
            cost_per_seat: waste / 10.0,
            monthly_waste: waste,
        }],
    }
}

fn savings(action: &AutonomousAction) -> f64 {
    match &action.result {
        Some(ActionResult::LicenseDowngrade(receipt)) => receipt.total_monthly_savings,
        other => panic!("expected downgrade receipt, got {other:?}"),
    }
}

fn engine_for(entities: Vec<Entity>) -> CfoEngine {
    let provider = InMemoryEntityProvider::from_entities(entities).unwrap();
    let mut config = Config::default();
    config.scheduler.simulated_latency_ms = 0;
    CfoEngine::new(Arc::new(provider), config)
}

#[tokio::test]
async fn scenario_a_negative_margin_blocks_downgrade() {
    let engine = engine_for(vec![entity_with("client_a", -500.0, 200.0)]);
    let outcome = engine.auto_downgrade_licenses("client_a").await.unwrap();

    let DowngradeOutcome::Submitted { action } = outcome else {
        panic!("expected a submitted action, got {outcome:?}");
    };
    assert_eq!(action.status, ActionStatus::Failed);
    assert!(action.refusal_reason().unwrap().contains("manual review"));
    assert!(engine.list_pending_approvals().is_empty());
    assert_eq!(engine.history(10).len(), 1);
}

#[tokio::test]
async fn scenario_b_large_impact_waits_for_approval() {
    let engine = engine_for(vec![entity_with("client_b", 700.0, 100.0)]);
    let DowngradeOutcome::Submitted { action } =
        engine.auto_downgrade_licenses("client_b").await.unwrap()
    else {
        panic!("expected a submitted action");
    };
    assert_eq!(action.status, ActionStatus::RequiresApproval);
    assert!(action.requires_approval);

    let pending = engine.list_pending_approvals();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, action.id);
    assert!(engine.history(10).is_empty());

    let approved = engine.approve(action.id).await.unwrap();
    assert_eq!(approved.status, ActionStatus::Completed);
    assert_eq!(savings(&approved), 100.0);
    assert!(approved.completed_at.is_some());
    assert!(engine.list_pending_approvals().is_empty());
}

#[tokio::test]
async fn scenario_c_small_impact_executes_immediately() {
    let engine = engine_for(vec![entity_with("client_c", 1800.0, 50.0)]);
    let DowngradeOutcome::Submitted { action } =
        engine.auto_downgrade_licenses("client_c").await.unwrap()
    else {
        panic!("expected a submitted action");
    };
    assert_eq!(action.status, ActionStatus::Completed);
    assert!(!action.requires_approval);
    assert_eq!(savings(&action), 50.0);
    assert!(engine.list_pending_approvals().is_empty());
}

#[tokio::test]
async fn negative_margin_always_blocks_downgrade() {
    let mgr = manager();
    for margin in [-0.01, -1.0, -500.0, -25_000.0] {
        for waste in [0.5, 50.0, 100.0, 10_000.0] {
            let entity = entity_with("neg", margin, waste);
            let action = mgr.create_action(&entity, downgrade_payload(waste)).await;
            assert_eq!(action.status, ActionStatus::Failed, "margin {margin} waste {waste}");
            assert!(matches!(action.result, Some(ActionResult::Blocked { .. })));
        }
    }
    assert!(mgr.list_pending_approvals().is_empty());
}

#[tokio::test]
async fn non_negative_margin_splits_on_threshold() {
    let mgr = manager();
    for margin in [0.0, 250.0, 700.0, 1800.0] {
        // 1000 / 12 = 83.33.. per month is the boundary
        let above = mgr
            .create_action(&entity_with("pos", margin, 90.0), downgrade_payload(90.0))
            .await;
        assert_eq!(above.status, ActionStatus::RequiresApproval, "margin {margin}");

        let below = mgr
            .create_action(&entity_with("pos", margin, 80.0), downgrade_payload(80.0))
            .await;
        assert_eq!(below.status, ActionStatus::Completed, "margin {margin}");
        assert_eq!(savings(&below), 80.0);
    }
}

#[tokio::test]
async fn approve_on_non_queued_action_never_mutates_it() {
    let mgr = manager();
    let done = mgr
        .create_action(&entity_with("c", 1800.0, 50.0), downgrade_payload(50.0))
        .await;
    let blocked = mgr
        .create_action(&entity_with("a", -500.0, 200.0), downgrade_payload(200.0))
        .await;

    for action in [&done, &blocked] {
        let err = mgr.approve(action.id).await.unwrap_err();
        assert!(
            matches!(err, LifecycleError::ApprovalInvalidState { status, .. } if status == action.status)
        );
        assert_eq!(mgr.get(action.id).unwrap(), *action);
    }
}

#[tokio::test]
async fn always_approve_list_parks_small_actions() {
    let policy = GuardrailPolicy {
        always_require_approval: vec![cfo_core::types::ActionType::LicenseDowngrade],
        ..GuardrailPolicy::default()
    };
    let provider = InMemoryEntityProvider::from_entities(vec![entity_with("c", 1800.0, 10.0)]).unwrap();
    let engine = CfoEngine::builder(Arc::new(provider)).policy(policy).build();

    let DowngradeOutcome::Submitted { action } = engine.auto_downgrade_licenses("c").await.unwrap()
    else {
        panic!("expected a submitted action");
    };
    assert_eq!(action.status, ActionStatus::RequiresApproval);
}
