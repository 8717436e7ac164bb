use std::sync::Arc;
use std::time::Duration;

use cfo_agents::cancel::CancelSignal;
use cfo_agents::engine::{CfoEngine, PlanStep, UpsellOutcome};
use cfo_agents::events::ActionEventKind;
use cfo_agents::guardrails::GuardrailOutcome;
use cfo_agents::registry::{HandlerError, RoleHandler};
use cfo_agents::roles;
use cfo_agents::synthesis::ActionCategory;
use cfo_core::action::{ActionPayload, ActionResult};
use cfo_core::config::Config;
use cfo_core::policy::GuardrailPolicy;
use cfo_core::provider::InMemoryEntityProvider;
use cfo_core::reports::{RoleOutput, TaskInput};
use cfo_core::types::{ActionStatus, AgentRole, FaultKind};

const CLIENTS: &str = include_str!("../../../fixtures/clients.json");

fn provider() -> Arc<InMemoryEntityProvider> {
    Arc::new(InMemoryEntityProvider::from_json_str(CLIENTS).unwrap())
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.scheduler.simulated_latency_ms = 0;
    config
}

fn engine() -> CfoEngine {
    CfoEngine::new(provider(), fast_config())
}

/// License analysis that never finishes on its own.
struct StuckLicenseOptimizer;

#[async_trait::async_trait]
impl RoleHandler for StuckLicenseOptimizer {
    fn role(&self) -> AgentRole {
        AgentRole::LicenseOptimizer
    }

    async fn handle(&self, _op: &str, input: &TaskInput) -> Result<RoleOutput, HandlerError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(RoleOutput::License(roles::identify_waste(input.entity())))
    }
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unprofitable_client_gets_every_recommendation() {
    let engine = engine();
    let analysis = engine.orchestrate_by_id("client_x").await.unwrap();

    assert_eq!(analysis.entity_name, "TechCorp Solutions");
    assert!(analysis.is_critical());
    assert!(!analysis.is_degraded());

    let categories: Vec<_> = analysis
        .recommended_actions
        .iter()
        .map(|a| a.category)
        .collect();
    assert_eq!(
        categories,
        vec![
            ActionCategory::MarginImprovement,
            ActionCategory::CostReduction,
            ActionCategory::RevenueGrowth,
        ]
    );
    assert_eq!(
        analysis.recommended_actions[1].description,
        "Optimize licenses - save $604.00/month"
    );

    // negotiation draft: 500/month of margin at stake, over the threshold
    assert_eq!(analysis.autonomous_actions.len(), 1);
    let draft = &analysis.autonomous_actions[0];
    assert!(matches!(
        draft.payload,
        ActionPayload::DraftNegotiationEmail { .. }
    ));
    assert_eq!(draft.status, ActionStatus::RequiresApproval);

    let approved = engine.approve(draft.id).await.unwrap();
    let Some(ActionResult::Draft(email)) = &approved.result else {
        panic!("expected an email draft");
    };
    assert!(email.body.contains("TechCorp Solutions"));
    assert!(email.requires_review);
}

#[tokio::test]
async fn healthy_clients_get_no_autonomous_actions() {
    let engine = engine();

    let y = engine.orchestrate_by_id("client_y").await.unwrap();
    let priorities: Vec<u8> = y.recommended_actions.iter().map(|a| a.priority).collect();
    assert_eq!(priorities, vec![2, 3]);
    assert!(y.autonomous_actions.is_empty());

    let z = engine.orchestrate_by_id("client_z").await.unwrap();
    assert_eq!(z.recommended_actions.len(), 1);
    assert_eq!(z.recommended_actions[0].category, ActionCategory::CostReduction);
    assert!(z.autonomous_actions.is_empty());

    assert!(engine.list_pending_approvals().is_empty());
    assert_eq!(engine.stats().tasks_completed, 8);
}

#[tokio::test]
async fn cancelled_orchestration_is_well_formed_and_creates_nothing() {
    let mut registry = roles::builtin_registry(&GuardrailPolicy::default(), Duration::ZERO);
    registry.replace(Arc::new(StuckLicenseOptimizer));
    let engine = CfoEngine::builder(provider())
        .config(fast_config())
        .registry(registry)
        .build();
    let entity = engine.entity("client_x").await.unwrap();

    let cancel = CancelSignal::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let analysis = engine.orchestrate_with_cancel(&entity, &cancel).await;

    assert!(analysis.findings.profitability.report().is_some());
    assert_eq!(analysis.degraded_roles, vec![AgentRole::LicenseOptimizer]);
    assert_eq!(
        analysis.findings.license.fault().unwrap().kind,
        FaultKind::Cancelled
    );
    // critical, but cancelled: no negotiation draft
    assert!(analysis.is_critical());
    assert!(analysis.autonomous_actions.is_empty());
    assert!(engine.list_pending_approvals().is_empty());
}

#[tokio::test]
async fn concurrent_orchestrations_share_one_engine() {
    let engine = Arc::new(engine());
    let handles: Vec<_> = ["client_x", "client_y", "client_z"]
        .into_iter()
        .map(|id| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.orchestrate_by_id(id).await })
        })
        .collect();

    for handle in handles {
        let analysis = handle.await.unwrap().unwrap();
        assert!(!analysis.is_degraded());
    }
    let stats = engine.stats();
    assert_eq!(stats.tasks_completed, 12);
    assert_eq!(stats.pending_approvals, 1);
}

#[tokio::test]
async fn bounded_history_and_pruned_tasks_keep_long_runs_small() {
    let mut config = fast_config();
    config.history.capacity = 6;
    let engine = CfoEngine::new(provider(), config);

    for id in ["client_x", "client_y", "client_z"] {
        engine.orchestrate_by_id(id).await.unwrap();
        assert_eq!(engine.prune_settled_tasks(), 4);
    }
    let stats = engine.stats();
    assert_eq!(stats.tasks_completed, 0);
    // 12 task snapshots and no terminal actions, capped at 6
    assert_eq!(stats.history_records, 6);
    assert_eq!(stats.pending_approvals, 1);
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upsell_workflow_parks_proposal_for_review() {
    let engine = engine();
    let outcome = engine.run_upsell_workflow("client_y").await.unwrap();

    let UpsellOutcome::ReadyForReview {
        upsell,
        proposal,
        action,
    } = outcome
    else {
        panic!("expected ReadyForReview, got {outcome:?}");
    };
    assert_eq!(upsell.opportunities.len(), 1);
    assert_eq!(upsell.opportunities[0].service, "Premium Cybersecurity");
    assert_eq!(proposal.opportunity_count, 1);
    assert_eq!(proposal.total_annual_value, 24_000.0);
    assert_eq!(action.status, ActionStatus::RequiresApproval);
    assert_eq!(engine.list_pending_approvals()[0].id, action.id);
}

#[tokio::test]
async fn upsell_workflow_without_triggers_finds_nothing() {
    let outcome = engine().run_upsell_workflow("client_z").await.unwrap();
    assert!(matches!(outcome, UpsellOutcome::NoOpportunities));
}

#[tokio::test]
async fn sweep_totals_every_client() {
    let sweep = engine().run_license_sweep().await.unwrap();
    assert_eq!(sweep.entities_scanned, 3);
    assert_eq!(sweep.needing_optimization.len(), 3);
    assert!(sweep.degraded.is_empty());
    assert_eq!(sweep.total_monthly_potential, 604.0 + 28.0 + 24.0);
    assert_eq!(sweep.total_annual_potential, 656.0 * 12.0);
}

fn downgrade_step(plan: &[PlanStep]) -> (GuardrailOutcome, f64) {
    match &plan[0] {
        PlanStep::DowngradeLicenses {
            outcome,
            estimated_monthly_savings,
            ..
        } => (*outcome, *estimated_monthly_savings),
        other => panic!("expected a downgrade step first, got {other:?}"),
    }
}

#[tokio::test]
async fn sweep_plans_each_downgrade_through_the_guardrails() {
    let policy = GuardrailPolicy {
        approval_threshold: 300.0,
        ..GuardrailPolicy::default()
    };
    let engine = CfoEngine::builder(provider())
        .config(fast_config())
        .policy(policy)
        .build();
    let sweep = engine.run_license_sweep().await.unwrap();

    let plan_of = |id: &str| {
        sweep
            .needing_optimization
            .iter()
            .find(|e| e.entity_id == id)
            .map(|e| e.plan.clone())
            .unwrap()
    };
    // negative margin: high risk tier, downgrades are restricted
    assert_eq!(downgrade_step(&plan_of("client_x")), (GuardrailOutcome::Blocked, 604.0));
    // 28/month annualizes to 336, over the 300 threshold
    assert_eq!(
        downgrade_step(&plan_of("client_y")),
        (GuardrailOutcome::RequiresApproval, 28.0)
    );
    assert_eq!(downgrade_step(&plan_of("client_z")), (GuardrailOutcome::AutoExecute, 24.0));

    for entry in &sweep.needing_optimization {
        assert_eq!(entry.plan.len(), 2);
        assert!(matches!(entry.plan[1], PlanStep::NotifyClient { .. }));
    }
    // planning only: nothing reaches the lifecycle
    assert!(engine.list_pending_approvals().is_empty());
    assert!(engine.history(10).is_empty());
}

#[tokio::test]
async fn reject_publishes_event_and_records_reason() {
    let engine = engine();
    let rx = engine.events().subscribe();
    let analysis = engine.orchestrate_by_id("client_x").await.unwrap();
    let draft = &analysis.autonomous_actions[0];

    let rejected = engine.reject(draft.id, "account manager handling").unwrap();
    assert_eq!(rejected.status, ActionStatus::Failed);
    assert_eq!(rejected.refusal_reason(), Some("account manager handling"));

    let kinds: Vec<_> = rx.try_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ActionEventKind::Created, ActionEventKind::Rejected]);
    assert_eq!(engine.history(10)[0].id, draft.id);
}
