//! `CfoEngine`: the context object every operation runs against.
//!
//! It owns the task table (via the scheduler), the action table (via the
//! lifecycle manager), the history log and the guardrail policy. Separate
//! engines share nothing, so tests build as many as they like.
//!
//! Entry points:
//! - [`CfoEngine::orchestrate`]: fan out the four analyses, join, synthesize,
//!   and raise a negotiation draft when profitability is critical
//! - [`CfoEngine::auto_downgrade_licenses`]: license analysis straight into a
//!   guarded downgrade action
//! - [`CfoEngine::run_upsell_workflow`]: upsell, proposal risk, proposal draft
//! - [`CfoEngine::run_license_sweep`]: license analysis across every entity

use std::sync::Arc;

use cfo_core::action::{ActionPayload, AutonomousAction};
use cfo_core::config::Config;
use cfo_core::policy::GuardrailPolicy;
use cfo_core::provider::{EntityProvider, ProviderError};
use cfo_core::reports::{
    LicenseLineItem, ProposalDraftSummary, RoleOutput, TaskInput, UpsellReport,
};
use cfo_core::types::{ActionType, AgentRole, AgentTask, Entity, FaultKind, TaskFault};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cancel::CancelSignal;
use crate::events::ActionEventBus;
use crate::executor::{ActionExecutor, SimulatedExecutor};
use crate::guardrails::{GuardrailEvaluator, GuardrailOutcome};
use crate::history::{HistoryLog, HistoryRecord};
use crate::lifecycle::{ActionLifecycleManager, LifecycleError};
use crate::registry::{AgentDescriptor, AgentRegistry};
use crate::roles::{self, ops};
use crate::scheduler::{SchedulerError, TaskResult, TaskScheduler};
use crate::synthesis::{self, AgentFindings, SynthesizedAnalysis};

/// Task priorities for one analysis batch (lower runs first in any queue).
pub mod priority {
    pub const PROFITABILITY: i32 = 1;
    pub const RISK: i32 = 2;
    pub const LICENSE: i32 = 3;
    pub const UPSELL: i32 = 4;
    pub const PROPOSAL: i32 = 5;
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

// ---------------------------------------------------------------------------
// Workflow outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DowngradeOutcome {
    /// Every purchased seat is in use.
    NoWaste,
    /// The license analysis itself faulted.
    Degraded { fault: TaskFault },
    /// A downgrade action was created; its status says what the guardrails
    /// decided.
    Submitted { action: AutonomousAction },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpsellOutcome {
    NoOpportunities,
    NotRecommended {
        reason: String,
        alternative_action: Option<String>,
    },
    Degraded {
        role: AgentRole,
        fault: TaskFault,
    },
    ReadyForReview {
        upsell: UpsellReport,
        proposal: ProposalDraftSummary,
        action: AutonomousAction,
    },
}

/// One step of the follow-up plan attached to a sweep entry. The sweep
/// only plans; nothing is submitted to the lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PlanStep {
    /// Remove the unused seats. `outcome` is what the guardrails would
    /// decide for the downgrade right now.
    DowngradeLicenses {
        outcome: GuardrailOutcome,
        reason: String,
        estimated_monthly_savings: f64,
    },
    /// Tell the client about the change once it is made.
    NotifyClient { template: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepEntry {
    pub entity_id: String,
    pub entity_name: String,
    pub monthly_savings: f64,
    pub annual_savings: f64,
    pub optimizations: Vec<LicenseLineItem>,
    pub plan: Vec<PlanStep>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LicenseSweep {
    pub entities_scanned: usize,
    /// Entities with at least one unused seat.
    pub needing_optimization: Vec<SweepEntry>,
    pub total_monthly_potential: f64,
    pub total_annual_potential: f64,
    /// Entities whose analysis faulted.
    pub degraded: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub agents_registered: usize,
    pub tasks_completed: usize,
    pub pending_approvals: usize,
    pub actions_completed: usize,
    pub history_records: usize,
    pub agents: Vec<AgentDescriptor>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct CfoEngineBuilder {
    provider: Arc<dyn EntityProvider>,
    config: Config,
    registry: Option<AgentRegistry>,
    executor: Option<Arc<dyn ActionExecutor>>,
    events: Option<ActionEventBus>,
}

impl CfoEngineBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn policy(mut self, policy: GuardrailPolicy) -> Self {
        self.config.guardrails = policy;
        self
    }

    /// Use this registry instead of the built-in handlers.
    pub fn registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn events(mut self, events: ActionEventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> CfoEngine {
        let config = self.config;
        let registry = self.registry.unwrap_or_else(|| {
            roles::builtin_registry(&config.guardrails, config.scheduler.simulated_latency())
        });
        let history = Arc::new(HistoryLog::with_capacity(config.history.capacity));
        let scheduler = TaskScheduler::new(
            Arc::new(registry),
            Arc::clone(&history),
            config.scheduler.batch_deadline(),
        );
        let lifecycle = ActionLifecycleManager::new(
            GuardrailEvaluator::new(Arc::new(config.guardrails.clone())),
            self.executor
                .unwrap_or_else(|| Arc::new(SimulatedExecutor::new())),
            Arc::clone(&history),
            self.events.unwrap_or_default(),
        );
        CfoEngine {
            config,
            provider: self.provider,
            scheduler,
            lifecycle,
            history,
        }
    }
}

// ---------------------------------------------------------------------------
// CfoEngine
// ---------------------------------------------------------------------------

pub struct CfoEngine {
    config: Config,
    provider: Arc<dyn EntityProvider>,
    scheduler: TaskScheduler,
    lifecycle: ActionLifecycleManager,
    history: Arc<HistoryLog>,
}

impl CfoEngine {
    pub fn builder(provider: Arc<dyn EntityProvider>) -> CfoEngineBuilder {
        CfoEngineBuilder {
            provider,
            config: Config::default(),
            registry: None,
            executor: None,
            events: None,
        }
    }

    /// Engine with built-in handlers and the simulated executor.
    pub fn new(provider: Arc<dyn EntityProvider>, config: Config) -> Self {
        Self::builder(provider).config(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn lifecycle(&self) -> &ActionLifecycleManager {
        &self.lifecycle
    }

    pub fn events(&self) -> &ActionEventBus {
        self.lifecycle.events()
    }

    /// Resolve an entity through the provider.
    pub async fn entity(&self, id: &str) -> Result<Entity> {
        self.provider
            .get(id)
            .await?
            .ok_or_else(|| EngineError::EntityNotFound(id.to_string()))
    }

    // -- orchestration -------------------------------------------------------

    pub async fn orchestrate(&self, entity: &Entity) -> SynthesizedAnalysis {
        self.orchestrate_with_cancel(entity, &CancelSignal::new())
            .await
    }

    pub async fn orchestrate_by_id(&self, entity_id: &str) -> Result<SynthesizedAnalysis> {
        let entity = self.entity(entity_id).await?;
        Ok(self.orchestrate(&entity).await)
    }

    /// Full analysis of one entity. Cancellation degrades the affected roles
    /// and suppresses action creation; it never surfaces as an error.
    pub async fn orchestrate_with_cancel(
        &self,
        entity: &Entity,
        cancel: &CancelSignal,
    ) -> SynthesizedAnalysis {
        info!(entity_id = %entity.id, entity_name = %entity.name, "orchestration started");

        let tasks = self.analysis_tasks(entity);
        let results = self.scheduler.run_batch_with_cancel(tasks, cancel).await;
        let findings = AgentFindings::from_results(&results);
        let mut analysis = synthesis::synthesize(entity, findings);

        if cancel.is_cancelled() {
            warn!(
                entity_id = %entity.id,
                degraded = analysis.degraded_roles.len(),
                "orchestration cancelled; no actions created"
            );
        } else if let Some(report) = analysis
            .findings
            .profitability
            .report()
            .filter(|r| r.is_critical())
        {
            let payload = ActionPayload::DraftNegotiationEmail {
                entity_name: entity.name.clone(),
                margin: report.margin,
                monthly_revenue: entity.monthly_revenue,
            };
            let action = self.lifecycle.create_action(entity, payload).await;
            analysis.autonomous_actions.push(action);
        }

        info!(
            entity_id = %entity.id,
            recommendations = analysis.recommended_actions.len(),
            actions = analysis.autonomous_actions.len(),
            degraded = analysis.degraded_roles.len(),
            "orchestration complete"
        );
        analysis
    }

    /// One task per analysis role, in the order synthesis reads them.
    fn analysis_tasks(&self, entity: &Entity) -> Vec<AgentTask> {
        let input = TaskInput::for_entity(entity);
        [
            (
                AgentRole::ProfitabilityAnalyst,
                ops::ANALYZE_MARGIN,
                priority::PROFITABILITY,
            ),
            (
                AgentRole::LicenseOptimizer,
                ops::IDENTIFY_WASTE,
                priority::LICENSE,
            ),
            (
                AgentRole::UpsellStrategist,
                ops::FIND_OPPORTUNITIES,
                priority::UPSELL,
            ),
            (AgentRole::RiskAssessor, ops::ASSESS_RISKS, priority::RISK),
        ]
        .into_iter()
        .map(|(role, op, prio)| self.scheduler.submit(role, op, input.clone(), prio))
        .collect()
    }

    async fn run_single(
        &self,
        role: AgentRole,
        operation: &str,
        input: TaskInput,
        priority: i32,
    ) -> Result<TaskResult> {
        let task = self.scheduler.submit(role, operation, input, priority);
        Ok(self.scheduler.run_one(task).await?)
    }

    // -- actions -------------------------------------------------------------

    pub async fn create_action_for(
        &self,
        entity_id: &str,
        payload: ActionPayload,
    ) -> Result<AutonomousAction> {
        let entity = self.entity(entity_id).await?;
        Ok(self.lifecycle.create_action(&entity, payload).await)
    }

    pub async fn approve(&self, action_id: Uuid) -> Result<AutonomousAction> {
        Ok(self.lifecycle.approve(action_id).await?)
    }

    pub fn reject(&self, action_id: Uuid, reason: impl Into<String>) -> Result<AutonomousAction> {
        Ok(self.lifecycle.reject(action_id, reason)?)
    }

    pub fn list_pending_approvals(&self) -> Vec<AutonomousAction> {
        self.lifecycle.list_pending_approvals()
    }

    pub fn history(&self, limit: usize) -> Vec<HistoryRecord> {
        self.lifecycle.history(limit)
    }

    pub fn task(&self, id: Uuid) -> Option<AgentTask> {
        self.scheduler.task(id)
    }

    /// Forget finished analysis tasks; long-lived engines call this between
    /// runs to keep the task table small.
    pub fn prune_settled_tasks(&self) -> usize {
        self.scheduler.prune_settled()
    }

    pub fn stats(&self) -> EngineStats {
        let registry = self.scheduler.registry();
        EngineStats {
            agents_registered: registry.len(),
            tasks_completed: self.scheduler.completed_count(),
            pending_approvals: self.lifecycle.pending_count(),
            actions_completed: self.lifecycle.completed_count(),
            history_records: self.history.len(),
            agents: registry.descriptors(),
        }
    }

    // -- workflows -----------------------------------------------------------

    /// License analysis followed by a guarded downgrade of every unused seat.
    pub async fn auto_downgrade_licenses(&self, entity_id: &str) -> Result<DowngradeOutcome> {
        let entity = self.entity(entity_id).await?;
        let result = self
            .run_single(
                AgentRole::LicenseOptimizer,
                ops::IDENTIFY_WASTE,
                TaskInput::for_entity(&entity),
                priority::LICENSE,
            )
            .await?;

        let report = match result.output() {
            Some(RoleOutput::License(report)) => report,
            _ => {
                return Ok(DowngradeOutcome::Degraded {
                    fault: fault_of(&result),
                })
            }
        };
        if !report.optimization_needed {
            info!(entity_id = %entity.id, "no unused licenses");
            return Ok(DowngradeOutcome::NoWaste);
        }

        let payload = ActionPayload::LicenseDowngrade {
            optimizations: report.optimizations.clone(),
        };
        let action = self.lifecycle.create_action(&entity, payload).await;
        Ok(DowngradeOutcome::Submitted { action })
    }

    /// Upsell analysis, proposal risk check, and a proposal draft action.
    /// Runs sequentially: each step needs the previous step's report.
    pub async fn run_upsell_workflow(&self, entity_id: &str) -> Result<UpsellOutcome> {
        let entity = self.entity(entity_id).await?;

        let result = self
            .run_single(
                AgentRole::UpsellStrategist,
                ops::FIND_OPPORTUNITIES,
                TaskInput::for_entity(&entity),
                priority::UPSELL,
            )
            .await?;
        let upsell = match result.output() {
            Some(RoleOutput::Upsell(report)) => report.clone(),
            _ => return Ok(degraded_step(&result)),
        };
        if upsell.opportunities.is_empty() {
            return Ok(UpsellOutcome::NoOpportunities);
        }

        let review = TaskInput::ProposalReview {
            entity: entity.clone(),
            upsell: upsell.clone(),
        };
        let result = self
            .run_single(
                AgentRole::RiskAssessor,
                ops::ASSESS_PROPOSAL_RISK,
                review.clone(),
                priority::RISK,
            )
            .await?;
        let risk = match result.output() {
            Some(RoleOutput::ProposalRisk(report)) => report.clone(),
            _ => return Ok(degraded_step(&result)),
        };
        if !risk.proceed_recommended {
            info!(entity_id = %entity.id, tier = %risk.tier, "upsell not recommended");
            return Ok(UpsellOutcome::NotRecommended {
                reason: risk
                    .reason
                    .unwrap_or_else(|| format!("{} risk tier", risk.tier)),
                alternative_action: risk.alternative_action,
            });
        }

        let result = self
            .run_single(
                AgentRole::ActionExecutor,
                ops::GENERATE_PROPOSAL,
                review,
                priority::PROPOSAL,
            )
            .await?;
        let proposal = match result.output() {
            Some(RoleOutput::ProposalDraft(summary)) => summary.clone(),
            _ => return Ok(degraded_step(&result)),
        };

        let payload = ActionPayload::DraftUpsellProposal {
            entity_name: entity.name.clone(),
            opportunities: upsell.opportunities.clone(),
        };
        let action = self.lifecycle.create_action(&entity, payload).await;
        Ok(UpsellOutcome::ReadyForReview {
            upsell,
            proposal,
            action,
        })
    }

    /// License analysis for every entity the provider knows, as one batch.
    pub async fn run_license_sweep(&self) -> Result<LicenseSweep> {
        let entities = self.provider.list().await?;
        let tasks: Vec<AgentTask> = entities
            .iter()
            .map(|entity| {
                self.scheduler.submit(
                    AgentRole::LicenseOptimizer,
                    ops::IDENTIFY_WASTE,
                    TaskInput::for_entity(entity),
                    priority::LICENSE,
                )
            })
            .collect();
        let results = self.scheduler.run_batch(tasks).await;

        let mut sweep = LicenseSweep {
            entities_scanned: entities.len(),
            ..LicenseSweep::default()
        };
        for (entity, result) in entities.iter().zip(&results) {
            match result.output() {
                Some(RoleOutput::License(report)) => {
                    if report.optimization_needed {
                        sweep.total_monthly_potential += report.monthly_savings;
                        sweep.needing_optimization.push(SweepEntry {
                            entity_id: entity.id.clone(),
                            entity_name: entity.name.clone(),
                            monthly_savings: report.monthly_savings,
                            annual_savings: report.annual_savings,
                            optimizations: report.optimizations.clone(),
                            plan: self.optimization_plan(entity, report.monthly_savings),
                        });
                    }
                }
                _ => sweep.degraded.push(entity.id.clone()),
            }
        }
        sweep.total_annual_potential = sweep.total_monthly_potential * 12.0;

        info!(
            scanned = sweep.entities_scanned,
            needing_optimization = sweep.needing_optimization.len(),
            total_annual_potential = sweep.total_annual_potential,
            "license sweep complete"
        );
        Ok(sweep)
    }

    fn optimization_plan(&self, entity: &Entity, monthly_savings: f64) -> Vec<PlanStep> {
        let decision = self.lifecycle.evaluator().evaluate(
            entity,
            ActionType::LicenseDowngrade,
            monthly_savings,
        );
        vec![
            PlanStep::DowngradeLicenses {
                outcome: decision.outcome,
                reason: decision.reason,
                estimated_monthly_savings: monthly_savings,
            },
            PlanStep::NotifyClient {
                template: "license_optimization_notification".to_string(),
            },
        ]
    }
}

impl std::fmt::Debug for CfoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CfoEngine")
            .field("scheduler", &self.scheduler)
            .field("lifecycle", &self.lifecycle)
            .field("history", &self.history)
            .finish()
    }
}

fn fault_of(result: &TaskResult) -> TaskFault {
    match result.fault() {
        Some(fault) => fault.clone(),
        None => TaskFault::new(
            FaultKind::MalformedResult,
            format!("unexpected output from {}", result.role),
        ),
    }
}

fn degraded_step(result: &TaskResult) -> UpsellOutcome {
    let fault = fault_of(result);
    warn!(role = %result.role, fault = %fault, "upsell workflow step degraded");
    UpsellOutcome::Degraded {
        role: result.role,
        fault,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
