use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reports::{RoleOutput, TaskInput};

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Seat usage for one licensed product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseUsage {
    pub total: u32,
    pub used: u32,
    pub cost_per_seat: f64,
}

impl LicenseUsage {
    pub fn new(total: u32, used: u32, cost_per_seat: f64) -> Self {
        Self {
            total,
            used,
            cost_per_seat,
        }
    }

    /// Purchased seats nobody is using.
    pub fn unused(&self) -> u32 {
        self.total.saturating_sub(self.used)
    }

    pub fn monthly_waste(&self) -> f64 {
        f64::from(self.unused()) * self.cost_per_seat
    }
}

/// A managed-services client account, as supplied by the data provider.
///
/// Margin is always derived from revenue and cost so the two can never
/// disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub monthly_revenue: f64,
    pub monthly_cost: f64,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub tickets_last_month: u32,
    #[serde(default)]
    pub security_incidents: u32,
    #[serde(default)]
    pub licenses: BTreeMap<String, LicenseUsage>,
}

impl Entity {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        monthly_revenue: f64,
        monthly_cost: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            monthly_revenue,
            monthly_cost,
            services: Vec::new(),
            tickets_last_month: 0,
            security_incidents: 0,
            licenses: BTreeMap::new(),
        }
    }

    pub fn with_license(mut self, product: impl Into<String>, usage: LicenseUsage) -> Self {
        self.licenses.insert(product.into(), usage);
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.services.push(service.into());
        self
    }

    pub fn with_tickets(mut self, tickets_last_month: u32) -> Self {
        self.tickets_last_month = tickets_last_month;
        self
    }

    pub fn with_security_incidents(mut self, incidents: u32) -> Self {
        self.security_incidents = incidents;
        self
    }

    /// Monthly revenue minus monthly cost.
    pub fn margin(&self) -> f64 {
        self.monthly_revenue - self.monthly_cost
    }

    /// Total monthly spend on seats nobody is using.
    pub fn monthly_license_waste(&self) -> f64 {
        self.licenses.values().map(LicenseUsage::monthly_waste).sum()
    }
}

// ---------------------------------------------------------------------------
// RiskTier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Negative margin is high risk, a margin under `low_margin_floor` is
    /// medium, anything else is low.
    pub fn from_margin(margin: f64, low_margin_floor: f64) -> Self {
        if margin < 0.0 {
            RiskTier::High
        } else if margin < low_margin_floor {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        };
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// AgentRole
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    ProfitabilityAnalyst,
    LicenseOptimizer,
    UpsellStrategist,
    RiskAssessor,
    ActionExecutor,
}

impl AgentRole {
    pub const ALL: [AgentRole; 5] = [
        AgentRole::ProfitabilityAnalyst,
        AgentRole::LicenseOptimizer,
        AgentRole::UpsellStrategist,
        AgentRole::RiskAssessor,
        AgentRole::ActionExecutor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::ProfitabilityAnalyst => "profitability_analyst",
            AgentRole::LicenseOptimizer => "license_optimizer",
            AgentRole::UpsellStrategist => "upsell_strategist",
            AgentRole::RiskAssessor => "risk_assessor",
            AgentRole::ActionExecutor => "action_executor",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AgentRole::ProfitabilityAnalyst => "Profitability Analyst",
            AgentRole::LicenseOptimizer => "License Optimizer",
            AgentRole::UpsellStrategist => "Upsell Strategist",
            AgentRole::RiskAssessor => "Risk Assessor",
            AgentRole::ActionExecutor => "Action Executor",
        }
    }

    /// Fixed capability list advertised by each role.
    pub fn capabilities(&self) -> &'static [&'static str] {
        match self {
            AgentRole::ProfitabilityAnalyst => {
                &["margin_analysis", "cost_optimization", "revenue_forecasting"]
            }
            AgentRole::LicenseOptimizer => &["usage_tracking", "optimization", "cost_savings"],
            AgentRole::UpsellStrategist => &[
                "opportunity_identification",
                "proposal_generation",
                "revenue_growth",
            ],
            AgentRole::RiskAssessor => {
                &["risk_scoring", "cashflow_prediction", "anomaly_detection"]
            }
            AgentRole::ActionExecutor => {
                &["autonomous_actions", "email_drafting", "quote_generation"]
            }
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Returns `true` when a transition from `self` to `target` is valid.
    ///
    /// `Pending -> Failed` covers tasks cancelled before they started.
    pub fn can_transition_to(&self, target: &TaskStatus) -> bool {
        matches!(
            (self, target),
            (TaskStatus::Pending, TaskStatus::Executing)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Executing, TaskStatus::Completed)
                | (TaskStatus::Executing, TaskStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Executing => "executing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// Task faults and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The handler reported an internal fault (or panicked).
    HandlerFailure,
    /// The batch deadline passed before the handler finished.
    Timeout,
    /// The handler does not accept this operation or input shape.
    InvalidInput,
    /// The batch was cancelled before the handler finished.
    Cancelled,
    /// The handler returned output that failed schema validation.
    MalformedResult,
}

impl FaultKind {
    /// Faults that leave the task `failed` rather than `completed`.
    ///
    /// Handler-side faults are degraded results; only the scheduler's own
    /// interventions (deadline, cancellation) fail a task.
    pub fn fails_task(&self) -> bool {
        matches!(self, FaultKind::Timeout | FaultKind::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFault {
    pub kind: FaultKind,
    pub message: String,
}

impl TaskFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// What a task produced: a typed report, or a fault carrying an error
/// indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success { output: RoleOutput },
    Fault { fault: TaskFault },
}

impl TaskOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, TaskOutcome::Fault { .. })
    }

    pub fn output(&self) -> Option<&RoleOutput> {
        match self {
            TaskOutcome::Success { output } => Some(output),
            TaskOutcome::Fault { .. } => None,
        }
    }

    pub fn fault(&self) -> Option<&TaskFault> {
        match self {
            TaskOutcome::Success { .. } => None,
            TaskOutcome::Fault { fault } => Some(fault),
        }
    }
}

// ---------------------------------------------------------------------------
// AgentTask
// ---------------------------------------------------------------------------

/// A unit of work routed to one agent role.
///
/// `priority` follows the lower-is-more-urgent convention. `result` is set
/// exactly once, when the task reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: Uuid,
    pub role: AgentRole,
    pub operation: String,
    pub input: TaskInput,
    pub priority: i32,
    pub status: TaskStatus,
    pub result: Option<TaskOutcome>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentTask {
    pub fn new(role: AgentRole, operation: impl Into<String>, input: TaskInput, priority: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            operation: operation.into(),
            input,
            priority,
            status: TaskStatus::Pending,
            result: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ActionType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    LicenseDowngrade,
    DraftNegotiationEmail,
    DraftUpsellProposal,
    CreateQuote,
    SendAlert,
    UpdateRisk,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::LicenseDowngrade => "license_downgrade",
            ActionType::DraftNegotiationEmail => "draft_negotiation_email",
            ActionType::DraftUpsellProposal => "draft_upsell_proposal",
            ActionType::CreateQuote => "create_quote",
            ActionType::SendAlert => "send_alert",
            ActionType::UpdateRisk => "update_risk",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    RequiresApproval,
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ActionStatus {
    /// Returns `true` when a transition from `self` to `target` is valid.
    ///
    /// Transitions only move forward; nothing re-enters `RequiresApproval`.
    /// `RequiresApproval -> Failed` is a human rejection.
    pub fn can_transition_to(&self, target: &ActionStatus) -> bool {
        matches!(
            (self, target),
            (ActionStatus::RequiresApproval, ActionStatus::Pending)
                | (ActionStatus::RequiresApproval, ActionStatus::Failed)
                | (ActionStatus::Pending, ActionStatus::InProgress)
                | (ActionStatus::InProgress, ActionStatus::Completed)
                | (ActionStatus::InProgress, ActionStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionStatus::Completed | ActionStatus::Failed)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionStatus::RequiresApproval => "requires_approval",
            ActionStatus::Pending => "pending",
            ActionStatus::InProgress => "in_progress",
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
