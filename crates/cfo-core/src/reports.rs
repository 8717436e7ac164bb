//! Typed handler inputs and outputs, one report struct per role.
//!
//! Handlers never exchange loosely-typed maps: a task carries a
//! [`TaskInput`] and a successful handler returns exactly one
//! [`RoleOutput`] variant, which the scheduler validates against the role
//! that produced it.

use serde::{Deserialize, Serialize};

use crate::types::{AgentRole, Entity, RiskTier};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskInput {
    /// Analyse an entity on its own.
    Entity { entity: Entity },
    /// Judge (or draft) an upsell proposal for an entity.
    ProposalReview { entity: Entity, upsell: UpsellReport },
}

impl TaskInput {
    pub fn for_entity(entity: &Entity) -> Self {
        TaskInput::Entity {
            entity: entity.clone(),
        }
    }

    pub fn entity(&self) -> &Entity {
        match self {
            TaskInput::Entity { entity } => entity,
            TaskInput::ProposalReview { entity, .. } => entity,
        }
    }
}

// ---------------------------------------------------------------------------
// Profitability
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitabilityStatus {
    Unprofitable,
    LowMargin,
    Healthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Renegotiate,
    Optimize,
    Maintain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitabilityReport {
    pub margin: f64,
    /// Margin as a percentage of revenue, one decimal place.
    pub margin_percentage: f64,
    pub status: ProfitabilityStatus,
    pub recommendation: Recommendation,
    pub severity: Severity,
}

impl ProfitabilityReport {
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

// ---------------------------------------------------------------------------
// License optimization
// ---------------------------------------------------------------------------

/// One product with unused seats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseLineItem {
    pub product: String,
    pub unused_seats: u32,
    pub cost_per_seat: f64,
    pub monthly_waste: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseReport {
    pub optimization_needed: bool,
    pub monthly_savings: f64,
    pub annual_savings: f64,
    pub optimizations: Vec<LicenseLineItem>,
    pub confidence: u8,
}

// ---------------------------------------------------------------------------
// Upsell
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsellOpportunity {
    pub service: String,
    pub monthly_value: f64,
    pub confidence: u8,
    /// The observation that suggested the opportunity.
    pub trigger: String,
}

impl UpsellOpportunity {
    pub fn annual_value(&self) -> f64 {
        self.monthly_value * 12.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpsellReport {
    pub opportunities: Vec<UpsellOpportunity>,
    pub total_potential_monthly: f64,
    pub total_potential_annual: f64,
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub tier: RiskTier,
    /// Three-month margin projection.
    pub cashflow_risk: f64,
    pub churn_probability: u8,
    pub mitigation_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRiskReport {
    pub tier: RiskTier,
    pub proceed_recommended: bool,
    pub reason: Option<String>,
    pub alternative_action: Option<String>,
}

// ---------------------------------------------------------------------------
// Action executor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalDraftSummary {
    pub total_annual_value: f64,
    pub opportunity_count: usize,
    pub draft_ready: bool,
    pub next_steps: Vec<String>,
}

// ---------------------------------------------------------------------------
// RoleOutput
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleOutput {
    Profitability(ProfitabilityReport),
    License(LicenseReport),
    Upsell(UpsellReport),
    Risk(RiskReport),
    ProposalRisk(ProposalRiskReport),
    ProposalDraft(ProposalDraftSummary),
}

impl RoleOutput {
    /// The only role allowed to produce this output.
    pub fn produced_by(&self) -> AgentRole {
        match self {
            RoleOutput::Profitability(_) => AgentRole::ProfitabilityAnalyst,
            RoleOutput::License(_) => AgentRole::LicenseOptimizer,
            RoleOutput::Upsell(_) => AgentRole::UpsellStrategist,
            RoleOutput::Risk(_) | RoleOutput::ProposalRisk(_) => AgentRole::RiskAssessor,
            RoleOutput::ProposalDraft(_) => AgentRole::ActionExecutor,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RoleOutput::Profitability(_) => "profitability",
            RoleOutput::License(_) => "license",
            RoleOutput::Upsell(_) => "upsell",
            RoleOutput::Risk(_) => "risk",
            RoleOutput::ProposalRisk(_) => "proposal_risk",
            RoleOutput::ProposalDraft(_) => "proposal_draft",
        }
    }
}
