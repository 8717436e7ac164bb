//! Merge per-role findings into one prioritized recommendation list.
//!
//! Three fixed rules, applied in order, each contributing at most one item:
//! critical profitability (priority 1), license waste (priority 2), upsell
//! opportunities (priority 3). A role whose task faulted contributes nothing
//! and is listed in `degraded_roles`.

use cfo_core::action::AutonomousAction;
use cfo_core::reports::{LicenseReport, ProfitabilityReport, RiskReport, RoleOutput, UpsellReport};
use cfo_core::types::{AgentRole, Entity, FaultKind, TaskFault};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler::TaskResult;

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

/// One role's contribution: its report, or the fault that replaced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Finding<T> {
    Ready { report: T },
    Degraded { fault: TaskFault },
}

impl<T> Finding<T> {
    pub fn report(&self) -> Option<&T> {
        match self {
            Finding::Ready { report } => Some(report),
            Finding::Degraded { .. } => None,
        }
    }

    pub fn fault(&self) -> Option<&TaskFault> {
        match self {
            Finding::Ready { .. } => None,
            Finding::Degraded { fault } => Some(fault),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Finding::Degraded { .. })
    }
}

fn missing<T>(role: AgentRole) -> Finding<T> {
    Finding::Degraded {
        fault: TaskFault::new(
            FaultKind::HandlerFailure,
            format!("no {role} result in batch"),
        ),
    }
}

fn unexpected<T>(role: AgentRole, output: &RoleOutput) -> Finding<T> {
    Finding::Degraded {
        fault: TaskFault::new(
            FaultKind::MalformedResult,
            format!("{role} produced a `{}` report", output.kind()),
        ),
    }
}

/// The four analysis findings synthesis reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFindings {
    pub profitability: Finding<ProfitabilityReport>,
    pub license: Finding<LicenseReport>,
    pub upsell: Finding<UpsellReport>,
    pub risk: Finding<RiskReport>,
}

impl AgentFindings {
    /// Pick each role's finding out of a settled batch.
    pub fn from_results(results: &[TaskResult]) -> Self {
        let find = |role: AgentRole| results.iter().find(|r| r.role == role);

        let profitability = match find(AgentRole::ProfitabilityAnalyst) {
            None => missing(AgentRole::ProfitabilityAnalyst),
            Some(r) => match (r.output(), r.fault()) {
                (Some(RoleOutput::Profitability(report)), _) => Finding::Ready {
                    report: report.clone(),
                },
                (Some(other), _) => unexpected(r.role, other),
                (None, fault) => degraded(fault),
            },
        };
        let license = match find(AgentRole::LicenseOptimizer) {
            None => missing(AgentRole::LicenseOptimizer),
            Some(r) => match (r.output(), r.fault()) {
                (Some(RoleOutput::License(report)), _) => Finding::Ready {
                    report: report.clone(),
                },
                (Some(other), _) => unexpected(r.role, other),
                (None, fault) => degraded(fault),
            },
        };
        let upsell = match find(AgentRole::UpsellStrategist) {
            None => missing(AgentRole::UpsellStrategist),
            Some(r) => match (r.output(), r.fault()) {
                (Some(RoleOutput::Upsell(report)), _) => Finding::Ready {
                    report: report.clone(),
                },
                (Some(other), _) => unexpected(r.role, other),
                (None, fault) => degraded(fault),
            },
        };
        let risk = match find(AgentRole::RiskAssessor) {
            None => missing(AgentRole::RiskAssessor),
            Some(r) => match (r.output(), r.fault()) {
                (Some(RoleOutput::Risk(report)), _) => Finding::Ready {
                    report: report.clone(),
                },
                (Some(other), _) => unexpected(r.role, other),
                (None, fault) => degraded(fault),
            },
        };

        Self {
            profitability,
            license,
            upsell,
            risk,
        }
    }

    /// Roles whose finding is degraded, in role order.
    pub fn degraded_roles(&self) -> Vec<AgentRole> {
        let mut roles = Vec::new();
        if self.profitability.is_degraded() {
            roles.push(AgentRole::ProfitabilityAnalyst);
        }
        if self.license.is_degraded() {
            roles.push(AgentRole::LicenseOptimizer);
        }
        if self.upsell.is_degraded() {
            roles.push(AgentRole::UpsellStrategist);
        }
        if self.risk.is_degraded() {
            roles.push(AgentRole::RiskAssessor);
        }
        roles
    }
}

fn degraded<T>(fault: Option<&TaskFault>) -> Finding<T> {
    Finding::Degraded {
        fault: fault
            .cloned()
            .unwrap_or_else(|| TaskFault::new(FaultKind::HandlerFailure, "empty result")),
    }
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    MarginImprovement,
    CostReduction,
    RevenueGrowth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedAction {
    /// 1 is most urgent.
    pub priority: u8,
    pub category: ActionCategory,
    pub description: String,
    pub source_role: AgentRole,
}

/// Apply the fixed recommendation rules to `findings`.
pub fn recommend(findings: &AgentFindings) -> Vec<RecommendedAction> {
    let mut actions = Vec::new();

    if findings
        .profitability
        .report()
        .is_some_and(ProfitabilityReport::is_critical)
    {
        actions.push(RecommendedAction {
            priority: 1,
            category: ActionCategory::MarginImprovement,
            description: "Immediate contract renegotiation required".into(),
            source_role: AgentRole::ProfitabilityAnalyst,
        });
    }

    if let Some(license) = findings.license.report() {
        if license.monthly_savings > 0.0 {
            actions.push(RecommendedAction {
                priority: 2,
                category: ActionCategory::CostReduction,
                description: format!(
                    "Optimize licenses - save ${:.2}/month",
                    license.monthly_savings
                ),
                source_role: AgentRole::LicenseOptimizer,
            });
        }
    }

    if let Some(upsell) = findings.upsell.report() {
        if !upsell.opportunities.is_empty() {
            actions.push(RecommendedAction {
                priority: 3,
                category: ActionCategory::RevenueGrowth,
                description: format!(
                    "Present {} upsell opportunities",
                    upsell.opportunities.len()
                ),
                source_role: AgentRole::UpsellStrategist,
            });
        }
    }

    actions.sort_by_key(|a| a.priority);
    actions
}

// ---------------------------------------------------------------------------
// SynthesizedAnalysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedAnalysis {
    pub entity_id: String,
    pub entity_name: String,
    pub analyzed_at: DateTime<Utc>,
    pub findings: AgentFindings,
    pub recommended_actions: Vec<RecommendedAction>,
    pub degraded_roles: Vec<AgentRole>,
    /// Actions created because of this analysis.
    pub autonomous_actions: Vec<AutonomousAction>,
}

impl SynthesizedAnalysis {
    pub fn is_critical(&self) -> bool {
        self.findings
            .profitability
            .report()
            .is_some_and(ProfitabilityReport::is_critical)
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded_roles.is_empty()
    }
}

/// Merge settled findings for `entity`. Never reads a partial batch.
pub fn synthesize(entity: &Entity, findings: AgentFindings) -> SynthesizedAnalysis {
    let recommended_actions = recommend(&findings);
    let degraded_roles = findings.degraded_roles();
    SynthesizedAnalysis {
        entity_id: entity.id.clone(),
        entity_name: entity.name.clone(),
        analyzed_at: Utc::now(),
        findings,
        recommended_actions,
        degraded_roles,
        autonomous_actions: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
