//! Built-in handlers for the five agent roles.
//!
//! Each handler is a thin async shell around a pure analysis function, so
//! the arithmetic can be tested without a runtime. The shell adds the
//! configured simulated latency and rejects operations the role does not
//! serve.

use std::sync::Arc;
use std::time::Duration;

use cfo_core::policy::GuardrailPolicy;
use cfo_core::reports::{
    LicenseLineItem, LicenseReport, ProfitabilityReport, ProfitabilityStatus,
    ProposalDraftSummary, ProposalRiskReport, Recommendation, RiskReport, RoleOutput, Severity,
    TaskInput, UpsellOpportunity, UpsellReport,
};
use cfo_core::types::{AgentRole, Entity, RiskTier};
use tracing::debug;

use crate::registry::{AgentRegistry, HandlerError, RoleHandler};

/// Operation names understood by the built-in handlers.
pub mod ops {
    pub const ANALYZE_MARGIN: &str = "analyze_margin";
    pub const IDENTIFY_WASTE: &str = "identify_waste";
    pub const ANALYZE_USAGE: &str = "analyze_usage";
    pub const FIND_OPPORTUNITIES: &str = "find_opportunities";
    pub const IDENTIFY_OPPORTUNITIES: &str = "identify_opportunities";
    pub const ASSESS_RISKS: &str = "assess_risks";
    pub const ASSESS_PROPOSAL_RISK: &str = "assess_proposal_risk";
    pub const GENERATE_PROPOSAL: &str = "generate_proposal";
}

pub const LICENSE_CONFIDENCE: u8 = 95;
pub const SECURITY_INCIDENT_TRIGGER: u32 = 5;
pub const SUPPORT_TICKET_TRIGGER: u32 = 20;

const CYBERSECURITY_MONTHLY: f64 = 2000.0;
const ENHANCED_SUPPORT_MONTHLY: f64 = 1200.0;

/// Build a registry holding every built-in handler.
pub fn builtin_registry(policy: &GuardrailPolicy, latency: Duration) -> AgentRegistry {
    let floor = policy.low_margin_floor;
    let handlers: [Arc<dyn RoleHandler>; 5] = [
        Arc::new(ProfitabilityAnalyst::new(floor, latency)),
        Arc::new(LicenseOptimizer::new(latency)),
        Arc::new(UpsellStrategist::new(latency)),
        Arc::new(RiskAssessor::new(floor, latency)),
        Arc::new(ProposalDrafter::new(latency)),
    ];

    let mut registry = AgentRegistry::new();
    for handler in handlers {
        registry.replace(handler);
    }
    registry
}

async fn simulate_work(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

fn unknown_operation(role: AgentRole, operation: &str) -> HandlerError {
    HandlerError::InvalidInput(format!("{role} does not support operation `{operation}`"))
}

fn round_1dp(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ===========================================================================
// Pure analyses
// ===========================================================================

pub fn analyze_margin(entity: &Entity, low_margin_floor: f64) -> ProfitabilityReport {
    let margin = entity.margin();
    let margin_percentage = if entity.monthly_revenue > 0.0 {
        round_1dp(margin / entity.monthly_revenue * 100.0)
    } else {
        0.0
    };
    let (status, recommendation, severity) = if margin < 0.0 {
        (
            ProfitabilityStatus::Unprofitable,
            Recommendation::Renegotiate,
            Severity::Critical,
        )
    } else if margin < low_margin_floor {
        (
            ProfitabilityStatus::LowMargin,
            Recommendation::Optimize,
            Severity::High,
        )
    } else {
        (
            ProfitabilityStatus::Healthy,
            Recommendation::Maintain,
            Severity::Normal,
        )
    };
    ProfitabilityReport {
        margin,
        margin_percentage,
        status,
        recommendation,
        severity,
    }
}

pub fn identify_waste(entity: &Entity) -> LicenseReport {
    // BTreeMap iteration keeps line items in product order.
    let optimizations: Vec<LicenseLineItem> = entity
        .licenses
        .iter()
        .filter(|(_, usage)| usage.unused() > 0)
        .map(|(product, usage)| LicenseLineItem {
            product: product.clone(),
            unused_seats: usage.unused(),
            cost_per_seat: usage.cost_per_seat,
            monthly_waste: usage.monthly_waste(),
        })
        .collect();
    let monthly_savings: f64 = optimizations.iter().map(|o| o.monthly_waste).sum();
    LicenseReport {
        optimization_needed: monthly_savings > 0.0,
        monthly_savings,
        annual_savings: monthly_savings * 12.0,
        optimizations,
        confidence: LICENSE_CONFIDENCE,
    }
}

pub fn find_opportunities(entity: &Entity) -> UpsellReport {
    let mut opportunities = Vec::new();
    if entity.security_incidents >= SECURITY_INCIDENT_TRIGGER {
        opportunities.push(UpsellOpportunity {
            service: "Premium Cybersecurity".into(),
            monthly_value: CYBERSECURITY_MONTHLY,
            confidence: 90,
            trigger: format!("{} security incidents", entity.security_incidents),
        });
    }
    if entity.tickets_last_month > SUPPORT_TICKET_TRIGGER {
        opportunities.push(UpsellOpportunity {
            service: "Enhanced Support".into(),
            monthly_value: ENHANCED_SUPPORT_MONTHLY,
            confidence: 75,
            trigger: format!("{} tickets last month", entity.tickets_last_month),
        });
    }
    let total_potential_monthly: f64 = opportunities.iter().map(|o| o.monthly_value).sum();
    UpsellReport {
        opportunities,
        total_potential_monthly,
        total_potential_annual: total_potential_monthly * 12.0,
    }
}

pub fn assess_risks(entity: &Entity, low_margin_floor: f64) -> RiskReport {
    let margin = entity.margin();
    RiskReport {
        tier: RiskTier::from_margin(margin, low_margin_floor),
        cashflow_risk: margin * 3.0,
        churn_probability: if margin < 0.0 { 15 } else { 5 },
        mitigation_required: margin < 0.0,
    }
}

pub fn assess_proposal_risk(entity: &Entity, low_margin_floor: f64) -> ProposalRiskReport {
    let margin = entity.margin();
    let tier = RiskTier::from_margin(margin, low_margin_floor);
    if margin < 0.0 {
        ProposalRiskReport {
            tier,
            proceed_recommended: false,
            reason: Some("entity currently unprofitable - address margin first".into()),
            alternative_action: Some("renegotiate_existing_contract".into()),
        }
    } else {
        ProposalRiskReport {
            tier,
            proceed_recommended: true,
            reason: None,
            alternative_action: None,
        }
    }
}

pub fn draft_proposal(upsell: &UpsellReport) -> ProposalDraftSummary {
    ProposalDraftSummary {
        total_annual_value: upsell.total_potential_annual,
        opportunity_count: upsell.opportunities.len(),
        draft_ready: true,
        next_steps: vec!["review".into(), "customize".into(), "send_to_client".into()],
    }
}

// ===========================================================================
// ProfitabilityAnalyst
// ===========================================================================

pub struct ProfitabilityAnalyst {
    low_margin_floor: f64,
    latency: Duration,
}

impl ProfitabilityAnalyst {
    pub fn new(low_margin_floor: f64, latency: Duration) -> Self {
        Self {
            low_margin_floor,
            latency,
        }
    }
}

#[async_trait::async_trait]
impl RoleHandler for ProfitabilityAnalyst {
    fn role(&self) -> AgentRole {
        AgentRole::ProfitabilityAnalyst
    }

    async fn handle(&self, operation: &str, input: &TaskInput) -> Result<RoleOutput, HandlerError> {
        if operation != ops::ANALYZE_MARGIN {
            return Err(unknown_operation(self.role(), operation));
        }
        simulate_work(self.latency).await;
        let report = analyze_margin(input.entity(), self.low_margin_floor);
        debug!(entity_id = %input.entity().id, margin = report.margin, "margin analysed");
        Ok(RoleOutput::Profitability(report))
    }
}

// ===========================================================================
// LicenseOptimizer
// ===========================================================================

pub struct LicenseOptimizer {
    latency: Duration,
}

impl LicenseOptimizer {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait::async_trait]
impl RoleHandler for LicenseOptimizer {
    fn role(&self) -> AgentRole {
        AgentRole::LicenseOptimizer
    }

    async fn handle(&self, operation: &str, input: &TaskInput) -> Result<RoleOutput, HandlerError> {
        match operation {
            ops::IDENTIFY_WASTE | ops::ANALYZE_USAGE => {}
            other => return Err(unknown_operation(self.role(), other)),
        }
        simulate_work(self.latency).await;
        Ok(RoleOutput::License(identify_waste(input.entity())))
    }
}

// ===========================================================================
// UpsellStrategist
// ===========================================================================

pub struct UpsellStrategist {
    latency: Duration,
}

impl UpsellStrategist {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait::async_trait]
impl RoleHandler for UpsellStrategist {
    fn role(&self) -> AgentRole {
        AgentRole::UpsellStrategist
    }

    async fn handle(&self, operation: &str, input: &TaskInput) -> Result<RoleOutput, HandlerError> {
        match operation {
            ops::FIND_OPPORTUNITIES | ops::IDENTIFY_OPPORTUNITIES => {}
            other => return Err(unknown_operation(self.role(), other)),
        }
        simulate_work(self.latency).await;
        Ok(RoleOutput::Upsell(find_opportunities(input.entity())))
    }
}

// ===========================================================================
// RiskAssessor
// ===========================================================================

pub struct RiskAssessor {
    low_margin_floor: f64,
    latency: Duration,
}

impl RiskAssessor {
    pub fn new(low_margin_floor: f64, latency: Duration) -> Self {
        Self {
            low_margin_floor,
            latency,
        }
    }
}

#[async_trait::async_trait]
impl RoleHandler for RiskAssessor {
    fn role(&self) -> AgentRole {
        AgentRole::RiskAssessor
    }

    async fn handle(&self, operation: &str, input: &TaskInput) -> Result<RoleOutput, HandlerError> {
        let entity = input.entity();
        match operation {
            ops::ASSESS_RISKS => {
                simulate_work(self.latency).await;
                Ok(RoleOutput::Risk(assess_risks(entity, self.low_margin_floor)))
            }
            ops::ASSESS_PROPOSAL_RISK => {
                simulate_work(self.latency).await;
                Ok(RoleOutput::ProposalRisk(assess_proposal_risk(
                    entity,
                    self.low_margin_floor,
                )))
            }
            other => Err(unknown_operation(self.role(), other)),
        }
    }
}

// ===========================================================================
// ProposalDrafter: the action-executor role's analysis side
// ===========================================================================

pub struct ProposalDrafter {
    latency: Duration,
}

impl ProposalDrafter {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait::async_trait]
impl RoleHandler for ProposalDrafter {
    fn role(&self) -> AgentRole {
        AgentRole::ActionExecutor
    }

    async fn handle(&self, operation: &str, input: &TaskInput) -> Result<RoleOutput, HandlerError> {
        if operation != ops::GENERATE_PROPOSAL {
            return Err(unknown_operation(self.role(), operation));
        }
        let TaskInput::ProposalReview { upsell, .. } = input else {
            return Err(HandlerError::InvalidInput(
                "generate_proposal needs an upsell report".into(),
            ));
        };
        simulate_work(self.latency).await;
        Ok(RoleOutput::ProposalDraft(draft_proposal(upsell)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
