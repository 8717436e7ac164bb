use cfo_core::action::{
    ActionPayload, ActionResult, AlertRecord, AutonomousAction, DowngradeLine, DowngradeReceipt,
    DraftDocument, DraftKind, Quote, QuoteLineItem, RiskUpdateRecord,
};
use cfo_core::reports::{LicenseLineItem, UpsellOpportunity};
use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, info};

pub const QUOTE_TAX_RATE: f64 = 0.10;
pub const QUOTE_VALIDITY_DAYS: i64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("{0}")]
    MissingInput(String),
    #[error("execution failed: {0}")]
    Failed(String),
}

/// Performs an action once the guardrails (or a human) have cleared it.
///
/// Implementations talk to vendors, ticketing systems and mail relays; the
/// lifecycle manager only sees the typed result or the error.
#[async_trait::async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &AutonomousAction) -> Result<ActionResult, ExecutorError>;
}

// ---------------------------------------------------------------------------
// SimulatedExecutor
// ---------------------------------------------------------------------------

/// Executor that produces realistic results without touching any external
/// system.
#[derive(Debug, Clone, Default)]
pub struct SimulatedExecutor;

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ActionExecutor for SimulatedExecutor {
    async fn execute(&self, action: &AutonomousAction) -> Result<ActionResult, ExecutorError> {
        let result = match &action.payload {
            ActionPayload::LicenseDowngrade { optimizations } => {
                ActionResult::LicenseDowngrade(downgrade(optimizations))
            }
            ActionPayload::DraftNegotiationEmail {
                entity_name,
                margin,
                monthly_revenue,
            } => ActionResult::Draft(negotiation_email(entity_name, *margin, *monthly_revenue)),
            ActionPayload::DraftUpsellProposal {
                entity_name,
                opportunities,
            } => {
                let top = opportunities
                    .first()
                    .ok_or_else(|| ExecutorError::MissingInput("no upsell opportunities".into()))?;
                ActionResult::Draft(upsell_proposal(entity_name, top))
            }
            ActionPayload::CreateQuote {
                service_name,
                description,
                monthly_value,
            } => ActionResult::Quote(quote(
                &action.entity_id,
                service_name,
                description,
                *monthly_value,
            )?),
            ActionPayload::SendAlert { severity, message } => ActionResult::Alert(AlertRecord {
                entity_id: action.entity_id.clone(),
                severity: *severity,
                message: message.clone(),
                raised_at: Utc::now(),
            }),
            ActionPayload::UpdateRisk { previous, current } => {
                ActionResult::RiskUpdate(RiskUpdateRecord {
                    entity_id: action.entity_id.clone(),
                    previous: *previous,
                    current: *current,
                    updated_at: Utc::now(),
                })
            }
        };
        debug!(action_id = %action.id, action_type = %action.action_type, "simulated execution done");
        Ok(result)
    }
}

fn downgrade(optimizations: &[LicenseLineItem]) -> DowngradeReceipt {
    let executed_at = Utc::now();
    let downgrades: Vec<DowngradeLine> = optimizations
        .iter()
        .map(|item| DowngradeLine {
            product: item.product.clone(),
            seats_removed: item.unused_seats,
            monthly_savings: item.monthly_waste,
            vendor_confirmation: format!("CONF-{}", executed_at.timestamp_millis()),
            executed_at,
        })
        .collect();
    let total_monthly_savings: f64 = downgrades.iter().map(|d| d.monthly_savings).sum();
    info!(
        products = downgrades.len(),
        total_monthly_savings, "license downgrade applied"
    );
    DowngradeReceipt {
        downgrades,
        total_monthly_savings,
        total_annual_savings: total_monthly_savings * 12.0,
        executed_at,
    }
}

fn negotiation_email(entity_name: &str, margin: f64, monthly_revenue: f64) -> DraftDocument {
    let shortfall = margin.abs();
    let adjustment = if monthly_revenue > 0.0 {
        (shortfall / monthly_revenue * 100.0).round()
    } else {
        0.0
    };

    let body = format!(
        "Dear {entity_name} Team,\n\n\
         As part of our regular partnership review we have looked at the cost of the \
         services we deliver to you.\n\n\
         Current situation: delivery costs exceed the contract value by approximately \
         ${shortfall:.2}/month.\n\n\
         Options we would like to discuss:\n\
         1. Service optimization: align service levels with what you actually use.\n\
         2. Contract amendment: update pricing to reflect delivery costs \
         (approximately {adjustment:.0}% adjustment).\n\
         3. Enhanced services: add services with a clear return.\n\n\
         Could we schedule a short call this week to find the best path forward?\n\n\
         Best regards,\n[Your CFO Agent]\n"
    );

    DraftDocument {
        kind: DraftKind::NegotiationEmail,
        subject: format!("Service Agreement Review - {entity_name}"),
        body,
        tone: "professional_empathetic".into(),
        requires_review: true,
        suggested_actions: vec![
            "Review and personalize".into(),
            "Add specific service examples".into(),
            "Adjust pricing proposal if needed".into(),
            "Send via PSA ticket system".into(),
        ],
        generated_at: Utc::now(),
    }
}

fn upsell_proposal(entity_name: &str, top: &UpsellOpportunity) -> DraftDocument {
    let body = format!(
        "Dear {entity_name} Team,\n\n\
         What we have observed: {trigger}.\n\n\
         Our recommendation: {service}\n\n\
         Investment:\n\
         - Monthly: ${monthly:.2}\n\
         - Annual contract: ${annual:.2}\n\n\
         Are you available for a 15-minute call this week to walk through the details?\n\n\
         Best regards,\n[Your Account Manager]\n\n\
         (Proposal generated with {confidence}% confidence.)\n",
        trigger = top.trigger,
        service = top.service,
        monthly = top.monthly_value,
        annual = top.annual_value(),
        confidence = top.confidence,
    );

    DraftDocument {
        kind: DraftKind::UpsellProposal,
        subject: format!("Enhance Your IT Services - {entity_name}"),
        body,
        tone: "consultative".into(),
        requires_review: true,
        suggested_actions: vec![
            "Review proposal".into(),
            "Customize pricing if needed".into(),
            "Create quote".into(),
            "Schedule follow-up call".into(),
        ],
        generated_at: Utc::now(),
    }
}

fn quote(
    entity_id: &str,
    service_name: &str,
    description: &str,
    monthly_value: f64,
) -> Result<Quote, ExecutorError> {
    if !monthly_value.is_finite() || monthly_value < 0.0 {
        return Err(ExecutorError::MissingInput(format!(
            "quote needs a non-negative monthly value, got {monthly_value}"
        )));
    }
    let created_at = Utc::now();
    let prefix: String = entity_id.chars().take(4).collect::<String>().to_uppercase();
    let tax = monthly_value * QUOTE_TAX_RATE;
    Ok(Quote {
        quote_id: format!("Q-{}-{prefix}", created_at.format("%Y%m%d")),
        entity_id: entity_id.to_string(),
        service_name: service_name.to_string(),
        description: description.to_string(),
        line_items: vec![QuoteLineItem {
            item: service_name.to_string(),
            quantity: 1,
            unit_price: monthly_value,
            total: monthly_value,
            billing_cycle: "monthly".into(),
        }],
        subtotal: monthly_value,
        tax,
        total: monthly_value + tax,
        annual_value: monthly_value * 12.0,
        status: "draft".into(),
        created_at,
        valid_until: created_at + ChronoDuration::days(QUOTE_VALIDITY_DAYS),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
