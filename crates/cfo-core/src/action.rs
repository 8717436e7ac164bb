use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reports::{LicenseLineItem, Severity, UpsellOpportunity};
use crate::types::{ActionStatus, ActionType, RiskTier};

// ---------------------------------------------------------------------------
// ActionPayload
// ---------------------------------------------------------------------------

/// Action-specific input. The variant determines the [`ActionType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    LicenseDowngrade {
        optimizations: Vec<LicenseLineItem>,
    },
    DraftNegotiationEmail {
        entity_name: String,
        margin: f64,
        monthly_revenue: f64,
    },
    DraftUpsellProposal {
        entity_name: String,
        opportunities: Vec<UpsellOpportunity>,
    },
    CreateQuote {
        service_name: String,
        description: String,
        monthly_value: f64,
    },
    SendAlert {
        severity: Severity,
        message: String,
    },
    UpdateRisk {
        previous: RiskTier,
        current: RiskTier,
    },
}

impl ActionPayload {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionPayload::LicenseDowngrade { .. } => ActionType::LicenseDowngrade,
            ActionPayload::DraftNegotiationEmail { .. } => ActionType::DraftNegotiationEmail,
            ActionPayload::DraftUpsellProposal { .. } => ActionType::DraftUpsellProposal,
            ActionPayload::CreateQuote { .. } => ActionType::CreateQuote,
            ActionPayload::SendAlert { .. } => ActionType::SendAlert,
            ActionPayload::UpdateRisk { .. } => ActionType::UpdateRisk,
        }
    }

    /// Monthly amount of money the action moves, as seen by the guardrails.
    pub fn estimated_monthly_impact(&self) -> f64 {
        match self {
            ActionPayload::LicenseDowngrade { optimizations } => {
                optimizations.iter().map(|o| o.monthly_waste).sum()
            }
            ActionPayload::DraftNegotiationEmail { margin, .. } => margin.abs(),
            ActionPayload::DraftUpsellProposal { opportunities, .. } => opportunities
                .first()
                .map(|o| o.monthly_value)
                .unwrap_or(0.0),
            ActionPayload::CreateQuote { monthly_value, .. } => *monthly_value,
            ActionPayload::SendAlert { .. } | ActionPayload::UpdateRisk { .. } => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Execution results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DowngradeLine {
    pub product: String,
    pub seats_removed: u32,
    pub monthly_savings: f64,
    pub vendor_confirmation: String,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DowngradeReceipt {
    pub downgrades: Vec<DowngradeLine>,
    pub total_monthly_savings: f64,
    pub total_annual_savings: f64,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftKind {
    NegotiationEmail,
    UpsellProposal,
}

/// A document produced for a human to read before anything is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftDocument {
    pub kind: DraftKind,
    pub subject: String,
    pub body: String,
    pub tone: String,
    /// Always `true`: guardrails gate execution, not whether a human reads
    /// the draft.
    pub requires_review: bool,
    pub suggested_actions: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteLineItem {
    pub item: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub total: f64,
    pub billing_cycle: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub quote_id: String,
    pub entity_id: String,
    pub service_name: String,
    pub description: String,
    pub line_items: Vec<QuoteLineItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub annual_value: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub entity_id: String,
    pub severity: Severity,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskUpdateRecord {
    pub entity_id: String,
    pub previous: RiskTier,
    pub current: RiskTier,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionResult {
    LicenseDowngrade(DowngradeReceipt),
    Draft(DraftDocument),
    Quote(Quote),
    Alert(AlertRecord),
    RiskUpdate(RiskUpdateRecord),
    /// Refused by the guardrails before anything ran.
    Blocked { reason: String },
    /// Refused by a human reviewer.
    Rejected { reason: String },
    /// The executor failed.
    Error { message: String },
}

// ---------------------------------------------------------------------------
// AutonomousAction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomousAction {
    pub id: Uuid,
    pub action_type: ActionType,
    pub entity_id: String,
    pub payload: ActionPayload,
    pub requires_approval: bool,
    pub status: ActionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<ActionResult>,
}

impl AutonomousAction {
    pub fn new(entity_id: impl Into<String>, payload: ActionPayload, status: ActionStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type: payload.action_type(),
            entity_id: entity_id.into(),
            payload,
            requires_approval: status == ActionStatus::RequiresApproval,
            status,
            created_at: Utc::now(),
            completed_at: None,
            result: None,
        }
    }

    /// Human-readable reason for a blocked or rejected action, if any.
    pub fn refusal_reason(&self) -> Option<&str> {
        match &self.result {
            Some(ActionResult::Blocked { reason }) | Some(ActionResult::Rejected { reason }) => {
                Some(reason)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
