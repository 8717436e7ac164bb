use serde::{Deserialize, Serialize};

use crate::types::{ActionType, RiskTier};

// ---------------------------------------------------------------------------
// TierPermission
// ---------------------------------------------------------------------------

/// Whether autonomous execution is permitted for entities in one risk tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPermission {
    pub allow_autonomous: bool,
    pub reason: String,
}

impl TierPermission {
    pub fn allowed(reason: impl Into<String>) -> Self {
        Self {
            allow_autonomous: true,
            reason: reason.into(),
        }
    }

    pub fn manual_review(reason: impl Into<String>) -> Self {
        Self {
            allow_autonomous: false,
            reason: reason.into(),
        }
    }
}

/// One permission entry per risk tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    #[serde(default = "default_low_tier")]
    pub low: TierPermission,
    #[serde(default = "default_medium_tier")]
    pub medium: TierPermission,
    #[serde(default = "default_high_tier")]
    pub high: TierPermission,
}

impl TierTable {
    pub fn get(&self, tier: RiskTier) -> &TierPermission {
        match tier {
            RiskTier::Low => &self.low,
            RiskTier::Medium => &self.medium,
            RiskTier::High => &self.high,
        }
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            low: default_low_tier(),
            medium: default_medium_tier(),
            high: default_high_tier(),
        }
    }
}

fn default_low_tier() -> TierPermission {
    TierPermission::allowed("low risk - safe for automation")
}
fn default_medium_tier() -> TierPermission {
    TierPermission::allowed("medium risk - proceed with caution")
}
fn default_high_tier() -> TierPermission {
    TierPermission::manual_review("risk tier requires manual review")
}

// ---------------------------------------------------------------------------
// GuardrailPolicy
// ---------------------------------------------------------------------------

/// Rules consulted before any autonomous action is allowed to run.
///
/// Read-only at evaluation time; load it from the `[guardrails]` section of
/// the config file or build it in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailPolicy {
    /// Margins below this (but not negative) are medium risk.
    #[serde(default = "default_low_margin_floor")]
    pub low_margin_floor: f64,
    /// Annualized impact above which a human must approve.
    #[serde(default = "default_approval_threshold")]
    pub approval_threshold: f64,
    /// Action types a tier without autonomy blocks outright.
    #[serde(default = "default_restricted_action_types")]
    pub restricted_action_types: Vec<ActionType>,
    /// Action types that always go to the approval queue.
    #[serde(default)]
    pub always_require_approval: Vec<ActionType>,
    /// When `false` nothing executes without approval.
    #[serde(default = "default_true")]
    pub auto_approval_enabled: bool,
    #[serde(default)]
    pub tiers: TierTable,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self {
            low_margin_floor: default_low_margin_floor(),
            approval_threshold: default_approval_threshold(),
            restricted_action_types: default_restricted_action_types(),
            always_require_approval: Vec::new(),
            auto_approval_enabled: true,
            tiers: TierTable::default(),
        }
    }
}

impl GuardrailPolicy {
    pub fn risk_tier(&self, margin: f64) -> RiskTier {
        RiskTier::from_margin(margin, self.low_margin_floor)
    }

    pub fn is_restricted(&self, action_type: ActionType) -> bool {
        self.restricted_action_types.contains(&action_type)
    }

    pub fn always_requires_approval(&self, action_type: ActionType) -> bool {
        self.always_require_approval.contains(&action_type)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.low_margin_floor.is_finite() || self.low_margin_floor < 0.0 {
            return Err(format!(
                "guardrails.low_margin_floor must be a non-negative number, got {}",
                self.low_margin_floor
            ));
        }
        if !self.approval_threshold.is_finite() || self.approval_threshold < 0.0 {
            return Err(format!(
                "guardrails.approval_threshold must be a non-negative number, got {}",
                self.approval_threshold
            ));
        }
        for tier in [RiskTier::Low, RiskTier::Medium, RiskTier::High] {
            if self.tiers.get(tier).reason.trim().is_empty() {
                return Err(format!("guardrails.tiers.{tier}.reason must not be empty"));
            }
        }
        Ok(())
    }
}

fn default_low_margin_floor() -> f64 {
    500.0
}
fn default_approval_threshold() -> f64 {
    1000.0
}
fn default_restricted_action_types() -> Vec<ActionType> {
    vec![ActionType::LicenseDowngrade, ActionType::CreateQuote]
}
fn default_true() -> bool {
    true
}
