use std::fmt;
use std::sync::Arc;

use cfo_core::policy::GuardrailPolicy;
use cfo_core::types::{ActionType, Entity, RiskTier};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// GuardrailOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailOutcome {
    /// Safe to run now, without a human.
    AutoExecute,
    /// Refused outright; the action is recorded as failed.
    Blocked,
    /// Parked in the approval queue.
    RequiresApproval,
}

impl fmt::Display for GuardrailOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GuardrailOutcome::AutoExecute => "auto_execute",
            GuardrailOutcome::Blocked => "blocked",
            GuardrailOutcome::RequiresApproval => "requires_approval",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailDecision {
    pub outcome: GuardrailOutcome,
    pub reason: String,
    pub tier: RiskTier,
    pub annualized_impact: f64,
}

// ---------------------------------------------------------------------------
// GuardrailEvaluator
// ---------------------------------------------------------------------------

/// Pure evaluation of an action against the [`GuardrailPolicy`].
///
/// Rules, first match wins:
///
/// 1. derive the risk tier from the entity margin;
/// 2. tier without autonomy + restricted action type: blocked, whatever the
///    amount;
/// 3. action type on the always-approve list, or auto-approval switched off:
///    requires approval;
/// 4. annualized impact above the threshold (or not a finite number):
///    requires approval;
/// 5. otherwise auto-execute.
#[derive(Debug, Clone)]
pub struct GuardrailEvaluator {
    policy: Arc<GuardrailPolicy>,
}

impl GuardrailEvaluator {
    pub fn new(policy: Arc<GuardrailPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GuardrailPolicy {
        &self.policy
    }

    pub fn evaluate(
        &self,
        entity: &Entity,
        action_type: ActionType,
        estimated_monthly_impact: f64,
    ) -> GuardrailDecision {
        let policy = &self.policy;
        let tier = policy.risk_tier(entity.margin());
        let annualized_impact = estimated_monthly_impact * 12.0;
        let permission = policy.tiers.get(tier);

        let (outcome, reason) = if !permission.allow_autonomous && policy.is_restricted(action_type)
        {
            (GuardrailOutcome::Blocked, permission.reason.clone())
        } else if policy.always_requires_approval(action_type) {
            (
                GuardrailOutcome::RequiresApproval,
                format!("{action_type} always requires approval"),
            )
        } else if !policy.auto_approval_enabled {
            (
                GuardrailOutcome::RequiresApproval,
                "auto-approval is disabled".to_string(),
            )
        } else if !annualized_impact.is_finite() {
            (
                GuardrailOutcome::RequiresApproval,
                "impact could not be estimated".to_string(),
            )
        } else if annualized_impact > policy.approval_threshold {
            (
                GuardrailOutcome::RequiresApproval,
                format!(
                    "annualized impact ${annualized_impact:.2} exceeds approval threshold ${:.2}",
                    policy.approval_threshold
                ),
            )
        } else {
            (
                GuardrailOutcome::AutoExecute,
                format!("{tier} risk tier within approval threshold"),
            )
        };

        debug!(
            entity_id = %entity.id,
            action_type = %action_type,
            tier = %tier,
            annualized_impact,
            outcome = %outcome,
            "guardrail evaluated"
        );

        GuardrailDecision {
            outcome,
            reason,
            tier,
            annualized_impact,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator(policy: GuardrailPolicy) -> GuardrailEvaluator {
        GuardrailEvaluator::new(Arc::new(policy))
    }

    fn entity(margin: f64) -> Entity {
        Entity::new("e", "E", 2000.0 + margin, 2000.0)
    }

    #[test]
    fn high_tier_blocks_restricted_action_regardless_of_amount() {
        let eval = evaluator(GuardrailPolicy::default());
        for impact in [0.0, 1.0, 10_000.0] {
            let decision = eval.evaluate(&entity(-500.0), ActionType::LicenseDowngrade, impact);
            assert_eq!(decision.outcome, GuardrailOutcome::Blocked);
            assert!(decision.reason.contains("manual review"));
            assert_eq!(decision.tier, RiskTier::High);
        }
    }

    #[test]
    fn high_tier_unrestricted_action_falls_through_to_threshold() {
        let eval = evaluator(GuardrailPolicy::default());
        let decision = eval.evaluate(&entity(-500.0), ActionType::DraftNegotiationEmail, 500.0);
        assert_eq!(decision.outcome, GuardrailOutcome::RequiresApproval);
        assert_eq!(decision.annualized_impact, 6000.0);

        let decision = eval.evaluate(&entity(-500.0), ActionType::SendAlert, 0.0);
        assert_eq!(decision.outcome, GuardrailOutcome::AutoExecute);
    }

    #[test]
    fn threshold_is_exclusive() {
        let eval = evaluator(GuardrailPolicy {
            approval_threshold: 1200.0,
            ..GuardrailPolicy::default()
        });
        let at = eval.evaluate(&entity(1800.0), ActionType::LicenseDowngrade, 100.0);
        assert_eq!(at.outcome, GuardrailOutcome::AutoExecute);

        let above = eval.evaluate(&entity(1800.0), ActionType::LicenseDowngrade, 100.5);
        assert_eq!(above.outcome, GuardrailOutcome::RequiresApproval);
    }

    #[test]
    fn medium_tier_is_autonomous_by_default() {
        let eval = evaluator(GuardrailPolicy::default());
        let decision = eval.evaluate(&entity(200.0), ActionType::LicenseDowngrade, 50.0);
        assert_eq!(decision.tier, RiskTier::Medium);
        assert_eq!(decision.outcome, GuardrailOutcome::AutoExecute);
    }

    #[test]
    fn always_approve_list_wins_over_threshold() {
        let policy = GuardrailPolicy {
            always_require_approval: vec![ActionType::SendAlert],
            ..GuardrailPolicy::default()
        };
        let decision = evaluator(policy).evaluate(&entity(1800.0), ActionType::SendAlert, 0.0);
        assert_eq!(decision.outcome, GuardrailOutcome::RequiresApproval);
    }

    #[test]
    fn block_wins_over_always_approve_list() {
        let policy = GuardrailPolicy {
            always_require_approval: vec![ActionType::LicenseDowngrade],
            ..GuardrailPolicy::default()
        };
        let decision =
            evaluator(policy).evaluate(&entity(-1.0), ActionType::LicenseDowngrade, 1.0);
        assert_eq!(decision.outcome, GuardrailOutcome::Blocked);
    }

    #[test]
    fn disabled_auto_approval_parks_everything() {
        let policy = GuardrailPolicy {
            auto_approval_enabled: false,
            ..GuardrailPolicy::default()
        };
        let decision = evaluator(policy).evaluate(&entity(1800.0), ActionType::UpdateRisk, 0.0);
        assert_eq!(decision.outcome, GuardrailOutcome::RequiresApproval);
    }

    #[test]
    fn non_finite_impact_requires_approval() {
        let eval = evaluator(GuardrailPolicy::default());
        let decision = eval.evaluate(&entity(1800.0), ActionType::CreateQuote, f64::NAN);
        assert_eq!(decision.outcome, GuardrailOutcome::RequiresApproval);
    }
}
