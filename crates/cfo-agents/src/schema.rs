//! Output validation at the task boundary.
//!
//! A handler's output is checked against the role that produced it before
//! the scheduler stores it. Violations become `MalformedResult` faults so
//! synthesis never reads half-formed reports.

use cfo_core::reports::{LicenseReport, RoleOutput, UpsellReport};
use cfo_core::types::AgentRole;

const MONEY_TOLERANCE: f64 = 0.01;

fn finite(field: &str, value: f64) -> Result<(), String> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(format!("{field} is not a finite amount ({value})"))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), String> {
    finite(field, value)?;
    if value < 0.0 {
        return Err(format!("{field} must not be negative ({value})"));
    }
    Ok(())
}

fn confidence(field: &str, value: u8) -> Result<(), String> {
    if value > 100 {
        return Err(format!("{field} must be a percentage ({value})"));
    }
    Ok(())
}

fn validate_license(report: &LicenseReport) -> Result<(), String> {
    non_negative("monthly_savings", report.monthly_savings)?;
    non_negative("annual_savings", report.annual_savings)?;
    confidence("confidence", report.confidence)?;
    let mut sum = 0.0;
    for item in &report.optimizations {
        non_negative("optimizations.cost_per_seat", item.cost_per_seat)?;
        non_negative("optimizations.monthly_waste", item.monthly_waste)?;
        sum += item.monthly_waste;
    }
    if (sum - report.monthly_savings).abs() > MONEY_TOLERANCE {
        return Err(format!(
            "line items sum to {sum:.2} but monthly_savings is {:.2}",
            report.monthly_savings
        ));
    }
    if report.optimization_needed != (report.monthly_savings > 0.0) {
        return Err("optimization_needed disagrees with monthly_savings".into());
    }
    Ok(())
}

fn validate_upsell(report: &UpsellReport) -> Result<(), String> {
    let mut sum = 0.0;
    for opportunity in &report.opportunities {
        if opportunity.service.trim().is_empty() {
            return Err("opportunity has an empty service name".into());
        }
        non_negative("opportunities.monthly_value", opportunity.monthly_value)?;
        confidence("opportunities.confidence", opportunity.confidence)?;
        sum += opportunity.monthly_value;
    }
    non_negative("total_potential_monthly", report.total_potential_monthly)?;
    finite("total_potential_annual", report.total_potential_annual)?;
    if (sum - report.total_potential_monthly).abs() > MONEY_TOLERANCE {
        return Err(format!(
            "opportunities sum to {sum:.2} but total_potential_monthly is {:.2}",
            report.total_potential_monthly
        ));
    }
    Ok(())
}

/// Check `output` against the fixed schema for `role`.
pub fn validate(role: AgentRole, output: &RoleOutput) -> Result<(), String> {
    let producer = output.produced_by();
    if producer != role {
        return Err(format!(
            "{role} returned a `{}` report, which only {producer} may produce",
            output.kind()
        ));
    }
    match output {
        RoleOutput::Profitability(report) => {
            finite("margin", report.margin)?;
            finite("margin_percentage", report.margin_percentage)
        }
        RoleOutput::License(report) => validate_license(report),
        RoleOutput::Upsell(report) => validate_upsell(report),
        RoleOutput::Risk(report) => {
            finite("cashflow_risk", report.cashflow_risk)?;
            confidence("churn_probability", report.churn_probability)
        }
        RoleOutput::ProposalRisk(report) => {
            if !report.proceed_recommended && report.reason.is_none() {
                return Err("a declined proposal must carry a reason".into());
            }
            Ok(())
        }
        RoleOutput::ProposalDraft(summary) => {
            non_negative("total_annual_value", summary.total_annual_value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfo_core::reports::{LicenseLineItem, ProfitabilityReport, ProfitabilityStatus, Recommendation, Severity};

    fn license(items: Vec<LicenseLineItem>, monthly: f64) -> RoleOutput {
        RoleOutput::License(LicenseReport {
            optimization_needed: monthly > 0.0,
            monthly_savings: monthly,
            annual_savings: monthly * 12.0,
            optimizations: items,
            confidence: 95,
        })
    }

    fn item(waste: f64) -> LicenseLineItem {
        LicenseLineItem {
            product: "m365".into(),
            unused_seats: 1,
            cost_per_seat: waste,
            monthly_waste: waste,
        }
    }

    #[test]
    fn consistent_license_report_passes() {
        let output = license(vec![item(40.0), item(60.0)], 100.0);
        assert!(validate(AgentRole::LicenseOptimizer, &output).is_ok());
    }

    #[test]
    fn wrong_role_is_rejected() {
        let output = license(vec![], 0.0);
        let err = validate(AgentRole::UpsellStrategist, &output).unwrap_err();
        assert!(err.contains("license_optimizer"));
    }

    #[test]
    fn line_items_must_sum_to_total() {
        let output = license(vec![item(40.0)], 100.0);
        let err = validate(AgentRole::LicenseOptimizer, &output).unwrap_err();
        assert!(err.contains("sum"));
    }

    #[test]
    fn negative_waste_is_rejected() {
        let output = license(vec![item(-5.0)], -5.0);
        assert!(validate(AgentRole::LicenseOptimizer, &output).is_err());
    }

    #[test]
    fn non_finite_margin_is_rejected() {
        let output = RoleOutput::Profitability(ProfitabilityReport {
            margin: f64::NAN,
            margin_percentage: 0.0,
            status: ProfitabilityStatus::Healthy,
            recommendation: Recommendation::Maintain,
            severity: Severity::Normal,
        });
        assert!(validate(AgentRole::ProfitabilityAnalyst, &output).is_err());
    }

    #[test]
    fn upsell_total_must_match() {
        let output = RoleOutput::Upsell(UpsellReport {
            opportunities: vec![],
            total_potential_monthly: 1200.0,
            total_potential_annual: 14_400.0,
        });
        assert!(validate(AgentRole::UpsellStrategist, &output).is_err());
    }
}
