use std::path::Path;

use cfo_agents::engine::{LicenseSweep, PlanStep};
use cfo_agents::guardrails::GuardrailOutcome;
use cfo_core::config::Config;

use super::{load_engine, money, print_json, Output};

/// Run the `sweep` subcommand: license analysis across every entity.
pub async fn run(entities: &Path, config: Config, output: Output) -> anyhow::Result<()> {
    let (_, engine) = load_engine(entities, config)?;
    let sweep = engine.run_license_sweep().await?;

    match output {
        Output::Json => print_json(&sweep)?,
        Output::Text => println!("{}", render(&sweep)),
    }
    Ok(())
}

pub fn render(sweep: &LicenseSweep) -> String {
    let mut lines = vec![
        format!(
            "License sweep: {} of {} entities have unused seats",
            sweep.needing_optimization.len(),
            sweep.entities_scanned
        ),
        "-".repeat(40),
    ];
    for entry in &sweep.needing_optimization {
        lines.push(format!(
            "{:<12} {:<24} {:>10}/month",
            entry.entity_id,
            entry.entity_name,
            money(entry.monthly_savings)
        ));
        for item in &entry.optimizations {
            lines.push(format!(
                "    {:<20} {} unused x {}",
                item.product,
                item.unused_seats,
                money(item.cost_per_seat)
            ));
        }
        for step in &entry.plan {
            lines.push(format!("    -> {}", plan_line(step)));
        }
    }
    lines.push(format!(
        "Potential savings: {}/month, {}/year",
        money(sweep.total_monthly_potential),
        money(sweep.total_annual_potential)
    ));
    if !sweep.degraded.is_empty() {
        lines.push(format!("Not analyzed: {}", sweep.degraded.join(", ")));
    }
    lines.join("\n")
}

fn plan_line(step: &PlanStep) -> String {
    match step {
        PlanStep::DowngradeLicenses { outcome, reason, .. } => {
            let verdict = match outcome {
                GuardrailOutcome::AutoExecute => "ready",
                GuardrailOutcome::RequiresApproval => "requires approval",
                GuardrailOutcome::Blocked => "blocked",
            };
            format!("downgrade {verdict} ({reason})")
        }
        PlanStep::NotifyClient { template } => format!("notify client ({template})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::fixture_engine;

    #[tokio::test]
    async fn render_totals_all_entities() {
        let sweep = fixture_engine().run_license_sweep().await.unwrap();
        let text = render(&sweep);
        assert!(text.starts_with("License sweep: 3 of 3 entities"));
        assert!(text.contains("adobe_creative"));
        assert!(text.contains("-> downgrade blocked"));
        assert!(text.contains("-> downgrade ready"));
        assert!(text.contains("-> notify client (license_optimization_notification)"));
        assert!(text.contains("Potential savings: $656.00/month, $7872.00/year"));
        assert!(!text.contains("Not analyzed"));
    }
}
