use std::path::Path;

use cfo_agents::engine::UpsellOutcome;
use cfo_core::config::Config;

use super::{action_line, load_engine, money, print_json, Output};

/// Run the `upsell` subcommand for one entity.
pub async fn run(entities: &Path, entity: &str, config: Config, output: Output) -> anyhow::Result<()> {
    let (_, engine) = load_engine(entities, config)?;
    let outcome = engine.run_upsell_workflow(entity).await?;

    match output {
        Output::Json => print_json(&outcome)?,
        Output::Text => println!("{}", render(entity, &outcome)),
    }
    Ok(())
}

pub fn render(entity: &str, outcome: &UpsellOutcome) -> String {
    match outcome {
        UpsellOutcome::NoOpportunities => format!("{entity}: no upsell opportunities"),
        UpsellOutcome::NotRecommended {
            reason,
            alternative_action,
        } => {
            let mut line = format!("{entity}: upsell not recommended: {reason}");
            if let Some(alt) = alternative_action {
                line.push_str(&format!("\n  instead: {alt}"));
            }
            line
        }
        UpsellOutcome::Degraded { role, fault } => {
            format!("{entity}: {role} step failed: {fault}")
        }
        UpsellOutcome::ReadyForReview {
            upsell,
            proposal,
            action,
        } => {
            let mut lines = vec![format!(
                "{entity}: {} opportunity(ies), {}/year",
                proposal.opportunity_count,
                money(proposal.total_annual_value)
            )];
            for opp in &upsell.opportunities {
                lines.push(format!(
                    "  {:<24} {}/month  confidence {}%  ({})",
                    opp.service,
                    money(opp.monthly_value),
                    opp.confidence,
                    opp.trigger
                ));
            }
            lines.push(format!("Next steps: {}", proposal.next_steps.join(" -> ")));
            lines.push(format!("Action:  {}", action_line(action)));
            lines.join("\n")
        }
    }
}
