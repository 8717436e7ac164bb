use std::path::Path;

use cfo_agents::synthesis::{ActionCategory, Finding, SynthesizedAnalysis};
use cfo_core::config::Config;
use cfo_core::provider::EntityProvider;

use super::{action_line, load_engine, money, print_json, Output};

/// Run the `analyze` subcommand. Without `entity`, every entity in the file
/// is analyzed concurrently.
pub async fn run(
    entities: &Path,
    entity: Option<&str>,
    config: Config,
    output: Output,
) -> anyhow::Result<()> {
    let (provider, engine) = load_engine(entities, config)?;

    let analyses = match entity {
        Some(id) => vec![engine.orchestrate_by_id(id).await?],
        None => {
            let all = provider.list().await?;
            futures::future::join_all(all.iter().map(|e| engine.orchestrate(e))).await
        }
    };

    match output {
        Output::Json => print_json(&analyses)?,
        Output::Text => {
            for analysis in &analyses {
                println!("{}\n", render(analysis));
            }
            let pending = engine.list_pending_approvals().len();
            if pending > 0 {
                println!("{pending} action(s) awaiting approval");
            }
        }
    }
    Ok(())
}

fn category_label(category: ActionCategory) -> &'static str {
    match category {
        ActionCategory::MarginImprovement => "margin",
        ActionCategory::CostReduction => "cost",
        ActionCategory::RevenueGrowth => "revenue",
    }
}

fn finding_line<T>(label: &str, finding: &Finding<T>, describe: impl Fn(&T) -> String) -> String {
    match finding {
        Finding::Ready { report } => format!("{label:<15} {}", describe(report)),
        Finding::Degraded { fault } => format!("{label:<15} unavailable ({fault})"),
    }
}

pub fn render(analysis: &SynthesizedAnalysis) -> String {
    let findings = &analysis.findings;
    let mut lines = vec![
        format!("{} ({})", analysis.entity_name, analysis.entity_id),
        "-".repeat(40),
        finding_line("Margin:", &findings.profitability, |r| {
            let flag = if r.is_critical() { "  CRITICAL" } else { "" };
            format!("{}/month ({:.1}%){flag}", money(r.margin), r.margin_percentage)
        }),
        finding_line("License waste:", &findings.license, |r| {
            format!(
                "{}/month across {} product(s)",
                money(r.monthly_savings),
                r.optimizations.len()
            )
        }),
        finding_line("Upsell:", &findings.upsell, |r| {
            format!(
                "{} opportunity(ies), {}/month",
                r.opportunities.len(),
                money(r.total_potential_monthly)
            )
        }),
        finding_line("Risk:", &findings.risk, |r| {
            format!("{} tier, churn {}%", r.tier, r.churn_probability)
        }),
    ];

    if analysis.recommended_actions.is_empty() {
        lines.push("No recommended actions.".into());
    } else {
        lines.push("Recommended:".into());
        for action in &analysis.recommended_actions {
            lines.push(format!(
                "  {}. [{}] {}",
                action.priority,
                category_label(action.category),
                action.description
            ));
        }
    }

    for action in &analysis.autonomous_actions {
        lines.push(format!("Action:  {}", action_line(action)));
    }
    lines.join("\n")
}
