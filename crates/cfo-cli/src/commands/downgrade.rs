use std::path::Path;

use cfo_agents::engine::{CfoEngine, DowngradeOutcome};
use cfo_core::action::{ActionResult, AutonomousAction};
use cfo_core::config::Config;
use cfo_core::types::ActionStatus;
use serde::Serialize;
use tracing::info;

use super::{action_line, load_engine, money, print_json, Output};

#[derive(Debug, Serialize)]
pub struct DowngradeRun {
    pub outcome: DowngradeOutcome,
    /// Final state after `--approve`, when the action was queued.
    pub approved: Option<AutonomousAction>,
}

/// Run the `downgrade` subcommand for one entity.
pub async fn run(
    entities: &Path,
    entity: &str,
    approve: bool,
    config: Config,
    output: Output,
) -> anyhow::Result<()> {
    let (_, engine) = load_engine(entities, config)?;
    let run = downgrade(&engine, entity, approve).await?;

    match output {
        Output::Json => print_json(&run)?,
        Output::Text => println!("{}", render(entity, &run)),
    }
    Ok(())
}

pub async fn downgrade(engine: &CfoEngine, entity: &str, approve: bool) -> anyhow::Result<DowngradeRun> {
    let outcome = engine.auto_downgrade_licenses(entity).await?;
    let approved = match &outcome {
        DowngradeOutcome::Submitted { action }
            if approve && action.status == ActionStatus::RequiresApproval =>
        {
            info!(action_id = %action.id, entity_id = entity, "approving queued downgrade");
            Some(engine.approve(action.id).await?)
        }
        _ => None,
    };
    Ok(DowngradeRun { outcome, approved })
}

fn describe(action: &AutonomousAction) -> Vec<String> {
    let mut lines = vec![format!("Action:  {}", action_line(action))];
    if let Some(ActionResult::LicenseDowngrade(receipt)) = &action.result {
        for line in &receipt.downgrades {
            lines.push(format!(
                "  {:<20} -{} seat(s)  {}/month  ({})",
                line.product,
                line.seats_removed,
                money(line.monthly_savings),
                line.vendor_confirmation
            ));
        }
        lines.push(format!(
            "Saved {}/month, {}/year",
            money(receipt.total_monthly_savings),
            money(receipt.total_annual_savings)
        ));
    }
    lines
}

pub fn render(entity: &str, run: &DowngradeRun) -> String {
    let mut lines = match &run.outcome {
        DowngradeOutcome::NoWaste => vec![format!("{entity}: every license seat is in use")],
        DowngradeOutcome::Degraded { fault } => {
            vec![format!("{entity}: license analysis failed: {fault}")]
        }
        DowngradeOutcome::Submitted { action } => describe(action),
    };
    if let Some(approved) = &run.approved {
        lines.push("Approved:".into());
        lines.extend(describe(approved));
    } else if let DowngradeOutcome::Submitted { action } = &run.outcome {
        if action.status == ActionStatus::RequiresApproval {
            lines.push("Re-run with --approve to execute.".into());
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::fixture_engine;

    #[tokio::test]
    async fn blocked_downgrade_is_not_approved() {
        let engine = fixture_engine();
        let run = downgrade(&engine, "client_x", true).await.unwrap();
        assert!(run.approved.is_none());
        let text = render("client_x", &run);
        assert!(text.contains("license_downgrade [failed]"));
        assert!(text.contains("manual review"));
    }

    #[tokio::test]
    async fn small_downgrade_runs_without_approval() {
        // client_z wastes 24/month, under the annualized threshold
        let engine = fixture_engine();
        let run = downgrade(&engine, "client_z", false).await.unwrap();
        let text = render("client_z", &run);
        assert!(text.contains("license_downgrade [completed]"));
        assert!(text.contains("Saved $24.00/month"));
    }

    #[tokio::test]
    async fn approve_flag_executes_queued_downgrade() {
        let engine = fixture_engine();
        // client_y: 28/month, 336/year stays under; lower the bar so it queues
        let mut config = engine.config().clone();
        config.guardrails.approval_threshold = 100.0;
        let provider = cfo_core::provider::InMemoryEntityProvider::from_json_str(
            crate::commands::tests::CLIENTS,
        )
        .unwrap();
        let engine = CfoEngine::new(std::sync::Arc::new(provider), config);

        let run = downgrade(&engine, "client_y", true).await.unwrap();
        let approved = run.approved.as_ref().unwrap();
        assert_eq!(approved.status, ActionStatus::Completed);
        assert!(render("client_y", &run).contains("Approved:"));
    }
}
