pub mod analyze;
pub mod downgrade;
pub mod policy;
pub mod sweep;
pub mod upsell;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use cfo_agents::engine::CfoEngine;
use cfo_core::action::AutonomousAction;
use cfo_core::config::Config;
use cfo_core::provider::InMemoryEntityProvider;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Text,
    Json,
}

/// Load and validate config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Config::load().with_context(|| {
            format!(
                "failed to load config from {}",
                Config::default_path().display()
            )
        }),
    }
}

/// Build an engine over the entities in `path`.
pub fn load_engine(
    path: &Path,
    config: Config,
) -> anyhow::Result<(Arc<InMemoryEntityProvider>, CfoEngine)> {
    let provider = InMemoryEntityProvider::load_json(path)
        .with_context(|| format!("failed to load entities from {}", path.display()))?;
    if provider.is_empty() {
        anyhow::bail!("{} contains no entities", path.display());
    }
    let provider = Arc::new(provider);
    let engine = CfoEngine::new(provider.clone(), config);
    Ok((provider, engine))
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn money(value: f64) -> String {
    if value < 0.0 {
        format!("-${:.2}", value.abs())
    } else {
        format!("${value:.2}")
    }
}

/// One line per action: type, status, id, and why it stopped if it did.
pub fn action_line(action: &AutonomousAction) -> String {
    let mut line = format!("{} [{}] {}", action.action_type, action.status, action.id);
    if let Some(reason) = action.refusal_reason() {
        line.push_str(&format!(" ({reason})"));
    }
    line
}
