use cfo_core::config::Config;
use cfo_core::policy::GuardrailPolicy;
use serde::Serialize;

use super::{print_json, Output};

#[derive(Serialize)]
struct GuardrailsSection<'a> {
    guardrails: &'a GuardrailPolicy,
}

/// Run the `policy` subcommand: print the effective guardrail policy.
pub fn run(config: &Config, output: Output) -> anyhow::Result<()> {
    match output {
        Output::Json => print_json(&config.guardrails)?,
        Output::Text => print!("{}", render(&config.guardrails)?),
    }
    Ok(())
}

/// The policy as a `[guardrails]` TOML section, ready to paste into a
/// config file.
pub fn render(policy: &GuardrailPolicy) -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(&GuardrailsSection { guardrails: policy })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfo_core::types::ActionType;

    #[test]
    fn rendered_policy_loads_back_as_config() {
        let policy = GuardrailPolicy {
            approval_threshold: 2500.0,
            always_require_approval: vec![ActionType::CreateQuote],
            ..GuardrailPolicy::default()
        };
        let text = render(&policy).unwrap();
        assert!(text.contains("[guardrails]"));

        let config: Config = toml::from_str(&text).unwrap();
        assert_eq!(config.guardrails, policy);
    }
}
