//! Domain model shared by the AI CFO orchestration crates.
//!
//! - [`types`]: entities, agent roles, task and action status machines
//! - [`reports`]: typed per-role handler inputs and outputs
//! - [`action`]: autonomous action payloads and execution results
//! - [`policy`]: the guardrail policy consulted before any action executes
//! - [`config`]: TOML configuration
//! - [`provider`]: the entity data provider collaborator

pub mod action;
pub mod config;
pub mod policy;
pub mod provider;
pub mod reports;
pub mod types;
