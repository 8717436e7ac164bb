use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cfo_core::reports::{RoleOutput, TaskInput};
use cfo_core::types::{AgentRole, FaultKind, TaskFault};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no handler registered for role `{0}`")]
    AgentNotFound(AgentRole),
    #[error("duplicate handler for role `{0}`")]
    DuplicateAgent(AgentRole),
}

/// Errors a role handler may report. Both are recorded on the task rather
/// than failing the batch.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failure(String),
    #[error("{0}")]
    InvalidInput(String),
}

impl HandlerError {
    pub fn into_fault(self) -> TaskFault {
        match self {
            HandlerError::Failure(msg) => TaskFault::new(FaultKind::HandlerFailure, msg),
            HandlerError::InvalidInput(msg) => TaskFault::new(FaultKind::InvalidInput, msg),
        }
    }
}

// ---------------------------------------------------------------------------
// RoleHandler
// ---------------------------------------------------------------------------

/// Trait implemented by every agent role's handler.
#[async_trait::async_trait]
pub trait RoleHandler: Send + Sync {
    /// The role this handler serves.
    fn role(&self) -> AgentRole;

    /// Run `operation` against `input`.
    async fn handle(&self, operation: &str, input: &TaskInput) -> Result<RoleOutput, HandlerError>;
}

// ---------------------------------------------------------------------------
// AgentStats: per-role execution counters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentStats {
    pub total_executions: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
    pub last_execution: Option<DateTime<Utc>>,
}

impl AgentStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        (self.total_executions - self.failures) as f64 / self.total_executions as f64
    }

    pub fn mean_execution_ms(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        self.total_duration_ms as f64 / self.total_executions as f64
    }
}

/// Public view of a registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub role: AgentRole,
    pub name: String,
    pub capabilities: Vec<String>,
    pub stats: AgentStats,
}

struct AgentEntry {
    handler: Arc<dyn RoleHandler>,
    stats: Mutex<AgentStats>,
}

// ---------------------------------------------------------------------------
// AgentRegistry: role -> handler dispatch table
// ---------------------------------------------------------------------------

/// Fixed dispatch table from role to handler, built once at startup.
///
/// Registration takes `&mut self`, so once the registry is shared behind an
/// `Arc` the table can no longer change; only the per-role counters move.
#[derive(Default)]
pub struct AgentRegistry {
    agents: BTreeMap<AgentRole, AgentEntry>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Returns error if its role already has one.
    pub fn register(&mut self, handler: Arc<dyn RoleHandler>) -> Result<(), RegistryError> {
        let role = handler.role();
        if self.agents.contains_key(&role) {
            return Err(RegistryError::DuplicateAgent(role));
        }
        debug!(role = %role, "registered role handler");
        self.agents.insert(
            role,
            AgentEntry {
                handler,
                stats: Mutex::new(AgentStats::default()),
            },
        );
        Ok(())
    }

    /// Register a handler, replacing any existing one for the same role.
    pub fn replace(&mut self, handler: Arc<dyn RoleHandler>) -> Option<Arc<dyn RoleHandler>> {
        let role = handler.role();
        debug!(role = %role, "replaced role handler");
        self.agents
            .insert(
                role,
                AgentEntry {
                    handler,
                    stats: Mutex::new(AgentStats::default()),
                },
            )
            .map(|old| old.handler)
    }

    /// Look up the handler for a role.
    pub fn handler(&self, role: AgentRole) -> Result<Arc<dyn RoleHandler>, RegistryError> {
        self.agents
            .get(&role)
            .map(|entry| Arc::clone(&entry.handler))
            .ok_or(RegistryError::AgentNotFound(role))
    }

    pub fn contains(&self, role: AgentRole) -> bool {
        self.agents.contains_key(&role)
    }

    /// Number of registered roles.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Record one execution for `role`.
    pub fn record(&self, role: AgentRole, elapsed: Duration, success: bool) {
        if let Some(entry) = self.agents.get(&role) {
            let mut stats = entry.stats.lock().expect("agent stats lock poisoned");
            stats.total_executions += 1;
            if !success {
                stats.failures += 1;
            }
            stats.total_duration_ms += u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
            stats.last_execution = Some(Utc::now());
        }
    }

    pub fn stats(&self, role: AgentRole) -> Option<AgentStats> {
        self.agents
            .get(&role)
            .map(|entry| entry.stats.lock().expect("agent stats lock poisoned").clone())
    }

    /// Every registered agent, in role order.
    pub fn descriptors(&self) -> Vec<AgentDescriptor> {
        self.agents
            .iter()
            .map(|(role, entry)| AgentDescriptor {
                role: *role,
                name: role.display_name().to_string(),
                capabilities: role.capabilities().iter().map(|c| c.to_string()).collect(),
                stats: entry.stats.lock().expect("agent stats lock poisoned").clone(),
            })
            .collect()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("roles", &self.agents.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cfo_core::reports::UpsellReport;

    struct Fixed(AgentRole);

    #[async_trait::async_trait]
    impl RoleHandler for Fixed {
        fn role(&self) -> AgentRole {
            self.0
        }

        async fn handle(&self, _op: &str, _input: &TaskInput) -> Result<RoleOutput, HandlerError> {
            Ok(RoleOutput::Upsell(UpsellReport::default()))
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(Fixed(AgentRole::UpsellStrategist))).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.handler(AgentRole::UpsellStrategist).is_ok());
        assert!(matches!(
            registry.handler(AgentRole::RiskAssessor),
            Err(RegistryError::AgentNotFound(AgentRole::RiskAssessor))
        ));
    }

    #[test]
    fn duplicate_role_is_rejected() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(Fixed(AgentRole::RiskAssessor))).unwrap();
        let err = registry
            .register(Arc::new(Fixed(AgentRole::RiskAssessor)))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateAgent(AgentRole::RiskAssessor)));
    }

    #[test]
    fn replace_swaps_handler() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(Fixed(AgentRole::RiskAssessor))).unwrap();
        let old = registry.replace(Arc::new(Fixed(AgentRole::RiskAssessor)));
        assert!(old.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stats_track_success_rate() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(Fixed(AgentRole::LicenseOptimizer))).unwrap();
        registry.record(AgentRole::LicenseOptimizer, Duration::from_millis(10), true);
        registry.record(AgentRole::LicenseOptimizer, Duration::from_millis(30), false);

        let stats = registry.stats(AgentRole::LicenseOptimizer).unwrap();
        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.success_rate(), 0.5);
        assert_eq!(stats.mean_execution_ms(), 20.0);
        assert!(stats.last_execution.is_some());
    }

    #[test]
    fn descriptors_carry_capabilities() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(Fixed(AgentRole::ActionExecutor))).unwrap();
        let descriptors = registry.descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "Action Executor");
        assert!(descriptors[0]
            .capabilities
            .contains(&"email_drafting".to_string()));
    }
}
