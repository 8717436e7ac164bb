use std::collections::BTreeMap;
use std::path::Path;

use crate::types::Entity;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("duplicate entity id: `{0}`")]
    DuplicateEntity(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

// ---------------------------------------------------------------------------
// EntityProvider
// ---------------------------------------------------------------------------

/// Source of entity records. The orchestration core only reads through this
/// trait, so it can be backed by a fixture file or a live PSA/RMM API.
#[async_trait::async_trait]
pub trait EntityProvider: Send + Sync {
    /// Look up one entity. `Ok(None)` means the id is unknown.
    async fn get(&self, id: &str) -> Result<Option<Entity>>;

    /// Every entity the provider knows, in a stable order.
    async fn list(&self) -> Result<Vec<Entity>>;
}

// ---------------------------------------------------------------------------
// InMemoryEntityProvider
// ---------------------------------------------------------------------------

/// Fixed entity table, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntityProvider {
    entities: BTreeMap<String, Entity>,
}

impl InMemoryEntityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Result<Self> {
        let mut provider = Self::new();
        for entity in entities {
            provider.insert(entity)?;
        }
        Ok(provider)
    }

    /// Parse a JSON array of entities.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let entities: Vec<Entity> =
            serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;
        Self::from_entities(entities)
    }

    /// Load a JSON array of entities from disk.
    pub fn load_json(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ProviderError::Io(e.to_string()))?;
        let provider = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.display(), count = provider.len(), "entities loaded");
        Ok(provider)
    }

    pub fn insert(&mut self, entity: Entity) -> Result<()> {
        if self.entities.contains_key(&entity.id) {
            return Err(ProviderError::DuplicateEntity(entity.id));
        }
        self.entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[async_trait::async_trait]
impl EntityProvider for InMemoryEntityProvider {
    async fn get(&self, id: &str) -> Result<Option<Entity>> {
        Ok(self.entities.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Entity>> {
        Ok(self.entities.values().cloned().collect())
    }
}
