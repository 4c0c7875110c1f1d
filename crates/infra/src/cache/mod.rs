//! Contracts of the cache layer and the predictive engine.
//!
//! Both collaborators live outside this workspace; the coordinator and the
//! scheduler only ever see these traits. [`in_memory`] provides recording
//! implementations for tests and local runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use chantier_events::DomainEvent;

pub mod in_memory;

pub use in_memory::{CacheCall, CacheOperation, InMemoryCacheService, InMemoryPredictiveEngine};

/// Failure reported by a cache service or predictive engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("cache operation failed: {0}")]
    Cache(String),

    #[error("prediction failed: {0}")]
    Prediction(String),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

impl CollaboratorError {
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    pub fn prediction(msg: impl Into<String>) -> Self {
        Self::Prediction(msg.into())
    }
}

/// Kind of change that makes cached entries stale.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Update,
    Delete,
    StatusChange,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
            ChangeType::StatusChange => "status_change",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which field of an event names the cached entity it touches.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IdSource {
    EntityId,
    /// The event's `projectId`, falling back to its `entityId`.
    ProjectOrEntityId,
}

impl IdSource {
    pub fn resolve<'a>(&self, event: &'a DomainEvent) -> &'a str {
        match self {
            IdSource::EntityId => event.entity_id(),
            IdSource::ProjectOrEntityId => event.project_id().unwrap_or(event.entity_id()),
        }
    }
}

/// Urgency of a warming request. Ordered `Low < Medium < High`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreloadPriority {
    Low,
    Medium,
    High,
}

impl PreloadPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreloadPriority::Low => "low",
            PreloadPriority::Medium => "medium",
            PreloadPriority::High => "high",
        }
    }
}

impl std::fmt::Display for PreloadPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity the engine expects to be read soon. `confidence` is in 0..=100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPrediction {
    pub entity_type: String,
    pub entity_id: String,
    pub confidence: f64,
}

impl EntityPrediction {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>, confidence: f64) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotEntity {
    pub entity_type: String,
    pub entity_id: String,
    pub access_count: u64,
}

impl HotEntity {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>, access_count: u64) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            access_count,
        }
    }
}

/// Access heat map produced by the predictive engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityHeatMap {
    pub hot_entities: Vec<HotEntity>,
}

/// The cache layer being coordinated.
///
/// Implementations must tolerate concurrent calls for the same entity; the
/// last completed write wins.
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Drop every cached entry derived from the given entity.
    async fn invalidate_on_entity_change(
        &self,
        entity_type: &str,
        entity_id: &str,
        change_type: ChangeType,
        context: &JsonValue,
    ) -> Result<(), CollaboratorError>;

    /// Warm the cache for an entity. Returns `false` when nothing was loaded.
    async fn preload_context_by_prediction(
        &self,
        entity_type: &str,
        entity_id: &str,
        context_hint: Option<&str>,
        priority: PreloadPriority,
    ) -> Result<bool, CollaboratorError>;

    async fn integrate_heat_map_data(&self) -> Result<(), CollaboratorError>;

    async fn optimize_lru_with_predictive_scoring(&self) -> Result<(), CollaboratorError>;

    async fn cleanup_expired_entries(&self) -> Result<(), CollaboratorError>;
}

/// Source of access predictions.
#[async_trait]
pub trait PredictiveEngine: Send + Sync {
    async fn predict_next_entity_access(&self) -> Result<Vec<EntityPrediction>, CollaboratorError>;

    async fn generate_entity_heat_map(&self) -> Result<EntityHeatMap, CollaboratorError>;

    /// Refresh learned access patterns. Engines without a learning step keep the default.
    async fn update_domain_patterns(&self) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_type_uses_snake_case_on_the_wire() {
        assert_eq!(serde_json::to_value(ChangeType::StatusChange).unwrap(), "status_change");
        assert_eq!(ChangeType::Update.to_string(), "update");
    }

    #[test]
    fn priorities_are_ordered() {
        assert!(PreloadPriority::High > PreloadPriority::Medium);
        assert!(PreloadPriority::Medium > PreloadPriority::Low);
        assert_eq!(serde_json::to_value(PreloadPriority::High).unwrap(), "high");
    }

    #[test]
    fn project_id_source_falls_back_to_the_entity_id() {
        use chantier_events::{EventDraft, EventType};

        let now = chrono::Utc::now();
        let scoped = EventDraft::new(EventType::TaskOverdue, "task", "t-1")
            .with_project_id("p-1")
            .normalize(now);
        let loose = EventDraft::new(EventType::TaskOverdue, "task", "t-2").normalize(now);

        assert_eq!(IdSource::EntityId.resolve(&scoped), "t-1");
        assert_eq!(IdSource::ProjectOrEntityId.resolve(&scoped), "p-1");
        assert_eq!(IdSource::ProjectOrEntityId.resolve(&loose), "t-2");
    }

    #[test]
    fn heat_map_decodes_camel_case() {
        let map: EntityHeatMap = serde_json::from_str(
            r#"{"hotEntities": [{"entityType": "project", "entityId": "p-1", "accessCount": 42}]}"#,
        )
        .unwrap();
        assert_eq!(map.hot_entities, vec![HotEntity::new("project", "p-1", 42)]);
    }
}
