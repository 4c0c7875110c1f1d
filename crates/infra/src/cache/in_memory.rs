//! Recording collaborators for tests and local runs.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::{
    CacheService, ChangeType, CollaboratorError, EntityHeatMap, EntityPrediction, PredictiveEngine,
    PreloadPriority,
};

/// Operation kinds of [`CacheService`], used for failure injection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    Invalidate,
    Preload,
    IntegrateHeatMap,
    OptimizeLru,
    CleanupExpired,
}

/// One recorded call against [`InMemoryCacheService`].
#[derive(Debug, Clone, PartialEq)]
pub enum CacheCall {
    Invalidate {
        entity_type: String,
        entity_id: String,
        change_type: ChangeType,
        context: JsonValue,
    },
    Preload {
        entity_type: String,
        entity_id: String,
        context_hint: Option<String>,
        priority: PreloadPriority,
    },
    IntegrateHeatMap,
    OptimizeLru,
    CleanupExpired,
}

impl CacheCall {
    pub fn operation(&self) -> CacheOperation {
        match self {
            CacheCall::Invalidate { .. } => CacheOperation::Invalidate,
            CacheCall::Preload { .. } => CacheOperation::Preload,
            CacheCall::IntegrateHeatMap => CacheOperation::IntegrateHeatMap,
            CacheCall::OptimizeLru => CacheOperation::OptimizeLru,
            CacheCall::CleanupExpired => CacheOperation::CleanupExpired,
        }
    }
}

/// Cache service that records every call and never stores anything.
///
/// Calls are recorded before failure injection is applied, so a failed call
/// still shows up in [`calls`](Self::calls).
#[derive(Debug, Default)]
pub struct InMemoryCacheService {
    calls: Mutex<Vec<CacheCall>>,
    failing_entities: Mutex<HashSet<String>>,
    failing_operations: Mutex<HashSet<CacheOperation>>,
}

impl InMemoryCacheService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make invalidations and preloads targeting `entity_id` fail.
    pub fn fail_entity(&self, entity_id: impl Into<String>) {
        lock(&self.failing_entities).insert(entity_id.into());
    }

    /// Make every call of the given kind fail.
    pub fn fail_operation(&self, op: CacheOperation) {
        lock(&self.failing_operations).insert(op);
    }

    pub fn heal(&self) {
        lock(&self.failing_entities).clear();
        lock(&self.failing_operations).clear();
    }

    pub fn calls(&self) -> Vec<CacheCall> {
        lock(&self.calls).clone()
    }

    pub fn invalidations(&self) -> Vec<CacheCall> {
        self.calls_of(CacheOperation::Invalidate)
    }

    pub fn preloads(&self) -> Vec<CacheCall> {
        self.calls_of(CacheOperation::Preload)
    }

    pub fn calls_of(&self, op: CacheOperation) -> Vec<CacheCall> {
        lock(&self.calls).iter().filter(|c| c.operation() == op).cloned().collect()
    }

    pub fn reset(&self) {
        lock(&self.calls).clear();
    }

    fn record(&self, call: CacheCall, entity_id: Option<&str>) -> Result<(), CollaboratorError> {
        let op = call.operation();
        debug!(operation = ?op, "cache call recorded");
        lock(&self.calls).push(call);

        if lock(&self.failing_operations).contains(&op) {
            return Err(CollaboratorError::cache(format!("{op:?} rejected")));
        }
        if let Some(id) = entity_id {
            if lock(&self.failing_entities).contains(id) {
                return Err(CollaboratorError::cache(format!("entity {id} rejected")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CacheService for InMemoryCacheService {
    async fn invalidate_on_entity_change(
        &self,
        entity_type: &str,
        entity_id: &str,
        change_type: ChangeType,
        context: &JsonValue,
    ) -> Result<(), CollaboratorError> {
        self.record(
            CacheCall::Invalidate {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
                change_type,
                context: context.clone(),
            },
            Some(entity_id),
        )
    }

    async fn preload_context_by_prediction(
        &self,
        entity_type: &str,
        entity_id: &str,
        context_hint: Option<&str>,
        priority: PreloadPriority,
    ) -> Result<bool, CollaboratorError> {
        self.record(
            CacheCall::Preload {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
                context_hint: context_hint.map(str::to_string),
                priority,
            },
            Some(entity_id),
        )?;
        Ok(true)
    }

    async fn integrate_heat_map_data(&self) -> Result<(), CollaboratorError> {
        self.record(CacheCall::IntegrateHeatMap, None)
    }

    async fn optimize_lru_with_predictive_scoring(&self) -> Result<(), CollaboratorError> {
        self.record(CacheCall::OptimizeLru, None)
    }

    async fn cleanup_expired_entries(&self) -> Result<(), CollaboratorError> {
        self.record(CacheCall::CleanupExpired, None)
    }
}

/// Predictive engine returning whatever it was last configured with.
#[derive(Debug, Default)]
pub struct InMemoryPredictiveEngine {
    predictions: RwLock<Vec<EntityPrediction>>,
    heat_map: RwLock<EntityHeatMap>,
    failing: AtomicBool,
    prediction_requests: AtomicU64,
    pattern_updates: AtomicU64,
}

impl InMemoryPredictiveEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_predictions(self, predictions: Vec<EntityPrediction>) -> Self {
        self.set_predictions(predictions);
        self
    }

    pub fn with_heat_map(self, heat_map: EntityHeatMap) -> Self {
        self.set_heat_map(heat_map);
        self
    }

    pub fn set_predictions(&self, predictions: Vec<EntityPrediction>) {
        *self.predictions.write().unwrap_or_else(PoisonError::into_inner) = predictions;
    }

    pub fn set_heat_map(&self, heat_map: EntityHeatMap) {
        *self.heat_map.write().unwrap_or_else(PoisonError::into_inner) = heat_map;
    }

    /// Toggle failure of every engine call.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn prediction_requests(&self) -> u64 {
        self.prediction_requests.load(Ordering::SeqCst)
    }

    pub fn pattern_updates(&self) -> u64 {
        self.pattern_updates.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), CollaboratorError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CollaboratorError::prediction("engine offline"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PredictiveEngine for InMemoryPredictiveEngine {
    async fn predict_next_entity_access(&self) -> Result<Vec<EntityPrediction>, CollaboratorError> {
        self.prediction_requests.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.predictions.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn generate_entity_heat_map(&self) -> Result<EntityHeatMap, CollaboratorError> {
        self.check()?;
        Ok(self.heat_map.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn update_domain_patterns(&self) -> Result<(), CollaboratorError> {
        self.check()?;
        self.pattern_updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn records_calls_in_order() {
        let cache = InMemoryCacheService::new();
        cache
            .invalidate_on_entity_change("offer", "off-1", ChangeType::Update, &json!({}))
            .await
            .unwrap();
        let loaded = cache
            .preload_context_by_prediction("project", "p-1", Some("planning"), PreloadPriority::High)
            .await
            .unwrap();
        cache.optimize_lru_with_predictive_scoring().await.unwrap();

        assert!(loaded);
        let ops: Vec<_> = cache.calls().iter().map(CacheCall::operation).collect();
        assert_eq!(
            ops,
            vec![CacheOperation::Invalidate, CacheOperation::Preload, CacheOperation::OptimizeLru]
        );
        assert_eq!(
            cache.preloads()[0],
            CacheCall::Preload {
                entity_type: "project".into(),
                entity_id: "p-1".into(),
                context_hint: Some("planning".into()),
                priority: PreloadPriority::High,
            }
        );
    }

    #[tokio::test]
    async fn entity_failures_are_recorded_then_returned() {
        let cache = InMemoryCacheService::new();
        cache.fail_entity("p-bad");

        let err = cache
            .preload_context_by_prediction("project", "p-bad", None, PreloadPriority::Low)
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Cache(_)));
        assert_eq!(cache.preloads().len(), 1);

        assert!(cache
            .preload_context_by_prediction("project", "p-ok", None, PreloadPriority::Low)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn operation_failures_can_be_healed() {
        let cache = InMemoryCacheService::new();
        cache.fail_operation(CacheOperation::CleanupExpired);
        assert!(cache.cleanup_expired_entries().await.is_err());

        cache.heal();
        assert!(cache.cleanup_expired_entries().await.is_ok());
    }

    #[tokio::test]
    async fn engine_serves_configured_data_until_failing() {
        let engine = InMemoryPredictiveEngine::new()
            .with_predictions(vec![EntityPrediction::new("offer", "off-1", 90.0)]);

        assert_eq!(engine.predict_next_entity_access().await.unwrap().len(), 1);
        assert!(engine.generate_entity_heat_map().await.unwrap().hot_entities.is_empty());

        engine.set_failing(true);
        assert!(engine.predict_next_entity_access().await.is_err());
        assert!(engine.update_domain_patterns().await.is_err());
        assert_eq!(engine.prediction_requests(), 2);
        assert_eq!(engine.pattern_updates(), 0);
    }
}
