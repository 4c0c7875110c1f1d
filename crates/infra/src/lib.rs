//! Infrastructure layer: cache collaborators, invalidation, predictive preloading.

pub mod cache;
pub mod config;
pub mod invalidation;
pub mod preload;
pub mod service;

mod integration_tests;

pub use cache::{
    CacheService, ChangeType, CollaboratorError, EntityHeatMap, EntityPrediction, HotEntity,
    IdSource, InMemoryCacheService, InMemoryPredictiveEngine, PredictiveEngine, PreloadPriority,
};
pub use config::{ChantierConfig, ConfigError, CycleSettings, HourWindow, PreloadConfig};
pub use invalidation::{CacheInvalidationCoordinator, InvalidationStats};
pub use preload::{BackgroundStats, CycleKind, PreloadScheduler, SchedulerError, ShutdownReport};
pub use service::CoordinationService;
