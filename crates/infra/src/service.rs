//! Wiring of bus, invalidation coordinator and preload scheduler.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::info;

use chantier_events::EventBus;

use crate::cache::{CacheService, PredictiveEngine};
use crate::config::ChantierConfig;
use crate::invalidation::CacheInvalidationCoordinator;
use crate::preload::{Clock, PreloadScheduler, SchedulerError, ShutdownReport, SystemClock};

/// Running coordination stack.
///
/// Dropping it without [`shutdown`](Self::shutdown) stops the scheduler's
/// timers and cancels its pending chain steps; its chain subscriptions stay on
/// the bus but schedule nothing. The invalidation coordinator stays attached
/// for as long as another handle to the bus keeps it alive.
#[derive(Debug)]
pub struct CoordinationService {
    bus: Arc<EventBus>,
    coordinator: Arc<CacheInvalidationCoordinator>,
    scheduler: PreloadScheduler,
}

impl CoordinationService {
    /// Build a bus sized from `config` and start everything on the current runtime.
    pub fn start(
        config: ChantierConfig,
        cache: Arc<dyn CacheService>,
        engine: Arc<dyn PredictiveEngine>,
    ) -> Result<Self, SchedulerError> {
        Self::start_with_clock(config, cache, engine, Arc::new(SystemClock))
    }

    pub fn start_with_clock(
        config: ChantierConfig,
        cache: Arc<dyn CacheService>,
        engine: Arc<dyn PredictiveEngine>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        let bus = Arc::new(EventBus::with_capacity(config.event_history_size));

        let coordinator = CacheInvalidationCoordinator::new(Arc::clone(&cache), runtime);
        coordinator.set_enabled(config.invalidation_enabled);
        coordinator.attach(&bus);

        let scheduler = PreloadScheduler::with_clock(config.preload, clock);
        scheduler.attach_cache_service(cache);
        scheduler.attach_predictive_engine(engine);
        if let Err(err) = scheduler.start(&bus) {
            coordinator.detach(&bus);
            return Err(err);
        }

        info!(
            history_capacity = config.event_history_size,
            invalidation_enabled = config.invalidation_enabled,
            "coordination service started"
        );
        Ok(Self {
            bus,
            coordinator,
            scheduler,
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn coordinator(&self) -> &Arc<CacheInvalidationCoordinator> {
        &self.coordinator
    }

    pub fn scheduler(&self) -> &PreloadScheduler {
        &self.scheduler
    }

    /// Stop the scheduler, detach the coordinator and clear the bus.
    pub fn shutdown(self) -> ShutdownReport {
        let report = self.scheduler.shutdown(&self.bus);
        self.coordinator.detach(&self.bus);
        self.bus.clear();
        info!(cancelled_steps = report.steps_cancelled, "coordination service stopped");
        report
    }
}
