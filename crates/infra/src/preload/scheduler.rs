use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use chantier_events::{DomainEvent, EventBus, SubscriptionId};

use super::chains::{ChainDefinition, PreloadTask, default_chains};
use super::clock::{Clock, SystemClock};
use super::cycles::{CadenceEntry, CycleKind, CycleReport, TOMORROW_MORNING_HINT, TickOutcome, cadence_plan};
use super::pending::{PendingSteps, StepKey};
use super::stats::{BackgroundStats, StatsRecorder};
use crate::cache::{CacheService, CollaboratorError, EntityHeatMap, EntityPrediction, PredictiveEngine, PreloadPriority};
use crate::config::PreloadConfig;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("preload scheduler already started")]
    AlreadyStarted,

    #[error("preload scheduler has no {0} attached")]
    MissingCollaborator(&'static str),

    #[error("preload scheduler must be started inside a tokio runtime")]
    NoRuntime,
}

/// Current values of the scheduler's toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadFlags {
    pub predictive_triggers: bool,
    pub business_hours: bool,
    pub weekend_warming: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownReport {
    pub cadences_stopped: usize,
    pub chains_unsubscribed: usize,
    pub steps_cancelled: usize,
}

#[derive(Debug)]
struct Flags {
    predictive_triggers: AtomicBool,
    business_hours: AtomicBool,
    weekend_warming: AtomicBool,
}

impl Flags {
    fn from_config(cfg: &PreloadConfig) -> Self {
        Self {
            predictive_triggers: AtomicBool::new(cfg.predictive_triggers_enabled),
            business_hours: AtomicBool::new(cfg.business_hours_enabled),
            weekend_warming: AtomicBool::new(cfg.weekend_warming_enabled),
        }
    }

    fn predictive(&self) -> bool {
        self.predictive_triggers.load(Ordering::SeqCst)
    }

    fn allows(&self, kind: CycleKind) -> bool {
        self.predictive()
            && match kind {
                CycleKind::BusinessHours | CycleKind::PeakHours => self.business_hours.load(Ordering::SeqCst),
                CycleKind::WeekendWarming => self.weekend_warming.load(Ordering::SeqCst),
                CycleKind::NightlyMaintenance => true,
            }
    }

    fn snapshot(&self) -> PreloadFlags {
        PreloadFlags {
            predictive_triggers: self.predictive(),
            business_hours: self.business_hours.load(Ordering::SeqCst),
            weekend_warming: self.weekend_warming.load(Ordering::SeqCst),
        }
    }
}

#[derive(Clone)]
struct Collaborators {
    cache: Arc<dyn CacheService>,
    engine: Arc<dyn PredictiveEngine>,
}

struct SchedulerCore {
    config: PreloadConfig,
    clock: Arc<dyn Clock>,
    flags: Flags,
    cache: RwLock<Option<Arc<dyn CacheService>>>,
    engine: RwLock<Option<Arc<dyn PredictiveEngine>>>,
    pending: PendingSteps,
    stats: StatsRecorder,
}

struct Running {
    cadences: Vec<JoinHandle<()>>,
    chain_subscriptions: Vec<SubscriptionId>,
    shutdown: Arc<Notify>,
}

/// Warms the cache ahead of demand.
///
/// Two independent modes share one set of collaborators:
/// - fixed-cadence cycles, each gated by flags and a local-time window;
/// - event-triggered chains, installed as bus subscriptions, that schedule
///   delayed one-shot preloads.
///
/// Steps already scheduled fire even if the flags are switched off afterwards;
/// only [`shutdown`](Self::shutdown) cancels them. Dropping a started
/// scheduler without `shutdown` also cancels them, and its chain
/// subscriptions, which hold only a weak reference, stop scheduling anything
/// new. They stay registered on the bus until it is cleared.
pub struct PreloadScheduler {
    core: Arc<SchedulerCore>,
    running: Mutex<Option<Running>>,
}

impl PreloadScheduler {
    pub fn new(config: PreloadConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: PreloadConfig, clock: Arc<dyn Clock>) -> Self {
        let flags = Flags::from_config(&config);
        Self {
            core: Arc::new(SchedulerCore {
                config,
                clock,
                flags,
                cache: RwLock::new(None),
                engine: RwLock::new(None),
                pending: PendingSteps::new(),
                stats: StatsRecorder::default(),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PreloadConfig {
        &self.core.config
    }

    pub fn attach_cache_service(&self, cache: Arc<dyn CacheService>) {
        *self.core.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(cache);
    }

    pub fn attach_predictive_engine(&self, engine: Arc<dyn PredictiveEngine>) {
        *self.core.engine.write().unwrap_or_else(PoisonError::into_inner) = Some(engine);
    }

    /// Install cadence timers and chain subscriptions on `bus`.
    ///
    /// Must be called from within a tokio runtime; spawned work stays on it.
    pub fn start(&self, bus: &EventBus) -> Result<(), SchedulerError> {
        let mut running = self.lock_running();
        if running.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }
        let collab = self.core.collaborators()?;
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let shutdown = Arc::new(Notify::new());
        let cadences: Vec<JoinHandle<()>> = cadence_plan(&self.core.config)
            .into_iter()
            .map(|entry| {
                runtime.spawn(run_cadence(
                    Arc::clone(&self.core),
                    collab.clone(),
                    entry,
                    Arc::clone(&shutdown),
                ))
            })
            .collect();

        let chain_subscriptions: Vec<SubscriptionId> = default_chains()
            .into_iter()
            .map(|chain| {
                let core = Arc::downgrade(&self.core);
                let cache = Arc::clone(&collab.cache);
                let runtime = runtime.clone();
                let filter = chain.filter();
                bus.subscribe_fn(
                    move |event| {
                        if let Some(core) = Weak::upgrade(&core) {
                            core.trigger_chain(&chain, event, &cache, &runtime);
                        }
                        Ok(())
                    },
                    Some(filter),
                )
            })
            .collect();

        self.core.stats.started();
        info!(
            cadences = cadences.len(),
            chains = chain_subscriptions.len(),
            "preload scheduler started"
        );
        *running = Some(Running {
            cadences,
            chain_subscriptions,
            shutdown,
        });
        Ok(())
    }

    /// Stop every timer, unsubscribe the chains and abort pending steps.
    ///
    /// Calling it on a scheduler that is not running is a no-op.
    pub fn shutdown(&self, bus: &EventBus) -> ShutdownReport {
        let Some(running) = self.lock_running().take() else {
            return ShutdownReport::default();
        };

        let chains_unsubscribed = running
            .chain_subscriptions
            .iter()
            .filter(|id| bus.unsubscribe(**id))
            .count();

        running.shutdown.notify_waiters();
        for handle in &running.cadences {
            handle.abort();
        }

        let steps_cancelled = self.core.pending.cancel_all();
        self.core.stats.stopped(steps_cancelled);

        let report = ShutdownReport {
            cadences_stopped: running.cadences.len(),
            chains_unsubscribed,
            steps_cancelled,
        };
        info!(
            cadences = report.cadences_stopped,
            chains = report.chains_unsubscribed,
            cancelled_steps = report.steps_cancelled,
            "preload scheduler stopped"
        );
        report
    }

    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    /// Run one cycle now, with the same flag and window checks as a timer tick.
    pub async fn run_cycle(&self, kind: CycleKind) -> Result<TickOutcome, SchedulerError> {
        let collab = self.core.collaborators()?;
        Ok(self.core.tick(kind, &collab).await)
    }

    pub fn set_predictive_triggers(&self, enabled: bool) {
        self.core.flags.predictive_triggers.store(enabled, Ordering::SeqCst);
        info!(enabled, "predictive preloading toggled");
    }

    pub fn set_business_hours_preloading(&self, enabled: bool) {
        self.core.flags.business_hours.store(enabled, Ordering::SeqCst);
        info!(enabled, "business-hours preloading toggled");
    }

    pub fn set_weekend_warming(&self, enabled: bool) {
        self.core.flags.weekend_warming.store(enabled, Ordering::SeqCst);
        info!(enabled, "weekend warming toggled");
    }

    pub fn flags(&self) -> PreloadFlags {
        self.core.flags.snapshot()
    }

    pub fn pending_steps(&self) -> usize {
        self.core.pending.len()
    }

    pub fn stats(&self) -> BackgroundStats {
        self.core.stats.snapshot(self.core.pending.len())
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PreloadScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.lock_running().take() {
            running.shutdown.notify_waiters();
            for handle in &running.cadences {
                handle.abort();
            }
        }
        let cancelled = self.core.pending.close();
        if cancelled > 0 {
            debug!(cancelled_steps = cancelled, "preload scheduler dropped with pending steps");
        }
    }
}

impl core::fmt::Debug for PreloadScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PreloadScheduler")
            .field("running", &self.is_running())
            .field("flags", &self.flags())
            .field("pending_steps", &self.pending_steps())
            .finish()
    }
}

async fn run_cadence(core: Arc<SchedulerCore>, collab: Collaborators, entry: CadenceEntry, shutdown: Arc<Notify>) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + entry.every, entry.every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!(cycle = %entry.kind, "cadence stopped");
                break;
            }
            _ = ticker.tick() => {
                core.tick(entry.kind, &collab).await;
            }
        }
    }
}

impl SchedulerCore {
    fn collaborators(&self) -> Result<Collaborators, SchedulerError> {
        let cache = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SchedulerError::MissingCollaborator("cache service"))?;
        let engine = self
            .engine
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SchedulerError::MissingCollaborator("predictive engine"))?;
        Ok(Collaborators { cache, engine })
    }

    async fn tick(&self, kind: CycleKind, collab: &Collaborators) -> TickOutcome {
        if !self.flags.allows(kind) {
            self.stats.cycle_skipped(kind);
            debug!(cycle = %kind, "preload cycle disabled");
            return TickOutcome::Disabled;
        }
        if !kind.in_window(&self.config, self.clock.now()) {
            self.stats.cycle_skipped(kind);
            debug!(cycle = %kind, "preload cycle outside its window");
            return TickOutcome::OutsideWindow;
        }

        let started = Instant::now();
        let mut report = CycleReport::default();
        let result = self.run_action(kind, collab, &mut report).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                self.stats.cycle_completed(kind, &report);
                info!(
                    cycle = %kind,
                    candidates = report.candidates,
                    preloaded = report.preloaded,
                    failed = report.failed,
                    elapsed_ms,
                    "preload cycle completed"
                );
                TickOutcome::Completed(report)
            }
            Err(err) => {
                self.stats.cycle_failed(kind, &report);
                warn!(cycle = %kind, elapsed_ms, error = %err, "preload cycle failed");
                TickOutcome::Failed(err.to_string())
            }
        }
    }

    async fn run_action(
        &self,
        kind: CycleKind,
        c: &Collaborators,
        report: &mut CycleReport,
    ) -> Result<(), CollaboratorError> {
        let cfg = &self.config;
        let limit = kind.settings(cfg).limit;

        match kind {
            CycleKind::BusinessHours => {
                let predictions = c.engine.predict_next_entity_access().await?;
                let targets = top_predictions(predictions, cfg.min_confidence, limit);
                preload_batch(kind, c.cache.as_ref(), targets, None, PreloadPriority::Medium, report).await;
                c.cache.integrate_heat_map_data().await?;
            }
            CycleKind::WeekendWarming => {
                let heat_map = c.engine.generate_entity_heat_map().await?;
                let targets = hottest_entities(heat_map, cfg.hot_entity_min_access, limit);
                preload_batch(kind, c.cache.as_ref(), targets, None, PreloadPriority::Low, report).await;
                c.cache.optimize_lru_with_predictive_scoring().await?;
            }
            CycleKind::PeakHours => {
                let predictions = c.engine.predict_next_entity_access().await?;
                let targets = top_predictions(predictions, cfg.peak_min_confidence, limit);
                preload_batch(kind, c.cache.as_ref(), targets, None, PreloadPriority::High, report).await;
                c.cache.optimize_lru_with_predictive_scoring().await?;
            }
            CycleKind::NightlyMaintenance => {
                c.cache.cleanup_expired_entries().await?;
                c.engine.update_domain_patterns().await?;
                let predictions = c.engine.predict_next_entity_access().await?;
                let targets = top_predictions(predictions, cfg.min_confidence, limit);
                preload_batch(
                    kind,
                    c.cache.as_ref(),
                    targets,
                    Some(TOMORROW_MORNING_HINT),
                    PreloadPriority::Low,
                    report,
                )
                .await;
            }
        }
        Ok(())
    }

    fn trigger_chain(
        self: &Arc<Self>,
        chain: &ChainDefinition,
        event: &DomainEvent,
        cache: &Arc<dyn CacheService>,
        runtime: &Handle,
    ) {
        if self.pending.is_closed() {
            return;
        }
        if !self.flags.predictive() {
            self.stats.chain_ignored(chain.name);
            debug!(chain = chain.name, event_id = %event.id(), "preload chain disabled");
            return;
        }

        let tasks = chain.plan(event);
        self.stats.chain_triggered(chain.name, tasks.len());
        debug!(
            chain = chain.name,
            event_id = %event.id(),
            event_type = %event.event_type(),
            steps = tasks.len(),
            "preload chain triggered"
        );

        let dispatch = self.pending.next_dispatch();
        for (index, task) in tasks.into_iter().enumerate() {
            let key = StepKey::new(event.id(), dispatch, index);
            let core = Arc::clone(self);
            let cache = Arc::clone(cache);
            let chain_name = chain.name;
            self.pending.track(key, move || {
                runtime.spawn(async move {
                    tokio::time::sleep(task.delay).await;
                    core.run_step(chain_name, &task, cache.as_ref()).await;
                    core.pending.complete(key);
                })
            });
        }
    }

    async fn run_step(&self, chain: &'static str, task: &PreloadTask, cache: &dyn CacheService) {
        let started = Instant::now();
        let result = cache
            .preload_context_by_prediction(
                &task.entity_type,
                &task.entity_id,
                task.context_hint.as_deref(),
                task.priority,
            )
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(loaded) => {
                self.stats.step_finished(chain, true);
                debug!(
                    chain,
                    entity_type = %task.entity_type,
                    entity_id = %task.entity_id,
                    loaded,
                    elapsed_ms,
                    "chained preload done"
                );
            }
            Err(err) => {
                self.stats.step_finished(chain, false);
                warn!(
                    chain,
                    entity_type = %task.entity_type,
                    entity_id = %task.entity_id,
                    elapsed_ms,
                    error = %err,
                    "chained preload failed"
                );
            }
        }
    }
}

/// Predictions at or above `min_confidence`, most confident first.
fn top_predictions(mut predictions: Vec<EntityPrediction>, min_confidence: f64, limit: usize) -> Vec<(String, String)> {
    predictions.retain(|p| p.confidence >= min_confidence);
    predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    predictions
        .into_iter()
        .take(limit)
        .map(|p| (p.entity_type, p.entity_id))
        .collect()
}

/// Hot entities at or above `min_access`, most accessed first.
fn hottest_entities(heat_map: EntityHeatMap, min_access: u64, limit: usize) -> Vec<(String, String)> {
    let mut hot = heat_map.hot_entities;
    hot.retain(|h| h.access_count >= min_access);
    hot.sort_by(|a, b| b.access_count.cmp(&a.access_count));
    hot.into_iter()
        .take(limit)
        .map(|h| (h.entity_type, h.entity_id))
        .collect()
}

async fn preload_batch(
    kind: CycleKind,
    cache: &dyn CacheService,
    targets: Vec<(String, String)>,
    context_hint: Option<&str>,
    priority: PreloadPriority,
    report: &mut CycleReport,
) {
    report.candidates += targets.len();
    for (entity_type, entity_id) in targets {
        match cache
            .preload_context_by_prediction(&entity_type, &entity_id, context_hint, priority)
            .await
        {
            Ok(true) => report.preloaded += 1,
            Ok(false) => {}
            Err(err) => {
                report.failed += 1;
                warn!(cycle = %kind, entity_type = %entity_type, entity_id = %entity_id, error = %err, "cycle preload failed");
            }
        }
    }
}
