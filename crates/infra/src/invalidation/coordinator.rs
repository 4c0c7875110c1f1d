use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use chantier_events::{DomainEvent, EventBus, SubscriptionId};

use super::mapping::invalidation_for;
use crate::cache::CacheService;

/// Snapshot of coordinator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationStats {
    pub enabled: bool,
    pub attached: bool,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub ignored_while_disabled: u64,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    ignored: AtomicU64,
}

/// Turns mapped domain events into cache invalidations.
///
/// Every dispatch is a detached task on the captured runtime; `publish` never
/// waits for the cache. Failures are logged and counted, never returned.
pub struct CacheInvalidationCoordinator {
    cache: Arc<dyn CacheService>,
    runtime: Handle,
    enabled: AtomicBool,
    subscription: Mutex<Option<SubscriptionId>>,
    counters: Arc<Counters>,
}

impl CacheInvalidationCoordinator {
    pub fn new(cache: Arc<dyn CacheService>, runtime: Handle) -> Arc<Self> {
        Arc::new(Self {
            cache,
            runtime,
            enabled: AtomicBool::new(true),
            subscription: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        })
    }

    /// Subscribe to every event on `bus`. Attaching twice keeps the first subscription.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> SubscriptionId {
        let mut slot = self.subscription.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = *slot {
            return id;
        }

        let this = Arc::clone(self);
        let id = bus.subscribe_fn(
            move |event| {
                this.handle_event(event);
                Ok(())
            },
            None,
        );
        *slot = Some(id);
        info!(subscription_id = %id, "cache invalidation coordinator attached");
        id
    }

    /// Unsubscribe from `bus`. Returns `false` when not attached.
    pub fn detach(&self, bus: &EventBus) -> bool {
        let taken = self.subscription.lock().unwrap_or_else(PoisonError::into_inner).take();
        match taken {
            Some(id) => {
                info!(subscription_id = %id, "cache invalidation coordinator detached");
                bus.unsubscribe(id)
            }
            None => false,
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "cache invalidation toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Dispatch the invalidation `event` maps to, if any.
    ///
    /// Returns the spawned task so callers outside the bus can await it.
    pub fn handle_event(&self, event: &DomainEvent) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let instruction = invalidation_for(event)?;
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        debug!(
            event_type = %event.event_type(),
            entity_type = instruction.entity_type,
            entity_id = %instruction.entity_id,
            change_type = %instruction.change_type,
            "dispatching cache invalidation"
        );

        let cache = Arc::clone(&self.cache);
        let counters = Arc::clone(&self.counters);
        let event_type = event.event_type();

        Some(self.runtime.spawn(async move {
            let started = Instant::now();
            let result = cache
                .invalidate_on_entity_change(
                    instruction.entity_type,
                    &instruction.entity_id,
                    instruction.change_type,
                    &instruction.context,
                )
                .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        event_type = %event_type,
                        entity_id = %instruction.entity_id,
                        elapsed_ms,
                        "cache invalidated"
                    );
                }
                Err(err) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        event_type = %event_type,
                        entity_type = instruction.entity_type,
                        entity_id = %instruction.entity_id,
                        elapsed_ms,
                        error = %err,
                        "cache invalidation failed"
                    );
                }
            }
        }))
    }

    pub fn stats(&self) -> InvalidationStats {
        InvalidationStats {
            enabled: self.is_enabled(),
            attached: self.subscription.lock().unwrap_or_else(PoisonError::into_inner).is_some(),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            ignored_while_disabled: self.counters.ignored.load(Ordering::Relaxed),
        }
    }
}

impl core::fmt::Debug for CacheInvalidationCoordinator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CacheInvalidationCoordinator")
            .field("stats", &self.stats())
            .finish()
    }
}
