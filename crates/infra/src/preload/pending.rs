//! Registry of chain steps waiting for their delay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::task::{AbortHandle, JoinHandle};

use chantier_events::EventId;

/// `(source event, chain dispatch, step index)`.
///
/// `dispatch` is unique per chain trigger, so an event published twice under
/// the same id still gets distinct keys.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StepKey {
    pub event_id: EventId,
    pub dispatch: u64,
    pub step: usize,
}

impl StepKey {
    pub fn new(event_id: EventId, dispatch: u64, step: usize) -> Self {
        Self {
            event_id,
            dispatch,
            step,
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    steps: HashMap<StepKey, AbortHandle>,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct PendingSteps {
    registry: Mutex<Registry>,
    next_dispatch: AtomicU64,
}

impl PendingSteps {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh dispatch number for [`StepKey`].
    pub fn next_dispatch(&self) -> u64 {
        self.next_dispatch.fetch_add(1, Ordering::Relaxed)
    }

    /// Spawn a step and register it under `key`.
    ///
    /// The registry lock is held across `spawn`, so a task that finishes
    /// immediately cannot call [`complete`](Self::complete) before it is
    /// registered. Returns `false` without spawning once the registry is
    /// [closed](Self::close) or if `key` is already pending.
    pub fn track(&self, key: StepKey, spawn: impl FnOnce() -> JoinHandle<()>) -> bool {
        let mut registry = self.lock();
        if registry.closed || registry.steps.contains_key(&key) {
            return false;
        }
        let handle = spawn();
        registry.steps.insert(key, handle.abort_handle());
        true
    }

    pub fn complete(&self, key: StepKey) -> bool {
        self.lock().steps.remove(&key).is_some()
    }

    /// Abort every registered step. Returns how many were still pending.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<AbortHandle> = self.lock().steps.drain().map(|(_, h)| h).collect();
        abort_all(&drained)
    }

    /// Abort every registered step and refuse new ones from now on.
    pub fn close(&self) -> usize {
        let drained: Vec<AbortHandle> = {
            let mut registry = self.lock();
            registry.closed = true;
            registry.steps.drain().map(|(_, h)| h).collect()
        };
        abort_all(&drained)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn contains(&self, key: &StepKey) -> bool {
        self.lock().steps.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().steps.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn abort_all(handles: &[AbortHandle]) -> usize {
    for handle in handles {
        handle.abort();
    }
    handles.len()
}
