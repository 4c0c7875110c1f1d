//! In-process publish/subscribe bus with bounded replay history.
//!
//! The bus is a plain registry of `{id, filter, handler}` entries that is
//! walked on every publish. Delivery is synchronous, on the publisher's
//! thread, in registration order:
//!
//! ```text
//! publish(draft) → normalize → history.push → for each matching entry: handler(&event)
//! ```
//!
//! ## Failure isolation
//!
//! A handler returning `Err` or panicking is logged and skipped; remaining
//! handlers still run and `publish` never fails for the producer. Handlers
//! that need to do slow or async work must detach it themselves (spawn a
//! task) so `publish` stays non-blocking.
//!
//! ## Locking
//!
//! The registry lock is released before handlers run, so a handler may
//! publish, subscribe or unsubscribe re-entrantly. Each entry carries an
//! `active` flag that is re-checked right before invocation. An entry
//! removed on the publishing thread (including from inside another handler
//! of the same publish) is never called again. A concurrent `unsubscribe`
//! from another thread races with an in-flight publish and may still see
//! one last delivery.
//!
//! Lock poisoning is recovered from; the guarded data is only ever replaced
//! wholesale, never left half-written.

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, warn};

use chantier_core::SubscriptionId;

use crate::envelope::EventDraft;
use crate::event::DomainEvent;
use crate::filter::EventFilter;
use crate::history::{DEFAULT_HISTORY_CAPACITY, EventHistory};

/// Subscriber callback.
///
/// Shared (`Arc`) so the same handler can be registered under several
/// subscriptions, e.g. with different filters.
pub type EventHandler = Arc<dyn Fn(&DomainEvent) -> anyhow::Result<()> + Send + Sync>;

/// Public view of a registered subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub filter: Option<EventFilter>,
    pub subscribed_at: DateTime<Utc>,
}

/// Observability snapshot of a bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStats {
    /// Registered subscriptions.
    pub subscriptions_count: usize,
    /// Events currently retained for replay.
    pub history_size: usize,
    /// Distinct handler references across all subscriptions.
    pub listeners_count: usize,
    /// Events accepted since construction (or the last `clear`).
    pub published_count: u64,
    /// Handler invocations that returned an error or panicked.
    pub handler_failures: u64,
}

struct SubscriptionEntry {
    id: SubscriptionId,
    handler: EventHandler,
    filter: Option<EventFilter>,
    subscribed_at: DateTime<Utc>,
    active: AtomicBool,
}

impl SubscriptionEntry {
    fn accepts(&self, event: &DomainEvent) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(event))
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            id: self.id,
            filter: self.filter.clone(),
            subscribed_at: self.subscribed_at,
        }
    }
}

/// The event bus.
///
/// Construct one per process (or per tenant) and share it by `Arc`; there is
/// no global instance.
pub struct EventBus {
    subscriptions: RwLock<Vec<Arc<SubscriptionEntry>>>,
    history: RwLock<EventHistory>,
    published: AtomicU64,
    handler_failures: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a bus retaining at most `max_history` events for replay.
    pub fn with_capacity(max_history: usize) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            history: RwLock::new(EventHistory::new(max_history)),
            published: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Publish an event to history and every matching subscriber.
    ///
    /// Missing required fields are defaulted (see [`EventDraft::normalize`]).
    /// Returns the event as it was delivered, including its assigned id.
    pub fn publish(&self, event: impl Into<EventDraft>) -> DomainEvent {
        let event = event.into().normalize(Utc::now());

        self.write_history().push(event.clone());
        self.published.fetch_add(1, Ordering::Relaxed);

        let targets: Vec<Arc<SubscriptionEntry>> = self
            .read_subscriptions()
            .iter()
            .filter(|entry| entry.accepts(&event))
            .cloned()
            .collect();

        debug!(
            event_id = %event.id(),
            event_type = %event.event_type(),
            entity = event.entity(),
            entity_id = event.entity_id(),
            subscribers = targets.len(),
            "publishing domain event"
        );

        for entry in targets {
            if entry.is_active() {
                self.deliver(&entry, &event);
            }
        }

        event
    }

    fn deliver(&self, entry: &SubscriptionEntry, event: &DomainEvent) {
        match catch_unwind(AssertUnwindSafe(|| (entry.handler)(event))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                self.handler_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    subscription_id = %entry.id,
                    event_id = %event.id(),
                    event_type = %event.event_type(),
                    error = %err,
                    "event handler failed"
                );
            }
            Err(panic) => {
                self.handler_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    subscription_id = %entry.id,
                    event_id = %event.id(),
                    event_type = %event.event_type(),
                    panic = panic_message(&*panic),
                    "event handler panicked"
                );
            }
        }
    }

    /// Register a handler, optionally restricted by `filter`.
    pub fn subscribe(&self, handler: EventHandler, filter: Option<EventFilter>) -> SubscriptionId {
        let entry = Arc::new(SubscriptionEntry {
            id: SubscriptionId::new(),
            handler,
            filter,
            subscribed_at: Utc::now(),
            active: AtomicBool::new(true),
        });
        let id = entry.id;

        self.write_subscriptions().push(entry);
        debug!(subscription_id = %id, "subscription registered");
        id
    }

    /// Convenience for closures that are not shared.
    pub fn subscribe_fn<F>(&self, handler: F, filter: Option<EventFilter>) -> SubscriptionId
    where
        F: Fn(&DomainEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(handler), filter)
    }

    /// Remove a subscription. Returns `false` if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut subs = self.write_subscriptions();
            subs.iter()
                .position(|entry| entry.id == id)
                .map(|pos| subs.remove(pos))
        };

        match removed {
            Some(entry) => {
                entry.active.store(false, Ordering::Release);
                debug!(subscription_id = %id, "subscription removed");
                true
            }
            None => false,
        }
    }

    pub fn subscription(&self, id: SubscriptionId) -> Option<SubscriptionInfo> {
        self.read_subscriptions()
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.info())
    }

    /// Registered subscriptions, in registration order.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.read_subscriptions().iter().map(|entry| entry.info()).collect()
    }

    /// Snapshot of retained events strictly newer than `since` and matching
    /// `filter`, oldest first.
    pub fn recent_events(&self, since: Option<DateTime<Utc>>, filter: Option<&EventFilter>) -> Vec<DomainEvent> {
        self.read_history().select(since, filter)
    }

    pub fn stats(&self) -> BusStats {
        let subs = self.read_subscriptions();
        let listeners: HashSet<*const ()> = subs
            .iter()
            .map(|entry| Arc::as_ptr(&entry.handler) as *const ())
            .collect();

        BusStats {
            subscriptions_count: subs.len(),
            history_size: self.read_history().len(),
            listeners_count: listeners.len(),
            published_count: self.published.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }

    /// Teardown: drop every subscription and clear history.
    pub fn clear(&self) {
        let removed: Vec<_> = std::mem::take(&mut *self.write_subscriptions());
        for entry in &removed {
            entry.active.store(false, Ordering::Release);
        }
        self.write_history().clear();
        self.published.store(0, Ordering::Relaxed);
        self.handler_failures.store(0, Ordering::Relaxed);
        debug!(removed = removed.len(), "event bus cleared");
    }

    fn read_subscriptions(&self) -> RwLockReadGuard<'_, Vec<Arc<SubscriptionEntry>>> {
        self.subscriptions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_subscriptions(&self) -> RwLockWriteGuard<'_, Vec<Arc<SubscriptionEntry>>> {
        self.subscriptions.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_history(&self) -> RwLockReadGuard<'_, EventHistory> {
        self.history.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_history(&self) -> RwLockWriteGuard<'_, EventHistory> {
        self.history.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus").field("stats", &self.stats()).finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Publishing side of the bus, for producers that should not see subscribers.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: EventDraft) -> DomainEvent;
}

impl EventPublisher for EventBus {
    fn publish(&self, event: EventDraft) -> DomainEvent {
        EventBus::publish(self, event)
    }
}

impl<P> EventPublisher for Arc<P>
where
    P: EventPublisher + ?Sized,
{
    fn publish(&self, event: EventDraft) -> DomainEvent {
        (**self).publish(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::event::{EventType, Severity};

    fn recorder() -> (EventHandler, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: EventHandler = Arc::new(move |ev: &DomainEvent| {
            sink.lock().unwrap().push(ev.entity_id().to_string());
            Ok(())
        });
        (handler, seen)
    }

    fn draft(t: EventType, entity: &str, id: &str) -> EventDraft {
        EventDraft::new(t, entity, id)
    }

    #[test]
    fn published_event_is_replayable() {
        let bus = EventBus::new();
        let ev = bus.publish(draft(EventType::OfferSigned, "offer", "off-1").with_severity(Severity::Success));

        let recent = bus.recent_events(None, Some(&EventFilter::all().entity_ids(["off-1"])));
        assert_eq!(recent, vec![ev]);
    }

    #[test]
    fn history_is_bounded_and_evicts_first_published() {
        let bus = EventBus::with_capacity(100);
        for n in 0..101 {
            bus.publish(draft(EventType::TaskCreated, "task", &format!("t-{n}")));
        }

        let recent = bus.recent_events(None, None);
        assert_eq!(recent.len(), 100);
        assert!(recent.iter().all(|e| e.entity_id() != "t-0"));
        let ids: Vec<_> = recent.iter().map(|e| e.entity_id().to_string()).collect();
        let expected: Vec<_> = (1..101).map(|n| format!("t-{n}")).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn delivers_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            bus.subscribe_fn(
                move |_| {
                    order.lock().unwrap().push(tag);
                    Ok(())
                },
                None,
            );
        }

        bus.publish(draft(EventType::AoCreated, "ao", "ao-1"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn filter_restricts_delivery() {
        let bus = EventBus::new();
        let (handler, seen) = recorder();
        bus.subscribe(handler, Some(EventFilter::all().entities(["offer"])));

        bus.publish(draft(EventType::ProjectCreated, "project", "p-1"));
        bus.publish(draft(EventType::OfferCreated, "offer", "off-1"));

        assert_eq!(*seen.lock().unwrap(), vec!["off-1"]);
    }

    #[test]
    fn unsubscribed_handler_is_never_invoked_again() {
        let bus = EventBus::new();
        let (handler, seen) = recorder();
        let id = bus.subscribe(handler, None);

        bus.publish(draft(EventType::AoCreated, "ao", "ao-1"));
        assert!(bus.unsubscribe(id));
        bus.publish(draft(EventType::AoCreated, "ao", "ao-2"));

        assert_eq!(*seen.lock().unwrap(), vec!["ao-1"]);
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn unsubscribe_during_publish_stops_pending_delivery() {
        let bus = Arc::new(EventBus::new());
        let (victim, seen) = recorder();
        let victim_id = Arc::new(Mutex::new(None::<SubscriptionId>));

        let bus_ref = Arc::downgrade(&bus);
        let slot = victim_id.clone();
        bus.subscribe_fn(
            move |_| {
                if let (Some(bus), Some(id)) = (bus_ref.upgrade(), *slot.lock().unwrap()) {
                    bus.unsubscribe(id);
                }
                Ok(())
            },
            None,
        );
        *victim_id.lock().unwrap() = Some(bus.subscribe(victim, None));

        bus.publish(draft(EventType::AoCreated, "ao", "ao-1"));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(bus.stats().subscriptions_count, 1);
    }

    #[test]
    fn failing_and_panicking_handlers_do_not_block_others() {
        let bus = EventBus::new();
        bus.subscribe_fn(|_| Err(anyhow::anyhow!("boom")), None);
        bus.subscribe_fn(|_| panic!("handler exploded"), None);
        let (handler, seen) = recorder();
        bus.subscribe(handler, None);

        let ev = bus.publish(draft(EventType::TaskOverdue, "task", "t-1"));

        assert_eq!(*seen.lock().unwrap(), vec!["t-1"]);
        assert_eq!(bus.stats().handler_failures, 2);
        assert_eq!(bus.recent_events(None, None), vec![ev]);
    }

    #[test]
    fn same_handler_under_two_subscriptions() {
        let bus = EventBus::new();
        let (handler, seen) = recorder();
        let a = bus.subscribe(handler.clone(), Some(EventFilter::all().entities(["offer"])));
        bus.subscribe(handler, Some(EventFilter::all().entities(["offer", "project"])));

        let stats = bus.stats();
        assert_eq!(stats.subscriptions_count, 2);
        assert_eq!(stats.listeners_count, 1);

        bus.publish(draft(EventType::OfferSigned, "offer", "off-1"));
        assert_eq!(seen.lock().unwrap().len(), 2);

        bus.unsubscribe(a);
        bus.publish(draft(EventType::OfferSigned, "offer", "off-2"));
        assert_eq!(*seen.lock().unwrap(), vec!["off-1", "off-1", "off-2"]);
    }

    #[test]
    fn handlers_may_publish_reentrantly() {
        let bus = Arc::new(EventBus::new());
        let weak = Arc::downgrade(&bus);
        bus.subscribe_fn(
            move |ev| {
                if let Some(bus) = weak.upgrade() {
                    bus.publish(draft(EventType::AnalyticsCalculated, "analytics", ev.entity_id()));
                }
                Ok(())
            },
            Some(EventFilter::all().event_types([EventType::ProjectCreated])),
        );

        bus.publish(draft(EventType::ProjectCreated, "project", "p-1"));

        let types: Vec<_> = bus.recent_events(None, None).iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec![EventType::ProjectCreated, EventType::AnalyticsCalculated]);
    }

    #[test]
    fn missing_fields_are_defaulted_not_rejected() {
        let bus = EventBus::new();
        let (handler, seen) = recorder();
        bus.subscribe(handler, None);

        let ev = bus.publish(EventDraft::default());
        assert_eq!(ev.event_type(), EventType::Unknown);
        assert_eq!(*seen.lock().unwrap(), vec!["unknown"]);
    }

    #[test]
    fn clear_removes_subscriptions_and_history() {
        let bus = EventBus::new();
        let (handler, seen) = recorder();
        bus.subscribe(handler, None);
        bus.publish(draft(EventType::AoCreated, "ao", "ao-1"));

        bus.clear();
        bus.publish(draft(EventType::AoCreated, "ao", "ao-2"));

        assert_eq!(*seen.lock().unwrap(), vec!["ao-1"]);
        let stats = bus.stats();
        assert_eq!(stats.subscriptions_count, 0);
        assert_eq!(stats.history_size, 1);
    }

    #[test]
    fn publisher_trait_works_through_arc() {
        let bus = Arc::new(EventBus::new());
        let publisher: Arc<dyn EventPublisher> = bus.clone();
        publisher.publish(draft(EventType::AoCreated, "ao", "ao-1"));
        assert_eq!(bus.stats().history_size, 1);
    }
}
