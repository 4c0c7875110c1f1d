//! Domain events and the in-process event bus.
//!
//! - [`event`]: the published event shape and its taxonomy
//! - [`envelope`]: producer drafts and normalization
//! - [`filter`] / [`history`]: subscription predicates and bounded replay
//! - [`bus`]: the publish/subscribe registry
//! - [`severity`] / [`factory`]: producer-side helpers

pub mod bus;
pub mod envelope;
pub mod event;
pub mod factory;
pub mod filter;
pub mod history;
pub mod severity;

pub use bus::{BusStats, EventBus, EventHandler, EventPublisher, SubscriptionInfo};
pub use envelope::{EventDraft, UNKNOWN_ENTITY};
pub use event::{DomainEvent, EventType, Severity};
pub use factory::EventFactory;
pub use filter::EventFilter;
pub use history::{DEFAULT_HISTORY_CAPACITY, EventHistory};
pub use severity::SeverityRules;

pub use chantier_core::{EventId, SubscriptionId};
