//! `chantier-core`: shared building blocks for the cache coordination core.
//!
//! This crate holds identifiers and the error model used by the event bus and
//! the infrastructure layer. No IO, no async.

pub mod error;
pub mod id;

pub use error::{CoreError, CoreResult};
pub use id::{EventId, SubscriptionId};
