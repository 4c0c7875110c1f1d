//! Cache invalidation driven by domain events.

pub mod coordinator;
pub mod mapping;

pub use coordinator::{CacheInvalidationCoordinator, InvalidationStats};
pub use mapping::{
    INVALIDATION_RULES, InvalidationInstruction, InvalidationRule, additional_context,
    invalidation_for, rule_for,
};
