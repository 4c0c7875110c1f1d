//! Static event-type → cache invalidation table.

use serde_json::{Map, Value as JsonValue, json};

use chantier_events::{DomainEvent, EventType};

use crate::cache::{ChangeType, IdSource};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InvalidationRule {
    pub event_type: EventType,
    pub entity_type: &'static str,
    pub id_source: IdSource,
    pub change_type: ChangeType,
}

const fn rule(
    event_type: EventType,
    entity_type: &'static str,
    id_source: IdSource,
    change_type: ChangeType,
) -> InvalidationRule {
    InvalidationRule {
        event_type,
        entity_type,
        id_source,
        change_type,
    }
}

pub const INVALIDATION_RULES: [InvalidationRule; 9] = [
    rule(EventType::AoStatusChanged, "ao", IdSource::EntityId, ChangeType::StatusChange),
    rule(EventType::OfferStatusChanged, "offer", IdSource::EntityId, ChangeType::StatusChange),
    rule(EventType::OfferSigned, "offer", IdSource::EntityId, ChangeType::Update),
    rule(EventType::OfferValidated, "offer", IdSource::EntityId, ChangeType::Update),
    rule(EventType::ProjectCreated, "project", IdSource::EntityId, ChangeType::Update),
    rule(EventType::ProjectStatusChanged, "project", IdSource::EntityId, ChangeType::StatusChange),
    rule(EventType::SupplierQuoteReceived, "supplier", IdSource::EntityId, ChangeType::Update),
    rule(EventType::TaskStatusChanged, "project", IdSource::ProjectOrEntityId, ChangeType::Update),
    rule(EventType::TaskOverdue, "project", IdSource::ProjectOrEntityId, ChangeType::Update),
];

pub fn rule_for(event_type: EventType) -> Option<&'static InvalidationRule> {
    INVALIDATION_RULES.iter().find(|r| r.event_type == event_type)
}

/// A resolved cache invalidation, ready to hand to a `CacheService`.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidationInstruction {
    pub entity_type: &'static str,
    pub entity_id: String,
    pub change_type: ChangeType,
    pub context: JsonValue,
}

/// Resolve the invalidation an event calls for, if any.
///
/// Pure: equal events always yield equal instructions.
pub fn invalidation_for(event: &DomainEvent) -> Option<InvalidationInstruction> {
    let rule = rule_for(event.event_type())?;
    Some(InvalidationInstruction {
        entity_type: rule.entity_type,
        entity_id: rule.id_source.resolve(event).to_string(),
        change_type: rule.change_type,
        context: additional_context(event),
    })
}

/// Context object sent along with an invalidation. Absent fields are omitted.
pub fn additional_context(event: &DomainEvent) -> JsonValue {
    let mut ctx = Map::new();
    ctx.insert("eventType".into(), json!(event.event_type().as_str()));
    ctx.insert("eventId".into(), json!(event.id().to_string()));

    let optional = [
        ("prevStatus", event.prev_status()),
        ("newStatus", event.new_status()),
        ("userId", event.user_id()),
    ];
    for (key, value) in optional {
        if let Some(v) = value {
            ctx.insert(key.into(), json!(v));
        }
    }

    ctx.insert("sourceEntity".into(), json!(event.entity()));
    ctx.insert("sourceEntityId".into(), json!(event.entity_id()));
    if !event.affected_query_keys().is_empty() {
        ctx.insert("affectedQueryKeys".into(), json!(event.affected_query_keys()));
    }
    if !event.metadata().is_empty() {
        ctx.insert("metadata".into(), JsonValue::Object(event.metadata().clone()));
    }
    JsonValue::Object(ctx)
}
