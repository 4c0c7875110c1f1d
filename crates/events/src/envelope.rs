use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use chantier_core::EventId;

use crate::event::{DomainEvent, EventType, Severity};

/// Entity kind / id substituted when a producer leaves them out.
pub const UNKNOWN_ENTITY: &str = "unknown";

/// A producer-side event, before the bus has accepted it.
///
/// Every field is optional. The bus never rejects a draft: missing required
/// scalars are replaced by defaults in [`EventDraft::normalize`]. That keeps the
/// fan-out path available even when a producer is buggy, at the price of
/// masking the bug.
///
/// Deserializing a draft is the lenient way to read the wire format; any
/// subset of fields is accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_query_keys: Option<Vec<Vec<String>>>,

    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, JsonValue>,
}

impl EventDraft {
    /// Start a draft with the three identifying fields set.
    pub fn new(event_type: EventType, entity: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type),
            entity: Some(entity.into()),
            entity_id: Some(entity_id.into()),
            ..Self::default()
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_prev_status(mut self, prev_status: impl Into<String>) -> Self {
        self.prev_status = Some(prev_status.into());
        self
    }

    pub fn with_new_status(mut self, new_status: impl Into<String>) -> Self {
        self.new_status = Some(new_status.into());
        self
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_offer_id(mut self, offer_id: impl Into<String>) -> Self {
        self.offer_id = Some(offer_id.into());
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Append one affected cache key path.
    pub fn with_query_key<I, S>(mut self, key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_query_keys
            .get_or_insert_with(Vec::new)
            .push(key.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Turn the draft into a publishable event, filling every missing
    /// required field with its default.
    ///
    /// Blank `entity` / `entityId` strings count as missing.
    pub fn normalize(self, now: DateTime<Utc>) -> DomainEvent {
        DomainEvent {
            id: self.id.unwrap_or_default(),
            event_type: self.event_type.unwrap_or(EventType::Unknown),
            entity: non_blank(self.entity).unwrap_or_else(|| UNKNOWN_ENTITY.to_string()),
            entity_id: non_blank(self.entity_id).unwrap_or_else(|| UNKNOWN_ENTITY.to_string()),
            severity: self.severity.unwrap_or_default(),
            timestamp: self.timestamp.unwrap_or(now),
            prev_status: self.prev_status,
            new_status: self.new_status,
            project_id: self.project_id,
            offer_id: self.offer_id,
            task_id: self.task_id,
            user_id: self.user_id,
            title: self.title,
            message: self.message,
            affected_query_keys: self.affected_query_keys.unwrap_or_default(),
            metadata: self.metadata,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl From<DomainEvent> for EventDraft {
    fn from(event: DomainEvent) -> Self {
        Self {
            id: Some(event.id),
            event_type: Some(event.event_type),
            entity: Some(event.entity),
            entity_id: Some(event.entity_id),
            severity: Some(event.severity),
            timestamp: Some(event.timestamp),
            prev_status: event.prev_status,
            new_status: event.new_status,
            project_id: event.project_id,
            offer_id: event.offer_id,
            task_id: event.task_id,
            user_id: event.user_id,
            title: event.title,
            message: event.message,
            affected_query_keys: if event.affected_query_keys.is_empty() {
                None
            } else {
                Some(event.affected_query_keys)
            },
            metadata: event.metadata,
        }
    }
}
