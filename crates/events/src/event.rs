use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use chantier_core::EventId;

/// Business occurrences the bus knows about.
///
/// Wire names are SCREAMING_SNAKE_CASE (e.g. `"OFFER_SIGNED"`). Anything the
/// bus does not recognize decodes to [`EventType::Unknown`] instead of failing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    AoCreated,
    AoStatusChanged,
    OfferCreated,
    OfferStatusChanged,
    OfferSigned,
    OfferValidated,
    ProjectCreated,
    ProjectStatusChanged,
    TaskCreated,
    TaskStatusChanged,
    TaskOverdue,
    SupplierQuoteReceived,
    ValidationMilestoneCompleted,
    AnalyticsCalculated,
    SystemMaintenance,
    #[serde(other)]
    Unknown,
}

impl EventType {
    pub const ALL: [EventType; 16] = [
        EventType::AoCreated,
        EventType::AoStatusChanged,
        EventType::OfferCreated,
        EventType::OfferStatusChanged,
        EventType::OfferSigned,
        EventType::OfferValidated,
        EventType::ProjectCreated,
        EventType::ProjectStatusChanged,
        EventType::TaskCreated,
        EventType::TaskStatusChanged,
        EventType::TaskOverdue,
        EventType::SupplierQuoteReceived,
        EventType::ValidationMilestoneCompleted,
        EventType::AnalyticsCalculated,
        EventType::SystemMaintenance,
        EventType::Unknown,
    ];

    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AoCreated => "AO_CREATED",
            EventType::AoStatusChanged => "AO_STATUS_CHANGED",
            EventType::OfferCreated => "OFFER_CREATED",
            EventType::OfferStatusChanged => "OFFER_STATUS_CHANGED",
            EventType::OfferSigned => "OFFER_SIGNED",
            EventType::OfferValidated => "OFFER_VALIDATED",
            EventType::ProjectCreated => "PROJECT_CREATED",
            EventType::ProjectStatusChanged => "PROJECT_STATUS_CHANGED",
            EventType::TaskCreated => "TASK_CREATED",
            EventType::TaskStatusChanged => "TASK_STATUS_CHANGED",
            EventType::TaskOverdue => "TASK_OVERDUE",
            EventType::SupplierQuoteReceived => "SUPPLIER_QUOTE_RECEIVED",
            EventType::ValidationMilestoneCompleted => "VALIDATION_MILESTONE_COMPLETED",
            EventType::AnalyticsCalculated => "ANALYTICS_CALCULATED",
            EventType::SystemMaintenance => "SYSTEM_MAINTENANCE",
            EventType::Unknown => "UNKNOWN",
        }
    }

    /// Parse a wire name; unrecognized names map to `Unknown`.
    pub fn from_wire(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .unwrap_or(EventType::Unknown)
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How noteworthy an event is for people watching the feed.
///
/// Unrecognized wire values decode to [`Severity::Info`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Success,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Success => "success",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }

    /// Parse a wire value; unrecognized values map to `Info`.
    pub fn from_wire(value: &str) -> Self {
        [
            Severity::Info,
            Severity::Warning,
            Severity::Success,
            Severity::Error,
            Severity::Critical,
        ]
        .into_iter()
        .find(|s| s.as_str() == value)
        .unwrap_or_default()
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Severity::from_wire(&value))
    }
}

impl core::fmt::Display for Severity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published domain event.
///
/// Events are facts: once the bus has accepted one it is never mutated. The
/// required scalars (`type`, `entity`, `entityId`, `severity`, `timestamp`)
/// are always populated; see [`crate::EventDraft`] for how missing values are
/// defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub(crate) id: EventId,
    #[serde(rename = "type")]
    pub(crate) event_type: EventType,
    pub(crate) entity: String,
    pub(crate) entity_id: String,
    pub(crate) severity: Severity,
    pub(crate) timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) prev_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) new_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) offer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,

    /// Cache key paths impacted by this change (e.g. `[["offers", "off-1"]]`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) affected_query_keys: Vec<Vec<String>>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub(crate) metadata: Map<String, JsonValue>,
}

impl DomainEvent {
    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn prev_status(&self) -> Option<&str> {
        self.prev_status.as_deref()
    }

    pub fn new_status(&self) -> Option<&str> {
        self.new_status.as_deref()
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn offer_id(&self) -> Option<&str> {
        self.offer_id.as_deref()
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn affected_query_keys(&self) -> &[Vec<String>] {
        &self.affected_query_keys
    }

    pub fn metadata(&self) -> &Map<String, JsonValue> {
        &self.metadata
    }
}
