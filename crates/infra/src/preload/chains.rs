//! Event-triggered preload chains.
//!
//! A chain reacts to a family of events by warming the entities the user is
//! likely to open next, each step after its own delay.

use std::time::Duration;

use serde::Serialize;

use chantier_events::{DomainEvent, EventFilter, EventType};

use crate::cache::{IdSource, PreloadPriority};

const MINUTE: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStep {
    pub entity_type: &'static str,
    pub target: IdSource,
    pub context_hint: &'static str,
    pub delay: Duration,
    pub priority: PreloadPriority,
}

const fn step(
    entity_type: &'static str,
    target: IdSource,
    context_hint: &'static str,
    delay_mins: u64,
    priority: PreloadPriority,
) -> ChainStep {
    ChainStep {
        entity_type,
        target,
        context_hint,
        delay: Duration::from_secs(delay_mins * MINUTE),
        priority,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainDefinition {
    pub name: &'static str,
    pub triggers: &'static [EventType],
    /// Required event entity kind; `None` accepts any.
    pub entity: Option<&'static str>,
    pub steps: Vec<ChainStep>,
}

/// A concrete, delayed preload derived from one chain step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadTask {
    pub entity_type: String,
    pub entity_id: String,
    pub context_hint: Option<String>,
    pub priority: PreloadPriority,
    #[serde(skip)]
    pub delay: Duration,
}

impl ChainDefinition {
    /// Bus filter selecting this chain's trigger events.
    pub fn filter(&self) -> EventFilter {
        let filter = EventFilter::all().event_types(self.triggers.iter().copied());
        match self.entity {
            Some(entity) => filter.entities([entity]),
            None => filter,
        }
    }

    /// Tasks to schedule for `event`, in step order.
    pub fn plan(&self, event: &DomainEvent) -> Vec<PreloadTask> {
        self.steps
            .iter()
            .map(|s| PreloadTask {
                entity_type: s.entity_type.to_string(),
                entity_id: s.target.resolve(event).to_string(),
                context_hint: Some(s.context_hint.to_string()),
                priority: s.priority,
                delay: s.delay,
            })
            .collect()
    }
}

pub fn default_chains() -> Vec<ChainDefinition> {
    use PreloadPriority::{High, Low, Medium};
    use IdSource::{EntityId, ProjectOrEntityId};

    vec![
        ChainDefinition {
            name: "ao_workflow",
            triggers: &[EventType::AoCreated, EventType::AoStatusChanged],
            entity: Some("ao"),
            steps: vec![
                step("ao", EntityId, "study_phase", 20, High),
                step("ao", EntityId, "supplier_context", 30, Medium),
                step("ao", EntityId, "pricing_context", 60, Medium),
            ],
        },
        ChainDefinition {
            name: "offer_conversion",
            triggers: &[EventType::OfferSigned, EventType::OfferValidated],
            entity: Some("offer"),
            steps: vec![
                step("project", ProjectOrEntityId, "project_setup", 30, High),
                step("project", ProjectOrEntityId, "planning", 60, Medium),
                step("offer", EntityId, "supplier_orders", 45, Medium),
            ],
        },
        ChainDefinition {
            name: "project_lifecycle",
            triggers: &[EventType::ProjectCreated, EventType::ProjectStatusChanged],
            entity: Some("project"),
            steps: vec![
                step("project", EntityId, "planning", 15, High),
                step("project", EntityId, "team_allocation", 45, Medium),
                step("project", EntityId, "supplier_context", 90, Low),
            ],
        },
        ChainDefinition {
            name: "task_followup",
            triggers: &[EventType::TaskStatusChanged, EventType::TaskOverdue],
            entity: Some("task"),
            steps: vec![
                step("project", ProjectOrEntityId, "planning", 5, High),
                step("project", ProjectOrEntityId, "timeline", 10, Medium),
            ],
        },
        ChainDefinition {
            name: "analytics_refresh",
            triggers: &[EventType::AnalyticsCalculated],
            entity: None,
            steps: vec![step("analytics", EntityId, "dashboard", 2, Medium)],
        },
    ]
}
