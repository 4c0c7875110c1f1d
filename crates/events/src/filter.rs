use serde::{Deserialize, Serialize};

use crate::event::{DomainEvent, EventType, Severity};

/// Predicate selecting which events a subscriber (or a history read) sees.
///
/// - Within one field, values are OR-ed (`entities: [offer, project]` matches either).
/// - Across fields, every present predicate must hold.
/// - An absent field matches everything. An empty list is treated as absent.
///
/// Correlation predicates (`projectIds`, `offerIds`, `userId`) never match an
/// event that does not carry the correlated id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_types: Option<Vec<EventType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severities: Option<Vec<Severity>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl EventFilter {
    /// A filter that matches every event.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn event_types(mut self, types: impl IntoIterator<Item = EventType>) -> Self {
        self.event_types = Some(types.into_iter().collect());
        self
    }

    pub fn entities<S: Into<String>>(mut self, entities: impl IntoIterator<Item = S>) -> Self {
        self.entities = Some(entities.into_iter().map(Into::into).collect());
        self
    }

    pub fn entity_ids<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.entity_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn project_ids<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.project_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn offer_ids<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.offer_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn severities(mut self, severities: impl IntoIterator<Item = Severity>) -> Self {
        self.severities = Some(severities.into_iter().collect());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn matches(&self, event: &DomainEvent) -> bool {
        one_of(&self.event_types, &event.event_type())
            && one_of_str(&self.entities, Some(event.entity()))
            && one_of_str(&self.entity_ids, Some(event.entity_id()))
            && one_of_str(&self.project_ids, event.project_id())
            && one_of_str(&self.offer_ids, event.offer_id())
            && one_of(&self.severities, &event.severity())
            && match &self.user_id {
                Some(wanted) => event.user_id() == Some(wanted.as_str()),
                None => true,
            }
    }
}

fn one_of<T: PartialEq>(allowed: &Option<Vec<T>>, value: &T) -> bool {
    match allowed {
        Some(set) if !set.is_empty() => set.contains(value),
        _ => true,
    }
}

fn one_of_str(allowed: &Option<Vec<String>>, value: Option<&str>) -> bool {
    match allowed {
        Some(set) if !set.is_empty() => value.is_some_and(|v| set.iter().any(|s| s == v)),
        _ => true,
    }
}
