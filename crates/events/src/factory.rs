//! Typed constructors for the business occurrences producers publish most.
//!
//! Each helper fills the entity kind, correlation ids, severity and the cache
//! key paths a UI would have to refetch, so producers don't hand-assemble
//! drafts.

use serde_json::json;

use crate::envelope::EventDraft;
use crate::event::{EventType, Severity};
use crate::severity::SeverityRules;

#[derive(Debug, Clone, Default)]
pub struct EventFactory {
    rules: SeverityRules,
}

impl EventFactory {
    pub fn new(rules: SeverityRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &SeverityRules {
        &self.rules
    }

    pub fn ao_created(&self, ao_id: &str, reference: Option<&str>) -> EventDraft {
        let draft = EventDraft::new(EventType::AoCreated, "ao", ao_id)
            .with_severity(Severity::Info)
            .with_title("New tender")
            .with_query_key(["aos"]);
        match reference {
            Some(r) => draft.with_message(format!("Tender {r} created")).with_metadata("reference", json!(r)),
            None => draft,
        }
    }

    pub fn ao_status_changed(&self, ao_id: &str, prev: Option<&str>, new: &str) -> EventDraft {
        self.status_change(EventType::AoStatusChanged, "ao", ao_id, prev, new)
            .with_title("Tender status changed")
            .with_query_key(["aos"])
            .with_query_key(["aos", ao_id])
    }

    pub fn offer_status_changed(&self, offer_id: &str, prev: Option<&str>, new: &str) -> EventDraft {
        self.status_change(EventType::OfferStatusChanged, "offer", offer_id, prev, new)
            .with_offer_id(offer_id)
            .with_title("Offer status changed")
            .with_query_key(["offers"])
            .with_query_key(["offers", offer_id])
    }

    pub fn offer_signed(&self, offer_id: &str, project_id: Option<&str>) -> EventDraft {
        let draft = EventDraft::new(EventType::OfferSigned, "offer", offer_id)
            .with_severity(Severity::Success)
            .with_offer_id(offer_id)
            .with_new_status("signe")
            .with_title("Offer signed")
            .with_query_key(["offers"])
            .with_query_key(["offers", offer_id]);
        match project_id {
            Some(p) => draft.with_project_id(p).with_query_key(["projects"]),
            None => draft,
        }
    }

    pub fn offer_validated(&self, offer_id: &str) -> EventDraft {
        EventDraft::new(EventType::OfferValidated, "offer", offer_id)
            .with_severity(Severity::Success)
            .with_offer_id(offer_id)
            .with_new_status("valide")
            .with_title("Offer validated")
            .with_query_key(["offers", offer_id])
    }

    pub fn project_created(&self, project_id: &str, offer_id: Option<&str>) -> EventDraft {
        let draft = EventDraft::new(EventType::ProjectCreated, "project", project_id)
            .with_severity(Severity::Success)
            .with_project_id(project_id)
            .with_title("Project created")
            .with_query_key(["projects"]);
        match offer_id {
            Some(o) => draft.with_offer_id(o),
            None => draft,
        }
    }

    pub fn project_status_changed(&self, project_id: &str, prev: Option<&str>, new: &str) -> EventDraft {
        self.status_change(EventType::ProjectStatusChanged, "project", project_id, prev, new)
            .with_project_id(project_id)
            .with_title("Project status changed")
            .with_query_key(["projects"])
            .with_query_key(["projects", project_id])
    }

    pub fn task_status_changed(&self, task_id: &str, project_id: &str, prev: Option<&str>, new: &str) -> EventDraft {
        self.status_change(EventType::TaskStatusChanged, "task", task_id, prev, new)
            .with_task_id(task_id)
            .with_project_id(project_id)
            .with_title("Task status changed")
            .with_query_key(["projects", project_id, "tasks"])
    }

    pub fn task_overdue(&self, task_id: &str, project_id: &str, days_late: u32) -> EventDraft {
        let severity = if days_late > 7 { Severity::Error } else { Severity::Warning };
        EventDraft::new(EventType::TaskOverdue, "task", task_id)
            .with_severity(severity)
            .with_task_id(task_id)
            .with_project_id(project_id)
            .with_title("Task overdue")
            .with_message(format!("Task {task_id} is {days_late} day(s) late"))
            .with_metadata("daysLate", json!(days_late))
            .with_query_key(["projects", project_id, "tasks"])
    }

    pub fn supplier_quote_received(&self, supplier_id: &str, ao_id: Option<&str>) -> EventDraft {
        let draft = EventDraft::new(EventType::SupplierQuoteReceived, "supplier", supplier_id)
            .with_severity(Severity::Info)
            .with_title("Supplier quote received")
            .with_query_key(["suppliers", supplier_id, "quotes"]);
        match ao_id {
            Some(ao) => draft.with_metadata("aoId", json!(ao)),
            None => draft,
        }
    }

    pub fn analytics_calculated(&self, scope: &str) -> EventDraft {
        EventDraft::new(EventType::AnalyticsCalculated, "analytics", scope)
            .with_severity(Severity::Info)
            .with_title("Analytics refreshed")
            .with_query_key(["analytics", scope])
    }

    pub fn system_maintenance(&self, source: &str, title: &str) -> EventDraft {
        EventDraft::new(EventType::SystemMaintenance, "system", source)
            .with_severity(Severity::Info)
            .with_title(title)
    }

    fn status_change(
        &self,
        event_type: EventType,
        entity: &str,
        entity_id: &str,
        prev: Option<&str>,
        new: &str,
    ) -> EventDraft {
        let draft = EventDraft::new(event_type, entity, entity_id)
            .with_severity(self.rules.classify(new))
            .with_new_status(new);
        match prev {
            Some(p) => draft.with_prev_status(p),
            None => draft,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn status_change_severity_follows_rules() {
        let factory = EventFactory::default();

        let ev = factory
            .offer_status_changed("off-1", Some("en_cours_chiffrage"), "refusé")
            .normalize(Utc::now());
        assert_eq!(ev.severity(), Severity::Error);
        assert_eq!(ev.prev_status(), Some("en_cours_chiffrage"));
        assert_eq!(ev.new_status(), Some("refusé"));
        assert_eq!(ev.offer_id(), Some("off-1"));
    }

    #[test]
    fn custom_vocabulary_changes_classification() {
        let rules = SeverityRules {
            success: vec!["won".into()],
            ..SeverityRules::default()
        };
        let factory = EventFactory::new(rules);

        let ev = factory.ao_status_changed("ao-1", None, "won").normalize(Utc::now());
        assert_eq!(ev.severity(), Severity::Success);
        assert!(ev.prev_status().is_none());
    }

    #[test]
    fn task_events_carry_project_correlation() {
        let factory = EventFactory::default();
        let ev = factory.task_overdue("t-1", "p-9", 10).normalize(Utc::now());

        assert_eq!(ev.entity(), "task");
        assert_eq!(ev.project_id(), Some("p-9"));
        assert_eq!(ev.severity(), Severity::Error);
        assert_eq!(ev.metadata()["daysLate"], json!(10));
    }

    #[test]
    fn system_events_use_the_system_entity() {
        let ev = EventFactory::default()
            .system_maintenance("worker-1", "Worker started")
            .normalize(Utc::now());
        assert_eq!(ev.entity(), "system");
        assert_eq!(ev.entity_id(), "worker-1");
        assert_eq!(ev.title(), Some("Worker started"));
    }

    #[test]
    fn offer_signed_links_project_when_known() {
        let factory = EventFactory::default();
        let ev = factory.offer_signed("off-1", Some("p-1")).normalize(Utc::now());

        assert_eq!(ev.event_type(), EventType::OfferSigned);
        assert_eq!(ev.severity(), Severity::Success);
        assert_eq!(ev.project_id(), Some("p-1"));
        assert_eq!(ev.affected_query_keys().len(), 3);
    }
}
