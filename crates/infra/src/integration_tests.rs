//! End-to-end tests: producer → EventBus → coordinator / scheduler → cache.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::NaiveDate;

    use chantier_events::{EventDraft, EventFactory, EventFilter, EventType, Severity};

    use crate::cache::{CacheCall, CacheOperation, InMemoryCacheService, InMemoryPredictiveEngine};
    use crate::config::{ChantierConfig, PreloadConfig};
    use crate::preload::FixedClock;
    use crate::service::CoordinationService;

    const MINUTE: Duration = Duration::from_secs(60);

    fn start(config: ChantierConfig) -> (CoordinationService, Arc<InMemoryCacheService>) {
        let cache = Arc::new(InMemoryCacheService::new());
        let engine = Arc::new(InMemoryPredictiveEngine::new());
        // Wednesday 20:00, outside every cycle window.
        let now = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap().and_hms_opt(20, 0, 0).unwrap();
        let service =
            CoordinationService::start_with_clock(config, cache.clone(), engine, Arc::new(FixedClock::new(now)))
                .unwrap();
        (service, cache)
    }

    #[tokio::test(start_paused = true)]
    async fn project_lifecycle_end_to_end() {
        let (service, cache) = start(ChantierConfig::default());
        let factory = EventFactory::default();
        let bus = service.bus().clone();

        // Chain subscriptions plus the coordinator.
        assert_eq!(bus.stats().subscriptions_count, 6);

        bus.publish(factory.project_status_changed("p-1", Some("planification"), "en_cours"));
        bus.publish(factory.task_overdue("t-1", "p-1", 9));

        tokio::time::sleep(MINUTE).await;
        let invalidated: Vec<String> = cache
            .invalidations()
            .into_iter()
            .map(|c| match c {
                CacheCall::Invalidate { entity_type, entity_id, .. } => format!("{entity_type}:{entity_id}"),
                other => panic!("unexpected call {other:?}"),
            })
            .collect();
        assert_eq!(invalidated, vec!["project:p-1", "project:p-1"]);

        // task_followup: +5, +10; project_lifecycle: +15, +45, +90.
        tokio::time::sleep(90 * MINUTE).await;
        assert_eq!(cache.preloads().len(), 5);
        assert_eq!(service.scheduler().pending_steps(), 0);

        let errors = bus.recent_events(None, Some(&EventFilter::all().severities([Severity::Error])));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].event_type(), EventType::TaskOverdue);

        service.shutdown();
        assert_eq!(bus.stats().subscriptions_count, 0);
        assert_eq!(bus.stats().history_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_subsystems_stay_quiet() {
        let config = ChantierConfig {
            invalidation_enabled: false,
            preload: PreloadConfig {
                predictive_triggers_enabled: false,
                ..PreloadConfig::default()
            },
            ..ChantierConfig::default()
        };
        let (service, cache) = start(config);

        service.bus().publish(EventDraft::new(EventType::OfferSigned, "offer", "off-1"));
        tokio::time::sleep(3 * 60 * MINUTE).await;

        assert!(cache.calls().is_empty());
        assert_eq!(service.coordinator().stats().ignored_while_disabled, 1);
        assert_eq!(service.bus().recent_events(None, None).len(), 1);
        service.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn history_capacity_comes_from_config() {
        let config = ChantierConfig {
            event_history_size: 3,
            ..ChantierConfig::default()
        };
        let (service, _cache) = start(config);
        for n in 0..5 {
            service
                .bus()
                .publish(EventDraft::new(EventType::SystemMaintenance, "system", format!("m-{n}")));
        }

        let ids: Vec<String> = service
            .bus()
            .recent_events(None, None)
            .iter()
            .map(|e| e.entity_id().to_string())
            .collect();
        assert_eq!(ids, vec!["m-2", "m-3", "m-4"]);
        service.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_producers_are_all_recorded() {
        let (service, cache) = start(ChantierConfig {
            event_history_size: 1_000,
            ..ChantierConfig::default()
        });
        let bus = service.bus().clone();

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let bus = bus.clone();
                tokio::spawn(async move {
                    for n in 0..25 {
                        bus.publish(EventDraft::new(EventType::OfferStatusChanged, "offer", format!("off-{p}-{n}")));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        assert_eq!(bus.stats().published_count, 100);
        for _ in 0..200 {
            if service.coordinator().stats().succeeded == 100 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(cache.calls_of(CacheOperation::Invalidate).len(), 100);
        service.shutdown();
    }
}
