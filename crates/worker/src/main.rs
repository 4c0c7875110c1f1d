use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::json;

use chantier_events::{EventFactory, SeverityRules};
use chantier_infra::{ChantierConfig, CoordinationService, InMemoryCacheService, InMemoryPredictiveEngine};

const STATS_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chantier_observability::init();

    let config = ChantierConfig::from_env().context("invalid CHANTIER_* configuration")?;
    let rules = SeverityRules::from_env().context("invalid CHANTIER_SEVERITY_RULES")?;
    let factory = EventFactory::new(rules);

    // In-memory collaborators; calls show up in the debug logs.
    let cache = Arc::new(InMemoryCacheService::new());
    let engine = Arc::new(InMemoryPredictiveEngine::new());

    let service = CoordinationService::start(config, cache, engine).context("failed to start coordination")?;
    tracing::info!(
        flags = ?service.scheduler().flags(),
        "chantier worker running"
    );

    service.bus().publish(
        factory
            .system_maintenance("chantier-worker", "Worker started")
            .with_metadata("pid", json!(std::process::id())),
    );

    let mut stats_tick = tokio::time::interval(STATS_INTERVAL);
    stats_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("failed to listen for shutdown signal")?;
                tracing::info!("shutdown signal received");
                break;
            }
            _ = stats_tick.tick() => {
                tracing::info!(
                    bus = ?service.bus().stats(),
                    invalidation = ?service.coordinator().stats(),
                    preload = ?service.scheduler().stats(),
                    "coordination stats"
                );
            }
        }
    }

    let report = service.shutdown();
    tracing::info!(
        cadences = report.cadences_stopped,
        chains = report.chains_unsubscribed,
        cancelled_steps = report.steps_cancelled,
        "chantier worker stopped"
    );
    Ok(())
}
