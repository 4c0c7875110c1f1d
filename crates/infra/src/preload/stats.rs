use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::cycles::{CycleKind, CycleReport};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleStats {
    pub runs: u64,
    pub skipped: u64,
    pub failures: u64,
    pub preloads: u64,
    pub failed_preloads: u64,
    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStats {
    pub triggered: u64,
    pub ignored_while_disabled: u64,
    pub steps_scheduled: u64,
    pub steps_completed: u64,
    pub steps_failed: u64,
}

/// Counters of the preload scheduler, keyed by cycle and chain name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundStats {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub total_preloads: u64,
    pub failed_preloads: u64,
    pub pending_steps: usize,
    pub cancelled_steps: u64,
    pub cycles: BTreeMap<String, CycleStats>,
    pub chains: BTreeMap<String, ChainStats>,
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    inner: Mutex<BackgroundStats>,
}

impl StatsRecorder {
    pub(crate) fn started(&self) {
        let mut s = self.lock();
        s.running = true;
        s.started_at = Some(Utc::now());
    }

    pub(crate) fn stopped(&self, cancelled: usize) {
        let mut s = self.lock();
        s.running = false;
        s.cancelled_steps += cancelled as u64;
    }

    pub(crate) fn cycle_skipped(&self, kind: CycleKind) {
        self.lock().cycles.entry(kind.name().to_string()).or_default().skipped += 1;
    }

    pub(crate) fn cycle_completed(&self, kind: CycleKind, report: &CycleReport) {
        let mut s = self.lock();
        s.total_preloads += report.preloaded as u64;
        s.failed_preloads += report.failed as u64;
        let c = s.cycles.entry(kind.name().to_string()).or_default();
        c.runs += 1;
        c.preloads += report.preloaded as u64;
        c.failed_preloads += report.failed as u64;
        c.last_run = Some(Utc::now());
    }

    pub(crate) fn cycle_failed(&self, kind: CycleKind, report: &CycleReport) {
        let mut s = self.lock();
        s.total_preloads += report.preloaded as u64;
        s.failed_preloads += report.failed as u64;
        let c = s.cycles.entry(kind.name().to_string()).or_default();
        c.runs += 1;
        c.failures += 1;
        c.preloads += report.preloaded as u64;
        c.failed_preloads += report.failed as u64;
        c.last_run = Some(Utc::now());
    }

    pub(crate) fn chain_ignored(&self, chain: &str) {
        self.lock().chains.entry(chain.to_string()).or_default().ignored_while_disabled += 1;
    }

    pub(crate) fn chain_triggered(&self, chain: &str, steps: usize) {
        let mut s = self.lock();
        let c = s.chains.entry(chain.to_string()).or_default();
        c.triggered += 1;
        c.steps_scheduled += steps as u64;
    }

    pub(crate) fn step_finished(&self, chain: &str, ok: bool) {
        let mut s = self.lock();
        if ok {
            s.total_preloads += 1;
        } else {
            s.failed_preloads += 1;
        }
        let c = s.chains.entry(chain.to_string()).or_default();
        if ok {
            c.steps_completed += 1;
        } else {
            c.steps_failed += 1;
        }
    }

    pub(crate) fn snapshot(&self, pending_steps: usize) -> BackgroundStats {
        let mut snapshot = self.lock().clone();
        snapshot.pending_steps = pending_steps;
        snapshot
    }

    fn lock(&self) -> MutexGuard<'_, BackgroundStats> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_and_chain_counters_roll_up() {
        let rec = StatsRecorder::default();
        rec.started();
        rec.cycle_completed(
            CycleKind::PeakHours,
            &CycleReport {
                candidates: 3,
                preloaded: 2,
                failed: 1,
            },
        );
        rec.cycle_skipped(CycleKind::PeakHours);
        rec.chain_triggered("task_followup", 2);
        rec.step_finished("task_followup", true);
        rec.step_finished("task_followup", false);

        let s = rec.snapshot(1);
        assert!(s.running);
        assert_eq!(s.total_preloads, 3);
        assert_eq!(s.failed_preloads, 2);
        assert_eq!(s.pending_steps, 1);

        let peak = &s.cycles["peak_hours"];
        assert_eq!((peak.runs, peak.skipped, peak.preloads), (1, 1, 2));
        let chain = &s.chains["task_followup"];
        assert_eq!((chain.steps_scheduled, chain.steps_completed, chain.steps_failed), (2, 1, 1));
    }
}
