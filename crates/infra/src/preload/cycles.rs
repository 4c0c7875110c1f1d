//! Fixed-cadence warming cycles and their time guards.

use std::time::Duration;

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::Serialize;

use crate::config::{CycleSettings, PreloadConfig};

/// Hint passed with nightly preloads.
pub const TOMORROW_MORNING_HINT: &str = "tomorrow_morning";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    BusinessHours,
    WeekendWarming,
    PeakHours,
    NightlyMaintenance,
}

impl CycleKind {
    pub const ALL: [CycleKind; 4] = [
        CycleKind::BusinessHours,
        CycleKind::WeekendWarming,
        CycleKind::PeakHours,
        CycleKind::NightlyMaintenance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CycleKind::BusinessHours => "business_hours",
            CycleKind::WeekendWarming => "weekend_warming",
            CycleKind::PeakHours => "peak_hours",
            CycleKind::NightlyMaintenance => "nightly_maintenance",
        }
    }

    pub fn settings(&self, cfg: &PreloadConfig) -> CycleSettings {
        match self {
            CycleKind::BusinessHours => cfg.business,
            CycleKind::WeekendWarming => cfg.weekend,
            CycleKind::PeakHours => cfg.peak,
            CycleKind::NightlyMaintenance => cfg.nightly,
        }
    }

    pub fn cadence(&self, cfg: &PreloadConfig) -> Duration {
        self.settings(cfg).cadence()
    }

    /// Whether local time `now` falls in this cycle's window.
    pub fn in_window(&self, cfg: &PreloadConfig, now: NaiveDateTime) -> bool {
        let hour = now.hour();
        match self {
            CycleKind::BusinessHours => is_weekday(now) && cfg.business_hours.contains(hour),
            CycleKind::WeekendWarming => !is_weekday(now) && cfg.weekend_hours.contains(hour),
            CycleKind::PeakHours => is_weekday(now) && cfg.peak_hours.iter().any(|w| w.contains(hour)),
            CycleKind::NightlyMaintenance => cfg.night_hours.contains(hour),
        }
    }
}

impl std::fmt::Display for CycleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One timer of the scheduler: run `kind` every `every`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CadenceEntry {
    pub kind: CycleKind,
    pub every: Duration,
}

pub fn cadence_plan(cfg: &PreloadConfig) -> Vec<CadenceEntry> {
    CycleKind::ALL
        .into_iter()
        .map(|kind| CadenceEntry {
            kind,
            every: kind.cadence(cfg),
        })
        .collect()
}

pub fn is_weekday(now: NaiveDateTime) -> bool {
    !matches!(now.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Outcome of one cycle run that reached its action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub candidates: usize,
    pub preloaded: usize,
    pub failed: usize,
}

/// Result of asking a cycle to run.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A flag switched the cycle off.
    Disabled,
    OutsideWindow,
    Completed(CycleReport),
    /// The cycle's collaborator calls failed before finishing.
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HourWindow;
    use chrono::NaiveDate;

    // 2024-03-04 is a Monday.
    fn at(day: u32, hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap().and_hms_opt(hour, min, 0).unwrap()
    }

    #[test]
    fn business_hours_on_weekdays_only() {
        let cfg = PreloadConfig::default();
        assert!(CycleKind::BusinessHours.in_window(&cfg, at(4, 8, 0)));
        assert!(CycleKind::BusinessHours.in_window(&cfg, at(8, 17, 59)));
        assert!(!CycleKind::BusinessHours.in_window(&cfg, at(4, 18, 0)));
        assert!(!CycleKind::BusinessHours.in_window(&cfg, at(9, 10, 0)));
    }

    #[test]
    fn weekend_morning_window() {
        let cfg = PreloadConfig::default();
        assert!(CycleKind::WeekendWarming.in_window(&cfg, at(9, 8, 30)));
        assert!(CycleKind::WeekendWarming.in_window(&cfg, at(10, 11, 0)));
        assert!(!CycleKind::WeekendWarming.in_window(&cfg, at(10, 12, 0)));
        assert!(!CycleKind::WeekendWarming.in_window(&cfg, at(4, 9, 0)));
    }

    #[test]
    fn peak_windows_are_any_of() {
        let cfg = PreloadConfig::default();
        assert!(CycleKind::PeakHours.in_window(&cfg, at(5, 9, 15)));
        assert!(CycleKind::PeakHours.in_window(&cfg, at(5, 15, 45)));
        assert!(!CycleKind::PeakHours.in_window(&cfg, at(5, 12, 0)));

        let cfg = PreloadConfig {
            peak_hours: vec![HourWindow::new(12, 13)],
            ..PreloadConfig::default()
        };
        assert!(CycleKind::PeakHours.in_window(&cfg, at(5, 12, 0)));
    }

    #[test]
    fn nightly_wraps_midnight_every_day() {
        let cfg = PreloadConfig::default();
        assert!(CycleKind::NightlyMaintenance.in_window(&cfg, at(4, 23, 0)));
        assert!(CycleKind::NightlyMaintenance.in_window(&cfg, at(10, 2, 0)));
        assert!(!CycleKind::NightlyMaintenance.in_window(&cfg, at(4, 6, 0)));
        assert!(!CycleKind::NightlyMaintenance.in_window(&cfg, at(4, 21, 59)));
    }

    #[test]
    fn plan_has_one_timer_per_cycle() {
        let plan = cadence_plan(&PreloadConfig::default());
        let minutes: Vec<u64> = plan.iter().map(|e| e.every.as_secs() / 60).collect();
        assert_eq!(minutes, vec![30, 60, 15, 120]);
    }
}
