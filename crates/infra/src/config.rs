//! Configuration loading and representation.
//!
//! Everything has a working default; `from_env` overrides individual values
//! from `CHANTIER_*` variables and rejects malformed ones.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use chantier_events::DEFAULT_HISTORY_CAPACITY;

pub const EVENT_HISTORY_SIZE_ENV: &str = "CHANTIER_EVENT_HISTORY_SIZE";
pub const INVALIDATION_ENABLED_ENV: &str = "CHANTIER_INVALIDATION_ENABLED";
pub const PRELOAD_ENABLED_ENV: &str = "CHANTIER_PRELOAD_ENABLED";
pub const BUSINESS_PRELOAD_ENABLED_ENV: &str = "CHANTIER_BUSINESS_PRELOAD_ENABLED";
pub const WEEKEND_WARMING_ENABLED_ENV: &str = "CHANTIER_WEEKEND_WARMING_ENABLED";
pub const BUSINESS_HOURS_ENV: &str = "CHANTIER_BUSINESS_HOURS";
pub const PEAK_HOURS_ENV: &str = "CHANTIER_PEAK_HOURS";
pub const WEEKEND_HOURS_ENV: &str = "CHANTIER_WEEKEND_HOURS";
pub const NIGHT_HOURS_ENV: &str = "CHANTIER_NIGHT_HOURS";
pub const MIN_CONFIDENCE_ENV: &str = "CHANTIER_MIN_CONFIDENCE";
pub const PEAK_MIN_CONFIDENCE_ENV: &str = "CHANTIER_PEAK_MIN_CONFIDENCE";
pub const HOT_ENTITY_MIN_ACCESS_ENV: &str = "CHANTIER_HOT_ENTITY_MIN_ACCESS";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid hour window {0:?}: expected START-END with hours in 0..=24")]
    HourWindow(String),
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: impl fmt::Display) -> Self {
        Self::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Half-open range of wall-clock hours, `[start, end)`.
///
/// When `start > end` the window wraps midnight (`22-6` covers 22:00 to
/// 05:59). `start == end` is an empty window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow {
    pub start: u32,
    pub end: u32,
}

impl HourWindow {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }

    /// Parse a comma separated list, e.g. `9-11,14-16`.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, ConfigError> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for HourWindow {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ConfigError::HourWindow(s.to_string());
        let (start, end) = s.trim().split_once('-').ok_or_else(bad)?;
        let start: u32 = start.trim().parse().map_err(|_| bad())?;
        let end: u32 = end.trim().parse().map_err(|_| bad())?;
        if start > 23 || end > 24 {
            return Err(bad());
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for HourWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Cadence and batch size of one warming cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSettings {
    pub every_mins: u64,
    pub limit: usize,
}

impl CycleSettings {
    pub const fn new(every_mins: u64, limit: usize) -> Self {
        Self { every_mins, limit }
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.every_mins.max(1) * 60)
    }
}

/// Tuning of the preload scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreloadConfig {
    /// Master switch for every cycle and every chain.
    pub predictive_triggers_enabled: bool,
    /// Business-hours and peak-hours cycles.
    pub business_hours_enabled: bool,
    pub weekend_warming_enabled: bool,

    pub business_hours: HourWindow,
    pub peak_hours: Vec<HourWindow>,
    pub weekend_hours: HourWindow,
    pub night_hours: HourWindow,

    /// Minimum prediction confidence (0..=100) for business and nightly warming.
    pub min_confidence: f64,
    pub peak_min_confidence: f64,
    pub hot_entity_min_access: u64,

    pub business: CycleSettings,
    pub weekend: CycleSettings,
    pub peak: CycleSettings,
    pub nightly: CycleSettings,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            predictive_triggers_enabled: true,
            business_hours_enabled: true,
            weekend_warming_enabled: true,
            business_hours: HourWindow::new(8, 18),
            peak_hours: vec![HourWindow::new(9, 11), HourWindow::new(14, 16)],
            weekend_hours: HourWindow::new(8, 12),
            night_hours: HourWindow::new(22, 6),
            min_confidence: 65.0,
            peak_min_confidence: 80.0,
            hot_entity_min_access: 10,
            business: CycleSettings::new(30, 10),
            weekend: CycleSettings::new(60, 15),
            peak: CycleSettings::new(15, 20),
            nightly: CycleSettings::new(120, 5),
        }
    }
}

impl PreloadConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from defaults overridden by whatever `lookup` returns.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = lookup(PRELOAD_ENABLED_ENV) {
            cfg.predictive_triggers_enabled = parse_bool(PRELOAD_ENABLED_ENV, &v)?;
        }
        if let Some(v) = lookup(BUSINESS_PRELOAD_ENABLED_ENV) {
            cfg.business_hours_enabled = parse_bool(BUSINESS_PRELOAD_ENABLED_ENV, &v)?;
        }
        if let Some(v) = lookup(WEEKEND_WARMING_ENABLED_ENV) {
            cfg.weekend_warming_enabled = parse_bool(WEEKEND_WARMING_ENABLED_ENV, &v)?;
        }
        if let Some(v) = lookup(BUSINESS_HOURS_ENV) {
            cfg.business_hours = v.parse()?;
        }
        if let Some(v) = lookup(PEAK_HOURS_ENV) {
            cfg.peak_hours = HourWindow::parse_list(&v)?;
        }
        if let Some(v) = lookup(WEEKEND_HOURS_ENV) {
            cfg.weekend_hours = v.parse()?;
        }
        if let Some(v) = lookup(NIGHT_HOURS_ENV) {
            cfg.night_hours = v.parse()?;
        }
        if let Some(v) = lookup(MIN_CONFIDENCE_ENV) {
            cfg.min_confidence = parse_confidence(MIN_CONFIDENCE_ENV, &v)?;
        }
        if let Some(v) = lookup(PEAK_MIN_CONFIDENCE_ENV) {
            cfg.peak_min_confidence = parse_confidence(PEAK_MIN_CONFIDENCE_ENV, &v)?;
        }
        if let Some(v) = lookup(HOT_ENTITY_MIN_ACCESS_ENV) {
            cfg.hot_entity_min_access = parse_number(HOT_ENTITY_MIN_ACCESS_ENV, &v)?;
        }

        Ok(cfg)
    }
}

/// Process-level settings of the coordination service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChantierConfig {
    pub event_history_size: usize,
    pub invalidation_enabled: bool,
    pub preload: PreloadConfig,
}

impl Default for ChantierConfig {
    fn default() -> Self {
        Self {
            event_history_size: DEFAULT_HISTORY_CAPACITY,
            invalidation_enabled: true,
            preload: PreloadConfig::default(),
        }
    }
}

impl ChantierConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self {
            preload: PreloadConfig::from_lookup(&lookup)?,
            ..Self::default()
        };
        if let Some(v) = lookup(EVENT_HISTORY_SIZE_ENV) {
            cfg.event_history_size = parse_number(EVENT_HISTORY_SIZE_ENV, &v)?;
        }
        if let Some(v) = lookup(INVALIDATION_ENABLED_ENV) {
            cfg.invalidation_enabled = parse_bool(INVALIDATION_ENABLED_ENV, &v)?;
        }
        Ok(cfg)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, value, "expected a boolean")),
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e| ConfigError::invalid(key, value, e))
}

fn parse_confidence(key: &str, value: &str) -> Result<f64, ConfigError> {
    let confidence: f64 = parse_number(key, value)?;
    if (0.0..=100.0).contains(&confidence) {
        Ok(confidence)
    } else {
        Err(ConfigError::invalid(key, value, "confidence must be within 0..=100"))
    }
}
