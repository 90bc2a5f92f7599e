//! Resolved monitor configuration and the sources it is read from.
//!
//! [`MonitorConfig`] is the fully-defaulted view the pure capacity functions
//! consume. The monitor pulls a fresh copy from its [`ConfigSource`] on every
//! tick so live reconfiguration takes effect without a restart.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Serialize, Serializer};

use super::global::{
    DEFAULT_DAY_THRESHOLD, DEFAULT_NIGHT_THRESHOLD, DEFAULT_WARNING_THRESHOLD, GlobalConfig, is_fraction,
};
use crate::error::{PacerError, Result};

/// Fully resolved settings for the capacity control loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorConfig {
    /// Whether day/night windows are in effect at all.
    pub time_based_enabled: bool,
    pub day_mode_hours: BTreeSet<u32>,
    /// Disjoint from `day_mode_hours`.
    pub night_mode_hours: BTreeSet<u32>,
    pub day_mode_capacity_threshold: f64,
    pub night_mode_capacity_threshold: f64,
    #[serde(rename = "min_check_interval_ms", serialize_with = "as_millis")]
    pub min_check_interval: Duration,
    #[serde(rename = "max_check_interval_ms", serialize_with = "as_millis")]
    pub max_check_interval: Duration,
    /// Fraction of the active threshold at which warnings fire.
    pub warning_threshold: f64,
    pub emit_warnings: bool,
    pub emit_exhausted: bool,
}

fn as_millis<S: Serializer>(value: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::resolve(&GlobalConfig::default())
    }
}

impl MonitorConfig {
    /// Render the resolved settings as YAML, intervals in milliseconds.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Resolve a raw config file into monitor settings, applying defaults.
    pub fn resolve(global: &GlobalConfig) -> Self {
        let tb = &global.daemon.time_based_usage;
        let cm = &global.daemon.capacity_monitor;

        let day_mode_hours = valid_hours("day_mode_hours", &tb.day_mode_hours);
        let night_mode_hours: BTreeSet<u32> = valid_hours("night_mode_hours", &tb.night_mode_hours)
            .into_iter()
            .filter(|h| !day_mode_hours.contains(h))
            .collect();

        Self {
            time_based_enabled: tb.enabled,
            day_mode_hours,
            night_mode_hours,
            day_mode_capacity_threshold: fraction_or(
                "day_mode_capacity_threshold",
                tb.day_mode_capacity_threshold,
                DEFAULT_DAY_THRESHOLD,
            ),
            night_mode_capacity_threshold: fraction_or(
                "night_mode_capacity_threshold",
                tb.night_mode_capacity_threshold,
                DEFAULT_NIGHT_THRESHOLD,
            ),
            min_check_interval: Duration::from_millis(cm.min_check_interval_ms),
            max_check_interval: Duration::from_millis(cm.max_check_interval_ms),
            warning_threshold: fraction_or("warning_threshold", cm.warning_threshold, DEFAULT_WARNING_THRESHOLD),
            emit_warnings: cm.emit_warnings,
            emit_exhausted: cm.emit_exhausted,
        }
    }

    /// Time-based config with the given day and night hours and default thresholds.
    pub fn time_based(day_hours: impl IntoIterator<Item = u32>, night_hours: impl IntoIterator<Item = u32>) -> Self {
        let day_mode_hours: BTreeSet<u32> = day_hours.into_iter().filter(|h| *h < 24).collect();
        let night_mode_hours = night_hours
            .into_iter()
            .filter(|h| *h < 24 && !day_mode_hours.contains(h))
            .collect();
        Self {
            time_based_enabled: true,
            day_mode_hours,
            night_mode_hours,
            ..Self::default()
        }
    }

    /// Set the day and night thresholds.
    pub fn with_thresholds(mut self, day: f64, night: f64) -> Self {
        self.day_mode_capacity_threshold = day;
        self.night_mode_capacity_threshold = night;
        self
    }

    /// Set the minimum and maximum check intervals.
    pub fn with_check_intervals(mut self, min: Duration, max: Duration) -> Self {
        self.min_check_interval = min;
        self.max_check_interval = max;
        self
    }

    /// Enable warning events at `fraction` of the active threshold.
    pub fn with_warnings(mut self, fraction: f64) -> Self {
        self.emit_warnings = true;
        self.warning_threshold = fraction;
        self
    }

    /// Toggle exhausted events.
    pub fn with_exhausted_events(mut self, emit: bool) -> Self {
        self.emit_exhausted = emit;
        self
    }
}

fn valid_hours(name: &str, hours: &[i64]) -> BTreeSet<u32> {
    hours
        .iter()
        .filter_map(|&h| match u32::try_from(h) {
            Ok(hour) if hour < 24 => Some(hour),
            _ => {
                log::warn!("Ignoring out-of-range hour {} in {}", h, name);
                None
            }
        })
        .collect()
}

fn fraction_or(name: &str, value: f64, default: f64) -> f64 {
    if is_fraction(value) {
        value
    } else {
        log::warn!("{} must be in (0, 1], got {}; using {}", name, value, default);
        default
    }
}

/// Where the monitor reads its configuration from on each tick.
pub trait ConfigSource: Send + Sync {
    /// Produce the configuration for the current tick.
    fn load(&self) -> Result<MonitorConfig>;
}

impl ConfigSource for MonitorConfig {
    fn load(&self) -> Result<MonitorConfig> {
        Ok(self.clone())
    }
}

/// In-memory configuration that can be swapped while the monitor runs.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<MonitorConfig>>,
}

impl SharedConfig {
    /// Wrap an initial configuration.
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Replace the configuration; picked up on the next tick.
    pub fn update(&self, config: MonitorConfig) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    /// Current configuration.
    pub fn get(&self) -> MonitorConfig {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ConfigSource for SharedConfig {
    fn load(&self) -> Result<MonitorConfig> {
        Ok(self.get())
    }
}

/// Re-reads a YAML config file on every tick.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<MonitorConfig> {
        let global = GlobalConfig::read_file(&self.path)
            .map_err(|e| PacerError::Config(format!("{}: {}", self.path.display(), e)))?;
        Ok(MonitorConfig::resolve(&global))
    }
}
