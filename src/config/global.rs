//! Global configuration file.
//!
//! Loaded from .pacer.yml or ~/.config/pacer/pacer.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Default day-mode hours (09:00 through 17:59).
pub const DEFAULT_DAY_MODE_HOURS: [i64; 9] = [9, 10, 11, 12, 13, 14, 15, 16, 17];

/// Default night-mode hours (22:00 through 06:59, wrapping midnight).
pub const DEFAULT_NIGHT_MODE_HOURS: [i64; 9] = [22, 23, 0, 1, 2, 3, 4, 5, 6];

/// Default capacity threshold during day mode.
pub const DEFAULT_DAY_THRESHOLD: f64 = 0.90;

/// Default capacity threshold during night mode.
pub const DEFAULT_NIGHT_THRESHOLD: f64 = 0.96;

/// Default warning level, as a fraction of the active threshold.
pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.90;

/// Global configuration for Pacer.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Daemon scheduling settings.
    pub daemon: DaemonConfig,

    /// Spend limits.
    pub limits: LimitsConfig,

    /// Where the binary reads usage figures from.
    pub usage: UsageConfig,
}

impl GlobalConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .pacer.yml in current directory
    /// 3. ~/.config/pacer/pacer.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // Explicit path takes precedence
        if let Some(path) = config_path {
            return Self::read_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project config
        let project_config = PathBuf::from(".pacer.yml");
        if project_config.exists() {
            match Self::read_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .pacer.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .pacer.yml: {}", e);
                }
            }
        }

        // Try user config
        if let Some(path) = Self::user_config_path() {
            if path.exists() {
                match Self::read_file(&path) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        // Use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Location of the per-user config file.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pacer").join("pacer.yml"))
    }

    /// Read and parse a single config file.
    pub fn read_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Report anomalies in the configuration.
    ///
    /// None of these are fatal; the monitor degrades gracefully around each.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let tb = &self.daemon.time_based_usage;
        let cm = &self.daemon.capacity_monitor;

        for (name, hours) in [("day_mode_hours", &tb.day_mode_hours), ("night_mode_hours", &tb.night_mode_hours)] {
            for h in hours.iter().filter(|h| !(0..=23).contains(*h)) {
                warnings.push(format!("{} contains out-of-range hour {}", name, h));
            }
        }

        let day: BTreeSet<i64> = tb.day_mode_hours.iter().copied().collect();
        let overlap: Vec<i64> = tb.night_mode_hours.iter().copied().filter(|h| day.contains(h)).collect();
        if !overlap.is_empty() {
            warnings.push(format!("hours {:?} are in both day and night mode; day mode wins", overlap));
        }

        if tb.enabled && tb.day_mode_hours.is_empty() && tb.night_mode_hours.is_empty() {
            warnings.push("time-based usage is enabled but no hours are configured".to_string());
        }

        for (name, value) in [
            ("day_mode_capacity_threshold", tb.day_mode_capacity_threshold),
            ("night_mode_capacity_threshold", tb.night_mode_capacity_threshold),
            ("warning_threshold", cm.warning_threshold),
        ] {
            if !is_fraction(value) {
                warnings.push(format!("{} must be in (0, 1], got {}", name, value));
            }
        }

        if cm.max_check_interval_ms < cm.min_check_interval_ms {
            warnings.push(format!(
                "max_check_interval_ms ({}) is below min_check_interval_ms ({}); the maximum wins",
                cm.max_check_interval_ms, cm.min_check_interval_ms
            ));
        }

        warnings
    }
}

/// True when `value` lies in (0, 1].
pub(crate) fn is_fraction(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}

/// Daemon scheduling settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Day/night capacity windows.
    pub time_based_usage: TimeBasedUsageConfig,

    /// Capacity monitor timing and event settings.
    pub capacity_monitor: CapacityMonitorConfig,
}

/// Day/night capacity windows.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeBasedUsageConfig {
    pub enabled: bool,
    pub day_mode_hours: Vec<i64>,
    pub night_mode_hours: Vec<i64>,
    pub day_mode_capacity_threshold: f64,
    pub night_mode_capacity_threshold: f64,
}

impl Default for TimeBasedUsageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            day_mode_hours: DEFAULT_DAY_MODE_HOURS.to_vec(),
            night_mode_hours: DEFAULT_NIGHT_MODE_HOURS.to_vec(),
            day_mode_capacity_threshold: DEFAULT_DAY_THRESHOLD,
            night_mode_capacity_threshold: DEFAULT_NIGHT_THRESHOLD,
        }
    }
}

/// Capacity monitor timing and event settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CapacityMonitorConfig {
    pub min_check_interval_ms: u64,
    pub max_check_interval_ms: u64,
    pub warning_threshold: f64,
    pub emit_warnings: bool,
    pub emit_exhausted: bool,
}

impl Default for CapacityMonitorConfig {
    fn default() -> Self {
        Self {
            min_check_interval_ms: 60_000,
            max_check_interval_ms: 300_000,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            emit_warnings: false,
            emit_exhausted: true,
        }
    }
}

/// Spend limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Daily budget in the provider's cost unit.
    pub daily_budget: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { daily_budget: 10.0 }
    }
}

/// Where the binary reads usage figures from.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UsageConfig {
    /// JSON usage file maintained by the daemon.
    pub file: Option<PathBuf>,
}

impl UsageConfig {
    /// Configured usage file, or `<data_local_dir>/pacer/usage.json`.
    pub fn file_path(&self) -> PathBuf {
        self.file.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pacer")
                .join("usage.json")
        })
    }
}
