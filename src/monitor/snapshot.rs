//! Monitor state between ticks.

use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::capacity::{CapacityInfo, TimeWindow};
use crate::config::MonitorConfig;

/// Last observed verdict, the baseline for detecting the next transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Whether dispatch was blocked, by budget or by the window.
    pub should_pause: bool,
    pub capacity: CapacityInfo,
    pub time_window: TimeWindow,
    pub timestamp: NaiveDateTime,
}

impl Snapshot {
    pub fn new(capacity: CapacityInfo, time_window: TimeWindow, timestamp: NaiveDateTime, config: &MonitorConfig) -> Self {
        Self {
            should_pause: is_blocked(&capacity, &time_window, config),
            capacity,
            time_window,
            timestamp,
        }
    }
}

/// Whether dispatch is blocked.
///
/// Over budget always blocks. An inactive window blocks only when time-based
/// usage is enabled; with it disabled the single off-hours window is treated
/// as always open.
pub fn is_blocked(capacity: &CapacityInfo, window: &TimeWindow, config: &MonitorConfig) -> bool {
    capacity.should_pause || (config.time_based_enabled && !window.is_active)
}

/// Running counters for a monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorStats {
    /// Evaluations performed, including failed ones.
    pub tick_count: u64,
    pub error_count: u64,
    pub restored_count: u64,
    pub exhausted_count: u64,
    pub warning_count: u64,
    /// Delay the timer was last armed with.
    pub last_delay: Option<Duration>,
}

impl MonitorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self) {
        self.tick_count += 1;
    }

    pub fn failed(&mut self) {
        self.error_count += 1;
    }

    pub fn scheduled(&mut self, delay: Duration) {
        self.last_delay = Some(delay);
    }
}
