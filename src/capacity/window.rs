//! Time window resolution.
//!
//! Maps a wall-clock instant to the active day/night/off-hours window and the
//! next hour boundary at which that answer may change.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};

use crate::clock::next_midnight;
use crate::config::MonitorConfig;

/// Which capacity window an hour belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowMode {
    Day,
    Night,
    OffHours,
}

impl WindowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowMode::Day => "day",
            WindowMode::Night => "night",
            WindowMode::OffHours => "off-hours",
        }
    }
}

impl fmt::Display for WindowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The window in effect at a given instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub mode: WindowMode,
    /// Lowest hour of the active hour set (0 for off-hours).
    pub start_hour: u32,
    /// Highest hour of the active hour set (23 for off-hours).
    pub end_hour: u32,
    /// True only for day and night windows.
    pub is_active: bool,
    /// Always strictly after the instant the window was resolved for.
    pub next_transition: NaiveDateTime,
}

impl TimeWindow {
    fn off_hours(next_transition: NaiveDateTime) -> Self {
        Self {
            mode: WindowMode::OffHours,
            start_hour: 0,
            end_hour: 23,
            is_active: false,
            next_transition,
        }
    }

    fn active(mode: WindowMode, hours: &BTreeSet<u32>, next_transition: NaiveDateTime) -> Self {
        Self {
            mode,
            start_hour: hours.first().copied().unwrap_or(0),
            end_hour: hours.last().copied().unwrap_or(23),
            is_active: true,
            next_transition,
        }
    }
}

/// Resolve the window active at `now`.
///
/// Deterministic: reads no clock and no global state.
pub fn resolve_window(now: NaiveDateTime, config: &MonitorConfig) -> TimeWindow {
    if !config.time_based_enabled {
        return TimeWindow::off_hours(next_midnight(now));
    }

    let hour = now.hour();
    let next = next_transition(now, config);

    if config.day_mode_hours.contains(&hour) {
        TimeWindow::active(WindowMode::Day, &config.day_mode_hours, next)
    } else if config.night_mode_hours.contains(&hour) {
        TimeWindow::active(WindowMode::Night, &config.night_mode_hours, next)
    } else {
        TimeWindow::off_hours(next)
    }
}

/// Next boundary hour after `now` drawn from the union of day and night hours.
///
/// Falls back to the earliest boundary hour tomorrow, or to midnight when no
/// hours are configured at all.
///
/// The end of a window is not itself a boundary: at 17:30 with day hours
/// 9..=17 and night hours from 22 this reports 22:00, not 18:00. The minimum
/// check interval caps the wait, so the switch to off-hours is still seen
/// within one interval.
fn next_transition(now: NaiveDateTime, config: &MonitorConfig) -> NaiveDateTime {
    let boundaries: BTreeSet<u32> = config.day_mode_hours.union(&config.night_mode_hours).copied().collect();
    let Some(&earliest) = boundaries.first() else {
        return next_midnight(now);
    };

    let today = now.date().and_time(NaiveTime::MIN);
    match boundaries.range(now.hour() + 1..).next() {
        Some(&h) => today + TimeDelta::hours(i64::from(h)),
        None => next_midnight(now) + TimeDelta::hours(i64::from(earliest)),
    }
}
