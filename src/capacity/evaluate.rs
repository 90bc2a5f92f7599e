//! Capacity evaluation: budget consumption against the active window's threshold.

use serde::{Deserialize, Serialize};

use super::window::{TimeWindow, WindowMode};
use crate::config::MonitorConfig;
use crate::usage::UsageStats;

/// Threshold used whenever no time-based window is in effect.
pub const UNWINDOWED_THRESHOLD: f64 = 1.0;

/// Verdict on whether new work may be dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityInfo {
    /// Fraction of the daily budget consumed.
    pub current_percentage: f64,
    pub threshold: f64,
    pub should_pause: bool,
    /// Present only when `should_pause`.
    pub reason: Option<String>,
}

/// Threshold that applies to `window` under `config`.
pub fn threshold_for(window: &TimeWindow, config: &MonitorConfig) -> f64 {
    if !config.time_based_enabled {
        return UNWINDOWED_THRESHOLD;
    }
    match window.mode {
        WindowMode::Day => config.day_mode_capacity_threshold,
        WindowMode::Night => config.night_mode_capacity_threshold,
        WindowMode::OffHours => UNWINDOWED_THRESHOLD,
    }
}

/// Evaluate `usage` against `daily_budget` for the given window.
///
/// Total over all inputs: a missing, negative or non-finite budget counts as
/// zero and yields a percentage of zero.
pub fn evaluate_capacity(
    usage: &UsageStats,
    daily_budget: f64,
    window: &TimeWindow,
    config: &MonitorConfig,
) -> CapacityInfo {
    let current_percentage = if daily_budget > 0.0 && daily_budget.is_finite() && usage.total_cost.is_finite() {
        usage.total_cost / daily_budget
    } else {
        0.0
    };
    let threshold = threshold_for(window, config);
    let should_pause = current_percentage >= threshold;
    let reason = should_pause.then(|| {
        format!(
            "Capacity threshold exceeded ({:.1}% >= {:.1}%)",
            current_percentage * 100.0,
            threshold * 100.0
        )
    });

    CapacityInfo {
        current_percentage,
        threshold,
        should_pause,
        reason,
    }
}
