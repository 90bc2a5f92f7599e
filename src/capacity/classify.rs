//! Restoration classification.
//!
//! When capacity comes back, listeners want to know why. Rules are checked in
//! a fixed order and the first match wins:
//!
//! 1. The window mode changed -> [`RestorationReason::ModeSwitch`]
//! 2. The calendar day changed -> [`RestorationReason::BudgetReset`]
//! 3. Otherwise -> [`RestorationReason::UsageDecreased`]
//!
//! A mode switch that coincides with a day rollover is reported as a mode switch.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::window::TimeWindow;
use crate::clock::same_calendar_day;
use crate::monitor::Snapshot;

/// Why dispatch capacity was restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorationReason {
    ModeSwitch,
    BudgetReset,
    UsageDecreased,
}

impl RestorationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestorationReason::ModeSwitch => "mode_switch",
            RestorationReason::BudgetReset => "budget_reset",
            RestorationReason::UsageDecreased => "usage_decreased",
        }
    }
}

impl fmt::Display for RestorationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a blocked-to-unblocked transition observed at `now`.
pub fn classify_restoration(previous: &Snapshot, current: &TimeWindow, now: NaiveDateTime) -> RestorationReason {
    if previous.time_window.mode != current.mode {
        RestorationReason::ModeSwitch
    } else if !same_calendar_day(previous.timestamp, now) {
        RestorationReason::BudgetReset
    } else {
        RestorationReason::UsageDecreased
    }
}
