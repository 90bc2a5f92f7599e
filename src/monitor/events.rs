//! Events emitted by the capacity monitor.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::capacity::{CapacityInfo, RestorationReason, TimeWindow};

/// Capacity came back after being exhausted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityRestored {
    pub reason: RestorationReason,
    pub previous_capacity: CapacityInfo,
    pub new_capacity: CapacityInfo,
    pub time_window: TimeWindow,
    pub timestamp: NaiveDateTime,
}

/// Dispatch became blocked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityExhausted {
    pub capacity: CapacityInfo,
    pub time_window: TimeWindow,
    pub timestamp: NaiveDateTime,
}

/// Usage is approaching the active threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityWarning {
    pub percentage: f64,
    pub threshold: f64,
}

/// A tick failed; the loop carries on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorFailure {
    pub error: String,
    pub timestamp: NaiveDateTime,
}

/// Everything a listener can observe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    CapacityRestored(CapacityRestored),
    CapacityExhausted(CapacityExhausted),
    CapacityWarning(CapacityWarning),
    MonitorStarted,
    MonitorStopped,
    MonitorError(MonitorFailure),
}

impl MonitorEvent {
    /// The subscription key for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            MonitorEvent::CapacityRestored(_) => EventKind::CapacityRestored,
            MonitorEvent::CapacityExhausted(_) => EventKind::CapacityExhausted,
            MonitorEvent::CapacityWarning(_) => EventKind::CapacityWarning,
            MonitorEvent::MonitorStarted => EventKind::MonitorStarted,
            MonitorEvent::MonitorStopped => EventKind::MonitorStopped,
            MonitorEvent::MonitorError(_) => EventKind::MonitorError,
        }
    }
}

/// Subscription key, one per [`MonitorEvent`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CapacityRestored,
    CapacityExhausted,
    CapacityWarning,
    MonitorStarted,
    MonitorStopped,
    MonitorError,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::CapacityRestored,
        EventKind::CapacityExhausted,
        EventKind::CapacityWarning,
        EventKind::MonitorStarted,
        EventKind::MonitorStopped,
        EventKind::MonitorError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CapacityRestored => "capacity_restored",
            EventKind::CapacityExhausted => "capacity_exhausted",
            EventKind::CapacityWarning => "capacity_warning",
            EventKind::MonitorStarted => "monitor_started",
            EventKind::MonitorStopped => "monitor_stopped",
            EventKind::MonitorError => "monitor_error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
