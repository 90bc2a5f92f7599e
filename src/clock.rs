//! Wall-clock access for Pacer
//!
//! All capacity decisions are made against local wall-clock time. Pure
//! functions take `now` as an argument; only the monitor reads a [`Clock`].

use std::sync::{Arc, Mutex};

use chrono::{Datelike, Local, NaiveDateTime, NaiveTime};

/// Source of the current local wall-clock time.
pub trait Clock: Send + Sync {
    /// Current local time.
    fn now(&self) -> NaiveDateTime;
}

/// Clock backed by the system's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Settable clock shared between clones.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl ManualClock {
    /// Create a clock frozen at `now`.
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: chrono::TimeDelta) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Start of the calendar day following `now`.
pub fn next_midnight(now: NaiveDateTime) -> NaiveDateTime {
    let date = now.date();
    date.succ_opt().unwrap_or(date).and_time(NaiveTime::MIN)
}

/// Whether two timestamps fall on the same calendar day.
///
/// Compares year, month and day-of-month rather than elapsed time, so a
/// midnight crossing counts even when far less than 24h has passed.
pub fn same_calendar_day(a: NaiveDateTime, b: NaiveDateTime) -> bool {
    a.year() == b.year() && a.month() == b.month() && a.day() == b.day()
}

/// Convert the (non-negative part of the) gap between two instants to a std duration.
pub fn duration_between(from: NaiveDateTime, to: NaiveDateTime) -> std::time::Duration {
    (to - from).to_std().unwrap_or(std::time::Duration::ZERO)
}
