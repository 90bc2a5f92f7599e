//! Capacity monitoring.
//!
//! [`CapacityMonitor`] owns the control loop: it re-evaluates capacity on a
//! self-adjusting timer and notifies listeners when dispatch becomes blocked
//! or unblocked.

mod capacity_monitor;
mod events;
mod listeners;
mod snapshot;

pub use capacity_monitor::CapacityMonitor;
pub use events::{CapacityExhausted, CapacityRestored, CapacityWarning, EventKind, MonitorEvent, MonitorFailure};
pub use listeners::{DispatchReport, Handler, ListenerId, ListenerRegistry};
pub use snapshot::{MonitorStats, Snapshot, is_blocked};
