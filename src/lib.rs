//! Pacer - capacity-aware dispatch pacing
//!
//! Pacer decides whether an agent orchestration daemon may dispatch more work
//! right now. It splits the day into day, night and off-hours windows, each with
//! its own share of the daily budget, and watches spend against the active
//! share. A [`monitor::CapacityMonitor`] re-evaluates on a timer that tightens
//! as window boundaries and midnight approach, and tells listeners when
//! dispatch becomes blocked or unblocked.

pub mod capacity;
pub mod clock;
pub mod config;
pub mod error;
pub mod monitor;
pub mod usage;

pub use error::{PacerError, Result};
