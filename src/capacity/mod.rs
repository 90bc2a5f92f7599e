//! Pure capacity functions.
//!
//! This module provides the deterministic building blocks of the control loop:
//! - **Window resolution**: which of day/night/off-hours is active, and when
//!   that can next change.
//! - **Evaluation**: budget consumption against the active window's threshold.
//! - **Scheduling**: how long the monitor may sleep before it must look again.
//! - **Classification**: why capacity was restored after being exhausted.
//!
//! None of these read a clock or touch shared state; the monitor feeds them
//! `now`, the configuration and the provider's figures.

mod classify;
mod evaluate;
mod schedule;
mod window;

pub use classify::{RestorationReason, classify_restoration};
pub use evaluate::{CapacityInfo, UNWINDOWED_THRESHOLD, evaluate_capacity, threshold_for};
pub use schedule::{MIN_TIMER_DELAY, next_check_delay};
pub use window::{TimeWindow, WindowMode, resolve_window};
