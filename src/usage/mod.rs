//! Usage statistics consumed by the capacity monitor.
//!
//! How cost is computed or billed lives outside this crate; the monitor only
//! sees it through [`UsageStatsProvider`].

mod file;

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{PacerError, Result};

pub use file::{FileUsageProvider, UsageDocument};

/// Aggregate usage for the current budget period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageStats {
    pub total_tokens: u64,
    /// Spend so far, in the same unit as the daily budget.
    pub total_cost: f64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
}

impl UsageStats {
    /// Usage with only a cost figure.
    pub fn with_cost(total_cost: f64) -> Self {
        Self {
            total_cost,
            ..Self::default()
        }
    }

    /// Reject figures the evaluator cannot reason about.
    pub fn validate(&self) -> Result<()> {
        if !self.total_cost.is_finite() {
            return Err(PacerError::MalformedUsage(format!(
                "total_cost is not finite: {}",
                self.total_cost
            )));
        }
        if self.total_cost < 0.0 {
            return Err(PacerError::MalformedUsage(format!(
                "total_cost is negative: {}",
                self.total_cost
            )));
        }
        Ok(())
    }
}

/// Usage and budget taken from one consistent read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageReading {
    pub usage: UsageStats,
    pub daily_budget: f64,
}

/// Source of current usage, polled at least once per tick.
///
/// Implementations must be cheap and must not block indefinitely.
pub trait UsageStatsProvider: Send + Sync {
    /// Usage accumulated in the current budget period.
    fn current_usage(&self) -> Result<UsageStats>;

    /// Number of tasks currently executing.
    fn active_task_count(&self) -> Result<usize>;

    /// Budget for the current day.
    fn daily_budget(&self) -> Result<f64>;

    /// Usage paired with the budget it is measured against.
    ///
    /// The default makes two calls; providers backed by a single document
    /// should override it so both figures come from the same version.
    fn reading(&self) -> Result<UsageReading> {
        Ok(UsageReading {
            usage: self.current_usage()?,
            daily_budget: self.daily_budget()?,
        })
    }
}

#[derive(Debug, Default)]
struct SharedUsageState {
    usage: UsageStats,
    active_tasks: usize,
    daily_budget: f64,
    failure: Option<String>,
}

/// In-memory provider whose figures can be changed from anywhere.
///
/// Clones share state, so a test or the embedding daemon can hold one handle
/// while the monitor polls another.
#[derive(Debug, Clone, Default)]
pub struct SharedUsage {
    state: Arc<Mutex<SharedUsageState>>,
}

impl SharedUsage {
    /// Provider reporting `total_cost` against `daily_budget`.
    pub fn new(total_cost: f64, daily_budget: f64) -> Self {
        let usage = Self::default();
        usage.set_daily_budget(daily_budget);
        usage.set_cost(total_cost);
        usage
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SharedUsageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_cost(&self, total_cost: f64) {
        self.lock().usage.total_cost = total_cost;
    }

    pub fn set_usage(&self, usage: UsageStats) {
        self.lock().usage = usage;
    }

    pub fn set_daily_budget(&self, daily_budget: f64) {
        self.lock().daily_budget = daily_budget;
    }

    pub fn set_active_tasks(&self, count: usize) {
        self.lock().active_tasks = count;
    }

    /// Make every subsequent call fail with `message`.
    pub fn fail_with(&self, message: &str) {
        self.lock().failure = Some(message.to_string());
    }

    /// Stop injecting failures.
    pub fn recover(&self) {
        self.lock().failure = None;
    }

    fn check_failure(state: &SharedUsageState) -> Result<()> {
        match &state.failure {
            Some(message) => Err(PacerError::Provider(message.clone())),
            None => Ok(()),
        }
    }
}

impl UsageStatsProvider for SharedUsage {
    fn current_usage(&self) -> Result<UsageStats> {
        let state = self.lock();
        Self::check_failure(&state)?;
        Ok(state.usage)
    }

    fn active_task_count(&self) -> Result<usize> {
        let state = self.lock();
        Self::check_failure(&state)?;
        Ok(state.active_tasks)
    }

    fn daily_budget(&self) -> Result<f64> {
        let state = self.lock();
        Self::check_failure(&state)?;
        Ok(state.daily_budget)
    }

    fn reading(&self) -> Result<UsageReading> {
        let state = self.lock();
        Self::check_failure(&state)?;
        Ok(UsageReading {
            usage: state.usage,
            daily_budget: state.daily_budget,
        })
    }
}
