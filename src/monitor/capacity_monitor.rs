//! Capacity Monitor - the self-rescheduling control loop
//!
//! Each tick:
//! - Resolves the active time window
//! - Evaluates current usage against that window's threshold
//! - Compares the verdict with the previous snapshot and emits at most one
//!   transition event
//! - Computes how long it may sleep before it must look again, and re-arms
//!
//! The timer is a one-shot sleep re-armed after every tick with a fresh delay.
//! Timer ticks, `check_now`, `start` and `destroy` all pass through one tick
//! guard, so at most one evaluation per monitor is ever in flight and the
//! snapshot only moves forward.

use std::cell::RefCell;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::events::{CapacityExhausted, CapacityRestored, CapacityWarning, EventKind, MonitorEvent, MonitorFailure};
use super::listeners::{Handler, ListenerId, ListenerRegistry};
use super::snapshot::{MonitorStats, Snapshot};
use crate::capacity::{
    CapacityInfo, MIN_TIMER_DELAY, TimeWindow, classify_restoration, evaluate_capacity, next_check_delay,
    resolve_window,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigSource, MonitorConfig};
use crate::error::{PacerError, Result};
use crate::usage::UsageStatsProvider;

/// Buffered events per broadcast subscriber.
const EVENT_CHANNEL_CAPACITY: usize = 256;

static NEXT_MONITOR_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// Monitors whose tick guard is held by this thread.
    static TICKING: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Exclusive right to evaluate and move the snapshot.
struct TickGuard<'a> {
    monitor: u64,
    _lock: MutexGuard<'a, ()>,
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        TICKING.with_borrow_mut(|ticking| {
            if let Some(pos) = ticking.iter().rposition(|id| *id == self.monitor) {
                ticking.remove(pos);
            }
        });
    }
}

enum Lifecycle {
    Stopped,
    Running { timer: JoinHandle<()> },
    Destroyed,
}

/// State shared between the monitor handle and its timer task.
struct Shared {
    id: u64,
    config: Box<dyn ConfigSource>,
    provider: Box<dyn UsageStatsProvider>,
    clock: Box<dyn Clock>,
    listeners: ListenerRegistry,
    event_tx: broadcast::Sender<MonitorEvent>,
    /// Held for a whole evaluation, listener dispatch included.
    tick_lock: Mutex<()>,
    snapshot: Mutex<Option<Snapshot>>,
    stats: Mutex<MonitorStats>,
    /// Delay used when the configuration itself cannot be read.
    fallback_delay: Mutex<Duration>,
    /// Bumped on every start and stop; a timer task exits once it no longer
    /// matches the epoch it was armed under.
    epoch: AtomicU64,
}

impl Shared {
    fn lock_snapshot(&self) -> MutexGuard<'_, Option<Snapshot>> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_stats(&self) -> MutexGuard<'_, MonitorStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the tick guard, waiting for any tick in flight.
    ///
    /// Returns `None` when this thread already holds it, i.e. when called
    /// from a listener during dispatch.
    fn enter_tick(&self) -> Option<TickGuard<'_>> {
        if TICKING.with_borrow(|ticking| ticking.contains(&self.id)) {
            return None;
        }
        let lock = self.tick_lock.lock().unwrap_or_else(|e| e.into_inner());
        TICKING.with_borrow_mut(|ticking| ticking.push(self.id));
        Some(TickGuard {
            monitor: self.id,
            _lock: lock,
        })
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn fallback_delay(&self) -> Duration {
        *self.fallback_delay.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remember_fallback(&self, config: &MonitorConfig) {
        let delay = config.min_check_interval.min(config.max_check_interval).max(MIN_TIMER_DELAY);
        *self.fallback_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Ask the provider for usage and evaluate it for `window`.
    fn observe(&self, config: &MonitorConfig, window: &TimeWindow) -> Result<CapacityInfo> {
        let reading = self.provider.reading()?;
        reading.usage.validate()?;
        Ok(evaluate_capacity(&reading.usage, reading.daily_budget, window, config))
    }

    /// Derive a fresh baseline snapshot. Returns the first timer delay.
    ///
    /// Caller holds the tick guard.
    fn initialize(&self) -> (Duration, Option<(PacerError, NaiveDateTime)>) {
        let now = self.clock.now();
        let config = match self.config.load() {
            Ok(config) => config,
            Err(e) => {
                *self.lock_snapshot() = None;
                return (self.fallback_delay(), Some((e, now)));
            }
        };
        self.remember_fallback(&config);
        let window = resolve_window(now, &config);
        let delay = next_check_delay(now, &window, &config);

        match self.observe(&config, &window) {
            Ok(capacity) => {
                let snapshot = Snapshot::new(capacity, window, now, &config);
                tracing::info!(
                    mode = %snapshot.time_window.mode,
                    percentage = snapshot.capacity.current_percentage,
                    threshold = snapshot.capacity.threshold,
                    should_pause = snapshot.should_pause,
                    "Capacity baseline established"
                );
                *self.lock_snapshot() = Some(snapshot);
                (delay, None)
            }
            Err(e) => {
                *self.lock_snapshot() = None;
                (delay, Some((e, now)))
            }
        }
    }

    /// Run one evaluation and return the delay until the next mandatory check.
    ///
    /// Failures are reported as `MonitorError` events and leave the snapshot
    /// untouched. Caller holds the tick guard.
    fn tick(&self) -> Duration {
        let now = self.clock.now();
        self.lock_stats().tick();

        let config = match self.config.load() {
            Ok(config) => config,
            Err(e) => {
                self.fail(&e, now);
                return self.fallback_delay();
            }
        };
        self.remember_fallback(&config);
        let window = resolve_window(now, &config);
        let delay = next_check_delay(now, &window, &config);

        match self.observe(&config, &window) {
            Ok(capacity) => {
                if let Some(event) = self.advance(now, &config, window, capacity) {
                    self.emit(event);
                }
            }
            Err(e) => self.fail(&e, now),
        }

        delay
    }

    /// Replace the snapshot, returning the transition event it implies.
    fn advance(
        &self,
        now: NaiveDateTime,
        config: &MonitorConfig,
        window: TimeWindow,
        capacity: CapacityInfo,
    ) -> Option<MonitorEvent> {
        let current = Snapshot::new(capacity, window, now, config);
        tracing::debug!(
            mode = %current.time_window.mode,
            percentage = current.capacity.current_percentage,
            threshold = current.capacity.threshold,
            should_pause = current.should_pause,
            "Capacity tick"
        );

        let mut guard = self.lock_snapshot();
        // First observation only establishes the baseline
        let event = guard.as_ref().and_then(|prior| transition_event(prior, &current, config));
        *guard = Some(current);
        event
    }

    fn fail(&self, error: &PacerError, now: NaiveDateTime) {
        self.lock_stats().failed();
        tracing::warn!(error = %error, "Capacity check failed");
        self.emit(MonitorEvent::MonitorError(MonitorFailure {
            error: error.to_string(),
            timestamp: now,
        }));
    }

    fn emit(&self, event: MonitorEvent) {
        {
            let mut stats = self.lock_stats();
            match &event {
                MonitorEvent::CapacityRestored(e) => {
                    stats.restored_count += 1;
                    tracing::info!(reason = %e.reason, mode = %e.time_window.mode, "Capacity restored");
                }
                MonitorEvent::CapacityExhausted(e) => {
                    stats.exhausted_count += 1;
                    tracing::info!(
                        mode = %e.time_window.mode,
                        reason = e.capacity.reason.as_deref().unwrap_or("outside active window"),
                        "Capacity exhausted"
                    );
                }
                MonitorEvent::CapacityWarning(e) => {
                    stats.warning_count += 1;
                    tracing::info!(percentage = e.percentage, threshold = e.threshold, "Capacity warning");
                }
                _ => {}
            }
        }

        // No subscribers is fine
        let _ = self.event_tx.send(event.clone());
        let report = self.listeners.dispatch(&event);
        tracing::debug!(
            event = %event.kind(),
            delivered = report.delivered,
            failed = report.failed,
            "Capacity event dispatched"
        );
    }

    /// One timer-driven tick. `None` once the timer armed under `epoch` is stale.
    fn timer_tick(&self, epoch: u64) -> Option<Duration> {
        let _guard = self.enter_tick()?;
        if !self.is_current(epoch) {
            return None;
        }
        let delay = self.tick();
        // Stopped while the tick ran: let it finish but do not re-arm
        if !self.is_current(epoch) {
            return None;
        }
        self.lock_stats().scheduled(delay);
        Some(delay)
    }
}

/// Decide which event, if any, the move from `prior` to `current` produces.
///
/// At most one of restored/exhausted/warning is returned.
fn transition_event(prior: &Snapshot, current: &Snapshot, config: &MonitorConfig) -> Option<MonitorEvent> {
    if prior.should_pause && !current.should_pause {
        let reason = classify_restoration(prior, &current.time_window, current.timestamp);
        Some(MonitorEvent::CapacityRestored(CapacityRestored {
            reason,
            previous_capacity: prior.capacity.clone(),
            new_capacity: current.capacity.clone(),
            time_window: current.time_window.clone(),
            timestamp: current.timestamp,
        }))
    } else if !prior.should_pause && current.should_pause && config.emit_exhausted {
        Some(MonitorEvent::CapacityExhausted(CapacityExhausted {
            capacity: current.capacity.clone(),
            time_window: current.time_window.clone(),
            timestamp: current.timestamp,
        }))
    } else if config.emit_warnings && !current.should_pause {
        let warning_level = current.capacity.threshold * config.warning_threshold;
        (current.capacity.current_percentage >= warning_level).then(|| {
            MonitorEvent::CapacityWarning(CapacityWarning {
                percentage: current.capacity.current_percentage,
                threshold: current.capacity.threshold,
            })
        })
    } else {
        None
    }
}

fn arm_timer(shared: &Arc<Shared>, runtime: &Handle, first_delay: Duration, epoch: u64) -> JoinHandle<()> {
    let weak = Arc::downgrade(shared);
    runtime.spawn(async move {
        let mut delay = first_delay;
        loop {
            tokio::time::sleep(delay).await;

            let Some(shared) = weak.upgrade() else { break };
            let Some(next) = shared.timer_tick(epoch) else { break };
            delay = next;
            tracing::debug!(delay_ms = delay.as_millis() as u64, "Next capacity check armed");
        }
    })
}

/// Watches dispatch capacity and emits events when it changes.
///
/// Requires a tokio runtime to `start`; queries work anywhere.
pub struct CapacityMonitor {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl CapacityMonitor {
    /// Create a stopped monitor that reads the system clock.
    pub fn new(config: impl ConfigSource + 'static, provider: impl UsageStatsProvider + 'static) -> Self {
        Self::with_clock(config, provider, SystemClock)
    }

    /// Create a stopped monitor driven by `clock`.
    pub fn with_clock(
        config: impl ConfigSource + 'static,
        provider: impl UsageStatsProvider + 'static,
        clock: impl Clock + 'static,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let fallback = MonitorConfig::default().min_check_interval;

        Self {
            shared: Arc::new(Shared {
                id: NEXT_MONITOR_ID.fetch_add(1, Ordering::Relaxed),
                config: Box::new(config),
                provider: Box::new(provider),
                clock: Box::new(clock),
                listeners: ListenerRegistry::new(),
                event_tx,
                tick_lock: Mutex::new(()),
                snapshot: Mutex::new(None),
                stats: Mutex::new(MonitorStats::new()),
                fallback_delay: Mutex::new(fallback),
                epoch: AtomicU64::new(0),
            }),
            lifecycle: Mutex::new(Lifecycle::Stopped),
        }
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Establish a baseline snapshot and arm the timer.
    ///
    /// No-op when already running. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let guard = self.shared.enter_tick();
        let failure = {
            let mut lifecycle = self.lock_lifecycle();
            match *lifecycle {
                Lifecycle::Running { .. } => return Ok(()),
                Lifecycle::Destroyed => return Err(PacerError::Destroyed),
                Lifecycle::Stopped => {}
            }
            let runtime = Handle::try_current().map_err(|_| PacerError::NoRuntime)?;

            let (delay, failure) = self.shared.initialize();
            let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            let timer = arm_timer(&self.shared, &runtime, delay, epoch);
            self.shared.lock_stats().scheduled(delay);
            *lifecycle = Lifecycle::Running { timer };

            tracing::info!(delay_ms = delay.as_millis() as u64, "Capacity monitor started");
            failure
        };
        drop(guard);

        if let Some((error, now)) = failure {
            self.shared.fail(&error, now);
        }
        self.shared.emit(MonitorEvent::MonitorStarted);
        Ok(())
    }

    /// Disarm the timer. The last snapshot is kept.
    ///
    /// A tick already in progress finishes, but nothing is re-armed after it.
    pub fn stop(&self) {
        let timer = {
            let mut lifecycle = self.lock_lifecycle();
            match mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running { timer } => timer,
                other => {
                    *lifecycle = other;
                    return;
                }
            }
        };

        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        timer.abort();
        tracing::info!("Capacity monitor stopped");
        self.shared.emit(MonitorEvent::MonitorStopped);
    }

    /// Stop, then release every listener and the snapshot. Terminal.
    pub fn destroy(&self) {
        self.stop();
        // A tick already in flight finishes before the snapshot is released
        let _guard = self.shared.enter_tick();
        {
            let mut lifecycle = self.lock_lifecycle();
            if matches!(*lifecycle, Lifecycle::Destroyed) {
                return;
            }
            *lifecycle = Lifecycle::Destroyed;
        }
        self.shared.listeners.clear();
        *self.shared.lock_snapshot() = None;
        tracing::info!("Capacity monitor destroyed");
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.lock_lifecycle(), Lifecycle::Running { .. })
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(*self.lock_lifecycle(), Lifecycle::Destroyed)
    }

    /// Evaluate immediately, exactly like a timer tick but without re-arming.
    ///
    /// Waits for a timer tick already in flight. Fails with
    /// [`PacerError::TickInProgress`] when called from a listener of this
    /// monitor during dispatch.
    pub fn check_now(&self) -> Result<()> {
        if !self.is_active() {
            return Err(PacerError::InactiveMonitor);
        }
        let Some(_guard) = self.shared.enter_tick() else {
            return Err(PacerError::TickInProgress);
        };
        // Stopped while waiting for the guard
        if !self.is_active() {
            return Err(PacerError::InactiveMonitor);
        }
        self.shared.tick();
        Ok(())
    }

    /// Capacity right now, computed fresh without touching the snapshot.
    pub fn current_capacity(&self) -> Result<CapacityInfo> {
        let now = self.shared.clock.now();
        let config = self.shared.config.load()?;
        let window = resolve_window(now, &config);
        self.shared.observe(&config, &window)
    }

    /// Window active at `now`, or at the monitor clock's current time.
    pub fn current_time_window(&self, now: Option<NaiveDateTime>) -> Result<TimeWindow> {
        let now = now.unwrap_or_else(|| self.shared.clock.now());
        let config = self.shared.config.load()?;
        Ok(resolve_window(now, &config))
    }

    /// Register `handler` for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&MonitorEvent) -> eyre::Result<()> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.shared.listeners.add(Some(kind), handler)
    }

    /// Register `handler` for every event.
    pub fn on_any<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&MonitorEvent) -> eyre::Result<()> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.shared.listeners.add(None, handler)
    }

    /// Unregister a handler added with [`CapacityMonitor::on`].
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.shared.listeners.remove(kind, id)
    }

    /// Unregister a handler regardless of how it was added.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove_id(id)
    }

    pub fn listener_count(&self) -> usize {
        self.shared.listeners.len()
    }

    /// Receive every event over a channel.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.shared.event_tx.subscribe()
    }

    pub fn stats(&self) -> MonitorStats {
        self.shared.lock_stats().clone()
    }

    pub fn last_snapshot(&self) -> Option<Snapshot> {
        self.shared.lock_snapshot().clone()
    }
}

impl Drop for CapacityMonitor {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Lifecycle::Running { timer } = mem::replace(lifecycle, Lifecycle::Stopped) {
            self.shared.epoch.fetch_add(1, Ordering::SeqCst);
            timer.abort();
        }
    }
}
