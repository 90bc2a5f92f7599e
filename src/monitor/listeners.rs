//! Typed listener registry.
//!
//! Handlers are keyed by [`EventKind`]. Dispatch iterates a copy of the
//! registrations, so handlers may subscribe or unsubscribe from inside a
//! callback. A failing or panicking handler is logged and skipped; it never
//! stops delivery to the remaining handlers.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::events::{EventKind, MonitorEvent};

/// Callback invoked with each matching event.
pub type Handler = Arc<dyn Fn(&MonitorEvent) -> eyre::Result<()> + Send + Sync>;

/// Handle returned by registration, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone)]
struct Registration {
    id: ListenerId,
    /// `None` matches every kind.
    kind: Option<EventKind>,
    handler: Handler,
}

impl Registration {
    fn matches(&self, kind: EventKind) -> bool {
        self.kind.is_none_or(|k| k == kind)
    }
}

/// Outcome of delivering one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Listener registrations for a monitor.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    registrations: Mutex<Vec<Registration>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
        self.registrations.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `handler` for `kind`, or for every kind when `kind` is `None`.
    pub fn add(&self, kind: Option<EventKind>, handler: Handler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Registration { id, kind, handler });
        id
    }

    /// Remove the registration `id` made for `kind`.
    pub fn remove(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut registrations = self.lock();
        let before = registrations.len();
        registrations.retain(|r| !(r.id == id && r.kind == Some(kind)));
        registrations.len() != before
    }

    /// Remove registration `id` whatever it was registered for.
    pub fn remove_id(&self, id: ListenerId) -> bool {
        let mut registrations = self.lock();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Deliver `event` to every matching handler.
    pub fn dispatch(&self, event: &MonitorEvent) -> DispatchReport {
        let kind = event.kind();
        let targets: Vec<Registration> = self.lock().iter().filter(|r| r.matches(kind)).cloned().collect();

        let mut report = DispatchReport::default();
        for registration in targets {
            match catch_unwind(AssertUnwindSafe(|| (registration.handler)(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(listener = registration.id.0, event = %kind, error = %e, "Capacity listener failed");
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::error!(listener = registration.id.0, event = %kind, "Capacity listener panicked");
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Handler) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handler: Handler = Arc::new(move |_: &MonitorEvent| -> eyre::Result<()> {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (count, handler)
    }

    #[test]
    fn test_dispatch_only_to_matching_kind() {
        let registry = ListenerRegistry::new();
        let (started, h1) = counter();
        let (stopped, h2) = counter();
        registry.add(Some(EventKind::MonitorStarted), h1);
        registry.add(Some(EventKind::MonitorStopped), h2);

        let report = registry.dispatch(&MonitorEvent::MonitorStarted);
        assert_eq!(report, DispatchReport { delivered: 1, failed: 0 });
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(stopped.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_any_listener_sees_everything() {
        let registry = ListenerRegistry::new();
        let (count, handler) = counter();
        registry.add(None, handler);

        let started = registry.dispatch(&MonitorEvent::MonitorStarted);
        let stopped = registry.dispatch(&MonitorEvent::MonitorStopped);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(started.delivered, 1);
        assert_eq!(stopped.delivered, 1);
    }

    #[test]
    fn test_remove_requires_matching_kind() {
        let registry = ListenerRegistry::new();
        let (_count, handler) = counter();
        let id = registry.add(Some(EventKind::MonitorStarted), handler);

        assert!(!registry.remove(EventKind::MonitorStopped, id));
        assert!(registry.remove(EventKind::MonitorStarted, id));
        assert!(!registry.remove(EventKind::MonitorStarted, id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_id() {
        let registry = ListenerRegistry::new();
        let (_count, handler) = counter();
        let id = registry.add(None, handler);
        assert!(registry.remove_id(id));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_failing_listener_does_not_block_others() {
        let registry = ListenerRegistry::new();
        registry.add(
            None,
            Arc::new(|_: &MonitorEvent| -> eyre::Result<()> { eyre::bail!("listener bug") }),
        );
        registry.add(
            None,
            Arc::new(|_: &MonitorEvent| -> eyre::Result<()> { panic!("listener panic") }),
        );
        let (count, handler) = counter();
        registry.add(None, handler);

        let report = registry.dispatch(&MonitorEvent::MonitorStopped);
        assert_eq!(report, DispatchReport { delivered: 1, failed: 2 });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_can_unsubscribe_itself() {
        let registry = Arc::new(ListenerRegistry::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let (count, _) = counter();

        let r = registry.clone();
        let s = slot.clone();
        let c = count.clone();
        let id = registry.add(
            Some(EventKind::MonitorStarted),
            Arc::new(move |_: &MonitorEvent| -> eyre::Result<()> {
                c.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *s.lock().unwrap() {
                    r.remove(EventKind::MonitorStarted, id);
                }
                Ok(())
            }),
        );
        *slot.lock().unwrap() = Some(id);

        registry.dispatch(&MonitorEvent::MonitorStarted);
        registry.dispatch(&MonitorEvent::MonitorStarted);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = ListenerRegistry::new();
        let (_c1, h1) = counter();
        let (_c2, h2) = counter();
        assert_ne!(registry.add(None, h1), registry.add(None, h2));
    }
}
