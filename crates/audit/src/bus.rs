//! Process-wide publish/subscribe bus for audit events.
//!
//! Publishing never fails. Each subscriber runs in isolation: an `Err` or a
//! panic from one handler is logged and does not reach the publisher or the
//! other handlers.

use crate::event::{AuditEvent, EventSelector};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::warn;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Arc<dyn Fn(&AuditEvent) -> HandlerResult + Send + Sync>;

struct Registration {
    id: u64,
    selector: EventSelector,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<Registration>,
}

struct BusInner {
    registry: Mutex<Registry>,
    sender: broadcast::Sender<AuditEvent>,
}

/// Delivery summary for one published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmitReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct AuditBus {
    inner: Arc<BusInner>,
}

impl Default for AuditBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl AuditBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                registry: Mutex::new(Registry::default()),
                sender,
            }),
        }
    }

    /// Registers a handler for events matching `selector`.
    pub fn on<F>(&self, selector: EventSelector, handler: F) -> Subscription
    where
        F: Fn(&AuditEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let mut registry = self.inner.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push(Registration {
            id,
            selector,
            handler: Arc::new(handler),
        });

        Subscription {
            bus: Arc::downgrade(&self.inner),
            id,
            selector,
        }
    }

    /// Async stream of every event, for consumers that would rather not run
    /// inside the publisher. Slow receivers observe `Lagged` instead of
    /// blocking the bus.
    pub fn stream(&self) -> broadcast::Receiver<AuditEvent> {
        self.inner.sender.subscribe()
    }

    pub fn emit(&self, event: AuditEvent) -> EmitReport {
        // Snapshot so handlers may subscribe or unsubscribe while running.
        let handlers: Vec<Handler> = {
            let registry = self.inner.registry.lock();
            registry
                .handlers
                .iter()
                .filter(|r| r.selector.matches(&event))
                .map(|r| Arc::clone(&r.handler))
                .collect()
        };

        let mut report = EmitReport::default();
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!("Audit subscriber failed on {}: {}", event.name(), e);
                }
                Err(_) => {
                    report.failed += 1;
                    warn!("Audit subscriber panicked on {}", event.name());
                }
            }
        }

        // No receivers is not an error
        let _ = self.inner.sender.send(event);
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.lock().handlers.len()
    }
}

/// Handle returned by [`AuditBus::on`].
///
/// Dropping it leaves the handler registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
pub struct Subscription {
    bus: Weak<BusInner>,
    id: u64,
    selector: EventSelector,
}

impl Subscription {
    pub fn selector(&self) -> EventSelector {
        self.selector
    }

    /// Returns `false` when the bus is gone.
    pub fn unsubscribe(self) -> bool {
        let Some(bus) = self.bus.upgrade() else {
            return false;
        };
        let mut registry = bus.registry.lock();
        let before = registry.handlers.len();
        registry.handlers.retain(|r| r.id != self.id);
        registry.handlers.len() != before
    }
}
