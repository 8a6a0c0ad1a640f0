//! Fan-out of one notification to the listeners that should see it.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use callback_server::NotificationHandler;

use crate::categorizer::{Categorizer, Uncategorized};
use crate::category::EventCategory;
use crate::error::EventsError;
use crate::listener::Listener;
use crate::registry::ListenerRegistry;
use crate::NotificationPayload;

/// Outcome of dispatching one notification.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Concrete category the categorizer assigned, if any
    pub category: Option<EventCategory>,
    /// Listeners that handled the notification successfully
    pub delivered: usize,
    /// One [`EventsError::ListenerInvocation`] per failed listener
    pub failures: Vec<EventsError>,
    /// Listeners removed from the registry because they failed
    pub evicted: Vec<Listener>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

thread_local! {
    /// Address of the dispatcher whose listeners are running on this thread
    static DELIVERING_FOR: Cell<usize> = const { Cell::new(0) };
}

/// Marks one delivery: counted while alive, and flags the current thread as
/// running this dispatcher's listeners.
struct DeliveryGuard<'a> {
    dispatcher: &'a Dispatcher,
    previous: usize,
}

impl<'a> DeliveryGuard<'a> {
    fn enter(dispatcher: &'a Dispatcher) -> Self {
        dispatcher.in_flight.fetch_add(1, Ordering::SeqCst);
        let previous = DELIVERING_FOR.with(|current| current.replace(dispatcher.address()));
        Self {
            dispatcher,
            previous,
        }
    }
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        DELIVERING_FOR.with(|current| current.set(self.previous));
        self.dispatcher.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Resolves listeners for a notification and invokes them.
///
/// Resolution takes a snapshot of the registry and releases its lock before
/// any listener runs. Each listener is invoked at most once per notification.
/// A listener that returns an error or panics is logged, does not affect the
/// others, and is evicted from every category it was resolved under once all
/// invocations for the notification have finished.
pub struct Dispatcher {
    registry: Arc<ListenerRegistry>,
    categorizer: Arc<dyn Categorizer>,
    in_flight: AtomicUsize,
}

impl Dispatcher {
    /// Dispatcher using [`Uncategorized`].
    pub fn new(registry: Arc<ListenerRegistry>) -> Self {
        Self::with_categorizer(registry, Arc::new(Uncategorized))
    }

    pub fn with_categorizer(
        registry: Arc<ListenerRegistry>,
        categorizer: Arc<dyn Categorizer>,
    ) -> Self {
        Self {
            registry,
            categorizer,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Number of notifications currently being dispatched.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Whether the calling thread is inside one of this dispatcher's
    /// listeners.
    pub fn is_delivering(&self) -> bool {
        DELIVERING_FOR.with(|current| current.get() == self.address())
    }

    fn address(&self) -> usize {
        self as *const Self as usize
    }

    pub fn dispatch(&self, payload: &NotificationPayload) -> DispatchReport {
        let _delivery = DeliveryGuard::enter(self);

        let category = self
            .categorizer
            .categorize(payload)
            .filter(|c| !c.is_wildcard());
        let resolved = self.registry.resolve(category);

        tracing::debug!(
            category = category.map(|c| c.as_str()),
            listeners = resolved.len(),
            sid = payload.subscription_id.as_deref(),
            seq = payload.sequence,
            "Dispatching notification"
        );

        let mut report = DispatchReport {
            category,
            ..DispatchReport::default()
        };
        let mut failed = Vec::new();

        for entry in resolved {
            match entry.listener.invoke(payload) {
                Ok(()) => report.delivered += 1,
                Err(message) => {
                    // Concrete match first, wildcard otherwise
                    let invoked_as = entry
                        .categories
                        .first()
                        .copied()
                        .unwrap_or(EventCategory::All);
                    tracing::warn!(
                        category = %invoked_as,
                        registered_under = ?entry.categories,
                        listener = %entry.listener,
                        error = %message,
                        "Listener failed, evicting it"
                    );
                    report.failures.push(EventsError::ListenerInvocation {
                        category: invoked_as,
                        listener: entry.listener.id(),
                        message,
                    });
                    failed.push(entry);
                }
            }
        }

        for entry in failed {
            for registered_under in &entry.categories {
                if let Err(e) = self.registry.remove(&entry.listener, *registered_under) {
                    tracing::warn!(listener = %entry.listener, "Failed to evict listener: {}", e);
                }
            }
            report.evicted.push(entry.listener);
        }

        report
    }
}

impl NotificationHandler for Dispatcher {
    fn handle(&self, payload: NotificationPayload) {
        let report = self.dispatch(&payload);
        if !report.is_clean() {
            let evicted: Vec<String> = report.evicted.iter().map(|l| l.to_string()).collect();
            tracing::debug!(
                delivered = report.delivered,
                failed = report.failures.len(),
                evicted = ?evicted,
                "Notification dispatched with listener failures"
            );
        }
    }
}
