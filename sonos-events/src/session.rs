//! Subscription session for one device.
//!
//! An [`EventSession`] owns the listener registry and drives the lifecycle of
//! the callback receiver and the device subscription:
//!
//! ```text
//! Idle ──subscribe──▶ Starting ──handshake ok──▶ Active
//!                        │                         │ registry drained / stop()
//!                        │ failure                 ▼
//!                        └──────────▶ Stopped ◀── Stopping
//!                                        │
//!                                        └──subscribe──▶ Starting
//! ```
//!
//! Startup happens lazily on the first `subscribe`. Unsubscribing never tears
//! anything down synchronously: the worker notices an empty registry on its
//! next periodic check.
//!
//! Listeners may call back into their own session. The receiver cannot stop
//! until the delivery that runs the listener returns, so from inside a
//! listener the session never waits on its worker: `stop` only requests the
//! teardown, and a `subscribe` that needs a fresh start after a teardown
//! hands it to a restart thread.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gena_client::GenaClient;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::address::{LocalAddressResolver, UdpProbe};
use crate::categorizer::{Categorizer, Uncategorized};
use crate::category::{CategoryArg, EventCategory};
use crate::config::SessionConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::listener::Listener;
use crate::registry::ListenerRegistry;
use crate::worker::{spawn_session_worker, WorkerHandle};

/// How long a listener waits for the lifecycle lock. The worker only holds it
/// for its emptiness check; anyone holding it longer may be joining the
/// worker, which in turn waits for the listener to return.
const LISTENER_LOCK_WAIT: Duration = Duration::from_millis(100);

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Never started
    Idle,
    /// Binding the receiver and performing the handshake
    Starting,
    /// Receiving notifications
    Active,
    /// Tearing down
    Stopping,
    /// Torn down; the next subscribe starts again
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The device subscription held by an active session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    /// Device event endpoint URL
    pub endpoint: String,
    /// Callback URL sent in the `CALLBACK` header
    pub callback_url: String,
    /// Subscription ID granted by the device
    pub sid: Option<String>,
    /// Subscription duration granted by the device. Not renewed.
    pub timeout: Option<Duration>,
}

/// State shared between an [`EventSession`] and its worker
pub(crate) struct SessionShared {
    pub(crate) config: SessionConfig,
    pub(crate) registry: Arc<ListenerRegistry>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) resolver: Arc<dyn LocalAddressResolver>,
    pub(crate) client: GenaClient,
    pub(crate) subscription: Mutex<Option<SubscriptionInfo>>,
    /// Serializes starting and stopping; holds the current worker, if any
    pub(crate) lifecycle: Mutex<Option<WorkerHandle>>,
    state: watch::Sender<SessionState>,
}

impl SessionShared {
    pub(crate) fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, next: SessionState) {
        let mut previous = next;
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            previous = std::mem::replace(current, next);
            true
        });
        if previous != next {
            tracing::info!(
                device = %self.config.device_host,
                from = %previous,
                to = %next,
                "Event session state changed"
            );
        }
    }

    /// Start the session unless it is active.
    fn ensure_started(self: &Arc<Self>) -> Result<()> {
        if self.dispatcher.is_delivering() {
            return self.ensure_started_from_listener();
        }
        let mut lifecycle = self.lifecycle.lock();
        self.start_locked(&mut lifecycle)
    }

    fn start_locked(self: &Arc<Self>, lifecycle: &mut Option<WorkerHandle>) -> Result<()> {
        // The worker only leaves Active while holding the lifecycle lock, so
        // it will see the new listener on its next check.
        if self.state() == SessionState::Active {
            return Ok(());
        }

        // A worker that drained its listeners may still be finishing teardown
        if let Some(previous) = lifecycle.take() {
            previous.shutdown();
        }

        self.set_state(SessionState::Starting);
        match spawn_session_worker(self.clone()) {
            Ok((worker, info)) => {
                tracing::debug!(callback = %info.callback_url, "Event session started");
                *lifecycle = Some(worker);
                Ok(())
            }
            Err(e) => {
                self.set_state(SessionState::Stopped);
                Err(e)
            }
        }
    }

    /// Startup requested by a listener running on this session's receiver.
    fn ensure_started_from_listener(self: &Arc<Self>) -> Result<()> {
        let Some(mut lifecycle) = self.lifecycle.try_lock_for(LISTENER_LOCK_WAIT) else {
            tracing::debug!("Session transition in progress, deferring start");
            self.restart_when_idle();
            return Ok(());
        };

        match self.state() {
            SessionState::Active => Ok(()),
            // The worker is waiting for this delivery to finish
            SessionState::Stopping => {
                drop(lifecycle);
                tracing::debug!("Session stopping, restarting once teardown completes");
                self.restart_when_idle();
                Ok(())
            }
            _ => self.start_locked(&mut lifecycle),
        }
    }

    /// Start the session from a separate thread once the lifecycle lock is
    /// free, if any listener is still registered by then.
    fn restart_when_idle(self: &Arc<Self>) {
        let shared = self.clone();
        let spawned = thread::Builder::new()
            .name("sonos-events-restart".to_string())
            .spawn(move || {
                let mut lifecycle = shared.lifecycle.lock();
                if shared.registry.is_empty() {
                    return;
                }
                if let Err(e) = shared.start_locked(&mut lifecycle) {
                    tracing::warn!("Deferred event session start failed: {}", e);
                }
            });
        if let Err(e) = spawned {
            tracing::error!("Failed to spawn session restart thread: {}", e);
        }
    }

    /// Teardown requested by a listener running on this session's receiver.
    fn stop_from_listener(&self, dropped: usize) {
        let Some(lifecycle) = self.lifecycle.try_lock_for(LISTENER_LOCK_WAIT) else {
            // Listeners are gone; the worker drains once the delivery returns
            tracing::debug!(listeners = dropped, "Session transition in progress, listeners cleared");
            return;
        };

        match lifecycle.as_ref() {
            Some(worker) if self.state() == SessionState::Active => {
                tracing::debug!(listeners = dropped, "Stopping event session after delivery");
                self.set_state(SessionState::Stopping);
                worker.request_stop();
            }
            Some(_) => tracing::debug!(listeners = dropped, "Event session already stopping"),
            None => tracing::debug!(listeners = dropped, "Event session not running"),
        }
    }
}

/// Builder for an [`EventSession`] with custom collaborators
pub struct EventSessionBuilder {
    config: SessionConfig,
    categorizer: Arc<dyn Categorizer>,
    resolver: Arc<dyn LocalAddressResolver>,
}

impl EventSessionBuilder {
    /// Classify notifications with `categorizer` instead of [`Uncategorized`].
    pub fn categorizer(mut self, categorizer: impl Categorizer) -> Self {
        self.categorizer = Arc::new(categorizer);
        self
    }

    /// Find the callback address with `resolver` instead of [`UdpProbe`].
    pub fn address_resolver(mut self, resolver: impl LocalAddressResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Validate the configuration and create the session. Nothing is bound
    /// or sent until the first subscribe.
    pub fn build(self) -> Result<EventSession> {
        self.config.validate()?;

        let registry = Arc::new(ListenerRegistry::new());
        let dispatcher = Arc::new(Dispatcher::with_categorizer(
            registry.clone(),
            self.categorizer,
        ));
        let client = GenaClient::with_timeouts(self.config.connect_timeout, self.config.request_timeout);
        let (state, _) = watch::channel(SessionState::Idle);

        Ok(EventSession {
            shared: Arc::new(SessionShared {
                config: self.config,
                registry,
                dispatcher,
                resolver: self.resolver,
                client,
                subscription: Mutex::new(None),
                lifecycle: Mutex::new(None),
                state,
            }),
        })
    }
}

/// Event subscription session for a single device
///
/// All methods are blocking. The first successful [`subscribe`](Self::subscribe)
/// binds the callback receiver and subscribes to the device; once every
/// listener is gone the session tears itself down within one check interval.
///
/// # Example
///
/// ```no_run
/// use sonos_events::{EventSession, Listener, SessionConfig};
///
/// let session = EventSession::new(SessionConfig::new("192.168.1.100"))?;
///
/// let printer = Listener::from_fn(|payload| println!("{}", payload.text()));
/// session.subscribe(&printer, "all")?;
///
/// // ... notifications arrive on the receiver's threads ...
///
/// session.unsubscribe(&printer, "all")?;
/// # Ok::<(), sonos_events::EventsError>(())
/// ```
pub struct EventSession {
    shared: Arc<SessionShared>,
}

impl EventSession {
    /// Session with the default categorizer and address resolver.
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: SessionConfig) -> EventSessionBuilder {
        EventSessionBuilder {
            config,
            categorizer: Arc::new(Uncategorized),
            resolver: Arc::new(UdpProbe::new()),
        }
    }

    /// Register `listener` under `category` and start the session if it is
    /// not active.
    ///
    /// # Errors
    ///
    /// - [`EventsError::InvalidCategory`](crate::EventsError::InvalidCategory) or
    ///   [`EventsError::InvalidArgumentType`](crate::EventsError::InvalidArgumentType)
    ///   for a bad category; nothing is registered.
    /// - [`EventsError::Transport`](crate::EventsError::Transport) if the receiver
    ///   cannot be bound or the local address cannot be found.
    /// - [`EventsError::HandshakeFailed`](crate::EventsError::HandshakeFailed) if the
    ///   device does not accept the subscription.
    ///
    /// After a startup failure the listener stays registered, the receiver is
    /// not bound, and the session is [`SessionState::Stopped`]. Subscribing
    /// again retries the startup.
    pub fn subscribe(&self, listener: &Listener, category: impl Into<CategoryArg>) -> Result<()> {
        self.shared.registry.add(listener.clone(), category)?;
        self.shared.ensure_started()
    }

    /// Register `listener` under the wildcard category.
    pub fn subscribe_all(&self, listener: &Listener) -> Result<()> {
        self.subscribe(listener, EventCategory::All)
    }

    /// Remove `listener` from `category`. Not registered is not an error.
    pub fn unsubscribe(&self, listener: &Listener, category: impl Into<CategoryArg>) -> Result<()> {
        self.shared.registry.remove(listener, category)?;
        Ok(())
    }

    /// Remove `listener` from the wildcard category.
    pub fn unsubscribe_all(&self, listener: &Listener) -> Result<()> {
        self.unsubscribe(listener, EventCategory::All)
    }

    /// Drop every listener and tear the session down.
    ///
    /// Waits for an in-progress startup to finish first. Returns once the
    /// receiver's port is released. Calling it on a session that is not
    /// running only clears listeners.
    ///
    /// From inside one of this session's listeners it returns immediately
    /// instead; the teardown runs once the delivery has returned. The same
    /// applies when the session is dropped there.
    pub fn stop(&self) {
        let dropped = self.shared.registry.clear();

        if self.shared.dispatcher.is_delivering() {
            self.shared.stop_from_listener(dropped);
            return;
        }

        let mut lifecycle = self.shared.lifecycle.lock();
        match lifecycle.take() {
            Some(worker) => {
                tracing::debug!(listeners = dropped, "Stopping event session");
                worker.shutdown();
            }
            None => tracing::debug!(listeners = dropped, "Event session not running"),
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Receiver that observes every state transition from now on.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// The current device subscription, while active.
    pub fn subscription(&self) -> Option<SubscriptionInfo> {
        self.shared.subscription.lock().clone()
    }

    /// Callback URL advertised to the device, while active.
    pub fn callback_url(&self) -> Option<String> {
        self.shared
            .subscription
            .lock()
            .as_ref()
            .map(|s| s.callback_url.clone())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Total number of (category, listener) registrations.
    pub fn listener_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Listener count per category.
    pub fn categories(&self) -> Vec<(EventCategory, usize)> {
        self.shared.registry.categories()
    }
}

impl Drop for EventSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for EventSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSession")
            .field("device", &self.shared.config.device_host)
            .field("state", &self.state())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
