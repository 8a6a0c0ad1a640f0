//! Background lifecycle worker for an event session
//!
//! Each start of a session spawns one worker thread. The worker binds the
//! callback receiver, finds the local address, performs the SUBSCRIBE
//! handshake, and reports the outcome to the thread that started it. While
//! active it wakes every `check_interval` to see whether any listener is left,
//! and tears everything down on the same thread when none is (and no
//! notification is being delivered) or when told to stop.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use callback_server::{CallbackServer, NotificationHandler};
use gena_client::SubscribeRequest;

use crate::error::{EventsError, Result};
use crate::session::{SessionShared, SessionState, SubscriptionInfo};

/// Commands sent from the session to its worker
#[derive(Debug)]
pub(crate) enum Command {
    /// Tear down regardless of registered listeners
    Stop,
}

/// Handle to a running worker thread
pub(crate) struct WorkerHandle {
    command_tx: mpsc::Sender<Command>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Ask the worker to stop and wait for its teardown to finish.
    ///
    /// Also used for a worker that already exited after its listeners
    /// drained; the send then fails and only the join remains.
    pub(crate) fn shutdown(self) {
        self.request_stop();
        if self.thread.join().is_err() {
            tracing::error!("Session worker panicked during teardown");
        }
    }

    /// Ask the worker to stop without waiting for it.
    pub(crate) fn request_stop(&self) {
        let _ = self.command_tx.send(Command::Stop);
    }
}

/// Spawns a worker and blocks until its startup sequence has finished.
///
/// On success the receiver is bound, the device accepted the subscription, and
/// the session state is [`SessionState::Active`]. On failure the worker has
/// already released everything it acquired and set [`SessionState::Stopped`].
pub(crate) fn spawn_session_worker(
    shared: Arc<SessionShared>,
) -> Result<(WorkerHandle, SubscriptionInfo)> {
    let (command_tx, command_rx) = mpsc::channel();
    let (ready_tx, ready_rx) = mpsc::channel();

    let thread = thread::Builder::new()
        .name("sonos-events-session".to_string())
        .spawn(move || run_session(shared, command_rx, ready_tx))
        .map_err(|e| EventsError::Transport(format!("Failed to spawn session worker: {}", e)))?;

    match ready_rx.recv() {
        Ok(Ok(info)) => Ok((WorkerHandle { command_tx, thread }, info)),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(EventsError::WorkerDisconnected)
        }
    }
}

fn run_session(
    shared: Arc<SessionShared>,
    command_rx: mpsc::Receiver<Command>,
    ready_tx: mpsc::Sender<Result<SubscriptionInfo>>,
) {
    let (mut server, info) = match start(&shared) {
        Ok(started) => started,
        Err(e) => {
            tracing::error!("Event session failed to start: {}", e);
            shared.set_state(SessionState::Stopped);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    *shared.subscription.lock() = Some(info.clone());
    shared.set_state(SessionState::Active);
    let _ = ready_tx.send(Ok(info.clone()));

    wait_for_teardown(&shared, &command_rx, shared.config.check_interval);

    shared.set_state(SessionState::Stopping);
    server.stop();
    *shared.subscription.lock() = None;

    if shared.config.unsubscribe_on_stop {
        if let Some(sid) = &info.sid {
            unsubscribe(&shared, sid);
        }
    }

    shared.set_state(SessionState::Stopped);
}

/// Bind the receiver, resolve the callback address, and subscribe.
fn start(shared: &SessionShared) -> Result<(CallbackServer, SubscriptionInfo)> {
    let config = &shared.config;

    let handler: Arc<dyn NotificationHandler> = shared.dispatcher.clone();
    let mut server = CallbackServer::start(config.bind_addr(), handler)?;

    let local_ip = match shared.resolver.resolve(&config.device_host) {
        Ok(ip) => ip,
        Err(e) => {
            server.stop();
            return Err(e);
        }
    };

    let endpoint = config.endpoint();
    let callback_url = server.callback_url(local_ip);
    let request = SubscribeRequest {
        namespace: config.event_namespace.clone(),
        timeout_seconds: config.subscription_timeout_secs(),
        ..SubscribeRequest::new(callback_url.clone())
    };

    match shared.client.subscribe(&endpoint, &request) {
        Ok(response) => {
            tracing::info!(
                endpoint = %endpoint,
                sid = response.sid.as_deref(),
                timeout = response.timeout_seconds,
                "Subscribed to device events"
            );
            Ok((
                server,
                SubscriptionInfo {
                    endpoint: endpoint.url(),
                    callback_url,
                    sid: response.sid,
                    timeout: response.timeout_seconds.map(|s| Duration::from_secs(s.into())),
                },
            ))
        }
        Err(e) => {
            server.stop();
            Err(EventsError::HandshakeFailed {
                endpoint: endpoint.url(),
                reason: e.to_string(),
            })
        }
    }
}

/// Block until a stop command arrives or the registry is found empty.
fn wait_for_teardown(
    shared: &SessionShared,
    command_rx: &mpsc::Receiver<Command>,
    check_interval: Duration,
) {
    loop {
        match command_rx.recv_timeout(check_interval) {
            Ok(Command::Stop) => {
                tracing::debug!("Session worker received stop command");
                return;
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("Session dropped, stopping worker");
                return;
            }
            Err(RecvTimeoutError::Timeout) => {
                // Whoever holds the lifecycle lock is starting or stopping the
                // session and may be joining this thread; skip the tick.
                let Some(_lifecycle) = shared.lifecycle.try_lock() else {
                    continue;
                };
                // A listener may unsubscribe itself and subscribe another
                // before its delivery returns
                if shared.dispatcher.in_flight() > 0 {
                    continue;
                }
                if shared.registry.is_empty() {
                    tracing::info!("No listeners left, stopping event session");
                    shared.set_state(SessionState::Stopping);
                    return;
                }
            }
        }
    }
}

fn unsubscribe(shared: &SessionShared, sid: &str) {
    let endpoint = shared.config.endpoint();
    match shared.client.unsubscribe(&endpoint, sid) {
        Ok(()) => tracing::debug!(endpoint = %endpoint, sid, "Unsubscribed from device events"),
        Err(e) => tracing::warn!(
            endpoint = %endpoint,
            sid,
            "UNSUBSCRIBE failed, device subscription will expire on its own: {}",
            e
        ),
    }
}
