//! HTTP server for receiving UPnP event notifications.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use tokio::sync::oneshot;
use warp::http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode};
use warp::Filter;

use crate::error::{Result, ServerError};
use crate::handler::{NotificationHandler, NotificationPayload};

/// The custom HTTP/1.1 verb devices use to deliver event notifications.
pub const NOTIFY_METHOD: &str = "NOTIFY";

/// Port the server binds when none is configured.
pub const DEFAULT_PORT: u16 = 8080;

/// Body sent along with the 405 response for any verb other than NOTIFY.
const METHOD_NOT_ALLOWED_BODY: &str = "Sorry, only the HTTP/1.1 NOTIFY verb is supported.\n";

/// Default bind address: every interface, [`DEFAULT_PORT`].
pub fn default_bind_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT)
}

/// HTTP callback server for receiving UPnP event notifications.
///
/// The server owns a dedicated thread running a single-threaded tokio runtime
/// with a warp endpoint on it. Every `NOTIFY` request, on any path, has its
/// body read in full and passed to the [`NotificationHandler`]; the device gets
/// an empty `200 OK` once the handler returns. Any other verb is answered with
/// `405 Method Not Allowed` and an `Allow: NOTIFY` header, and never reaches
/// the handler.
///
/// Stopping is graceful: [`CallbackServer::stop`] stops accepting, waits for
/// in-flight deliveries to finish, and joins the server thread, so the port is
/// free again when it returns.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use callback_server::{CallbackServer, NotificationPayload};
///
/// let handler = Arc::new(|payload: NotificationPayload| {
///     println!("event: {}", payload.text());
/// });
///
/// let mut server = CallbackServer::start("0.0.0.0:8080".parse().unwrap(), handler)
///     .expect("Failed to start callback server");
///
/// println!("Listening on {}", server.local_addr());
/// server.stop();
/// ```
pub struct CallbackServer {
    /// Address the listener actually bound (resolves port 0)
    local_addr: SocketAddr,
    /// Shutdown signal sender
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Server thread handle
    server_thread: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind `bind_addr` and start accepting deliveries.
    ///
    /// Blocks until the listener is bound, so a returned server is already
    /// accepting connections. Binding port `0` lets the OS pick a free port;
    /// [`CallbackServer::local_addr`] reports the one chosen.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address is unavailable, or
    /// [`ServerError::Runtime`] if the server thread could not be started.
    pub fn start(bind_addr: SocketAddr, handler: Arc<dyn NotificationHandler>) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<SocketAddr>>();

        let server_thread = thread::Builder::new()
            .name("callback-server".to_string())
            .spawn(move || Self::run(bind_addr, handler, shutdown_rx, ready_tx))
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(local_addr)) => {
                tracing::info!(addr = %local_addr, "Callback server listening");
                Ok(Self {
                    local_addr,
                    shutdown_tx: Some(shutdown_tx),
                    server_thread: Some(server_thread),
                })
            }
            Ok(Err(e)) => {
                let _ = server_thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = server_thread.join();
                Err(ServerError::StartupAborted)
            }
        }
    }

    /// The address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the port the server is bound to.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Callback URL advertising this server at `host`.
    ///
    /// The bind address is often the wildcard, which a device cannot reach, so
    /// the caller supplies the address the device should use.
    ///
    /// ```
    /// # use std::net::{IpAddr, Ipv4Addr};
    /// # use std::sync::Arc;
    /// # use callback_server::{CallbackServer, NotificationPayload};
    /// let mut server = CallbackServer::start(
    ///     "127.0.0.1:0".parse().unwrap(),
    ///     Arc::new(|_: NotificationPayload| {}),
    /// ).unwrap();
    ///
    /// let url = server.callback_url(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)));
    /// assert_eq!(url, format!("http://192.168.1.50:{}", server.port()));
    /// server.stop();
    /// ```
    pub fn callback_url(&self, host: IpAddr) -> String {
        format!("http://{}", SocketAddr::new(host, self.port()))
    }

    /// Whether the server is still accepting deliveries.
    pub fn is_running(&self) -> bool {
        self.server_thread
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Stop accepting deliveries and release the bound port.
    ///
    /// Waits for in-flight deliveries, including their handler calls, to
    /// complete. Calling this on a stopped server does nothing.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.server_thread.take() {
            if handle.join().is_err() {
                tracing::error!(addr = %self.local_addr, "Callback server thread panicked");
            }
            tracing::info!(addr = %self.local_addr, "Callback server stopped");
        }
    }

    /// Server thread body: build a runtime, bind, report readiness, serve
    /// until the shutdown signal fires.
    fn run(
        bind_addr: SocketAddr,
        handler: Arc<dyn NotificationHandler>,
        shutdown_rx: oneshot::Receiver<()>,
        ready_tx: mpsc::Sender<Result<SocketAddr>>,
    ) {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                let _ = ready_tx.send(Err(ServerError::Runtime(e.to_string())));
                return;
            }
        };

        rt.block_on(async move {
            let bound = warp::serve(notify_route(handler)).try_bind_with_graceful_shutdown(
                bind_addr,
                async move {
                    let _ = shutdown_rx.await;
                },
            );

            match bound {
                Ok((addr, server)) => {
                    let _ = ready_tx.send(Ok(addr));
                    server.await;
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(ServerError::Bind {
                        addr: bind_addr,
                        reason: e.to_string(),
                    }));
                }
            }
        });
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Route accepting every method on every path; `deliver` sorts out the verb.
fn notify_route(
    handler: Arc<dyn NotificationHandler>,
) -> impl Filter<Extract = (Response<String>,), Error = warp::Rejection> + Clone + Send + Sync + 'static
{
    warp::method()
        .and(warp::path::full())
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and_then(
            move |method: Method, path: warp::path::FullPath, headers: HeaderMap, body: Bytes| {
                let handler = handler.clone();
                async move {
                    Ok::<_, warp::Rejection>(
                        deliver(handler, method, path.as_str(), &headers, body).await,
                    )
                }
            },
        )
}

/// Handle one inbound request.
async fn deliver(
    handler: Arc<dyn NotificationHandler>,
    method: Method,
    path: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Response<String> {
    if !method.as_str().eq_ignore_ascii_case(NOTIFY_METHOD) {
        tracing::debug!(%method, path, "Rejecting request with unsupported method");
        return method_not_allowed();
    }

    tracing::debug!(
        path,
        body_len = body.len(),
        sid = header_str(headers, "sid"),
        nt = header_str(headers, "nt"),
        nts = header_str(headers, "nts"),
        "NOTIFY received"
    );

    let payload = payload_from_parts(headers, body);

    // Handler code may block; keep it off the accept loop.
    if let Err(e) = tokio::task::spawn_blocking(move || handler.handle(payload)).await {
        tracing::error!(error = %e, "Notification handler did not complete");
    }

    Response::new(String::new())
}

fn method_not_allowed() -> Response<String> {
    let mut response = Response::new(METHOD_NOT_ALLOWED_BODY.to_string());
    *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
    let headers = response.headers_mut();
    headers.insert(header::ALLOW, HeaderValue::from_static(NOTIFY_METHOD));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

fn payload_from_parts(headers: &HeaderMap, body: Bytes) -> NotificationPayload {
    let mut payload = NotificationPayload::new(body);
    payload.subscription_id = header_str(headers, "sid").map(str::to_string);
    payload.sequence = header_str(headers, "seq").and_then(|s| s.trim().parse().ok());
    payload
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
