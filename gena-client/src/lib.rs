//! Blocking GENA client for UPnP event subscriptions
//!
//! GENA is the eventing half of UPnP: a control point sends a `SUBSCRIBE`
//! request naming its callback URL to a device's event endpoint, the device
//! pushes `NOTIFY` requests to that URL, and an `UNSUBSCRIBE` ends the
//! subscription. This crate covers the two outbound requests.

mod error;

pub use error::GenaError;

use std::time::Duration;

/// Standard port of the device's HTTP endpoint on Sonos speakers.
pub const DEFAULT_DEVICE_PORT: u16 = 1400;

/// Notification type sent in the `NT` header of a new subscription.
pub const DEFAULT_NAMESPACE: &str = "upnp:event";

/// A device event endpoint, e.g. `http://192.168.1.100:1400/MediaRenderer/AVTransport/Event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEndpoint {
    host: String,
    port: u16,
    path: String,
}

impl EventEndpoint {
    /// Create an endpoint. A leading `/` on `path` is optional.
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            host: host.into(),
            port,
            path: path.trim_start_matches('/').to_string(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Full request URL.
    ///
    /// ```
    /// use gena_client::EventEndpoint;
    ///
    /// let endpoint = EventEndpoint::new("192.168.1.100", 1400, "/MediaRenderer/AVTransport/Event");
    /// assert_eq!(endpoint.url(), "http://192.168.1.100:1400/MediaRenderer/AVTransport/Event");
    /// ```
    pub fn url(&self) -> String {
        format!("http://{}:{}/{}", self.host, self.port, self.path)
    }
}

impl std::fmt::Display for EventEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url())
    }
}

/// Parameters of a new subscription
#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    /// The callback URL where events should be sent
    pub callback_url: String,
    /// Value of the `NT` header
    pub namespace: String,
    /// Requested subscription timeout in seconds; no `TIMEOUT` header when `None`
    pub timeout_seconds: Option<u32>,
}

impl SubscribeRequest {
    /// A request for `callback_url` in the default `upnp:event` namespace.
    pub fn new(callback_url: impl Into<String>) -> Self {
        Self {
            callback_url: callback_url.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            timeout_seconds: None,
        }
    }
}

/// Response from a UPnP subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionResponse {
    /// HTTP status of the response (always 2xx)
    pub status: u16,
    /// Subscription ID returned by the device, if any
    pub sid: Option<String>,
    /// Timeout granted by the device in seconds; `None` if absent or infinite
    pub timeout_seconds: Option<u32>,
}

/// A minimal GENA client for UPnP device communication
#[derive(Debug, Clone)]
pub struct GenaClient {
    agent: ureq::Agent,
}

impl GenaClient {
    /// Create a client with a 5 second connect and 10 second read timeout.
    pub fn new() -> Self {
        Self::with_timeouts(Duration::from_secs(5), Duration::from_secs(10))
    }

    /// Create a client with explicit connect and read timeouts.
    pub fn with_timeouts(connect: Duration, read: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(connect)
                .timeout_read(read)
                .redirects(0)
                .build(),
        }
    }

    /// Subscribe `request.callback_url` to events from `endpoint`.
    ///
    /// Sends `SUBSCRIBE` with `CALLBACK: <url>` and `NT` headers. Any 2xx
    /// status is a success; everything else is [`GenaError::Status`]. A
    /// connection failure or timeout is [`GenaError::Network`]. Nothing is
    /// retried.
    pub fn subscribe(
        &self,
        endpoint: &EventEndpoint,
        request: &SubscribeRequest,
    ) -> Result<SubscriptionResponse, GenaError> {
        let mut call = self
            .agent
            .request("SUBSCRIBE", &endpoint.url())
            .set("CALLBACK", &format!("<{}>", request.callback_url))
            .set("NT", &request.namespace);

        if let Some(timeout) = request.timeout_seconds {
            call = call.set("TIMEOUT", &format!("Second-{timeout}"));
        }

        tracing::debug!(
            endpoint = %endpoint,
            callback = %request.callback_url,
            "Sending SUBSCRIBE"
        );

        let response = send(call)?;

        Ok(SubscriptionResponse {
            status: response.status(),
            sid: response.header("SID").map(str::to_string),
            timeout_seconds: response.header("TIMEOUT").and_then(parse_timeout),
        })
    }

    /// Cancel the subscription `sid` at `endpoint`.
    pub fn unsubscribe(&self, endpoint: &EventEndpoint, sid: &str) -> Result<(), GenaError> {
        let call = self
            .agent
            .request("UNSUBSCRIBE", &endpoint.url())
            .set("SID", sid);

        tracing::debug!(endpoint = %endpoint, sid, "Sending UNSUBSCRIBE");

        send(call).map(|_| ())
    }
}

impl Default for GenaClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute a request, mapping any non-2xx status to [`GenaError::Status`].
fn send(request: ureq::Request) -> Result<ureq::Response, GenaError> {
    let response = match request.call() {
        Ok(response) => response,
        Err(ureq::Error::Status(code, _)) => return Err(GenaError::Status(code)),
        Err(e) => return Err(GenaError::Network(e.to_string())),
    };

    if !(200..300).contains(&response.status()) {
        return Err(GenaError::Status(response.status()));
    }

    Ok(response)
}

/// Parse a `TIMEOUT` header value of the form `Second-1800`.
fn parse_timeout(value: &str) -> Option<u32> {
    value.trim().strip_prefix("Second-")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gena_client_creation() {
        let _client = GenaClient::new();
        let _default_client = GenaClient::default();
        let _custom = GenaClient::with_timeouts(Duration::from_millis(100), Duration::from_secs(1));
    }

    #[test]
    fn test_endpoint_url_normalizes_path() {
        let with_slash = EventEndpoint::new("10.0.0.5", 1400, "/MediaRenderer/AVTransport/Event");
        let without = EventEndpoint::new("10.0.0.5", 1400, "MediaRenderer/AVTransport/Event");

        assert_eq!(with_slash, without);
        assert_eq!(
            with_slash.to_string(),
            "http://10.0.0.5:1400/MediaRenderer/AVTransport/Event"
        );
        assert_eq!(with_slash.host(), "10.0.0.5");
        assert_eq!(with_slash.port(), 1400);
    }

    #[test]
    fn test_subscribe_request_defaults() {
        let request = SubscribeRequest::new("http://192.168.1.50:8080");
        assert_eq!(request.namespace, "upnp:event");
        assert!(request.timeout_seconds.is_none());
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("Second-1800"), Some(1800));
        assert_eq!(parse_timeout(" Second-300 "), Some(300));
        assert_eq!(parse_timeout("Second-infinite"), None);
        assert_eq!(parse_timeout("1800"), None);
    }

    #[test]
    fn test_gena_error_display() {
        assert_eq!(GenaError::Status(412).to_string(), "Device responded with HTTP 412");
        assert_eq!(
            GenaError::Network("connection refused".to_string()).to_string(),
            "Network/HTTP error: connection refused"
        );
    }
}
