//! Configuration for an event session.
//!
//! A [`SessionConfig`] names the device whose events are wanted and controls
//! how the callback receiver is bound, how the handshake is sent, and how
//! often the session checks whether it still has listeners.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use gena_client::{EventEndpoint, DEFAULT_DEVICE_PORT, DEFAULT_NAMESPACE};

use crate::error::{EventsError, Result};

/// Event endpoint path of the AVTransport service on a Sonos player
pub const DEFAULT_EVENT_PATH: &str = "MediaRenderer/AVTransport/Event";

/// Configuration for an [`EventSession`](crate::EventSession)
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Address of the device to subscribe to
    pub device_host: String,

    /// Port of the device's event endpoint
    /// Default: 1400
    pub device_port: u16,

    /// Path of the device's event endpoint
    /// Default: "MediaRenderer/AVTransport/Event"
    pub event_path: String,

    /// `NT` header value sent with the handshake
    /// Default: "upnp:event"
    pub event_namespace: String,

    /// Host the callback receiver binds
    /// Default: 0.0.0.0
    pub callback_host: IpAddr,

    /// Port the callback receiver binds; 0 lets the OS choose
    /// Default: 8080
    pub callback_port: u16,

    /// How often an active session checks whether any listener remains
    /// Default: 1 second
    pub check_interval: Duration,

    /// Read timeout for SUBSCRIBE and UNSUBSCRIBE requests
    /// Default: 10 seconds
    pub request_timeout: Duration,

    /// Connect timeout for SUBSCRIBE and UNSUBSCRIBE requests
    /// Default: 5 seconds
    pub connect_timeout: Duration,

    /// Subscription duration to request in the `TIMEOUT` header; `None` leaves
    /// it to the device
    /// Default: None
    pub subscription_timeout: Option<Duration>,

    /// Send UNSUBSCRIBE at teardown when the device granted a SID
    /// Default: true
    pub unsubscribe_on_stop: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_host: String::new(),
            device_port: DEFAULT_DEVICE_PORT,
            event_path: DEFAULT_EVENT_PATH.to_string(),
            event_namespace: DEFAULT_NAMESPACE.to_string(),
            callback_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            callback_port: callback_server::DEFAULT_PORT,
            check_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            subscription_timeout: None,
            unsubscribe_on_stop: true,
        }
    }
}

impl SessionConfig {
    /// Defaults for the device at `device_host`.
    pub fn new(device_host: impl Into<String>) -> Self {
        Self {
            device_host: device_host.into(),
            ..Default::default()
        }
    }

    pub fn with_device_port(mut self, port: u16) -> Self {
        self.device_port = port;
        self
    }

    pub fn with_event_path(mut self, path: impl Into<String>) -> Self {
        self.event_path = path.into();
        self
    }

    pub fn with_event_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.event_namespace = namespace.into();
        self
    }

    pub fn with_callback_host(mut self, host: IpAddr) -> Self {
        self.callback_host = host;
        self
    }

    pub fn with_callback_port(mut self, port: u16) -> Self {
        self.callback_port = port;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_subscription_timeout(mut self, timeout: Duration) -> Self {
        self.subscription_timeout = Some(timeout);
        self
    }

    pub fn with_unsubscribe_on_stop(mut self, enabled: bool) -> Self {
        self.unsubscribe_on_stop = enabled;
        self
    }

    /// Address the callback receiver binds.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.callback_host, self.callback_port)
    }

    /// The device's event endpoint.
    pub fn endpoint(&self) -> EventEndpoint {
        EventEndpoint::new(&self.device_host, self.device_port, &self.event_path)
    }

    /// Requested subscription duration in whole seconds, saturating.
    pub(crate) fn subscription_timeout_secs(&self) -> Option<u32> {
        self.subscription_timeout
            .map(|t| u32::try_from(t.as_secs()).unwrap_or(u32::MAX))
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.device_host.trim().is_empty() {
            return Err(EventsError::InvalidConfig(
                "Device host must not be empty".to_string(),
            ));
        }

        if self.device_port == 0 {
            return Err(EventsError::InvalidConfig(
                "Device port must be greater than 0".to_string(),
            ));
        }

        if self.event_path.trim_start_matches('/').is_empty() {
            return Err(EventsError::InvalidConfig(
                "Event path must not be empty".to_string(),
            ));
        }

        if self.event_namespace.is_empty() {
            return Err(EventsError::InvalidConfig(
                "Event namespace must not be empty".to_string(),
            ));
        }

        if self.check_interval == Duration::ZERO {
            return Err(EventsError::InvalidConfig(
                "Check interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::new("192.168.1.100");
        assert_eq!(config.device_port, 1400);
        assert_eq!(config.event_path, "MediaRenderer/AVTransport/Event");
        assert_eq!(config.event_namespace, "upnp:event");
        assert_eq!(config.bind_addr(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.check_interval, Duration::from_secs(1));
        assert!(config.subscription_timeout.is_none());
        assert!(config.unsubscribe_on_stop);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.endpoint().url(),
            "http://192.168.1.100:1400/MediaRenderer/AVTransport/Event"
        );
    }

    #[test]
    fn test_builder_methods() {
        let config = SessionConfig::new("10.0.0.5")
            .with_device_port(1443)
            .with_event_path("/MediaRenderer/RenderingControl/Event")
            .with_callback_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_callback_port(0)
            .with_check_interval(Duration::from_millis(50))
            .with_subscription_timeout(Duration::from_secs(3600))
            .with_unsubscribe_on_stop(false);

        assert_eq!(config.bind_addr(), "127.0.0.1:0".parse().unwrap());
        assert_eq!(config.subscription_timeout_secs(), Some(3600));
        assert!(!config.unsubscribe_on_stop);
        assert_eq!(
            config.endpoint().url(),
            "http://10.0.0.5:1443/MediaRenderer/RenderingControl/Event"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_subscription_timeout_saturates() {
        let config =
            SessionConfig::new("h").with_subscription_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(config.subscription_timeout_secs(), Some(u32::MAX));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            SessionConfig::default(),
            SessionConfig::new("  "),
            SessionConfig::new("h").with_device_port(0),
            SessionConfig::new("h").with_event_path("/"),
            SessionConfig::new("h").with_event_namespace(""),
            SessionConfig::new("h").with_check_interval(Duration::ZERO),
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(EventsError::InvalidConfig(_))),
                "Expected {config:?} to be rejected"
            );
        }
    }
}
