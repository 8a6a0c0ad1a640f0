use thiserror::Error;

use crate::category::EventCategory;
use crate::listener::ListenerId;

/// Errors that can occur in an event session
#[derive(Error, Debug)]
pub enum EventsError {
    /// A category argument was not a string
    #[error("Event category must be one of the following strings: {}, got {found}", EventCategory::valid_names())]
    InvalidArgumentType { found: String },

    /// A category string did not name a known category
    #[error("Invalid event category \"{category}\". Event category must be one of the following: {}", EventCategory::valid_names())]
    InvalidCategory { category: String },

    /// The device rejected the SUBSCRIBE handshake or never answered it
    #[error("Subscribe handshake with {endpoint} failed: {reason}")]
    HandshakeFailed { endpoint: String, reason: String },

    /// A listener returned an error or panicked while handling a notification
    #[error("Listener {listener} failed handling {category} notification: {message}")]
    ListenerInvocation {
        category: EventCategory,
        listener: ListenerId,
        message: String,
    },

    /// The callback receiver could not be bound or the local address could not be found
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid session configuration
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// The lifecycle worker exited before answering
    #[error("Session worker disconnected")]
    WorkerDisconnected,
}

impl From<callback_server::ServerError> for EventsError {
    fn from(err: callback_server::ServerError) -> Self {
        EventsError::Transport(err.to_string())
    }
}

/// Result type for event session operations
pub type Result<T> = std::result::Result<T, EventsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_list_valid_categories() {
        let error = EventsError::InvalidCategory {
            category: "volume".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid event category \"volume\". Event category must be one of the following: ALL, TRACK_CHANGED"
        );

        let error = EventsError::InvalidArgumentType {
            found: "number".to_string(),
        };
        assert!(error.to_string().contains("ALL, TRACK_CHANGED"));
        assert!(error.to_string().ends_with("got number"));
    }

    #[test]
    fn test_handshake_error_display() {
        let error = EventsError::HandshakeFailed {
            endpoint: "http://192.168.1.100:1400/MediaRenderer/AVTransport/Event".to_string(),
            reason: "Device responded with HTTP 412".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Subscribe handshake with http://192.168.1.100:1400/MediaRenderer/AVTransport/Event failed: Device responded with HTTP 412"
        );
    }

    #[test]
    fn test_server_error_becomes_transport() {
        let error: EventsError = callback_server::ServerError::StartupAborted.into();
        assert!(matches!(error, EventsError::Transport(_)));
    }
}
