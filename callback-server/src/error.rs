//! Error types for the callback server

use std::net::SocketAddr;

use thiserror::Error;

/// Errors that can occur while starting the callback server
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound
    #[error("Failed to bind callback server to {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },

    /// The server thread could not build its tokio runtime
    #[error("Failed to start callback server runtime: {0}")]
    Runtime(String),

    /// The server thread exited before reporting readiness
    #[error("Callback server thread exited during startup")]
    StartupAborted,
}

/// Result type for callback server operations
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let error = ServerError::Bind {
            addr: "0.0.0.0:8080".parse().unwrap(),
            reason: "address in use".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to bind callback server to 0.0.0.0:8080: address in use"
        );

        let error = ServerError::StartupAborted;
        assert_eq!(error.to_string(), "Callback server thread exited during startup");
    }
}
