//! Error types for the GENA client

use thiserror::Error;

/// Errors that can occur during GENA communication
#[derive(Debug, Error)]
pub enum GenaError {
    /// Network, transport, or timeout error
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The device answered with a non-2xx status
    #[error("Device responded with HTTP {0}")]
    Status(u16),
}
