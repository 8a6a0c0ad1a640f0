//! Generic UPnP callback receiver for event notifications.
//!
//! This crate provides a lightweight HTTP server for handling GENA `NOTIFY`
//! deliveries. It has no knowledge of device-specific payloads: every body is
//! passed through untouched.
//!
//! # Overview
//!
//! - [`CallbackServer`]: binds a local address on its own thread and accepts
//!   `NOTIFY` requests. Anything else gets `405 Method Not Allowed` with
//!   `Allow: NOTIFY`.
//! - [`NotificationHandler`]: receives each delivery synchronously before the
//!   device is answered. Closures taking a [`NotificationPayload`] implement it.
//! - [`NotificationPayload`]: the raw body plus the optional `SID`/`SEQ`
//!   header values.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use callback_server::{CallbackServer, NotificationPayload};
//!
//! let handler = Arc::new(|payload: NotificationPayload| {
//!     println!("{} bytes from {:?}", payload.len(), payload.subscription_id);
//! });
//!
//! let mut server = CallbackServer::start(callback_server::default_bind_addr(), handler)
//!     .expect("Failed to start callback server");
//!
//! // ... subscribe a device to server.callback_url(local_ip) ...
//!
//! server.stop();
//! ```

pub mod error;
pub mod handler;
mod server;

pub use error::{Result, ServerError};
pub use handler::{NotificationHandler, NotificationPayload};
pub use server::{default_bind_addr, CallbackServer, DEFAULT_PORT, NOTIFY_METHOD};
