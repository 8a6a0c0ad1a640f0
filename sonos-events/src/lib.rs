//! Sonos Event Sessions
//!
//! Subscribe to the UPnP event notifications a Sonos player pushes, and fan
//! each one out to locally registered listeners.
//!
//! # Features
//!
//! - **Lazy lifecycle**: the callback receiver is bound and the device
//!   subscribed on the first `subscribe`; both are torn down once no listener
//!   remains
//! - **Categories**: listeners register under a concrete category or the
//!   `ALL` wildcard, named case-insensitively
//! - **Failure isolation**: a listener that errors or panics is logged and
//!   evicted without affecting the others
//! - **Pluggable**: custom [`Categorizer`] and [`LocalAddressResolver`]
//!
//! # Architecture
//!
//! ```text
//! device ──NOTIFY──▶ CallbackServer ──▶ Dispatcher ──▶ ListenerRegistry snapshot ──▶ listeners
//!   ▲                     ▲
//!   └──SUBSCRIBE──── session worker (start / periodic emptiness check / teardown)
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use sonos_events::{EventSession, Listener, SessionConfig};
//!
//! sonos_events::logging::init_logging_from_env().ok();
//!
//! let session = EventSession::new(SessionConfig::new("192.168.1.100"))?;
//!
//! let now_playing = Listener::new(|payload| {
//!     println!("{} bytes, SEQ {:?}", payload.len(), payload.sequence);
//!     Ok(())
//! })
//! .with_name("now-playing");
//!
//! session.subscribe(&now_playing, "track_changed")?;
//! session.subscribe_all(&now_playing)?;
//!
//! // ...
//!
//! session.stop();
//! # Ok::<(), sonos_events::EventsError>(())
//! ```

pub mod address;
pub mod categorizer;
pub mod category;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod logging;
pub mod registry;
pub mod session;
mod worker;

pub use address::{FixedAddress, LocalAddressResolver, UdpProbe};
pub use categorizer::{Categorizer, Uncategorized};
pub use category::{CategoryArg, EventCategory};
pub use config::{SessionConfig, DEFAULT_EVENT_PATH};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::{EventsError, Result};
pub use listener::{BoxError, Listener, ListenerId, ListenerResult};
pub use registry::{ListenerRegistry, ResolvedListener};
pub use session::{EventSession, EventSessionBuilder, SessionState, SubscriptionInfo};

pub use callback_server::NotificationPayload;
