//! Listener handles.
//!
//! A [`Listener`] is a cheaply clonable handle around a caller-supplied
//! callback. Every handle created with [`Listener::new`] gets a fresh
//! [`ListenerId`]; clones share it. The registry compares listeners by that
//! id, so registering a clone of an already registered handle is a no-op.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::NotificationPayload;

/// Boxed error a listener may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a listener callback returns.
pub type ListenerResult = std::result::Result<(), BoxError>;

type Callback = Arc<dyn Fn(&NotificationPayload) -> ListenerResult + Send + Sync>;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a listener handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A callable handle invoked with each matching notification.
///
/// # Example
///
/// ```
/// use sonos_events::{Listener, NotificationPayload};
///
/// let printer = Listener::new(|payload: &NotificationPayload| {
///     println!("{}", payload.text());
///     Ok(())
/// });
///
/// // Clones are the same listener.
/// assert_eq!(printer.clone(), printer);
/// assert_ne!(Listener::from_fn(|_| {}), printer);
/// ```
#[derive(Clone)]
pub struct Listener {
    id: ListenerId,
    name: Option<Arc<str>>,
    callback: Callback,
}

impl Listener {
    /// Wrap a fallible callback. Returning `Err`, or panicking, counts as a
    /// failed invocation and gets the listener evicted.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&NotificationPayload) -> ListenerResult + Send + Sync + 'static,
    {
        Self {
            id: ListenerId::next(),
            name: None,
            callback: Arc::new(callback),
        }
    }

    /// Wrap a callback that cannot fail.
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn(&NotificationPayload) + Send + Sync + 'static,
    {
        Self::new(move |payload| {
            callback(payload);
            Ok(())
        })
    }

    /// Attach a name used in log output.
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Run the callback, turning an error return or a panic into a message.
    pub(crate) fn invoke(&self, payload: &NotificationPayload) -> Result<(), String> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(payload))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Listener {}

impl Hash for Listener {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", self.id, name),
            None => write!(f, "{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_identity_follows_handle_not_callback() {
        let a = Listener::from_fn(|_| {});
        let b = Listener::from_fn(|_| {});

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert!(a.id() < b.id());

        let set: HashSet<Listener> = [a.clone(), a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_invoke_runs_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let listener = Listener::from_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(listener.invoke(&NotificationPayload::new("x")).is_ok());
        assert!(listener.clone().invoke(&NotificationPayload::new("y")).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invoke_reports_error_return() {
        let listener = Listener::new(|_| Err("device went away".into()));
        assert_eq!(
            listener.invoke(&NotificationPayload::new("x")),
            Err("device went away".to_string())
        );
    }

    #[test]
    fn test_invoke_catches_panics() {
        let listener = Listener::from_fn(|_| panic!("boom"));
        let result = listener.invoke(&NotificationPayload::new("x"));
        assert_eq!(result, Err("panicked: boom".to_string()));

        let listener = Listener::from_fn(|payload| panic!("bad payload of {} bytes", payload.len()));
        let result = listener.invoke(&NotificationPayload::new("abc"));
        assert_eq!(result, Err("panicked: bad payload of 3 bytes".to_string()));
    }

    #[test]
    fn test_display_includes_name() {
        let listener = Listener::from_fn(|_| {}).with_name("now-playing");
        let id = listener.id();
        assert_eq!(listener.name(), Some("now-playing"));
        assert_eq!(listener.to_string(), format!("{id} (now-playing)"));
        assert_eq!(id.to_string(), format!("listener-{}", id.as_u64()));
    }
}
