//! Mapping a notification to a concrete event category.
//!
//! Payloads are opaque to this crate, so the default [`Uncategorized`] never
//! names a category and notifications reach wildcard listeners only. A caller
//! that understands the device's event bodies can plug in its own
//! [`Categorizer`], either as a type or as a plain closure.

use crate::category::EventCategory;
use crate::NotificationPayload;

/// Classifies a notification.
///
/// Returning `None`, or [`EventCategory::All`], means the notification has no
/// concrete category and goes to wildcard listeners only.
pub trait Categorizer: Send + Sync + 'static {
    fn categorize(&self, payload: &NotificationPayload) -> Option<EventCategory>;
}

impl<F> Categorizer for F
where
    F: Fn(&NotificationPayload) -> Option<EventCategory> + Send + Sync + 'static,
{
    fn categorize(&self, payload: &NotificationPayload) -> Option<EventCategory> {
        self(payload)
    }
}

/// Categorizer that never infers a category.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uncategorized;

impl Categorizer for Uncategorized {
    fn categorize(&self, _payload: &NotificationPayload) -> Option<EventCategory> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncategorized_never_names_a_category() {
        let payload = NotificationPayload::new("<e:propertyset/>");
        assert_eq!(Uncategorized.categorize(&payload), None);
    }

    #[test]
    fn test_closure_categorizer() {
        let categorizer = |payload: &NotificationPayload| {
            payload
                .text()
                .contains("CurrentTrackURI")
                .then_some(EventCategory::TrackChanged)
        };

        assert_eq!(
            categorizer.categorize(&NotificationPayload::new("<CurrentTrackURI val=\"x\"/>")),
            Some(EventCategory::TrackChanged)
        );
        assert_eq!(
            categorizer.categorize(&NotificationPayload::new("<Volume val=\"12\"/>")),
            None
        );
    }
}
