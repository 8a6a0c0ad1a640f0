//! Notification payloads and the handler seam between the HTTP layer and
//! whatever consumes deliveries.
//!
//! The server never looks inside a delivery body. It hands the raw bytes,
//! together with the optional GENA `SID`/`SEQ` header values, to a
//! [`NotificationHandler`] and answers the device once the handler returns.

use std::borrow::Cow;

use bytes::Bytes;

/// An unparsed event notification delivered by a remote device.
///
/// The body is opaque: no structure is assumed. `subscription_id` and
/// `sequence` carry the `SID` and `SEQ` headers when the device sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    body: Bytes,
    /// Value of the `SID` header, if present
    pub subscription_id: Option<String>,
    /// Value of the `SEQ` header, if present and numeric
    pub sequence: Option<u32>,
}

impl NotificationPayload {
    /// Create a payload from a raw body with no header metadata.
    ///
    /// # Example
    ///
    /// ```
    /// use callback_server::NotificationPayload;
    ///
    /// let payload = NotificationPayload::new("<e:propertyset/>");
    /// assert_eq!(payload.len(), 16);
    /// assert!(payload.subscription_id.is_none());
    /// ```
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            subscription_id: None,
            sequence: None,
        }
    }

    /// Attach the `SID` header value.
    pub fn with_subscription_id(mut self, sid: impl Into<String>) -> Self {
        self.subscription_id = Some(sid.into());
        self
    }

    /// Attach the `SEQ` header value.
    pub fn with_sequence(mut self, seq: u32) -> Self {
        self.sequence = Some(seq);
        self
    }

    /// The raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Consume the payload, returning the body.
    pub fn into_body(self) -> Bytes {
        self.body
    }
}

/// Consumer of inbound deliveries.
///
/// `handle` is called once per accepted NOTIFY request, on tokio's blocking
/// pool, and the HTTP response is only written after it returns. It may block;
/// a slow handler delays only the delivery it is processing.
pub trait NotificationHandler: Send + Sync + 'static {
    fn handle(&self, payload: NotificationPayload);
}

impl<F> NotificationHandler for F
where
    F: Fn(NotificationPayload) + Send + Sync + 'static,
{
    fn handle(&self, payload: NotificationPayload) {
        self(payload)
    }
}
