//! Message data model for pub/sub deliveries.
//!
//! A [`Message`] is the normalized form handed to application callbacks,
//! whether the delivery arrived as a structured cloud-event envelope or as a
//! raw payload. Interpretation of `data` is driven by `content_type`: an
//! empty content type is treated as JSON-like, matching the sidecar default.

use std::collections::HashMap;
use std::sync::LazyLock;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;

/// Media types whose payloads are JSON text: `foo/json` and `foo/bar+json`.
static JSON_CONTENT_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^/]+/([^/]+\+)?json$").expect("pattern is valid"));

/// Returns true when `content_type` names a JSON media type.
///
/// Unlike [`Message::contains_json_data`], an empty string does not count
/// as JSON here; the empty-means-JSON default is a delivery-level rule.
#[must_use]
pub fn is_json_content_type(content_type: &str) -> bool {
    JSON_CONTENT_TYPE.is_match(content_type)
}

/// Per-subscription delivery options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Advertise to the sidecar that payloads are not to be wrapped in a
    /// cloud-event envelope (`rawPayload` discovery metadata).
    pub raw_payload: bool,
    /// Skip envelope parsing on delivery: the request body is handed to the
    /// callback verbatim as [`Message::data`].
    pub skip_envelope: bool,
}

/// Descriptive attributes carried by a structured envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFields {
    /// The envelope's `source` attribute: the context the event occurred in.
    pub origin: String,
    /// The envelope's `type` attribute: the kind of event.
    pub kind: String,
    /// Schema URI the payload adheres to, if declared.
    pub schema: String,
    /// Subject of the event within the origin context, if declared.
    pub subject: String,
    /// Occurrence time. `None` when the envelope carried no `time`
    /// attribute or it failed to parse; never a decode failure.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Tracing attributes forwarded by the sidecar; empty strings if absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    pub id: String,
    pub parent: String,
    pub state: String,
}

/// A decoded pub/sub delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Name of the pub/sub source the delivery was routed to.
    pub source_name: String,
    /// Topic the delivery was routed to.
    pub topic: String,
    /// The envelope's `id` attribute; empty for raw deliveries.
    pub id: String,
    /// Payload bytes. Raw JSON text when the content type is JSON-like.
    pub data: Bytes,
    /// Effective payload content type; empty means JSON-like.
    pub content_type: String,
    /// Entries extracted from `metadata.*` request headers.
    pub metadata: HashMap<String, String>,
    /// Descriptive envelope attributes; defaults for raw deliveries.
    pub fields: MessageFields,
    /// Tracing attributes; defaults for raw deliveries.
    pub trace: TraceContext,
}

/// Failure to interpret a message payload.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("message has non-json content-type '{content_type}'")]
    NotJson { content_type: String },
    #[error("failed to deserialize message data: {0}")]
    Json(#[from] serde_json::Error),
}

impl Message {
    /// True when `data` should be interpreted as JSON: either the content
    /// type is empty (the sidecar default) or it names a JSON media type.
    #[must_use]
    pub fn contains_json_data(&self) -> bool {
        self.content_type.is_empty() || is_json_content_type(&self.content_type)
    }

    /// Deserializes the payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::NotJson`] when the content type is not
    /// JSON-like, or the underlying deserialization error otherwise.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        if !self.contains_json_data() {
            return Err(PayloadError::NotJson {
                content_type: self.content_type.clone(),
            });
        }
        Ok(serde_json::from_slice(&self.data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with_content_type(content_type: &str, data: &[u8]) -> Message {
        Message {
            source_name: "servicebus".to_owned(),
            topic: "order".to_owned(),
            id: String::new(),
            data: Bytes::copy_from_slice(data),
            content_type: content_type.to_owned(),
            metadata: HashMap::new(),
            fields: MessageFields::default(),
            trace: TraceContext::default(),
        }
    }

    #[test]
    fn json_media_types_match_the_pattern() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("application/cloudevents+json"));
        assert!(is_json_content_type("text/json"));
        assert!(!is_json_content_type("application/octet-stream"));
        assert!(!is_json_content_type("text/plain"));
        assert!(!is_json_content_type("json"));
        assert!(!is_json_content_type(""));
    }

    #[test]
    fn empty_content_type_counts_as_json_data() {
        let message = message_with_content_type("", b"{}");
        assert!(message.contains_json_data());
    }

    #[test]
    fn json_deserializes_payload() {
        let message = message_with_content_type("application/json", br#"{"dummy":123}"#);
        let value: serde_json::Value = message.json().unwrap();
        assert_eq!(value["dummy"], 123);
    }

    #[test]
    fn json_rejects_non_json_content_type() {
        let message = message_with_content_type("application/octet-stream", b"\x00\x01");
        let error = message.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(error, PayloadError::NotJson { .. }));
    }

    #[test]
    fn json_surfaces_malformed_payload() {
        let message = message_with_content_type("", b"not json");
        let error = message.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(error, PayloadError::Json(_)));
    }
}
