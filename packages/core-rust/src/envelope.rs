//! Cloud-event envelope decoding.
//!
//! [`decode_message`] turns one delivery into a [`Message`], either by
//! taking the body verbatim (`skip_envelope`) or by validating a structured
//! cloud-event against the subscription it was routed to. The envelope's
//! `data` member is captured as raw JSON bytes without re-encoding, so the
//! payload reaches the callback exactly as the sidecar sent it.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::value::RawValue;

use crate::message::{
    is_json_content_type, Message, MessageFields, SubscriptionOptions, TraceContext,
};

/// Content type required on structured envelope deliveries.
pub const ENVELOPE_CONTENT_TYPE: &str = "application/cloudevents+json";

/// The only supported cloud-event spec version.
pub const SPEC_VERSION: &str = "1.0";

/// Reasons a delivery fails to decode into a [`Message`].
///
/// Decode failures never reach the application callback; the dispatch
/// layer answers them with a plaintext 400 carrying the diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("message does not have a cloud-event content-type: '{found}'")]
    ContentType { found: String },
    #[error("failed to parse cloud-event json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown cloud-event spec version '{version}'")]
    SpecVersion { version: String },
    #[error(
        "message for '{declared_source}/{declared_topic}' arrived at '{source_name}/{topic}'"
    )]
    Destination {
        source_name: String,
        topic: String,
        declared_source: String,
        declared_topic: String,
    },
    #[error("failed to decode cloud-event base64 data")]
    Base64(#[source] base64::DecodeError),
    #[error("cloud-event data does not match declared content type")]
    DataContentType,
}

/// Wire shape of a structured cloud-event delivery, including the
/// extension attributes added by the sidecar. Unknown members are ignored.
#[derive(Deserialize)]
struct Envelope {
    id: String,
    source: String,
    specversion: String,
    #[serde(rename = "type")]
    kind: String,
    datacontenttype: Option<String>,
    dataschema: Option<String>,
    subject: Option<String>,
    time: Option<String>,
    data: Option<Box<RawValue>>,
    data_base64: Option<String>,
    pubsubname: String,
    topic: String,
    #[serde(default)]
    traceid: String,
    #[serde(default)]
    traceparent: String,
    #[serde(default)]
    tracestate: String,
}

/// Decodes one delivery into a [`Message`].
///
/// `source_name` and `topic` identify the subscription the delivery was
/// routed to; a structured envelope addressed elsewhere is rejected.
/// `content_type` is the request's `Content-Type` header value, and
/// `metadata` holds the entries already extracted from `metadata.*`
/// headers by the HTTP layer.
///
/// With `skip_envelope` set the body becomes [`Message::data`] verbatim
/// and no structural validation happens at all.
///
/// # Errors
///
/// Returns the [`DecodeError`] for the first rule the delivery violates:
/// wrong content type, malformed JSON, unsupported spec version,
/// destination mismatch, undecodable base64, or payload/content-type
/// mismatch.
pub fn decode_message(
    source_name: &str,
    topic: &str,
    options: SubscriptionOptions,
    content_type: Option<&str>,
    body: Bytes,
    metadata: HashMap<String, String>,
) -> Result<Message, DecodeError> {
    if options.skip_envelope {
        return Ok(Message {
            source_name: source_name.to_owned(),
            topic: topic.to_owned(),
            id: String::new(),
            data: body,
            content_type: String::new(),
            metadata,
            fields: MessageFields::default(),
            trace: TraceContext::default(),
        });
    }

    let found = content_type.unwrap_or_default();
    if found != ENVELOPE_CONTENT_TYPE {
        return Err(DecodeError::ContentType {
            found: found.to_owned(),
        });
    }

    let envelope: Envelope = serde_json::from_slice(&body)?;

    if envelope.specversion != SPEC_VERSION {
        return Err(DecodeError::SpecVersion {
            version: envelope.specversion,
        });
    }

    if envelope.pubsubname != source_name || envelope.topic != topic {
        return Err(DecodeError::Destination {
            source_name: source_name.to_owned(),
            topic: topic.to_owned(),
            declared_source: envelope.pubsubname,
            declared_topic: envelope.topic,
        });
    }

    let content_type = envelope.datacontenttype.unwrap_or_default();
    let data = if content_type.is_empty() || is_json_content_type(&content_type) {
        match envelope.data {
            Some(raw) => Bytes::copy_from_slice(raw.get().as_bytes()),
            None => return Err(DecodeError::DataContentType),
        }
    } else if let Some(encoded) = envelope.data_base64 {
        Bytes::from(BASE64.decode(encoded).map_err(DecodeError::Base64)?)
    } else {
        return Err(DecodeError::DataContentType);
    };

    let timestamp = envelope
        .time
        .as_deref()
        .and_then(|time| DateTime::parse_from_rfc3339(time).ok())
        .map(|time| time.with_timezone(&Utc));

    Ok(Message {
        source_name: source_name.to_owned(),
        topic: topic.to_owned(),
        id: envelope.id,
        data,
        content_type,
        metadata,
        fields: MessageFields {
            origin: envelope.source,
            kind: envelope.kind,
            schema: envelope.dataschema.unwrap_or_default(),
            subject: envelope.subject.unwrap_or_default(),
            timestamp,
        },
        trace: TraceContext {
            id: envelope.traceid,
            parent: envelope.traceparent,
            state: envelope.tracestate,
        },
    })
}
