//! Axum handlers for the discovery and delivery routes.
//!
//! `GET /dapr/subscribe` serializes the registry; `POST
//! /message/{source_name}/{topic}` resolves the subscription, decodes the
//! delivery, dispatches to the application callback, and encodes its
//! three-way outcome into the response shape the sidecar expects.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use daprsvc_core::{decode_message, DecodeError, MessageResult};

use crate::registry::{SubscriptionDescriptor, SubscriptionRegistry};

/// Shared state behind the event routes.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) registry: Arc<SubscriptionRegistry>,
}

/// `GET /dapr/subscribe` — advertises all subscriptions to the sidecar.
///
/// An empty registry yields `[]`, not an error.
pub(crate) async fn list_subscriptions(
    State(state): State<AppState>,
) -> Json<Vec<SubscriptionDescriptor>> {
    Json(state.registry.descriptors())
}

/// `POST /message/{source_name}/{topic}` — decodes and dispatches one
/// delivery. Unknown source or topic answers 404 before any body parsing.
pub(crate) async fn deliver_message(
    State(state): State<AppState>,
    Path((source_name, topic)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(subscription) = state.registry.resolve(&source_name, &topic) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let metadata = metadata_from_headers(&headers);
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    let message = match decode_message(
        subscription.source_name(),
        subscription.topic(),
        subscription.options(),
        content_type,
        body,
        metadata,
    ) {
        Ok(message) => message,
        Err(error) => return decode_failure(&source_name, &topic, &error),
    };

    let result = subscription.handler().handle(message).await;
    debug!(source = %source_name, topic = %topic, result = ?result, "dispatched message");
    encode_result(&result)
}

/// Extracts `metadata.*` request headers into a metadata map.
///
/// Header names arrive lowercased from the HTTP layer; the `metadata.`
/// prefix is stripped and the first value per header wins.
pub(crate) fn metadata_from_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .keys()
        .filter_map(|name| {
            let key = name.as_str().strip_prefix("metadata.")?;
            let value = headers.get(name)?.to_str().ok()?;
            Some((key.to_owned(), value.to_owned()))
        })
        .collect()
}

#[derive(Serialize)]
struct StatusBody<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Maps a handler outcome to the response the sidecar expects: 200
/// SUCCESS, 500 RETRY, 400 DROP, with the optional error text attached.
fn encode_result(result: &MessageResult) -> Response {
    let (status, body) = match result {
        MessageResult::Success => (
            StatusCode::OK,
            StatusBody {
                status: "SUCCESS",
                error: None,
            },
        ),
        MessageResult::Retry { error } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusBody {
                status: "RETRY",
                error: error.as_deref(),
            },
        ),
        MessageResult::Drop { error } => (
            StatusCode::BAD_REQUEST,
            StatusBody {
                status: "DROP",
                error: error.as_deref(),
            },
        ),
    };
    (status, Json(body)).into_response()
}

/// Answers a decode failure with a plaintext diagnostic and logs it; the
/// application callback never sees the delivery.
fn decode_failure(source_name: &str, topic: &str, error: &DecodeError) -> Response {
    warn!(source = %source_name, topic = %topic, %error, "failed to decode event message");
    let diagnostic = format!(
        "Failed to decode event message for source '{source_name}' on topic '{topic}': {error}"
    );
    (StatusCode::BAD_REQUEST, diagnostic).into_response()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use http_body_util::BodyExt as _;
    use serde_json::{json, Value};

    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn metadata_extraction_strips_prefix_and_keeps_first_value() {
        let mut headers = HeaderMap::new();
        headers.insert("metadata.ttlinseconds", HeaderValue::from_static("30"));
        headers.append("metadata.ttlinseconds", HeaderValue::from_static("60"));
        headers.insert("metadata.priority", HeaderValue::from_static("high"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let metadata = metadata_from_headers(&headers);
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata.get("ttlinseconds").map(String::as_str), Some("30"));
        assert_eq!(metadata.get("priority").map(String::as_str), Some("high"));
    }

    #[test]
    fn metadata_extraction_is_case_insensitive_on_the_prefix() {
        // Header names are normalized to lowercase by the header map, so a
        // client sending `Metadata.Key` still matches.
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::HeaderName::from_bytes(b"Metadata.Key").unwrap(),
            HeaderValue::from_static("value"),
        );
        let metadata = metadata_from_headers(&headers);
        assert_eq!(metadata.get("key").map(String::as_str), Some("value"));
    }

    #[tokio::test]
    async fn success_encodes_200_with_json_status() {
        let response = encode_result(&MessageResult::Success);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_json(response).await, json!({"status": "SUCCESS"}));
    }

    #[tokio::test]
    async fn retry_encodes_500_with_optional_error() {
        let response = encode_result(&MessageResult::Retry {
            error: Some("Something went wrong.".to_owned()),
        });
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({"status": "RETRY", "error": "Something went wrong."})
        );

        let response = encode_result(&MessageResult::Retry { error: None });
        assert_eq!(body_json(response).await, json!({"status": "RETRY"}));
    }

    #[tokio::test]
    async fn drop_encodes_400_with_optional_error() {
        let response = encode_result(&MessageResult::Drop {
            error: Some("Client error.".to_owned()),
        });
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"status": "DROP", "error": "Client error."})
        );

        let response = encode_result(&MessageResult::Drop { error: None });
        assert_eq!(body_json(response).await, json!({"status": "DROP"}));
    }

    #[tokio::test]
    async fn decode_failure_answers_plaintext_400() {
        let error = DecodeError::DataContentType;
        let response = decode_failure("servicebus", "order", &error);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned();
        assert!(content_type.starts_with("text/plain"));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("servicebus"));
        assert!(text.contains("order"));
        assert!(text.contains("does not match declared content type"));
    }
}
