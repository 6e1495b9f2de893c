//! Service-invocation classification and interception.
//!
//! A request is an invocation call iff it carries both identity headers
//! set by the calling sidecar; the check is presence-only, never a value
//! check. Classified requests are answered by the registered invocation
//! handler (or 404 when none is registered) and always carry the marker
//! response header, so callers can tell "no handler registered" apart from
//! "not an invocation route" by the header alone. Everything else falls
//! through to the event routes untouched.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower::ServiceExt as _;

/// Header naming the calling application.
pub const CALLER_APP_ID_HEADER: &str = "dapr-caller-app-id";
/// Header naming the called application.
pub const CALLEE_APP_ID_HEADER: &str = "dapr-callee-app-id";
/// Marker set on every response to a classified invocation request.
pub const INVOCATION_MARKER_HEADER: &str = "x-daprsvc-invocation";

const MANDATORY_HEADERS: [&str; 2] = [CALLER_APP_ID_HEADER, CALLEE_APP_ID_HEADER];

/// True iff the request carries both invocation identity headers.
#[must_use]
pub fn is_invocation_request(headers: &HeaderMap) -> bool {
    MANDATORY_HEADERS
        .iter()
        .all(|header| headers.contains_key(*header))
}

/// Invocation handler slot captured by the interceptor middleware.
#[derive(Clone, Default)]
pub(crate) struct InvocationHandler(pub(crate) Option<Router>);

/// Middleware forking invocation traffic away from the event routes.
///
/// Invocation requests never reach `next`; their responses come from the
/// registered handler byte-for-byte, plus the marker header. Non-invocation
/// requests are forwarded to `next` verbatim.
pub(crate) async fn intercept(
    State(handler): State<InvocationHandler>,
    request: Request,
    next: Next,
) -> Response {
    if !is_invocation_request(request.headers()) {
        return next.run(request).await;
    }

    let mut response = match handler.0 {
        Some(router) => match router.oneshot(request).await {
            Ok(response) => response,
            Err(infallible) => match infallible {},
        },
        None => StatusCode::NOT_FOUND.into_response(),
    };
    response.headers_mut().insert(
        HeaderName::from_static(INVOCATION_MARKER_HEADER),
        HeaderValue::from_static("1"),
    );
    response
}
