//! Service object assembling the inbound HTTP contract.
//!
//! [`DaprService`] is constructed once during application startup, has
//! subscriptions and the invocation handler registered through `&mut`
//! methods, and is then consumed by [`DaprService::into_router`]. Because
//! the router takes ownership, registry mutation concurrent with serving
//! is unrepresentable — the read-only-while-serving precondition is
//! enforced by construction rather than by locking.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{deliver_message, list_subscriptions, AppState};
use crate::invocation::{intercept, InvocationHandler};
use crate::registry::{Source, SubscriptionRegistry};

/// Collects subscriptions and the invocation handler, then turns into the
/// router the embedding application mounts and serves.
pub struct DaprService {
    registry: SubscriptionRegistry,
    invocation: Option<Router>,
}

impl DaprService {
    /// Creates a service with no subscriptions and no invocation handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: SubscriptionRegistry::new(),
            invocation: None,
        }
    }

    /// Creates (or replaces) a pub/sub source to register subscriptions
    /// on. Replacing a source orphans its prior subscriptions.
    pub fn create_source(&mut self, name: impl Into<String>) -> &mut Source {
        self.registry.create_source(name)
    }

    /// Registers the handler answering service-invocation requests.
    ///
    /// Responses are forwarded byte-for-byte; the interceptor only adds
    /// the invocation marker header.
    pub fn set_invocation_handler(&mut self, handler: Router) {
        self.invocation = Some(handler);
    }

    /// Assembles the axum router serving the full contract:
    ///
    /// - `GET /dapr/subscribe` — discovery listing
    /// - `POST /message/{source_name}/{topic}` — event delivery
    /// - invocation interception wrapping everything, unknown paths
    ///   included
    #[must_use]
    pub fn into_router(self) -> Router {
        let state = AppState {
            registry: Arc::new(self.registry),
        };

        Router::new()
            .route("/dapr/subscribe", get(list_subscriptions))
            .route("/message/{source_name}/{topic}", post(deliver_message))
            .with_state(state)
            .layer(middleware::from_fn_with_state(
                InvocationHandler(self.invocation),
                intercept,
            ))
    }
}

impl Default for DaprService {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
