//! Daprsvc server — the application side of the sidecar HTTP contract.
//!
//! This is an inbound-request library: [`DaprService`] collects pub/sub
//! subscriptions and an optional invocation handler, and
//! [`DaprService::into_router`] produces the `axum::Router` the embedding
//! application mounts and serves. The library never binds a socket — the
//! server lifecycle (listen/serve/shutdown), along with the `tracing`
//! subscriber receiving its diagnostics, belongs to the application.

mod handlers;

pub mod invocation;
pub mod registry;
pub mod service;

pub use daprsvc_core::{Message, MessageResult, SubscriptionOptions};
pub use invocation::{
    is_invocation_request, CALLEE_APP_ID_HEADER, CALLER_APP_ID_HEADER, INVOCATION_MARKER_HEADER,
};
pub use registry::{
    MessageHandler, Source, Subscription, SubscriptionDescriptor, SubscriptionRegistry,
};
pub use service::DaprService;
