//! Topic subscription registry.
//!
//! Sources are named pub/sub components owning an ordered list of
//! subscriptions; the registry holds them keyed by name. Registration
//! happens during application startup through `&mut` methods and the
//! registry becomes read-only once the service turns into a router, so
//! nothing here is synchronized.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use daprsvc_core::{Message, MessageResult, SubscriptionOptions};

/// Route prefix under which delivery routes are served.
pub(crate) const MESSAGE_ROUTE_PREFIX: &str = "/message";

// ---------------------------------------------------------------------------
// MessageHandler
// ---------------------------------------------------------------------------

/// Application callback invoked with each decoded [`Message`].
///
/// Implemented for any `Fn(Message) -> Future<Output = MessageResult>`
/// closure. The handler future runs inside the request's own task, so a
/// client disconnect cancels it; the library imposes no timeout of its own.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handles one delivery and reports the outcome.
    async fn handle(&self, message: Message) -> MessageResult;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MessageResult> + Send,
{
    async fn handle(&self, message: Message) -> MessageResult {
        self(message).await
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A registered (source, topic) pair with delivery options and callback.
#[derive(Clone)]
pub struct Subscription {
    source_name: String,
    topic: String,
    options: SubscriptionOptions,
    handler: Arc<dyn MessageHandler>,
}

impl Subscription {
    /// Name of the source this subscription belongs to.
    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Topic this subscription listens on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Delivery options declared at registration.
    #[must_use]
    pub fn options(&self) -> SubscriptionOptions {
        self.options
    }

    pub(crate) fn handler(&self) -> &dyn MessageHandler {
        self.handler.as_ref()
    }

    fn route(&self) -> String {
        format!("{MESSAGE_ROUTE_PREFIX}/{}/{}", self.source_name, self.topic)
    }

    fn descriptor(&self) -> SubscriptionDescriptor {
        let mut metadata = HashMap::new();
        if self.options.raw_payload {
            metadata.insert("rawPayload".to_owned(), "true".to_owned());
        }
        SubscriptionDescriptor {
            pubsubname: self.source_name.clone(),
            topic: self.topic.clone(),
            route: self.route(),
            metadata,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("source_name", &self.source_name)
            .field("topic", &self.topic)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Discovery shape advertised to the sidecar for one subscription.
///
/// Field names are the wire contract; `metadata` carries
/// `{"rawPayload": "true"}` only for raw-payload subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionDescriptor {
    pub pubsubname: String,
    pub topic: String,
    pub route: String,
    pub metadata: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// A named pub/sub component owning an ordered list of subscriptions.
pub struct Source {
    name: String,
    entries: Vec<Subscription>,
}

impl Source {
    fn new(name: String) -> Self {
        Self {
            name,
            entries: Vec::new(),
        }
    }

    /// Registers `handler` for deliveries on `topic`.
    ///
    /// Registering the same topic again keeps both entries in the
    /// discovery listing, but deliveries route to the newest registration.
    pub fn subscribe<H>(&mut self, topic: impl Into<String>, options: SubscriptionOptions, handler: H)
    where
        H: MessageHandler,
    {
        let topic = topic.into();
        debug!(source = %self.name, topic = %topic, "registering subscription");
        self.entries.push(Subscription {
            source_name: self.name.clone(),
            topic,
            options,
            handler: Arc::new(handler),
        });
    }
}

// ---------------------------------------------------------------------------
// SubscriptionRegistry
// ---------------------------------------------------------------------------

/// All sources and their subscriptions, keyed by source name.
#[derive(Default)]
pub struct SubscriptionRegistry {
    sources: HashMap<String, Source>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) the source named `name` and returns it for
    /// subscription registration. Replacing a source orphans every
    /// subscription registered on the prior one.
    pub fn create_source(&mut self, name: impl Into<String>) -> &mut Source {
        let name = name.into();
        match self.sources.entry(name.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(Source::new(name));
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(Source::new(name)),
        }
    }

    /// Returns the subscription deliveries to `source_name`/`topic` route
    /// to, preferring the most recent registration of the pair.
    #[must_use]
    pub fn resolve(&self, source_name: &str, topic: &str) -> Option<&Subscription> {
        self.sources
            .get(source_name)?
            .entries
            .iter()
            .rev()
            .find(|entry| entry.topic == topic)
    }

    /// One discovery descriptor per subscription across all sources.
    ///
    /// The backing map is unordered, so the listing order is unspecified;
    /// discovery consumers must not depend on it.
    #[must_use]
    pub fn descriptors(&self) -> Vec<SubscriptionDescriptor> {
        self.sources
            .values()
            .flat_map(|source| source.entries.iter())
            .map(Subscription::descriptor)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn success(_message: Message) -> impl Future<Output = MessageResult> {
        async { MessageResult::Success }
    }

    #[test]
    fn resolve_finds_registered_subscription() {
        let mut registry = SubscriptionRegistry::new();
        registry
            .create_source("servicebus")
            .subscribe("order", SubscriptionOptions::default(), success);

        let subscription = registry.resolve("servicebus", "order").unwrap();
        assert_eq!(subscription.source_name(), "servicebus");
        assert_eq!(subscription.topic(), "order");
    }

    #[test]
    fn resolve_misses_unknown_source_and_topic() {
        let mut registry = SubscriptionRegistry::new();
        registry
            .create_source("servicebus")
            .subscribe("order", SubscriptionOptions::default(), success);

        assert!(registry.resolve("unknown", "order").is_none());
        assert!(registry.resolve("servicebus", "unknown").is_none());
    }

    #[test]
    fn resolve_prefers_newest_registration_of_a_pair() {
        let mut registry = SubscriptionRegistry::new();
        let source = registry.create_source("servicebus");
        source.subscribe("order", SubscriptionOptions::default(), success);
        source.subscribe(
            "order",
            SubscriptionOptions {
                raw_payload: true,
                skip_envelope: false,
            },
            success,
        );

        let subscription = registry.resolve("servicebus", "order").unwrap();
        assert!(subscription.options().raw_payload);
        assert_eq!(registry.descriptors().len(), 2);
    }

    #[test]
    fn recreating_a_source_orphans_its_subscriptions() {
        let mut registry = SubscriptionRegistry::new();
        registry
            .create_source("servicebus")
            .subscribe("order", SubscriptionOptions::default(), success);
        registry.create_source("servicebus");

        assert!(registry.resolve("servicebus", "order").is_none());
        assert!(registry.descriptors().is_empty());
    }

    #[test]
    fn descriptor_carries_route_and_raw_payload_metadata() {
        let mut registry = SubscriptionRegistry::new();
        registry.create_source("servicebus").subscribe(
            "order",
            SubscriptionOptions {
                raw_payload: true,
                skip_envelope: false,
            },
            success,
        );

        let descriptors = registry.descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].pubsubname, "servicebus");
        assert_eq!(descriptors[0].topic, "order");
        assert_eq!(descriptors[0].route, "/message/servicebus/order");
        assert_eq!(
            descriptors[0].metadata.get("rawPayload").map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn descriptor_metadata_is_empty_without_raw_payload() {
        let mut registry = SubscriptionRegistry::new();
        registry
            .create_source("servicebus")
            .subscribe("order", SubscriptionOptions::default(), success);

        let descriptors = registry.descriptors();
        assert!(descriptors[0].metadata.is_empty());
    }
}
