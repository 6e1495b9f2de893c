//! Daprsvc core — message model, handler results, and cloud-event envelope
//! decoding for the sidecar-to-application pub/sub contract.

pub mod envelope;
pub mod message;
pub mod result;

pub use envelope::{decode_message, DecodeError, ENVELOPE_CONTENT_TYPE, SPEC_VERSION};
pub use message::{
    is_json_content_type, Message, MessageFields, PayloadError, SubscriptionOptions, TraceContext,
};
pub use result::MessageResult;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
