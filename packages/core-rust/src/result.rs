//! Three-way outcome returned by message handlers.

/// Outcome of handling a single delivery.
///
/// The response encoder maps each variant to the status the sidecar
/// expects: `Success` acknowledges the delivery, `Retry` requests
/// redelivery, `Drop` stops it permanently. The optional text on
/// `Retry`/`Drop` is surfaced to the sidecar in the response body.
///
/// The variant set is closed: no other outcome is representable, so the
/// encoder matches exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageResult {
    /// Delivery processed; the sidecar must not redeliver.
    Success,
    /// Transient failure; the sidecar should schedule redelivery.
    Retry { error: Option<String> },
    /// Permanent rejection; the sidecar must stop redelivering.
    Drop { error: Option<String> },
}
