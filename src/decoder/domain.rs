//! Shared decoder contract. Both protocol decoders (`family_b`, `family_j`)
//! implement the same `(topic, payload) -> Option<IntermediateForm>`
//! capability; the normalizer downstream never inspects which family
//! produced an `IntermediateForm` again once it has been decoded.

use crate::model::domain::IntermediateForm;

/// Decode failure taxonomy, emitted on the `error` bus topic rather than
/// ever panicking or propagating as an exception: decoders recover
/// locally, log, and publish `error`, then keep processing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("frame too short: need at least {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },
    #[error("unrecognized frame: topic={topic}, first_byte={first_byte:?}")]
    UnrecognizedFrame { topic: String, first_byte: Option<u8> },
    #[error("value out of range: {field} = {value}")]
    OutOfRange { field: String, value: i64 },
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Component tag attached to every `error` topic emission originating in
/// a decoder failure, so a raw frame is never dropped silently without
/// surfacing somewhere.
pub const COMPONENT_FAMILY_B: &str = "decoder.family_b";
pub const COMPONENT_FAMILY_J: &str = "decoder.family_j";

/// One decode attempt's outcome, carrying the component tag so the caller
/// can publish a correctly-tagged `error` event without re-deriving which
/// decoder produced the failure.
pub struct DecodeOutcome {
    pub result: Result<Option<IntermediateForm>, DecodeError>,
    pub component: &'static str,
}
