//! Envelope Codec
//!
//! Decodes raw byte payloads from the exchange feed into typed
//! [`CandleUpdate`] values. The feed wraps kline events in a
//! combined-stream envelope:
//!
//! ```json
//! {"stream":"btcusdt@kline_1s","data":{"e":"kline","s":"BTCUSDT","k":{...}}}
//! ```
//!
//! Decoding is a total function with no side effects:
//!
//! - bytes that are not valid JSON → [`CandleUpdate::Malformed`]
//! - valid JSON without a nested `data.k` kline object (control frames,
//!   subscription acks, other event types) → [`CandleUpdate::Irrelevant`]
//! - a present `data.k` that cannot deserialize into kline fields →
//!   [`CandleUpdate::Malformed`]
//!
//! Field presence and numeric validity inside the kline are *not*
//! checked here; that is the normalizer's job.

use serde::Deserialize;
use serde_json::Value;

use crate::domain::candle::{CandleUpdate, KlineFields};

/// Combined-stream envelope shape. Only the parts the pipeline cares
/// about; everything else is ignored.
#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    #[serde(default)]
    data: Option<EventPayload>,
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(default)]
    k: Option<Value>,
}

/// JSON decoder for the exchange's combined-stream envelopes.
#[derive(Debug, Default, Clone)]
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a raw payload. Never fails; classification replaces
    /// errors.
    #[must_use]
    pub fn decode(&self, payload: &[u8]) -> CandleUpdate {
        let Ok(envelope) = serde_json::from_slice::<StreamEnvelope>(payload) else {
            // Distinguish "not JSON at all" from "JSON with an
            // unexpected shape" (e.g. a top-level array or a non-object
            // `data` field).
            return if serde_json::from_slice::<Value>(payload).is_ok() {
                CandleUpdate::Irrelevant
            } else {
                CandleUpdate::Malformed
            };
        };

        let Some(kline) = envelope.data.and_then(|data| data.k) else {
            return CandleUpdate::Irrelevant;
        };

        match serde_json::from_value::<KlineFields>(kline) {
            Ok(fields) => CandleUpdate::Kline(fields),
            Err(_) => CandleUpdate::Malformed,
        }
    }
}
