//! Price Feed JSON Codec
//!
//! # Outbound
//!
//! ```json
//! {"type":"subscribe","symbols":["BTC/USD","SOL/USD"]}
//! {"type":"unsubscribe","symbols":["SOL/USD"]}
//! ```
//!
//! # Inbound
//!
//! Price updates arrive as a single object or an array of objects:
//!
//! ```json
//! {"symbol":"SOL/USD","price":142.17,"timestamp":1718000000000,"confidence":0.08}
//! ```
//!
//! `timestamp` is epoch milliseconds and defaults to the receipt time.
//! `confidence` is optional. Objects with a `type` field and no `price`
//! are control acknowledgements and are skipped, except `"error"` which is
//! surfaced as [`CodecError::Remote`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::application::ports::ControlMessage;
use crate::domain::streaming::PriceSample;
use crate::domain::subscription::{Symbol, SymbolError};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is neither a price update nor a known control message.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    /// Price update carries a malformed symbol.
    #[error("invalid symbol: {0}")]
    InvalidSymbol(#[from] SymbolError),

    /// Price is not a finite, non-negative number.
    #[error("invalid price {price} for {symbol}")]
    InvalidPrice {
        /// Symbol of the rejected update.
        symbol: String,
        /// Rejected value.
        price: f64,
    },

    /// Confidence is not a finite, non-negative number.
    #[error("invalid confidence {confidence} for {symbol}")]
    InvalidConfidence {
        /// Symbol of the rejected update.
        symbol: String,
        /// Rejected value.
        confidence: f64,
    },

    /// The feed reported an error.
    #[error("feed error: {0}")]
    Remote(String),
}

#[derive(Debug, Deserialize)]
struct WirePrice {
    symbol: String,
    price: f64,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Serialize)]
struct WireControl<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    symbols: &'a BTreeSet<Symbol>,
}

/// JSON codec for the price feed.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode a subscription control message.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, message: &ControlMessage) -> Result<String, CodecError> {
        let wire = WireControl {
            kind: message.action(),
            symbols: message.symbols(),
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Decode an inbound text frame.
    ///
    /// `received_at_ms` stamps updates that carry no timestamp. Control
    /// acknowledgements decode to an empty list. One bad element rejects the
    /// whole frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not valid JSON, has an unknown shape,
    /// carries an invalid price update, or is a feed error report.
    pub fn decode(&self, text: &str, received_at_ms: i64) -> Result<Vec<PriceSample>, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text.trim())?;

        match value {
            serde_json::Value::Array(items) => {
                let mut samples = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(sample) = Self::decode_object(item, received_at_ms)? {
                        samples.push(sample);
                    }
                }
                Ok(samples)
            }
            object @ serde_json::Value::Object(_) => {
                Ok(Self::decode_object(object, received_at_ms)?.into_iter().collect())
            }
            other => Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got: {}",
                preview(&other.to_string())
            ))),
        }
    }

    fn decode_object(
        value: serde_json::Value,
        received_at_ms: i64,
    ) -> Result<Option<PriceSample>, CodecError> {
        let Some(object) = value.as_object() else {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}",
                preview(&value.to_string())
            )));
        };

        if !object.contains_key("price") {
            return match object.get("type").and_then(serde_json::Value::as_str) {
                Some("error") => {
                    let message = object
                        .get("message")
                        .or_else(|| object.get("msg"))
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("unspecified");
                    Err(CodecError::Remote(message.to_string()))
                }
                Some(kind) => {
                    tracing::trace!(kind, "Skipping control message");
                    Ok(None)
                }
                None => Err(CodecError::InvalidFormat(format!(
                    "missing price: {}",
                    preview(&value.to_string())
                ))),
            };
        }

        let wire: WirePrice = serde_json::from_value(value)?;

        if !wire.price.is_finite() || wire.price < 0.0 {
            return Err(CodecError::InvalidPrice {
                symbol: wire.symbol,
                price: wire.price,
            });
        }

        if let Some(confidence) = wire.confidence
            && (!confidence.is_finite() || confidence < 0.0)
        {
            return Err(CodecError::InvalidConfidence {
                symbol: wire.symbol,
                confidence,
            });
        }

        let sample = PriceSample::new(
            Symbol::new(wire.symbol)?,
            wire.price,
            wire.timestamp.unwrap_or(received_at_ms),
        );

        Ok(Some(match wire.confidence {
            Some(confidence) => sample.with_confidence(confidence),
            None => sample,
        }))
    }
}

fn preview(text: &str) -> &str {
    let end = text
        .char_indices()
        .nth(50)
        .map_or(text.len(), |(index, _)| index);
    &text[..end]
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    const NOW: i64 = 1_718_000_000_000;

    fn symbols(names: &[&str]) -> BTreeSet<Symbol> {
        names.iter().map(|n| Symbol::new(*n).unwrap()).collect()
    }

    #[test]
    fn encode_subscribe() {
        let codec = JsonCodec::new();
        let json = codec
            .encode(&ControlMessage::Subscribe(symbols(&["SOL/USD", "BTC/USD"])))
            .unwrap();

        assert_eq!(json, r#"{"type":"subscribe","symbols":["BTC/USD","SOL/USD"]}"#);
    }

    #[test]
    fn encode_unsubscribe() {
        let codec = JsonCodec::new();
        let json = codec
            .encode(&ControlMessage::Unsubscribe(symbols(&["ETH/USD"])))
            .unwrap();

        assert_eq!(json, r#"{"type":"unsubscribe","symbols":["ETH/USD"]}"#);
    }

    #[test]
    fn decode_single_object() {
        let codec = JsonCodec::new();
        let json = r#"{"symbol":"SOL/USD","price":142.17,"timestamp":1700000000000,"confidence":0.08}"#;

        let samples = codec.decode(json, NOW).unwrap();

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].symbol.as_str(), "SOL/USD");
        assert!((samples[0].price - 142.17).abs() < f64::EPSILON);
        assert_eq!(samples[0].timestamp_ms, 1_700_000_000_000);
        assert_eq!(samples[0].confidence, Some(0.08));
    }

    #[test]
    fn decode_array_preserves_order() {
        let codec = JsonCodec::new();
        let json = r#"[
            {"symbol":"BTC/USD","price":64000.5},
            {"type":"heartbeat"},
            {"symbol":"ETH/USD","price":3100.25}
        ]"#;

        let samples = codec.decode(json, NOW).unwrap();

        let names: Vec<&str> = samples.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(names, vec!["BTC/USD", "ETH/USD"]);
    }

    #[test]
    fn missing_timestamp_uses_receipt_time() {
        let codec = JsonCodec::new();
        let samples = codec
            .decode(r#"{"symbol":"SOL/USD","price":1.0}"#, NOW)
            .unwrap();

        assert_eq!(samples[0].timestamp_ms, NOW);
        assert_eq!(samples[0].confidence, None);
    }

    #[test_case(r#"{"type":"subscribed","symbols":["SOL/USD"]}"# ; "subscribe ack")]
    #[test_case(r#"{"type":"unsubscribed"}"# ; "unsubscribe ack")]
    #[test_case("[]" ; "empty array")]
    fn control_frames_decode_to_nothing(json: &str) {
        let codec = JsonCodec::new();
        assert!(codec.decode(json, NOW).unwrap().is_empty());
    }

    #[test]
    fn feed_error_is_remote() {
        let codec = JsonCodec::new();
        let result = codec.decode(r#"{"type":"error","message":"unknown symbol"}"#, NOW);

        assert!(matches!(result, Err(CodecError::Remote(msg)) if msg == "unknown symbol"));
    }

    #[test_case("not json" ; "garbage")]
    #[test_case("42" ; "bare number")]
    #[test_case(r#"{"symbol":"SOL/USD"}"# ; "missing price and type")]
    #[test_case(r#"{"symbol":"SOL/USD","price":"high"}"# ; "string price")]
    #[test_case(r#"{"symbol":"","price":1.0}"# ; "empty symbol")]
    #[test_case(r#"{"symbol":"SOL/USD","price":-1.0}"# ; "negative price")]
    #[test_case(r#"{"symbol":"SOL/USD","price":1.0,"confidence":-0.5}"# ; "negative confidence")]
    #[test_case(r#"[{"symbol":"SOL/USD","price":1.0}, 7]"# ; "bad array element")]
    fn malformed_frames_are_rejected(json: &str) {
        let codec = JsonCodec::new();
        assert!(codec.decode(json, NOW).is_err());
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let text = "é".repeat(80);
        assert_eq!(preview(&text).chars().count(), 50);
    }
}
