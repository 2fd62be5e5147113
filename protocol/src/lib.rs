// Ferropool Protocol - coordinator <-> worker wire format
//
// Every stream message is a single UTF-8 text frame holding a JSON record
// with two fields: `event` (string) and `message` (any value). This module
// maps frames to and from the typed event set.

use ferropool_core::{FoundResult, MiningTemplate, NonceRange};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const EVENT_RANGE_ASSIGNMENT: &str = "range_assignment";
pub const EVENT_HEIGHT_CHANGED: &str = "height_changed";
pub const EVENT_NONCE_FOUND: &str = "nonce_found";
pub const EVENT_PING: &str = "ping";
pub const EVENT_ITERATION_COMPLETED: &str = "iteration_completed";

/// The raw `{event, message}` record carried by a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    pub message: Value,
}

/// The complete event set of the mining protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Coordinator -> worker: the worker's share of the nonce space.
    RangeAssignment(NonceRange),

    /// Coordinator -> worker: the chain tip moved; start searching this
    /// template over the stored range.
    HeightChanged(MiningTemplate),

    /// Worker -> coordinator: a nonce satisfying the target.
    NonceFound(FoundResult),

    /// Keep-alive, both directions. The payload is echoed back by the
    /// coordinator and discarded by the worker.
    Ping(Value),

    /// Worker -> coordinator: a full sweep of the assigned range finished
    /// without a hit. Reserved; the coordinator only logs it.
    IterationCompleted(Value),
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    MalformedFrame(serde_json::Error),

    #[error("unknown event `{0}`")]
    UnknownEvent(String),

    #[error("invalid `{event}` payload: {source}")]
    InvalidPayload {
        event: String,
        source: serde_json::Error,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::RangeAssignment(_) => EVENT_RANGE_ASSIGNMENT,
            Event::HeightChanged(_) => EVENT_HEIGHT_CHANGED,
            Event::NonceFound(_) => EVENT_NONCE_FOUND,
            Event::Ping(_) => EVENT_PING,
            Event::IterationCompleted(_) => EVENT_ITERATION_COMPLETED,
        }
    }

    fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Event::RangeAssignment(range) => serde_json::to_value(range),
            Event::HeightChanged(template) => serde_json::to_value(template),
            Event::NonceFound(found) => serde_json::to_value(found),
            Event::Ping(value) | Event::IterationCompleted(value) => Ok(value.clone()),
        }
    }
}

/// Serialize an event into frame text.
pub fn encode(event: &Event) -> Result<String, CodecError> {
    let frame = Frame {
        event: event.name().to_string(),
        message: event.payload().map_err(CodecError::MalformedFrame)?,
    };
    serde_json::to_string(&frame).map_err(CodecError::MalformedFrame)
}

/// Parse frame text into a typed event.
///
/// `UnknownEvent` means a well-formed frame with an unrecognized name (log
/// and ignore, keep the stream); any other error means the frame is garbage
/// and must be dropped.
pub fn decode(text: &str) -> Result<Event, CodecError> {
    let frame: Frame = serde_json::from_str(text).map_err(CodecError::MalformedFrame)?;
    decode_frame(frame)
}

pub fn decode_frame(frame: Frame) -> Result<Event, CodecError> {
    fn payload<T: DeserializeOwned>(event: &str, message: Value) -> Result<T, CodecError> {
        serde_json::from_value(message).map_err(|source| CodecError::InvalidPayload {
            event: event.to_string(),
            source,
        })
    }

    match frame.event.as_str() {
        EVENT_RANGE_ASSIGNMENT => Ok(Event::RangeAssignment(payload(
            EVENT_RANGE_ASSIGNMENT,
            frame.message,
        )?)),
        EVENT_HEIGHT_CHANGED => Ok(Event::HeightChanged(payload(
            EVENT_HEIGHT_CHANGED,
            frame.message,
        )?)),
        EVENT_NONCE_FOUND => Ok(Event::NonceFound(payload(EVENT_NONCE_FOUND, frame.message)?)),
        EVENT_PING => Ok(Event::Ping(frame.message)),
        EVENT_ITERATION_COMPLETED => Ok(Event::IterationCompleted(frame.message)),
        _ => Err(CodecError::UnknownEvent(frame.event)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::U256;
    use serde_json::json;

    #[test]
    fn test_range_assignment_wire_shape() {
        let event = Event::RangeAssignment(NonceRange::new(0, 2147483648));
        let text = encode(&event).unwrap();

        let raw: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(raw["event"], "range_assignment");
        assert_eq!(raw["message"]["start"], 0);
        assert_eq!(raw["message"]["end"], 2147483648u64);
    }

    #[test]
    fn test_decode_range_assignment() {
        let text = r#"{"event": "range_assignment", "message": {"start": 10, "end": 20}}"#;
        let event = decode(text).unwrap();
        assert_eq!(event, Event::RangeAssignment(NonceRange::new(10, 20)));
    }

    #[test]
    fn test_height_changed_round_trip() {
        let template = MiningTemplate {
            version: 0x20000000,
            prev_block: U256::from(123456u64),
            mrkl_root: U256::from(1u64) << 255,
            timestamp: 1_700_000_000,
            bits_difficulty: 0x1d00ffff,
        };
        let text = encode(&Event::HeightChanged(template)).unwrap();
        assert_eq!(decode(&text).unwrap(), Event::HeightChanged(template));
    }

    #[test]
    fn test_nonce_found_round_trip() {
        let found = FoundResult {
            nonce: 2083236893,
            timestamp: 1231006505,
        };
        let text = encode(&Event::NonceFound(found)).unwrap();
        assert_eq!(decode(&text).unwrap(), Event::NonceFound(found));
    }

    #[test]
    fn test_ping_carries_arbitrary_payload() {
        let event = decode(r#"{"event": "ping", "message": 1}"#).unwrap();
        assert_eq!(event, Event::Ping(json!(1)));

        let event = decode(r#"{"event": "ping", "message": "Ping back: 1"}"#).unwrap();
        assert_eq!(event, Event::Ping(json!("Ping back: 1")));
    }

    #[test]
    fn test_unknown_event_is_distinguished() {
        let result = decode(r#"{"event": "difficulty_changed", "message": {}}"#);
        assert!(matches!(result, Err(CodecError::UnknownEvent(name)) if name == "difficulty_changed"));
    }

    #[test]
    fn test_malformed_frame() {
        assert!(matches!(
            decode("not json at all"),
            Err(CodecError::MalformedFrame(_))
        ));
        assert!(matches!(
            decode(r#"{"message": 1}"#),
            Err(CodecError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_bad_payload_is_not_unknown() {
        let result = decode(r#"{"event": "nonce_found", "message": {"nonce": "xxx"}}"#);
        assert!(matches!(result, Err(CodecError::InvalidPayload { event, .. }) if event == "nonce_found"));
    }
}
