//! Inbound events and command decoding
//!
//! An inbound event is a loose JSON object. It is decoded exactly once into a
//! [`Command`]; everything downstream matches on the command and never looks
//! at payload strings again.
//!
//! Decoding order: `"clear"`, `"set_meter_value <n>"`, `"overwrite_value"`,
//! any event with `bar_keys` (restore), otherwise a reading.

use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{ChartError, Result};
use crate::snapshot::RestoreSnapshot;
use crate::timekey::normalize_timestamp;

pub const CLEAR: &str = "clear";
pub const SET_METER_VALUE: &str = "set_meter_value";
pub const OVERWRITE_VALUE: &str = "overwrite_value";

/// Inbound event as delivered by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Series identifier; empty means "all topics" for `clear`
    #[serde(default, deserialize_with = "topic_string")]
    pub topic: String,

    /// Reading, control directive, or snapshot chart array
    #[serde(default)]
    pub payload: Value,

    /// Event time in seconds or milliseconds (or RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<Value>,

    /// Alternative name for `ts`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_meter_value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bar_keys: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_counter: Option<Vec<Value>>,

    /// Everything else, notably `<topic>_last` and legacy `last`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InboundEvent {
    /// A plain reading at `ts` (seconds or milliseconds)
    pub fn reading(topic: &str, value: f64, ts: i64) -> Self {
        Self {
            topic: topic.to_string(),
            payload: Value::from(value),
            ts: Some(Value::from(ts)),
            ..Default::default()
        }
    }

    /// A control directive such as `"clear"` or `"set_meter_value 12"`
    pub fn control(topic: &str, directive: &str) -> Self {
        Self {
            topic: topic.to_string(),
            payload: Value::String(directive.to_string()),
            ..Default::default()
        }
    }

    /// An `overwrite_value` request
    pub fn overwrite(topic: &str, index: i64, new_value: f64) -> Self {
        Self {
            new_value: Some(Value::from(new_value)),
            index: Some(Value::from(index)),
            ..Self::control(topic, OVERWRITE_VALUE)
        }
    }

    pub fn at(mut self, ts: i64) -> Self {
        self.ts = Some(Value::from(ts));
        self
    }

    /// Event time in epoch milliseconds, `None` when the event carries none
    pub fn timestamp_ms(&self) -> Result<Option<i64>> {
        let raw = match self.ts.as_ref().or(self.timestamp.as_ref()) {
            None | Some(Value::Null) => return Ok(None),
            Some(raw) => raw,
        };

        if let Some(number) = number_of(raw) {
            return Ok(Some(normalize_timestamp(number.round() as i64)));
        }
        if let Value::String(text) = raw {
            if let Ok(dt) = DateTime::parse_from_rfc3339(text.trim()) {
                return Ok(Some(dt.timestamp_millis()));
            }
        }
        Err(ChartError::InvalidTimestamp(raw.to_string()))
    }
}

/// A decoded inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Clear the event's topic, or every topic when it is empty
    Clear,
    /// Set the topic's last meter reading
    SetMeterValue { value: f64 },
    /// Replace one stored bucket, addressed by position
    Overwrite {
        index: i64,
        new_value: f64,
        new_meter_value: Option<f64>,
    },
    /// Rebuild the store from a snapshot
    Restore(RestoreSnapshot),
    /// Fold a reading into the current bucket
    Reading { value: f64 },
}

impl Command {
    /// Decode an inbound event; validation errors leave the store untouched.
    pub fn decode(event: &InboundEvent) -> Result<Self> {
        if let Value::String(directive) = &event.payload {
            let mut words = directive.split(' ');
            match words.next() {
                Some(CLEAR) if directive == CLEAR => return Ok(Command::Clear),
                Some(SET_METER_VALUE) => {
                    if event.topic.is_empty() {
                        return Err(ChartError::MissingTopic {
                            action: "set the new meter value",
                        });
                    }
                    let value = words
                        .next()
                        .and_then(|word| word.trim().parse::<f64>().ok())
                        .filter(|v| v.is_finite())
                        .ok_or(ChartError::InvalidMeterValue)?;
                    return Ok(Command::SetMeterValue { value });
                }
                Some(OVERWRITE_VALUE) if directive == OVERWRITE_VALUE => {
                    return Self::decode_overwrite(event)
                }
                _ => {}
            }
        }

        if event.bar_keys.is_some() {
            return RestoreSnapshot::decode(event).map(Command::Restore);
        }

        number_of(&event.payload)
            .map(|value| Command::Reading { value })
            .ok_or_else(|| ChartError::InvalidReading {
                topic: event.topic.clone(),
                payload: event.payload.to_string(),
            })
    }

    fn decode_overwrite(event: &InboundEvent) -> Result<Self> {
        let new_value = event
            .new_value
            .as_ref()
            .and_then(number_of)
            .ok_or(ChartError::InvalidNewValue)?;
        let index = event
            .index
            .as_ref()
            .and_then(number_of)
            .filter(|i| i.fract() == 0.0)
            .ok_or(ChartError::InvalidIndex)?;
        let new_meter_value = event.new_meter_value.as_ref().and_then(number_of);

        Ok(Command::Overwrite {
            index: index as i64,
            new_value,
            new_meter_value,
        })
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Clear => CLEAR,
            Command::SetMeterValue { .. } => SET_METER_VALUE,
            Command::Overwrite { .. } => OVERWRITE_VALUE,
            Command::Restore(_) => "restore",
            Command::Reading { .. } => "reading",
        }
    }
}

/// Finite number from a JSON number or numeric string
pub fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Hosts sometimes send numeric topics; `null` means no topic.
fn topic_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}
