//! Lifecycle events pushed by the sandbox host.
//!
//! The host delivers events in batches: a JSON array of objects, each
//! carrying at least a string `type`. Other fields are kept when they are
//! known (`time`, `record`) and ignored otherwise. A `time` that is not a
//! string is dropped rather than failing the batch.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// Event type that marks the end of an invocation.
pub const RUNTIME_DONE: &str = "platform.runtimeDone";

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed event batch: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One lifecycle notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<serde_json::Value>,
}

fn string_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(raw) => Some(raw),
        _ => None,
    })
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            time: None,
            record: None,
        }
    }

    pub fn kind(&self) -> EventType {
        EventType::from(self.event_type.as_str())
    }

    pub fn is_runtime_done(&self) -> bool {
        self.event_type == RUNTIME_DONE
    }
}

/// Known lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    InitStart,
    InitRuntimeDone,
    InitReport,
    Start,
    RuntimeDone,
    Report,
    Extension,
    TelemetrySubscription,
    LogsDropped,
    Function,
    ExtensionLog,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::InitStart => "platform.initStart",
            EventType::InitRuntimeDone => "platform.initRuntimeDone",
            EventType::InitReport => "platform.initReport",
            EventType::Start => "platform.start",
            EventType::RuntimeDone => RUNTIME_DONE,
            EventType::Report => "platform.report",
            EventType::Extension => "platform.extension",
            EventType::TelemetrySubscription => "platform.telemetrySubscription",
            EventType::LogsDropped => "platform.logsDropped",
            EventType::Function => "function",
            EventType::ExtensionLog => "extension",
            EventType::Other => "other",
        }
    }
}

impl From<&str> for EventType {
    fn from(raw: &str) -> Self {
        match raw {
            "platform.initStart" => EventType::InitStart,
            "platform.initRuntimeDone" => EventType::InitRuntimeDone,
            "platform.initReport" => EventType::InitReport,
            "platform.start" => EventType::Start,
            RUNTIME_DONE => EventType::RuntimeDone,
            "platform.report" => EventType::Report,
            "platform.extension" => EventType::Extension,
            "platform.telemetrySubscription" => EventType::TelemetrySubscription,
            "platform.logsDropped" => EventType::LogsDropped,
            "function" => EventType::Function,
            "extension" => EventType::ExtensionLog,
            _ => EventType::Other,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decodes a request body into an ordered batch of events.
pub fn decode_events(body: &[u8]) -> Result<Vec<Event>, DecodeError> {
    Ok(serde_json::from_slice(body)?)
}

/// True when the batch holds at least one terminal event.
pub fn contains_runtime_done(events: &[Event]) -> bool {
    events.iter().any(Event::is_runtime_done)
}
