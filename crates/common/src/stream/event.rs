//! Typed events of the streaming chat protocol
//!
//! Each line is `data: <json>` with a `type` discriminator, or the literal
//! `[DONE]` sentinel. Blank lines, `:` comments and other SSE fields are
//! ignored.

use crate::resources::ToolCallRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Completion sentinel ending a stream
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Resource links, navigation hints and other turn metadata
    Metadata(Map<String, Value>),
    /// Next slice of answer prose
    ContentDelta(String),
    /// Tool calls the backend made for this turn
    ToolResults(Vec<ToolCallRecord>),
    Error(String),
    Done,
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Metadata(_) => "metadata",
            StreamEvent::ContentDelta(_) => "content",
            StreamEvent::ToolResults(_) => "tool_results",
            StreamEvent::Error(_) => "error",
            StreamEvent::Done => "done",
        }
    }
}

/// Result of decoding one line
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Event(StreamEvent),
    /// Blank, comment, non-data field or unknown event type
    Ignored,
    /// JSON that ended early; more input may complete it
    Incomplete(String),
    Malformed(String),
}

/// Payload of a `data:` line, or the whole line for a bare sentinel
pub fn data_payload(line: &str) -> Option<&str> {
    let line = line.trim_end();
    if let Some(payload) = line.strip_prefix("data:") {
        return Some(payload.trim_start());
    }
    (line.trim() == DONE_SENTINEL).then_some(DONE_SENTINEL)
}

/// Decode one complete line
pub fn decode_line(line: &str) -> LineOutcome {
    if line.trim().is_empty() || line.starts_with(':') {
        return LineOutcome::Ignored;
    }
    match data_payload(line) {
        Some(payload) => decode_payload(payload),
        None => LineOutcome::Ignored,
    }
}

/// Decode a `data:` payload
pub fn decode_payload(payload: &str) -> LineOutcome {
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return LineOutcome::Event(StreamEvent::Done);
    }
    if payload.is_empty() {
        return LineOutcome::Ignored;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(object)) => from_object(object),
        Ok(other) => LineOutcome::Malformed(format!("expected an object, got {}", other)),
        Err(e) if e.is_eof() => LineOutcome::Incomplete(payload.to_string()),
        Err(e) => LineOutcome::Malformed(e.to_string()),
    }
}

fn from_object(mut object: Map<String, Value>) -> LineOutcome {
    let Some(Value::String(kind)) = object.remove("type") else {
        return LineOutcome::Malformed("missing event type".to_string());
    };

    let text = |object: &Map<String, Value>, fields: &[&str]| {
        fields
            .iter()
            .find_map(|field| object.get(*field).and_then(Value::as_str))
            .map(str::to_string)
    };

    let event = match kind.as_str() {
        "metadata" => match object.remove("metadata") {
            Some(Value::Object(metadata)) => StreamEvent::Metadata(metadata),
            _ => StreamEvent::Metadata(object),
        },
        "content" | "content_delta" | "delta" => {
            match text(&object, &["content", "delta", "text"]) {
                Some(delta) => StreamEvent::ContentDelta(delta),
                None => return LineOutcome::Malformed("content event without text".to_string()),
            }
        }
        "tool_results" | "tool_calls" => {
            let calls = ["results", "tool_calls", "toolCalls", "calls"]
                .iter()
                .find_map(|field| object.remove(*field))
                .unwrap_or(Value::Array(Vec::new()));
            match serde_json::from_value::<Vec<ToolCallRecord>>(calls) {
                Ok(calls) => StreamEvent::ToolResults(calls),
                Err(e) => return LineOutcome::Malformed(format!("invalid tool results: {}", e)),
            }
        }
        "error" => StreamEvent::Error(
            text(&object, &["error", "message"]).unwrap_or_else(|| "unknown error".to_string()),
        ),
        "done" => StreamEvent::Done,
        _ => return LineOutcome::Ignored,
    };

    LineOutcome::Event(event)
}
