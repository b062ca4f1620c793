//! Stream consumer: projects decoded events onto one in-flight answer
//!
//! ```text
//! idle ──delta──▶ streaming ──done──▶ finalizing ──▶ done
//!   └──────────────────┴──── error / broken final frame ──▶ errored
//! ```
//!
//! Metadata and tool results may arrive in any state; they are held and
//! merged into the answer when it finalizes. Once `done` or `errored`, no
//! further input changes the answer.

use super::event::{data_payload, decode_line, decode_payload, LineOutcome, StreamEvent};
use super::framing::{LineBuffer, DEFAULT_MAX_LINE_BYTES};
use crate::metrics::record_stream_event;
use crate::resources::ToolCallRecord;
use crate::scope::parse_reference;
use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerState {
    Idle,
    Streaming,
    Finalizing,
    Done,
    Errored,
}

impl AnswerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnswerState::Done | AnswerState::Errored)
    }
}

/// The answer being built for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InFlightAnswer {
    pub turn_id: Uuid,
    pub content: String,
    pub state: AnswerState,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl InFlightAnswer {
    fn new(turn_id: Uuid) -> Self {
        Self {
            turn_id,
            content: String::new(),
            state: AnswerState::Idle,
            metadata: Map::new(),
            tool_calls: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Whether the answer is final
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Side effects for the caller to act on, in the order they happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum StreamNotice {
    StateChanged { from: AnswerState, to: AnswerState },
    ContentAppended { text: String },
    /// A scripture reference appeared in the prose
    ReferenceDetected { reference: String },
    ToolResults { calls: Vec<ToolCallRecord> },
    Errored { message: String },
    Finalized,
}

fn inline_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:[1-3]\s?)?[A-Z][a-z]+(?:\sof\s[A-Z][a-z]+)?\.?\s\d+:\d+(?:[-\x{2013}]\d+)?")
            .expect("inline reference pattern is valid")
    })
}

/// Single writer of one turn's answer
#[derive(Debug)]
pub struct StreamConsumer {
    answer: InFlightAnswer,
    lines: LineBuffer,
    /// Payload that ended mid-JSON, waiting for its continuation
    partial: Option<String>,
    pending_metadata: Map<String, Value>,
    pending_tool_calls: Vec<ToolCallRecord>,
    references: HashSet<String>,
    /// Content before this offset can no longer produce a new reference
    scan_from: usize,
    max_line_bytes: usize,
}

impl StreamConsumer {
    pub fn new(turn_id: Uuid) -> Self {
        Self::with_line_limit(turn_id, DEFAULT_MAX_LINE_BYTES)
    }

    /// A consumer that errors the turn once a frame outgrows `max_line_bytes`
    pub fn with_line_limit(turn_id: Uuid, max_line_bytes: usize) -> Self {
        Self {
            answer: InFlightAnswer::new(turn_id),
            lines: LineBuffer::with_limit(max_line_bytes),
            partial: None,
            pending_metadata: Map::new(),
            pending_tool_calls: Vec::new(),
            references: HashSet::new(),
            scan_from: 0,
            max_line_bytes,
        }
    }

    pub fn answer(&self) -> &InFlightAnswer {
        &self.answer
    }

    pub fn into_answer(self) -> InFlightAnswer {
        self.answer
    }

    pub fn is_terminal(&self) -> bool {
        self.answer.is_terminal()
    }

    /// Feed one transport chunk; a no-op once the answer is final
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamNotice> {
        let mut notices = Vec::new();
        if self.is_terminal() {
            debug!(
                turn_id = %self.answer.turn_id,
                bytes = chunk.len(),
                "Dropping chunk after final state"
            );
            return notices;
        }

        let lines = match self.lines.push(chunk) {
            Ok(lines) => lines,
            Err(e) => {
                self.error_out(&e.to_string(), &mut notices);
                return notices;
            }
        };

        for line in lines {
            self.process_line(&line, &mut notices);
            if self.is_terminal() {
                break;
            }
        }
        notices
    }

    /// The transport reached end of stream
    ///
    /// A trailing frame that never completed is a protocol error; a clean
    /// end without the sentinel finalizes normally.
    pub fn finish(&mut self) -> Vec<StreamNotice> {
        let mut notices = Vec::new();
        if self.is_terminal() {
            return notices;
        }

        if let Some(line) = self.lines.take_remainder() {
            match self.next_outcome(&line) {
                LineOutcome::Event(event) => self.apply_into(event, &mut notices),
                LineOutcome::Ignored => {}
                LineOutcome::Incomplete(_) => {
                    self.error_out("stream ended mid-frame", &mut notices);
                }
                LineOutcome::Malformed(message) => {
                    self.error_out(&format!("malformed final frame: {}", message), &mut notices);
                }
            }
        }

        if !self.is_terminal() {
            if self.partial.take().is_some() {
                self.error_out("stream ended mid-frame", &mut notices);
            } else {
                self.finalize(&mut notices);
            }
        }
        notices
    }

    /// The transport failed; keeps what was received and marks the error
    pub fn fail(&mut self, message: &str) -> Vec<StreamNotice> {
        let mut notices = Vec::new();
        if !self.is_terminal() {
            self.error_out(message, &mut notices);
        }
        notices
    }

    /// Apply one decoded event
    pub fn apply(&mut self, event: StreamEvent) -> Vec<StreamNotice> {
        let mut notices = Vec::new();
        self.apply_into(event, &mut notices);
        notices
    }

    fn process_line(&mut self, line: &str, notices: &mut Vec<StreamNotice>) {
        match self.next_outcome(line) {
            LineOutcome::Event(event) => self.apply_into(event, notices),
            LineOutcome::Ignored => {}
            LineOutcome::Incomplete(payload) if payload.len() > self.max_line_bytes => {
                self.error_out(
                    &format!("frame exceeds {} bytes", self.max_line_bytes),
                    notices,
                );
            }
            LineOutcome::Incomplete(payload) => self.partial = Some(payload),
            LineOutcome::Malformed(message) => {
                warn!(
                    turn_id = %self.answer.turn_id,
                    error = %message,
                    "Skipping malformed stream line"
                );
                record_stream_event("malformed");
            }
        }
    }

    /// Decode a line, joining it onto a held partial payload first
    fn next_outcome(&mut self, line: &str) -> LineOutcome {
        let Some(partial) = self.partial.take() else {
            return decode_line(line);
        };

        let continuation = data_payload(line).unwrap_or(line);
        match decode_payload(&format!("{}\n{}", partial, continuation)) {
            LineOutcome::Malformed(_) => {
                warn!(turn_id = %self.answer.turn_id, "Discarding unterminated frame");
                decode_line(line)
            }
            outcome => outcome,
        }
    }

    fn apply_into(&mut self, event: StreamEvent, notices: &mut Vec<StreamNotice>) {
        if self.is_terminal() {
            return;
        }
        record_stream_event(event.kind());

        match event {
            StreamEvent::Metadata(metadata) => self.pending_metadata.extend(metadata),
            StreamEvent::ContentDelta(delta) => {
                if delta.is_empty() {
                    return;
                }
                if self.answer.state == AnswerState::Idle {
                    self.transition(AnswerState::Streaming, notices);
                }
                self.answer.content.push_str(&delta);
                notices.push(StreamNotice::ContentAppended { text: delta });
                self.detect_references(false, notices);
            }
            StreamEvent::ToolResults(calls) => {
                self.pending_tool_calls.extend(calls.iter().cloned());
                notices.push(StreamNotice::ToolResults { calls });
            }
            StreamEvent::Error(message) => self.error_out(&message, notices),
            StreamEvent::Done => self.finalize(notices),
        }
    }

    fn transition(&mut self, to: AnswerState, notices: &mut Vec<StreamNotice>) {
        let from = self.answer.state;
        if from != to {
            self.answer.state = to;
            notices.push(StreamNotice::StateChanged { from, to });
        }
    }

    fn merge_pending(&mut self) {
        let metadata = std::mem::take(&mut self.pending_metadata);
        self.answer.metadata.extend(metadata);
        self.answer.tool_calls.append(&mut self.pending_tool_calls);
    }

    fn finalize(&mut self, notices: &mut Vec<StreamNotice>) {
        self.transition(AnswerState::Finalizing, notices);
        self.merge_pending();
        self.detect_references(true, notices);
        self.answer.finished_at = Some(Utc::now());
        self.transition(AnswerState::Done, notices);
        notices.push(StreamNotice::Finalized);
    }

    /// Keep the accumulated content and append the error inline
    fn error_out(&mut self, message: &str, notices: &mut Vec<StreamNotice>) {
        self.merge_pending();
        self.detect_references(true, notices);

        let inline = format!("[Error: {}]", message);
        if !self.answer.content.is_empty() {
            self.answer.content.push_str("\n\n");
        }
        self.answer.content.push_str(&inline);
        self.answer.error = Some(message.to_string());
        self.answer.finished_at = Some(Utc::now());

        warn!(turn_id = %self.answer.turn_id, error = %message, "Stream errored");
        self.transition(AnswerState::Errored, notices);
        notices.push(StreamNotice::Errored {
            message: message.to_string(),
        });
    }

    /// Report references once each; mid-stream, a reference touching the
    /// end of the content may still be growing and waits for more text
    ///
    /// Only content from `scan_from` on is searched, so a long answer is
    /// not rescanned on every delta.
    fn detect_references(&mut self, final_pass: bool, notices: &mut Vec<StreamNotice>) {
        let start = self.scan_from;
        let content = &self.answer.content;
        let mut open_at = None;
        let mut closed_end = start;

        for found in inline_reference_pattern().find_iter(&content[start..]) {
            let (from, to) = (start + found.start(), start + found.end());
            let open = content[to..]
                .chars()
                .next()
                .map(|c| c.is_ascii_digit() || matches!(c, ':' | '-' | '\u{2013}'))
                .unwrap_or(true);
            if open && !final_pass {
                open_at.get_or_insert(from);
                continue;
            }

            closed_end = to;
            let reference = found.as_str().to_string();
            if parse_reference(&reference).is_some() && self.references.insert(reference.clone()) {
                notices.push(StreamNotice::ReferenceDetected { reference });
            }
        }

        self.scan_from = match open_at {
            Some(from) => from,
            None => settled_offset(content, start).max(closed_end),
        };
    }
}

/// Start of the last word at or after `from` that no reference can span
///
/// A reference only crosses whitespace into an uppercase word, a digit or
/// the word "of", so any other word start is a safe place to resume.
fn settled_offset(content: &str, from: usize) -> usize {
    let tail = &content[from..];
    let mut settled = from;
    let mut after_space = false;

    for (index, c) in tail.char_indices() {
        if c.is_whitespace() {
            after_space = true;
            continue;
        }
        if after_space {
            let word = tail[index..].split(char::is_whitespace).next().unwrap_or_default();
            let spannable = c.is_uppercase() || c.is_ascii_digit() || "of".starts_with(word);
            if !spannable {
                settled = from + index;
            }
        }
        after_space = false;
    }
    settled
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = concat!(
        ": connected\n",
        "data: {\"type\":\"metadata\",\"metadata\":{\"model\":\"test\"}}\n",
        "\n",
        "data: {\"type\":\"content\",\"content\":\"God so loved \"}\n",
        "data: {\"type\":\"content\",\"content\":\"the world (John 3:16).\"}\n",
        "data: {\"type\":\"tool_results\",\"results\":[{\"tool\":\"get_scripture_passage\",\"args\":{\"reference\":\"John 3:16\"}}]}\n",
        "data: [DONE]\n",
    );

    fn consume(chunks: &[&[u8]]) -> (InFlightAnswer, Vec<StreamNotice>) {
        let mut consumer = StreamConsumer::new(Uuid::new_v4());
        let mut notices = Vec::new();
        for chunk in chunks {
            notices.extend(consumer.feed(chunk));
        }
        notices.extend(consumer.finish());
        (consumer.into_answer(), notices)
    }

    #[test]
    fn test_split_mid_line_matches_unsplit() {
        let whole = b"data: {\"type\":\"content\",\"content\":\"hi\"}\n";
        let (unsplit, _) = consume(&[whole]);
        let (split, _) = consume(&[b"data: {\"typ", b"e\":\"content\",\"content\":\"hi\"}\n"]);

        assert_eq!(split.content, "hi");
        assert_eq!(split.content, unsplit.content);
        assert_eq!(split.state, unsplit.state);
    }

    #[test]
    fn test_every_split_point_gives_same_answer() {
        let bytes = STREAM.as_bytes();
        let (expected, _) = consume(&[bytes]);
        assert_eq!(expected.content, "God so loved the world (John 3:16).");
        assert_eq!(expected.state, AnswerState::Done);

        for split in 1..bytes.len() {
            let (answer, _) = consume(&[&bytes[..split], &bytes[split..]]);
            assert_eq!(answer.content, expected.content, "split at {split}");
            assert_eq!(answer.metadata, expected.metadata);
            assert_eq!(answer.tool_calls, expected.tool_calls);
        }
    }

    #[test]
    fn test_state_transitions_and_notices() {
        let (answer, notices) = consume(&[STREAM.as_bytes()]);

        assert_eq!(answer.metadata.get("model"), Some(&Value::String("test".into())));
        assert_eq!(answer.tool_calls.len(), 1);
        assert!(answer.finished_at.is_some());

        let transitions: Vec<_> = notices
            .iter()
            .filter_map(|n| match n {
                StreamNotice::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![AnswerState::Streaming, AnswerState::Finalizing, AnswerState::Done]
        );
        assert!(notices.contains(&StreamNotice::ReferenceDetected {
            reference: "John 3:16".into()
        }));
        assert_eq!(notices.last(), Some(&StreamNotice::Finalized));
    }

    #[test]
    fn test_metadata_does_not_change_state() {
        let mut consumer = StreamConsumer::new(Uuid::new_v4());
        let notices = consumer.feed(b"data: {\"type\":\"metadata\",\"links\":[]}\n");
        assert!(notices.is_empty());
        assert_eq!(consumer.answer().state, AnswerState::Idle);
        // Held until the answer finalizes
        assert!(consumer.answer().metadata.is_empty());
    }

    #[test]
    fn test_no_mutation_after_done() {
        let mut consumer = StreamConsumer::new(Uuid::new_v4());
        consumer.feed(b"data: {\"type\":\"content\",\"content\":\"final\"}\ndata: [DONE]\n");
        let finalized = consumer.answer().clone();

        let notices = consumer.feed(b"data: {\"type\":\"content\",\"content\":\" late\"}\n");
        assert!(notices.is_empty());
        assert!(consumer.fail("boom").is_empty());
        assert!(consumer.finish().is_empty());
        assert_eq!(consumer.answer(), &finalized);
    }

    #[test]
    fn test_chunk_after_sentinel_in_same_chunk_is_ignored() {
        let (answer, _) = consume(&[
            b"data: {\"type\":\"content\",\"content\":\"a\"}\ndata: [DONE]\ndata: {\"type\":\"content\",\"content\":\"b\"}\n",
        ]);
        assert_eq!(answer.content, "a");
    }

    #[test]
    fn test_error_event_flushes_content() {
        let (answer, notices) = consume(&[
            b"data: {\"type\":\"content\",\"content\":\"Partial answer\"}\n",
            b"data: {\"type\":\"error\",\"error\":\"backend overloaded\"}\n",
        ]);

        assert_eq!(answer.state, AnswerState::Errored);
        assert_eq!(answer.content, "Partial answer\n\n[Error: backend overloaded]");
        assert_eq!(answer.error.as_deref(), Some("backend overloaded"));
        assert!(notices.contains(&StreamNotice::Errored {
            message: "backend overloaded".into()
        }));
    }

    #[test]
    fn test_transport_failure_keeps_content() {
        let mut consumer = StreamConsumer::new(Uuid::new_v4());
        consumer.feed(b"data: {\"type\":\"content\",\"content\":\"So far\"}\n");
        consumer.fail("connection reset");

        let answer = consumer.answer();
        assert_eq!(answer.state, AnswerState::Errored);
        assert!(answer.content.starts_with("So far"));
        assert!(answer.content.ends_with("[Error: connection reset]"));
    }

    #[test]
    fn test_truncated_final_frame_errors() {
        let (answer, _) = consume(&[
            b"data: {\"type\":\"content\",\"content\":\"ok\"}\n",
            b"data: {\"type\":\"content\",\"cont",
        ]);
        assert_eq!(answer.state, AnswerState::Errored);
        assert!(answer.content.starts_with("ok"));
    }

    #[test]
    fn test_malformed_mid_stream_line_is_skipped() {
        let (answer, _) = consume(&[
            b"data: {not json}\n",
            b"data: {\"type\":\"content\",\"content\":\"fine\"}\n",
        ]);
        assert_eq!(answer.content, "fine");
        assert_eq!(answer.state, AnswerState::Done);
    }

    #[test]
    fn test_payload_continued_on_next_data_line() {
        let (answer, _) = consume(&[
            b"data: {\"type\":\"content\",\n",
            b"data: \"content\":\"joined\"}\n",
            b"data: [DONE]\n",
        ]);
        assert_eq!(answer.content, "joined");
    }

    #[test]
    fn test_reference_split_across_deltas_detected_once() {
        let mut consumer = StreamConsumer::new(Uuid::new_v4());
        let mut notices = consumer.apply(StreamEvent::ContentDelta("See Romans 8:2".into()));
        notices.extend(consumer.apply(StreamEvent::ContentDelta("8 and Romans 8:28.".into())));
        notices.extend(consumer.apply(StreamEvent::Done));

        let references: Vec<_> = notices
            .iter()
            .filter_map(|n| match n {
                StreamNotice::ReferenceDetected { reference } => Some(reference.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(references, vec!["Romans 8:28"]);
    }

    #[test]
    fn test_reference_scan_resumes_after_settled_text() {
        let mut consumer = StreamConsumer::new(Uuid::new_v4());
        let mut notices = Vec::new();
        for _ in 0..50 {
            notices.extend(consumer.apply(StreamEvent::ContentDelta("and the word was with God ".into())));
        }
        let settled = consumer.scan_from;
        assert!(settled > consumer.answer().content.len() - 40);

        notices.extend(consumer.apply(StreamEvent::ContentDelta("as in 1 Jo".into())));
        notices.extend(consumer.apply(StreamEvent::ContentDelta("hn 1:1 and John 1:14 ".into())));
        notices.extend(consumer.apply(StreamEvent::Done));

        let references: Vec<_> = notices
            .iter()
            .filter_map(|n| match n {
                StreamNotice::ReferenceDetected { reference } => Some(reference.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(references, vec!["1 John 1:1", "John 1:14"]);
    }

    #[test]
    fn test_settled_offset_never_splits_a_reference() {
        let text = "read Song of Solomon 2:4 and 2 Kings 5:1";
        let offset = settled_offset(text, 0);
        assert_eq!(&text[offset..], "and 2 Kings 5:1");
        assert_eq!(settled_offset("Romans 8", 0), 0);
    }

    #[test]
    fn test_oversized_line_errors_the_turn() {
        let mut consumer = StreamConsumer::with_line_limit(Uuid::new_v4(), 64);
        consumer.feed(b"data: {\"type\":\"content\",\"content\":\"kept\"}\n");

        let notices = consumer.feed(&[b'x'; 100]);

        let answer = consumer.answer();
        assert_eq!(answer.state, AnswerState::Errored);
        assert!(answer.content.starts_with("kept"));
        assert!(notices.iter().any(|n| matches!(n, StreamNotice::Errored { .. })));
    }

    #[test]
    fn test_oversized_continued_frame_errors_the_turn() {
        let mut consumer = StreamConsumer::with_line_limit(Uuid::new_v4(), 48);
        consumer.feed(b"data: {\"type\":\"content\",\n");
        assert_eq!(consumer.answer().state, AnswerState::Idle);

        consumer.feed(b"data: \"k\":\"padding padding padding\",\n");
        assert_eq!(consumer.answer().state, AnswerState::Errored);
    }
}
