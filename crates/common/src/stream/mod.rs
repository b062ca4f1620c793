//! Stream Consumer
//!
//! Turns the chunked chat protocol into ordered, typed events and projects
//! them onto a single in-flight answer per conversation turn:
//! - `framing`: byte chunks to complete lines
//! - `event`: lines to `StreamEvent`s
//! - `consumer`: the answer state machine
//! - `session`: one active turn per conversation, supersede on new turn
//! - `client`: the HTTP side of the chat backend

mod client;
mod consumer;
mod event;
mod framing;
mod session;

pub use client::{ChatBackend, ChatClient, ChatMessage, ChatTurnRequest, ChunkStream};
pub use consumer::{AnswerState, InFlightAnswer, StreamConsumer, StreamNotice};
pub use event::{decode_line, decode_payload, LineOutcome, StreamEvent, DONE_SENTINEL};
pub use framing::{LineBuffer, DEFAULT_MAX_LINE_BYTES};
pub use session::{drive_turn, ChatSession, Delivery, SessionRegistry, TurnOutcome, TurnTicket};
