//! Conversation turn supervision
//!
//! A session owns at most one in-flight turn. Beginning a new turn cancels
//! the previous one and replaces its answer; anything still arriving for
//! the old turn is dropped.

use super::consumer::{InFlightAnswer, StreamConsumer, StreamNotice};
use super::framing::DEFAULT_MAX_LINE_BYTES;
use crate::errors::{AppError, Result};
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Handle for the turn that just began
#[derive(Debug, Clone)]
pub struct TurnTicket {
    pub turn_id: Uuid,
    /// Fires when the turn is superseded
    pub cancel: CancellationToken,
}

/// Whether input reached the current turn
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Applied(Vec<StreamNotice>),
    /// Addressed to a turn that is no longer current
    Dropped,
}

struct ActiveTurn {
    consumer: StreamConsumer,
    cancel: CancellationToken,
}

/// One conversation's turn state
pub struct ChatSession {
    current: Option<ActiveTurn>,
    max_line_bytes: usize,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::with_line_limit(DEFAULT_MAX_LINE_BYTES)
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line_limit(max_line_bytes: usize) -> Self {
        Self {
            current: None,
            max_line_bytes,
        }
    }

    /// Start a turn, superseding any turn still in flight
    pub fn begin_turn(&mut self) -> TurnTicket {
        if let Some(previous) = self.current.take() {
            if !previous.consumer.is_terminal() {
                debug!(turn_id = %previous.consumer.answer().turn_id, "Superseding in-flight turn");
            }
            previous.cancel.cancel();
        }

        let turn_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        self.current = Some(ActiveTurn {
            consumer: StreamConsumer::with_line_limit(turn_id, self.max_line_bytes),
            cancel: cancel.clone(),
        });

        TurnTicket { turn_id, cancel }
    }

    pub fn current_turn(&self) -> Option<Uuid> {
        self.current.as_ref().map(|turn| turn.consumer.answer().turn_id)
    }

    /// Answer of the current turn
    pub fn answer(&self) -> Option<&InFlightAnswer> {
        self.current.as_ref().map(|turn| turn.consumer.answer())
    }

    /// Answer of a specific turn, if it is still the current one
    pub fn answer_for(&self, turn_id: Uuid) -> Option<&InFlightAnswer> {
        self.answer().filter(|answer| answer.turn_id == turn_id)
    }

    pub fn deliver(&mut self, turn_id: Uuid, chunk: &[u8]) -> Delivery {
        self.with_turn(turn_id, |consumer| consumer.feed(chunk))
    }

    pub fn complete(&mut self, turn_id: Uuid) -> Delivery {
        self.with_turn(turn_id, StreamConsumer::finish)
    }

    pub fn fail(&mut self, turn_id: Uuid, message: &str) -> Delivery {
        self.with_turn(turn_id, |consumer| consumer.fail(message))
    }

    fn with_turn(
        &mut self,
        turn_id: Uuid,
        apply: impl FnOnce(&mut StreamConsumer) -> Vec<StreamNotice>,
    ) -> Delivery {
        match self.current.as_mut() {
            Some(turn)
                if turn.consumer.answer().turn_id == turn_id && !turn.cancel.is_cancelled() =>
            {
                Delivery::Applied(apply(&mut turn.consumer))
            }
            _ => {
                debug!(turn_id = %turn_id, "Dropping input for stale turn");
                Delivery::Dropped
            }
        }
    }
}

/// Final answer of a driven turn and every notice it produced
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub answer: InFlightAnswer,
    pub notices: Vec<StreamNotice>,
}

/// Read a chunk stream into the session until the turn is final
///
/// Returns `AppError::TurnSuperseded` as soon as the turn is cancelled;
/// nothing read after that point reaches the session.
#[instrument(skip_all, fields(turn_id = %ticket.turn_id))]
pub async fn drive_turn<S>(
    session: &Mutex<ChatSession>,
    ticket: &TurnTicket,
    mut chunks: S,
) -> Result<TurnOutcome>
where
    S: Stream<Item = Result<Vec<u8>>> + Unpin,
{
    let superseded = || AppError::TurnSuperseded {
        turn_id: ticket.turn_id.to_string(),
    };
    let mut notices = Vec::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = ticket.cancel.cancelled() => return Err(superseded()),
            next = chunks.next() => next,
        };

        let mut session = session.lock().await;
        let delivery = match next {
            Some(Ok(chunk)) => session.deliver(ticket.turn_id, &chunk),
            Some(Err(e)) => session.fail(ticket.turn_id, &e.to_string()),
            None => session.complete(ticket.turn_id),
        };

        match delivery {
            Delivery::Applied(applied) => notices.extend(applied),
            Delivery::Dropped => return Err(superseded()),
        }

        if let Some(answer) = session.answer_for(ticket.turn_id).filter(|a| a.is_terminal()) {
            return Ok(TurnOutcome {
                answer: answer.clone(),
                notices,
            });
        }
    }
}

const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_MAX_SESSIONS: usize = 10_000;

struct SessionEntry {
    session: Arc<Mutex<ChatSession>>,
    last_seen: Instant,
}

impl SessionEntry {
    /// A session whose lock is held has a turn being driven
    fn is_busy(&self) -> bool {
        self.session.try_lock().is_err()
    }
}

/// In-memory sessions keyed by conversation id
///
/// Sessions idle longer than the TTL are evicted, and the registry never
/// holds more than `max_sessions`; the least recently used idle session
/// goes first.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    idle_ttl: Duration,
    max_sessions: usize,
    max_line_bytes: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_limits(DEFAULT_IDLE_TTL, DEFAULT_MAX_SESSIONS)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(idle_ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
            max_sessions: max_sessions.max(1),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    /// Limit on a single stream frame for sessions created from now on
    pub fn with_line_limit(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    pub async fn get(&self, conversation_id: &str) -> Option<Arc<Mutex<ChatSession>>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(conversation_id)?;
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    pub async fn get_or_create(&self, conversation_id: &str) -> Arc<Mutex<ChatSession>> {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(conversation_id) {
            entry.last_seen = Instant::now();
            return entry.session.clone();
        }

        self.prune(&mut sessions);
        let session = Arc::new(Mutex::new(ChatSession::with_line_limit(self.max_line_bytes)));
        sessions.insert(
            conversation_id.to_string(),
            SessionEntry {
                session: session.clone(),
                last_seen: Instant::now(),
            },
        );
        session
    }

    /// Drop idle sessions; returns how many were removed
    pub async fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let ttl = self.idle_ttl;
        sessions.retain(|_, entry| entry.is_busy() || entry.last_seen.elapsed() < ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    /// Make room for one more session
    fn prune(&self, sessions: &mut HashMap<String, SessionEntry>) {
        let ttl = self.idle_ttl;
        sessions.retain(|_, entry| entry.is_busy() || entry.last_seen.elapsed() < ttl);

        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(_, entry)| !entry.is_busy())
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    debug!(conversation_id = %id, "Evicting least recently used session");
                    sessions.remove(&id);
                }
                None => break,
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
