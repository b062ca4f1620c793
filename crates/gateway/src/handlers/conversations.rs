//! Conversation turn handlers
//!
//! A turn streams the chat backend's answer into the conversation's session,
//! then replays the tool calls the backend reported so the caller receives
//! the same resources the answer was grounded on.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use versegate_common::{
    errors::{AppError, Result},
    metrics::RequestMetrics,
    resources::{
        present, PreferenceOverrides, PresentationPolicy, PresentedMessage, ReplayedTurn,
    },
    stream::{
        drive_turn, ChatMessage, ChatTurnRequest, Delivery, InFlightAnswer, StreamNotice,
        TurnOutcome,
    },
};

#[derive(Debug, Deserialize, Validate)]
pub struct TurnRequest {
    #[validate(length(min = 1, max = 4000))]
    pub message: String,

    #[serde(default)]
    #[validate(length(max = 50))]
    pub history: Vec<ChatMessage>,

    #[serde(default)]
    pub presentation: PresentationPolicy,

    #[serde(flatten)]
    pub preferences: PreferenceOverrides,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub conversation_id: String,
    pub answer: InFlightAnswer,
    pub notices: Vec<StreamNotice>,
    pub resources: ReplayedTurn,
    pub messages: Vec<PresentedMessage>,
}

/// Run one conversation turn to completion
///
/// Starting a turn supersedes any turn of the same conversation still in
/// flight; the superseded request answers 409.
pub async fn create_turn(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>> {
    let request_metrics = RequestMetrics::start("POST", "/v1/conversations/turns");
    let outcome = run_turn(&state, conversation_id, request).await;
    request_metrics.finish_with(&outcome);
    outcome.map(Json)
}

async fn run_turn(
    state: &AppState,
    conversation_id: String,
    request: TurnRequest,
) -> Result<TurnResponse> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let prefs = request.preferences.apply(&state.config.default_preferences());
    let session = state.sessions.get_or_create(&conversation_id).await;
    let ticket = session.lock().await.begin_turn();

    tracing::info!(
        conversation_id = %conversation_id,
        turn_id = %ticket.turn_id,
        "Turn started"
    );

    let chat_request = ChatTurnRequest {
        message: request.message,
        history: request.history,
        preferences: prefs.clone(),
    };

    let outcome = match state.chat.open(&chat_request).await {
        Ok(chunks) => drive_turn(&session, &ticket, chunks).await?,
        Err(e) => {
            tracing::warn!(turn_id = %ticket.turn_id, error = %e, "Chat backend unavailable");
            let mut guard = session.lock().await;
            let notices = match guard.fail(ticket.turn_id, &e.to_string()) {
                Delivery::Applied(notices) => notices,
                Delivery::Dropped => {
                    return Err(AppError::TurnSuperseded {
                        turn_id: ticket.turn_id.to_string(),
                    })
                }
            };
            let answer = guard
                .answer_for(ticket.turn_id)
                .cloned()
                .ok_or_else(|| AppError::Internal {
                    message: "Turn vanished after failing".to_string(),
                })?;
            TurnOutcome { answer, notices }
        }
    };

    let resources = state
        .replayer
        .replay(&outcome.answer.tool_calls, &prefs, &ticket.cancel)
        .await?;

    let messages = resources
        .search()
        .map(|search| present(search, request.presentation))
        .unwrap_or_default();

    tracing::info!(
        conversation_id = %conversation_id,
        turn_id = %ticket.turn_id,
        state = ?outcome.answer.state,
        replayed = resources.calls.len(),
        "Turn finished"
    );

    Ok(TurnResponse {
        conversation_id,
        answer: outcome.answer,
        notices: outcome.notices,
        resources,
        messages,
    })
}

/// Latest answer of a conversation
pub async fn get_answer(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<InFlightAnswer>> {
    let not_found = || AppError::NotFound {
        resource_type: "conversation".to_string(),
        id: conversation_id.clone(),
    };

    let session = state.sessions.get(&conversation_id).await.ok_or_else(not_found)?;
    let answer = session.lock().await.answer().cloned().ok_or_else(not_found)?;
    Ok(Json(answer))
}
