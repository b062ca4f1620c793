//! Tool-call replay handler

use axum::{extract::State, Json};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::AppState;
use versegate_common::{
    errors::{AppError, Result},
    resources::{PreferenceOverrides, ReplayedTurn, ToolCallRecord},
};

/// Records from an earlier turn to run again
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRequest {
    #[validate(length(min = 1, max = 32))]
    pub tool_calls: Vec<ToolCallRecord>,

    #[serde(flatten)]
    pub preferences: PreferenceOverrides,
}

/// Re-execute recorded tool calls against the live providers
pub async fn replay(
    State(state): State<AppState>,
    Json(request): Json<ReplayRequest>,
) -> Result<Json<ReplayedTurn>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("toolCalls".to_string()),
    })?;

    let prefs = request.preferences.apply(&state.config.default_preferences());
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let turn = state.replayer.replay(&request.tool_calls, &prefs, &cancel).await?;
    Ok(Json(turn))
}
