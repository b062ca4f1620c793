//! Passage lookup handler

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::AppState;
use versegate_common::{
    errors::Result,
    metrics::RequestMetrics,
    resources::{PassageResult, PreferenceOverrides},
};

#[derive(Debug, Deserialize)]
pub struct PassageQuery {
    #[serde(default)]
    pub reference: String,

    #[serde(flatten)]
    pub preferences: PreferenceOverrides,
}

/// Fetch the text of one passage
pub async fn get_passage(
    State(state): State<AppState>,
    Query(query): Query<PassageQuery>,
) -> Result<Json<PassageResult>> {
    let request_metrics = RequestMetrics::start("GET", "/v1/passage");
    let prefs = query.preferences.apply(&state.config.default_preferences());
    let outcome = state
        .executor
        .scripture()
        .fetch_passage(&query.reference, &prefs)
        .await;
    request_metrics.finish_with(&outcome);

    let passage = outcome?;
    tracing::debug!(reference = %passage.reference, resource = %passage.resource, "Passage served");
    Ok(Json(passage))
}
