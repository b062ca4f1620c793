//! Search handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::AppState;
use versegate_common::{
    errors::{AppError, Result},
    metrics::RequestMetrics,
    resources::{
        parse_kind_names, present, AggregatedSearch, PreferenceOverrides, PresentationPolicy,
        PresentedMessage,
    },
};

/// Search request
#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    #[serde(default)]
    #[validate(length(max = 500))]
    pub query: String,

    /// Reference scope such as "John 3", "Romans" or "NT"
    #[serde(default)]
    #[validate(length(max = 200))]
    pub reference: String,

    /// Kinds to search; empty or "all" means every kind
    #[serde(default)]
    #[validate(length(max = 6))]
    pub resources: Vec<String>,

    #[serde(default)]
    pub presentation: PresentationPolicy,

    #[serde(flatten)]
    pub preferences: PreferenceOverrides,
}

/// Search response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(flatten)]
    pub search: AggregatedSearch,
    pub total_count: usize,
    pub messages: Vec<PresentedMessage>,
    pub processing_time_ms: u64,
}

/// Scope-aware search across every requested resource kind
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let request_metrics = RequestMetrics::start("POST", "/v1/search");
    let outcome = run_search(&state, request).await;
    request_metrics.finish_with(&outcome);
    outcome.map(Json)
}

async fn run_search(state: &AppState, request: SearchRequest) -> Result<SearchResponse> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    if request.query.trim().is_empty() && request.reference.trim().is_empty() {
        return Err(AppError::Validation {
            message: "Either query or reference is required".to_string(),
            field: Some("query".to_string()),
        });
    }

    let kinds = parse_kind_names(request.resources.iter().map(String::as_str))?;
    let prefs = request.preferences.apply(&state.config.default_preferences());

    // Client disconnect drops this future, which cancels in-flight providers
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let search = state
        .executor
        .aggregator()
        .aggregate(request.query.trim(), request.reference.trim(), &kinds, &prefs, &cancel)
        .await?;

    if search.all_failed() {
        tracing::warn!(
            query = %search.query,
            failed = search.failed_kinds.len(),
            "Every provider failed"
        );
        return Err(AppError::AllProvidersFailed);
    }

    let messages = present(&search, request.presentation);
    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        query = %search.query,
        scope = %search.scope_raw,
        total = search.total_count(),
        failed = search.failed_kinds.len(),
        processing_time_ms,
        "Search completed"
    );

    Ok(SearchResponse {
        total_count: search.total_count(),
        search,
        messages,
        processing_time_ms,
    })
}
