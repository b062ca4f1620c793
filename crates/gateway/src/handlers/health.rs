//! Liveness and readiness

use crate::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::time::Instant;
use versegate_common::errors::{AppError, Result};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Liveness {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub status: &'static str,
    /// Round trip to the resource service
    pub upstream_latency_ms: u64,
    pub active_conversations: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<Liveness> {
    Json(Liveness {
        status: "healthy",
        version: versegate_common::VERSION,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// Ready once the resource service answers; 503 otherwise
pub async fn ready(State(state): State<AppState>) -> Result<Json<Readiness>> {
    let start = Instant::now();
    let deadline = state.config.providers.timeout();

    match tokio::time::timeout(deadline, state.transport.ping()).await {
        Ok(Ok(())) => Ok(Json(Readiness {
            status: "ready",
            upstream_latency_ms: start.elapsed().as_millis() as u64,
            active_conversations: state.sessions.len().await,
        })),
        Ok(Err(e)) => Err(AppError::ServiceUnavailable {
            message: format!("resource service unreachable: {}", e),
        }),
        Err(_) => Err(AppError::ServiceUnavailable {
            message: format!("resource service did not answer within {:?}", deadline),
        }),
    }
}
