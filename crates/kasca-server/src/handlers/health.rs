// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Health check endpoint

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::ServerResult;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub input_sessions: usize,
    pub active_recordings: usize,
    pub timestamp: String,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> ServerResult<Json<HealthResponse>> {
    let response = HealthResponse {
        status: "ok".to_string(),
        input_sessions: state.roster.input_count().await,
        active_recordings: state.recordings.active_count().await,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Ok(Json(response))
}
