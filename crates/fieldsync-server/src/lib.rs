// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP API for the field reconciliation engine.
//!
//! Thin axum layer over the transport-agnostic handlers in
//! `fieldsync_core::handlers`. Routes:
//!
//! | Method | Path             | Purpose                                |
//! |--------|------------------|----------------------------------------|
//! | POST   | `/runs`          | Submit a run; returns the run id       |
//! | GET    | `/runs`          | List run summaries, newest first       |
//! | GET    | `/runs/{run_id}` | Full run record (stages, logs, progress) |
//! | GET    | `/health`        | Liveness plus active-run gauge         |

#![deny(missing_docs)]

pub mod bootstrap;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use fieldsync_core::error::EngineError;
use fieldsync_core::handlers::{
    self, CreateRunRequest, EngineState, ListRunsQuery,
};

/// Error payload returned on every non-2xx response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Stable error code identifier.
    pub error_code: String,
    /// Human readable message.
    pub message: String,
}

/// Engine error wrapped for HTTP.
#[derive(Debug)]
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::RunNotFound { .. } | EngineError::StageNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            EngineError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            EngineError::RunAlreadyExists { .. } | EngineError::StageAlreadyTerminal { .. } => {
                StatusCode::CONFLICT
            }
            EngineError::StoreError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            // EngineError is #[non_exhaustive]; all current variants are
            // matched above, so this arm is unreachable today.
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error_code: self.0.error_code().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the API router over shared engine state.
pub fn api_router(state: EngineState) -> Router {
    Router::new()
        .route(
            "/runs",
            axum::routing::post(create_run).get(list_runs),
        )
        .route("/runs/{run_id}", get(get_run))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn create_run(
    State(state): State<EngineState>,
    Json(request): Json<CreateRunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = handlers::handle_create_run(&state, request).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn list_runs(
    State(state): State<EngineState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let response = handlers::handle_list_runs(&state, query).await?;
    Ok(Json(response))
}

async fn get_run(
    State(state): State<EngineState>,
    Path(run_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let run = handlers::handle_get_run(&state, &run_id).await?;
    Ok(Json(run))
}

async fn health(State(state): State<EngineState>) -> Result<impl IntoResponse, ApiError> {
    let response = handlers::handle_health_check(&state).await?;
    Ok(Json(response))
}
