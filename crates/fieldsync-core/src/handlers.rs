// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport-agnostic request handlers for the engine API.
//!
//! Each handler validates its input, touches the run store, and returns a
//! serializable response; the HTTP layer maps these onto routes and turns
//! [`EngineError`]s into status codes. Run submission is asynchronous: the
//! handler creates the run record, spawns the orchestrator task, and
//! returns immediately with the run id for polling.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::EngineError;
use crate::model::{FieldMap, RunRecord, RunStatus, RunSummary};
use crate::orchestrator::Orchestrator;
use crate::store::{ListRunsFilter, RunStore};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct EngineState {
    /// Run persistence backend.
    pub store: Arc<dyn RunStore>,
    /// Run driver; owns the pipeline and retry policy.
    pub orchestrator: Orchestrator,
    /// `max_retries` applied when a submission does not specify one.
    pub default_max_retries: u32,
    /// Process start, for uptime reporting.
    pub start_time: Instant,
    /// Engine version string reported by the health endpoint.
    pub version: String,
}

/// Run submission payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRunRequest {
    /// Remote entity to reconcile against.
    pub entity_id: String,
    /// Report-only mode. Defaults to true: mutation is opt-in.
    #[serde(default)]
    pub dry_run: Option<bool>,
    /// Per-stage retry budget override.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Opaque per-submission stage configuration. The pipeline is static
    /// in this deployment, so the value is accepted but not interpreted.
    #[serde(default)]
    pub stage_config: Option<serde_json::Value>,
    /// Authoritative field values extracted from source documents.
    pub authoritative: FieldMap,
}

/// Response to a run submission.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRunResponse {
    /// Identifier for polling the run.
    pub run_id: String,
    /// Effective dry-run mode.
    pub dry_run: bool,
}

/// Query options for the run listing endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRunsQuery {
    /// Filter by derived overall status.
    pub status: Option<String>,
    /// Filter by entity.
    pub entity_id: Option<String>,
    /// Page size (default 100).
    pub limit: Option<i64>,
    /// Page offset.
    pub offset: Option<i64>,
}

/// Run listing response.
#[derive(Debug, Clone, Serialize)]
pub struct ListRunsResponse {
    /// Summaries, newest first.
    pub runs: Vec<RunSummary>,
}

/// Health endpoint response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always true when the process can answer at all.
    pub healthy: bool,
    /// Engine version.
    pub version: String,
    /// Milliseconds since process start.
    pub uptime_ms: u64,
    /// Runs not yet in a terminal status.
    pub active_runs: i64,
}

/// Submit a run: persist the pending record, spawn the orchestrator, and
/// return the run id without waiting for any stage to execute.
#[instrument(skip(state, request), fields(entity_id = %request.entity_id))]
pub async fn handle_create_run(
    state: &EngineState,
    request: CreateRunRequest,
) -> Result<CreateRunResponse, EngineError> {
    if request.entity_id.trim().is_empty() {
        return Err(EngineError::ValidationError {
            field: "entity_id".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    if request.authoritative.is_empty() {
        return Err(EngineError::ValidationError {
            field: "authoritative".to_string(),
            message: "must contain at least one field value".to_string(),
        });
    }

    let dry_run = request.dry_run.unwrap_or(true);
    let max_retries = request.max_retries.unwrap_or(state.default_max_retries);
    let run_id = Uuid::new_v4().to_string();

    let stage_names = state.orchestrator.stage_names();
    let record = RunRecord::new(
        run_id.clone(),
        request.entity_id.clone(),
        &stage_names,
        dry_run,
        max_retries,
    );
    state.store.create_run(record.clone()).await?;

    info!(run_id = %run_id, dry_run, max_retries, "Run accepted");

    let orchestrator = state.orchestrator.clone();
    let authoritative = request.authoritative;
    tokio::spawn(async move {
        orchestrator.run(record, authoritative).await;
    });

    Ok(CreateRunResponse { run_id, dry_run })
}

/// List run summaries, newest first.
#[instrument(skip(state, query))]
pub async fn handle_list_runs(
    state: &EngineState,
    query: ListRunsQuery,
) -> Result<ListRunsResponse, EngineError> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(RunStatus::parse(raw).ok_or_else(|| EngineError::ValidationError {
            field: "status".to_string(),
            message: format!("unknown status '{}'", raw),
        })?),
    };

    let filter = ListRunsFilter {
        status,
        entity_id: query.entity_id,
        limit: query.limit.unwrap_or(100).clamp(1, 1000),
        offset: query.offset.unwrap_or(0).max(0),
    };

    let runs = state.store.list_runs(&filter).await?;
    Ok(ListRunsResponse { runs })
}

/// Fetch one full run record (stages, logs, progress).
#[instrument(skip(state))]
pub async fn handle_get_run(
    state: &EngineState,
    run_id: &str,
) -> Result<RunRecord, EngineError> {
    state
        .store
        .get_run(run_id)
        .await?
        .ok_or_else(|| EngineError::RunNotFound {
            run_id: run_id.to_string(),
        })
}

/// Liveness plus a coarse activity gauge.
pub async fn handle_health_check(state: &EngineState) -> Result<HealthResponse, EngineError> {
    Ok(HealthResponse {
        healthy: true,
        version: state.version.clone(),
        uptime_ms: state.start_time.elapsed().as_millis() as u64,
        active_runs: state.store.count_active_runs().await?,
    })
}
