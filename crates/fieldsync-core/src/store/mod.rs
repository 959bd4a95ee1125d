// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pluggable storage for run state.
//!
//! The [`RunStore`] trait is the persistence boundary of the engine: the
//! orchestrator is the single writer for any given run, while pollers read
//! concurrently through the query API. Implementations must provide atomic,
//! ordering-preserving log appends and snapshot reads that are never torn
//! (slightly stale is acceptable, corrupted is not).
//!
//! Two backends are provided: [`MemoryRunStore`] for tests and ephemeral
//! deployments, [`SqliteRunStore`] when runs must survive a restart.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryRunStore;
pub use self::sqlite::SqliteRunStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::model::{LogEvent, ProgressSnapshot, RunRecord, RunStatus, RunSummary, StageResult};

/// Filter options for listing runs.
#[derive(Debug, Clone)]
pub struct ListRunsFilter {
    /// Filter by derived overall status.
    pub status: Option<RunStatus>,
    /// Filter by remote entity key.
    pub entity_id: Option<String>,
    /// Page size.
    pub limit: i64,
    /// Page offset.
    pub offset: i64,
}

impl Default for ListRunsFilter {
    fn default() -> Self {
        Self {
            status: None,
            entity_id: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// Storage abstraction for run records.
///
/// ## Concurrency contract
///
/// - `append_log` is atomic and ordering-preserving under concurrent
///   callers; a run's log sequence only ever grows.
/// - `get_run` returns a consistent snapshot reflecting some prefix of
///   appends.
/// - `set_stage_result` refuses to overwrite a stage result that already
///   reached a terminal status; that invariant belongs to the data, not
///   only to the orchestrator's discipline.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a freshly created run. Fails if the run id already exists.
    async fn create_run(&self, record: RunRecord) -> Result<(), EngineError>;

    /// Fetch a full run record. Returns `None` if the run does not exist.
    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, EngineError>;

    /// List run summaries, newest first.
    async fn list_runs(&self, filter: &ListRunsFilter) -> Result<Vec<RunSummary>, EngineError>;

    /// Append one log event to a run's audit trail.
    async fn append_log(&self, run_id: &str, event: LogEvent) -> Result<(), EngineError>;

    /// Overwrite the run's progress snapshot (last write wins).
    async fn set_progress(
        &self,
        run_id: &str,
        progress: ProgressSnapshot,
    ) -> Result<(), EngineError>;

    /// Replace one stage's result.
    async fn set_stage_result(
        &self,
        run_id: &str,
        stage: &str,
        result: StageResult,
    ) -> Result<(), EngineError>;

    /// Mark the run finished at the given instant.
    async fn set_finished(&self, run_id: &str, at: DateTime<Utc>) -> Result<(), EngineError>;

    /// Number of runs that have not yet reached a terminal status.
    async fn count_active_runs(&self) -> Result<i64, EngineError>;
}
