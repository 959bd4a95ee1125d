// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory run store.
//!
//! A `RwLock`-guarded map keyed by run id. Snapshot reads clone the record
//! under the read lock, so pollers never observe a torn record; the write
//! lock serializes appends per the store contract.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::EngineError;
use crate::model::{LogEvent, ProgressSnapshot, RunRecord, RunSummary, StageResult};

use super::{ListRunsFilter, RunStore};

/// In-memory run store backend.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<String, RunRecord>>,
}

impl MemoryRunStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(&self, record: RunRecord) -> Result<(), EngineError> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&record.run_id) {
            return Err(EngineError::RunAlreadyExists {
                run_id: record.run_id,
            });
        }
        runs.insert(record.run_id.clone(), record);
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, EngineError> {
        Ok(self.runs.read().await.get(run_id).cloned())
    }

    async fn list_runs(&self, filter: &ListRunsFilter) -> Result<Vec<RunSummary>, EngineError> {
        let runs = self.runs.read().await;

        let mut summaries: Vec<RunSummary> = runs
            .values()
            .filter(|run| {
                filter
                    .entity_id
                    .as_ref()
                    .is_none_or(|entity| &run.entity_id == entity)
            })
            .map(RunRecord::summarize)
            .filter(|summary| {
                filter
                    .status
                    .is_none_or(|status| summary.overall_status == status)
            })
            .collect();

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(summaries
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn append_log(&self, run_id: &str, event: LogEvent) -> Result<(), EngineError> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(run_id).ok_or_else(|| EngineError::RunNotFound {
            run_id: run_id.to_string(),
        })?;
        run.logs.push(event);
        Ok(())
    }

    async fn set_progress(
        &self,
        run_id: &str,
        progress: ProgressSnapshot,
    ) -> Result<(), EngineError> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(run_id).ok_or_else(|| EngineError::RunNotFound {
            run_id: run_id.to_string(),
        })?;
        run.progress = progress;
        Ok(())
    }

    async fn set_stage_result(
        &self,
        run_id: &str,
        stage: &str,
        result: StageResult,
    ) -> Result<(), EngineError> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(run_id).ok_or_else(|| EngineError::RunNotFound {
            run_id: run_id.to_string(),
        })?;

        let slot = run
            .stages
            .iter_mut()
            .find(|s| s.name == stage)
            .ok_or_else(|| EngineError::StageNotFound {
                run_id: run_id.to_string(),
                stage: stage.to_string(),
            })?;

        if slot.result.status.is_terminal() {
            return Err(EngineError::StageAlreadyTerminal {
                run_id: run_id.to_string(),
                stage: stage.to_string(),
            });
        }

        slot.result = result;
        Ok(())
    }

    async fn set_finished(&self, run_id: &str, at: DateTime<Utc>) -> Result<(), EngineError> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(run_id).ok_or_else(|| EngineError::RunNotFound {
            run_id: run_id.to_string(),
        })?;
        run.finished_at = Some(at);
        Ok(())
    }

    async fn count_active_runs(&self) -> Result<i64, EngineError> {
        let runs = self.runs.read().await;
        Ok(runs
            .values()
            .filter(|run| !run.overall_status().is_terminal())
            .count() as i64)
    }
}
