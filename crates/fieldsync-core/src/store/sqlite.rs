// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed run store.
//!
//! Run rows hold the structured columns plus the stage and progress state as
//! JSON; log events live in an append-only `run_logs` table whose rowid
//! provides the append order. Stage/progress updates run inside a
//! transaction so pollers never observe a torn record.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::EngineError;
use crate::model::{
    LogEvent, ProgressSnapshot, RunRecord, RunSummary, StageResult, StageState,
};

use super::{ListRunsFilter, RunStore};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// SQLite run store backend.
#[derive(Clone)]
pub struct SqliteRunStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct RunRow {
    run_id: String,
    entity_id: String,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    dry_run: bool,
    max_retries: i64,
    stages: String,
    progress: String,
}

impl RunRow {
    /// Rebuild a record from a row; `logs` are attached separately.
    fn into_record(self, logs: Vec<LogEvent>) -> Result<RunRecord, EngineError> {
        Ok(RunRecord {
            run_id: self.run_id,
            entity_id: self.entity_id,
            created_at: self.created_at,
            finished_at: self.finished_at,
            dry_run: self.dry_run,
            max_retries: self.max_retries as u32,
            stages: serde_json::from_str::<Vec<StageState>>(&self.stages)?,
            logs,
            progress: serde_json::from_str::<ProgressSnapshot>(&self.progress)?,
        })
    }
}

impl SqliteRunStore {
    /// Create a store from an existing pool (migrations must have run).
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a store from a database file path.
    ///
    /// Creates parent directories and the database file if needed, connects
    /// with sensible defaults, and runs all migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::StoreError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| EngineError::StoreError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| EngineError::StoreError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }

    async fn fetch_row(&self, run_id: &str) -> Result<Option<RunRow>, EngineError> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT run_id, entity_id, created_at, finished_at, dry_run,
                   max_retries, stages, progress
            FROM runs
            WHERE run_id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn create_run(&self, record: RunRecord) -> Result<(), EngineError> {
        let stages = serde_json::to_string(&record.stages)?;
        let progress = serde_json::to_string(&record.progress)?;

        let result = sqlx::query(
            r#"
            INSERT INTO runs (run_id, entity_id, created_at, finished_at,
                              dry_run, max_retries, stages, progress)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.run_id)
        .bind(&record.entity_id)
        .bind(record.created_at)
        .bind(record.finished_at)
        .bind(record.dry_run)
        .bind(record.max_retries as i64)
        .bind(stages)
        .bind(progress)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(EngineError::RunAlreadyExists {
                    run_id: record.run_id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, EngineError> {
        // Row and log reads share one transaction so the returned record
        // never pairs a stale stage snapshot with newer log lines.
        let mut tx = self.pool.begin().await?;

        let row: Option<RunRow> = sqlx::query_as(
            r#"
            SELECT run_id, entity_id, created_at, finished_at, dry_run,
                   max_retries, stages, progress
            FROM runs
            WHERE run_id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let events: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT event FROM run_logs
            WHERE run_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let logs = events
            .into_iter()
            .map(|(event,)| serde_json::from_str::<LogEvent>(&event))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(row.into_record(logs)?))
    }

    async fn list_runs(&self, filter: &ListRunsFilter) -> Result<Vec<RunSummary>, EngineError> {
        // The overall status is derived from the stage results, so the
        // status filter is applied after deserialization rather than in SQL.
        let rows: Vec<RunRow> = match &filter.entity_id {
            Some(entity_id) => {
                sqlx::query_as(
                    r#"
                    SELECT run_id, entity_id, created_at, finished_at, dry_run,
                           max_retries, stages, progress
                    FROM runs
                    WHERE entity_id = ?
                    ORDER BY created_at DESC, run_id DESC
                    "#,
                )
                .bind(entity_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT run_id, entity_id, created_at, finished_at, dry_run,
                           max_retries, stages, progress
                    FROM runs
                    ORDER BY created_at DESC, run_id DESC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let summaries = rows
            .into_iter()
            .map(|row| row.into_record(Vec::new()).map(|r| r.summarize()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(summaries
            .into_iter()
            .filter(|summary| {
                filter
                    .status
                    .is_none_or(|status| summary.overall_status == status)
            })
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn append_log(&self, run_id: &str, event: LogEvent) -> Result<(), EngineError> {
        if self.fetch_row(run_id).await?.is_none() {
            return Err(EngineError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let payload = serde_json::to_string(&event)?;
        sqlx::query("INSERT INTO run_logs (run_id, event) VALUES (?, ?)")
            .bind(run_id)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_progress(
        &self,
        run_id: &str,
        progress: ProgressSnapshot,
    ) -> Result<(), EngineError> {
        let payload = serde_json::to_string(&progress)?;
        let result = sqlx::query("UPDATE runs SET progress = ? WHERE run_id = ?")
            .bind(payload)
            .bind(run_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        Ok(())
    }

    async fn set_stage_result(
        &self,
        run_id: &str,
        stage: &str,
        result: StageResult,
    ) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await?;

        let stages_json: Option<(String,)> =
            sqlx::query_as("SELECT stages FROM runs WHERE run_id = ?")
                .bind(run_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((stages_json,)) = stages_json else {
            return Err(EngineError::RunNotFound {
                run_id: run_id.to_string(),
            });
        };

        let mut stages: Vec<StageState> = serde_json::from_str(&stages_json)?;
        let slot = stages
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

        let updated = serde_json::to_string(&stages)?;
        sqlx::query("UPDATE runs SET stages = ? WHERE run_id = ?")
            .bind(updated)
            .bind(run_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn set_finished(&self, run_id: &str, at: DateTime<Utc>) -> Result<(), EngineError> {
        let result = sqlx::query("UPDATE runs SET finished_at = ? WHERE run_id = ?")
            .bind(at)
            .bind(run_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        Ok(())
    }

    async fn count_active_runs(&self) -> Result<i64, EngineError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM runs WHERE finished_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
