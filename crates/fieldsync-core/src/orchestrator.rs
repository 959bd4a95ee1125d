// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run orchestration: sequential stage execution with retry.
//!
//! One orchestrator task drives one run from creation to a terminal status.
//! Stages execute strictly in pipeline order; a failed stage is retried up
//! to the run's `max_retries` with exponential backoff, a blocked or
//! exhausted stage halts the run and leaves every later stage `pending`.
//! The orchestrator is the single writer for its run's record; pollers
//! observe it through the store only.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::model::{
    FieldMap, LogEvent, LogLevel, ProgressSnapshot, RunRecord, StageResult, StageStatus,
};
use crate::stage::{StageDescriptor, StageDisposition, StageExecutor};
use crate::store::RunStore;

/// Exponential backoff policy for stage retries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay before the first retry; each subsequent retry doubles it.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base_delay_ms: 500 }
    }
}

impl RetryPolicy {
    /// Backoff before retry attempt `attempt` (1-based): base * 2^(attempt-1).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(multiplier))
    }
}

/// Drives runs through the fixed pipeline.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn RunStore>,
    executor: StageExecutor,
    pipeline: Arc<Vec<StageDescriptor>>,
    retry: RetryPolicy,
}

impl Orchestrator {
    /// Create an orchestrator over the given store, executor and pipeline.
    pub fn new(
        store: Arc<dyn RunStore>,
        executor: StageExecutor,
        pipeline: Vec<StageDescriptor>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            executor,
            pipeline: Arc::new(pipeline),
            retry,
        }
    }

    /// Stage names of the configured pipeline, in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.pipeline.iter().map(|s| s.name.as_str()).collect()
    }

    /// Execute a run to completion.
    ///
    /// Never returns an error to the caller: every outcome, including a
    /// store failure mid-run, ends up in logs and the run record as far as
    /// the store allows. Intended to be driven from a spawned task.
    #[instrument(skip(self, run, authoritative), fields(run_id = %run.run_id, entity_id = %run.entity_id))]
    pub async fn run(&self, run: RunRecord, authoritative: FieldMap) {
        let run_id = run.run_id.clone();
        info!(
            dry_run = run.dry_run,
            max_retries = run.max_retries,
            stages = self.pipeline.len(),
            "Run started"
        );

        let halted = match self.drive_stages(&run, &authoritative).await {
            Ok(halted) => halted,
            Err(err) => {
                // The store is the source of truth; if it fails there is
                // nothing durable left to update beyond logging locally.
                error!(error = %err, "Run aborted by store failure");
                let _ = self
                    .store
                    .append_log(
                        &run_id,
                        LogEvent::new(
                            LogLevel::Error,
                            None,
                            format!("run aborted by store failure: {}", err),
                        ),
                    )
                    .await;
                true
            }
        };

        if !halted {
            let _ = self
                .store
                .append_log(
                    &run_id,
                    LogEvent::new(LogLevel::Success, None, "run completed: all stages succeeded"),
                )
                .await;
        }

        // No stage is mid-flight once the run is terminal.
        let _ = self
            .store
            .set_progress(&run_id, ProgressSnapshot::default())
            .await;
        let _ = self.store.set_finished(&run_id, Utc::now()).await;
        info!(halted, "Run finished");
    }

    /// Execute stages in order. Returns `Ok(true)` when the run halted
    /// early (failed or blocked stage), `Ok(false)` on full success.
    async fn drive_stages(
        &self,
        run: &RunRecord,
        authoritative: &FieldMap,
    ) -> Result<bool, crate::error::EngineError> {
        for stage in self.pipeline.iter() {
            let result = self.execute_with_retry(run, stage, authoritative).await?;
            let status = result.status;
            self.store
                .set_stage_result(&run.run_id, &stage.name, result)
                .await?;

            match status {
                StageStatus::Success => {}
                StageStatus::Failed => {
                    self.store
                        .append_log(
                            &run.run_id,
                            LogEvent::new(
                                LogLevel::Error,
                                Some(stage.name.as_str()),
                                format!(
                                    "run halted: stage '{}' failed after {} attempts",
                                    stage.name,
                                    run.max_retries.saturating_add(1)
                                ),
                            ),
                        )
                        .await?;
                    return Ok(true);
                }
                StageStatus::Blocked => {
                    self.store
                        .append_log(
                            &run.run_id,
                            LogEvent::new(
                                LogLevel::Warning,
                                Some(stage.name.as_str()),
                                format!("run halted: stage '{}' blocked", stage.name),
                            ),
                        )
                        .await?;
                    return Ok(true);
                }
                // The executor only yields terminal dispositions.
                StageStatus::Pending | StageStatus::Running => unreachable!(),
            }
        }
        Ok(false)
    }

    /// Execute one stage with up to `max_retries` retries on failure.
    ///
    /// Blocked and successful dispositions are never retried. Every attempt
    /// is a full re-execution: read, reconcile, write. Field writes are
    /// idempotent set-operations, so a retry after a partial apply re-sets
    /// the same values.
    async fn execute_with_retry(
        &self,
        run: &RunRecord,
        stage: &StageDescriptor,
        authoritative: &FieldMap,
    ) -> Result<StageResult, crate::error::EngineError> {
        let max_attempts = run.max_retries.saturating_add(1);
        let started = Instant::now();

        let mut running = StageResult::pending();
        running.status = StageStatus::Running;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            running.attempts = attempt;
            self.store
                .set_stage_result(&run.run_id, &stage.name, running.clone())
                .await?;
            self.store
                .append_log(
                    &run.run_id,
                    LogEvent::new(
                        LogLevel::Info,
                        Some(stage.name.as_str()),
                        format!("stage started (attempt {}/{})", attempt, max_attempts),
                    ),
                )
                .await?;

            let outcome = self
                .executor
                .execute(
                    &run.run_id,
                    &run.entity_id,
                    stage,
                    authoritative,
                    run.dry_run,
                )
                .await?;

            let elapsed = Some(started.elapsed().as_secs_f64());
            match outcome.disposition {
                StageDisposition::Success => {
                    return Ok(StageResult {
                        status: StageStatus::Success,
                        attempts: attempt,
                        elapsed_seconds: elapsed,
                        output: Some(outcome.output),
                        error: None,
                    });
                }
                StageDisposition::Blocked(_) => {
                    // The reason lives in output.blocked_reason; the error
                    // field is reserved for failed stages.
                    return Ok(StageResult {
                        status: StageStatus::Blocked,
                        attempts: attempt,
                        elapsed_seconds: elapsed,
                        output: Some(outcome.output),
                        error: None,
                    });
                }
                StageDisposition::Failed(error) => {
                    if attempt >= max_attempts {
                        return Ok(StageResult {
                            status: StageStatus::Failed,
                            attempts: attempt,
                            elapsed_seconds: elapsed,
                            output: Some(outcome.output),
                            error: Some(error),
                        });
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        stage = %stage.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Stage failed, retrying after backoff"
                    );
                    self.store
                        .append_log(
                            &run.run_id,
                            LogEvent::new(
                                LogLevel::Warning,
                                Some(stage.name.as_str()),
                                format!(
                                    "attempt {}/{} failed, retrying in {}ms: {}",
                                    attempt,
                                    max_attempts,
                                    delay.as_millis(),
                                    error
                                ),
                            )
                            .with_details(json!({ "attempt": attempt, "delay_ms": delay.as_millis() as u64 })),
                        )
                        .await?;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
