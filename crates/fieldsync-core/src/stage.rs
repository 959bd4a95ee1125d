// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stage configuration and the stage executor.
//!
//! The pipeline is a fixed, compile-time-known ordered list of
//! [`StageDescriptor`]s; there is no runtime stage discovery. Each stage
//! owns a static field set, optional protected-field markers, and an
//! optional precondition on the remote entity.
//!
//! [`StageExecutor`] drives one stage: read current values through the
//! two-tier client, reconcile, write the update set (unless dry-run), and
//! narrate everything into the run's log. A single field's validation
//! failure is recorded and the stage continues; only a systemic transport
//! failure fails the stage.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::adapter::TwoTierClient;
use crate::error::EngineError;
use crate::model::{
    FieldDecision, FieldDiff, FieldMap, FieldValue, LogEvent, LogLevel, ProgressSnapshot,
};
use crate::reconcile::reconcile;
use crate::store::RunStore;

/// Maximum concurrent field writes toward the remote system.
const FIELD_WRITE_CONCURRENCY: usize = 4;

/// One field in a stage's static field set.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field identifier in the remote system's field space.
    pub id: String,
    /// Protected fields are never overwritten automatically; a mismatch
    /// against a non-empty remote value becomes a conflict.
    pub protected: bool,
}

impl FieldSpec {
    /// Plain writable field.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            protected: false,
        }
    }

    /// Protected field (sensitive identifier).
    pub fn protected(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            protected: true,
        }
    }
}

/// Remote-entity precondition gating a stage.
///
/// When declared, the stage reads this field first; a mismatch blocks the
/// stage (and the run) without retry.
#[derive(Debug, Clone)]
pub struct StagePrecondition {
    /// Field to inspect on the remote entity.
    pub field_id: String,
    /// Required value.
    pub expected: FieldValue,
}

/// Static configuration of one pipeline stage.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    /// Stage name, unique within the pipeline.
    pub name: String,
    /// Ordered field set this stage reconciles.
    pub fields: Vec<FieldSpec>,
    /// Optional remote-entity precondition.
    pub precondition: Option<StagePrecondition>,
}

impl StageDescriptor {
    /// Stage without a precondition.
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            fields,
            precondition: None,
        }
    }

    /// Attach a precondition.
    pub fn with_precondition(mut self, field_id: impl Into<String>, expected: FieldValue) -> Self {
        self.precondition = Some(StagePrecondition {
            field_id: field_id.into(),
            expected,
        });
        self
    }

    /// Ids of the protected fields in this stage.
    pub fn protected_ids(&self) -> HashSet<String> {
        self.fields
            .iter()
            .filter(|f| f.protected)
            .map(|f| f.id.clone())
            .collect()
    }
}

/// The fixed loan-record synchronization pipeline.
///
/// Order matters: later stages depend on the remote state left by earlier
/// ones (the funding stage gates on the loan status the terms stage may
/// have advanced).
pub fn standard_pipeline() -> Vec<StageDescriptor> {
    vec![
        StageDescriptor::new(
            "identity",
            vec![
                FieldSpec::new("borrower_name"),
                FieldSpec::protected("borrower_ssn"),
                FieldSpec::new("borrower_dob"),
                FieldSpec::new("borrower_email"),
            ],
        ),
        StageDescriptor::new(
            "property",
            vec![
                FieldSpec::new("property_address"),
                FieldSpec::new("property_city"),
                FieldSpec::new("property_state"),
                FieldSpec::new("property_zip"),
                FieldSpec::new("appraised_value"),
            ],
        ),
        StageDescriptor::new(
            "loan_terms",
            vec![
                FieldSpec::new("loan_amount"),
                FieldSpec::new("interest_rate"),
                FieldSpec::new("term_months"),
                FieldSpec::new("ltv"),
            ],
        ),
        StageDescriptor::new(
            "funding",
            vec![
                FieldSpec::new("funding_date"),
                FieldSpec::new("wire_amount"),
            ],
        )
        .with_precondition(
            "loan_status",
            FieldValue::Text("clear_to_close".to_string()),
        ),
    ]
}

/// How a single stage execution ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StageDisposition {
    /// Stage completed; the run proceeds.
    Success,
    /// Precondition not met; the run halts without retry.
    Blocked(String),
    /// Systemic failure; subject to the retry policy.
    Failed(String),
}

/// Result of one stage execution attempt.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// Terminal disposition of this attempt.
    pub disposition: StageDisposition,
    /// Structured summary stored in `StageResult.output`.
    pub output: serde_json::Value,
}

impl StageOutcome {
    fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            output: json!({ "error": message }),
            disposition: StageDisposition::Failed(message),
        }
    }
}

/// Executes single pipeline stages against the remote system.
#[derive(Clone)]
pub struct StageExecutor {
    client: TwoTierClient,
    store: Arc<dyn RunStore>,
}

impl StageExecutor {
    /// Create an executor over the given client and run store.
    pub fn new(client: TwoTierClient, store: Arc<dyn RunStore>) -> Self {
        Self { client, store }
    }

    /// Execute one stage attempt for a run.
    ///
    /// Returns `Err` only for run-store failures; every remote-system
    /// outcome (including systemic transport failure) is data in the
    /// returned [`StageOutcome`].
    #[instrument(skip(self, stage, authoritative), fields(run_id = %run_id, stage = %stage.name))]
    pub async fn execute(
        &self,
        run_id: &str,
        entity_id: &str,
        stage: &StageDescriptor,
        authoritative: &FieldMap,
        dry_run: bool,
    ) -> Result<StageOutcome, EngineError> {
        // 1. The field set relevant to this stage, in configuration order,
        //    restricted to what the extraction producer supplied. A stage
        //    with nothing to reconcile succeeds trivially, without even
        //    consulting its precondition.
        let ordered: Vec<(String, FieldValue)> = stage
            .fields
            .iter()
            .filter_map(|spec| {
                authoritative
                    .get(&spec.id)
                    .map(|value| (spec.id.clone(), value.clone()))
            })
            .collect();

        if ordered.is_empty() {
            debug!("No authoritative values for this stage's field set");
            self.store
                .append_log(
                    run_id,
                    LogEvent::new(
                        LogLevel::Info,
                        Some(stage.name.as_str()),
                        "stage skipped: no authoritative values for its field set",
                    ),
                )
                .await?;
            return Ok(StageOutcome {
                disposition: StageDisposition::Success,
                output: json!({
                    "fields_examined": 0,
                    "fields_updated": 0,
                    "fields_unchanged": 0,
                    "conflicts": 0,
                    "field_failures": 0,
                    "dry_run": dry_run,
                }),
            });
        }

        // 2. Precondition gate.
        if let Some(precondition) = &stage.precondition {
            match self.check_precondition(entity_id, precondition).await {
                PreconditionCheck::Met => {}
                PreconditionCheck::NotMet { actual } => {
                    let reason = format!(
                        "precondition not met: '{}' is {:?}, expected {:?}",
                        precondition.field_id, actual, precondition.expected
                    );
                    self.store
                        .append_log(
                            run_id,
                            LogEvent::new(LogLevel::Warning, Some(stage.name.as_str()), &reason)
                                .with_details(json!({
                                    "field_id": precondition.field_id,
                                    "expected": precondition.expected,
                                    "actual": actual,
                                })),
                        )
                        .await?;
                    return Ok(StageOutcome {
                        disposition: StageDisposition::Blocked(reason.clone()),
                        output: json!({ "blocked_reason": reason }),
                    });
                }
                PreconditionCheck::TransportFailed(err) => {
                    return Ok(StageOutcome::failed(format!(
                        "precondition read failed: {}",
                        err
                    )));
                }
            }
        }

        self.store
            .set_progress(
                run_id,
                ProgressSnapshot {
                    items_total: ordered.len() as u32,
                    items_processed: 0,
                    current_item: None,
                },
            )
            .await?;

        // 3. Read current remote values.
        let field_ids: Vec<String> = ordered.iter().map(|(id, _)| id.clone()).collect();
        let current = match self.client.read_fields(entity_id, &field_ids).await {
            Ok(current) => current,
            Err(err) => {
                return Ok(StageOutcome::failed(format!("field read failed: {}", err)));
            }
        };

        // 4. Reconcile and narrate the decisions.
        let mut diffs = reconcile(&ordered, &current, &stage.protected_ids());
        for diff in &diffs {
            match diff.decision {
                FieldDecision::ToUpdate => {
                    self.store
                        .append_log(
                            run_id,
                            LogEvent::new(
                                LogLevel::Info,
                                Some(stage.name.as_str()),
                                format!("field '{}' will be updated", diff.field_id),
                            )
                            .with_details(json!({
                                "field_id": diff.field_id,
                                "remote": diff.remote,
                                "authoritative": diff.authoritative,
                            })),
                        )
                        .await?;
                }
                FieldDecision::Conflict => {
                    self.store
                        .append_log(
                            run_id,
                            LogEvent::new(
                                LogLevel::Warning,
                                Some(stage.name.as_str()),
                                format!(
                                    "protected field '{}' differs from authoritative value; left for review",
                                    diff.field_id
                                ),
                            )
                            .with_details(json!({
                                "field_id": diff.field_id,
                                "remote": diff.remote,
                                "authoritative": diff.authoritative,
                            })),
                        )
                        .await?;
                }
                FieldDecision::Unchanged => {}
            }
        }

        // 5. Apply the update set.
        let apply = self
            .apply_updates(run_id, entity_id, stage, &mut diffs, dry_run)
            .await?;

        let unchanged = diffs
            .iter()
            .filter(|d| d.decision == FieldDecision::Unchanged)
            .count();
        let conflicts = diffs
            .iter()
            .filter(|d| d.decision == FieldDecision::Conflict)
            .count();

        let output = json!({
            "fields_examined": diffs.len(),
            "fields_updated": apply.updated,
            "fields_unchanged": unchanged,
            "conflicts": conflicts,
            "field_failures": apply.failures,
            "dry_run": dry_run,
        });

        if let Some(systemic) = apply.systemic_error {
            self.store
                .append_log(
                    run_id,
                    LogEvent::new(
                        LogLevel::Error,
                        Some(stage.name.as_str()),
                        format!("stage aborted by transport failure: {}", systemic),
                    ),
                )
                .await?;
            return Ok(StageOutcome {
                disposition: StageDisposition::Failed(systemic),
                output,
            });
        }

        // 6. Stage summary.
        let level = if apply.failures > 0 {
            LogLevel::Warning
        } else {
            LogLevel::Success
        };
        self.store
            .append_log(
                run_id,
                LogEvent::new(
                    level,
                    Some(stage.name.as_str()),
                    format!(
                        "stage complete: {} updated, {} unchanged, {} conflicts, {} field failures{}",
                        apply.updated,
                        unchanged,
                        conflicts,
                        apply.failures,
                        if dry_run { " (dry run)" } else { "" }
                    ),
                )
                .with_details(output.clone()),
            )
            .await?;

        Ok(StageOutcome {
            disposition: StageDisposition::Success,
            output,
        })
    }

    async fn check_precondition(
        &self,
        entity_id: &str,
        precondition: &StagePrecondition,
    ) -> PreconditionCheck {
        let ids = vec![precondition.field_id.clone()];
        match self.client.read_fields(entity_id, &ids).await {
            Ok(fields) => {
                let actual = fields
                    .get(&precondition.field_id)
                    .cloned()
                    .unwrap_or(FieldValue::Empty);
                if actual.loosely_equals(&precondition.expected) {
                    PreconditionCheck::Met
                } else {
                    PreconditionCheck::NotMet { actual }
                }
            }
            Err(err) => PreconditionCheck::TransportFailed(err.to_string()),
        }
    }

    /// Write each `to_update` field, with bounded concurrency.
    ///
    /// Per-field validation failures are warnings and the stage continues;
    /// the first systemic failure fails the stage and no further writes are
    /// issued (writes are idempotent, so a retry re-sets the same values).
    async fn apply_updates(
        &self,
        run_id: &str,
        entity_id: &str,
        stage: &StageDescriptor,
        diffs: &mut [FieldDiff],
        dry_run: bool,
    ) -> Result<ApplyReport, EngineError> {
        let mut report = ApplyReport::default();

        if dry_run {
            // Populate the hypothetical applied values for reporting; no
            // write is ever issued in dry-run mode.
            for diff in diffs.iter_mut() {
                if diff.decision == FieldDecision::ToUpdate {
                    diff.applied_value = Some(diff.authoritative.clone());
                    report.updated += 1;
                }
            }
            return Ok(report);
        }

        let pending: Vec<(usize, String, FieldValue)> = diffs
            .iter()
            .enumerate()
            .filter(|(_, d)| d.decision == FieldDecision::ToUpdate)
            .map(|(i, d)| (i, d.field_id.clone(), d.authoritative.clone()))
            .collect();

        let mut results = futures::stream::iter(pending.into_iter().map(
            |(index, field_id, value)| {
                let client = self.client.clone();
                let entity_id = entity_id.to_string();
                async move {
                    let updates: FieldMap =
                        [(field_id.clone(), value.clone())].into_iter().collect();
                    let result = client.write_fields(&entity_id, &updates).await;
                    (index, field_id, value, result)
                }
            },
        ))
        .buffer_unordered(FIELD_WRITE_CONCURRENCY);

        let mut processed = 0u32;
        while let Some((index, field_id, value, result)) = results.next().await {
            processed += 1;
            match result {
                Ok(()) => {
                    diffs[index].applied_value = Some(value);
                    report.updated += 1;
                }
                Err(err) if !err.is_systemic() => {
                    warn!(field_id = %field_id, error = %err, "Field write rejected");
                    report.failures += 1;
                    self.store
                        .append_log(
                            run_id,
                            LogEvent::new(
                                LogLevel::Warning,
                                Some(stage.name.as_str()),
                                format!("field '{}' write failed: {}", field_id, err),
                            ),
                        )
                        .await?;
                }
                Err(err) => {
                    // Systemic: the whole access path is suspect, so stop
                    // issuing writes. Dropping the stream cancels any
                    // queued futures that have not started.
                    report.systemic_error = Some(err.to_string());
                }
            }

            self.store
                .set_progress(
                    run_id,
                    ProgressSnapshot {
                        items_total: diffs.len() as u32,
                        items_processed: processed,
                        current_item: Some(field_id),
                    },
                )
                .await?;

            if report.systemic_error.is_some() {
                break;
            }
        }

        Ok(report)
    }
}

#[derive(Debug, Default)]
struct ApplyReport {
    updated: u32,
    failures: u32,
    systemic_error: Option<String>,
}

enum PreconditionCheck {
    Met,
    NotMet { actual: FieldValue },
    TransportFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{MemoryTransport, TransportErrorKind};
    use crate::model::RunRecord;
    use crate::store::MemoryRunStore;

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    fn loan_terms_stage() -> StageDescriptor {
        StageDescriptor::new(
            "loan_terms",
            vec![
                FieldSpec::new("loan_amount"),
                FieldSpec::new("interest_rate"),
                FieldSpec::protected("borrower_ssn"),
            ],
        )
    }

    async fn setup(
        stage: &StageDescriptor,
    ) -> (Arc<MemoryTransport>, Arc<MemoryRunStore>, StageExecutor) {
        let transport = Arc::new(MemoryTransport::new("memory"));
        let store = Arc::new(MemoryRunStore::new());
        store
            .create_run(RunRecord::new("r1", "loan-1", &[&stage.name], false, 2))
            .await
            .unwrap();
        let executor = StageExecutor::new(
            TwoTierClient::new(transport.clone()),
            store.clone() as Arc<dyn RunStore>,
        );
        (transport, store, executor)
    }

    #[tokio::test]
    async fn test_execute_updates_and_fills_in() {
        let stage = loan_terms_stage();
        let (transport, store, executor) = setup(&stage).await;
        transport
            .seed_field("loan-1", "loan_amount", text("90"))
            .await;

        let authoritative: FieldMap = [
            ("loan_amount".to_string(), text("100")),
            ("interest_rate".to_string(), text("6.5")),
        ]
        .into();

        let outcome = executor
            .execute("r1", "loan-1", &stage, &authoritative, false)
            .await
            .unwrap();

        assert_eq!(outcome.disposition, StageDisposition::Success);
        assert_eq!(outcome.output["fields_updated"], 2);
        assert_eq!(outcome.output["field_failures"], 0);

        let snapshot = transport.snapshot("loan-1").await.unwrap();
        assert_eq!(snapshot.get("loan_amount"), Some(&text("100")));
        assert_eq!(snapshot.get("interest_rate"), Some(&text("6.5")));

        // One decision log per updated field plus the stage summary.
        let run = store.get_run("r1").await.unwrap().unwrap();
        assert_eq!(run.logs.len(), 3);
        assert_eq!(run.logs.last().unwrap().level, LogLevel::Success);
    }

    #[tokio::test]
    async fn test_execute_second_run_is_idempotent() {
        let stage = loan_terms_stage();
        let (transport, _store, executor) = setup(&stage).await;

        let authoritative: FieldMap = [
            ("loan_amount".to_string(), text("100")),
            ("interest_rate".to_string(), FieldValue::Number(6.5)),
        ]
        .into();

        let first = executor
            .execute("r1", "loan-1", &stage, &authoritative, false)
            .await
            .unwrap();
        assert_eq!(first.output["fields_updated"], 2);

        let second = executor
            .execute("r1", "loan-1", &stage, &authoritative, false)
            .await
            .unwrap();
        assert_eq!(second.output["fields_updated"], 0);
        assert_eq!(second.output["fields_unchanged"], 2);

        // Both executions performed reads; only the first wrote.
        assert_eq!(transport.write_count(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_never_writes() {
        let stage = loan_terms_stage();
        let (transport, _store, executor) = setup(&stage).await;

        let authoritative: FieldMap = [
            ("loan_amount".to_string(), text("100")),
            ("interest_rate".to_string(), text("6.5")),
        ]
        .into();

        let outcome = executor
            .execute("r1", "loan-1", &stage, &authoritative, true)
            .await
            .unwrap();

        assert_eq!(outcome.disposition, StageDisposition::Success);
        assert_eq!(outcome.output["fields_updated"], 2);
        assert_eq!(outcome.output["dry_run"], true);
        assert_eq!(transport.write_count(), 0);
    }

    #[tokio::test]
    async fn test_protected_conflict_not_written() {
        let stage = loan_terms_stage();
        let (transport, store, executor) = setup(&stage).await;
        transport
            .seed_field("loan-1", "borrower_ssn", text("999-88-7777"))
            .await;

        let authoritative: FieldMap =
            [("borrower_ssn".to_string(), text("111-22-3333"))].into();

        let outcome = executor
            .execute("r1", "loan-1", &stage, &authoritative, false)
            .await
            .unwrap();

        assert_eq!(outcome.disposition, StageDisposition::Success);
        assert_eq!(outcome.output["conflicts"], 1);
        assert_eq!(outcome.output["fields_updated"], 0);
        assert_eq!(transport.write_count(), 0);

        // Remote value untouched, warning recorded.
        let snapshot = transport.snapshot("loan-1").await.unwrap();
        assert_eq!(snapshot.get("borrower_ssn"), Some(&text("999-88-7777")));
        let run = store.get_run("r1").await.unwrap().unwrap();
        assert!(
            run.logs
                .iter()
                .any(|e| e.level == LogLevel::Warning && e.message.contains("borrower_ssn"))
        );
    }

    #[tokio::test]
    async fn test_field_validation_failure_does_not_fail_stage() {
        let stage = loan_terms_stage();
        let (transport, store, executor) = setup(&stage).await;
        transport.reject_field("interest_rate").await;

        let authoritative: FieldMap = [
            ("loan_amount".to_string(), text("100")),
            ("interest_rate".to_string(), text("999")),
        ]
        .into();

        let outcome = executor
            .execute("r1", "loan-1", &stage, &authoritative, false)
            .await
            .unwrap();

        assert_eq!(outcome.disposition, StageDisposition::Success);
        assert_eq!(outcome.output["fields_updated"], 1);
        assert_eq!(outcome.output["field_failures"], 1);

        let run = store.get_run("r1").await.unwrap().unwrap();
        assert_eq!(run.logs.last().unwrap().level, LogLevel::Warning);
    }

    #[tokio::test]
    async fn test_systemic_write_failure_stops_further_writes() {
        let field_ids: Vec<String> = (0..8).map(|i| format!("field_{}", i)).collect();
        let stage = StageDescriptor::new(
            "wide",
            field_ids.iter().map(|id| FieldSpec::new(id.clone())).collect(),
        );
        let (transport, _store, executor) = setup(&stage).await;
        transport
            .set_write_fault(Some(TransportErrorKind::Connectivity))
            .await;

        let authoritative: FieldMap = field_ids
            .iter()
            .map(|id| (id.clone(), text("x")))
            .collect();

        let outcome = executor
            .execute("r1", "loan-1", &stage, &authoritative, false)
            .await
            .unwrap();

        assert!(matches!(outcome.disposition, StageDisposition::Failed(_)));
        // Once the access path failed, the remaining queued writes were
        // never issued: only the initial concurrency window could start.
        assert!(transport.write_count() <= FIELD_WRITE_CONCURRENCY as u64);
    }

    #[tokio::test]
    async fn test_systemic_read_failure_fails_stage() {
        let stage = loan_terms_stage();
        let (transport, _store, executor) = setup(&stage).await;
        transport
            .set_fault(Some(TransportErrorKind::Connectivity))
            .await;

        let authoritative: FieldMap = [("loan_amount".to_string(), text("100"))].into();

        let outcome = executor
            .execute("r1", "loan-1", &stage, &authoritative, false)
            .await
            .unwrap();

        assert!(matches!(outcome.disposition, StageDisposition::Failed(_)));
    }

    #[tokio::test]
    async fn test_precondition_blocks_stage() {
        let stage = StageDescriptor::new("funding", vec![FieldSpec::new("wire_amount")])
            .with_precondition("loan_status", text("clear_to_close"));
        let (transport, store, executor) = setup(&stage).await;
        transport
            .seed_field("loan-1", "loan_status", text("underwriting"))
            .await;

        let authoritative: FieldMap = [("wire_amount".to_string(), text("250000"))].into();

        let outcome = executor
            .execute("r1", "loan-1", &stage, &authoritative, false)
            .await
            .unwrap();

        assert!(matches!(outcome.disposition, StageDisposition::Blocked(_)));
        assert_eq!(transport.write_count(), 0);
        let run = store.get_run("r1").await.unwrap().unwrap();
        assert!(run.logs.iter().any(|e| e.level == LogLevel::Warning));
    }

    #[tokio::test]
    async fn test_stage_without_relevant_fields_skips_precondition() {
        let stage = StageDescriptor::new("funding", vec![FieldSpec::new("wire_amount")])
            .with_precondition("loan_status", text("clear_to_close"));
        let (transport, _store, executor) = setup(&stage).await;
        // loan_status is not clear_to_close, but nothing to reconcile here.

        let outcome = executor
            .execute("r1", "loan-1", &stage, &FieldMap::new(), false)
            .await
            .unwrap();

        assert_eq!(outcome.disposition, StageDisposition::Success);
        assert_eq!(outcome.output["fields_examined"], 0);
        // Not even the precondition read was issued.
        assert_eq!(transport.read_count(), 0);
    }

    #[tokio::test]
    async fn test_precondition_met_proceeds() {
        let stage = StageDescriptor::new("funding", vec![FieldSpec::new("wire_amount")])
            .with_precondition("loan_status", text("clear_to_close"));
        let (transport, _store, executor) = setup(&stage).await;
        transport
            .seed_field("loan-1", "loan_status", text("clear_to_close"))
            .await;

        let authoritative: FieldMap = [("wire_amount".to_string(), text("250000"))].into();

        let outcome = executor
            .execute("r1", "loan-1", &stage, &authoritative, false)
            .await
            .unwrap();

        assert_eq!(outcome.disposition, StageDisposition::Success);
        assert_eq!(outcome.output["fields_updated"], 1);
    }

    #[test]
    fn test_standard_pipeline_shape() {
        let pipeline = standard_pipeline();
        let names: Vec<&str> = pipeline.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["identity", "property", "loan_terms", "funding"]);

        // Exactly one protected field, in the identity stage.
        assert!(pipeline[0].protected_ids().contains("borrower_ssn"));
        assert!(pipeline[3].precondition.is_some());
    }
}
