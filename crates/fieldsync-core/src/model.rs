// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Data model for runs, stages, diffs, and log events.
//!
//! A [`RunRecord`] is the single source of truth for one pipeline execution.
//! It is owned by the orchestrator (sole writer) and observed by pollers
//! through the run store. The overall run status is never stored; it is
//! derived from the per-stage results on every query.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Absolute tolerance for numeric field comparison.
///
/// Absorbs rounding noise between the extraction producer and the remote
/// system (e.g. `80.001` vs `80.0` is considered equal).
pub const NUMERIC_TOLERANCE: f64 = 0.01;

/// A typed field value as it flows between the extraction producer, the
/// reconciliation engine, and the remote record system.
///
/// Values are opaque to the I/O adapter; only the reconciliation engine
/// interprets them, via [`FieldValue::loosely_equals`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Free-form text.
    Text(String),
    /// Numeric value (amounts, rates, counts).
    Number(f64),
    /// Boolean flag.
    Bool(bool),
    /// Calendar date without time component.
    Date(NaiveDate),
    /// Distinguished empty value. An absent remote field reads as `Empty`.
    Empty,
}

impl FieldValue {
    /// True for the distinguished empty value.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Attempt a numeric interpretation (numbers directly, text by parsing).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Canonical text form used as the comparison fallback across types.
    pub fn canonical_text(&self) -> String {
        match self {
            Self::Text(s) => s.trim().to_lowercase(),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Date(d) => d.to_string(),
            Self::Empty => String::new(),
        }
    }

    /// Type-aware equality used by reconciliation.
    ///
    /// Comparator table:
    /// - number vs number: absolute difference within [`NUMERIC_TOLERANCE`]
    /// - text vs text: trimmed, case-insensitive
    /// - date vs date: exact calendar date
    /// - bool vs bool: exact
    /// - `Empty` equals only `Empty`
    /// - mixed types: numeric coercion first (so `Text("80.001")` matches
    ///   `Number(80.0)`), otherwise canonical text comparison
    pub fn loosely_equals(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Empty, _) | (_, Self::Empty) => false,
            (Self::Number(a), Self::Number(b)) => (a - b).abs() <= NUMERIC_TOLERANCE,
            (Self::Text(a), Self::Text(b)) => {
                if let (Some(x), Some(y)) = (self.as_number(), other.as_number()) {
                    return (x - y).abs() <= NUMERIC_TOLERANCE;
                }
                a.trim().eq_ignore_ascii_case(b.trim())
            }
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            _ => {
                if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
                    return (a - b).abs() <= NUMERIC_TOLERANCE;
                }
                self.canonical_text() == other.canonical_text()
            }
        }
    }
}

/// Mapping from field id to value, as produced by the extraction producer
/// and as read from the remote system.
pub type FieldMap = HashMap<String, FieldValue>;

/// Reconciliation decision for a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDecision {
    /// Remote value already matches the authoritative value.
    Unchanged,
    /// Remote value differs (or is absent) and should be written.
    ToUpdate,
    /// Protected field differs; left for human review, never written.
    Conflict,
}

/// One field's reconciliation outcome within a stage execution.
///
/// Created fresh on every stage execution, never persisted across stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    /// Field identifier in the remote system's field space.
    pub field_id: String,
    /// Value believed correct, from the extraction producer.
    pub authoritative: FieldValue,
    /// Value observed in the remote system at read time.
    pub remote: FieldValue,
    /// Reconciliation decision.
    pub decision: FieldDecision,
    /// Value actually written (or, in dry-run mode, that would be written).
    /// `None` when no write was issued or the write failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_value: Option<FieldValue>,
}

/// Severity of a [`LogEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Routine narrative.
    Info,
    /// A stage or run reached a good outcome.
    Success,
    /// Recovered or review-worthy condition (field failure, conflict).
    Warning,
    /// Systemic failure.
    Error,
}

/// Immutable audit record. The append-only sequence of these events is the
/// sole durable narrative of what happened during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// Stage this event belongs to; `None` for run-level events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Optional structured payload (diff details, counters).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEvent {
    /// Create a log event timestamped now.
    pub fn new(level: LogLevel, stage: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            stage: stage.map(str::to_string),
            message: message.into(),
            details: None,
        }
    }

    /// Attach a structured payload.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Best-effort live-progress hint for the currently running stage.
///
/// Overwritten frequently; last write wins. Zeroed when no stage is
/// mid-flight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Number of fields the running stage will examine.
    pub items_total: u32,
    /// Number of fields processed so far.
    pub items_processed: u32,
    /// Label of the field currently being processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
}

/// Per-stage state machine states.
///
/// ```text
/// pending ──▶ running ──▶ success
///                   │
///                   ├────▶ failed   (retries exhausted; run halts)
///                   └────▶ blocked  (precondition not met; run halts)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Created, not yet dispatched.
    Pending,
    /// Dispatched by the orchestrator.
    Running,
    /// Stage completed.
    Success,
    /// Systemic failure, retries exhausted.
    Failed,
    /// Required precondition on the remote entity was not met.
    Blocked,
}

impl StageStatus {
    /// True once the status will never change again.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Blocked)
    }

    /// Stable string form (wire format and store filters).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }
}

/// Outcome of one pipeline stage for one run.
///
/// Owned exclusively by the orchestrator; read-only to everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Current state machine state.
    pub status: StageStatus,
    /// Attempts made so far (1 or more once the stage started).
    pub attempts: u32,
    /// Wall-clock seconds across all attempts; set on terminal status only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    /// Stage-specific structured payload (diff summary counters).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Error description; present iff status is `failed`. A blocked stage
    /// records its reason in `output.blocked_reason` instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageResult {
    /// A freshly created, not-yet-dispatched stage.
    pub fn pending() -> Self {
        Self {
            status: StageStatus::Pending,
            attempts: 0,
            elapsed_seconds: None,
            output: None,
            error: None,
        }
    }
}

/// Named slot in the ordered stage sequence of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    /// Stage name, unique within the pipeline.
    pub name: String,
    /// Current result for this stage.
    pub result: StageResult,
}

/// Derived overall status of a run; a pure function of the stage results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No stage has started yet.
    Pending,
    /// A stage is currently executing.
    Running,
    /// Every stage succeeded.
    Success,
    /// A stage failed and the run halted.
    Failed,
    /// A stage was blocked and the run halted.
    Blocked,
}

impl RunStatus {
    /// True once the status will never change again.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Blocked)
    }

    /// Stable string form (wire format and store filters).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }

    /// Parse the stable string form; `None` for unknown input.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// One execution of the full pipeline for one target entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Opaque unique run identifier.
    pub run_id: String,
    /// Remote-system entity key (e.g. loan identifier).
    pub entity_id: String,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the run reached a terminal overall status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// If true, no writes are ever issued to the remote system.
    pub dry_run: bool,
    /// Additional retry attempts allowed per stage after the first failure.
    pub max_retries: u32,
    /// Ordered stage results; insertion order is the pipeline order.
    pub stages: Vec<StageState>,
    /// Append-only log; never truncated or reordered.
    pub logs: Vec<LogEvent>,
    /// Latest progress snapshot (mutable, last write wins).
    pub progress: ProgressSnapshot,
}

impl RunRecord {
    /// Create a new run with every pipeline stage `pending`.
    pub fn new(
        run_id: impl Into<String>,
        entity_id: impl Into<String>,
        stage_names: &[&str],
        dry_run: bool,
        max_retries: u32,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            entity_id: entity_id.into(),
            created_at: Utc::now(),
            finished_at: None,
            dry_run,
            max_retries,
            stages: stage_names
                .iter()
                .map(|name| StageState {
                    name: (*name).to_string(),
                    result: StageResult::pending(),
                })
                .collect(),
            logs: Vec::new(),
            progress: ProgressSnapshot::default(),
        }
    }

    /// Derive the overall status from the stage results.
    ///
    /// Precedence: running > failed > blocked > success (all) > pending.
    /// Recomputed on every query; never cached or stored.
    pub fn overall_status(&self) -> RunStatus {
        let mut any_failed = false;
        let mut any_blocked = false;
        let mut all_success = !self.stages.is_empty();

        for stage in &self.stages {
            match stage.result.status {
                StageStatus::Running => return RunStatus::Running,
                StageStatus::Failed => any_failed = true,
                StageStatus::Blocked => any_blocked = true,
                StageStatus::Success | StageStatus::Pending => {}
            }
            if stage.result.status != StageStatus::Success {
                all_success = false;
            }
        }

        if any_failed {
            RunStatus::Failed
        } else if any_blocked {
            RunStatus::Blocked
        } else if all_success {
            RunStatus::Success
        } else {
            RunStatus::Pending
        }
    }

    /// Seconds from creation to finish; `None` while the run is live.
    pub fn duration_seconds(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.created_at).num_milliseconds() as f64 / 1000.0)
    }

    /// Look up a stage slot by name.
    pub fn stage(&self, name: &str) -> Option<&StageState> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Condense this record into a list-view summary.
    pub fn summarize(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            entity_id: self.entity_id.clone(),
            overall_status: self.overall_status(),
            created_at: self.created_at,
            duration_seconds: self.duration_seconds(),
            dry_run: self.dry_run,
            stages: self
                .stages
                .iter()
                .map(|s| (s.name.clone(), s.result.status))
                .collect(),
        }
    }
}

/// Condensed run representation for list queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run identifier.
    pub run_id: String,
    /// Remote-system entity key.
    pub entity_id: String,
    /// Derived overall status at summarization time.
    pub overall_status: RunStatus,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// Seconds from creation to finish; `None` while live.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Whether the run was a dry run.
    pub dry_run: bool,
    /// Per-stage status map in pipeline order.
    pub stages: Vec<(String, StageStatus)>,
}
