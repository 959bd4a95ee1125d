// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for fieldsync-core.
//!
//! Engine errors carry machine-readable codes for API responses. Note that
//! stage and run failures are *not* errors at this level: the consuming
//! surface is asynchronous polling, so terminal conditions are represented
//! as data in `StageResult`/`RunRecord`, never as propagated errors.

use std::fmt;

/// Result type using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the run store and the query API.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum EngineError {
    /// Run was not found in the store.
    RunNotFound {
        /// The run ID that was not found.
        run_id: String,
    },

    /// Run already exists (duplicate creation).
    RunAlreadyExists {
        /// The run ID that already exists.
        run_id: String,
    },

    /// Stage name is not part of the run's pipeline.
    StageNotFound {
        /// The run ID.
        run_id: String,
        /// The unknown stage name.
        stage: String,
    },

    /// Attempted to overwrite a stage result that already reached a
    /// terminal status.
    StageAlreadyTerminal {
        /// The run ID.
        run_id: String,
        /// The stage whose result is terminal.
        stage: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Run store operation failed.
    StoreError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl EngineError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RunNotFound { .. } => "RUN_NOT_FOUND",
            Self::RunAlreadyExists { .. } => "RUN_ALREADY_EXISTS",
            Self::StageNotFound { .. } => "STAGE_NOT_FOUND",
            Self::StageAlreadyTerminal { .. } => "STAGE_ALREADY_TERMINAL",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::StoreError { .. } => "STORE_ERROR",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunNotFound { run_id } => {
                write!(f, "Run '{}' not found", run_id)
            }
            Self::RunAlreadyExists { run_id } => {
                write!(f, "Run '{}' already exists", run_id)
            }
            Self::StageNotFound { run_id, stage } => {
                write!(f, "Stage '{}' not found in run '{}'", stage, run_id)
            }
            Self::StageAlreadyTerminal { run_id, stage } => {
                write!(
                    f,
                    "Stage '{}' of run '{}' already has a terminal result",
                    stage, run_id
                )
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::StoreError { operation, details } => {
                write!(f, "Store error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::StoreError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::StoreError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}
