// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Two-tier field I/O against the remote record system.
//!
//! [`FieldTransport`] is the access-path abstraction: one concrete
//! implementation per transport ([`HttpTransport`] for the real system,
//! [`MemoryTransport`] for local development and tests), selected at startup
//! by configuration. [`TwoTierClient`] composes a primary and an optional
//! secondary credentialed transport and retries the identical operation once
//! through the secondary when the primary fails with a systemic error.
//!
//! No field-value interpretation happens here; values pass through as opaque
//! typed scalars. Writes are idempotent set-operations: re-issuing the same
//! updates after a transient failure re-sets the same values.

pub mod http;
pub mod memory;

pub use self::http::HttpTransport;
pub use self::memory::MemoryTransport;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::model::FieldMap;

/// Classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Authorization or session failure on the access path.
    Unauthorized,
    /// Network-level failure (connection refused, DNS, 5xx).
    Connectivity,
    /// The bounded per-call timeout elapsed.
    Timeout,
    /// The remote system rejected the value(s); retrying the same payload
    /// will not help and the fallback path is not consulted.
    Validation,
}

impl TransportErrorKind {
    /// Systemic failures affect the whole access path and justify trying
    /// the secondary transport; validation failures are payload-specific.
    pub const fn is_systemic(&self) -> bool {
        !matches!(self, Self::Validation)
    }

    /// Stable string form for logs and stage output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Connectivity => "connectivity",
            Self::Timeout => "timeout",
            Self::Validation => "validation",
        }
    }
}

/// A failed read or write against the remote system.
#[derive(Debug, Clone)]
pub struct TransportError {
    /// Failure classification.
    pub kind: TransportErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl TransportError {
    /// Create an authorization failure.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Unauthorized,
            message: message.into(),
        }
    }

    /// Create a connectivity failure.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Connectivity,
            message: message.into(),
        }
    }

    /// Create a timeout failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Timeout,
            message: message.into(),
        }
    }

    /// Create a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Validation,
            message: message.into(),
        }
    }

    /// True when the failure affects the whole access path.
    pub fn is_systemic(&self) -> bool {
        self.kind.is_systemic()
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for TransportError {}

/// One access path to the remote keyed field store.
#[async_trait]
pub trait FieldTransport: Send + Sync {
    /// Read the given fields for an entity. Fields unknown to the remote
    /// system are simply absent from the returned map.
    async fn read_fields(
        &self,
        entity_id: &str,
        field_ids: &[String],
    ) -> Result<FieldMap, TransportError>;

    /// Set the given fields for an entity. Idempotent: the same updates can
    /// be re-issued after a transient failure without corrupting state.
    async fn write_fields(&self, entity_id: &str, updates: &FieldMap)
    -> Result<(), TransportError>;

    /// Short transport label for logs ("http-primary", "memory", ...).
    fn name(&self) -> &str;
}

/// Primary/secondary transport pair with one-shot fallback.
///
/// The secondary path is consulted only for systemic failures
/// (authorization, connectivity, timeout), never for validation failures.
#[derive(Clone)]
pub struct TwoTierClient {
    primary: Arc<dyn FieldTransport>,
    secondary: Option<Arc<dyn FieldTransport>>,
}

impl TwoTierClient {
    /// Single-tier client (no fallback path configured).
    pub fn new(primary: Arc<dyn FieldTransport>) -> Self {
        Self {
            primary,
            secondary: None,
        }
    }

    /// Two-tier client with a secondary credentialed fallback.
    pub fn with_fallback(
        primary: Arc<dyn FieldTransport>,
        secondary: Arc<dyn FieldTransport>,
    ) -> Self {
        Self {
            primary,
            secondary: Some(secondary),
        }
    }

    /// Read fields, falling back to the secondary path on systemic failure.
    pub async fn read_fields(
        &self,
        entity_id: &str,
        field_ids: &[String],
    ) -> Result<FieldMap, TransportError> {
        match self.primary.read_fields(entity_id, field_ids).await {
            Ok(fields) => Ok(fields),
            Err(err) if err.is_systemic() && self.secondary.is_some() => {
                let secondary = self.secondary.as_ref().unwrap();
                warn!(
                    transport = self.primary.name(),
                    fallback = secondary.name(),
                    error = %err,
                    "Primary read failed, retrying on secondary transport"
                );
                secondary.read_fields(entity_id, field_ids).await
            }
            Err(err) => Err(err),
        }
    }

    /// Write fields, falling back to the secondary path on systemic failure.
    pub async fn write_fields(
        &self,
        entity_id: &str,
        updates: &FieldMap,
    ) -> Result<(), TransportError> {
        match self.primary.write_fields(entity_id, updates).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_systemic() && self.secondary.is_some() => {
                let secondary = self.secondary.as_ref().unwrap();
                warn!(
                    transport = self.primary.name(),
                    fallback = secondary.name(),
                    error = %err,
                    "Primary write failed, retrying on secondary transport"
                );
                secondary.write_fields(entity_id, updates).await
            }
            Err(err) => Err(err),
        }
    }
}
