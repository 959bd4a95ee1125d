// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory field transport for local development and tests.
//!
//! Holds a keyed field store per entity and supports scripted faults:
//! a systemic fault that fails every call, and per-field write rejection
//! that simulates remote business validation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{FieldMap, FieldValue};

use super::{FieldTransport, TransportError, TransportErrorKind};

/// In-memory remote field store.
pub struct MemoryTransport {
    name: String,
    entities: RwLock<HashMap<String, FieldMap>>,
    fault: RwLock<Option<TransportErrorKind>>,
    write_fault: RwLock<Option<TransportErrorKind>>,
    rejected_fields: RwLock<HashSet<String>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryTransport {
    /// Create an empty transport with the given log label.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: RwLock::new(HashMap::new()),
            fault: RwLock::new(None),
            write_fault: RwLock::new(None),
            rejected_fields: RwLock::new(HashSet::new()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Seed (or replace) an entity's remote field values.
    pub async fn seed_entity(&self, entity_id: &str, fields: FieldMap) {
        self.entities
            .write()
            .await
            .insert(entity_id.to_string(), fields);
    }

    /// Set one field on an entity, creating the entity if needed.
    pub async fn seed_field(&self, entity_id: &str, field_id: &str, value: FieldValue) {
        self.entities
            .write()
            .await
            .entry(entity_id.to_string())
            .or_default()
            .insert(field_id.to_string(), value);
    }

    /// Script a systemic fault: every subsequent call fails with this kind
    /// until cleared with `None`.
    pub async fn set_fault(&self, kind: Option<TransportErrorKind>) {
        *self.fault.write().await = kind;
    }

    /// Script a fault on writes only; reads keep succeeding.
    pub async fn set_write_fault(&self, kind: Option<TransportErrorKind>) {
        *self.write_fault.write().await = kind;
    }

    /// Script per-field validation rejection for writes of this field.
    pub async fn reject_field(&self, field_id: &str) {
        self.rejected_fields
            .write()
            .await
            .insert(field_id.to_string());
    }

    /// Current remote state of an entity, if any.
    pub async fn snapshot(&self, entity_id: &str) -> Option<FieldMap> {
        self.entities.read().await.get(entity_id).cloned()
    }

    /// Number of read calls that reached this transport.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of write calls that reached this transport.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    async fn check_fault(&self) -> Result<(), TransportError> {
        if let Some(kind) = *self.fault.read().await {
            return Err(TransportError {
                kind,
                message: format!("scripted {} fault on '{}'", kind.as_str(), self.name),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FieldTransport for MemoryTransport {
    async fn read_fields(
        &self,
        entity_id: &str,
        field_ids: &[String],
    ) -> Result<FieldMap, TransportError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_fault().await?;

        let entities = self.entities.read().await;
        let mut result = FieldMap::new();
        if let Some(fields) = entities.get(entity_id) {
            for id in field_ids {
                if let Some(value) = fields.get(id) {
                    result.insert(id.clone(), value.clone());
                }
            }
        }
        Ok(result)
    }

    async fn write_fields(
        &self,
        entity_id: &str,
        updates: &FieldMap,
    ) -> Result<(), TransportError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check_fault().await?;
        if let Some(kind) = *self.write_fault.read().await {
            return Err(TransportError {
                kind,
                message: format!("scripted {} write fault on '{}'", kind.as_str(), self.name),
            });
        }

        {
            let rejected = self.rejected_fields.read().await;
            if let Some(bad) = updates.keys().find(|id| rejected.contains(*id)) {
                return Err(TransportError::validation(format!(
                    "remote system rejected value for field '{}'",
                    bad
                )));
            }
        }

        let mut entities = self.entities.write().await;
        let fields = entities.entry(entity_id.to_string()).or_default();
        for (id, value) in updates {
            fields.insert(id.clone(), value.clone());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
