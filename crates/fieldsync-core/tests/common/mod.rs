// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared harness for end-to-end run tests.

use std::sync::Arc;
use std::time::Instant;

use fieldsync_core::adapter::{MemoryTransport, TwoTierClient};
use fieldsync_core::handlers::{self, CreateRunRequest, EngineState};
use fieldsync_core::model::{FieldMap, FieldValue, RunRecord};
use fieldsync_core::orchestrator::{Orchestrator, RetryPolicy};
use fieldsync_core::stage::{StageExecutor, standard_pipeline};
use fieldsync_core::store::{MemoryRunStore, RunStore};

/// Engine wired to in-memory backends with a fast retry clock.
pub struct TestEngine {
    pub transport: Arc<MemoryTransport>,
    pub state: EngineState,
}

impl TestEngine {
    pub fn new() -> Self {
        let transport = Arc::new(MemoryTransport::new("memory"));
        let store: Arc<dyn RunStore> = Arc::new(MemoryRunStore::new());
        let executor = StageExecutor::new(TwoTierClient::new(transport.clone()), store.clone());
        let orchestrator = Orchestrator::new(
            store.clone(),
            executor,
            standard_pipeline(),
            RetryPolicy { base_delay_ms: 1 },
        );
        Self {
            transport,
            state: EngineState {
                store,
                orchestrator,
                default_max_retries: 2,
                start_time: Instant::now(),
                version: "test".to_string(),
            },
        }
    }

    /// Submit a run and wait for it to reach a terminal status.
    pub async fn run_to_completion(&self, request: CreateRunRequest) -> RunRecord {
        let response = handlers::handle_create_run(&self.state, request)
            .await
            .expect("run submission failed");

        for _ in 0..500 {
            let run = self
                .state
                .store
                .get_run(&response.run_id)
                .await
                .unwrap()
                .expect("run disappeared");
            if run.finished_at.is_some() {
                return run;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("run {} did not finish in time", response.run_id);
    }
}

pub fn text(s: &str) -> FieldValue {
    FieldValue::Text(s.to_string())
}

pub fn number(n: f64) -> FieldValue {
    FieldValue::Number(n)
}

pub fn request(entity_id: &str, dry_run: bool, authoritative: FieldMap) -> CreateRunRequest {
    CreateRunRequest {
        entity_id: entity_id.to_string(),
        dry_run: Some(dry_run),
        max_retries: Some(2),
        stage_config: None,
        authoritative,
    }
}
