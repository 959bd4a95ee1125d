// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine assembly from configuration.
//!
//! Maps the [`Config`] backend selections onto concrete store and transport
//! implementations and wires up the shared [`EngineState`].

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tracing::info;

use fieldsync_core::adapter::{FieldTransport, HttpTransport, MemoryTransport, TwoTierClient};
use fieldsync_core::config::{Config, StoreBackend, TransportBackend};
use fieldsync_core::handlers::EngineState;
use fieldsync_core::orchestrator::{Orchestrator, RetryPolicy};
use fieldsync_core::stage::{StageExecutor, standard_pipeline};
use fieldsync_core::store::{MemoryRunStore, RunStore, SqliteRunStore};

/// Build the engine state from configuration.
pub async fn build_state(config: &Config) -> anyhow::Result<EngineState> {
    let store: Arc<dyn RunStore> = match &config.store {
        StoreBackend::Memory => {
            info!("Using in-memory run store");
            Arc::new(MemoryRunStore::new())
        }
        StoreBackend::Sqlite { path } => {
            info!(path = %path, "Using sqlite run store");
            Arc::new(
                SqliteRunStore::from_path(path)
                    .await
                    .context("failed to open sqlite run store")?,
            )
        }
    };

    let client = match &config.transport {
        TransportBackend::Memory => {
            info!("Using in-memory field transport");
            TwoTierClient::new(Arc::new(MemoryTransport::new("memory")))
        }
        TransportBackend::Http {
            base_url,
            token,
            fallback_url,
            fallback_token,
        } => {
            let primary: Arc<dyn FieldTransport> = Arc::new(
                HttpTransport::new(
                    "http-primary",
                    base_url.clone(),
                    token.clone(),
                    config.remote_timeout,
                )
                .context("failed to build primary http transport")?,
            );
            match fallback_url {
                Some(url) => {
                    info!(primary = %base_url, fallback = %url, "Using two-tier http transport");
                    let secondary: Arc<dyn FieldTransport> = Arc::new(
                        HttpTransport::new(
                            "http-secondary",
                            url.clone(),
                            fallback_token.clone(),
                            config.remote_timeout,
                        )
                        .context("failed to build fallback http transport")?,
                    );
                    TwoTierClient::with_fallback(primary, secondary)
                }
                None => {
                    info!(primary = %base_url, "Using single-tier http transport");
                    TwoTierClient::new(primary)
                }
            }
        }
    };

    let executor = StageExecutor::new(client, store.clone());
    let orchestrator = Orchestrator::new(
        store.clone(),
        executor,
        standard_pipeline(),
        RetryPolicy {
            base_delay_ms: config.retry_base_delay.as_millis() as u64,
        },
    );

    Ok(EngineState {
        store,
        orchestrator,
        default_max_retries: config.default_max_retries,
        start_time: Instant::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn base_config() -> Config {
        Config {
            store: StoreBackend::Memory,
            transport: TransportBackend::Memory,
            http_port: 8080,
            default_max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
            remote_timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn test_build_state_memory_backends() {
        let state = build_state(&base_config()).await.unwrap();
        assert_eq!(state.default_max_retries, 2);
        assert_eq!(state.store.count_active_runs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_build_state_sqlite_store() {
        let dir = std::env::temp_dir().join(format!("fieldsync-boot-{}", std::process::id()));
        let mut config = base_config();
        config.store = StoreBackend::Sqlite {
            path: dir.join("runs.db").to_string_lossy().into_owned(),
        };

        let state = build_state(&config).await.unwrap();
        assert_eq!(state.store.count_active_runs().await.unwrap(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_build_state_http_transport() {
        let mut config = base_config();
        config.transport = TransportBackend::Http {
            base_url: "http://localhost:9".to_string(),
            token: Some("token".to_string()),
            fallback_url: Some("http://localhost:10".to_string()),
            fallback_token: None,
        };

        // Construction never touches the network.
        build_state(&config).await.unwrap();
    }
}
