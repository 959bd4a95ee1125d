// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

/// Run store backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-memory store; runs are lost on restart.
    Memory,
    /// SQLite-backed store at the configured path.
    Sqlite {
        /// Database file path.
        path: String,
    },
}

/// Remote transport selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportBackend {
    /// In-memory transport for local development.
    Memory,
    /// HTTP transport against the remote record system.
    Http {
        /// Primary base URL.
        base_url: String,
        /// Primary bearer token, if the system requires one.
        token: Option<String>,
        /// Secondary credentialed base URL for systemic-failure fallback.
        fallback_url: Option<String>,
        /// Secondary bearer token.
        fallback_token: Option<String>,
    },
}

/// Field sync engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Run store backend.
    pub store: StoreBackend,
    /// Remote transport backend.
    pub transport: TransportBackend,
    /// HTTP API listen port.
    pub http_port: u16,
    /// Default per-stage retry budget for submissions that omit it.
    pub default_max_retries: u32,
    /// Base backoff delay before the first stage retry.
    pub retry_base_delay: Duration,
    /// Per-call timeout against the remote system.
    pub remote_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `FIELDSYNC_STORE`: `memory` or `sqlite` (default: memory)
    /// - `FIELDSYNC_SQLITE_PATH`: database file path (required when store is sqlite)
    /// - `FIELDSYNC_HTTP_PORT`: API listen port (default: 8080)
    /// - `FIELDSYNC_REMOTE_URL`: remote system base URL; when unset the
    ///   in-memory transport is used
    /// - `FIELDSYNC_REMOTE_TOKEN`: bearer token for the primary path
    /// - `FIELDSYNC_REMOTE_FALLBACK_URL`: secondary credentialed base URL
    /// - `FIELDSYNC_REMOTE_FALLBACK_TOKEN`: bearer token for the secondary path
    /// - `FIELDSYNC_MAX_RETRIES`: default per-stage retry budget (default: 2)
    /// - `FIELDSYNC_RETRY_DELAY_MS`: base backoff delay (default: 500)
    /// - `FIELDSYNC_REMOTE_TIMEOUT_SECS`: per-call timeout (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let store = match std::env::var("FIELDSYNC_STORE")
            .unwrap_or_else(|_| "memory".to_string())
            .as_str()
        {
            "memory" => StoreBackend::Memory,
            "sqlite" => {
                let path = std::env::var("FIELDSYNC_SQLITE_PATH")
                    .map_err(|_| ConfigError::Missing("FIELDSYNC_SQLITE_PATH"))?;
                StoreBackend::Sqlite { path }
            }
            _ => {
                return Err(ConfigError::Invalid(
                    "FIELDSYNC_STORE",
                    "must be 'memory' or 'sqlite'",
                ));
            }
        };

        let transport = match std::env::var("FIELDSYNC_REMOTE_URL") {
            Ok(base_url) => TransportBackend::Http {
                base_url,
                token: std::env::var("FIELDSYNC_REMOTE_TOKEN").ok(),
                fallback_url: std::env::var("FIELDSYNC_REMOTE_FALLBACK_URL").ok(),
                fallback_token: std::env::var("FIELDSYNC_REMOTE_FALLBACK_TOKEN").ok(),
            },
            Err(_) => TransportBackend::Memory,
        };

        let http_port: u16 = std::env::var("FIELDSYNC_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("FIELDSYNC_HTTP_PORT", "must be a valid port number")
            })?;

        let default_max_retries: u32 = std::env::var("FIELDSYNC_MAX_RETRIES")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("FIELDSYNC_MAX_RETRIES", "must be a non-negative integer")
            })?;

        let retry_delay_ms: u64 = std::env::var("FIELDSYNC_RETRY_DELAY_MS")
            .unwrap_or_else(|_| "500".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("FIELDSYNC_RETRY_DELAY_MS", "must be a positive integer")
            })?;

        let remote_timeout_secs: u64 = std::env::var("FIELDSYNC_REMOTE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "FIELDSYNC_REMOTE_TIMEOUT_SECS",
                    "must be a positive integer",
                )
            })?;

        Ok(Self {
            store,
            transport,
            http_port,
            default_max_retries,
            retry_base_delay: Duration::from_millis(retry_delay_ms),
            remote_timeout: Duration::from_secs(remote_timeout_secs),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    fn clear_all(guard: &mut EnvGuard) {
        for key in [
            "FIELDSYNC_STORE",
            "FIELDSYNC_SQLITE_PATH",
            "FIELDSYNC_HTTP_PORT",
            "FIELDSYNC_REMOTE_URL",
            "FIELDSYNC_REMOTE_TOKEN",
            "FIELDSYNC_REMOTE_FALLBACK_URL",
            "FIELDSYNC_REMOTE_FALLBACK_TOKEN",
            "FIELDSYNC_MAX_RETRIES",
            "FIELDSYNC_RETRY_DELAY_MS",
            "FIELDSYNC_REMOTE_TIMEOUT_SECS",
        ] {
            guard.remove(key);
        }
    }

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);

        let config = Config::from_env().unwrap();
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.transport, TransportBackend::Memory);
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.default_max_retries, 2);
        assert_eq!(config.retry_base_delay, Duration::from_millis(500));
        assert_eq!(config.remote_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_sqlite_requires_path() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("FIELDSYNC_STORE", "sqlite");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("FIELDSYNC_SQLITE_PATH")));

        guard.set("FIELDSYNC_SQLITE_PATH", "/tmp/fieldsync.db");
        let config = Config::from_env().unwrap();
        assert_eq!(
            config.store,
            StoreBackend::Sqlite {
                path: "/tmp/fieldsync.db".to_string()
            }
        );
    }

    #[test]
    fn test_config_rejects_unknown_store() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("FIELDSYNC_STORE", "postgres");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("FIELDSYNC_STORE", _)));
    }

    #[test]
    fn test_config_http_transport_with_fallback() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("FIELDSYNC_REMOTE_URL", "https://records.example.com/api");
        guard.set("FIELDSYNC_REMOTE_TOKEN", "primary-token");
        guard.set(
            "FIELDSYNC_REMOTE_FALLBACK_URL",
            "https://records-alt.example.com/api",
        );

        let config = Config::from_env().unwrap();
        match config.transport {
            TransportBackend::Http {
                base_url,
                token,
                fallback_url,
                fallback_token,
            } => {
                assert_eq!(base_url, "https://records.example.com/api");
                assert_eq!(token.as_deref(), Some("primary-token"));
                assert_eq!(
                    fallback_url.as_deref(),
                    Some("https://records-alt.example.com/api")
                );
                assert!(fallback_token.is_none());
            }
            other => panic!("expected http transport, got {:?}", other),
        }
    }

    #[test]
    fn test_config_invalid_port() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("FIELDSYNC_HTTP_PORT", "not-a-port");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("FIELDSYNC_HTTP_PORT", _)));
    }

    #[test]
    fn test_config_retry_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("FIELDSYNC_MAX_RETRIES", "5");
        guard.set("FIELDSYNC_RETRY_DELAY_MS", "250");

        let config = Config::from_env().unwrap();
        assert_eq!(config.default_max_retries, 5);
        assert_eq!(config.retry_base_delay, Duration::from_millis(250));
    }
}
