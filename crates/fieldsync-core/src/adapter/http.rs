// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP field transport for the remote record system.
//!
//! Speaks the remote field-store API:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | read      | `GET {base}/entities/{entity_id}/fields?ids=a,b,c` |
//! | write     | `PUT {base}/entities/{entity_id}/fields` (JSON body) |
//!
//! Every call carries the client-wide bounded timeout; timeouts surface as
//! [`TransportErrorKind::Timeout`] and are handled like any other
//! connectivity failure by the caller. Session establishment and credential
//! refresh happen below this layer (bearer token injected per request).

use std::time::Duration;

use async_trait::async_trait;

use crate::model::FieldMap;

use super::{FieldTransport, TransportError, TransportErrorKind};

/// HTTP access path to the remote field store.
pub struct HttpTransport {
    name: String,
    base_url: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with a bounded per-call timeout.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        bearer_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::connectivity(format!("failed to build client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token,
            client,
        })
    }

    fn fields_url(&self, entity_id: &str) -> String {
        format!("{}/entities/{}/fields", self.base_url, entity_id)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Classify an HTTP status into a transport failure kind.
///
/// - 401/403 → authorization failure (fallback path is consulted)
/// - 408/429 and 5xx → connectivity (transient, fallback consulted)
/// - remaining 4xx → validation (payload-specific, no fallback)
fn classify_status(status: u16) -> TransportErrorKind {
    match status {
        401 | 403 => TransportErrorKind::Unauthorized,
        408 | 429 => TransportErrorKind::Connectivity,
        500..=599 => TransportErrorKind::Connectivity,
        400..=499 => TransportErrorKind::Validation,
        _ => TransportErrorKind::Connectivity,
    }
}

fn request_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::timeout(format!("request timed out: {}", err))
    } else {
        TransportError::connectivity(format!("request failed: {}", err))
    }
}

async fn status_error(response: reqwest::Response) -> TransportError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        format!("remote system returned status {}", status)
    } else {
        format!("remote system returned status {}: {}", status, body)
    };
    TransportError {
        kind: classify_status(status),
        message,
    }
}

#[async_trait]
impl FieldTransport for HttpTransport {
    async fn read_fields(
        &self,
        entity_id: &str,
        field_ids: &[String],
    ) -> Result<FieldMap, TransportError> {
        let request = self
            .client
            .get(self.fields_url(entity_id))
            .query(&[("ids", field_ids.join(","))]);

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        response
            .json::<FieldMap>()
            .await
            .map_err(|e| TransportError::connectivity(format!("malformed field response: {}", e)))
    }

    async fn write_fields(
        &self,
        entity_id: &str,
        updates: &FieldMap,
    ) -> Result<(), TransportError> {
        let request = self.client.put(self.fields_url(entity_id)).json(updates);

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldValue;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> HttpTransport {
        HttpTransport::new(
            "http-test",
            server.uri(),
            Some("token-123".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(401), TransportErrorKind::Unauthorized);
        assert_eq!(classify_status(403), TransportErrorKind::Unauthorized);
        assert_eq!(classify_status(408), TransportErrorKind::Connectivity);
        assert_eq!(classify_status(429), TransportErrorKind::Connectivity);
        assert_eq!(classify_status(500), TransportErrorKind::Connectivity);
        assert_eq!(classify_status(503), TransportErrorKind::Connectivity);
        assert_eq!(classify_status(400), TransportErrorKind::Validation);
        assert_eq!(classify_status(404), TransportErrorKind::Validation);
        assert_eq!(classify_status(422), TransportErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_read_fields_parses_typed_values() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/entities/loan-1/fields"))
            .and(query_param("ids", "rate,amount"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rate": {"type": "number", "value": 6.5},
                "amount": {"type": "text", "value": "250000"},
            })))
            .mount(&server)
            .await;

        let fields = transport(&server)
            .read_fields("loan-1", &["rate".to_string(), "amount".to_string()])
            .await
            .unwrap();

        assert_eq!(fields.get("rate"), Some(&FieldValue::Number(6.5)));
        assert_eq!(
            fields.get("amount"),
            Some(&FieldValue::Text("250000".to_string()))
        );
    }

    #[tokio::test]
    async fn test_read_unauthorized_maps_to_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = transport(&server)
            .read_fields("loan-1", &["rate".to_string()])
            .await
            .unwrap_err();

        assert_eq!(err.kind, TransportErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_write_validation_failure_maps_to_validation() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/entities/loan-1/fields"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string("rate out of allowed range"),
            )
            .mount(&server)
            .await;

        let updates: FieldMap = [("rate".to_string(), FieldValue::Number(99.0))].into();
        let err = transport(&server)
            .write_fields("loan-1", &updates)
            .await
            .unwrap_err();

        assert_eq!(err.kind, TransportErrorKind::Validation);
        assert!(err.message.contains("rate out of allowed range"));
    }

    #[tokio::test]
    async fn test_write_fields_success() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/entities/loan-1/fields"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let updates: FieldMap = [("rate".to_string(), FieldValue::Number(6.5))].into();
        transport(&server)
            .write_fields("loan-1", &updates)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_server_error_maps_to_connectivity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = transport(&server)
            .read_fields("loan-1", &["rate".to_string()])
            .await
            .unwrap_err();

        assert_eq!(err.kind, TransportErrorKind::Connectivity);
    }
}
