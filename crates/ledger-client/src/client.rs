//! Ledger HTTP client implementation.

use reqwest::Client;
use std::time::Duration;

use crate::error::ClientError;
use crate::types::{ApiErrorResponse, KeyValidation, PackagesResponse, UsageReceipt, UsageRequest};

/// Ledger API client.
///
/// Authenticates every request with one widget API key.
#[derive(Debug, Clone)]
pub struct LedgerClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl LedgerClient {
    /// Create a new ledger client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the ledger service (e.g., `"http://ledger:8080"`)
    /// * `api_key` - Widget API key (`sk_...`)
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the key is empty or the HTTP
    /// client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new ledger client with custom options.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the key is empty or the HTTP
    /// client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ClientError::Configuration("API key is empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Check the API key and read the owner's balance.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthorized` for an unknown or revoked key and
    /// `ClientError::InsufficientCredits` when the owner is out of credits.
    pub async fn validate_key(&self) -> Result<KeyValidation, ClientError> {
        let url = format!("{}/v1/widget/validate", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Bill one widget action.
    ///
    /// Passing the same `idempotency_key` again makes the retry fail with
    /// `ClientError::DuplicateTransaction` instead of billing twice.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn record_usage(
        &self,
        action: impl Into<String>,
        idempotency_key: Option<&str>,
    ) -> Result<UsageReceipt, ClientError> {
        let url = format!("{}/v1/widget/usage", self.base_url);
        let request = UsageRequest {
            action: action.into(),
        };

        let mut builder = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&request);
        if let Some(key) = idempotency_key {
            builder = builder.header("idempotency-key", key);
        }

        let response = builder.send().await?;
        self.handle_response(response).await
    }

    /// Fetch the public credit package catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_packages(&self) -> Result<PackagesResponse, ClientError> {
        let url = format!("{}/v1/credits/packages", self.base_url);

        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        let Ok(api_error) = error_body else {
            return Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            });
        };

        let detail = |name: &str| {
            api_error
                .error
                .details
                .as_ref()
                .and_then(|d| d.get(name))
                .and_then(serde_json::Value::as_i64)
        };
        let code = api_error.error.code.as_str();
        tracing::debug!(status = status.as_u16(), code, "Ledger API error");

        // Map specific error codes to typed errors
        match code {
            "insufficient_credits" => Err(ClientError::InsufficientCredits {
                balance: detail("balance").unwrap_or(0),
                required: detail("required").unwrap_or(0),
            }),
            "duplicate_transaction" => Err(ClientError::DuplicateTransaction {
                message: api_error.error.message.clone(),
            }),
            "missing_api_key" | "invalid_api_key" => Err(ClientError::Unauthorized {
                message: api_error.error.message.clone(),
            }),
            "rate_limited" => Err(ClientError::RateLimited {
                retry_after_secs: detail("retry_after_secs")
                    .and_then(|s| u64::try_from(s).ok())
                    .unwrap_or(1),
            }),
            _ => Err(ClientError::Api {
                code: code.to_string(),
                message: api_error.error.message.clone(),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
        }
    }
}

impl ClientOptions {
    /// Create options with a request timeout.
    #[must_use]
    pub fn with_timeout(timeout_seconds: u64) -> Self {
        Self { timeout_seconds }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "sk_test";

    async fn client_for(server: &MockServer) -> LedgerClient {
        LedgerClient::new(server.uri(), KEY).unwrap()
    }

    fn error_body(code: &str, details: serde_json::Value) -> serde_json::Value {
        json!({ "error": { "code": code, "message": "failed", "details": details } })
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = LedgerClient::new("http://localhost:8080/", KEY).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(
            LedgerClient::new("http://localhost:8080", "  "),
            Err(ClientError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn validate_sends_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/widget/validate"))
            .and(header("x-api-key", KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "valid": true,
                "key_name": "site",
                "address": "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
                "balance": 42
            })))
            .expect(1)
            .mount(&server)
            .await;

        let validation = client_for(&server).await.validate_key().await.unwrap();
        assert!(validation.valid);
        assert_eq!(validation.balance, 42);
    }

    #[tokio::test]
    async fn usage_sends_idempotency_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/widget/usage"))
            .and(header("idempotency-key", "req-1"))
            .and(body_json(json!({ "action": "generate" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transaction_id": "01ARZ3NDEKTSV4RRFFQ69G5FAV",
                "credits_used": 3,
                "balance": 7
            })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = client_for(&server)
            .await
            .record_usage("generate", Some("req-1"))
            .await
            .unwrap();
        assert_eq!(receipt.credits_used, 3);
        assert_eq!(receipt.balance, 7);
        assert_eq!(
            receipt.transaction_id.to_string(),
            "01ARZ3NDEKTSV4RRFFQ69G5FAV"
        );
    }

    #[tokio::test]
    async fn payment_required_maps_to_insufficient_credits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/widget/usage"))
            .respond_with(ResponseTemplate::new(402).set_body_json(error_body(
                "insufficient_credits",
                json!({ "balance": 2, "required": 3 }),
            )))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .record_usage("generate", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::InsufficientCredits {
                balance: 2,
                required: 3
            }
        ));
    }

    #[tokio::test]
    async fn typed_errors_for_known_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/widget/validate"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(error_body("invalid_api_key", json!(null))),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/widget/usage"))
            .respond_with(ResponseTemplate::new(409).set_body_json(error_body(
                "duplicate_transaction",
                json!(null),
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/credits/packages"))
            .respond_with(ResponseTemplate::new(429).set_body_json(error_body(
                "rate_limited",
                json!({ "retry_after_secs": 12 }),
            )))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(matches!(
            client.validate_key().await,
            Err(ClientError::Unauthorized { .. })
        ));
        assert!(matches!(
            client.record_usage("process", Some("k")).await,
            Err(ClientError::DuplicateTransaction { .. })
        ));
        assert!(matches!(
            client.list_packages().await,
            Err(ClientError::RateLimited {
                retry_after_secs: 12
            })
        ));
    }

    #[tokio::test]
    async fn non_json_error_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/credits/packages"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.list_packages().await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 502, .. }));
    }
}
