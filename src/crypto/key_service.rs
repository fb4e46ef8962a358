use crate::crypto::{KeyUnwrap, KeyUnwrapError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

const DEFAULT_KEY_SERVICE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct UnwrapRequest<'a> {
    key_id: &'a str,
    ciphertext_blob: String,
}

#[derive(Deserialize)]
struct UnwrapResponse {
    plaintext: String,
}

/// Settings for [`KeyServiceClient`].
pub struct KeyServiceOptions {
    /// Full URL of the unwrap operation.
    pub url: Url,
    /// Key reference sent with each request (alias or key id).
    pub key_id: String,
    /// Optional bearer token.
    pub token: Option<SecretString>,
    pub timeout: Duration,
}

impl KeyServiceOptions {
    pub fn new(url: Url, key_id: impl Into<String>) -> Self {
        Self {
            url,
            key_id: key_id.into(),
            token: None,
            timeout: DEFAULT_KEY_SERVICE_TIMEOUT,
        }
    }
}

/// SEC-015: token is never printed.
impl fmt::Debug for KeyServiceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyServiceOptions")
            .field("url", &self.url.as_str())
            .field("key_id", &self.key_id)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Unwraps data keys through an HTTP key service.
///
/// Request: `POST {url}` with `{"key_id": "...", "ciphertext_blob": "<base64>"}`.
/// Response: `{"plaintext": "<base64>"}`. One attempt per call.
#[derive(Debug)]
pub struct KeyServiceClient {
    client: reqwest::Client,
    options: KeyServiceOptions,
}

impl KeyServiceClient {
    pub fn new(client: reqwest::Client, options: KeyServiceOptions) -> Self {
        Self { client, options }
    }
}

#[async_trait]
impl KeyUnwrap for KeyServiceClient {
    async fn unwrap_key(&self, wrapped: &[u8]) -> Result<SecretSlice<u8>, KeyUnwrapError> {
        let body = UnwrapRequest {
            key_id: &self.options.key_id,
            ciphertext_blob: STANDARD.encode(wrapped),
        };

        let mut request = self.client.post(self.options.url.clone()).json(&body);
        if let Some(token) = &self.options.token {
            request = request.bearer_auth(token.expose_secret());
        }

        tracing::debug!(
            url = %self.options.url,
            key_id = %self.options.key_id,
            "Unwrapping data key"
        );
        let response = tokio::time::timeout(self.options.timeout, request.send())
            .await
            .map_err(|_| KeyUnwrapError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                url = %self.options.url,
                status = status.as_u16(),
                "Key service rejected unwrap request"
            );
            return Err(KeyUnwrapError::Rejected {
                status: status.as_u16(),
            });
        }

        let parsed: UnwrapResponse = response
            .json()
            .await
            .map_err(|e| KeyUnwrapError::InvalidResponse(e.to_string()))?;
        let encoded = SecretString::from(parsed.plaintext);
        let key = STANDARD
            .decode(encoded.expose_secret())
            .map_err(|e| KeyUnwrapError::InvalidResponse(format!("plaintext is not base64: {e}")))?;

        Ok(SecretSlice::from(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, token: Option<&str>) -> KeyServiceClient {
        let url = Url::parse(&format!("{}/unwrap", server.uri())).unwrap();
        let mut options = KeyServiceOptions::new(url, "alias/feed-key");
        options.token = token.map(|t| SecretString::from(t.to_string()));
        KeyServiceClient::new(reqwest::Client::new(), options)
    }

    #[tokio::test]
    async fn test_unwrap_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/unwrap"))
            .and(body_json(json!({
                "key_id": "alias/feed-key",
                "ciphertext_blob": STANDARD.encode(b"wrapped"),
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "plaintext": STANDARD.encode([5u8; 32]) })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let key = client_for(&mock_server, None)
            .unwrap_key(b"wrapped")
            .await
            .unwrap();
        assert_eq!(key.expose_secret(), &[5u8; 32][..]);
    }

    #[tokio::test]
    async fn test_unwrap_sends_bearer_token() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "plaintext": STANDARD.encode([1u8; 32]) })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = client_for(&mock_server, Some("s3cret"))
            .unwrap_key(b"k")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_unwrap_rejected_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server, None)
            .unwrap_key(b"k")
            .await
            .unwrap_err();
        assert!(matches!(err, KeyUnwrapError::Rejected { status: 403 }));
    }

    #[tokio::test]
    async fn test_unwrap_invalid_response_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "wrong": 1 })))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server, None)
            .unwrap_key(b"k")
            .await
            .unwrap_err();
        assert!(matches!(err, KeyUnwrapError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unwrap_plaintext_not_base64() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "plaintext": "***" })),
            )
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server, None)
            .unwrap_key(b"k")
            .await
            .unwrap_err();
        assert!(matches!(err, KeyUnwrapError::InvalidResponse(_)));
    }

    #[test]
    fn test_debug_masks_token() {
        let mut options =
            KeyServiceOptions::new(Url::parse("https://kms.example.com/unwrap").unwrap(), "k");
        options.token = Some(SecretString::from("super-secret-token".to_string()));

        let debug_output = format!("{:?}", options);
        assert!(!debug_output.contains("super-secret-token"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
