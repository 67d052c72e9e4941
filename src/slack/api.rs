//! Slack Web API client.
//!
//! Two calls are needed by the session client:
//!
//! - `rtm.start` - bootstrap: authenticates with the bot token and returns
//!   the directory snapshot plus a one-time WebSocket address.
//! - `files.sharedPublicURL` - makes a file public (needs a user token).

use anyhow::{Context, Result};
use reqwest::Client;

use super::types::{FileResponse, SharedFile, StartResponse};
use crate::constants;

/// API client for the Slack Web API.
///
/// Encapsulates HTTP client configuration and the API base URL so tests
/// can point it at a local mock server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Creates a new API client for the given base URL
    /// (e.g. `https://slack.com/api`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Returns the API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Calls `rtm.start` with the bot token.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, an undecodable body, or an
    /// `ok: false` response (the Slack error code is included).
    pub async fn start_session(&self, token: &str) -> Result<StartResponse> {
        let url = format!("{}/rtm.start", self.base_url);

        let response = self
            .client
            .post(&url)
            .form(&[("token", token)])
            .send()
            .await
            .context("Failed to obtain websocket address")?;

        let start: StartResponse = response
            .json()
            .await
            .context("Failed to decode rtm.start response")?;

        if !start.ok {
            anyhow::bail!("rtm.start failed: {}", start.error);
        }
        Ok(start)
    }

    /// Calls `files.sharedPublicURL` for `file_id` with the user token.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, an undecodable body, an
    /// `ok: false` response, or a successful response without a file.
    pub async fn share_public_url(&self, user_token: &str, file_id: &str) -> Result<SharedFile> {
        let url = format!("{}/files.sharedPublicURL", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(user_token)
            .json(&serde_json::json!({ "file": file_id }))
            .send()
            .await
            .with_context(|| format!("files.sharedPublicURL request for {file_id} failed"))?;

        let body: FileResponse = response
            .json()
            .await
            .context("Failed to decode files.sharedPublicURL response")?;

        if !body.ok {
            anyhow::bail!("files.sharedPublicURL failed: {}", body.error);
        }
        body.file
            .context("files.sharedPublicURL response carried no file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let api = ApiClient::new("http://localhost:1234/api/").unwrap();
        assert_eq!(api.base_url(), "http://localhost:1234/api");
    }

    #[tokio::test]
    async fn test_start_session_posts_token_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rtm.start"))
            .and(body_string_contains("token=xoxb-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "self": {"id": "UBOT", "name": "bridge"},
                "users": [{"id": "U1", "name": "alice"}],
                "channels": [{"id": "C1", "name": "general", "is_channel": true}],
                "url": "ws://127.0.0.1:1/rtm"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let start = api.start_session("xoxb-1").await.unwrap();
        assert_eq!(start.self_info.id, "UBOT");
        assert_eq!(start.users.len(), 1);
        assert_eq!(start.channels[0].name, "general");
        assert_eq!(start.url, "ws://127.0.0.1:1/rtm");
    }

    #[tokio::test]
    async fn test_start_session_not_ok_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rtm.start"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": false, "error": "invalid_auth"})),
            )
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let err = api.start_session("bad").await.unwrap_err();
        assert!(err.to_string().contains("invalid_auth"));
    }

    #[tokio::test]
    async fn test_start_session_unreachable_is_error() {
        let api = ApiClient::new("http://127.0.0.1:1").unwrap();
        assert!(api.start_session("t").await.is_err());
    }

    #[tokio::test]
    async fn test_share_public_url_sends_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files.sharedPublicURL"))
            .and(header("authorization", "Bearer xoxp-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "file": {
                    "id": "F1",
                    "user": "U1",
                    "permalink_public": "https://files/F1",
                    "channels": ["C1", "C2"]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let file = api.share_public_url("xoxp-2", "F1").await.unwrap();
        assert_eq!(file.user_id, "U1");
        assert_eq!(file.public_link, "https://files/F1");
        assert_eq!(file.channels, vec!["C1".to_string(), "C2".to_string()]);
    }

    #[tokio::test]
    async fn test_share_public_url_error_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files.sharedPublicURL"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": false, "error": "not_allowed"})),
            )
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let err = api.share_public_url("t", "F1").await.unwrap_err();
        assert!(err.to_string().contains("not_allowed"));
    }
}
