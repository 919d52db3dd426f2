//! Telegram Bot API client.
//!
//! Every call is a GET against `{base}/bot{token}/{method}` and returns the
//! standard envelope `{ok, result, description, error_code}`.

use crate::config::mask_token;
use crate::error::{Result, WatchError};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Public Bot API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Timeout for ordinary (non long-poll) calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Slack added on top of the server-side long-poll wait.
const LONG_POLL_SLACK: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

/// Identity returned by `getMe`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
    #[serde(default)]
    pub can_join_groups: Option<bool>,
    #[serde(default)]
    pub can_read_all_group_messages: Option<bool>,
}

/// One update as delivered by `getUpdates`. The body is kept as raw JSON so
/// a single malformed update never fails the whole batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RawUpdate {
    pub update_id: i64,
    pub body: serde_json::Value,
}

/// Anything the monitor can long-poll for updates.
pub trait UpdateSource {
    /// Fetch updates with `update_id >= offset`, waiting up to `timeout`
    /// seconds server-side when none are pending.
    fn get_updates(
        &self,
        offset: Option<i64>,
        timeout: u64,
    ) -> impl Future<Output = Result<Vec<RawUpdate>>> + Send;
}

/// Bot API client bound to one token.
#[derive(Clone)]
pub struct BotApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for BotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApi")
            .field("base_url", &self.base_url)
            .field("token", &mask_token(&self.token))
            .finish_non_exhaustive()
    }
}

impl BotApi {
    /// Create a client against the public Bot API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_API_BASE)
    }

    /// Create a client against a custom server (self-hosted Bot API, tests).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tgwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Base URL without the token path segment.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T> {
        let url = format!("{}/bot{}/{method}", self.base_url, self.token);
        debug!(method, "Bot API request");

        let response = self
            .client
            .get(&url)
            .query(query)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND) {
            return Err(WatchError::Authentication {
                reason: format!("{method} returned HTTP {status}"),
            });
        }

        let body = response.text().await?;
        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|err| {
            WatchError::transport(format!(
                "malformed {method} response (HTTP {status}): {err}"
            ))
        })?;

        if !envelope.ok {
            let description = envelope
                .description
                .unwrap_or_else(|| format!("HTTP {status}"));
            if envelope.error_code == Some(401) {
                return Err(WatchError::Authentication {
                    reason: description,
                });
            }
            return Err(WatchError::Api {
                code: envelope.error_code,
                description,
            });
        }

        envelope
            .result
            .ok_or_else(|| WatchError::transport(format!("{method} response has no result")))
    }

    /// Fetch the bot's own identity.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, an `ok: false` envelope, or a
    /// rejected token.
    pub async fn get_me(&self) -> Result<BotIdentity> {
        self.call("getMe", &[], REQUEST_TIMEOUT).await
    }

    /// Whether the token is accepted. Never fails; the caller decides
    /// whether a rejected token is fatal.
    pub async fn validate_token(&self) -> bool {
        match self.get_me().await {
            Ok(me) => {
                debug!(bot_id = me.id, "Token accepted");
                true
            }
            Err(err) => {
                debug!(error = %err, "Token validation failed");
                false
            }
        }
    }

    /// Long-poll for updates.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an `ok: false` envelope.
    pub async fn poll_updates(&self, offset: Option<i64>, timeout: u64) -> Result<Vec<RawUpdate>> {
        let mut query = vec![("timeout", timeout.to_string())];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }
        let wait = Duration::from_secs(timeout) + LONG_POLL_SLACK;

        let raw: Vec<serde_json::Value> = self.call("getUpdates", &query, wait).await?;
        Ok(raw.into_iter().filter_map(split_update).collect())
    }
}

impl UpdateSource for BotApi {
    fn get_updates(
        &self,
        offset: Option<i64>,
        timeout: u64,
    ) -> impl Future<Output = Result<Vec<RawUpdate>>> + Send {
        self.poll_updates(offset, timeout)
    }
}

fn split_update(body: serde_json::Value) -> Option<RawUpdate> {
    match body.get("update_id").and_then(serde_json::Value::as_i64) {
        Some(update_id) => Some(RawUpdate { update_id, body }),
        None => {
            warn!("Dropping update without update_id");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "123456:TEST_token-value";

    async fn client(server: &MockServer) -> BotApi {
        BotApi::with_base_url(TOKEN, server.uri()).unwrap()
    }

    #[tokio::test]
    async fn get_me_parses_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/bot{TOKEN}/getMe")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"id": 42, "is_bot": true, "first_name": "Watcher", "username": "watch_bot"}
            })))
            .mount(&server)
            .await;

        let api = client(&server).await;
        let me = api.get_me().await.unwrap();
        assert_eq!(me.id, 42);
        assert_eq!(me.username.as_deref(), Some("watch_bot"));
        assert!(api.validate_token().await);
    }

    #[tokio::test]
    async fn unauthorized_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/bot{TOKEN}/getMe")))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "ok": false, "error_code": 401, "description": "Unauthorized"
            })))
            .mount(&server)
            .await;

        let api = client(&server).await;
        let err = api.get_me().await.unwrap_err();
        assert!(matches!(err, WatchError::Authentication { .. }));
        assert!(!err.is_transient());
        assert!(!api.validate_token().await);
    }

    #[tokio::test]
    async fn ok_false_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/bot{TOKEN}/getUpdates")))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "ok": false, "error_code": 409, "description": "Conflict: terminated by other getUpdates request"
            })))
            .mount(&server)
            .await;

        let err = client(&server).await.poll_updates(None, 0).await.unwrap_err();
        match err {
            WatchError::Api { code, description } => {
                assert_eq!(code, Some(409));
                assert!(description.starts_with("Conflict"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/bot{TOKEN}/getUpdates")))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&server)
            .await;

        let err = client(&server).await.poll_updates(Some(1), 0).await.unwrap_err();
        assert!(matches!(err, WatchError::Transport { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn get_updates_sends_offset_and_keeps_raw_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/bot{TOKEN}/getUpdates")))
            .and(query_param("offset", "11"))
            .and(query_param("timeout", "30"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    {"update_id": 11, "message": {"message_id": 1}},
                    {"no_update_id": true},
                    {"update_id": 12, "channel_post": {}}
                ]
            })))
            .mount(&server)
            .await;

        let updates = client(&server).await.poll_updates(Some(11), 30).await.unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].update_id, 11);
        assert_eq!(updates[0].body["message"]["message_id"], 1);
        assert_eq!(updates[1].update_id, 12);
    }

    #[test]
    fn debug_masks_token() {
        let api = BotApi::with_base_url(TOKEN, "http://localhost/").unwrap();
        let shown = format!("{api:?}");
        assert!(!shown.contains("TEST_token"));
        assert_eq!(api.base_url(), "http://localhost");
    }
}
