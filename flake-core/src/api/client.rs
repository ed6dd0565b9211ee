//! Bot API HTTP Client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::types::*;
use crate::config::ClientConfig;

/// Upper bound for a whole playlist import stream
const IMPORT_TIMEOUT: Duration = Duration::from_secs(600);

/// Errors that can occur when talking to the bot backend
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend is not reachable ({0})")]
    NotReachable(String),

    #[error("Not authorized")]
    Unauthorized,

    #[error("API error (HTTP {status}): {detail}")]
    Status { status: u16, detail: String },

    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// What the sync session needs from the backend.
///
/// Implemented by [`BotApiClient`]; tests substitute in-memory fakes.
#[async_trait]
pub trait PlayerBackend: Send + Sync + 'static {
    /// `GET /bot/players`
    async fn players(&self) -> Result<Vec<Player>, ApiError>;

    /// `POST /bot/control`
    async fn control(&self, guild_id: &str, action: &ControlAction) -> Result<(), ApiError>;

    /// `GET /bot/session-queue`
    async fn session_queue(&self, guild_id: &str) -> Result<SessionQueue, ApiError>;
}

/// Client for the bot's REST API
#[derive(Debug, Clone)]
pub struct BotApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl BotApiClient {
    /// Create a client from configuration
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(2)
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Set the bearer token used for every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request with optional authentication
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url);

        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        req
    }

    /// Send a request and map transport failures and error statuses
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let resp = req.send().await.map_err(|e| {
            if e.is_connect() {
                ApiError::NotReachable(format!("connection refused: {}", e))
            } else if e.is_timeout() {
                ApiError::NotReachable("timed out".to_string())
            } else {
                ApiError::Http(e)
            }
        })?;

        match resp.status() {
            s if s.is_success() => Ok(resp),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Unauthorized),
            s => {
                let detail = resp.text().await.unwrap_or_default();
                Err(ApiError::Status {
                    status: s.as_u16(),
                    detail: error_detail(&detail),
                })
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let body = self.send(req).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetch every active player
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn players(&self) -> Result<Vec<Player>, ApiError> {
        self.get_json(self.request(reqwest::Method::GET, "/bot/players")).await
    }

    /// Fetch bot online status
    #[instrument(skip(self))]
    pub async fn status(&self) -> Result<BotStatus, ApiError> {
        self.get_json(self.request(reqwest::Method::GET, "/bot/status")).await
    }

    /// Send a playback command for a guild
    #[instrument(skip(self), fields(action = action.name()))]
    pub async fn control(&self, guild_id: &str, action: &ControlAction) -> Result<(), ApiError> {
        let body = action.to_request(guild_id);
        debug!("Sending control {:?}", body);

        self.send(self.request(reqwest::Method::POST, "/bot/control").json(&body))
            .await
            .map_err(|e| {
                warn!("Control {} failed: {}", action.name(), e);
                e
            })?;
        Ok(())
    }

    /// Fetch the session queue of a guild
    pub async fn session_queue(&self, guild_id: &str) -> Result<SessionQueue, ApiError> {
        self.get_json(
            self.request(reqwest::Method::GET, "/bot/session-queue")
                .query(&[("guild_id", guild_id)]),
        )
        .await
    }

    /// Start a playlist import; the response body is the progress stream
    pub async fn start_import(&self, url: &str, user_id: &str) -> Result<reqwest::Response, ApiError> {
        let body = ImportRequest {
            url: url.trim().to_string(),
            user_id: user_id.to_string(),
        };
        // the body streams for as long as the import runs
        let req = self
            .request(reqwest::Method::POST, "/playlist/import")
            .timeout(IMPORT_TIMEOUT)
            .json(&body);
        self.send(req).await
    }
}

#[async_trait]
impl PlayerBackend for BotApiClient {
    async fn players(&self) -> Result<Vec<Player>, ApiError> {
        BotApiClient::players(self).await
    }

    async fn control(&self, guild_id: &str, action: &ControlAction) -> Result<(), ApiError> {
        BotApiClient::control(self, guild_id, action).await
    }

    async fn session_queue(&self, guild_id: &str) -> Result<SessionQueue, ApiError> {
        BotApiClient::session_queue(self, guild_id).await
    }
}

/// Pull the `detail` field out of a FastAPI-style error body
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = ClientConfig {
            api_url: "http://localhost:8000/api/v1/".to_string(),
            ..Default::default()
        };
        let client = BotApiClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/api/v1");
        assert_eq!(client.token, None);

        let client = client.with_token("test-token");
        assert_eq!(client.token, Some("test-token".to_string()));
    }

    #[test]
    fn test_error_detail() {
        assert_eq!(error_detail(r#"{"detail": "Bot not connected"}"#), "Bot not connected");
        assert_eq!(error_detail("plain failure\n"), "plain failure");
    }
}
