//! Configuration for the API client and the sync engine

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default REST API base (backend mounts its routers under `/api/v1`)
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

/// Default push channel base (the WebSocket route is not under the API prefix)
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Where the backend lives and how to talk to it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// REST API base URL
    pub api_url: String,
    /// WebSocket base URL; the push channel is `{ws_url}/ws/{guild_id}`
    pub ws_url: String,
    /// Bearer token attached to every request
    pub token: Option<String>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            token: None,
            connect_timeout_ms: 2_000,
            request_timeout_ms: 5_000,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `FLAKE_API_URL`, `FLAKE_WS_URL` and `FLAKE_TOKEN`
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("FLAKE_API_URL") {
            self.api_url = url;
        }
        if let Some(url) = lookup("FLAKE_WS_URL") {
            self.ws_url = url;
        }
        if let Some(token) = lookup("FLAKE_TOKEN").filter(|t| !t.is_empty()) {
            self.token = Some(token);
        }
        self
    }

    /// Check URL schemes before anything connects
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "api_url",
                reason: format!("expected an http(s) URL, got {:?}", self.api_url),
            });
        }
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(ConfigError::Invalid {
                field: "ws_url",
                reason: format!("expected a ws(s) URL, got {:?}", self.ws_url),
            });
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Push channel URL for a guild
    pub fn push_url(&self, guild_id: &str) -> String {
        format!("{}/ws/{}", self.ws_url.trim_end_matches('/'), guild_id)
    }
}

/// Timing and tolerance parameters of the sync engine.
///
/// All values are milliseconds. The defaults are the cadences the web
/// dashboard used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local extrapolation step
    pub tick_interval_ms: u64,
    /// Forced resync of the display with the last snapshot
    pub correction_interval_ms: u64,
    /// Full player state poll
    pub poll_interval_ms: u64,
    /// Session queue poll
    pub queue_poll_interval_ms: u64,
    /// Max distance between a polled position and a seek target to confirm it
    pub confirm_tolerance_ms: u64,
    /// Extrapolation stays suppressed this long after a seek
    pub seek_resume_ms: u64,
    /// A pending seek is released after this long, confirmed or not
    pub seek_expiry_ms: u64,
    /// Quiet period before a volume change is sent
    pub volume_debounce_ms: u64,
    /// Delay before reopening a dropped push channel
    pub reconnect_delay_ms: u64,
    /// Delay of the extra poll after a command
    pub follow_up_poll_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            correction_interval_ms: 10_000,
            poll_interval_ms: 1_000,
            queue_poll_interval_ms: 3_000,
            confirm_tolerance_ms: 1_000,
            seek_resume_ms: 1_000,
            seek_expiry_ms: 3_000,
            volume_debounce_ms: 300,
            reconnect_delay_ms: 3_000,
            follow_up_poll_ms: 500,
        }
    }
}

impl SyncConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the engine spin or never release a seek
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("tick_interval_ms", self.tick_interval_ms),
            ("correction_interval_ms", self.correction_interval_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("queue_poll_interval_ms", self.queue_poll_interval_ms),
            ("seek_expiry_ms", self.seek_expiry_ms),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.seek_resume_ms > self.seek_expiry_ms {
            return Err(ConfigError::Invalid {
                field: "seek_resume_ms",
                reason: format!("must not exceed seek_expiry_ms ({})", self.seek_expiry_ms),
            });
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn correction_interval(&self) -> Duration {
        Duration::from_millis(self.correction_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_interval_ms)
    }

    pub fn seek_resume(&self) -> Duration {
        Duration::from_millis(self.seek_resume_ms)
    }

    pub fn seek_expiry(&self) -> Duration {
        Duration::from_millis(self.seek_expiry_ms)
    }

    pub fn volume_debounce(&self) -> Duration {
        Duration::from_millis(self.volume_debounce_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn follow_up_poll(&self) -> Duration {
        Duration::from_millis(self.follow_up_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SyncConfig::from_json(r#"{"confirm_tolerance_ms": 500}"#).unwrap();
        assert_eq!(config.confirm_tolerance_ms, 500);
        assert_eq!(config.seek_expiry_ms, 3_000);
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = SyncConfig::from_json(r#"{"poll_interval_ms": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "poll_interval_ms", .. }));
    }

    #[test]
    fn test_rejects_resume_after_expiry() {
        let config = SyncConfig {
            seek_resume_ms: 5_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::default().with_overrides(|key| match key {
            "FLAKE_API_URL" => Some("https://bot.example/api/v1".to_string()),
            "FLAKE_TOKEN" => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(config.api_url, "https://bot.example/api/v1");
        assert_eq!(config.ws_url, DEFAULT_WS_URL);
        assert_eq!(config.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_client_url_schemes() {
        assert!(ClientConfig::default().validate().is_ok());

        let config = ClientConfig {
            ws_url: "http://localhost:8000".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "ws_url", .. })));
    }

    #[test]
    fn test_push_url() {
        let config = ClientConfig {
            ws_url: "wss://bot.example/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.push_url("123"), "wss://bot.example/ws/123");
    }
}
