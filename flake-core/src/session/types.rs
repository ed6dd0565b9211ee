//! Session-facing types

use crate::api::{ApiError, Player, SessionQueue, Track};
use crate::config::ConfigError;
use crate::sync::PlayerView;

/// Errors returned by session operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("No guild selected")]
    NoGuildSelected,

    #[error("Nothing is playing")]
    NothingPlaying,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A guild with an active player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildInfo {
    pub guild_id: String,
    pub label: String,
    pub voice_channel: Option<String>,
    pub is_playing: bool,
}

impl From<&Player> for GuildInfo {
    fn from(p: &Player) -> Self {
        Self {
            guild_id: p.guild_id.clone(),
            label: p.label().to_string(),
            voice_channel: p.voice_channel.clone(),
            is_playing: p.playing && !p.paused,
        }
    }
}

/// Receives session events. Every method has an empty default.
///
/// Called from runtime tasks, never while internal locks are held.
pub trait SessionCallback: Send + Sync {
    /// Snapshot reconciled, push event applied or a control changed
    fn on_state_changed(&self, _view: PlayerView) {}

    /// Extrapolation or drift correction moved the displayed position
    fn on_position_changed(&self, _position_ms: u64) {}

    fn on_track_changed(&self, _track: Option<Track>) {}

    fn on_queue_changed(&self, _queue: SessionQueue) {}

    fn on_guilds_changed(&self, _guilds: Vec<GuildInfo>) {}

    fn on_guild_selected(&self, _guild_id: Option<String>) {}

    fn on_push_connected(&self) {}

    fn on_push_disconnected(&self) {}

    /// A command failed; `message` is suitable for an error banner
    fn on_error(&self, _message: String) {}
}
