//! Types for bot API responses and requests

use serde::{Deserialize, Serialize};

/// A track, normalized once at the API boundary.
///
/// The backend is not consistent about where it puts the source URI
/// (`uri` on player payloads, `info.uri` on some playlist payloads) or
/// what it calls the length (`duration` vs `length`). Everything past
/// this type only ever sees one shape.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawTrack")]
pub struct Track {
    /// Track title
    pub title: String,
    /// Artist / uploader
    pub author: Option<String>,
    /// Total length in milliseconds (0 when unknown, e.g. streams)
    pub duration_ms: u64,
    /// Source URI
    pub uri: Option<String>,
    /// Thumbnail / artwork URL
    pub thumbnail: Option<String>,
}

impl Track {
    /// Opaque identity used to detect track changes.
    ///
    /// Falls back to the title when the backend did not send a URI.
    pub fn identity(&self) -> Option<String> {
        match &self.uri {
            Some(uri) if !uri.is_empty() => Some(uri.clone()),
            _ if !self.title.is_empty() => Some(self.title.clone()),
            _ => None,
        }
    }

    /// "Title - Author", or just the title
    pub fn display_name(&self) -> String {
        match &self.author {
            Some(author) if !author.is_empty() => format!("{} - {}", self.title, author),
            _ => self.title.clone(),
        }
    }
}

/// Every shape a track arrives in on the wire
#[derive(Debug, Default, Deserialize)]
struct RawTrack {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    length: Option<f64>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    artwork: Option<String>,
    #[serde(default)]
    info: Option<RawTrackInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTrackInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    length: Option<f64>,
    #[serde(default)]
    uri: Option<String>,
}

impl From<RawTrack> for Track {
    fn from(raw: RawTrack) -> Self {
        let info = raw.info.unwrap_or_default();
        Self {
            title: raw.title.or(info.title).unwrap_or_default(),
            author: raw.author.or(info.author),
            duration_ms: millis(raw.duration.or(raw.length).or(info.length).unwrap_or(0.0)),
            uri: raw.uri.or(info.uri),
            thumbnail: raw.thumbnail.or(raw.artwork),
        }
    }
}

/// Convert a JSON number of milliseconds into a non-negative integer
pub(crate) fn millis(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

/// Repeat mode as reported in player settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl RepeatMode {
    /// Next mode in the dashboard's cycle: off -> all -> one -> off
    pub fn next(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        }
    }
}

/// Audio filters the bot can apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AudioFilter {
    #[default]
    Off,
    Nightcore,
    Vaporwave,
    Karaoke,
    EightD,
    Tremolo,
    Vibrato,
}

impl AudioFilter {
    /// All filters in menu order
    pub const ALL: [AudioFilter; 7] = [
        AudioFilter::Off,
        AudioFilter::Nightcore,
        AudioFilter::Vaporwave,
        AudioFilter::Karaoke,
        AudioFilter::EightD,
        AudioFilter::Tremolo,
        AudioFilter::Vibrato,
    ];

    /// Identifier sent as the `mode` of a filter command
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFilter::Off => "off",
            AudioFilter::Nightcore => "nightcore",
            AudioFilter::Vaporwave => "vaporwave",
            AudioFilter::Karaoke => "karaoke",
            AudioFilter::EightD => "8d",
            AudioFilter::Tremolo => "tremolo",
            AudioFilter::Vibrato => "vibrato",
        }
    }

    /// Human readable name
    pub fn label(&self) -> &'static str {
        match self {
            AudioFilter::Off => "Normal",
            AudioFilter::Nightcore => "Nightcore",
            AudioFilter::Vaporwave => "Vaporwave",
            AudioFilter::Karaoke => "Karaoke",
            AudioFilter::EightD => "8D Audio",
            AudioFilter::Tremolo => "Tremolo",
            AudioFilter::Vibrato => "Vibrato",
        }
    }

    /// Parse a filter identifier (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.to_lowercase();
        Self::ALL.into_iter().find(|f| f.as_str() == value)
    }

    /// Next filter in menu order, wrapping around
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

/// Settings sub-object of a player
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSettings {
    #[serde(default)]
    pub shuffle_enabled: bool,
    #[serde(default)]
    pub repeat_mode: RepeatMode,
    #[serde(default)]
    pub volume: Option<f64>,
}

/// One entry of `GET /bot/players`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub guild_id: String,

    #[serde(default)]
    pub guild_name: Option<String>,

    #[serde(default)]
    pub voice_channel: Option<String>,

    #[serde(default)]
    pub text_channel: Option<String>,

    #[serde(default)]
    pub connected: bool,

    #[serde(default)]
    pub playing: bool,

    #[serde(default)]
    pub paused: bool,

    /// Playback offset in milliseconds
    #[serde(default)]
    pub position: f64,

    /// Volume 0-100
    #[serde(default)]
    pub volume: Option<f64>,

    #[serde(default)]
    pub current: Option<Track>,

    #[serde(default)]
    pub settings: Option<PlayerSettings>,
}

impl Player {
    /// Label for guild pickers
    pub fn label(&self) -> &str {
        self.guild_name.as_deref().unwrap_or(&self.guild_id)
    }
}

/// Response of `GET /bot/status`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatus {
    #[serde(default)]
    pub bot_online: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of `GET /bot/session-queue`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SessionQueue {
    #[serde(default)]
    pub tracks: Vec<Track>,
    /// `-1` on the wire while nothing is playing
    #[serde(default, deserialize_with = "queue_position")]
    pub current_index: Option<usize>,
}

fn queue_position<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.and_then(|i| usize::try_from(i).ok()))
}

impl SessionQueue {
    /// The track the session is currently on
    pub fn current(&self) -> Option<&Track> {
        self.current_index.and_then(|i| self.tracks.get(i))
    }

    /// Tracks after the current one
    pub fn upcoming(&self) -> &[Track] {
        match self.current_index {
            Some(i) if i < self.tracks.len() => &self.tracks[i + 1..],
            Some(_) => &[],
            None => &self.tracks,
        }
    }
}

/// A playback command for `POST /bot/control`
#[derive(Debug, Clone, PartialEq)]
pub enum ControlAction {
    /// Resume, or search and enqueue `query`
    Play { query: Option<String> },
    Pause,
    Resume,
    Skip,
    Previous,
    /// Absolute target in milliseconds
    Seek { position_ms: u64 },
    /// Volume 0-100
    Volume { level: u8 },
    Shuffle { enabled: bool },
    Repeat { mode: RepeatMode },
    Filter { filter: AudioFilter },
    /// Remove a queued track by index
    Remove { index: usize },
    /// Move a queued track to the front
    PlayNext { index: usize },
}

impl ControlAction {
    /// The wire name of the action
    pub fn name(&self) -> &'static str {
        match self {
            ControlAction::Play { .. } => "play",
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Skip => "skip",
            ControlAction::Previous => "previous",
            ControlAction::Seek { .. } => "seek",
            ControlAction::Volume { .. } => "volume",
            ControlAction::Shuffle { .. } => "shuffle",
            ControlAction::Repeat { .. } => "repeat",
            ControlAction::Filter { .. } => "filter",
            ControlAction::Remove { .. } => "remove",
            ControlAction::PlayNext { .. } => "playNext",
        }
    }

    /// Build the request body for a guild
    pub fn to_request(&self, guild_id: &str) -> ControlRequest {
        let mut req = ControlRequest {
            action: self.name().to_string(),
            guild_id: guild_id.to_string(),
            ..Default::default()
        };

        match self {
            ControlAction::Play { query } => req.query = query.clone(),
            ControlAction::Seek { position_ms } => req.query = Some(position_ms.to_string()),
            ControlAction::Volume { level } => req.query = Some((*level).min(100).to_string()),
            ControlAction::Shuffle { enabled } => req.enabled = Some(*enabled),
            ControlAction::Repeat { mode } => req.mode = Some(mode.as_str().to_string()),
            ControlAction::Filter { filter } => req.mode = Some(filter.as_str().to_string()),
            ControlAction::Remove { index } | ControlAction::PlayNext { index } => {
                req.index = Some(*index)
            }
            ControlAction::Pause
            | ControlAction::Resume
            | ControlAction::Skip
            | ControlAction::Previous => {}
        }

        req
    }
}

/// Request body for `POST /bot/control`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    pub action: String,
    pub guild_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// Request body for `POST /playlist/import`
#[derive(Debug, Clone, Serialize)]
pub struct ImportRequest {
    pub url: String,
    pub user_id: String,
}
