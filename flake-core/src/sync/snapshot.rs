//! Authoritative playback state

use crate::api::{millis, AudioFilter, Player, RepeatMode, Track};

/// Settings as the backend last reported them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlSettings {
    pub shuffle_enabled: bool,
    pub repeat_mode: RepeatMode,
    /// Volume 0-100, if reported
    pub volume: Option<u8>,
    /// Active filter; the players endpoint does not report it
    pub filter: Option<AudioFilter>,
}

/// Player state as last received from the backend.
///
/// Replaced wholesale on every poll response or push event, never patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackSnapshot {
    /// Identity of the loaded track (its URI), `None` when idle
    pub track_identity: Option<String>,
    pub track: Option<Track>,
    pub duration_ms: u64,
    pub position_ms: u64,
    pub is_paused: bool,
    pub is_connected: bool,
    pub settings: ControlSettings,
}

impl PlaybackSnapshot {
    /// Nothing loaded, not connected
    pub fn idle() -> Self {
        Self::default()
    }

    /// Build a snapshot from one entry of the players list
    pub fn from_player(player: &Player) -> Self {
        let track = player.current.clone();
        let duration_ms = track.as_ref().map(|t| t.duration_ms).unwrap_or(0);
        let mut position_ms = millis(player.position);
        if duration_ms > 0 {
            position_ms = position_ms.min(duration_ms);
        }

        let settings = player.settings.clone().unwrap_or_default();
        let volume = player.volume.or(settings.volume).map(volume_level);

        Self {
            track_identity: track.as_ref().and_then(Track::identity),
            track,
            duration_ms,
            position_ms,
            is_paused: player.paused,
            is_connected: player.connected,
            settings: ControlSettings {
                shuffle_enabled: settings.shuffle_enabled,
                repeat_mode: settings.repeat_mode,
                volume,
                filter: None,
            },
        }
    }

    /// A track that just started, as announced on the push channel
    pub fn started(track: Track, previous: &PlaybackSnapshot) -> Self {
        Self {
            track_identity: track.identity(),
            duration_ms: track.duration_ms,
            track: Some(track),
            position_ms: 0,
            is_paused: false,
            is_connected: true,
            settings: previous.settings.clone(),
        }
    }

    /// Playback stopped with nothing loaded
    pub fn ended(previous: &PlaybackSnapshot) -> Self {
        Self {
            is_connected: previous.is_connected,
            settings: previous.settings.clone(),
            ..Self::default()
        }
    }

    pub fn has_track(&self) -> bool {
        self.track_identity.is_some()
    }

    /// Whether the position should be advancing right now
    pub fn is_playing(&self) -> bool {
        self.is_connected && !self.is_paused && self.has_track()
    }

    /// Same track at the same position and pause state
    pub fn same_playback(&self, other: &PlaybackSnapshot) -> bool {
        self.track_identity == other.track_identity
            && self.position_ms == other.position_ms
            && self.is_paused == other.is_paused
    }
}

/// Clamp a reported volume into 0-100
fn volume_level(value: f64) -> u8 {
    if value.is_finite() {
        value.round().clamp(0.0, 100.0) as u8
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PlayerSettings;

    fn player(position: f64) -> Player {
        Player {
            guild_id: "1".into(),
            connected: true,
            playing: true,
            position,
            volume: Some(120.0),
            current: Some(Track {
                title: "Song".into(),
                duration_ms: 10_000,
                uri: Some("uri://song".into()),
                ..Default::default()
            }),
            settings: Some(PlayerSettings {
                shuffle_enabled: true,
                repeat_mode: RepeatMode::One,
                volume: Some(50.0),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_player() {
        let snapshot = PlaybackSnapshot::from_player(&player(2_500.0));
        assert_eq!(snapshot.track_identity.as_deref(), Some("uri://song"));
        assert_eq!(snapshot.position_ms, 2_500);
        assert!(snapshot.is_playing());
        // top-level volume wins and is clamped
        assert_eq!(snapshot.settings.volume, Some(100));
        assert!(snapshot.settings.shuffle_enabled);
        assert_eq!(snapshot.settings.filter, None);
    }

    #[test]
    fn test_position_clamped_to_duration() {
        let snapshot = PlaybackSnapshot::from_player(&player(99_999.0));
        assert_eq!(snapshot.position_ms, 10_000);
    }

    #[test]
    fn test_idle_is_not_playing() {
        let mut p = player(0.0);
        p.current = None;
        let snapshot = PlaybackSnapshot::from_player(&p);
        assert!(!snapshot.has_track());
        assert!(!snapshot.is_playing());
    }

    #[test]
    fn test_started_and_ended() {
        let before = PlaybackSnapshot::from_player(&player(4_000.0));
        let next = Track {
            title: "Next".into(),
            duration_ms: 5_000,
            uri: Some("uri://next".into()),
            ..Default::default()
        };
        let started = PlaybackSnapshot::started(next, &before);
        assert_eq!(started.position_ms, 0);
        assert_eq!(started.duration_ms, 5_000);
        assert_eq!(started.settings, before.settings);
        assert!(started.is_playing());

        let ended = PlaybackSnapshot::ended(&started);
        assert!(!ended.has_track());
        assert!(!ended.is_playing());
        assert!(ended.is_connected);
    }
}
