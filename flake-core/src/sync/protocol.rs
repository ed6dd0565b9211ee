//! Push channel messages

use serde::Deserialize;

use crate::api::{millis, Track};

/// Raw JSON frame as the backend broadcasts it
#[derive(Debug, Deserialize)]
struct PushFrame {
    event: String,
    #[serde(default)]
    track: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    artwork: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// A discrete event pushed by the backend
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// A new track began playing
    TrackStart { track: Track },
    /// The current track finished
    TrackEnd {
        title: Option<String>,
        reason: Option<String>,
    },
    /// Periodic update; carries nothing the poll does not
    PlayerUpdate,
}

impl PushEvent {
    /// Parse a text frame. Malformed or unknown frames yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let frame: PushFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::trace!("Dropping malformed push frame: {}", e);
                return None;
            }
        };

        match frame.event.as_str() {
            "TRACK_START" => Some(PushEvent::TrackStart {
                track: Track {
                    title: frame.track.unwrap_or_default(),
                    author: frame.author,
                    duration_ms: millis(frame.duration.unwrap_or(0.0)),
                    uri: frame.uri,
                    thumbnail: frame.artwork,
                },
            }),
            "TRACK_END" => Some(PushEvent::TrackEnd {
                title: frame.track,
                reason: frame.reason,
            }),
            "PLAYER_UPDATE" => Some(PushEvent::PlayerUpdate),
            other => {
                tracing::trace!("Ignoring unknown push event {}", other);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_start() {
        let event = PushEvent::parse(
            r#"{"event":"TRACK_START","track":"Song","author":"Artist","duration":200000,"uri":"uri://s","artwork":"a.png"}"#,
        )
        .unwrap();

        match event {
            PushEvent::TrackStart { track } => {
                assert_eq!(track.title, "Song");
                assert_eq!(track.duration_ms, 200_000);
                assert_eq!(track.identity().as_deref(), Some("uri://s"));
                assert_eq!(track.thumbnail.as_deref(), Some("a.png"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_track_end() {
        let event = PushEvent::parse(r#"{"event":"TRACK_END","track":"Song","reason":"finished"}"#);
        assert_eq!(
            event,
            Some(PushEvent::TrackEnd {
                title: Some("Song".into()),
                reason: Some("finished".into()),
            })
        );
    }

    #[test]
    fn test_garbage_is_ignored() {
        assert_eq!(PushEvent::parse("not json"), None);
        assert_eq!(PushEvent::parse(r#"{"no_event": true}"#), None);
        assert_eq!(PushEvent::parse(r#"{"event":"SOMETHING_NEW"}"#), None);
        assert_eq!(PushEvent::parse(r#"{"event":"PLAYER_UPDATE"}"#), Some(PushEvent::PlayerUpdate));
    }
}
