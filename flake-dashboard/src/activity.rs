//! Activity log and session event recorder for the dashboard

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Local};
use flake_core::api::{SessionQueue, Track};
use flake_core::session::{GuildInfo, SessionCallback};
use parking_lot::RwLock;

/// Maximum number of log entries to keep
const MAX_LOG_ENTRIES: usize = 100;

/// How long a command error stays in the header
const ERROR_BANNER_SECS: i64 = 5;

/// A log entry for the dashboard
#[derive(Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Track,
    Push,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Track => "TRACK",
            LogLevel::Push => "PUSH",
        }
    }
}

/// Everything the dashboard shows besides the player itself
pub struct Activity {
    pub start_time: DateTime<Local>,
    pub push_connected: bool,
    pub guild_count: usize,
    pub logs: VecDeque<LogEntry>,
    last_error: Option<(DateTime<Local>, String)>,
}

impl Activity {
    pub fn new() -> Self {
        Self {
            start_time: Local::now(),
            push_connected: false,
            guild_count: 0,
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            last_error: None,
        }
    }

    /// Add a log entry
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.logs.len() >= MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        let message = message.into();
        tracing::info!("[{}] {}", level.as_str(), message);
        self.logs.push_back(LogEntry {
            timestamp: Local::now(),
            level,
            message,
        });
    }

    /// Log an error and show it in the header for a few seconds
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.last_error = Some((Local::now(), message.clone()));
        self.log(LogLevel::Error, message);
    }

    /// The error banner, if one is still fresh
    pub fn banner(&self) -> Option<&str> {
        let (at, message) = self.last_error.as_ref()?;
        let age = Local::now().signed_duration_since(*at).num_seconds();
        (age < ERROR_BANNER_SECS).then_some(message.as_str())
    }

    /// Get uptime as formatted string
    pub fn uptime(&self) -> String {
        let duration = Local::now().signed_duration_since(self.start_time);
        let secs = duration.num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            let hours = secs / 3600;
            let mins = (secs % 3600) / 60;
            format!("{}h {}m", hours, mins)
        }
    }
}

/// Turns session callbacks into activity entries
pub struct ActivityRecorder {
    activity: Arc<RwLock<Activity>>,
}

impl ActivityRecorder {
    pub fn new(activity: Arc<RwLock<Activity>>) -> Self {
        Self { activity }
    }
}

impl SessionCallback for ActivityRecorder {
    fn on_track_changed(&self, track: Option<Track>) {
        let message = match track {
            Some(track) => format!("Now playing: {}", track.display_name()),
            None => "Playback stopped".to_string(),
        };
        self.activity.write().log(LogLevel::Track, message);
    }

    fn on_queue_changed(&self, queue: SessionQueue) {
        self.activity
            .write()
            .log(LogLevel::Info, format!("Queue updated ({} tracks)", queue.tracks.len()));
    }

    fn on_guilds_changed(&self, guilds: Vec<GuildInfo>) {
        let mut activity = self.activity.write();
        activity.guild_count = guilds.len();
        let names: Vec<&str> = guilds.iter().map(|g| g.label.as_str()).collect();
        activity.log(LogLevel::Info, format!("Active guilds: {}", names.join(", ")));
    }

    fn on_guild_selected(&self, guild_id: Option<String>) {
        let message = match guild_id {
            Some(id) => format!("Selected guild {}", id),
            None => "No guild selected".to_string(),
        };
        self.activity.write().log(LogLevel::Info, message);
    }

    fn on_push_connected(&self) {
        let mut activity = self.activity.write();
        activity.push_connected = true;
        activity.log(LogLevel::Push, "Live updates connected");
    }

    fn on_push_disconnected(&self) {
        let mut activity = self.activity.write();
        activity.push_connected = false;
        activity.log(LogLevel::Warning, "Live updates lost, reconnecting");
    }

    fn on_error(&self, message: String) {
        self.activity.write().error(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_bounded() {
        let mut activity = Activity::new();
        for i in 0..(MAX_LOG_ENTRIES + 5) {
            activity.log(LogLevel::Info, format!("entry {}", i));
        }
        assert_eq!(activity.logs.len(), MAX_LOG_ENTRIES);
        assert_eq!(activity.logs.front().map(|e| e.message.as_str()), Some("entry 5"));
    }

    #[test]
    fn test_error_banner() {
        let mut activity = Activity::new();
        assert!(activity.banner().is_none());
        activity.error("Failed to control player");
        assert_eq!(activity.banner(), Some("Failed to control player"));
        assert_eq!(activity.logs.back().map(|e| e.level), Some(LogLevel::Error));
    }

    #[test]
    fn test_recorder_tracks_push_state() {
        let activity = Arc::new(RwLock::new(Activity::new()));
        let recorder = ActivityRecorder::new(Arc::clone(&activity));

        recorder.on_push_connected();
        assert!(activity.read().push_connected);
        recorder.on_push_disconnected();
        assert!(!activity.read().push_connected);
        assert_eq!(activity.read().logs.len(), 2);
    }
}
