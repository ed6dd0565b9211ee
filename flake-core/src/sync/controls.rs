//! Optimistic mirror of player settings

use crate::api::{AudioFilter, RepeatMode};

use super::snapshot::ControlSettings;

/// Volume assumed before the first snapshot arrives
const DEFAULT_VOLUME: u8 = 100;

/// Local copy of the player settings, changed immediately on user action
/// and corrected by the next snapshot where the backend disagrees.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMirror {
    pub shuffle_enabled: bool,
    pub repeat_mode: RepeatMode,
    /// Volume 0-100 as shown on the slider (0 while muted)
    pub volume: u8,
    pub muted: bool,
    pub filter: AudioFilter,
    /// Level to restore on unmute
    pre_mute_volume: u8,
    /// A debounced volume change not yet sent
    pending_volume: Option<u8>,
}

impl Default for ControlMirror {
    fn default() -> Self {
        Self {
            shuffle_enabled: false,
            repeat_mode: RepeatMode::Off,
            volume: DEFAULT_VOLUME,
            muted: false,
            filter: AudioFilter::Off,
            pre_mute_volume: DEFAULT_VOLUME,
            pending_volume: None,
        }
    }
}

impl ControlMirror {
    /// Flip shuffle; returns the new value to send
    pub fn toggle_shuffle(&mut self) -> bool {
        self.shuffle_enabled = !self.shuffle_enabled;
        self.shuffle_enabled
    }

    /// Advance repeat mode; returns the new mode to send
    pub fn cycle_repeat(&mut self) -> RepeatMode {
        self.repeat_mode = self.repeat_mode.next();
        self.repeat_mode
    }

    pub fn select_filter(&mut self, filter: AudioFilter) {
        self.filter = filter;
    }

    /// Mute or unmute; returns the volume level to send
    pub fn toggle_mute(&mut self) -> u8 {
        self.pending_volume = None;
        if self.muted {
            self.muted = false;
            self.volume = self.pre_mute_volume;
        } else {
            self.muted = true;
            if self.volume > 0 {
                self.pre_mute_volume = self.volume;
            }
            self.volume = 0;
        }
        self.volume
    }

    /// Record a slider movement; the value is sent after the debounce
    pub fn set_volume(&mut self, level: u8) {
        let level = level.min(100);
        self.volume = level;
        self.muted = false;
        if level > 0 {
            self.pre_mute_volume = level;
        }
        self.pending_volume = Some(level);
    }

    pub fn has_pending_volume(&self) -> bool {
        self.pending_volume.is_some()
    }

    /// Take the debounced volume for sending
    pub fn take_pending_volume(&mut self) -> Option<u8> {
        self.pending_volume.take()
    }

    /// Overwrite local values the backend disagrees with.
    ///
    /// Returns true if anything changed.
    pub fn reconcile(&mut self, settings: &ControlSettings) -> bool {
        let before = self.clone();

        self.shuffle_enabled = settings.shuffle_enabled;
        self.repeat_mode = settings.repeat_mode;

        if let Some(filter) = settings.filter {
            self.filter = filter;
        }

        // a pending slider value is newer than anything the backend has seen
        if let Some(volume) = settings.volume.filter(|_| self.pending_volume.is_none()) {
            if self.muted && volume > 0 {
                // the mute never took effect
                self.muted = false;
            }
            if !self.muted && volume > 0 {
                self.pre_mute_volume = volume;
            }
            self.volume = volume;
        }

        let changed = *self != before;
        if changed {
            tracing::debug!("Control mirror corrected by snapshot: {:?}", settings);
        }
        changed
    }
}
