//! Player State Management
//!
//! [`PlayerState`] is the single owner of everything the dashboard shows for
//! the selected guild. Every update source goes through one of its methods:
//! polled snapshots, push events, extrapolation ticks and user seeks.

use tokio::time::Instant;

use crate::api::{SessionQueue, Track};
use crate::config::SyncConfig;

use super::controls::ControlMirror;
use super::position::DisplayPosition;
use super::protocol::PushEvent;
use super::seek::{SeekCoordinator, SeekIntent, SeekTicket};
use super::snapshot::PlaybackSnapshot;

/// What a polled snapshot did to the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Display synced to the snapshot position
    Synced,
    /// Same playback as the previous snapshot; display left alone
    Unchanged,
    /// Pending seek confirmed, display synced
    SeekConfirmed,
    /// Pending seek kept the display at its target
    SeekHeld,
    /// Timeline drag in progress; display left alone
    DragHeld,
    /// Different track; any seek discarded, display synced
    TrackChanged,
}

/// What a push event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    TrackStarted,
    TrackEnded,
    Ignored,
}

/// Read-only copy of the state for rendering
#[derive(Debug, Clone, Default)]
pub struct PlayerView {
    pub track: Option<Track>,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub is_paused: bool,
    pub is_connected: bool,
    pub is_playing: bool,
    pub controls: ControlMirror,
    pub seek_pending: bool,
    pub dragging: bool,
}

impl PlayerView {
    /// Progress through the track in [0, 1]
    pub fn progress(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        (self.position_ms as f64 / self.duration_ms as f64).clamp(0.0, 1.0)
    }
}

/// Reconciled player state for one guild
#[derive(Debug)]
pub struct PlayerState {
    config: SyncConfig,
    snapshot: PlaybackSnapshot,
    display: DisplayPosition,
    seeks: SeekCoordinator,
    controls: ControlMirror,
    queue: SessionQueue,
    /// Timeline drag in progress
    dragging: bool,
    /// A seek expired unconfirmed; the next snapshot must sync even if unchanged
    resync_pending: bool,
    received_any: bool,
}

impl PlayerState {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            snapshot: PlaybackSnapshot::idle(),
            display: DisplayPosition::default(),
            seeks: SeekCoordinator::new(),
            controls: ControlMirror::default(),
            queue: SessionQueue::default(),
            dragging: false,
            resync_pending: false,
            received_any: false,
        }
    }

    /// Forget everything (guild changed)
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &PlaybackSnapshot {
        &self.snapshot
    }

    pub fn display_ms(&self) -> u64 {
        self.display.value_ms()
    }

    pub fn seek_intent(&self) -> Option<&SeekIntent> {
        self.seeks.intent()
    }

    pub fn controls(&self) -> &ControlMirror {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut ControlMirror {
        &mut self.controls
    }

    pub fn queue(&self) -> &SessionQueue {
        &self.queue
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Whether the extrapolator should be advancing the display
    pub fn is_extrapolating(&self, now: Instant) -> bool {
        self.snapshot.is_playing()
            && !self.dragging
            && !self.seeks.suppresses_ticking(now, self.config.seek_resume())
    }

    /// Extrapolation step. Returns the milliseconds added.
    pub fn tick(&mut self, now: Instant) -> u64 {
        if !self.is_extrapolating(now) {
            self.display.halt();
            return 0;
        }

        let limit = Some(self.snapshot.duration_ms).filter(|d| *d > 0);
        self.display.tick(now, limit)
    }

    /// Periodic drift correction: snap the display to the last snapshot.
    ///
    /// Skipped while a seek is pending or the timeline is being dragged.
    pub fn correct(&mut self, now: Instant) -> bool {
        self.expire_seek_if_due(now);
        if self.dragging || self.seeks.is_pending() || !self.snapshot.has_track() {
            return false;
        }

        self.display.force(self.snapshot.position_ms);
        true
    }

    /// Reconcile a polled snapshot into the display
    pub fn apply_snapshot(&mut self, snapshot: PlaybackSnapshot, now: Instant) -> ReconcileOutcome {
        self.expire_seek_if_due(now);

        let track_changed = snapshot.track_identity != self.snapshot.track_identity;
        let unchanged = self.received_any && self.snapshot.same_playback(&snapshot);
        let position_ms = snapshot.position_ms;

        self.controls.reconcile(&snapshot.settings);
        self.snapshot = snapshot;
        self.received_any = true;

        let outcome = if track_changed {
            if let Some(intent) = self.seeks.clear() {
                tracing::debug!("Track changed, discarding seek to {}ms", intent.target_ms);
            }
            self.display.force(position_ms);
            self.resync_pending = false;
            ReconcileOutcome::TrackChanged
        } else if self.dragging {
            ReconcileOutcome::DragHeld
        } else if self.seeks.is_pending() {
            if self.seeks.confirm_if_matches(position_ms, self.config.confirm_tolerance_ms) {
                self.display.force(position_ms);
                ReconcileOutcome::SeekConfirmed
            } else {
                ReconcileOutcome::SeekHeld
            }
        } else if unchanged && !self.resync_pending {
            ReconcileOutcome::Unchanged
        } else {
            self.display.force(position_ms);
            self.resync_pending = false;
            ReconcileOutcome::Synced
        };

        self.settle(now);
        outcome
    }

    /// Apply a push event
    pub fn apply_push(&mut self, event: PushEvent, now: Instant) -> PushOutcome {
        let outcome = match event {
            PushEvent::TrackStart { track } => {
                self.snapshot = PlaybackSnapshot::started(track, &self.snapshot);
                PushOutcome::TrackStarted
            }
            PushEvent::TrackEnd { .. } => {
                self.snapshot = PlaybackSnapshot::ended(&self.snapshot);
                PushOutcome::TrackEnded
            }
            PushEvent::PlayerUpdate => return PushOutcome::Ignored,
        };

        if let Some(intent) = self.seeks.clear() {
            tracing::debug!("Track event, discarding seek to {}ms", intent.target_ms);
        }
        self.display.force(0);
        self.resync_pending = false;
        self.received_any = true;
        self.settle(now);
        outcome
    }

    /// Start a seek. Returns `None` when nothing is loaded.
    pub fn begin_seek(&mut self, target_ms: u64, now: Instant) -> Option<SeekTicket> {
        if !self.snapshot.has_track() {
            return None;
        }

        let target_ms = self.clamp_to_track(target_ms);
        self.dragging = false;
        self.display.force(target_ms);
        let ticket = self.seeks.submit(target_ms, now);
        self.settle(now);
        Some(ticket)
    }

    /// Seek target for a percentage of the track
    pub fn percent_target(&self, percent: f64) -> Option<u64> {
        if !self.snapshot.has_track() || self.snapshot.duration_ms == 0 || !percent.is_finite() {
            return None;
        }
        let fraction = percent.clamp(0.0, 100.0) / 100.0;
        Some((fraction * self.snapshot.duration_ms as f64).floor() as u64)
    }

    /// The short suppression timer of a seek fired
    pub fn resume_after_seek(&mut self, generation: u64) -> bool {
        self.seeks.resume(generation)
    }

    /// The expiry timer of a seek fired
    pub fn expire_seek(&mut self, generation: u64) -> bool {
        let expired = self.seeks.expire(generation);
        if expired {
            self.resync_pending = true;
        }
        expired
    }

    fn expire_seek_if_due(&mut self, now: Instant) {
        if self.seeks.expire_if_due(now, self.config.seek_expiry()) {
            self.resync_pending = true;
        }
    }

    /// The user grabbed the timeline
    pub fn begin_drag(&mut self) {
        self.dragging = true;
        self.display.halt();
    }

    /// Preview a position while dragging
    pub fn drag_to(&mut self, position_ms: u64) {
        if self.dragging {
            let position_ms = self.clamp_to_track(position_ms);
            self.display.force(position_ms);
        }
    }

    /// The user let go without seeking
    pub fn cancel_drag(&mut self) {
        self.dragging = false;
        self.display.force(self.snapshot.position_ms);
        self.resync_pending = true;
    }

    /// Replace the queue view. Returns true if it changed.
    pub fn set_queue(&mut self, queue: SessionQueue) -> bool {
        if self.queue == queue {
            return false;
        }
        self.queue = queue;
        true
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            track: self.snapshot.track.clone(),
            position_ms: self.display.value_ms(),
            duration_ms: self.snapshot.duration_ms,
            is_paused: self.snapshot.is_paused,
            is_connected: self.snapshot.is_connected,
            is_playing: self.snapshot.is_playing(),
            controls: self.controls.clone(),
            seek_pending: self.seeks.is_pending(),
            dragging: self.dragging,
        }
    }

    fn clamp_to_track(&self, position_ms: u64) -> u64 {
        match self.snapshot.duration_ms {
            0 => position_ms,
            duration => position_ms.min(duration),
        }
    }

    /// Drop the extrapolation baseline whenever ticking must not happen
    fn settle(&mut self, now: Instant) {
        if !self.is_extrapolating(now) {
            self.display.halt();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::sync::snapshot::ControlSettings;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn snapshot(uri: &str, position_ms: u64, paused: bool) -> PlaybackSnapshot {
        PlaybackSnapshot {
            track_identity: Some(uri.to_string()),
            track: Some(Track {
                title: uri.to_string(),
                duration_ms: 180_000,
                uri: Some(uri.to_string()),
                ..Default::default()
            }),
            duration_ms: 180_000,
            position_ms,
            is_paused: paused,
            is_connected: true,
            settings: ControlSettings::default(),
        }
    }

    fn playing_state(t0: Instant) -> PlayerState {
        let mut state = PlayerState::new(SyncConfig::default());
        state.apply_snapshot(snapshot("a", 0, false), t0);
        state
    }

    #[test]
    fn test_extrapolation_adds_elapsed() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);

        state.tick(t0);
        let before = state.display_ms();
        assert_eq!(state.tick(t0 + ms(50)), 50);
        assert_eq!(state.tick(t0 + ms(173)), 123);
        assert_eq!(state.display_ms(), before + 173);
    }

    #[test]
    fn test_pause_freezes_display() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);
        state.tick(t0);
        state.tick(t0 + ms(500));
        assert_eq!(state.display_ms(), 500);

        // snapshot reports paused at 500
        state.apply_snapshot(snapshot("a", 500, true), t0 + ms(500));
        assert!(!state.is_extrapolating(t0 + ms(600)));
        assert_eq!(state.tick(t0 + ms(600)), 0);
        assert_eq!(state.tick(t0 + ms(5_000)), 0);
        assert_eq!(state.display_ms(), 500);

        // resume: paused time is not credited
        state.apply_snapshot(snapshot("a", 500, false), t0 + ms(5_000));
        assert_eq!(state.tick(t0 + ms(5_010)), 0);
        assert_eq!(state.tick(t0 + ms(5_060)), 50);
        assert_eq!(state.display_ms(), 550);
    }

    #[test]
    fn test_identical_snapshot_is_idempotent() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);
        state.apply_snapshot(snapshot("a", 1_000, false), t0);
        state.tick(t0);
        state.tick(t0 + ms(400));
        assert_eq!(state.display_ms(), 1_400);

        let outcome = state.apply_snapshot(snapshot("a", 1_000, false), t0 + ms(400));
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert_eq!(state.display_ms(), 1_400);
    }

    #[test]
    fn test_new_position_syncs_display() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);
        let outcome = state.apply_snapshot(snapshot("a", 7_000, false), t0);
        assert_eq!(outcome, ReconcileOutcome::Synced);
        assert_eq!(state.display_ms(), 7_000);
    }

    #[test]
    fn test_seek_scenario() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);

        state.begin_seek(90_000, t0).unwrap();
        assert_eq!(state.display_ms(), 90_000);

        // stale pre-seek poll 200ms later is rejected
        let outcome = state.apply_snapshot(snapshot("a", 200, false), t0 + ms(200));
        assert_eq!(outcome, ReconcileOutcome::SeekHeld);
        assert_eq!(state.display_ms(), 90_000);
        assert!(state.seek_intent().unwrap().is_pending());

        // poll within tolerance confirms
        let outcome = state.apply_snapshot(snapshot("a", 90_400, false), t0 + ms(1_200));
        assert_eq!(outcome, ReconcileOutcome::SeekConfirmed);
        assert_eq!(state.display_ms(), 90_400);

        // normal reconciliation resumes
        let outcome = state.apply_snapshot(snapshot("a", 91_400, false), t0 + ms(2_200));
        assert_eq!(outcome, ReconcileOutcome::Synced);
        assert_eq!(state.display_ms(), 91_400);
    }

    #[test]
    fn test_no_poll_write_until_expiry() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);
        state.begin_seek(60_000, t0).unwrap();

        for (i, at) in [500, 1_500, 2_500, 2_999].into_iter().enumerate() {
            let outcome = state.apply_snapshot(snapshot("a", 1_000 + i as u64, false), t0 + ms(at));
            assert_eq!(outcome, ReconcileOutcome::SeekHeld);
        }
        // display moved only by extrapolation after the resume window
        assert!(state.display_ms() >= 60_000);

        // 3000ms: expired, this poll wins
        let outcome = state.apply_snapshot(snapshot("a", 4_000, false), t0 + ms(3_000));
        assert_eq!(outcome, ReconcileOutcome::Synced);
        assert_eq!(state.display_ms(), 4_000);
    }

    #[test]
    fn test_expiry_timer_forces_next_sync() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);
        state.apply_snapshot(snapshot("a", 2_000, true), t0);
        let ticket = state.begin_seek(60_000, t0).unwrap();
        state.apply_snapshot(snapshot("a", 2_000, true), t0 + ms(100));
        assert_eq!(state.display_ms(), 60_000);

        assert!(state.expire_seek(ticket.generation));
        // same snapshot again, but the display must return to the truth
        let outcome = state.apply_snapshot(snapshot("a", 2_000, true), t0 + ms(3_100));
        assert_eq!(outcome, ReconcileOutcome::Synced);
        assert_eq!(state.display_ms(), 2_000);
    }

    #[test]
    fn test_seek_suppresses_ticking_until_resume() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);
        state.tick(t0);
        let ticket = state.begin_seek(30_000, t0).unwrap();

        assert_eq!(state.tick(t0 + ms(50)), 0);
        assert_eq!(state.tick(t0 + ms(500)), 0);
        assert_eq!(state.display_ms(), 30_000);

        assert!(state.resume_after_seek(ticket.generation));
        state.tick(t0 + ms(600));
        assert_eq!(state.tick(t0 + ms(650)), 50);
        assert_eq!(state.display_ms(), 30_050);
    }

    #[test]
    fn test_track_change_push_discards_seek() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);
        state.begin_seek(50_000, t0).unwrap();

        let outcome = state.apply_push(
            PushEvent::TrackStart {
                track: Track {
                    title: "B".into(),
                    duration_ms: 120_000,
                    uri: Some("b".into()),
                    ..Default::default()
                },
            },
            t0 + ms(100),
        );

        assert_eq!(outcome, PushOutcome::TrackStarted);
        assert!(state.seek_intent().is_none());
        assert_eq!(state.display_ms(), 0);
        assert_eq!(state.snapshot().track_identity.as_deref(), Some("b"));
        assert_eq!(state.snapshot().duration_ms, 120_000);
        assert!(state.is_extrapolating(t0 + ms(100)));
    }

    #[test]
    fn test_track_change_poll_discards_seek() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);
        state.begin_seek(50_000, t0).unwrap();

        let outcome = state.apply_snapshot(snapshot("b", 300, false), t0 + ms(500));
        assert_eq!(outcome, ReconcileOutcome::TrackChanged);
        assert!(state.seek_intent().is_none());
        assert_eq!(state.display_ms(), 300);
    }

    #[test]
    fn test_track_end_stops_extrapolation() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);
        state.tick(t0);
        state.tick(t0 + ms(1_000));

        let outcome = state.apply_push(
            PushEvent::TrackEnd {
                title: None,
                reason: None,
            },
            t0 + ms(1_000),
        );
        assert_eq!(outcome, PushOutcome::TrackEnded);
        assert!(state.snapshot().track.is_none());
        assert!(!state.is_extrapolating(t0 + ms(1_000)));
        assert_eq!(state.tick(t0 + ms(2_000)), 0);
        assert_eq!(state.display_ms(), 0);
    }

    #[test]
    fn test_player_update_ignored() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);
        state.apply_snapshot(snapshot("a", 5_000, false), t0);
        assert_eq!(state.apply_push(PushEvent::PlayerUpdate, t0), PushOutcome::Ignored);
        assert_eq!(state.display_ms(), 5_000);
    }

    #[test]
    fn test_drag_holds_display() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);
        state.begin_drag();
        state.drag_to(40_000);

        assert_eq!(state.tick(t0 + ms(50)), 0);
        let outcome = state.apply_snapshot(snapshot("a", 1_000, false), t0 + ms(100));
        assert_eq!(outcome, ReconcileOutcome::DragHeld);
        assert_eq!(state.display_ms(), 40_000);
        // snapshot itself is still fresh
        assert_eq!(state.snapshot().position_ms, 1_000);

        state.cancel_drag();
        assert_eq!(state.display_ms(), 1_000);
    }

    #[test]
    fn test_periodic_correction() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);
        state.apply_snapshot(snapshot("a", 10_000, false), t0);
        state.tick(t0);
        state.tick(t0 + ms(900));
        assert_eq!(state.display_ms(), 10_900);

        assert!(state.correct(t0 + ms(900)));
        assert_eq!(state.display_ms(), 10_000);

        state.begin_seek(20_000, t0 + ms(1_000));
        assert!(!state.correct(t0 + ms(1_100)));
        assert_eq!(state.display_ms(), 20_000);
    }

    #[test]
    fn test_seek_without_track() {
        let mut state = PlayerState::new(SyncConfig::default());
        assert!(state.begin_seek(1_000, Instant::now()).is_none());
        assert_eq!(state.percent_target(50.0), None);
    }

    #[test]
    fn test_seek_clamped_and_percent() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);
        assert_eq!(state.percent_target(50.0), Some(90_000));
        assert_eq!(state.percent_target(150.0), Some(180_000));

        let ticket = state.begin_seek(999_999, t0).unwrap();
        assert_eq!(ticket.target_ms, 180_000);
        assert_eq!(state.display_ms(), 180_000);
    }

    #[test]
    fn test_view_progress() {
        let t0 = Instant::now();
        let mut state = playing_state(t0);
        state.apply_snapshot(snapshot("a", 45_000, false), t0);
        let view = state.view();
        assert!(view.is_playing);
        assert!((view.progress() - 0.25).abs() < f64::EPSILON);
    }
}
