//! Poll response and push signal handlers

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::Player;
use crate::push::PushSignal;
use crate::sync::{PlaybackSnapshot, PushOutcome, ReconcileOutcome};

use super::session::Inner;
use super::tasks::TaskHandle;
use super::types::GuildInfo;

impl Inner {
    /// Fetch all players and reconcile the selected guild's one.
    ///
    /// A failed fetch keeps the current snapshot; the next tick retries.
    pub(super) async fn poll_once(self: &Arc<Self>) {
        let seq = self.poll_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let players = match self.backend.players().await {
            Ok(players) => players,
            Err(e) => {
                debug!("Player poll failed: {}", e);
                return;
            }
        };

        // a slower earlier request must not undo a newer one
        if self.applied_seq.fetch_max(seq, Ordering::SeqCst) > seq {
            debug!("Dropping out-of-order poll response #{}", seq);
            return;
        }

        self.update_guilds(&players);

        let Some(player) = self.pick_player(&players) else {
            self.apply_snapshot(PlaybackSnapshot::idle());
            return;
        };
        self.apply_snapshot(PlaybackSnapshot::from_player(player));
    }

    /// The selected guild's player, falling back to the first listed one
    fn pick_player<'a>(self: &Arc<Self>, players: &'a [Player]) -> Option<&'a Player> {
        let selected = self.guild.read().clone();
        if let Some(player) = selected
            .as_deref()
            .and_then(|id| players.iter().find(|p| p.guild_id == id))
        {
            return Some(player);
        }

        let Some(first) = players.first() else {
            if selected.is_some() {
                info!("No active players, clearing guild selection");
                self.switch_guild(None);
            }
            return None;
        };
        info!("Guild {:?} has no player, switching to {}", selected, first.guild_id);
        self.switch_guild(Some(first.guild_id.clone()));
        Some(first)
    }

    fn update_guilds(&self, players: &[Player]) {
        let guilds: Vec<GuildInfo> = players.iter().map(GuildInfo::from).collect();
        let changed = {
            let mut current = self.guilds.write();
            if *current == guilds {
                false
            } else {
                *current = guilds.clone();
                true
            }
        };

        if changed {
            if let Some(cb) = self.callback() {
                cb.on_guilds_changed(guilds);
            }
        }
    }

    fn apply_snapshot(&self, snapshot: PlaybackSnapshot) {
        let (outcome, view) = {
            let mut state = self.state.lock();
            let outcome = state.apply_snapshot(snapshot, Instant::now());
            (outcome, state.view())
        };
        self.refresh_ticker();

        match outcome {
            ReconcileOutcome::SeekHeld => debug!("Poll held back by pending seek"),
            ReconcileOutcome::SeekConfirmed => debug!("Seek confirmed at {}ms", view.position_ms),
            _ => {}
        }

        if let Some(cb) = self.callback() {
            if outcome == ReconcileOutcome::TrackChanged {
                cb.on_track_changed(view.track.clone());
            }
            cb.on_state_changed(view);
        }
    }

    /// Fetch the session queue of `guild_id`
    pub(super) async fn poll_queue(&self, guild_id: &str) {
        let queue = match self.backend.session_queue(guild_id).await {
            Ok(queue) => queue,
            Err(e) => {
                debug!("Queue poll failed: {}", e);
                return;
            }
        };

        // the guild may have changed while the request was in flight
        if self.guild.read().as_deref() != Some(guild_id) {
            return;
        }

        let changed = self.state.lock().set_queue(queue.clone());
        if changed {
            debug!("Queue now has {} tracks", queue.tracks.len());
            if let Some(cb) = self.callback() {
                cb.on_queue_changed(queue);
            }
        }
    }

    pub(super) fn handle_push_signal(self: &Arc<Self>, signal: PushSignal) {
        match signal {
            PushSignal::Connected => {
                if let Some(cb) = self.callback() {
                    cb.on_push_connected();
                }
            }

            PushSignal::Disconnected => {
                warn!("Push channel lost, polling continues");
                if let Some(cb) = self.callback() {
                    cb.on_push_disconnected();
                }
            }

            PushSignal::Event(event) => {
                let (outcome, view) = {
                    let mut state = self.state.lock();
                    let outcome = state.apply_push(event, Instant::now());
                    (outcome, state.view())
                };
                if outcome == PushOutcome::Ignored {
                    return;
                }
                self.refresh_ticker();

                match &view.track {
                    Some(track) => info!("Now playing: {}", track.display_name()),
                    None => info!("Playback ended"),
                }

                if let Some(cb) = self.callback() {
                    cb.on_track_changed(view.track.clone());
                    cb.on_state_changed(view);
                }

                if outcome == PushOutcome::TrackStarted {
                    self.refresh_queue_now();
                }
            }
        }
    }

    /// The queue moves with the track; fetch it without waiting for the poller
    fn refresh_queue_now(self: &Arc<Self>) {
        let Some(guild_id) = self.guild.read().clone() else {
            return;
        };
        let inner = Arc::clone(self);
        let task = TaskHandle::spawn("queue-refresh", async move {
            inner.poll_queue(&guild_id).await;
        });
        self.tasks.lock().queue_refresh = Some(task);
    }
}
