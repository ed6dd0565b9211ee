//! Sync session: owns the player state and every task that feeds it

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::{AudioFilter, BotApiClient, ControlAction, PlayerBackend, SessionQueue};
use crate::config::{ClientConfig, SyncConfig};
use crate::push::{PushConnector, PushListener, WsConnector};
use crate::sync::{PlayerState, PlayerView};

use super::tasks::TaskHandle;
use super::types::*;

/// Follow-up poll after mute/unmute
const MUTE_FOLLOW_UP: Duration = Duration::from_millis(300);

/// Background tasks, grouped by lifetime
#[derive(Default)]
pub(super) struct SessionTasks {
    // session-scoped
    poll: Option<TaskHandle>,
    ticker: Option<TaskHandle>,
    follow_up: Option<TaskHandle>,
    /// Commands in flight
    commands: Vec<TaskHandle>,
    // guild-scoped
    push: Option<TaskHandle>,
    queue: Option<TaskHandle>,
    pub(super) queue_refresh: Option<TaskHandle>,
    seek_resume: Option<TaskHandle>,
    seek_expiry: Option<TaskHandle>,
    volume: Option<TaskHandle>,
}

impl SessionTasks {
    fn clear_guild_scoped(&mut self) {
        self.push = None;
        self.queue = None;
        self.queue_refresh = None;
        self.seek_resume = None;
        self.seek_expiry = None;
        self.volume = None;
    }
}

/// Shared between the session handle and its tasks
pub(super) struct Inner {
    pub(super) backend: Arc<dyn PlayerBackend>,
    pub(super) connector: Arc<dyn PushConnector>,
    pub(super) client_config: ClientConfig,
    pub(super) config: SyncConfig,
    pub(super) state: Mutex<PlayerState>,
    pub(super) guild: RwLock<Option<String>>,
    pub(super) guilds: RwLock<Vec<GuildInfo>>,
    pub(super) callback: RwLock<Option<Arc<dyn SessionCallback>>>,
    /// Whether the ticker should run; it parks while false
    pub(super) extrapolating: watch::Sender<bool>,
    pub(super) tasks: Mutex<SessionTasks>,
    /// Set between `start` and `shutdown`; nothing long-lived spawns otherwise
    pub(super) running: AtomicBool,
    /// Sequence of issued polls and of the newest one applied
    pub(super) poll_seq: AtomicU64,
    pub(super) applied_seq: AtomicU64,
}

/// Keeps one guild's player in sync with the backend.
///
/// Must be created and used inside a tokio runtime. Dropping the session
/// stops every task it spawned.
pub struct SyncSession {
    inner: Arc<Inner>,
}

impl SyncSession {
    /// Create a session over an arbitrary backend and push transport
    pub fn new(
        backend: Arc<dyn PlayerBackend>,
        connector: Arc<dyn PushConnector>,
        client_config: ClientConfig,
        config: SyncConfig,
    ) -> Self {
        let (extrapolating, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                backend,
                connector,
                client_config,
                state: Mutex::new(PlayerState::new(config.clone())),
                config,
                guild: RwLock::new(None),
                guilds: RwLock::new(Vec::new()),
                callback: RwLock::new(None),
                extrapolating,
                tasks: Mutex::new(SessionTasks::default()),
                running: AtomicBool::new(false),
                poll_seq: AtomicU64::new(0),
                applied_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Create a session talking to the real bot API and WebSocket feed
    pub fn connect(client_config: ClientConfig, config: SyncConfig) -> Result<Self, CoreError> {
        client_config.validate()?;
        config.validate()?;

        let mut client = BotApiClient::new(&client_config)?;
        if let Some(token) = &client_config.token {
            client = client.with_token(token.clone());
        }

        info!("Connecting to bot API at {}", client.base_url());
        Ok(Self::new(
            Arc::new(client),
            Arc::new(WsConnector),
            client_config,
            config,
        ))
    }

    /// Set the event callback
    pub fn set_callback(&self, callback: Arc<dyn SessionCallback>) {
        *self.inner.callback.write() = Some(callback);
    }

    /// Start polling, extrapolation and the selected guild's push channel.
    /// Idempotent.
    pub fn start(&self) {
        let mut tasks = self.inner.tasks.lock();
        self.inner.running.store(true, Ordering::SeqCst);
        let guild = self.inner.guild.read().clone();
        if let Some(id) = guild.filter(|_| tasks.push.is_none()) {
            self.inner.spawn_guild_tasks(&mut tasks, &id);
        }
        if tasks.poll.is_none() {
            let inner = Arc::clone(&self.inner);
            tasks.poll = Some(TaskHandle::spawn("poll", run_poll_loop(inner)));
        }
        if tasks.ticker.is_none() {
            let inner = Arc::clone(&self.inner);
            tasks.ticker = Some(TaskHandle::spawn("ticker", run_ticker(inner)));
        }
        info!("Sync session started");
    }

    /// Stop every task, including commands in flight. The session can be
    /// started again and resumes the selected guild.
    pub fn shutdown(&self) {
        let stopped = {
            let mut tasks = self.inner.tasks.lock();
            if self.inner.running.swap(false, Ordering::SeqCst) {
                info!("Sync session shutting down");
            }
            std::mem::take(&mut *tasks)
        };
        // handles cancel their tasks on drop, outside the lock
        drop(stopped);
    }

    /// Switch to a guild, resetting state and restarting its push channel
    pub fn select_guild(&self, guild_id: impl Into<String>) {
        self.inner.switch_guild(Some(guild_id.into()));
    }

    pub fn clear_guild(&self) {
        self.inner.switch_guild(None);
    }

    /// Select the guild after the current one in the guild list
    pub fn select_next_guild(&self) -> Option<String> {
        let next = {
            let guilds = self.inner.guilds.read();
            let current = self.inner.guild.read().clone();
            let idx = guilds
                .iter()
                .position(|g| Some(&g.guild_id) == current.as_ref())
                .map_or(0, |i| (i + 1) % guilds.len().max(1));
            guilds.get(idx).map(|g| g.guild_id.clone())
        };

        if let Some(id) = &next {
            self.select_guild(id.clone());
        }
        next
    }

    pub fn guild_id(&self) -> Option<String> {
        self.inner.guild.read().clone()
    }

    pub fn guilds(&self) -> Vec<GuildInfo> {
        self.inner.guilds.read().clone()
    }

    /// Current state for rendering
    pub fn view(&self) -> PlayerView {
        self.inner.state.lock().view()
    }

    pub fn queue(&self) -> SessionQueue {
        self.inner.state.lock().queue().clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Poll now instead of waiting for the next tick
    pub async fn refresh(&self) {
        self.inner.poll_once().await;
    }

    // ---- seeking ----

    /// Seek to an absolute position (clamped to the track)
    pub fn seek(&self, position_ms: u64) -> Result<(), CoreError> {
        let guild_id = self.inner.require_guild()?;
        let ticket = self
            .inner
            .state
            .lock()
            .begin_seek(position_ms, Instant::now())
            .ok_or(CoreError::NothingPlaying)?;

        debug!("Seek to {}ms (generation {})", ticket.target_ms, ticket.generation);
        self.inner.refresh_ticker();
        self.inner.emit_state();

        {
            let mut tasks = self.inner.tasks.lock();

            let inner = Arc::clone(&self.inner);
            let resume_after = self.inner.config.seek_resume();
            tasks.seek_resume = Some(TaskHandle::spawn("seek-resume", async move {
                tokio::time::sleep(resume_after).await;
                if inner.state.lock().resume_after_seek(ticket.generation) {
                    inner.refresh_ticker();
                }
            }));

            let inner = Arc::clone(&self.inner);
            let expiry = self.inner.config.seek_expiry();
            tasks.seek_expiry = Some(TaskHandle::spawn("seek-expiry", async move {
                tokio::time::sleep(expiry).await;
                if inner.state.lock().expire_seek(ticket.generation) {
                    inner.refresh_ticker();
                    inner.emit_state();
                }
            }));
        }

        self.inner.dispatch(
            guild_id,
            ControlAction::Seek {
                position_ms: ticket.target_ms,
            },
            None,
        );
        Ok(())
    }

    /// Seek to a percentage (0-100) of the track
    pub fn seek_percent(&self, percent: f64) -> Result<(), CoreError> {
        let target = self
            .inner
            .state
            .lock()
            .percent_target(percent)
            .ok_or(CoreError::NothingPlaying)?;
        self.seek(target)
    }

    /// Seek relative to the displayed position
    pub fn seek_by(&self, delta_ms: i64) -> Result<(), CoreError> {
        let current = self.inner.state.lock().display_ms();
        self.seek(current.saturating_add_signed(delta_ms))
    }

    /// The user grabbed the timeline; polls stop moving the display
    pub fn begin_drag(&self) {
        self.inner.state.lock().begin_drag();
        self.inner.refresh_ticker();
    }

    pub fn drag_to(&self, position_ms: u64) {
        self.inner.state.lock().drag_to(position_ms);
        self.inner.emit_state();
    }

    /// Release the timeline at `position_ms`
    pub fn end_drag(&self, position_ms: u64) -> Result<(), CoreError> {
        let result = self.seek(position_ms);
        if result.is_err() {
            self.cancel_drag();
        }
        result
    }

    pub fn cancel_drag(&self) {
        self.inner.state.lock().cancel_drag();
        self.inner.refresh_ticker();
        self.inner.emit_state();
    }

    // ---- optimistic controls ----

    pub fn toggle_shuffle(&self) -> Result<bool, CoreError> {
        let guild_id = self.inner.require_guild()?;
        let enabled = self.inner.state.lock().controls_mut().toggle_shuffle();
        self.inner.emit_state();
        self.inner
            .dispatch(guild_id, ControlAction::Shuffle { enabled }, None);
        Ok(enabled)
    }

    pub fn cycle_repeat(&self) -> Result<crate::api::RepeatMode, CoreError> {
        let guild_id = self.inner.require_guild()?;
        let mode = self.inner.state.lock().controls_mut().cycle_repeat();
        self.inner.emit_state();
        self.inner.dispatch(guild_id, ControlAction::Repeat { mode }, None);
        Ok(mode)
    }

    pub fn select_filter(&self, filter: AudioFilter) -> Result<(), CoreError> {
        let guild_id = self.inner.require_guild()?;
        self.inner.state.lock().controls_mut().select_filter(filter);
        self.inner.emit_state();
        self.inner
            .dispatch(guild_id, ControlAction::Filter { filter }, None);
        Ok(())
    }

    /// Select the filter after the current one
    pub fn cycle_filter(&self) -> Result<AudioFilter, CoreError> {
        let next = self.inner.state.lock().controls().filter.next();
        self.select_filter(next)?;
        Ok(next)
    }

    /// Mute or unmute. Returns the volume level sent.
    pub fn toggle_mute(&self) -> Result<u8, CoreError> {
        let guild_id = self.inner.require_guild()?;
        let level = self.inner.state.lock().controls_mut().toggle_mute();
        // a pending slider value would undo the mute
        self.inner.tasks.lock().volume = None;
        self.inner.emit_state();
        self.inner
            .dispatch(guild_id, ControlAction::Volume { level }, Some(MUTE_FOLLOW_UP));
        Ok(level)
    }

    /// Set the volume. Rapid changes coalesce into one command.
    pub fn set_volume(&self, level: u8) -> Result<(), CoreError> {
        let guild_id = self.inner.require_guild()?;
        self.inner.state.lock().controls_mut().set_volume(level);
        self.inner.emit_state();

        let inner = Arc::clone(&self.inner);
        let debounce = self.inner.config.volume_debounce();
        let task = TaskHandle::spawn("volume-debounce", async move {
            tokio::time::sleep(debounce).await;
            let pending = inner.state.lock().controls_mut().take_pending_volume();
            if let Some(level) = pending {
                inner.dispatch(guild_id, ControlAction::Volume { level }, None);
            }
        });

        // replacing the handle cancels the previous debounce
        self.inner.tasks.lock().volume = Some(task);
        Ok(())
    }

    /// Nudge the volume by `delta` points
    pub fn adjust_volume(&self, delta: i16) -> Result<u8, CoreError> {
        let current = self.inner.state.lock().controls().volume;
        let level = (current as i16 + delta).clamp(0, 100) as u8;
        self.set_volume(level)?;
        Ok(level)
    }

    // ---- transport ----

    /// Resume playback, or search and enqueue `query`
    pub fn play(&self, query: Option<String>) -> Result<(), CoreError> {
        let query = query.map(|q| q.trim().to_string()).filter(|q| !q.is_empty());
        self.transport(ControlAction::Play { query }, Duration::ZERO)
    }

    pub fn pause(&self) -> Result<(), CoreError> {
        self.transport(ControlAction::Pause, self.inner.config.follow_up_poll())
    }

    pub fn resume(&self) -> Result<(), CoreError> {
        self.transport(ControlAction::Resume, self.inner.config.follow_up_poll())
    }

    /// Pause when playing, resume when paused
    pub fn toggle_pause(&self) -> Result<(), CoreError> {
        if self.inner.state.lock().snapshot().is_paused {
            self.resume()
        } else {
            self.pause()
        }
    }

    pub fn skip(&self) -> Result<(), CoreError> {
        self.transport(ControlAction::Skip, self.inner.config.follow_up_poll())
    }

    pub fn previous(&self) -> Result<(), CoreError> {
        self.transport(ControlAction::Previous, self.inner.config.follow_up_poll())
    }

    /// Remove a queued track
    pub fn remove(&self, index: usize) -> Result<(), CoreError> {
        self.transport(ControlAction::Remove { index }, self.inner.config.follow_up_poll())
    }

    /// Move a queued track to the front
    pub fn play_next(&self, index: usize) -> Result<(), CoreError> {
        self.transport(ControlAction::PlayNext { index }, self.inner.config.follow_up_poll())
    }

    fn transport(&self, action: ControlAction, follow_up: Duration) -> Result<(), CoreError> {
        let guild_id = self.inner.require_guild()?;
        self.inner.dispatch(guild_id, action, Some(follow_up));
        Ok(())
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    pub(super) fn require_guild(&self) -> Result<String, CoreError> {
        self.guild.read().clone().ok_or(CoreError::NoGuildSelected)
    }

    pub(super) fn callback(&self) -> Option<Arc<dyn SessionCallback>> {
        self.callback.read().clone()
    }

    pub(super) fn emit_state(&self) {
        if let Some(cb) = self.callback() {
            let view = self.state.lock().view();
            cb.on_state_changed(view);
        }
    }

    /// Wake or park the ticker to match the state
    pub(super) fn refresh_ticker(&self) {
        let active = self.state.lock().is_extrapolating(Instant::now());
        self.extrapolating.send_if_modified(|current| {
            let changed = *current != active;
            *current = active;
            changed
        });
    }

    /// Switch guilds: reset state and restart the guild-scoped tasks
    pub(super) fn switch_guild(self: &Arc<Self>, guild_id: Option<String>) {
        {
            let mut current = self.guild.write();
            if *current == guild_id {
                return;
            }
            *current = guild_id.clone();
        }

        info!("Selected guild: {:?}", guild_id);
        self.state.lock().reset();

        {
            let mut tasks = self.tasks.lock();
            tasks.clear_guild_scoped();

            if let Some(id) = &guild_id {
                if self.running.load(Ordering::SeqCst) {
                    self.spawn_guild_tasks(&mut tasks, id);
                }
            }
        }

        self.refresh_ticker();
        if let Some(cb) = self.callback() {
            let view = self.state.lock().view();
            cb.on_guild_selected(guild_id);
            cb.on_state_changed(view);
        }
    }

    fn spawn_guild_tasks(self: &Arc<Self>, tasks: &mut SessionTasks, guild_id: &str) {
        tasks.push = Some(self.spawn_push(guild_id));
        tasks.queue = Some(self.spawn_queue_poll(guild_id.to_string()));
    }

    fn spawn_push(self: &Arc<Self>, guild_id: &str) -> TaskHandle {
        let url = self.client_config.push_url(guild_id);
        let listener = PushListener::new(
            Arc::clone(&self.connector),
            url,
            self.config.reconnect_delay(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let inner = Arc::clone(self);

        TaskHandle::spawn("push", async move {
            let handle_signals = async {
                while let Some(signal) = rx.recv().await {
                    inner.handle_push_signal(signal);
                }
            };
            tokio::join!(listener.run(tx), handle_signals);
        })
    }

    fn spawn_queue_poll(self: &Arc<Self>, guild_id: String) -> TaskHandle {
        let inner = Arc::clone(self);
        TaskHandle::spawn("queue-poll", async move {
            let mut ticks = tokio::time::interval(inner.config.queue_poll_interval());
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                inner.poll_queue(&guild_id).await;
            }
        })
    }

    /// Poll once after `delay`, replacing any follow-up already scheduled.
    /// Does nothing once the session is shut down.
    pub(super) fn schedule_follow_up(self: &Arc<Self>, delay: Duration) {
        let mut tasks = self.tasks.lock();
        if !self.running.load(Ordering::SeqCst) {
            debug!("Session stopped, skipping follow-up poll");
            return;
        }

        let inner = Arc::clone(self);
        let previous = tasks.follow_up.replace(TaskHandle::spawn("follow-up-poll", async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            inner.poll_once().await;
        }));
        drop(tasks);
        drop(previous);
    }

    /// Send a command without blocking the caller.
    ///
    /// Failures are reported through the callback and never rolled back;
    /// the next poll corrects any optimistic state. `shutdown` cancels
    /// commands still in flight.
    pub(super) fn dispatch(self: &Arc<Self>, guild_id: String, action: ControlAction, follow_up: Option<Duration>) {
        let inner = Arc::clone(self);
        let task = TaskHandle::spawn("command", async move {
            match inner.backend.control(&guild_id, &action).await {
                Ok(()) => debug!("Control {} sent to guild {}", action.name(), guild_id),
                Err(e) => {
                    warn!("Control {} for guild {} failed: {}", action.name(), guild_id, e);
                    if let Some(cb) = inner.callback() {
                        cb.on_error("Failed to control player".to_string());
                    }
                }
            }

            if let Some(delay) = follow_up {
                inner.schedule_follow_up(delay);
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.commands.retain(|t| !t.is_finished());
        tasks.commands.push(task);
    }
}

/// Full-state polling on a fixed interval
async fn run_poll_loop(inner: Arc<Inner>) {
    let mut ticks = tokio::time::interval(inner.config.poll_interval());
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        inner.poll_once().await;
    }
}

/// Local extrapolation; parks while nothing is playing
async fn run_ticker(inner: Arc<Inner>) {
    let mut active = inner.extrapolating.subscribe();
    let mut ticks = tokio::time::interval(inner.config.tick_interval());
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut correction = tokio::time::interval(inner.config.correction_interval());
    correction.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick of an interval completes immediately
    correction.tick().await;

    loop {
        if !*active.borrow_and_update() {
            debug!("Extrapolation parked");
            if active.changed().await.is_err() {
                return;
            }
            debug!("Extrapolation resumed");
            ticks.reset();
            correction.reset();
            continue;
        }

        tokio::select! {
            _ = ticks.tick() => {
                let (added, position) = {
                    let mut state = inner.state.lock();
                    (state.tick(Instant::now()), state.display_ms())
                };
                if added > 0 {
                    if let Some(cb) = inner.callback() {
                        cb.on_position_changed(position);
                    }
                }
            }
            _ = correction.tick() => {
                let corrected = {
                    let mut state = inner.state.lock();
                    state.correct(Instant::now()).then(|| state.display_ms())
                };
                if let Some(position) = corrected {
                    debug!("Drift correction to {}ms", position);
                    if let Some(cb) = inner.callback() {
                        cb.on_position_changed(position);
                    }
                }
            }
            changed = active.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}
