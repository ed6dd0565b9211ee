//! Seek intent tracking
//!
//! A seek moves the displayed position immediately, but the backend takes
//! a moment to act on it and polls already in flight still report the old
//! position. The intent keeps those stale positions from snapping the
//! display back until the backend confirms the target or the intent
//! expires.

use std::time::Duration;

use tokio::time::Instant;

/// Lifecycle of a seek
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekState {
    /// Waiting for a snapshot near the target
    Pending,
    /// A snapshot within tolerance arrived
    Confirmed,
    /// Released without confirmation
    Expired,
}

/// An in-flight user seek
#[derive(Debug, Clone)]
pub struct SeekIntent {
    pub target_ms: u64,
    pub submitted_at: Instant,
    pub state: SeekState,
    /// Identifies this seek to its timers
    pub generation: u64,
    /// Set when the short suppression window was ended early by its timer
    resumed: bool,
}

impl SeekIntent {
    pub fn is_pending(&self) -> bool {
        self.state == SeekState::Pending
    }

    /// Whether `position_ms` is close enough to the target to confirm it
    pub fn matches(&self, position_ms: u64, tolerance_ms: u64) -> bool {
        position_ms.abs_diff(self.target_ms) < tolerance_ms
    }

    /// Extrapolation is suppressed for a short window after the seek
    pub fn suppresses_ticking(&self, now: Instant, resume_after: Duration) -> bool {
        self.is_pending()
            && !self.resumed
            && now.saturating_duration_since(self.submitted_at) < resume_after
    }

    pub fn is_due_to_expire(&self, now: Instant, expiry: Duration) -> bool {
        self.is_pending() && now.saturating_duration_since(self.submitted_at) >= expiry
    }
}

/// Returned by [`SeekCoordinator::submit`] so the caller can arm timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekTicket {
    pub generation: u64,
    pub target_ms: u64,
}

/// Owns the current seek intent. Newer seeks replace older ones outright.
#[derive(Debug, Default)]
pub struct SeekCoordinator {
    intent: Option<SeekIntent>,
    next_generation: u64,
}

impl SeekCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current intent in any state
    pub fn intent(&self) -> Option<&SeekIntent> {
        self.intent.as_ref()
    }

    /// Current intent if it is still pending
    pub fn pending(&self) -> Option<&SeekIntent> {
        self.intent.as_ref().filter(|i| i.is_pending())
    }

    pub fn is_pending(&self) -> bool {
        self.pending().is_some()
    }

    /// Register a new seek, superseding any earlier one
    pub fn submit(&mut self, target_ms: u64, now: Instant) -> SeekTicket {
        self.next_generation += 1;
        let generation = self.next_generation;

        if let Some(old) = self.pending() {
            tracing::debug!(
                "Seek to {}ms supersedes pending seek to {}ms",
                target_ms,
                old.target_ms
            );
        }

        self.intent = Some(SeekIntent {
            target_ms,
            submitted_at: now,
            state: SeekState::Pending,
            generation,
            resumed: false,
        });

        SeekTicket { generation, target_ms }
    }

    /// Whether extrapolation is held back by a recent seek
    pub fn suppresses_ticking(&self, now: Instant, resume_after: Duration) -> bool {
        self.intent
            .as_ref()
            .is_some_and(|i| i.suppresses_ticking(now, resume_after))
    }

    /// End the short suppression window. No-op for a superseded seek.
    pub fn resume(&mut self, generation: u64) -> bool {
        match self.intent.as_mut() {
            Some(intent) if intent.generation == generation && intent.is_pending() => {
                intent.resumed = true;
                true
            }
            _ => false,
        }
    }

    /// Release a pending intent unconditionally. No-op for a superseded seek.
    pub fn expire(&mut self, generation: u64) -> bool {
        match self.intent.as_mut() {
            Some(intent) if intent.generation == generation && intent.is_pending() => {
                intent.state = SeekState::Expired;
                tracing::debug!("Seek to {}ms expired unconfirmed", intent.target_ms);
                true
            }
            _ => false,
        }
    }

    /// Expire the pending intent if its time is up. Returns true if it expired.
    pub fn expire_if_due(&mut self, now: Instant, expiry: Duration) -> bool {
        match self.intent.as_ref() {
            Some(intent) if intent.is_due_to_expire(now, expiry) => {
                let generation = intent.generation;
                self.expire(generation)
            }
            _ => false,
        }
    }

    /// Confirm the pending intent if `position_ms` is within tolerance
    pub fn confirm_if_matches(&mut self, position_ms: u64, tolerance_ms: u64) -> bool {
        match self.intent.as_mut() {
            Some(intent) if intent.is_pending() && intent.matches(position_ms, tolerance_ms) => {
                intent.state = SeekState::Confirmed;
                tracing::debug!(
                    "Seek to {}ms confirmed by position {}ms",
                    intent.target_ms,
                    position_ms
                );
                true
            }
            _ => false,
        }
    }

    /// Drop any intent (track changed, guild changed)
    pub fn clear(&mut self) -> Option<SeekIntent> {
        self.intent.take()
    }
}
