//! Local position extrapolation

use tokio::time::Instant;

/// The position shown to the user, advanced locally between snapshots
#[derive(Debug, Clone, Default)]
pub struct DisplayPosition {
    value_ms: u64,
    /// Time of the last extrapolation step; `None` while halted
    last_tick_at: Option<Instant>,
}

impl DisplayPosition {
    pub fn new(value_ms: u64) -> Self {
        Self {
            value_ms,
            last_tick_at: None,
        }
    }

    pub fn value_ms(&self) -> u64 {
        self.value_ms
    }

    /// Whether a baseline is held (the extrapolator is running)
    pub fn is_ticking(&self) -> bool {
        self.last_tick_at.is_some()
    }

    /// Advance by the real time elapsed since the previous step.
    ///
    /// The first step after a halt only records the baseline. `limit_ms`
    /// caps the value (the track duration). Returns the amount added.
    pub fn tick(&mut self, now: Instant, limit_ms: Option<u64>) -> u64 {
        let Some(last) = self.last_tick_at.replace(now) else {
            return 0;
        };

        let elapsed = now.saturating_duration_since(last).as_millis() as u64;
        let mut next = self.value_ms.saturating_add(elapsed);
        if let Some(limit) = limit_ms {
            next = next.min(limit.max(self.value_ms));
        }

        let added = next - self.value_ms;
        self.value_ms = next;
        added
    }

    /// Drop the baseline so paused time is never credited
    pub fn halt(&mut self) {
        self.last_tick_at = None;
    }

    /// Overwrite the value (track change, seek, sync with a snapshot).
    ///
    /// The baseline is kept: the next step adds only time that passed
    /// after the previous step.
    pub fn force(&mut self, value_ms: u64) {
        self.value_ms = value_ms;
    }
}

/// Format milliseconds as `m:ss`, or `h:mm:ss` past an hour
pub fn format_time(ms: u64) -> String {
    let total_secs = ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_tick_sets_baseline() {
        let mut pos = DisplayPosition::new(1_000);
        let t0 = Instant::now();
        assert_eq!(pos.tick(t0, None), 0);
        assert_eq!(pos.value_ms(), 1_000);
        assert!(pos.is_ticking());
    }

    #[test]
    fn test_tick_adds_real_elapsed_time() {
        let mut pos = DisplayPosition::new(0);
        let t0 = Instant::now();
        pos.tick(t0, None);

        // jittery ticks: the delta comes from timestamps, not the cadence
        assert_eq!(pos.tick(t0 + Duration::from_millis(50), None), 50);
        assert_eq!(pos.tick(t0 + Duration::from_millis(137), None), 87);
        assert_eq!(pos.tick(t0 + Duration::from_millis(1_137), None), 1_000);
        assert_eq!(pos.value_ms(), 1_137);
    }

    #[test]
    fn test_halt_discards_paused_time() {
        let mut pos = DisplayPosition::new(0);
        let t0 = Instant::now();
        pos.tick(t0, None);
        pos.tick(t0 + Duration::from_millis(100), None);
        pos.halt();

        // 10s later, resume: nothing credited for the pause
        assert_eq!(pos.tick(t0 + Duration::from_secs(10), None), 0);
        assert_eq!(pos.value_ms(), 100);
        assert_eq!(pos.tick(t0 + Duration::from_millis(10_050), None), 50);
    }

    #[test]
    fn test_tick_capped_at_limit() {
        let mut pos = DisplayPosition::new(9_990);
        let t0 = Instant::now();
        pos.tick(t0, Some(10_000));
        assert_eq!(pos.tick(t0 + Duration::from_millis(500), Some(10_000)), 10);
        assert_eq!(pos.value_ms(), 10_000);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(65_432), "1:05");
        assert_eq!(format_time(3_725_000), "1:02:05");
    }
}
