//! Playback completion detection.
//!
//! The playback clock has no "wait until timestamp" primitive, so
//! completion is detected by cooperatively polling the clock against the
//! session's `next_play_time` cursor.

use std::time::{Duration, Instant};

use tracing::debug;

/// Poll interval for the completion check.
pub const COMPLETION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tolerance subtracted from the cursor when testing for completion.
pub const COMPLETION_TOLERANCE_SECS: f64 = 0.1;

/// A monotonically advancing playback clock, measured in seconds.
pub trait PlaybackClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall-time playback clock backed by [`Instant`].
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Test whether all scheduled audio has finished playing.
pub fn is_playback_complete(clock_now: f64, next_play_time: f64) -> bool {
    clock_now >= next_play_time - COMPLETION_TOLERANCE_SECS
}

/// Poll the clock until everything scheduled up to `next_play_time` has
/// played out, then return.
pub async fn wait_for_completion(clock: &dyn PlaybackClock, next_play_time: f64) {
    loop {
        let now = clock.now();
        if is_playback_complete(now, next_play_time) {
            debug!(now, next_play_time, "Playback complete");
            return;
        }
        tokio::time::sleep(COMPLETION_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock that advances a fixed step on every read.
    struct SteppingClock {
        ticks: AtomicU64,
        step: f64,
    }

    impl PlaybackClock for SteppingClock {
        fn now(&self) -> f64 {
            self.ticks.fetch_add(1, Ordering::SeqCst) as f64 * self.step
        }
    }

    #[test]
    fn test_complete_within_tolerance() {
        // 0.3s scheduled, clock at 0.2s: complete due to the 0.1s tolerance.
        assert!(is_playback_complete(0.2, 0.3));
        assert!(is_playback_complete(0.3, 0.3));
        assert!(is_playback_complete(1.0, 0.3));
    }

    #[test]
    fn test_not_complete_before_tolerance() {
        assert!(!is_playback_complete(0.0, 0.3));
        assert!(!is_playback_complete(0.19, 0.3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_polls_until_complete() {
        let clock = SteppingClock {
            ticks: AtomicU64::new(0),
            step: 0.1,
        };
        // Completes after a few polls, once the clock passes 0.3 - 0.1.
        wait_for_completion(&clock, 0.3).await;
        assert!(clock.ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_system_clock_advances() {
        let clock = SystemClock::new();
        let first = clock.now();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(clock.now() > first);
    }
}
