//! Stepped seek negotiation
//!
//! Relative seeking works in gestures: each skip press grows (or
//! shrinks) a step taken from a fixed table, and the accumulated target
//! is committed only after the user has been quiet for the debounce
//! interval. The commit happens cooperatively on the engine tick; no
//! timer thread is involved. `Instant` is always passed in by the
//! caller so tests never sleep.
//!
//! Targets are computed from the position at the first gesture, not
//! the position at commit time, so playback drifting during the quiet
//! period (bounded by the debounce) never moves an on-screen target
//! the user already accepted.

use std::time::{Duration, Instant};

/// Seek step sizes, index 0 is "no movement".
pub const STEP_TABLE: [Duration; 11] = [
    Duration::ZERO,
    Duration::from_secs(15),
    Duration::from_secs(30),
    Duration::from_secs(60),
    Duration::from_secs(3 * 60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(10 * 60),
    Duration::from_secs(15 * 60),
    Duration::from_secs(30 * 60),
    Duration::from_secs(60 * 60),
    Duration::from_secs(2 * 60 * 60),
];

/// Quiet period after the last gesture before the target is committed.
pub const SEEK_DEBOUNCE: Duration = Duration::from_secs(1);

/// Distance kept from the end of the media when a seek clamps there,
/// so the graph does not immediately signal completion.
pub const END_GUARD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    Forward,
    Backward,
}

/// Snapshot of the pending gesture sequence, for on-screen feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekStatus {
    /// Where playback will resume if no further gesture arrives.
    pub target: Duration,
    /// The step currently applied, zero at index 0.
    pub step: Duration,
    pub direction: SeekDirection,
    /// Target clamped at the start of the media.
    pub reached_start: bool,
    /// Target clamped at the end of the media.
    pub reached_end: bool,
}

#[derive(Debug)]
struct PendingSeek {
    /// Playback position when the gesture sequence began.
    anchor: Duration,
    direction: SeekDirection,
    step_index: usize,
    last_gesture: Instant,
    reached_start: bool,
    reached_end: bool,
}

/// Collapses bursts of skip gestures into a single committed seek.
#[derive(Debug, Default)]
pub struct SeekNegotiator {
    pending: Option<PendingSeek>,
}

impl SeekNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a skip gesture.
    ///
    /// `position` is the current playback position (ignored while a
    /// sequence is already pending; the sequence keeps its original
    /// anchor). Returns `None` when the gesture cancelled the sequence
    /// by walking back past step zero.
    pub fn on_gesture(
        &mut self,
        direction: SeekDirection,
        position: Duration,
        duration: Duration,
        now: Instant,
    ) -> Option<SeekStatus> {
        let pending = self.pending.get_or_insert_with(|| PendingSeek {
            anchor: position,
            direction,
            step_index: 0,
            last_gesture: now,
            reached_start: false,
            reached_end: false,
        });
        pending.last_gesture = now;

        if direction == pending.direction {
            // Live streams report no duration; the target may not move
            // forward past the anchor.
            let blocked = direction == SeekDirection::Forward && duration.is_zero();
            if !blocked && pending.step_index + 1 < STEP_TABLE.len() {
                // Once the clamp is in effect, further presses in the
                // same direction keep the index where it is; only the
                // first press may step into the clamp.
                let next = STEP_TABLE[pending.step_index + 1];
                let in_range = match direction {
                    SeekDirection::Forward => pending.anchor + next <= duration,
                    SeekDirection::Backward => pending.anchor.checked_sub(next).is_some(),
                };
                if pending.step_index == 0 || in_range {
                    pending.step_index += 1;
                }
            }
        } else if pending.step_index > 0 {
            pending.step_index -= 1;
        } else {
            // Walked back past step zero: the whole sequence is off.
            tracing::debug!("seek gesture sequence cancelled");
            self.pending = None;
            return None;
        }

        let status = Self::status_of(pending, duration);
        pending.reached_start = status.reached_start;
        pending.reached_end = status.reached_end;
        Some(status)
    }

    /// Called from the engine tick. Returns the position to seek to
    /// once the debounce interval has elapsed, clearing the sequence.
    pub fn on_idle_tick(&mut self, duration: Duration, now: Instant) -> Option<Duration> {
        let pending = self.pending.as_ref()?;
        if now.duration_since(pending.last_gesture) < SEEK_DEBOUNCE {
            return None;
        }
        let status = Self::status_of(pending, duration);
        self.pending = None;
        tracing::debug!("committing seek to {:?}", status.target);
        Some(status.target)
    }

    /// Abandon the pending sequence without seeking.
    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            tracing::debug!("pending seek abandoned");
        }
    }

    pub fn is_seeking(&self) -> bool {
        self.pending.is_some()
    }

    /// Current sequence state, if one is pending.
    pub fn status(&self, duration: Duration) -> Option<SeekStatus> {
        self.pending.as_ref().map(|p| Self::status_of(p, duration))
    }

    fn status_of(pending: &PendingSeek, duration: Duration) -> SeekStatus {
        let step = STEP_TABLE[pending.step_index];
        let (raw, reached_start) = match pending.direction {
            SeekDirection::Forward => (pending.anchor + step, false),
            SeekDirection::Backward => match pending.anchor.checked_sub(step) {
                Some(t) => (t, t.is_zero() && !step.is_zero()),
                None => (Duration::ZERO, true),
            },
        };

        let reached_end = !duration.is_zero() && raw >= duration;
        let target = if reached_end {
            duration.saturating_sub(END_GUARD)
        } else {
            raw
        };

        SeekStatus {
            target,
            step,
            direction: pending.direction,
            reached_start,
            reached_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_forward_steps_grow_through_table() {
        let mut neg = SeekNegotiator::new();
        let t0 = Instant::now();
        let duration = secs(4 * 3600);

        let expected = [15, 30, 60, 180, 300, 600, 900, 1800, 3600, 7200];
        for (i, &step_secs) in expected.iter().enumerate() {
            let status = neg
                .on_gesture(SeekDirection::Forward, secs(10), duration, t0)
                .unwrap();
            assert_eq!(status.step, secs(step_secs), "press {}", i + 1);
            assert_eq!(status.target, secs(10 + step_secs));
        }

        // Table exhausted, further presses stay at the largest step.
        let status = neg
            .on_gesture(SeekDirection::Forward, secs(10), duration, t0)
            .unwrap();
        assert_eq!(status.step, secs(7200));
    }

    #[test]
    fn test_anchor_is_fixed_at_first_gesture() {
        let mut neg = SeekNegotiator::new();
        let t0 = Instant::now();
        neg.on_gesture(SeekDirection::Forward, secs(100), secs(3600), t0);
        // Position has moved on, but the sequence still anchors at 100s.
        let status = neg
            .on_gesture(SeekDirection::Forward, secs(107), secs(3600), t0)
            .unwrap();
        assert_eq!(status.target, secs(100 + 30));
    }

    #[test]
    fn test_commit_only_after_debounce() {
        let mut neg = SeekNegotiator::new();
        let t0 = Instant::now();
        neg.on_gesture(SeekDirection::Forward, MINUTE, secs(3600), t0);

        assert_eq!(neg.on_idle_tick(secs(3600), t0 + Duration::from_millis(500)), None);

        // Another gesture restarts the quiet period.
        neg.on_gesture(SeekDirection::Forward, MINUTE, secs(3600), t0 + Duration::from_millis(900));
        assert_eq!(neg.on_idle_tick(secs(3600), t0 + Duration::from_millis(1500)), None);

        let committed = neg.on_idle_tick(secs(3600), t0 + Duration::from_millis(1900));
        assert_eq!(committed, Some(MINUTE + secs(30)));
        assert!(!neg.is_seeking());
        assert_eq!(neg.on_idle_tick(secs(3600), t0 + secs(10)), None);
    }

    #[test]
    fn test_end_clamp_commits_just_before_end() {
        let mut neg = SeekNegotiator::new();
        let t0 = Instant::now();

        // 15s forward from 58s in a 60s clip overshoots the end.
        let status = neg
            .on_gesture(SeekDirection::Forward, secs(58), secs(60), t0)
            .unwrap();
        assert!(status.reached_end);
        assert_eq!(status.target, secs(60) - END_GUARD);

        let committed = neg.on_idle_tick(secs(60), t0 + SEEK_DEBOUNCE);
        assert_eq!(committed, Some(Duration::from_millis(59_900)));
    }

    #[test]
    fn test_out_of_range_presses_do_not_advance_step() {
        let mut neg = SeekNegotiator::new();
        let t0 = Instant::now();

        // 15s forward from 50s in a 60s clip already overshoots.
        let status = neg
            .on_gesture(SeekDirection::Forward, secs(50), secs(60), t0)
            .unwrap();
        assert!(status.reached_end);
        assert_eq!(status.step, secs(15));

        // Further forward presses keep the step where it is.
        let status = neg
            .on_gesture(SeekDirection::Forward, secs(50), secs(60), t0)
            .unwrap();
        assert_eq!(status.step, secs(15));

        // So a single backward press is back at the anchor.
        let status = neg
            .on_gesture(SeekDirection::Backward, secs(50), secs(60), t0)
            .unwrap();
        assert_eq!(status.step, Duration::ZERO);

        let committed = neg.on_idle_tick(secs(60), t0 + SEEK_DEBOUNCE);
        assert_eq!(committed, Some(secs(50)));
    }

    #[test]
    fn test_start_clamp_commits_zero() {
        let mut neg = SeekNegotiator::new();
        let t0 = Instant::now();

        let status = neg
            .on_gesture(SeekDirection::Backward, secs(10), secs(3600), t0)
            .unwrap();
        assert!(status.reached_start);
        assert_eq!(status.target, Duration::ZERO);

        assert_eq!(neg.on_idle_tick(secs(3600), t0 + SEEK_DEBOUNCE), Some(Duration::ZERO));
    }

    #[test]
    fn test_opposite_direction_walks_back_and_cancels() {
        let mut neg = SeekNegotiator::new();
        let t0 = Instant::now();
        let duration = secs(3600);

        neg.on_gesture(SeekDirection::Forward, MINUTE, duration, t0);
        neg.on_gesture(SeekDirection::Forward, MINUTE, duration, t0);
        let status = neg
            .on_gesture(SeekDirection::Backward, MINUTE, duration, t0)
            .unwrap();
        assert_eq!(status.step, secs(15));
        assert_eq!(status.direction, SeekDirection::Forward);

        // Back to step zero, then one more backward press cancels.
        let status = neg
            .on_gesture(SeekDirection::Backward, MINUTE, duration, t0)
            .unwrap();
        assert_eq!(status.step, Duration::ZERO);
        assert_eq!(neg.on_gesture(SeekDirection::Backward, MINUTE, duration, t0), None);
        assert!(!neg.is_seeking());
        assert_eq!(neg.on_idle_tick(duration, t0 + secs(5)), None);
    }

    #[test]
    fn test_zero_duration_blocks_forward_advance() {
        let mut neg = SeekNegotiator::new();
        let t0 = Instant::now();

        let status = neg
            .on_gesture(SeekDirection::Forward, MINUTE, Duration::ZERO, t0)
            .unwrap();
        assert_eq!(status.step, Duration::ZERO);
        assert_eq!(status.target, MINUTE);

        // Backward stepping still works without a known duration.
        let mut neg = SeekNegotiator::new();
        let status = neg
            .on_gesture(SeekDirection::Backward, MINUTE, Duration::ZERO, t0)
            .unwrap();
        assert_eq!(status.step, secs(15));
        assert_eq!(status.target, secs(45));
    }

    #[test]
    fn test_cancel_discards_pending_target() {
        let mut neg = SeekNegotiator::new();
        let t0 = Instant::now();
        neg.on_gesture(SeekDirection::Forward, MINUTE, secs(3600), t0);
        assert!(neg.is_seeking());

        neg.cancel();
        assert!(!neg.is_seeking());
        assert_eq!(neg.on_idle_tick(secs(3600), t0 + secs(5)), None);
    }
}
