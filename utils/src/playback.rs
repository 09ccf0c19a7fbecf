//! Gapless sequencing of decoded speech buffers.
//!
//! The scheduler only does the arithmetic on the output clock; the device
//! endpoint that actually renders the buffers lives in [`crate::device`].

use std::collections::BTreeSet;

/// Handle identifying one scheduled buffer.
pub type PlaybackId = u64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledPlayback {
    pub id: PlaybackId,
    /// Start time on the output clock, in seconds.
    pub start: f64,
    /// End time on the output clock, in seconds.
    pub end: f64,
}

/// Serializes buffers of arbitrary length into non-overlapping slots.
///
/// Each buffer starts at `max(next_start_time, now)`; the cursor then moves
/// to the end of that buffer. A late buffer leaves a gap, never an overlap.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start_time: f64,
    next_id: PlaybackId,
    active: BTreeSet<PlaybackId>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, duration: f64, now: f64) -> ScheduledPlayback {
        let start = self.next_start_time.max(now);
        let end = start + duration.max(0.0);
        self.next_start_time = end;

        let id = self.next_id;
        self.next_id += 1;
        self.active.insert(id);

        tracing::trace!(id, start, end, "scheduled playback");
        ScheduledPlayback { id, start, end }
    }

    /// Forgets a handle once its buffer finished playing.
    pub fn complete(&mut self, id: PlaybackId) {
        self.active.remove(&id);
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, id: PlaybackId) -> bool {
        self.active.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn back_to_back_buffers_are_gapless() {
        let mut scheduler = PlaybackScheduler::new();
        let a = scheduler.schedule(0.5, 0.0);
        let b = scheduler.schedule(0.25, 0.1);
        assert_eq!(a.start, 0.0);
        assert_eq!(b.start, a.end);
        assert_eq!(scheduler.next_start_time(), 0.75);
    }

    #[test]
    fn late_buffer_leaves_gap() {
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(0.5, 0.0);
        let late = scheduler.schedule(0.5, 2.0);
        assert_eq!(late.start, 2.0);
        assert_eq!(late.end, 2.5);
    }

    #[test]
    fn completed_handles_are_released() {
        let mut scheduler = PlaybackScheduler::new();
        let a = scheduler.schedule(0.1, 0.0);
        let b = scheduler.schedule(0.1, 0.0);
        assert_eq!(scheduler.active(), 2);

        scheduler.complete(a.id);
        scheduler.complete(a.id);
        scheduler.complete(999);
        assert_eq!(scheduler.active(), 1);
        assert!(scheduler.is_active(b.id));

        scheduler.complete(b.id);
        assert_eq!(scheduler.active(), 0);
    }

    proptest! {
        #[test]
        fn starts_never_decrease_and_never_overlap(
            arrivals in prop::collection::vec((0.0f64..0.5, 0.0f64..2.0), 1..64)
        ) {
            let mut scheduler = PlaybackScheduler::new();
            let mut now = 0.0;
            let mut previous: Option<ScheduledPlayback> = None;
            for (duration, advance) in arrivals {
                now += advance;
                let slot = scheduler.schedule(duration, now);
                prop_assert!(slot.start >= now);
                if let Some(prev) = previous {
                    prop_assert!(slot.start >= prev.start);
                    prop_assert!(slot.start >= prev.end);
                }
                previous = Some(slot);
            }
        }
    }
}
