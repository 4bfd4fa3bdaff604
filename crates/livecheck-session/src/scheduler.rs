//! Frame admission: minimum inter-frame interval plus drop-if-busy.

use std::time::{Duration, Instant};

/// Why a submitted frame was or was not handed to the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Arrived sooner than the minimum interval after the last accepted frame.
    Throttled,
    /// An analysis was already in flight.
    Busy,
    /// The session is shutting down.
    Closed,
}

/// Decides which camera frames get analyzed.
///
/// Throttling is measured from the last *accepted* frame; dropped frames do
/// not push the window forward.
pub struct FrameScheduler {
    min_interval: Duration,
    last_accepted: Option<Instant>,
    accepted: u64,
    dropped: u64,
}

impl FrameScheduler {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: None,
            accepted: 0,
            dropped: 0,
        }
    }

    pub fn admit(&mut self, now: Instant, busy: bool) -> Admission {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.min_interval {
                self.dropped += 1;
                return Admission::Throttled;
            }
        }
        if busy {
            self.dropped += 1;
            return Admission::Busy;
        }
        self.last_accepted = Some(now);
        self.accepted += 1;
        Admission::Accepted
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_accepted() {
        let mut s = FrameScheduler::new(Duration::from_millis(400));
        assert_eq!(s.admit(Instant::now(), false), Admission::Accepted);
    }

    #[test]
    fn test_throttles_within_interval() {
        let mut s = FrameScheduler::new(Duration::from_millis(400));
        let t0 = Instant::now();
        assert_eq!(s.admit(t0, false), Admission::Accepted);
        assert_eq!(s.admit(t0 + Duration::from_millis(399), false), Admission::Throttled);
        assert_eq!(s.admit(t0 + Duration::from_millis(400), false), Admission::Accepted);
        assert_eq!(s.accepted(), 2);
        assert_eq!(s.dropped(), 1);
    }

    #[test]
    fn test_busy_drop_does_not_reset_window() {
        let mut s = FrameScheduler::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert_eq!(s.admit(t0, false), Admission::Accepted);
        assert_eq!(s.admit(t0 + Duration::from_millis(150), true), Admission::Busy);
        assert_eq!(s.admit(t0 + Duration::from_millis(160), false), Admission::Accepted);
    }

    #[test]
    fn test_zero_interval_only_drops_when_busy() {
        let mut s = FrameScheduler::new(Duration::ZERO);
        let t0 = Instant::now();
        assert_eq!(s.admit(t0, false), Admission::Accepted);
        assert_eq!(s.admit(t0, false), Admission::Accepted);
        assert_eq!(s.admit(t0, true), Admission::Busy);
    }
}
