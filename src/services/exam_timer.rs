use time::{Duration, OffsetDateTime};

/// One observation of the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerReading {
    pub remaining_seconds: u64,
    pub expired: bool,
    /// True on the single observation where expiry is first seen.
    pub expiry_edge: bool,
}

/// Wall-clock anchored countdown. There is no pause.
///
/// Remaining time is recomputed from the clock on each observation, rounded up to whole
/// seconds, and never reported higher than the previous reading.
#[derive(Debug, Clone)]
pub struct ExamTimer {
    started_at: OffsetDateTime,
    duration: Duration,
    deadline: OffsetDateTime,
    last_remaining: Option<u64>,
    expiry_signalled: bool,
    stopped: bool,
}

impl ExamTimer {
    pub fn new(started_at: OffsetDateTime, duration_seconds: u32) -> Self {
        let duration = Duration::seconds(i64::from(duration_seconds));
        Self {
            started_at,
            duration,
            deadline: started_at + duration,
            last_remaining: None,
            expiry_signalled: false,
            stopped: false,
        }
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    pub fn deadline(&self) -> OffsetDateTime {
        self.deadline
    }

    /// Raw remaining seconds at `now`, without the monotonic clamp.
    pub fn remaining_at(&self, now: OffsetDateTime) -> u64 {
        let left = self.deadline - now;
        if left <= Duration::ZERO {
            return 0;
        }
        let whole = left.whole_seconds();
        let rounded = if left > Duration::seconds(whole) { whole + 1 } else { whole };
        u64::try_from(rounded).unwrap_or(0)
    }

    /// Same value `observe` would report, without recording it or consuming the expiry edge.
    pub fn peek(&self, now: OffsetDateTime) -> u64 {
        let raw = self.remaining_at(now);
        self.last_remaining.map_or(raw, |previous| raw.min(previous))
    }

    pub fn observe(&mut self, now: OffsetDateTime) -> TimerReading {
        let remaining = self.peek(now);
        self.last_remaining = Some(remaining);

        let expired = remaining == 0;
        let expiry_edge = expired && !self.expiry_signalled && !self.stopped;
        if expired {
            self.expiry_signalled = true;
        }

        TimerReading { remaining_seconds: remaining, expired, expiry_edge }
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Elapsed time since start, clamped to `[0, duration]`.
    pub fn time_spent_seconds(&self, now: OffsetDateTime) -> u64 {
        let elapsed = (now - self.started_at).clamp(Duration::ZERO, self.duration);
        u64::try_from(elapsed.whole_seconds()).unwrap_or(0)
    }
}
